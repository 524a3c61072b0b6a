//! PostgreSQL implementation of the storage traits on a single `PgConnection`

use std::collections::{BTreeSet, HashMap};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Connection, Row as _};

use crate::config::{ConnectionConfig, SchemaConfig, TableConfigOverride, TableConfigRecord};
use crate::error::DbError;
use crate::sync::{Row, Source, Statement, Value};

use super::sql::{self, ColumnDecode, ColumnInfo};
use super::{Catalog, Session, SourceStore, StoredRows};

const COLUMNS_QUERY: &str = r#"
    SELECT column_name::text AS column_name, udt_name::text AS udt_name
    FROM information_schema.columns
    WHERE table_name = $1
      AND table_schema = ANY(current_schemas(false))
    ORDER BY ordinal_position
"#;

const REFERENCES_QUERY: &str = r#"
    SELECT DISTINCT ccu.table_name::text AS table_name
    FROM information_schema.table_constraints AS tc
    JOIN information_schema.key_column_usage AS kcu
      ON tc.constraint_name = kcu.constraint_name
     AND tc.table_schema = kcu.table_schema
    JOIN information_schema.constraint_column_usage AS ccu
      ON ccu.constraint_name = tc.constraint_name
     AND ccu.table_schema = tc.table_schema
    WHERE tc.constraint_type = 'FOREIGN KEY'
      AND tc.table_name = $1
"#;

/// One open connection plus cached column metadata
pub struct PgDatabase {
    conn: PgConnection,
    schema: SchemaConfig,
    columns: HashMap<String, Vec<ColumnInfo>>,
}

impl PgDatabase {
    /// Connect using a URL when one is configured, otherwise the individual
    /// fields (libpq environment variables fill in the rest).
    pub async fn connect(config: &ConnectionConfig, schema: SchemaConfig) -> anyhow::Result<Self> {
        let conn = match &config.url {
            Some(url) => PgConnection::connect(url)
                .await
                .context("Failed to connect to database")?,
            None => {
                let mut options = PgConnectOptions::new().host(&config.host).port(config.port);
                if let Some(user) = &config.user {
                    options = options.username(user);
                }
                if let Some(database) = &config.database {
                    options = options.database(database);
                }
                if let Some(password) = &config.password {
                    options = options.password(password);
                }
                PgConnection::connect_with(&options).await.with_context(|| {
                    format!("Failed to connect to {}:{}", config.host, config.port)
                })?
            }
        };

        log::debug!("Connected to PostgreSQL");
        Ok(Self {
            conn,
            schema,
            columns: HashMap::new(),
        })
    }

    pub async fn close(self) -> anyhow::Result<()> {
        self.conn.close().await.context("Failed to close connection")
    }

    /// Column metadata for a table or view, cached per session
    async fn columns(&mut self, relation: &str) -> Result<Vec<ColumnInfo>, DbError> {
        if let Some(columns) = self.columns.get(relation) {
            return Ok(columns.clone());
        }

        let rows = sqlx::query(COLUMNS_QUERY)
            .bind(relation)
            .fetch_all(&mut self.conn)
            .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            columns.push(ColumnInfo::new(
                row.try_get::<String, _>("column_name")?,
                row.try_get::<String, _>("udt_name")?,
            ));
        }
        if columns.is_empty() {
            return Err(
                DbError::statement(format!("relation \"{}\" does not exist", relation))
                    .with_code("42P01"),
            );
        }

        self.columns.insert(relation.to_string(), columns.clone());
        Ok(columns)
    }

    async fn simple(&mut self, sql: &str) -> Result<(), DbError> {
        sqlx::query(sql).execute(&mut self.conn).await?;
        Ok(())
    }
}

fn relation_of(statement: &Statement) -> Option<&str> {
    use crate::sync::StatementOp;

    match &statement.op {
        StatementOp::InsertRows { relation, .. }
        | StatementOp::UpdateRow { relation, .. }
        | StatementOp::DeleteKeys { relation, .. }
        | StatementOp::DeleteSourceRows { relation, .. } => Some(relation),
        StatementOp::RegisterSource(_)
        | StatementOp::BumpRevision { .. }
        | StatementOp::RemoveSource { .. } => None,
    }
}

fn source_from_row(row: &PgRow) -> Result<Source, DbError> {
    let revision: i64 = row.try_get("revision")?;
    Ok(Source {
        name: row.try_get("name")?,
        target: row.try_get("target")?,
        revision: revision.max(0) as u64,
    })
}

/// Read one column as a [`Value`] according to its type
fn decode(row: &PgRow, index: usize, decode: ColumnDecode) -> Result<Value, sqlx::Error> {
    let value = match decode {
        ColumnDecode::Bool => row.try_get::<Option<bool>, _>(index)?.into(),
        ColumnDecode::Int2 => row.try_get::<Option<i16>, _>(index)?.map(i64::from).into(),
        ColumnDecode::Int4 => row.try_get::<Option<i32>, _>(index)?.map(i64::from).into(),
        ColumnDecode::Int8 => row.try_get::<Option<i64>, _>(index)?.into(),
        ColumnDecode::Float4 => row
            .try_get::<Option<f32>, _>(index)?
            .map_or(Value::Null, Value::from_f32),
        ColumnDecode::Float8 => row
            .try_get::<Option<f64>, _>(index)?
            .map_or(Value::Null, Value::Float),
        ColumnDecode::Numeric => row
            .try_get::<Option<String>, _>(index)?
            .map_or(Value::Null, Value::Numeric),
        ColumnDecode::Date => row.try_get::<Option<NaiveDate>, _>(index)?.into(),
        ColumnDecode::Timestamp => row
            .try_get::<Option<NaiveDateTime>, _>(index)?
            .map_or(Value::Null, Value::DateTime),
        ColumnDecode::TimestampTz => row
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map_or(Value::Null, |dt| Value::DateTime(dt.naive_utc())),
        ColumnDecode::Text => row.try_get::<Option<String>, _>(index)?.into(),
    };
    Ok(value)
}

#[async_trait]
impl Session for PgDatabase {
    async fn begin(&mut self) -> Result<(), DbError> {
        self.simple("BEGIN").await
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        self.simple("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        self.simple("ROLLBACK").await
    }

    async fn savepoint(&mut self, name: &str) -> Result<(), DbError> {
        self.simple(&format!("SAVEPOINT {}", sql::quote_ident(name))).await
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), DbError> {
        self.simple(&format!("ROLLBACK TO SAVEPOINT {}", sql::quote_ident(name)))
            .await
    }

    async fn release_savepoint(&mut self, name: &str) -> Result<(), DbError> {
        self.simple(&format!("RELEASE SAVEPOINT {}", sql::quote_ident(name)))
            .await
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64, DbError> {
        let columns = match relation_of(statement) {
            Some(relation) => self.columns(relation).await?,
            None => Vec::new(),
        };
        let rendered = sql::render(&statement.op, &self.schema, &columns);
        log::trace!("{} ({} parameter(s))", rendered.sql, rendered.params.len());

        let mut query = sqlx::query(&rendered.sql);
        for param in rendered.params {
            query = query.bind(param);
        }
        let result = query.execute(&mut self.conn).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SourceStore for PgDatabase {
    async fn fetch_source(&mut self, name: &str) -> Result<Option<Source>, DbError> {
        let sql = format!(
            "SELECT name::text AS name, target::text AS target, revision::bigint AS revision \
             FROM {} WHERE name = $1",
            sql::quote_ident(&self.schema.registry_table)
        );
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&mut self.conn)
            .await?;

        row.as_ref().map(source_from_row).transpose()
    }

    async fn list_sources(
        &mut self,
        name_pattern: &str,
        target_pattern: &str,
    ) -> Result<Vec<Source>, DbError> {
        let sql = format!(
            "SELECT name::text AS name, target::text AS target, revision::bigint AS revision \
             FROM {} WHERE name LIKE $1 AND target LIKE $2 ORDER BY target, name",
            sql::quote_ident(&self.schema.registry_table)
        );
        let rows = sqlx::query(&sql)
            .bind(name_pattern)
            .bind(target_pattern)
            .fetch_all(&mut self.conn)
            .await?;

        rows.iter().map(source_from_row).collect()
    }

    async fn fetch_rows(&mut self, source: &Source) -> Result<StoredRows, DbError> {
        let columns: Vec<ColumnInfo> = self
            .columns(&source.target)
            .await?
            .into_iter()
            .filter(|c| c.name != self.schema.source_column)
            .collect();
        let sql = sql::select_rows(&source.target, &columns, &self.schema.source_column);

        let pg_rows = sqlx::query(&sql)
            .bind(&source.name)
            .fetch_all(&mut self.conn)
            .await?;

        let decoders: Vec<ColumnDecode> = columns
            .iter()
            .map(|c| ColumnDecode::for_udt(&c.udt))
            .collect();

        let mut rows = Vec::with_capacity(pg_rows.len());
        for pg_row in &pg_rows {
            let mut row = Row::new();
            for (index, (column, decoder)) in columns.iter().zip(&decoders).enumerate() {
                row.set(column.name.as_str(), decode(pg_row, index, *decoder)?);
            }
            rows.push(row);
        }

        Ok(StoredRows {
            columns: columns.into_iter().map(|c| c.name).collect(),
            rows,
        })
    }
}

#[async_trait]
impl Catalog for PgDatabase {
    async fn referenced_tables(&mut self, table: &str) -> Result<BTreeSet<String>, DbError> {
        let rows = sqlx::query(REFERENCES_QUERY)
            .bind(table)
            .fetch_all(&mut self.conn)
            .await?;

        let mut tables = BTreeSet::new();
        for row in rows {
            tables.insert(row.try_get::<String, _>("table_name")?);
        }
        Ok(tables)
    }

    async fn table_config_entries(
        &mut self,
    ) -> Result<(Vec<TableConfigRecord>, Vec<TableConfigOverride>), DbError> {
        let sql = format!(
            "SELECT name::text AS name, target::text AS target, \
             primary_key::text AS primary_key, \
             coalesce(delete_target_is_view, false) AS delete_target_is_view \
             FROM {}",
            sql::quote_ident(&self.schema.table_config_table)
        );
        let rows = sqlx::query(&sql).fetch_all(&mut self.conn).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(TableConfigRecord {
                name: row.try_get("name")?,
                target: row.try_get("target")?,
                primary_key: row.try_get("primary_key")?,
                delete_target_is_view: row.try_get("delete_target_is_view")?,
            });
        }

        let mut overrides = Vec::new();
        if let Some(table) = self.schema.table_overrides_table.clone() {
            let sql = format!(
                "SELECT table_name::text AS table_name, key::text AS key, value::text AS value \
                 FROM {}",
                sql::quote_ident(&table)
            );
            let rows = sqlx::query(&sql).fetch_all(&mut self.conn).await?;
            for row in rows {
                overrides.push(TableConfigOverride {
                    table: row.try_get("table_name")?,
                    key: row.try_get("key")?,
                    value: row.try_get("value")?,
                });
            }
        }

        Ok((records, overrides))
    }
}
