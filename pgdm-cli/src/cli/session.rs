//! Connection, config and table metadata for one command run

use anyhow::{Context, Result};

use crate::config::{AppConfig, TableConfigSet};
use crate::db::{PgDatabase, load_table_configs};
use crate::sync::{ApplyOptions, SyncService};

use super::GlobalArgs;

pub struct Session {
    pub config: AppConfig,
    pub db: PgDatabase,
    pub tables: TableConfigSet,
}

impl Session {
    /// Load config, connect, and read the table config store
    pub async fn open(global: &GlobalArgs) -> Result<Self> {
        let mut config = AppConfig::load(global.config.as_deref())?;
        global.apply_to(&mut config.connection);

        let mut db = PgDatabase::connect(&config.connection, config.schema.clone()).await?;
        let tables = load_table_configs(&mut db)
            .await
            .with_context(|| {
                format!(
                    "Failed to load table config from {}",
                    config.schema.table_config_table
                )
            })?;

        Ok(Self { config, db, tables })
    }

    /// Service over the loaded table config, plus the connection it runs on
    pub fn parts(&mut self) -> (SyncService<'_>, &mut PgDatabase) {
        let service = SyncService::new(
            &self.tables,
            self.config.apply.batch_size,
            ApplyOptions::from(&self.config.apply),
        );
        (service, &mut self.db)
    }

    pub async fn close(self) -> Result<()> {
        self.db.close().await
    }
}
