//! Command-line interface

pub mod commands;
pub mod output;
pub mod progress;
pub mod session;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::config::ConnectionConfig;

use commands::{
    DeleteArgs, ExportArgs, ImportFsArgs, InsertArgs, ListArgs, OrderArgs, ReplaceArgs, UpdateArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "pgdm",
    version,
    about = "Keep PostgreSQL tables in sync with revision-tagged spreadsheet snapshots"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Config file (defaults to <config dir>/pgdm/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Connection URL, e.g. postgres://user@host/db
    #[arg(long, global = true)]
    pub url: Option<String>,

    #[arg(long, global = true)]
    pub host: Option<String>,

    #[arg(long, global = true)]
    pub port: Option<u16>,

    #[arg(short = 'U', long, global = true)]
    pub user: Option<String>,

    #[arg(short = 'd', long, global = true)]
    pub database: Option<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

impl GlobalArgs {
    /// Apply command-line connection overrides
    pub fn apply_to(&self, connection: &mut ConnectionConfig) {
        if let Some(url) = &self.url {
            connection.url = Some(url.clone());
        }
        if let Some(host) = &self.host {
            connection.host = host.clone();
            // Individual fields win over a configured URL
            if self.url.is_none() {
                connection.url = None;
            }
        }
        if let Some(port) = self.port {
            connection.port = port;
        }
        if let Some(user) = &self.user {
            connection.user = Some(user.clone());
        }
        if let Some(database) = &self.database {
            connection.database = Some(database.clone());
        }
    }

    /// Log filter for the requested verbosity
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Insert files as new sources
    Insert(InsertArgs),
    /// Apply an edited export to its source
    Update(UpdateArgs),
    /// Replace every row of an existing source
    Replace(ReplaceArgs),
    /// Delete a source and its rows
    Delete(DeleteArgs),
    /// Export one source, or all sources into a folder
    Export(ExportArgs),
    /// Insert every source of an `export --all` folder
    ImportFs(ImportFsArgs),
    /// List sources
    List(ListArgs),
    /// Print the load order of tables
    Order(OrderArgs),
}

pub async fn run(cli: Cli) -> Result<()> {
    if cli.global.no_color {
        colored::control::set_override(false);
    }

    match cli.command {
        Commands::Insert(args) => commands::insert::handle_insert_command(args, &cli.global).await,
        Commands::Update(args) => commands::update::handle_update_command(args, &cli.global).await,
        Commands::Replace(args) => {
            commands::replace::handle_replace_command(args, &cli.global).await
        }
        Commands::Delete(args) => commands::delete::handle_delete_command(args, &cli.global).await,
        Commands::Export(args) => commands::export::handle_export_command(args, &cli.global).await,
        Commands::ImportFs(args) => {
            commands::import_fs::handle_import_fs_command(args, &cli.global).await
        }
        Commands::List(args) => commands::list::handle_list_command(args, &cli.global).await,
        Commands::Order(args) => commands::order::handle_order_command(args, &cli.global).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_update() {
        let cli = Cli::try_parse_from([
            "pgdm",
            "--database",
            "plants",
            "update",
            "--file",
            "plants.csv",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(cli.global.database.as_deref(), Some("plants"));
        match cli.command {
            Commands::Update(args) => {
                assert!(args.dry_run);
                assert_eq!(args.file, PathBuf::from("plants.csv"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_insert_file_list() {
        let cli = Cli::try_parse_from([
            "pgdm", "insert", "--file", "a.csv,b.csv", "--table", "plant",
        ])
        .unwrap();

        match cli.command {
            Commands::Insert(args) => assert_eq!(args.file.len(), 2),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_connection_overrides() {
        let global = GlobalArgs {
            host: Some("db.internal".into()),
            port: Some(6543),
            ..Default::default()
        };
        let mut connection = ConnectionConfig {
            url: Some("postgres://old".into()),
            ..Default::default()
        };

        global.apply_to(&mut connection);

        assert_eq!(connection.host, "db.internal");
        assert_eq!(connection.port, 6543);
        assert!(connection.url.is_none());
    }

    #[test]
    fn test_log_level() {
        let mut global = GlobalArgs::default();
        assert_eq!(global.log_level(), "warn");
        global.verbose = 2;
        assert_eq!(global.log_level(), "debug");
    }
}
