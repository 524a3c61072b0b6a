//! Subcommand arguments and handlers

pub mod delete;
pub mod export;
pub mod import_fs;
pub mod insert;
pub mod list;
pub mod order;
pub mod replace;
pub mod update;

use std::path::PathBuf;

use clap::Args;

#[derive(Args, Debug)]
pub struct InsertArgs {
    /// Files to insert, comma separated
    #[arg(short, long, value_delimiter = ',', required = true)]
    pub file: Vec<PathBuf>,

    /// Target table or view
    #[arg(short, long)]
    pub table: String,

    /// Workbook sheet (defaults to the first sheet)
    #[arg(short, long)]
    pub sheet: Option<String>,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Edited export of the source
    #[arg(short, long)]
    pub file: PathBuf,

    #[arg(short, long)]
    pub sheet: Option<String>,

    /// Print the changes without applying them
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Run every statement and report all failures before rolling back
    #[arg(long)]
    pub continue_on_error: bool,
}

#[derive(Args, Debug)]
pub struct ReplaceArgs {
    #[arg(short, long)]
    pub file: PathBuf,

    #[arg(short, long)]
    pub sheet: Option<String>,

    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Source name
    #[arg(short, long)]
    pub source: String,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Source to export
    #[arg(short, long, conflicts_with = "all", required_unless_present = "all")]
    pub source: Option<String>,

    /// Output file (defaults to <source>.csv)
    #[arg(short, long, requires = "source")]
    pub output: Option<PathBuf>,

    /// Export every source into <folder>/<target>/<source>.csv
    #[arg(long, value_name = "FOLDER")]
    pub all: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ImportFsArgs {
    /// Folder written by `export --all`
    #[arg(short, long)]
    pub folder: PathBuf,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Source name pattern, `*` matches anything
    #[arg(short, long)]
    pub source: Option<String>,

    /// Target pattern
    #[arg(short = 't', long)]
    pub view: Option<String>,
}

#[derive(Args, Debug)]
pub struct OrderArgs {
    /// Tables to order
    #[arg(required = true)]
    pub tables: Vec<String>,
}
