use anyhow::{Context, Result};
use colored::*;

use super::InsertArgs;
use crate::cli::GlobalArgs;
use crate::cli::progress::ProgressPrinter;
use crate::cli::session::Session;
use crate::io;

pub async fn handle_insert_command(args: InsertArgs, global: &GlobalArgs) -> Result<()> {
    // Read every file before touching the database
    let files = args
        .file
        .iter()
        .map(|path| io::read_snapshot(path, args.sheet.as_deref()))
        .collect::<Result<Vec<_>>>()?;

    let mut session = Session::open(global).await?;
    let (service, db) = session.parts();

    for file in &files {
        let progress = ProgressPrinter::spawn(format!("Inserting {}", file.source));
        let result = service
            .insert(db, &file.source, &args.table, &file.snapshot, progress.sink())
            .await;
        progress.finish().await;

        let outcome = result
            .with_context(|| format!("Failed to insert source {}", file.source))?;
        println!(
            "{} {} rows inserted into {} from source {}",
            "✓".green(),
            outcome.rows_processed,
            args.table.cyan(),
            file.source.bold()
        );
    }

    session.close().await
}
