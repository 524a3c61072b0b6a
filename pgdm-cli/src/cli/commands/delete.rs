use anyhow::{Context, Result};
use colored::*;

use super::DeleteArgs;
use crate::cli::GlobalArgs;
use crate::cli::output::confirm;
use crate::cli::progress::ProgressPrinter;
use crate::cli::session::Session;

pub async fn handle_delete_command(args: DeleteArgs, global: &GlobalArgs) -> Result<()> {
    let mut session = Session::open(global).await?;
    let (service, db) = session.parts();

    let preview = service.delete_preview(db, &args.source).await?;
    let prompt = format!(
        "Are you sure you want to delete source: {}? This operation will delete {} rows from {}.",
        args.source,
        preview.rows.len(),
        preview.source.target
    );
    if !confirm(&prompt, args.force)? {
        println!("Delete cancelled");
        return session.close().await;
    }

    let progress = ProgressPrinter::spawn(format!("Deleting {}", args.source));
    let result = service.delete(db, &args.source, progress.sink()).await;
    progress.finish().await;
    result.with_context(|| format!("Failed to delete source {}", args.source))?;

    println!(
        "{} Source {} deleted ({} rows removed from {})",
        "✓".green(),
        args.source.bold(),
        preview.rows.len(),
        preview.source.target.cyan()
    );
    session.close().await
}
