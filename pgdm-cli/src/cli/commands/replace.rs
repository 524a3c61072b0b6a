use anyhow::{Context, Result};
use colored::*;

use super::ReplaceArgs;
use crate::cli::GlobalArgs;
use crate::cli::output::confirm;
use crate::cli::progress::ProgressPrinter;
use crate::cli::session::Session;
use crate::io;

pub async fn handle_replace_command(args: ReplaceArgs, global: &GlobalArgs) -> Result<()> {
    let file = io::read_snapshot(&args.file, args.sheet.as_deref())?;

    let mut session = Session::open(global).await?;
    let (service, db) = session.parts();

    let preview = service.delete_preview(db, &file.source).await?;
    let prompt = format!(
        "Replace {} row(s) of source {} in {} with {} row(s)?",
        preview.rows.len(),
        file.source,
        preview.source.target,
        file.snapshot.len()
    );
    if !confirm(&prompt, args.yes)? {
        println!("Replace cancelled");
        return session.close().await;
    }

    let progress = ProgressPrinter::spawn(format!("Replacing {}", file.source));
    let result = service
        .replace(db, &file.source, &file.snapshot, progress.sink())
        .await;
    progress.finish().await;
    result.with_context(|| format!("Failed to replace source {}", file.source))?;

    println!(
        "{} Source {} replaced in {}",
        "✓".green(),
        file.source.bold(),
        preview.source.target.cyan()
    );
    session.close().await
}
