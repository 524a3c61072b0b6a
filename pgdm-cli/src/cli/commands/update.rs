use anyhow::{Context, Result};
use colored::*;

use super::UpdateArgs;
use crate::cli::GlobalArgs;
use crate::cli::output::{confirm, format_rows};
use crate::cli::progress::ProgressPrinter;
use crate::cli::session::Session;
use crate::io;
use crate::sync::{DiffResult, Row};

fn print_changes(diff: &DiffResult) {
    if !diff.to_update.is_empty() {
        println!("{}", "UPDATE".yellow().bold());
        let rows: Vec<Row> = diff.to_update.iter().map(|pair| pair.new.clone()).collect();
        println!("{}\n", format_rows(&rows).yellow());
    }
    if !diff.to_insert.is_empty() {
        println!("{}", "INSERT".green().bold());
        println!("{}\n", format_rows(&diff.to_insert).green());
    }
    if !diff.to_delete.is_empty() {
        println!("{}", "DELETE".red().bold());
        println!("{}\n", format_rows(&diff.to_delete).red());
    }
}

pub async fn handle_update_command(args: UpdateArgs, global: &GlobalArgs) -> Result<()> {
    let file = io::read_snapshot(&args.file, args.sheet.as_deref())?;

    let mut session = Session::open(global).await?;
    if args.continue_on_error {
        session.config.apply.continue_on_error = true;
    }
    let (service, db) = session.parts();

    let analysis = service
        .analyze_update(db, &file.source, &file.snapshot)
        .await
        .with_context(|| format!("Failed to analyze source {}", file.source))?;
    let diff = &analysis.diff;

    if diff.has_conflicts() {
        eprintln!("{}", "Conflicts:".red().bold());
        for conflict in &diff.conflicts {
            eprintln!("  - {}", conflict);
        }
        diff.ensure_no_conflicts()?;
    }

    if diff.is_empty() {
        println!("No changes for {}", file.source.bold());
        return session.close().await;
    }

    println!(
        "The following updates will be performed on {}:",
        analysis.source.target.cyan()
    );
    println!("  - Update {} row(s)", diff.to_update.len());
    println!("  - Add {} row(s)", diff.to_insert.len());
    println!("  - Delete {} row(s)", diff.to_delete.len());
    println!();

    if args.dry_run {
        print_changes(diff);
        return session.close().await;
    }

    if !confirm("Are you sure you want to proceed?", args.yes)? {
        println!("Update cancelled");
        return session.close().await;
    }

    let progress = ProgressPrinter::spawn(format!("Updating {}", file.source));
    let result = service.apply_update(db, &analysis, progress.sink()).await;
    progress.finish().await;
    let outcome = result.with_context(|| format!("Failed to update source {}", file.source))?;

    println!(
        "{} {} row(s) changed in {}; {} is now at revision {}",
        "✓".green(),
        outcome.rows_processed,
        analysis.source.target.cyan(),
        file.source.bold(),
        analysis.source.revision + 1
    );
    session.close().await
}
