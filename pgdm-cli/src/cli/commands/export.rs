use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::*;

use super::ExportArgs;
use crate::cli::GlobalArgs;
use crate::cli::session::Session;
use crate::io;

pub async fn handle_export_command(args: ExportArgs, global: &GlobalArgs) -> Result<()> {
    let mut session = Session::open(global).await?;
    let (service, db) = session.parts();

    if let Some(folder) = &args.all {
        let sources = service.list(db, None, None).await?;
        for source in &sources {
            let export = service
                .export(db, &source.name)
                .await
                .with_context(|| format!("Failed to export source {}", source.name))?;
            let path = io::export_path(folder, &source.target, &source.name);
            io::csv::write_export(&path, &export)?;
        }
        println!(
            "{} {} source(s) exported into {}",
            "✓".green(),
            sources.len(),
            folder.display().to_string().cyan()
        );
        return session.close().await;
    }

    let Some(name) = args.source.as_deref() else {
        anyhow::bail!("Either --source or --all is required");
    };
    let export = service
        .export(db, name)
        .await
        .with_context(|| format!("Failed to export source {}", name))?;
    let path = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{}.csv", name)));
    io::csv::write_export(&path, &export)?;

    println!(
        "{} {} rows exported into {} from table: {}",
        "✓".green(),
        export.records.len(),
        path.display().to_string().cyan(),
        export.source.target
    );
    session.close().await
}
