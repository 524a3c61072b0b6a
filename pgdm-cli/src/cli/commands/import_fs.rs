use anyhow::{Context, Result};
use colored::*;

use super::ImportFsArgs;
use crate::cli::GlobalArgs;
use crate::cli::progress::ProgressPrinter;
use crate::cli::session::Session;
use crate::io;

pub async fn handle_import_fs_command(args: ImportFsArgs, global: &GlobalArgs) -> Result<()> {
    let folders = io::discover_import(&args.folder)?;
    if folders.is_empty() {
        anyhow::bail!("No exported sources found in {}", args.folder.display());
    }

    // Parse everything up front so a bad file aborts before any write
    let mut imports = Vec::with_capacity(folders.len());
    for (target, paths) in &folders {
        let files = paths
            .iter()
            .map(|path| io::read_snapshot(path, None))
            .collect::<Result<Vec<_>>>()?;
        imports.push((target.clone(), files));
    }

    let mut session = Session::open(global).await?;
    let registry_table = session.config.schema.registry_table.clone();
    let (service, db) = session.parts();

    let targets: Vec<String> = imports.iter().map(|(target, _)| target.clone()).collect();
    let order = service
        .import_order(db, &targets, &registry_table)
        .await
        .context("Failed to resolve import order")?;
    log::info!("Import order: {}", order.join(", "));

    let mut inserted = 0;
    for target in &order {
        let Some((_, files)) = imports.iter().find(|(t, _)| t == target) else {
            continue;
        };
        for file in files {
            let progress = ProgressPrinter::spawn(format!("{} <- {}", target, file.source));
            let result = service
                .insert(db, &file.source, target, &file.snapshot, progress.sink())
                .await;
            progress.finish().await;
            result.with_context(|| format!("Failed to import source {}", file.source))?;
            inserted += 1;
        }
    }

    println!(
        "{} {} source(s) imported into {} table(s)",
        "✓".green(),
        inserted,
        order.len()
    );
    session.close().await
}
