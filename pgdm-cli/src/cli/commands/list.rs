use anyhow::Result;
use colored::*;

use super::ListArgs;
use crate::cli::GlobalArgs;
use crate::cli::session::Session;

pub async fn handle_list_command(args: ListArgs, global: &GlobalArgs) -> Result<()> {
    let mut session = Session::open(global).await?;
    let (service, db) = session.parts();

    let sources = service
        .list(db, args.source.as_deref(), args.view.as_deref())
        .await?;

    if sources.is_empty() {
        println!("No sources found");
        return session.close().await;
    }

    println!("{}", "source, view, revision".bold());
    for source in &sources {
        println!("{}, {}, {}", source.name, source.target.cyan(), source.revision);
    }
    session.close().await
}
