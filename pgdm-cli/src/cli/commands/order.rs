use anyhow::Result;

use super::OrderArgs;
use crate::cli::GlobalArgs;
use crate::cli::session::Session;
use crate::sync::graph::resolve_tables;

pub async fn handle_order_command(args: OrderArgs, global: &GlobalArgs) -> Result<()> {
    let mut session = Session::open(global).await?;
    let registry_table = session.config.schema.registry_table.clone();

    let order = resolve_tables(&mut session.db, &args.tables, &registry_table).await?;
    for (position, table) in order.iter().enumerate() {
        println!("{:>3}. {}", position + 1, table);
    }
    session.close().await
}
