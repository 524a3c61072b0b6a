use clap::Parser;

use pgdm::cli::{self, Cli, output};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(cli.global.log_level()),
    )
    .format_timestamp(None)
    .init();

    if let Err(err) = cli::run(cli).await {
        output::print_error(&err);
        std::process::exit(1);
    }
}
