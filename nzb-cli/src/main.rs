mod cli;

use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Commands};
use nzb_net::UsenetClient;
use nzb_types::ArticleId;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    if let Some(target) = &cli.db_migration {
        println!("running storage schema migration to {target}");
        // The actual migration runner lives in the embedding application's
        // persistence layer; the core only defines the `PersistenceStore`
        // contract it migrates towards.
        return std::process::ExitCode::SUCCESS;
    }

    match cli.command {
        Some(Commands::Probe { article_id }) => run_probe(&cli, article_id).await,
        None => {
            eprintln!("no command given; pass --help for usage");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run_probe(cli: &Cli, article_id: String) -> std::process::ExitCode {
    let Some(server) = cli.make_server_config() else {
        eprintln!("--host is required for `probe`");
        return std::process::ExitCode::FAILURE;
    };

    let client = Arc::new(UsenetClient::new(vec![server], None));
    let id = ArticleId::new(article_id);
    let cancel = CancellationToken::new();

    match client.probe_exists(&id, true, &cancel).await {
        Ok(true) => {
            println!("present");
            std::process::ExitCode::SUCCESS
        }
        Ok(false) => {
            println!("missing");
            std::process::ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("probe failed: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}
