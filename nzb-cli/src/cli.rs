use clap::{Parser, Subcommand};
use nzb_types::ServerConfig;

#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Usenet server host to connect to for ad-hoc diagnostics.
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long, default_value_t = 119)]
    pub port: u16,
    #[arg(long)]
    pub use_ssl: bool,
    #[arg(short, long)]
    pub username: Option<String>,
    #[arg(short, long)]
    pub password: Option<String>,

    /// Runs the storage schema migration and exits, optionally targeting a
    /// specific schema version instead of the latest one.
    #[arg(long, value_name = "TARGET", num_args = 0..=1, default_missing_value = "latest")]
    pub db_migration: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Checks whether a given article id is present on the configured
    /// server, without going through persistence or the repair scheduler.
    Probe {
        /// Message-id of the article to check, without the surrounding `<>`.
        article_id: String,
    },
}

impl Cli {
    pub fn make_server_config(&self) -> Option<ServerConfig> {
        let host = self.host.clone()?;
        Some(ServerConfig {
            id: 0,
            name: host.clone(),
            host,
            port: self.port,
            use_ssl: self.use_ssl,
            user: self.username.clone(),
            pass: self.password.clone(),
            max_connections: 4,
            priority: 0,
            enabled: true,
            retention_days: None,
        })
    }
}
