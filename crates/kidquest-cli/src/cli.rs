//! CLI argument definitions.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser};
use kidquest::ClientConfig;

use crate::commands::Command;

/// kidquest CLI tool for backend exploration.
#[derive(Parser, Debug)]
#[command(name = "kidquest")]
#[command(author, version = env!("KIDQUEST_VERSION"), about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Backend connection settings shared by every command.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Backend base URL
    #[arg(
        long,
        env = "KIDQUEST_BASE_URL",
        default_value = "https://api.kidquest.app",
        global = true
    )]
    pub base_url: String,

    /// Per-attempt timeout in milliseconds
    #[arg(long, default_value_t = 15_000, global = true)]
    pub timeout_ms: u64,

    /// Additional attempts for transient failures
    #[arg(long, default_value_t = 3, global = true)]
    pub retries: u32,

    /// Base retry delay in milliseconds, doubled per attempt
    #[arg(long, default_value_t = 1_000, global = true)]
    pub retry_delay_ms: u64,
}

impl ConnectionArgs {
    pub fn client_config(&self) -> Result<ClientConfig> {
        ClientConfig::builder(&self.base_url)
            .timeout(Duration::from_millis(self.timeout_ms))
            .retries(self.retries)
            .retry_delay(Duration::from_millis(self.retry_delay_ms))
            .build()
            .context("Invalid client configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connection_flags() {
        let cli = Cli::try_parse_from([
            "kidquest",
            "--base-url",
            "http://localhost:3000",
            "--retries",
            "0",
            "whoami",
        ])
        .unwrap();

        let config = cli.connection.client_config().unwrap();
        assert_eq!(config.base_url.host(), Some("localhost"));
        assert_eq!(config.base_url.port_or_default(), Some(3000));
        assert_eq!(config.retries, 0);
        assert_eq!(config.timeout, Duration::from_secs(15));
    }

    #[test]
    fn rejects_plain_http_remote() {
        let cli =
            Cli::try_parse_from(["kidquest", "--base-url", "http://example.com", "whoami"]).unwrap();
        assert!(cli.connection.client_config().is_err());
    }
}
