//! Persistent session for the CLI.
//!
//! Tokens and the cached profile live in `session.json` under the platform
//! data directory, written through the library's [`FileStorage`].

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use kidquest::{ApiClient, AuthEvent, FileStorage, TcpProbe, TokenStore};
use tokio::sync::broadcast::error::TryRecvError;

use crate::cli::ConnectionArgs;
use crate::output;

/// Get the session file path, creating its directory.
pub fn session_path() -> Result<PathBuf> {
    let dirs =
        ProjectDirs::from("", "", "kidquest").context("Could not determine data directory")?;

    let data_dir = dirs.data_dir();
    fs::create_dir_all(data_dir).context("Failed to create data directory")?;

    Ok(data_dir.join("session.json"))
}

/// Build a client over the persisted session.
pub fn open(connection: &ConnectionArgs) -> Result<ApiClient> {
    let config = connection.client_config()?;
    let path = session_path()?;
    tracing::debug!(path = %path.display(), "using session file");

    let store = TokenStore::new(Arc::new(FileStorage::new(path)));
    let mut builder = ApiClient::builder(config.clone(), Arc::new(store));
    if let Some(probe) = TcpProbe::for_base_url(&config.base_url) {
        builder = builder.probe(Arc::new(probe));
    }

    builder.build().context("Failed to create client")
}

/// Build a client and fail unless a session is stored.
pub async fn require(connection: &ConnectionArgs) -> Result<ApiClient> {
    let client = open(connection)?;
    if !client.is_authenticated().await {
        anyhow::bail!("No active session. Run 'kidquest login' first.");
    }
    Ok(client)
}

/// Report session events raised while a command ran.
pub fn report_events(events: &mut tokio::sync::broadcast::Receiver<AuthEvent>) {
    loop {
        match events.try_recv() {
            Ok(AuthEvent::Logout) => {
                output::warning("Session ended. Run 'kidquest login' to sign in again.")
            }
            Ok(AuthEvent::TokenRefreshed(_)) => tracing::info!("Session tokens refreshed"),
            Err(TryRecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "missed session events")
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}
