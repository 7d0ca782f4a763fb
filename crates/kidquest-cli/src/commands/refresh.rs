//! Refresh command implementation.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use crate::cli::ConnectionArgs;
use crate::output;
use crate::session;

#[derive(Args, Debug)]
pub struct RefreshArgs {}

pub async fn run(_args: RefreshArgs, connection: &ConnectionArgs) -> Result<()> {
    let client = session::require(connection).await?;
    let mut events = client.subscribe();

    eprintln!("{}", "Refreshing session...".dimmed());

    let result = client.refresh_session().await;
    session::report_events(&mut events);
    result.context("Failed to refresh session")?;

    output::success("Session refreshed successfully");
    Ok(())
}
