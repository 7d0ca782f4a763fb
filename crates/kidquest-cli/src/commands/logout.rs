//! Logout command implementation.

use anyhow::Result;
use clap::Args;

use crate::cli::ConnectionArgs;
use crate::output;
use crate::session;

#[derive(Args, Debug)]
pub struct LogoutArgs {}

pub async fn run(_args: LogoutArgs, connection: &ConnectionArgs) -> Result<()> {
    let client = session::open(connection)?;
    client.logout().await;

    output::success("Logged out");
    Ok(())
}
