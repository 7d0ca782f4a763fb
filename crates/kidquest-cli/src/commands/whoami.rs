//! Whoami command implementation.

use anyhow::Result;
use clap::Args;

use crate::cli::ConnectionArgs;
use crate::output;
use crate::session;

#[derive(Args, Debug)]
pub struct WhoamiArgs {}

pub async fn run(_args: WhoamiArgs, connection: &ConnectionArgs) -> Result<()> {
    let client = session::require(connection).await?;

    output::field("Backend", client.config().base_url.as_str());
    output::field("Session", &session::session_path()?.display().to_string());
    match client.current_user().await {
        Some(user) => output::json_pretty(&user)?,
        None => output::field("User", "(no cached profile)"),
    }

    Ok(())
}
