//! Login command implementation.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use kidquest::Credentials;

use crate::cli::ConnectionArgs;
use crate::output;
use crate::session;

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Account email
    #[arg(long)]
    pub email: String,

    /// Account password
    #[arg(long, env = "KIDQUEST_PASSWORD", hide_env_values = true)]
    pub password: String,
}

pub async fn run(args: LoginArgs, connection: &ConnectionArgs) -> Result<()> {
    let client = session::open(connection)?;
    let credentials = Credentials::new(&args.email, &args.password);

    eprintln!("{}", "Logging in...".dimmed());

    let user = client.login(&credentials).await.context("Failed to login")?;

    output::success("Logged in successfully");
    println!();
    output::field("Email", &args.email);
    output::field("Backend", client.config().base_url.as_str());
    if let Some(user) = user {
        output::json_pretty(&user)?;
    }

    Ok(())
}
