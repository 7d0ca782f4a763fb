//! Register command implementation.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use kidquest::Registration;

use crate::cli::ConnectionArgs;
use crate::output;
use crate::session;

#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Display name
    #[arg(long)]
    pub name: String,

    /// Account email
    #[arg(long)]
    pub email: String,

    /// Account password
    #[arg(long, env = "KIDQUEST_PASSWORD", hide_env_values = true)]
    pub password: String,
}

pub async fn run(args: RegisterArgs, connection: &ConnectionArgs) -> Result<()> {
    let client = session::open(connection)?;
    let registration = Registration::new(&args.name, &args.email, &args.password);

    eprintln!("{}", "Creating account...".dimmed());

    let user = client
        .register(&registration)
        .await
        .context("Failed to register")?;

    output::success("Account created");
    output::field("Name", &args.name);
    output::field("Email", &args.email);
    if let Some(user) = user {
        output::json_pretty(&user)?;
    }

    Ok(())
}
