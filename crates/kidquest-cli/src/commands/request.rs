//! Generic request commands (get, post, put, patch, delete).

use std::io::{self, Read};

use anyhow::{Context, Result, bail};
use clap::Args;
use kidquest::RequestDescriptor;
use serde_json::Value;

use crate::cli::ConnectionArgs;
use crate::output;
use crate::session;

#[derive(Args, Debug)]
pub struct PathArgs {
    /// Request path relative to the base URL (e.g., /missions)
    pub path: String,

    /// Query parameter as key=value (repeatable)
    #[arg(long = "query", short = 'q', value_name = "KEY=VALUE")]
    pub query: Vec<String>,

    /// Send without the stored access token
    #[arg(long)]
    pub no_auth: bool,
}

#[derive(Args, Debug)]
pub struct BodyArgs {
    #[command(flatten)]
    pub target: PathArgs,

    /// Inline JSON body
    #[arg(long, short = 'd', conflicts_with = "json")]
    pub data: Option<String>,

    /// JSON file with the request body (use - for stdin)
    #[arg(long)]
    pub json: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub enum Verb {
    Post,
    Put,
    Patch,
}

pub async fn get(args: PathArgs, connection: &ConnectionArgs) -> Result<()> {
    let descriptor = describe(RequestDescriptor::get(&args.path), &args)?;
    execute(descriptor, connection).await
}

pub async fn delete(args: PathArgs, connection: &ConnectionArgs) -> Result<()> {
    let descriptor = describe(RequestDescriptor::delete(&args.path), &args)?;
    execute(descriptor, connection).await
}

pub async fn send(verb: Verb, args: BodyArgs, connection: &ConnectionArgs) -> Result<()> {
    let path = &args.target.path;
    let descriptor = match verb {
        Verb::Post => RequestDescriptor::post(path),
        Verb::Put => RequestDescriptor::put(path),
        Verb::Patch => RequestDescriptor::patch(path),
    };
    let descriptor = describe(descriptor, &args.target)?.json(read_body(&args)?);
    execute(descriptor, connection).await
}

/// Apply query parameters and auth flags.
pub(super) fn describe(mut descriptor: RequestDescriptor, args: &PathArgs) -> Result<RequestDescriptor> {
    for pair in &args.query {
        let (key, value) = parse_query(pair)?;
        descriptor = descriptor.query(key, value);
    }
    if args.no_auth {
        descriptor = descriptor.skip_auth();
    }
    Ok(descriptor)
}

pub(super) async fn execute(descriptor: RequestDescriptor, connection: &ConnectionArgs) -> Result<()> {
    let client = if descriptor.skip_auth {
        session::open(connection)?
    } else {
        session::require(connection).await?
    };
    let mut events = client.subscribe();

    let label = format!("{} {}", descriptor.method, descriptor.path);
    let result = client.send(descriptor).await;
    session::report_events(&mut events);

    let body = result.with_context(|| format!("{} failed", label))?;
    output::body(&body)
}

fn parse_query(pair: &str) -> Result<(&str, &str)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => bail!("Invalid query parameter '{}', expected KEY=VALUE", pair),
    }
}

fn read_body(args: &BodyArgs) -> Result<Value> {
    if let Some(data) = &args.data {
        return serde_json::from_str(data).context("Invalid JSON in --data");
    }

    match args.json.as_deref() {
        Some("-") => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            serde_json::from_str(&buf).context("Invalid JSON from stdin")
        }
        Some(path) => {
            let content = std::fs::read_to_string(path).context("Failed to read JSON file")?;
            serde_json::from_str(&content).context("Invalid JSON in file")
        }
        None => Ok(Value::Object(serde_json::Map::new())),
    }
}
