//! Upload command implementation.

use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Args;
use colored::Colorize;
use kidquest::UploadForm;

use crate::cli::ConnectionArgs;
use crate::output;
use crate::session;

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Request path relative to the base URL (e.g., /rewards/3/photo)
    pub path: String,

    /// File part as field=path (repeatable)
    #[arg(long = "file", short = 'f', value_name = "FIELD=PATH", required = true)]
    pub files: Vec<String>,

    /// Text field as name=value (repeatable)
    #[arg(long = "field", value_name = "NAME=VALUE")]
    pub fields: Vec<String>,
}

pub async fn run(args: UploadArgs, connection: &ConnectionArgs) -> Result<()> {
    let client = session::require(connection).await?;
    let form = build_form(&args)?;
    let mut events = client.subscribe();

    eprintln!(
        "{}",
        format!("Uploading {} file(s)...", form.files().len()).dimmed()
    );

    let result = client.upload(&args.path, form).await;
    session::report_events(&mut events);

    let body = result.context("Upload failed")?;
    output::body(&body)
}

fn build_form(args: &UploadArgs) -> Result<UploadForm> {
    let mut form = UploadForm::new();

    for pair in &args.fields {
        let (name, value) = split_pair(pair, "NAME=VALUE")?;
        form = form.text(name, value);
    }

    for pair in &args.files {
        let (field, path) = split_pair(pair, "FIELD=PATH")?;
        let path = Path::new(path);
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .context("Upload path has no file name")?;
        form = form.file(field, file_name, mime_for(path), bytes);
    }

    Ok(form)
}

fn split_pair<'a>(pair: &'a str, expected: &str) -> Result<(&'a str, &'a str)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.is_empty() && !value.is_empty() => Ok((key, value)),
        _ => bail!("Invalid argument '{}', expected {}", pair, expected),
    }
}

/// MIME type from the file extension; `None` leaves it to the transport.
fn mime_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "json" => "application/json",
        "txt" => "text/plain",
        "pdf" => "application/pdf",
        _ => return None,
    })
}
