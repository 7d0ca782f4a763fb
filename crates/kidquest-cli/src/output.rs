//! Output formatting helpers.

use anyhow::Result;
use colored::Colorize;
use kidquest::ResponseBody;
use serde::Serialize;

/// Print a success message.
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning to stderr.
pub fn warning(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

/// Print a labeled field.
pub fn field(label: &str, value: &str) {
    println!("{}: {}", label.dimmed(), value);
}

/// Print a value as pretty-printed JSON.
pub fn json_pretty<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

/// Print a response body as-is: JSON pretty-printed, text verbatim.
pub fn body(body: &ResponseBody) -> Result<()> {
    match body {
        ResponseBody::Json(value) => json_pretty(value),
        ResponseBody::Text(text) => {
            println!("{}", text);
            Ok(())
        }
        ResponseBody::Empty => {
            success("No content");
            Ok(())
        }
    }
}
