//! Output formatting for scanner buffers

use crate::utils::{escape_bytes, hex_dump};

/// How the CLI prints `before` and the match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Raw bytes, lossily decoded as UTF-8
    #[default]
    Text,
    /// Text with control bytes escaped
    Escaped,
    /// Hex dump
    Hex,
    /// JSON object with text, hex and length
    Json,
}

/// Format one buffer
pub fn format_output(data: &[u8], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => String::from_utf8_lossy(data).into_owned(),
        OutputFormat::Escaped => escape_bytes(data),
        OutputFormat::Hex => hex_dump(data),
        OutputFormat::Json => json_value(data).to_string(),
    }
}

/// JSON description of a buffer
pub fn json_value(data: &[u8]) -> serde_json::Value {
    serde_json::json!({
        "text": String::from_utf8_lossy(data),
        "hex": hex::encode(data),
        "length": data.len()
    })
}
