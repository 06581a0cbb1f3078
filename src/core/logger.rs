//! Transcript logging
//!
//! Records every byte sent and received by a scanner, with timestamps, into
//! a bounded in-memory ring and optionally a file.

use crate::utils::{escape_bytes, hex_dump};
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared handle to a transcript logger
pub type Logger = Arc<Mutex<SessionLogger>>;

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Escaped text
    #[default]
    Text,
    /// Hex dump
    Hex,
    /// Text when printable, hex otherwise
    Mixed,
    /// CSV with timestamp
    Csv,
    /// JSON lines
    JsonLines,
}

impl LogFormat {
    /// Get file extension for format
    pub fn extension(self) -> &'static str {
        match self {
            LogFormat::Text | LogFormat::Mixed => "txt",
            LogFormat::Hex => "hex",
            LogFormat::Csv => "csv",
            LogFormat::JsonLines => "jsonl",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(Self::Text),
            "hex" => Ok(Self::Hex),
            "mixed" => Ok(Self::Mixed),
            "csv" => Ok(Self::Csv),
            "jsonl" | "json_lines" | "json-lines" => Ok(Self::JsonLines),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Data direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Bytes read from the stream
    Received,
    /// Bytes written to the stream
    Sent,
    /// Scanner notes (match, timeout, close)
    Info,
}

impl Direction {
    fn tag(self) -> &'static str {
        match self {
            Direction::Received => "RX",
            Direction::Sent => "TX",
            Direction::Info => "##",
        }
    }
}

/// A single log entry
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// When the bytes were seen
    pub timestamp: DateTime<Local>,
    /// Which way they went
    pub direction: Direction,
    /// Payload
    pub data: Vec<u8>,
}

#[derive(Serialize)]
struct JsonEntry {
    timestamp: String,
    direction: Direction,
    text: String,
    hex: String,
    length: usize,
}

impl LogEntry {
    /// Create new entry stamped now
    pub fn new(direction: Direction, data: Vec<u8>) -> Self {
        Self {
            timestamp: Local::now(),
            direction,
            data,
        }
    }

    fn stamp(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
    }

    fn is_printable(&self) -> bool {
        self.data
            .iter()
            .all(|&b| (0x20..0x7f).contains(&b) || matches!(b, b'\n' | b'\r' | b'\t'))
    }

    /// Format as a single line in the given format
    pub fn format(&self, format: LogFormat, timestamps: bool) -> String {
        let body = match format {
            LogFormat::Csv => return self.to_csv(),
            LogFormat::JsonLines => return self.to_json(),
            LogFormat::Text => escape_bytes(&self.data),
            LogFormat::Hex => hex_dump(&self.data),
            LogFormat::Mixed if self.is_printable() => escape_bytes(&self.data),
            LogFormat::Mixed => hex_dump(&self.data),
        };

        if timestamps {
            format!("[{}] {} {}", self.stamp(), self.direction.tag(), body)
        } else {
            format!("{} {}", self.direction.tag(), body)
        }
    }

    fn to_csv(&self) -> String {
        let text = String::from_utf8_lossy(&self.data).replace('"', "\"\"");
        format!(
            "\"{}\",\"{}\",\"{}\",\"{}\"",
            self.stamp(),
            self.direction.tag(),
            hex::encode(&self.data),
            text
        )
    }

    fn to_json(&self) -> String {
        let entry = JsonEntry {
            timestamp: self.timestamp.to_rfc3339(),
            direction: self.direction,
            text: String::from_utf8_lossy(&self.data).into_owned(),
            hex: hex::encode(&self.data),
            length: self.data.len(),
        };
        serde_json::to_string(&entry).unwrap_or_default()
    }
}

/// Transcript logger
pub struct SessionLogger {
    file: Option<BufWriter<File>>,
    format: LogFormat,
    path: Option<PathBuf>,
    timestamps: bool,
    buffer: VecDeque<LogEntry>,
    max_buffer: usize,
    bytes_logged: usize,
}

impl Default for SessionLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLogger {
    /// Create a logger that only keeps entries in memory
    pub fn new() -> Self {
        Self {
            file: None,
            format: LogFormat::Text,
            path: None,
            timestamps: true,
            buffer: VecDeque::new(),
            max_buffer: 10_000,
            bytes_logged: 0,
        }
    }

    /// Wrap into the shared handle a scanner accepts
    pub fn shared(self) -> Logger {
        Arc::new(Mutex::new(self))
    }

    /// Start appending to a file
    pub fn start(&mut self, path: &Path, format: LogFormat) -> io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);

        if format == LogFormat::Csv {
            writeln!(writer, "Timestamp,Direction,Hex,Text")?;
        }

        self.file = Some(writer);
        self.format = format;
        self.path = Some(path.to_path_buf());
        self.bytes_logged = 0;
        Ok(())
    }

    /// Stop logging to file
    pub fn stop(&mut self) {
        if let Some(ref mut file) = self.file {
            let _ = file.flush();
        }
        self.file = None;
    }

    /// Is currently logging to a file
    pub fn is_logging(&self) -> bool {
        self.file.is_some()
    }

    /// Get log path
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Log data
    pub fn log(&mut self, direction: Direction, data: &[u8]) {
        let entry = LogEntry::new(direction, data.to_vec());

        if let Some(ref mut file) = self.file {
            let line = entry.format(self.format, self.timestamps);
            if let Err(e) = writeln!(file, "{line}") {
                tracing::warn!(error = %e, "transcript write failed, file logging stopped");
                self.file = None;
            } else {
                self.bytes_logged += data.len();
            }
        }

        self.buffer.push_back(entry);
        while self.buffer.len() > self.max_buffer {
            self.buffer.pop_front();
        }
    }

    /// Log received data
    pub fn log_rx(&mut self, data: &[u8]) {
        self.log(Direction::Received, data);
    }

    /// Log sent data
    pub fn log_tx(&mut self, data: &[u8]) {
        self.log(Direction::Sent, data);
    }

    /// Log info message
    pub fn log_info(&mut self, message: &str) {
        self.log(Direction::Info, message.as_bytes());
    }

    /// Entries still held in memory, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.buffer.iter()
    }

    /// Number of entries held in memory
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True when nothing has been logged (or everything was cleared)
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear in-memory entries
    pub fn clear_buffer(&mut self) {
        self.buffer.clear();
    }

    /// Payload bytes written to the file since `start`
    pub fn bytes_logged(&self) -> usize {
        self.bytes_logged
    }

    /// Export in-memory entries
    pub fn export(&self, format: LogFormat) -> String {
        let mut result = String::new();

        if format == LogFormat::Csv {
            result.push_str("Timestamp,Direction,Hex,Text\n");
        }

        for entry in &self.buffer {
            result.push_str(&entry.format(format, true));
            result.push('\n');
        }

        result
    }

    /// Set timestamp display
    pub fn set_timestamps(&mut self, show: bool) {
        self.timestamps = show;
    }

    /// Set max in-memory entries
    pub fn set_max_buffer(&mut self, size: usize) {
        self.max_buffer = size;
        while self.buffer.len() > self.max_buffer {
            self.buffer.pop_front();
        }
    }

    /// Flush to disk
    pub fn flush(&mut self) -> io::Result<()> {
        match self.file {
            Some(ref mut file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for SessionLogger {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Generate log filename with timestamp
pub fn generate_log_filename(prefix: &str, format: LogFormat) -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    format!("{}_{}.{}", prefix, timestamp, format.extension())
}
