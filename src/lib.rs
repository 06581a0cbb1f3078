//! # Sockexpect Core Library
//!
//! Expect-style scanning over blocking byte streams:
//! - TCP sockets
//! - Unix domain sockets
//! - Serial ports (RS-232, RS-485, USB-Serial adapters)
//!
//! ## Features
//!
//! - Buffered regex scanning with a before/after split
//! - Leftover data retained between `expect` calls
//! - Bounded buffer with oldest-first eviction
//! - Transcript logging with timestamps
//! - TOML exchange scripts for device checks
//! - CLI with exit codes
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::net::TcpStream;
//! use std::time::Duration;
//! use sockexpect::Scanner;
//!
//! fn main() -> anyhow::Result<()> {
//!     let stream = TcpStream::connect("172.16.10.10:5002")?;
//!     stream.set_read_timeout(Some(Duration::from_secs(3)))?;
//!
//!     let mut scanner = Scanner::new(stream)?;
//!     scanner.send_line(b"ADC")?;
//!     scanner.expect(r"Temp_C.*\n")?;
//!
//!     println!("Preamble: {:?}", scanner.before());
//!     println!("Reading:  {:?}", scanner.matched());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;
pub mod utils;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes, OutputFormat};
pub use crate::config::{AppConfig, ScannerConfig};
pub use crate::core::logger::{Direction, LogEntry, LogFormat, Logger, SessionLogger};
pub use crate::core::scanner::{ExpectError, Pattern, Scanner, ScannerWarning};
pub use crate::core::script::{Script, ScriptError, ScriptReport, Step};
pub use crate::core::simulator::{ScriptedStream, StreamEnd};
pub use crate::core::transport::{ExpectStream, SerialConfig, Target, TcpConfig, TransportError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
