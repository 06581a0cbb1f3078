//! Core module containing the main functionality of Sockexpect
//!
//! This module provides:
//! - The expect scanner (buffered regex search over a blocking stream)
//! - Stream adapters for TCP, Unix sockets and serial ports
//! - A scripted in-memory stream for tests
//! - Transcript logging with timestamps
//! - Exchange scripts (send / expect / check sequences)

pub mod logger;
pub mod scanner;
pub mod script;
pub mod simulator;
pub mod transport;
