//! Stream layer for the scanner
//!
//! Supports:
//! - Raw TCP connections
//! - Unix domain sockets
//! - Serial ports (RS-232, RS-485, USB-Serial)
//!
//! Connection setup lives here only as a convenience for the CLI and
//! scripts; the scanner itself accepts any already-connected [`ExpectStream`].

mod serial;
mod tcp;

pub use serial::{list_ports, SerialConfig, SerialFlowControl, SerialParity};
pub use tcp::TcpConfig;

use std::fmt;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;
use thiserror::Error;

/// A blocking byte stream with a configurable read timeout.
///
/// `read` must block for at most the configured timeout and then fail with
/// [`io::ErrorKind::WouldBlock`] or [`io::ErrorKind::TimedOut`]. A read that
/// returns `Ok(0)` means the peer closed the stream.
pub trait ExpectStream: Read + Write {
    /// Current read timeout; `None` means reads may block forever.
    fn read_timeout(&self) -> io::Result<Option<Duration>>;

    /// Change the read timeout.
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;
}

impl ExpectStream for TcpStream {
    fn read_timeout(&self) -> io::Result<Option<Duration>> {
        TcpStream::read_timeout(self)
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }
}

#[cfg(unix)]
impl ExpectStream for std::os::unix::net::UnixStream {
    fn read_timeout(&self) -> io::Result<Option<Duration>> {
        std::os::unix::net::UnixStream::read_timeout(self)
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        std::os::unix::net::UnixStream::set_read_timeout(self, timeout)
    }
}

impl<S: ExpectStream + ?Sized> ExpectStream for Box<S> {
    fn read_timeout(&self) -> io::Result<Option<Duration>> {
        (**self).read_timeout()
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        (**self).set_read_timeout(timeout)
    }
}

impl<S: ExpectStream + ?Sized> ExpectStream for &mut S {
    fn read_timeout(&self) -> io::Result<Option<Duration>> {
        (**self).read_timeout()
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        (**self).set_read_timeout(timeout)
    }
}

/// Returns true when a read error means "the timeout elapsed".
///
/// Unix sockets report `WouldBlock`, Windows sockets and serial ports report
/// `TimedOut`.
pub fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Connection target
#[derive(Debug, Clone)]
pub enum Target {
    /// Raw TCP connection
    Tcp(TcpConfig),
    /// Serial port connection
    Serial(SerialConfig),
}

impl Target {
    /// Open the target and hand back a boxed stream ready for a scanner.
    pub fn open(&self) -> Result<Box<dyn ExpectStream + Send>, TransportError> {
        match self {
            Self::Tcp(cfg) => Ok(Box::new(cfg.connect()?)),
            Self::Serial(cfg) => Ok(Box::new(cfg.open()?)),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(cfg) => write!(f, "tcp://{}:{}", cfg.host, cfg.port),
            Self::Serial(cfg) => write!(f, "serial://{}@{}", cfg.port, cfg.baud_rate),
        }
    }
}

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection timeout
    #[error("Connection timeout after {0:?}")]
    Timeout(Duration),

    /// Address did not resolve
    #[error("Could not resolve address: {0}")]
    Resolve(String),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
