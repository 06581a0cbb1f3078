//! TCP stream setup

use super::TransportError;
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// TCP connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Read timeout applied after connecting; `None` leaves the socket
    /// blocking and lets the scanner apply its default.
    pub read_timeout: Option<Duration>,
}

impl TcpConfig {
    /// Create a new TCP configuration
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            connect_timeout: Duration::from_secs(10),
            read_timeout: None,
        }
    }

    /// Parse `host:port`.
    pub fn parse(target: &str) -> Result<Self, TransportError> {
        let (host, port) = target
            .rsplit_once(':')
            .ok_or_else(|| TransportError::InvalidConfiguration(format!("expected host:port, got {target:?}")))?;
        let port = port
            .parse::<u16>()
            .map_err(|e| TransportError::InvalidConfiguration(format!("bad port in {target:?}: {e}")))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(TransportError::InvalidConfiguration(format!(
                "missing host in {target:?}"
            )));
        }
        Ok(Self::new(host, port))
    }

    /// Set connection timeout
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set read timeout
    #[must_use]
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    fn resolve(&self) -> Result<Vec<SocketAddr>, TransportError> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| TransportError::Resolve(format!("{}:{}: {e}", self.host, self.port)))?
            .collect();
        if addrs.is_empty() {
            return Err(TransportError::Resolve(format!("{}:{}", self.host, self.port)));
        }
        Ok(addrs)
    }

    /// Connect, trying each resolved address in turn.
    pub fn connect(&self) -> Result<TcpStream, TransportError> {
        let mut last_err = None;

        for addr in self.resolve()? {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    // Set TCP_NODELAY so short commands are not held back
                    stream.set_nodelay(true)?;
                    stream.set_read_timeout(self.read_timeout)?;
                    tracing::info!(%addr, "connected");
                    return Ok(stream);
                }
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "connect attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(match last_err {
            Some(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                TransportError::Timeout(self.connect_timeout)
            }
            Some(e) => TransportError::ConnectionFailed(e.to_string()),
            None => TransportError::ConnectionFailed(format!("{}:{}", self.host, self.port)),
        })
    }
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self::new("localhost", 23)
    }
}
