//! Serial port stream

use super::{ExpectStream, TransportError};
use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io;
use std::time::Duration;

/// Serial port flow control type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialFlowControl {
    /// No flow control
    #[default]
    None,
    /// Hardware flow control (RTS/CTS)
    Hardware,
    /// Software flow control (XON/XOFF)
    Software,
}

/// Serial port parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    /// No parity
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

/// Serial port configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port name (e.g., COM3, /dev/ttyUSB0)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8)
    pub data_bits: u8,
    /// Stop bits (1, 2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Flow control
    pub flow_control: SerialFlowControl,
    /// Read timeout
    pub timeout: Duration,
}

impl SerialConfig {
    /// Create a new serial configuration with 8N1 and a one second timeout
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: SerialFlowControl::None,
            timeout: Duration::from_secs(1),
        }
    }

    /// Set parity
    #[must_use]
    pub fn parity(mut self, parity: SerialParity) -> Self {
        self.parity = parity;
        self
    }

    /// Set flow control
    #[must_use]
    pub fn flow_control(mut self, flow: SerialFlowControl) -> Self {
        self.flow_control = flow;
        self
    }

    /// Set read timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Open the port.
    pub fn open(&self) -> Result<Box<dyn SerialPort>, TransportError> {
        let data_bits = match self.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            8 => DataBits::Eight,
            other => {
                return Err(TransportError::InvalidConfiguration(format!(
                    "unsupported data bits: {other}"
                )))
            }
        };

        let stop_bits = match self.stop_bits {
            1 => StopBits::One,
            2 => StopBits::Two,
            other => {
                return Err(TransportError::InvalidConfiguration(format!(
                    "unsupported stop bits: {other}"
                )))
            }
        };

        let parity = match self.parity {
            SerialParity::Odd => Parity::Odd,
            SerialParity::Even => Parity::Even,
            SerialParity::None => Parity::None,
        };

        let flow_control = match self.flow_control {
            SerialFlowControl::Hardware => FlowControl::Hardware,
            SerialFlowControl::Software => FlowControl::Software,
            SerialFlowControl::None => FlowControl::None,
        };

        let port = serialport::new(&self.port, self.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .flow_control(flow_control)
            .timeout(self.timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => TransportError::PortNotFound(self.port.clone()),
                serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied) => {
                    TransportError::PermissionDenied(self.port.clone())
                }
                _ => TransportError::ConnectionFailed(e.to_string()),
            })?;

        tracing::info!(port = %self.port, baud = self.baud_rate, "serial port opened");
        Ok(port)
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        #[cfg(windows)]
        let port = "COM1";
        #[cfg(not(windows))]
        let port = "/dev/ttyUSB0";

        Self::new(port, 115_200)
    }
}

// A serial port always carries a finite timeout, so `read_timeout` never
// reports `None`.
impl ExpectStream for dyn SerialPort {
    fn read_timeout(&self) -> io::Result<Option<Duration>> {
        Ok(Some(self.timeout()))
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        let timeout = timeout.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "serial ports require a finite read timeout",
            )
        })?;
        self.set_timeout(timeout).map_err(io::Error::from)
    }
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>, TransportError> {
    serialport::available_ports().map_err(|e| TransportError::IoError(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_8n1() {
        let cfg = SerialConfig::new("/dev/ttyACM0", 9600);
        assert_eq!(cfg.data_bits, 8);
        assert_eq!(cfg.stop_bits, 1);
        assert_eq!(cfg.parity, SerialParity::None);
        assert_eq!(cfg.timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_data_bits_rejected_before_open() {
        let mut cfg = SerialConfig::new("/dev/does-not-exist", 9600);
        cfg.data_bits = 9;
        assert!(matches!(
            cfg.open(),
            Err(TransportError::InvalidConfiguration(_))
        ));
    }
}
