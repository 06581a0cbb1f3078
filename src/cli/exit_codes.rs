//! CLI Exit Codes
//!
//! Standard exit codes for CLI operations and automation.

use crate::config::ConfigError;
use crate::core::scanner::ExpectError;
use crate::core::script::ScriptError;
use crate::core::transport::TransportError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Connection failed
    pub const CONNECTION_FAILED: u8 = 3;

    /// Pattern not seen before the read timeout
    pub const TIMEOUT: u8 = 4;

    /// File not found
    pub const FILE_NOT_FOUND: u8 = 6;

    /// Permission denied
    pub const PERMISSION_DENIED: u8 = 7;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// Port not found
    pub const PORT_NOT_FOUND: u8 = 14;

    /// Script error
    pub const SCRIPT_ERROR: u8 = 15;

    /// Stream ended before the pattern was seen
    pub const PATTERN_NOT_FOUND: u8 = 16;

    /// Script check failed
    pub const VALIDATION_FAILED: u8 = 17;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Error with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) | Self::Error(_, msg) => Some(msg),
            Self::Success(None) => None,
        }
    }

    /// Convert to `ExitCode`
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

fn io_code(err: &std::io::Error) -> u8 {
    use std::io::ErrorKind;

    match err.kind() {
        ErrorKind::NotFound => ExitCodes::FILE_NOT_FOUND,
        ErrorKind::PermissionDenied => ExitCodes::PERMISSION_DENIED,
        ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset => ExitCodes::CONNECTION_FAILED,
        ErrorKind::TimedOut | ErrorKind::WouldBlock => ExitCodes::TIMEOUT,
        _ => ExitCodes::ERROR,
    }
}

fn expect_code(err: &ExpectError) -> u8 {
    match err {
        ExpectError::Timeout { .. } => ExitCodes::TIMEOUT,
        ExpectError::StreamEnded { .. } => ExitCodes::PATTERN_NOT_FOUND,
        ExpectError::InvalidPattern(_) => ExitCodes::INVALID_ARGS,
        ExpectError::Config(_) => ExitCodes::CONFIG_ERROR,
        ExpectError::Io(e) => io_code(e),
    }
}

fn transport_code(err: &TransportError) -> u8 {
    match err {
        TransportError::PortNotFound(_) => ExitCodes::PORT_NOT_FOUND,
        TransportError::PermissionDenied(_) => ExitCodes::PERMISSION_DENIED,
        TransportError::InvalidConfiguration(_) => ExitCodes::INVALID_ARGS,
        _ => ExitCodes::CONNECTION_FAILED,
    }
}

fn script_code(err: &ScriptError) -> u8 {
    match err {
        ScriptError::Check { .. } => ExitCodes::VALIDATION_FAILED,
        ScriptError::Expect { source, .. } => expect_code(source),
        ScriptError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ExitCodes::FILE_NOT_FOUND,
        _ => ExitCodes::SCRIPT_ERROR,
    }
}

/// Exit code for one error of a source chain, if it is one of ours
///
/// Walk `anyhow::Error::chain()` with this to classify wrapped errors.
pub fn exit_code_for(err: &(dyn std::error::Error + 'static)) -> Option<u8> {
    if let Some(e) = err.downcast_ref::<ScriptError>() {
        Some(script_code(e))
    } else if let Some(e) = err.downcast_ref::<ExpectError>() {
        Some(expect_code(e))
    } else if let Some(e) = err.downcast_ref::<TransportError>() {
        Some(transport_code(e))
    } else if err.is::<ConfigError>() {
        Some(ExitCodes::CONFIG_ERROR)
    } else {
        err.downcast_ref::<std::io::Error>().map(io_code)
    }
}

impl From<std::io::Error> for CliResult {
    fn from(err: std::io::Error) -> Self {
        Self::Error(io_code(&err), err.to_string())
    }
}

impl From<ExpectError> for CliResult {
    fn from(err: ExpectError) -> Self {
        Self::Error(expect_code(&err), err.to_string())
    }
}

impl From<TransportError> for CliResult {
    fn from(err: TransportError) -> Self {
        Self::Error(transport_code(&err), err.to_string())
    }
}

impl From<ConfigError> for CliResult {
    fn from(err: ConfigError) -> Self {
        Self::Error(ExitCodes::CONFIG_ERROR, err.to_string())
    }
}

impl From<ScriptError> for CliResult {
    fn from(err: ScriptError) -> Self {
        Self::Error(script_code(&err), err.to_string())
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error",
        2 => "Invalid arguments",
        3 => "Connection failed",
        4 => "Timed out waiting for pattern",
        6 => "File not found",
        7 => "Permission denied",
        8 => "Configuration error",
        14 => "Port not found",
        15 => "Script error",
        16 => "Stream ended before pattern",
        17 => "Check failed",
        _ => "Unknown error",
    }
}

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for code in [0, 1, 2, 3, 4, 6, 7, 8, 14, 15, 16, 17] {
        println!("  {:>3}  {}", code, exit_code_description(code));
    }
}
