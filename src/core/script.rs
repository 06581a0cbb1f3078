//! Exchange scripts
//!
//! A script is a list of steps run against a [`Scanner`]: send a command,
//! wait for a response pattern, check what came back. Scripts are written
//! in TOML:
//!
//! ```toml
//! name = "board id"
//!
//! [[steps]]
//! action = "send_line"
//! data = "ID"
//!
//! [[steps]]
//! action = "expect"
//! pattern = 'Serial Number.*\n'
//!
//! [[steps]]
//! action = "check"
//! buffer = "before"
//! pattern = 'uC ECC ReBoots : 0\r\n'
//! ```

use super::scanner::{ExpectError, Pattern, Scanner};
use super::transport::ExpectStream;
use crate::utils::{escape_bytes, unescape};
use regex::bytes::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Which scanner buffer a check looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferSel {
    /// Bytes ahead of the last match
    Before,
    /// The last match and what followed
    After,
    /// `before` followed by `after`
    #[default]
    Both,
}

impl fmt::Display for BufferSel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Before => write!(f, "before"),
            Self::After => write!(f, "after"),
            Self::Both => write!(f, "before+after"),
        }
    }
}

/// One script step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Send bytes as-is (escapes decoded)
    Send {
        /// Payload
        data: String,
    },
    /// Send bytes followed by the scanner's terminator
    SendLine {
        /// Payload
        data: String,
    },
    /// Wait for a pattern
    Expect {
        /// Regular expression
        pattern: String,
    },
    /// Change the stream's read timeout
    SetTimeout {
        /// New timeout in seconds
        secs: f64,
    },
    /// Drop everything buffered
    Clear,
    /// Assert that a pattern is (or is not) present in a buffer
    Check {
        /// Buffer to search
        #[serde(default)]
        buffer: BufferSel,
        /// Regular expression
        pattern: String,
        /// Pass when the pattern is absent instead
        #[serde(default)]
        absent: bool,
    },
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send { data } => write!(f, "send {data:?}"),
            Self::SendLine { data } => write!(f, "send_line {data:?}"),
            Self::Expect { pattern } => write!(f, "expect {pattern:?}"),
            Self::SetTimeout { secs } => write!(f, "set_timeout {secs}s"),
            Self::Clear => write!(f, "clear"),
            Self::Check {
                buffer,
                pattern,
                absent,
            } => {
                let verb = if *absent { "lacks" } else { "has" };
                write!(f, "check {buffer} {verb} {pattern:?}")
            }
        }
    }
}

/// Script errors
#[derive(Error, Debug)]
pub enum ScriptError {
    /// Script file could not be read
    #[error("cannot read script: {0}")]
    Io(#[from] std::io::Error),

    /// Script file is not valid
    #[error("script parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A step's data or pattern is malformed
    #[error("step {step}: {message}")]
    Invalid {
        /// Zero-based step index
        step: usize,
        /// What is wrong
        message: String,
    },

    /// Send or expect failed
    #[error("step {step} ({action}): {source}")]
    Expect {
        /// Zero-based step index
        step: usize,
        /// Step description
        action: String,
        /// Scanner error
        source: ExpectError,
    },

    /// A check did not hold
    #[error("step {step}: check failed, {buffer} {} {pattern:?}: \"{}\"", failed_verb(.absent), escape_bytes(.content))]
    Check {
        /// Zero-based step index
        step: usize,
        /// Buffer that was searched
        buffer: BufferSel,
        /// Pattern that was (not) found
        pattern: String,
        /// Whether absence was required
        absent: bool,
        /// Buffer contents at the time
        content: Vec<u8>,
    },
}

fn failed_verb(absent: &bool) -> &'static str {
    if *absent {
        "contains"
    } else {
        "lacks"
    }
}

impl ScriptError {
    /// True when the failure is a check, not a transport or pattern problem
    pub fn is_check(&self) -> bool {
        matches!(self, Self::Check { .. })
    }

    /// The underlying scanner error, if any
    pub fn expect_error(&self) -> Option<&ExpectError> {
        match self {
            Self::Expect { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Capture of one successful `expect` step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    /// Zero-based step index
    pub step: usize,
    /// Pattern that matched
    pub pattern: String,
    /// `before` after the match
    pub before: Vec<u8>,
    /// `after` after the match
    pub after: Vec<u8>,
}

/// Result of a completed script run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptReport {
    /// One record per `expect` step
    pub records: Vec<StepRecord>,
    /// Number of steps executed
    pub steps_run: usize,
    /// Number of checks that passed
    pub checks_passed: usize,
}

/// A parsed exchange script
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Steps in order
    #[serde(default)]
    pub steps: Vec<Step>,
}

enum Prepared {
    Send(Vec<u8>),
    SendLine(Vec<u8>),
    Expect(Regex),
    SetTimeout(Duration),
    Clear,
    Check {
        buffer: BufferSel,
        regex: Regex,
        absent: bool,
    },
}

impl Script {
    /// Parse TOML text
    pub fn parse(text: &str) -> Result<Self, ScriptError> {
        let script: Self = toml::from_str(text)?;
        script.prepare()?;
        Ok(script)
    }

    /// Load from a file
    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let text = std::fs::read_to_string(path)?;
        let mut script = Self::parse(&text)?;
        if script.name.is_empty() {
            script.name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        Ok(script)
    }

    // Decodes payloads and compiles patterns up front so a typo fails before
    // anything is sent.
    fn prepare(&self) -> Result<Vec<Prepared>, ScriptError> {
        let invalid = |step: usize, message: String| ScriptError::Invalid { step, message };
        let compile = |step: usize, pattern: &str| {
            Pattern::compile(pattern).map_err(|e| invalid(step, e.to_string()))
        };

        self.steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                Ok(match step {
                    Step::Send { data } => Prepared::Send(unescape(data).map_err(|e| invalid(i, e))?),
                    Step::SendLine { data } => {
                        Prepared::SendLine(unescape(data).map_err(|e| invalid(i, e))?)
                    }
                    Step::Expect { pattern } => Prepared::Expect(compile(i, pattern)?),
                    Step::SetTimeout { secs } => Prepared::SetTimeout(
                        Duration::try_from_secs_f64(*secs)
                            .ok()
                            .filter(|d| !d.is_zero())
                            .ok_or_else(|| invalid(i, format!("timeout must be positive, got {secs}")))?,
                    ),
                    Step::Clear => Prepared::Clear,
                    Step::Check {
                        buffer,
                        pattern,
                        absent,
                    } => Prepared::Check {
                        buffer: *buffer,
                        regex: compile(i, pattern)?,
                        absent: *absent,
                    },
                })
            })
            .collect()
    }

    /// Run every step against `scanner`, stopping at the first failure.
    pub fn run<S: ExpectStream>(&self, scanner: &mut Scanner<S>) -> Result<ScriptReport, ScriptError> {
        let prepared = self.prepare()?;
        let mut report = ScriptReport::default();
        info!(script = %self.name, steps = prepared.len(), "running script");

        for (i, (step, action)) in self.steps.iter().zip(prepared).enumerate() {
            debug!(step = i, %step, "script step");
            let wrap = |source: ExpectError| ScriptError::Expect {
                step: i,
                action: step.to_string(),
                source,
            };

            match action {
                Prepared::Send(data) => scanner.send(&data).map_err(wrap)?,
                Prepared::SendLine(data) => scanner.send_line(&data).map_err(wrap)?,
                Prepared::Expect(regex) => {
                    scanner.expect(&regex).map_err(wrap)?;
                    report.records.push(StepRecord {
                        step: i,
                        pattern: regex.as_str().to_string(),
                        before: scanner.before().to_vec(),
                        after: scanner.after().to_vec(),
                    });
                }
                Prepared::SetTimeout(timeout) => scanner
                    .set_timeout(timeout)
                    .map_err(|e| wrap(ExpectError::Io(e)))?,
                Prepared::Clear => scanner.clear(),
                Prepared::Check {
                    buffer,
                    regex,
                    absent,
                } => {
                    let content = match buffer {
                        BufferSel::Before => scanner.before().to_vec(),
                        BufferSel::After => scanner.after().to_vec(),
                        BufferSel::Both => [scanner.before(), scanner.after()].concat(),
                    };
                    if regex.is_match(&content) == absent {
                        return Err(ScriptError::Check {
                            step: i,
                            buffer,
                            pattern: regex.as_str().to_string(),
                            absent,
                            content,
                        });
                    }
                    report.checks_passed += 1;
                }
            }
            report.steps_run += 1;
        }

        info!(
            script = %self.name,
            steps = report.steps_run,
            checks = report.checks_passed,
            "script passed"
        );
        Ok(report)
    }
}
