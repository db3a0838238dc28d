//! CLI error types.

use std::fmt;

#[derive(Debug)]
pub enum CliError {
    /// Configuration file error
    Config(String),
    /// Bid request file error
    Request(String),
    /// Fan-out pipeline error
    Fanout(String),
    /// IO error
    Io(std::io::Error),
    /// JSON error
    Json(serde_json::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {msg}"),
            CliError::Request(msg) => write!(f, "Request error: {msg}"),
            CliError::Fanout(msg) => write!(f, "Fan-out error: {msg}"),
            CliError::Io(err) => write!(f, "IO error: {err}"),
            CliError::Json(err) => write!(f, "JSON error: {err}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Io(err) => Some(err),
            CliError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io(err)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Json(err)
    }
}
