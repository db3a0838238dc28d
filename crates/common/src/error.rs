//! Error types for the fan-out pipeline.
//!
//! Every fallible operation returns an [`error_stack::Report`] whose current
//! context is one of the enums below, so callers can both match on the kind
//! of failure and print the full chain of attached context.

use derive_more::Display;

/// Request-level failures raised while fanning a request out to bidders.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum FanoutError {
    /// An extension block or policy payload failed to decode.
    #[display("Malformed input: {message}")]
    MalformedInput { message: String },

    /// The request declares something that cannot be attributed unambiguously,
    /// e.g. two supply chains for the same bidder.
    #[display("Ambiguous configuration: {message}")]
    AmbiguousConfiguration { message: String },

    /// An opt-out or consent payload is unknown or internally inconsistent.
    #[display("Policy validation error: {message}")]
    PolicyValidation { message: String },

    /// Settings could not be loaded or failed validation.
    #[display("Configuration error: {message}")]
    Configuration { message: String },

    /// The HTTP client failed to deliver a bidder request.
    #[display("Transport error: {message}")]
    Transport { message: String },
}

impl core::error::Error for FanoutError {}

impl FanoutError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedInput {
            message: message.into(),
        }
    }

    pub fn policy(message: impl Into<String>) -> Self {
        Self::PolicyValidation {
            message: message.into(),
        }
    }
}

/// Failures reported by bidder adapters.
///
/// `BadInput` is a caller fault (malformed bidder parameters) and is never
/// worth retrying. `BadServerResponse` is an upstream fault.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[display("Bad input: {message}")]
    BadInput { message: String },

    #[display("Bad server response: {message}")]
    BadServerResponse { message: String },

    #[display("Bidder {bidder} timed out after {timeout_ms}ms")]
    Timeout { bidder: String, timeout_ms: u32 },
}

impl core::error::Error for AdapterError {}

impl AdapterError {
    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::BadInput {
            message: message.into(),
        }
    }

    pub fn bad_server_response(message: impl Into<String>) -> Self {
        Self::BadServerResponse {
            message: message.into(),
        }
    }

    /// Whether the failure was caused by the caller's input.
    #[must_use]
    pub fn is_client_fault(&self) -> bool {
        matches!(self, Self::BadInput { .. })
    }
}
