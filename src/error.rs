//! Error types for hypersig.
//!
//! All errors are strongly typed using thiserror. Nothing in this crate is
//! fatal to the process: failures are either reported to the immediate
//! caller or degraded to "drop and log" by the component that observed them.

use thiserror::Error;

/// Validation errors that occur during input validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("IRIs of registered namespaces must be absolute. Invalid namespace: {identifier}")]
    InvalidIdentifier {
        identifier: String,
    },

    #[error("Namespace prefix cannot be empty")]
    EmptyPrefix,

    #[error("Namespace prefix must not contain ':' or whitespace: {prefix}")]
    InvalidPrefix {
        prefix: String,
    },

    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Invalid property update literal: {literal}")]
    InvalidPropertyUpdate {
        literal: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Execution errors that occur while resolving, filtering or routing.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Unknown action: {action}")]
    UnknownSignifier {
        action: String,
    },

    #[error("Constraint validation failed: {reason}")]
    ValidationFailure {
        reason: String,
    },

    #[error("Delivery to consumer {consumer} failed: {reason}")]
    DeliveryFailure {
        consumer: String,
        reason: String,
    },

    #[error("Subscribe handshake for topic {topic} via {source_iri} failed: {reason}")]
    SubscribeHandshakeFailure {
        topic: String,
        source_iri: String,
        reason: String,
    },

    #[error("Unable to retrieve profile {url}: {reason}")]
    ProfileUnavailable {
        url: String,
        reason: String,
    },

    #[error("Channel disconnected: {path}")]
    Disconnected {
        path: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Poisoned lock: {context}")]
    Poisoned {
        context: String,
    },
}

/// Transport errors for the HTTP push channel.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request failed: {message}")]
    RequestFailed {
        message: String,
    },

    #[error("Unexpected response status {status}")]
    UnexpectedStatus {
        status: u16,
    },

    #[error("Link headers are missing! See the W3C WebSub Recommendation for details.")]
    MissingSelfLink,
}

/// Top-level error type for hypersig.
#[derive(Debug, Error)]
pub enum HyperError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl HyperError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a poisoned-lock error for the given context.
    #[must_use]
    pub fn poisoned(context: &str) -> Self {
        Self::Execution(ExecutionError::Poisoned {
            context: context.to_string(),
        })
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is a transport error.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns true if this error is retryable.
    ///
    /// Handshake failures are reported as retryable even though the router
    /// itself never retries them.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Internal { .. } => false,
            Self::Execution(e) => matches!(
                e,
                ExecutionError::Timeout { .. }
                    | ExecutionError::SubscribeHandshakeFailure { .. }
                    | ExecutionError::ProfileUnavailable { .. }
            ),
            Self::Transport(e) => match e {
                TransportError::RequestFailed { .. } => true,
                TransportError::UnexpectedStatus { status } => *status >= 500,
                TransportError::MissingSelfLink => false,
            },
        }
    }
}

/// Result type alias for hypersig operations.
pub type HyperResult<T> = Result<T, HyperError>;
