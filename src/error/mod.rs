//! Error types for the tool bridge.
//!
//! [`CapabilityError`] covers everything that can go wrong for one provider
//! or one capability call. Those errors are values handed back to the caller
//! (or recorded on a session), never a reason to abort work on other
//! providers. [`BridgeError`] covers the manager itself: lifecycle misuse,
//! configuration files and serialization.

use std::fmt;

use strum::Display;
use thiserror::Error;

/// Coarse classification of a [`CapabilityError`], used as a logging field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    Handshake,
    Discovery,
    Validation,
    InvocationTimeout,
    Invocation,
    TransportBroken,
    NotReady,
    Cancelled,
}

/// A single reason why caller-supplied arguments were rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    /// The arguments were not a JSON object (or a string holding one).
    NotAnObject { actual: &'static str },
    /// A string argument payload could not be parsed as JSON.
    MalformedJson { message: String },
    /// A key that the schema does not declare.
    UnknownField { path: String },
    /// A required key was not supplied.
    MissingRequired { path: String },
    /// A value of the wrong JSON type.
    TypeMismatch {
        path: String,
        expected: String,
        actual: &'static str,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject { actual } => {
                write!(f, "expected object arguments, got {actual}")
            }
            Self::MalformedJson { message } => {
                write!(f, "arguments must be valid JSON: {message}")
            }
            Self::UnknownField { path } => write!(f, "unknown field '{path}'"),
            Self::MissingRequired { path } => write!(f, "missing required field '{path}'"),
            Self::TypeMismatch {
                path,
                expected,
                actual,
            } => write!(f, "field '{path}' expected type '{expected}', got {actual}"),
        }
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Per-provider and per-call failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("Connection error: {provider} — {message}")]
    Connection { provider: String, message: String },

    #[error("Handshake error: {provider} — {message}")]
    Handshake { provider: String, message: String },

    #[error("Discovery error: {provider} — {message}")]
    Discovery { provider: String, message: String },

    #[error("Invalid arguments for {capability}: {}", join_issues(.issues))]
    Validation {
        capability: String,
        issues: Vec<ValidationIssue>,
    },

    #[error("Invocation of {capability} timed out after {timeout_ms}ms")]
    InvocationTimeout { capability: String, timeout_ms: u64 },

    #[error("Capability {capability} failed: {message}")]
    Invocation { capability: String, message: String },

    #[error("Transport broken: {provider} — {message}")]
    TransportBroken { provider: String, message: String },

    #[error("Provider {provider} is not ready (state: {state})")]
    NotReady { provider: String, state: String },

    #[error("Invocation of {capability} was cancelled")]
    Cancelled { capability: String },
}

impl CapabilityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Handshake { .. } => ErrorKind::Handshake,
            Self::Discovery { .. } => ErrorKind::Discovery,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::InvocationTimeout { .. } => ErrorKind::InvocationTimeout,
            Self::Invocation { .. } => ErrorKind::Invocation,
            Self::TransportBroken { .. } => ErrorKind::TransportBroken,
            Self::NotReady { .. } => ErrorKind::NotReady,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// The caller supplied bad arguments and may retry with corrected ones.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// The same call may succeed if simply tried again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvocationTimeout { .. } | Self::Cancelled { .. }
        )
    }

    /// The provider connection can no longer be used.
    pub fn breaks_session(&self) -> bool {
        matches!(self, Self::TransportBroken { .. })
    }

    /// Rename the capability a per-call error refers to.
    pub(crate) fn for_capability(self, name: &str) -> Self {
        let capability = name.to_owned();
        match self {
            Self::Validation { issues, .. } => Self::Validation { capability, issues },
            Self::InvocationTimeout { timeout_ms, .. } => Self::InvocationTimeout {
                capability,
                timeout_ms,
            },
            Self::Invocation { message, .. } => Self::Invocation {
                capability,
                message,
            },
            Self::Cancelled { .. } => Self::Cancelled { capability },
            other => other,
        }
    }

    pub(crate) fn connection(provider: &str, message: impl Into<String>) -> Self {
        Self::Connection {
            provider: provider.to_owned(),
            message: message.into(),
        }
    }

    pub(crate) fn handshake(provider: &str, message: impl Into<String>) -> Self {
        Self::Handshake {
            provider: provider.to_owned(),
            message: message.into(),
        }
    }

    pub(crate) fn discovery(provider: &str, message: impl Into<String>) -> Self {
        Self::Discovery {
            provider: provider.to_owned(),
            message: message.into(),
        }
    }

    pub(crate) fn invocation(capability: &str, message: impl Into<String>) -> Self {
        Self::Invocation {
            capability: capability.to_owned(),
            message: message.into(),
        }
    }

    pub(crate) fn transport_broken(provider: &str, message: impl Into<String>) -> Self {
        Self::TransportBroken {
            provider: provider.to_owned(),
            message: message.into(),
        }
    }
}

/// Errors raised by the manager itself rather than by one provider.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Capability(#[from] CapabilityError),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, BridgeError>;
