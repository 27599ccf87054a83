use core::fmt;
use core::result::Result as CoreResult;
use std::io::Error as IoError;

use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use toml::de::Error as TomlError;

/// Result type for core operations.
pub type Result<T> = CoreResult<T, Error>;

/// Errors that can occur in the core library.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization or deserialization failed.
    #[error("JSON serialization error: {0}")]
    Json(#[from] SerdeJsonError),

    /// TOML deserialization failed.
    #[error("TOML deserialization error: {0}")]
    Toml(#[from] TomlError),

    /// Configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Required API key was not found.
    #[error("API key not found: {0}")]
    MissingApiKey(String),

    /// The evaluator reply could not be interpreted as a verdict.
    #[error("Malformed verdict: {0}")]
    MalformedVerdict(String),

    /// A general error not covered by other variants.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Propagation category, for errors that belong to the failure taxonomy.
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Self::MissingApiKey(_) => Some(ErrorCategory::NotConfigured),
            Self::MalformedVerdict(_) => Some(ErrorCategory::MalformedVerdict),
            _ => None,
        }
    }
}

/// Classification of a failed model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No credential or client is configured; the gateway is disabled.
    NotConfigured,
    /// The endpoint could not be reached.
    ConnectionError,
    /// The endpoint rejected the credential.
    AuthenticationError,
    /// The endpoint is throttling requests.
    RateLimited,
    /// Any other non-success response from the endpoint.
    GenericApiError,
    /// The request timed out in transport.
    Timeout,
    /// The endpoint answered but produced no content.
    EmptyResponse,
    /// Anything else, including undecodable responses.
    Unexpected,
}

/// Coarse error taxonomy used for propagation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Missing credential or configuration; fatal for the whole gateway.
    NotConfigured,
    /// Connection or timeout problems; a new call may succeed.
    Transport,
    /// The remote side refused the request.
    RemoteRejection,
    /// External content could not be fetched.
    ContentUnavailable,
    /// The evaluator output could not be interpreted.
    MalformedVerdict,
}

impl ErrorCategory {
    /// Stable snake-case name, as used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::Transport => "transport",
            Self::RemoteRejection => "remote_rejection",
            Self::ContentUnavailable => "content_unavailable",
            Self::MalformedVerdict => "malformed_verdict",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FailureKind {
    /// Maps this failure onto the propagation taxonomy.
    pub fn category(self) -> ErrorCategory {
        match self {
            Self::NotConfigured => ErrorCategory::NotConfigured,
            Self::ConnectionError | Self::Timeout => ErrorCategory::Transport,
            Self::AuthenticationError
            | Self::RateLimited
            | Self::GenericApiError
            | Self::EmptyResponse
            | Self::Unexpected => ErrorCategory::RemoteRejection,
        }
    }

    /// Stable snake-case name, as used in logs and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::ConnectionError => "connection_error",
            Self::AuthenticationError => "authentication_error",
            Self::RateLimited => "rate_limited",
            Self::GenericApiError => "generic_api_error",
            Self::Timeout => "timeout",
            Self::EmptyResponse => "empty_response",
            Self::Unexpected => "unexpected",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Uniform failure outcome of a model call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {detail}")]
pub struct CallFailure {
    /// What went wrong.
    pub kind: FailureKind,
    /// Human readable detail from the transport or endpoint.
    pub detail: String,
}

impl CallFailure {
    /// Creates a failure of the given kind.
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Failure returned by every call of an unconfigured gateway.
    pub fn not_configured() -> Self {
        Self::new(
            FailureKind::NotConfigured,
            "model gateway has no client; credential missing",
        )
    }

    /// Classifies an HTTP status code returned by the endpoint.
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = match status {
            401 | 403 => FailureKind::AuthenticationError,
            429 => FailureKind::RateLimited,
            _ => FailureKind::GenericApiError,
        };
        Self::new(kind, format!("endpoint returned status {status}: {body}"))
    }
}

/// Reasons a content fetch can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FetchError {
    /// The server answered with a non-success status.
    #[error("HTTP status {code} {reason}")]
    Status {
        /// Numeric status code.
        code: u16,
        /// Canonical reason phrase, if known.
        reason: String,
    },

    /// The request exceeded the fetcher's timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection, DNS or other network level failure.
    #[error("network error: {0}")]
    Network(String),

    /// Any other failure (invalid URL, unreadable body, ...).
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Every fetch problem degrades into a note in the prompt.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Status { .. } | Self::Timeout | Self::Network(_) | Self::Other(_) => {
                ErrorCategory::ContentUnavailable
            }
        }
    }
}
