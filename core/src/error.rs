//! Error types and HTTP response mapping
//!
//! Every failure carries its full internal detail for logging. Callers only
//! ever see the coarse `error_key()` and `public_message()`.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, ApiError>;

/// Why the verifier refused an inbound credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Not a three-segment JWT, or a segment failed to decode
    Malformed,
    /// `alg: none` or an empty signature segment
    Unsigned,
    /// No signing key matches the token's `kid`
    UnknownKey,
    /// Signature did not verify, or the algorithm/key is not acceptable
    Signature,
    Issuer,
    Audience,
    Expired,
    NotYetValid,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Unsigned => "unsigned",
            Self::UnknownKey => "unknown_key",
            Self::Signature => "signature",
            Self::Issuer => "issuer",
            Self::Audience => "audience",
            Self::Expired => "expiry",
            Self::NotYetValid => "not_before",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gateway error with HTTP status code mapping
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("missing Authorization header")]
    MissingCredential,

    #[error("Authorization header must use Bearer scheme")]
    MalformedScheme,

    #[error("discovery unavailable: {message}")]
    DiscoveryUnavailable { message: String },

    #[error("token rejected: {0}")]
    Rejected(RejectReason),

    #[error("exchange denied by provider ({code}): {description}")]
    ExchangeDenied { code: String, description: String },

    #[error("transient upstream failure: {message}")]
    Transient { message: String },

    #[error("exchange failed ({code}): {description}")]
    ExchangeFailed { code: String, description: String },

    #[error("misconfigured: {message}")]
    Misconfigured { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ApiError {
    pub fn discovery_unavailable(message: impl Into<String>) -> Self {
        Self::DiscoveryUnavailable {
            message: message.into(),
        }
    }

    pub fn exchange_denied(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self::ExchangeDenied {
            code: code.into(),
            description: description.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn exchange_failed(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self::ExchangeFailed {
            code: code.into(),
            description: description.into(),
        }
    }

    pub fn misconfigured(message: impl Into<String>) -> Self {
        Self::Misconfigured {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True for failures the caller can fix by presenting a different credential
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential | Self::MalformedScheme | Self::Rejected(_)
        )
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        if self.is_credential_failure() {
            401
        } else {
            400
        }
    }

    /// Get the client-facing error key for this error
    pub fn error_key(&self) -> &'static str {
        if self.is_credential_failure() {
            "unauthorized"
        } else {
            "bad_request"
        }
    }

    /// Generic message shown to the caller; never includes validation internals
    pub fn public_message(&self) -> &'static str {
        if self.is_credential_failure() {
            "the bearer credential was missing or could not be validated"
        } else {
            "the token exchange could not be completed"
        }
    }

    /// Internal reason tag for structured logs
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::MalformedScheme => "malformed_scheme",
            Self::DiscoveryUnavailable { .. } => "discovery_unavailable",
            Self::Rejected(reason) => reason.as_str(),
            Self::ExchangeDenied { .. } => "exchange_denied",
            Self::Transient { .. } => "transient",
            Self::ExchangeFailed { .. } => "exchange_failed",
            Self::Misconfigured { .. } => "misconfigured",
            Self::Internal { .. } => "internal_error",
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl From<&ApiError> for ErrorResponse {
    fn from(err: &ApiError) -> Self {
        Self {
            error: err.error_key().to_string(),
            message: err.public_message().to_string(),
        }
    }
}
