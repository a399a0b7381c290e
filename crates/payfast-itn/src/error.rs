use serde::Serialize;
use thiserror::Error;

use crate::pipeline::Stage;

/// Broad failure category, used to tell a forged notification apart from one
/// that could not be checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Wrong method, missing signature, unreadable body.
    Protocol,
    /// Signature, origin or gateway confirmation did not check out.
    Authenticity,
    /// Payment data does not match what the merchant expects.
    Integrity,
    /// DNS or network trouble; the notification may still be genuine.
    Infrastructure,
    /// Caller-side misconfiguration, raised at construction time.
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Protocol => "protocol",
            ErrorKind::Authenticity => "authenticity",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Infrastructure => "infrastructure",
            ErrorKind::Config => "config",
        }
    }
}

/// Errors returned by ITN intake, validation and request construction.
#[derive(Debug, Error)]
pub enum ItnError {
    #[error("unsupported request method: {0}")]
    MethodNotAllowed(String),

    #[error("notification carries no signature")]
    MissingSignature,

    #[error("malformed notification body: {0}")]
    MalformedBody(String),

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("notification has no origin header")]
    MissingOrigin,

    #[error("untrusted origin: {0}")]
    UntrustedOrigin(String),

    #[error("no trusted gateway addresses resolved")]
    NoTrustedAddresses,

    #[error("gateway did not confirm notification: {0}")]
    ConfirmationRejected(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("amount mismatch: expected {expected:.2}, received {received:.2}")]
    AmountMismatch { expected: f64, received: f64 },

    #[error("dns resolution failed: {0}")]
    DnsResolution(String),

    #[error("{0} stage timed out")]
    Timeout(Stage),

    #[error("confirmation request failed: {0}")]
    Confirmation(String),

    #[error("config error: {0}")]
    ConfigError(String),
}

impl ItnError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ItnError::MethodNotAllowed(_) | ItnError::MissingSignature | ItnError::MalformedBody(_) => {
                ErrorKind::Protocol
            }
            ItnError::SignatureMismatch
            | ItnError::MissingOrigin
            | ItnError::UntrustedOrigin(_)
            | ItnError::NoTrustedAddresses
            | ItnError::ConfirmationRejected(_) => ErrorKind::Authenticity,
            ItnError::MissingField(_)
            | ItnError::InvalidAmount(_)
            | ItnError::AmountMismatch { .. } => ErrorKind::Integrity,
            ItnError::DnsResolution(_) | ItnError::Timeout(_) | ItnError::Confirmation(_) => {
                ErrorKind::Infrastructure
            }
            ItnError::ConfigError(_) => ErrorKind::Config,
        }
    }

    /// True when the failure says nothing about the notification itself and
    /// the check is worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Infrastructure
    }
}
