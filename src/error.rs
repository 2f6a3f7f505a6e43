//! Error handling for the registry push client

use std::fmt;

/// Phases a blob upload or manifest publish can fail at, named per-step so
/// a composite push failure can say exactly where it broke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Head,
    OpenSession,
    ChunkAt(u64),
    Finalize,
    ManifestPut,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Head => write!(f, "head"),
            Phase::OpenSession => write!(f, "open-session"),
            Phase::ChunkAt(offset) => write!(f, "chunk@{}", offset),
            Phase::Finalize => write!(f, "finalize"),
            Phase::ManifestPut => write!(f, "manifest-put"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum PusherError {
    InvalidImageTar(String),
    TarReadError(String),
    RegistryUnreachable(String),
    RegistryProtocolError { status: u16, snippet: String },
    NotFound(String),
    DigestMismatch { expected: String, got: String },
    DeletionDisabled,
    NoOriginalTag,
    UploadFailed { digest: String, phase: Phase, cause: String },
    Timeout(String),
    Validation(String),
    Cancelled,
}

impl fmt::Display for PusherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PusherError::InvalidImageTar(detail) => write!(f, "invalid image tar: {}", detail),
            PusherError::TarReadError(cause) => write!(f, "tar read error: {}", cause),
            PusherError::RegistryUnreachable(cause) => write!(f, "registry unreachable: {}", cause),
            PusherError::RegistryProtocolError { status, snippet } => {
                write!(f, "registry protocol error (status {}): {}", status, snippet)
            }
            PusherError::NotFound(reference) => write!(f, "not found: {}", reference),
            PusherError::DigestMismatch { expected, got } => {
                write!(f, "digest mismatch: expected {}, got {}", expected, got)
            }
            PusherError::DeletionDisabled => write!(f, "registry does not support deletion"),
            PusherError::NoOriginalTag => write!(f, "image tar carries no RepoTags"),
            PusherError::UploadFailed { digest, phase, cause } => {
                write!(f, "upload of {} failed at {}: {}", digest, phase, cause)
            }
            PusherError::Timeout(phase) => write!(f, "operation timed out: {}", phase),
            PusherError::Validation(msg) => write!(f, "validation error: {}", msg),
            PusherError::Cancelled => write!(f, "push cancelled"),
        }
    }
}

impl std::error::Error for PusherError {}

impl From<std::io::Error> for PusherError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => PusherError::Timeout(err.to_string()),
            _ => PusherError::TarReadError(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for PusherError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PusherError::Timeout(err.to_string())
        } else {
            PusherError::RegistryUnreachable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for PusherError {
    fn from(err: serde_json::Error) -> Self {
        PusherError::InvalidImageTar(format!("malformed JSON: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, PusherError>;

/// Whether a sub-step error belongs to the transport/protocol bucket that
/// the retry policy is allowed to retry.
pub fn is_transient(err: &PusherError) -> bool {
    match err {
        PusherError::RegistryUnreachable(_) | PusherError::Timeout(_) => true,
        PusherError::RegistryProtocolError { status, .. } => {
            *status == 408 || *status == 429 || (500..=599).contains(status)
        }
        _ => false,
    }
}
