//! Error types shared by every cache tier.

use std::fmt;

/// Errors surfaced by cache operations.
///
/// A key that is simply absent from a tier is never an error; tiers report
/// absence through `Option`/`bool` return values instead.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Distributed tier unavailable, network failure, or unexpected reply.
    BackendError(String),
    /// Database (system of record) access failed.
    RepositoryError(String),
    /// Entity could not be encoded for storage.
    SerializationError(String),
    /// Stored bytes or fields could not be decoded back into an entity.
    DeserializationError(String),
    /// Local envelope has a bad magic header or is truncated.
    InvalidCacheEntry(String),
    /// Local envelope was written by an incompatible schema version.
    VersionMismatch { expected: u32, found: u32 },
    /// Invalid or missing configuration.
    ConfigError(String),
    /// Caller supplied an entity or argument the cache cannot use.
    ValidationError(String),
    /// A distributed or database call exceeded the operation timeout.
    Timeout(String),
    /// An atomic transaction was discarded; none of its operations applied.
    TransactionAborted(String),
    /// A transaction guard did not hold; none of its operations applied.
    PreconditionFailed(String),
}

impl Error {
    /// True for [`Error::Timeout`].
    ///
    /// The entity read path uses this to fall through to the next tier.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::RepositoryError(msg) => write!(f, "Repository error: {}", msg),
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::InvalidCacheEntry(msg) => write!(f, "Invalid cache entry: {}", msg),
            Error::VersionMismatch { expected, found } => write!(
                f,
                "Cache schema version mismatch: expected {}, found {}",
                expected, found
            ),
            Error::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Error::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            Error::Timeout(msg) => write!(f, "Operation timed out: {}", msg),
            Error::TransactionAborted(msg) => write!(f, "Transaction aborted: {}", msg),
            Error::PreconditionFailed(msg) => write!(f, "Precondition failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::SerializationError(e.to_string())
    }
}

impl From<postcard::Error> for Error {
    fn from(e: postcard::Error) -> Self {
        Error::DeserializationError(e.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
