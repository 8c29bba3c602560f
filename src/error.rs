//! Structured error types for the qvote library.
//!
//! Every public library function returns [`Result<T>`] which carries a
//! domain-specific [`QvoteError`].  The HTTP layer maps these onto status
//! codes via [`QvoteError::status_class`].
//!
//! Low-sample conditions are *not* errors: the computation completes with a
//! defined fallback value and the result carries a [`LowSample`] flag.

use serde::Serialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Primary error enum
// ---------------------------------------------------------------------------

/// Domain-specific error type for the qvote library.
#[derive(Error, Debug)]
pub enum QvoteError {
    /// Bad qubit/trial counts, out-of-range adversary parameters, malformed
    /// request bodies.  Always raised before any simulation work starts.
    #[error("invalid parameter `{field}`: {reason}")]
    InvalidParameter { field: String, reason: String },

    /// The audit log could not complete an append or read.
    #[error("audit store unavailable: {0}")]
    StoreUnavailable(String),

    /// Direct database errors (auto-converted via `?` in the audit module).
    #[error("database: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for errors that do not fit a specific domain.
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, QvoteError>;

impl QvoteError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Name of the offending field for [`QvoteError::InvalidParameter`].
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::InvalidParameter { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Store failures are transient from the caller's point of view.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::Database(_))
    }

    pub fn status_class(&self) -> ErrorClass {
        match self {
            Self::InvalidParameter { .. } => ErrorClass::InvalidParameter,
            Self::StoreUnavailable(_) | Self::Database(_) => ErrorClass::StoreUnavailable,
            Self::Config(_) | Self::Io(_) | Self::Other(_) => ErrorClass::Internal,
        }
    }
}

/// Coarse error taxonomy surfaced across the transport boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    InvalidParameter,
    StoreUnavailable,
    Internal,
}

// ---------------------------------------------------------------------------
// Low-sample warnings
// ---------------------------------------------------------------------------

/// A result was computed but rests on too little data to be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LowSample {
    /// No position had matching sender/receiver bases; QBER fell back to 0.
    NoMatchedBases,
    /// Each CHSH setting group received fewer trials than `minimum`.
    SparseChshGroups { per_group: usize, minimum: usize },
}

impl std::fmt::Display for LowSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoMatchedBases => write!(f, "no matched bases; QBER defaulted to 0"),
            Self::SparseChshGroups { per_group, minimum } => write!(
                f,
                "only {per_group} CHSH trials per setting group (minimum {minimum})"
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Context extension trait
// ---------------------------------------------------------------------------

/// Extension trait that adds domain-specific context to any `Result<T, E>`.
///
/// ```ignore
/// conn.execute_batch(SCHEMA).ctx_store("create tables")?;
/// ```
pub trait ResultExt<T> {
    fn ctx_store(self, msg: &str) -> Result<T>;
    fn ctx_config(self, msg: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn ctx_store(self, msg: &str) -> Result<T> {
        self.map_err(|e| QvoteError::StoreUnavailable(format!("{msg}: {e}")))
    }
    fn ctx_config(self, msg: &str) -> Result<T> {
        self.map_err(|e| QvoteError::Config(format!("{msg}: {e}")))
    }
}
