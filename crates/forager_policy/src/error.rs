//! Error types for agent configuration parsing and validation.

use thiserror::Error;

/// Errors that can occur while turning configuration text into a [`Policy`](crate::Policy).
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration text is not a well-formed document.
    #[error("malformed agent configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// The document declares a schema version this parser does not understand.
    #[error("unsupported configuration version {0}")]
    UnsupportedVersion(u32),

    /// A rate entry is structurally valid but semantically wrong.
    #[error("invalid rate for site '{site}': {reason}")]
    InvalidRate {
        /// Site identifier whose entry holds the rate.
        site: String,
        /// Reason why the rate is invalid.
        reason: String,
    },

    /// An override key pattern cannot be interpreted.
    #[error("invalid key pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The pattern as written in the configuration.
        pattern: String,
        /// Reason why the pattern is invalid.
        reason: String,
    },

    /// Two overrides of one site normalize to the same pattern.
    #[error("duplicate override '{pattern}' for site '{site}'")]
    DuplicateOverride {
        /// Site identifier whose entry holds the overrides.
        site: String,
        /// The normalized pattern that appears twice.
        pattern: String,
    },
}

impl Error {
    /// Creates an invalid pattern error.
    pub fn pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for policy operations.
pub type Result<T> = std::result::Result<T, Error>;
