//! Error types for configuration refresh.

use thiserror::Error;

/// Errors that can occur while fetching agent configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration source does not exist.
    #[error("agent configuration not found at {location}")]
    SourceNotFound {
        /// Where the source was looked for.
        location: String,
    },

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Configuration text could not be turned into a policy.
    #[error(transparent)]
    Policy(#[from] forager_policy::Error),
}

/// Result type alias for refresh operations.
pub type Result<T> = std::result::Result<T, Error>;
