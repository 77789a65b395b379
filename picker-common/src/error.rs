//! Error types for the stock picker.

use thiserror::Error;

/// Result type alias using the picker error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for picker services.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required credential (API token, service key) is absent
    #[error("Missing credential: {0}")]
    MissingCredential(String),
}

impl Error {
    /// Configuration problems abort the process before any scanning starts.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::MissingCredential(_))
    }
}
