//! Error types for Warden
//!
//! Subsystems keep their own error enums ([`MetadataError`], [`ReputationError`]);
//! this is the umbrella type used at the process edge.

use crate::metadata::MetadataError;
use crate::reputation::ReputationError;

/// Main error type for Warden operations
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Reputation error: {0}")]
    Reputation(#[from] ReputationError),
}

impl WardenError {
    /// Whether the error was caused by operator input rather than a runtime fault
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Result type alias for Warden operations
pub type Result<T> = std::result::Result<T, WardenError>;
