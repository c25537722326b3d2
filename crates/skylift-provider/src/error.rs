//! Error types for provider operations.

use thiserror::Error;

/// Result type alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors surfaced by a cloud provider implementation.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("machine image not found: {0}")]
    ImageNotFound(String),

    #[error("security group not found: {0}")]
    GroupNotFound(String),

    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    #[error("provider API error: {0}")]
    Api(String),
}
