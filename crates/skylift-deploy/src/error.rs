//! Error types for deployment operations.

use thiserror::Error;

/// Result type alias for deployment operations.
pub type DeployResult<T> = Result<T, DeployError>;

/// Errors that abort the deployment step.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("remote command failed on {host}: {detail}")]
    Command { host: String, detail: String },

    #[error("file copy to {host} failed: {detail}")]
    Copy { host: String, detail: String },

    #[error("bulk transfer to {host} failed: {detail}")]
    Transfer { host: String, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
