//! Error types for cluster orchestration.

use thiserror::Error;

use skylift_provider::ProviderError;

/// Result type alias for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors that abort the current cluster operation.
///
/// Bounded-budget exhaustion (spot wait interrupted, group deletion not
/// converging) is deliberately not here: those are reported as outcome
/// values so callers can distinguish them from crashes.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("could not find a master for cluster {0}")]
    NoMasters(String),

    #[error("could not find workers for cluster {0}")]
    NoWorkers(String),

    #[error(
        "cluster {name} already has {count} active node(s); destroy it or pick another name"
    )]
    AlreadyRunning { name: String, count: usize },

    #[error("provider reported no availability zones")]
    NoZones,

    #[error(transparent)]
    Provider(#[from] ProviderError),
}
