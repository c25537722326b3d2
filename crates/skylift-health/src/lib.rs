//! skylift-health — cluster status probes and convergence.
//!
//! A cluster is healthy when the lead node's status endpoint reports
//! the full expected core count. Convergence is a bounded loop: probe,
//! restart the cluster services if short, probe again, up to a fixed
//! number of cycles. Running out of cycles is an outcome, not an error.

pub mod converge;
pub mod status;

pub use converge::{HealthOutcome, expected_cores, wait_until_converged};
pub use status::{HttpStatusProbe, STATUS_PORT, StatusProbe};
