//! Bounded convergence loop for a freshly started cluster.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use skylift_cluster::instance_types;
use skylift_deploy::{DeployResult, RemoteExec};

use crate::status::StatusProbe;

/// Restart cycles before giving up on convergence.
pub const MAX_RESTART_CYCLES: u32 = 10;
/// Pause after a restart before probing again.
const RESTART_SETTLE: Duration = Duration::from_secs(5);

const STOP_SCRIPT: &str = "/root/spark/bin/stop-all.sh";
const START_SCRIPT: &str = "/root/spark/bin/start-all.sh";

/// Terminal state of the convergence loop. Exhaustion is a value the
/// caller turns into an exit code, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthOutcome {
    /// The cluster reports every expected core.
    Converged { cores: u64 },
    /// The restart budget ran out before the cluster caught up.
    Exhausted { expected: u64, observed: Option<u64> },
}

impl HealthOutcome {
    pub fn is_converged(&self) -> bool {
        matches!(self, HealthOutcome::Converged { .. })
    }
}

/// Core count a fully joined cluster should report.
pub fn expected_cores(instance_type: &str, workers: u32) -> u64 {
    u64::from(instance_types::cores(instance_type)) * u64::from(workers)
}

/// Probe the lead node until it reports `expected` cores, restarting
/// the cluster services between failed probes. At most
/// [`MAX_RESTART_CYCLES`] restarts are attempted.
pub async fn wait_until_converged<P: StatusProbe, E: RemoteExec>(
    probe: &P,
    exec: &E,
    lead: &str,
    expected: u64,
) -> DeployResult<HealthOutcome> {
    let mut observed = probe.observed_cores(lead).await;
    if observed == Some(expected) {
        info!(%lead, cores = expected, "cluster is healthy");
        return Ok(HealthOutcome::Converged { cores: expected });
    }

    for cycle in 1..=MAX_RESTART_CYCLES {
        warn!(%lead, ?observed, expected, cycle, "cluster short of cores, restarting services");
        exec.run_command(lead, STOP_SCRIPT).await?;
        exec.run_command(lead, START_SCRIPT).await?;
        sleep(RESTART_SETTLE).await;

        observed = probe.observed_cores(lead).await;
        if observed == Some(expected) {
            info!(%lead, cores = expected, cycle, "cluster converged");
            return Ok(HealthOutcome::Converged { cores: expected });
        }
    }

    warn!(%lead, ?observed, expected, "cluster failed to converge");
    Ok(HealthOutcome::Exhausted { expected, observed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use skylift_deploy::DeployError;
    use std::path::Path;
    use std::sync::Mutex;

    /// Probe that replays a fixed script of observations.
    struct ScriptedProbe {
        observations: Mutex<Vec<Option<u64>>>,
    }

    impl ScriptedProbe {
        fn new(observations: &[Option<u64>]) -> Self {
            let mut observations: Vec<_> = observations.to_vec();
            observations.reverse();
            ScriptedProbe {
                observations: Mutex::new(observations),
            }
        }
    }

    impl StatusProbe for ScriptedProbe {
        async fn observed_cores(&self, _host: &str) -> Option<u64> {
            self.observations
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(None)
        }
    }

    #[derive(Default)]
    struct FakeExec {
        commands: Mutex<Vec<String>>,
    }

    impl RemoteExec for FakeExec {
        async fn run_command(&self, _host: &str, command: &str) -> DeployResult<()> {
            self.commands.lock().unwrap().push(command.to_string());
            Ok(())
        }

        async fn copy_file(&self, host: &str, _local: &Path, _remote: &str) -> DeployResult<()> {
            Err(DeployError::Copy {
                host: host.to_string(),
                detail: "unexpected copy".to_string(),
            })
        }

        async fn sync_tree(&self, host: &str, _local_root: &Path) -> DeployResult<()> {
            Err(DeployError::Transfer {
                host: host.to_string(),
                detail: "unexpected sync".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn healthy_cluster_needs_no_restart() {
        let probe = ScriptedProbe::new(&[Some(8)]);
        let exec = FakeExec::default();

        let outcome = wait_until_converged(&probe, &exec, "lead", 8).await.unwrap();
        assert_eq!(outcome, HealthOutcome::Converged { cores: 8 });
        assert!(exec.commands.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn short_cluster_restarts_until_it_catches_up() {
        // Unreachable, then short, then full.
        let probe = ScriptedProbe::new(&[None, Some(4), Some(8)]);
        let exec = FakeExec::default();

        let outcome = wait_until_converged(&probe, &exec, "lead", 8).await.unwrap();
        assert_eq!(outcome, HealthOutcome::Converged { cores: 8 });

        let commands = exec.commands.lock().unwrap();
        assert_eq!(commands.len(), 4);
        assert_eq!(commands[0], STOP_SCRIPT);
        assert_eq!(commands[1], START_SCRIPT);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_budget_is_bounded() {
        let probe = ScriptedProbe::new(&[]);
        let exec = FakeExec::default();

        let outcome = wait_until_converged(&probe, &exec, "lead", 8).await.unwrap();
        assert_eq!(
            outcome,
            HealthOutcome::Exhausted {
                expected: 8,
                observed: None
            }
        );
        // Two commands per cycle, ten cycles.
        assert_eq!(exec.commands.lock().unwrap().len(), 20);
    }

    #[test]
    fn expected_cores_scale_with_workers() {
        assert_eq!(expected_cores("m1.large", 5), 10);
        assert_eq!(expected_cores("c1.xlarge", 2), 16);
    }
}
