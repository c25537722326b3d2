//! Remote execution over ssh.
//!
//! The deployment layer only needs three capabilities against a host:
//! run a command, copy a file, sync a directory tree. Commands retry a
//! few times with a fixed pause — freshly booted nodes drop the first
//! connections — then escalate. Copies and transfers fail hard on the
//! first error.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{DeployError, DeployResult};

/// Total attempts for a remote command.
pub const COMMAND_ATTEMPTS: u32 = 3;
/// Pause between attempts.
const RETRY_PAUSE: Duration = Duration::from_secs(30);

/// Capability to act on a remote host.
#[allow(async_fn_in_trait)]
pub trait RemoteExec {
    /// Run a shell command on `host`, retrying transient failures.
    async fn run_command(&self, host: &str, command: &str) -> DeployResult<()>;

    /// Copy a local file to a path on `host`. No retry.
    async fn copy_file(&self, host: &str, local: &Path, remote: &str) -> DeployResult<()>;

    /// Recursively sync `local_root` onto the root filesystem of
    /// `host`. No retry.
    async fn sync_tree(&self, host: &str, local_root: &Path) -> DeployResult<()>;
}

/// ssh/scp/rsync-backed executor.
#[derive(Debug, Clone)]
pub struct SshExec {
    pub user: String,
    pub identity_file: PathBuf,
}

impl SshExec {
    pub fn new(user: &str, identity_file: &Path) -> Self {
        SshExec {
            user: user.to_string(),
            identity_file: identity_file.to_path_buf(),
        }
    }

    fn destination(&self, host: &str) -> String {
        format!("{}@{}", self.user, host)
    }

    /// Open an interactive shell on `host`, optionally with a SOCKS
    /// proxy forwarded at `proxy_port`. Blocks until the session ends.
    pub async fn interactive_shell(
        &self,
        host: &str,
        proxy_port: Option<&str>,
    ) -> DeployResult<()> {
        let mut command = Command::new("ssh");
        command
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-i")
            .arg(&self.identity_file);
        if let Some(port) = proxy_port {
            command.arg("-D").arg(port);
        }
        command.arg(self.destination(host));
        let status = command.status().await?;
        if status.success() {
            Ok(())
        } else {
            Err(DeployError::Command {
                host: host.to_string(),
                detail: format!("ssh session ended with {status}"),
            })
        }
    }
}

/// Drive `attempt` up to [`COMMAND_ATTEMPTS`] times, pausing
/// [`RETRY_PAUSE`] between failures, then escalate the last failure.
async fn retry_command<F, Fut>(host: &str, command: &str, mut attempt: F) -> DeployResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), String>>,
{
    let mut tries = 0;
    loop {
        tries += 1;
        debug!(%host, %command, attempt = tries, "running remote command");
        let detail = match attempt().await {
            Ok(()) => return Ok(()),
            Err(detail) => detail,
        };
        if tries >= COMMAND_ATTEMPTS {
            return Err(DeployError::Command {
                host: host.to_string(),
                detail: format!("{detail} after {tries} attempts"),
            });
        }
        warn!(%host, %detail, "error connecting to host, retrying in 30s");
        sleep(RETRY_PAUSE).await;
    }
}

impl RemoteExec for SshExec {
    async fn run_command(&self, host: &str, command: &str) -> DeployResult<()> {
        retry_command(host, command, || async move {
            let result = Command::new("ssh")
                .arg("-t")
                .arg("-o")
                .arg("StrictHostKeyChecking=no")
                .arg("-i")
                .arg(&self.identity_file)
                .arg(self.destination(host))
                .arg(command)
                .status()
                .await;
            match result {
                Ok(status) if status.success() => Ok(()),
                Ok(status) => Err(format!("exit status {status}")),
                Err(err) => Err(err.to_string()),
            }
        })
        .await
    }

    async fn copy_file(&self, host: &str, local: &Path, remote: &str) -> DeployResult<()> {
        let status = Command::new("scp")
            .arg("-q")
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-i")
            .arg(&self.identity_file)
            .arg(local)
            .arg(format!("{}:{}", self.destination(host), remote))
            .status()
            .await?;
        if status.success() {
            Ok(())
        } else {
            Err(DeployError::Copy {
                host: host.to_string(),
                detail: format!("scp exit status {status}"),
            })
        }
    }

    async fn sync_tree(&self, host: &str, local_root: &Path) -> DeployResult<()> {
        let ssh_transport = format!(
            "ssh -o StrictHostKeyChecking=no -i {}",
            self.identity_file.display()
        );
        let status = Command::new("rsync")
            .arg("-rv")
            .arg("-e")
            .arg(ssh_transport)
            .arg(format!("{}/", local_root.display()))
            .arg(format!("{}:/", self.destination(host)))
            .status()
            .await?;
        if status.success() {
            Ok(())
        } else {
            Err(DeployError::Transfer {
                host: host.to_string(),
                detail: format!("rsync exit status {status}"),
            })
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A scripted executor shared by the crate's tests.

    use std::path::Path;
    use std::sync::Mutex;

    use super::RemoteExec;
    use crate::error::{DeployError, DeployResult};

    /// Records every call.
    #[derive(Default)]
    pub struct RecordingExec {
        pub commands: Mutex<Vec<(String, String)>>,
        pub copies: Mutex<Vec<(String, String)>>,
        pub syncs: Mutex<Vec<String>>,
        pub fail_sync: bool,
    }

    impl RecordingExec {
        pub fn command_log(&self) -> Vec<String> {
            self.commands
                .lock()
                .unwrap()
                .iter()
                .map(|(_, c)| c.clone())
                .collect()
        }
    }

    impl RemoteExec for RecordingExec {
        async fn run_command(&self, host: &str, command: &str) -> DeployResult<()> {
            self.commands
                .lock()
                .unwrap()
                .push((host.to_string(), command.to_string()));
            Ok(())
        }

        async fn copy_file(&self, host: &str, _local: &Path, remote: &str) -> DeployResult<()> {
            self.copies
                .lock()
                .unwrap()
                .push((host.to_string(), remote.to_string()));
            Ok(())
        }

        async fn sync_tree(&self, host: &str, local_root: &Path) -> DeployResult<()> {
            self.syncs
                .lock()
                .unwrap()
                .push(local_root.display().to_string());
            if self.fail_sync {
                return Err(DeployError::Transfer {
                    host: host.to_string(),
                    detail: "scripted failure".to_string(),
                });
            }
            Ok(())
        }
    }
}
