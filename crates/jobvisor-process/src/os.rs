//! Launcher backed by real OS processes.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::ProcessError;
use crate::launcher::{ExitInfo, LaunchCommand, LaunchedProcess, OutputStream, ProcessLauncher};
use crate::signal::Signal;

/// Spawns children with `tokio::process` and signals them with `kill(2)`.
///
/// The child's stdin is a pipe held open until the child is reaped. When the
/// supervising process dies the pipe closes and the child reads EOF.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsLauncher;

impl OsLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessLauncher for OsLauncher {
    fn spawn(&self, command: &LaunchCommand) -> Result<LaunchedProcess, ProcessError> {
        let program = command.program.display().to_string();

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: program.clone(),
                source,
            })?;

        let pid = child.id().ok_or_else(|| ProcessError::Spawn {
            program: program.clone(),
            source: std::io::Error::other("child exited before reporting a pid"),
        })?;

        debug!(pid, program = %program, args = ?command.args, "Spawned child process");

        let stdout = child.stdout.take().map(|s| Box::pin(s) as OutputStream);
        let stderr = child.stderr.take().map(|s| Box::pin(s) as OutputStream);
        let stdin = child.stdin.take();

        let exit = Box::pin(async move {
            let status = child.wait().await;
            drop(stdin);
            match status {
                Ok(status) => ExitInfo::from(status),
                Err(e) => {
                    warn!(pid, error = %e, "Failed to wait for child process");
                    ExitInfo::default()
                }
            }
        });

        Ok(LaunchedProcess {
            pid,
            exit,
            stdout,
            stderr,
        })
    }

    #[cfg(unix)]
    fn signal(&self, pid: u32, signal: Signal) -> Result<(), ProcessError> {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        kill(Pid::from_raw(pid as i32), signal.to_nix()).map_err(|e| ProcessError::Signal {
            pid,
            signal,
            message: e.to_string(),
        })
    }

    #[cfg(not(unix))]
    fn signal(&self, _pid: u32, signal: Signal) -> Result<(), ProcessError> {
        Err(ProcessError::Unsupported(format!("sending {signal}")))
    }

    #[cfg(unix)]
    fn is_alive(&self, pid: u32) -> bool {
        use nix::sys::signal::{Signal as NixSignal, kill};
        use nix::unistd::Pid;

        kill(Pid::from_raw(pid as i32), None::<NixSignal>).is_ok()
    }

    #[cfg(not(unix))]
    fn is_alive(&self, _pid: u32) -> bool {
        true
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tokio::io::{AsyncBufReadExt, BufReader};

    fn sh(script: &str) -> LaunchCommand {
        LaunchCommand {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), script.to_string()],
            env: vec![("JOBVISOR_TEST_VALUE".to_string(), "relay".to_string())],
        }
    }

    #[tokio::test]
    async fn test_spawn_and_exit_code() {
        let launched = OsLauncher::new().spawn(&sh("exit 3")).unwrap();
        assert!(launched.pid > 0);
        let info = launched.exit.await;
        assert_eq!(info.code, Some(3));
    }

    #[tokio::test]
    async fn test_stdout_captured_with_env() {
        let mut launched = OsLauncher::new()
            .spawn(&sh("echo \"value=$JOBVISOR_TEST_VALUE\""))
            .unwrap();
        let stdout = launched.stdout.take().unwrap();
        let mut lines = BufReader::new(stdout).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("value=relay"));
        assert!(launched.exit.await.success());
    }

    #[tokio::test]
    async fn test_signal_kills_child() {
        let launcher = OsLauncher::new();
        let launched = launcher.spawn(&sh("sleep 30")).unwrap();
        assert!(launcher.is_alive(launched.pid));

        launcher.signal(launched.pid, Signal::Kill).unwrap();
        let info = launched.exit.await;
        assert_eq!(info.code, None);
        assert_eq!(info.signal, Some(9));
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let command = LaunchCommand {
            program: PathBuf::from("/nonexistent/jobvisor-child"),
            args: Vec::new(),
            env: Vec::new(),
        };
        let result = OsLauncher::new().spawn(&command);
        assert!(matches!(result, Err(ProcessError::Spawn { .. })));
    }
}
