//! Process launching capability.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use serde::Serialize;
use tokio::io::AsyncRead;

use crate::error::ProcessError;
use crate::signal::Signal;

/// What to execute.
#[derive(Debug, Clone)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ExitInfo {
    /// Exit code, absent when the process was killed by a signal.
    pub code: Option<i32>,
    /// Terminating signal number, if any.
    pub signal: Option<i32>,
}

impl ExitInfo {
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn signaled(signal: Signal) -> Self {
        Self {
            code: None,
            signal: Some(signal.number()),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ExitInfo {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

/// Resolves once the process has exited and been reaped.
pub type ExitFuture = Pin<Box<dyn Future<Output = ExitInfo> + Send>>;

/// A captured output stream of a child.
pub type OutputStream = Pin<Box<dyn AsyncRead + Send>>;

/// A freshly spawned process.
pub struct LaunchedProcess {
    pub pid: u32,
    pub exit: ExitFuture,
    pub stdout: Option<OutputStream>,
    pub stderr: Option<OutputStream>,
}

/// Spawns processes and delivers signals to them.
pub trait ProcessLauncher: Send + Sync {
    /// Start a process. Must be called from within a tokio runtime.
    fn spawn(&self, command: &LaunchCommand) -> Result<LaunchedProcess, ProcessError>;

    /// Deliver a signal to `pid`.
    fn signal(&self, pid: u32, signal: Signal) -> Result<(), ProcessError>;

    /// Whether a process with `pid` exists.
    fn is_alive(&self, pid: u32) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_info_success() {
        assert!(ExitInfo::code(0).success());
        assert!(!ExitInfo::code(1).success());
        assert!(!ExitInfo::signaled(Signal::Kill).success());
        assert!(!ExitInfo::default().success());
    }

    #[test]
    fn test_signaled_records_number() {
        let info = ExitInfo::signaled(Signal::Terminate);
        assert_eq!(info.code, None);
        assert_eq!(info.signal, Some(15));
    }
}
