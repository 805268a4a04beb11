//! Parent liveness checks.

use jobvisor_process::{OsLauncher, ProcessLauncher};

/// Tells whether the supervising parent is still around.
pub trait ParentProbe: Send + Sync {
    fn parent_alive(&self) -> bool;
}

/// Probes the parent recorded at startup with a null signal.
///
/// A re-parented child (for example adopted by init) counts as orphaned even
/// if the old parent pid was reused.
#[derive(Debug, Clone, Copy)]
pub struct OsParentProbe {
    ppid: u32,
    launcher: OsLauncher,
}

impl OsParentProbe {
    /// Probe for the parent of the current process.
    #[cfg(unix)]
    pub fn current() -> Option<Self> {
        let ppid = nix::unistd::getppid().as_raw();
        u32::try_from(ppid).ok().map(Self::for_pid)
    }

    /// No parent probing without POSIX signals; stdin EOF still applies.
    #[cfg(not(unix))]
    pub fn current() -> Option<Self> {
        None
    }

    pub fn for_pid(ppid: u32) -> Self {
        Self {
            ppid,
            launcher: OsLauncher::new(),
        }
    }

    pub fn ppid(&self) -> u32 {
        self.ppid
    }
}

impl ParentProbe for OsParentProbe {
    #[cfg(unix)]
    fn parent_alive(&self) -> bool {
        let current = nix::unistd::getppid().as_raw();
        u32::try_from(current).is_ok_and(|p| p == self.ppid) && self.launcher.is_alive(self.ppid)
    }

    #[cfg(not(unix))]
    fn parent_alive(&self) -> bool {
        self.launcher.is_alive(self.ppid)
    }
}
