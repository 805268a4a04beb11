//! Termination signals.

use std::fmt;

use serde::Serialize;

/// Signals sent to a job process, ordered from gentlest to most forceful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Signal {
    Interrupt,
    Terminate,
    Kill,
}

impl Signal {
    /// Order in which signals are sent when stopping a process.
    pub const ESCALATION: [Signal; 3] = [Signal::Interrupt, Signal::Terminate, Signal::Kill];

    /// POSIX signal number.
    pub fn number(self) -> i32 {
        match self {
            Signal::Interrupt => 2,
            Signal::Terminate => 15,
            Signal::Kill => 9,
        }
    }

    #[cfg(unix)]
    pub(crate) fn to_nix(self) -> nix::sys::signal::Signal {
        use nix::sys::signal::Signal as Nix;
        match self {
            Signal::Interrupt => Nix::SIGINT,
            Signal::Terminate => Nix::SIGTERM,
            Signal::Kill => Nix::SIGKILL,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Interrupt => write!(f, "SIGINT"),
            Signal::Terminate => write!(f, "SIGTERM"),
            Signal::Kill => write!(f, "SIGKILL"),
        }
    }
}
