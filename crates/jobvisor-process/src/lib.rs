//! # Jobvisor Process
//!
//! Supervision of the OS processes that execute job task bodies.
//!
//! - [`ProcessLauncher`]: spawn, signal and probe processes ([`OsLauncher`]
//!   for real children)
//! - [`JobProcess`]: one child slot with restart, kill escalation
//!   (SIGINT, SIGTERM, SIGKILL) and health checking
//! - [`ProcessObserver`]: receives [`ProcessEvent`]s such as non-zero exits

pub mod error;
pub mod events;
pub mod job_process;
pub mod launcher;
pub mod log_relay;
pub mod os;
pub mod signal;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use error::ProcessError;
pub use events::{NoopObserver, ProcessEvent, ProcessObserver, ProcessSnapshot};
pub use job_process::{JobProcess, KillOutcome, ProcessOptions, ProcessTarget, RestartOutcome};
pub use launcher::{ExitInfo, LaunchCommand, LaunchedProcess, ProcessLauncher};
pub use os::OsLauncher;
pub use signal::Signal;
