//! # Jobvisor Runner
//!
//! The child side of a job process. The supervisor starts the binary with
//! `job <application> <app> <controller> <job>`; [`WorkerRunner`] resolves
//! that job from the catalog, runs its setup hooks and task body, and runs
//! the teardown hooks exactly once before the process exits. Termination is
//! triggered by task completion, SIGINT, the parent pipe closing, the parent
//! liveness probe failing, or an exit request from the task itself.

pub mod error;
pub mod probe;
pub mod runner;

pub use error::RunnerError;
pub use probe::{OsParentProbe, ParentProbe};
pub use runner::{RunOutcome, RunnerOptions, Termination, WorkerRunner};
