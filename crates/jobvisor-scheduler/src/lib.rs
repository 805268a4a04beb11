//! # Jobvisor Scheduler
//!
//! Orchestration of job processes:
//!
//! - [`Worker`]: a fixed-size pool of [`JobProcess`](jobvisor_process::JobProcess)
//!   slots bound to one job
//! - [`WorkerManager`]: worker registry, persistent worker startup, health
//!   sweeps and the process event hub
//! - [`CronTrigger`]: runs a worker on a cron schedule
//! - [`JobManager`]: loads jobs from an application and wires everything up

pub mod error;
pub mod job_manager;
pub mod trigger;
pub mod worker;
pub mod worker_manager;

#[cfg(test)]
mod test_support;

pub use error::SchedulerError;
pub use job_manager::{JobInfo, JobManager, JobManagerBuilder};
pub use trigger::{CronTrigger, SystemClock, WallClock};
pub use worker::{Worker, WorkerInfo, WorkerSpec};
pub use worker_manager::{EventHub, SweepGuard, WorkerManager};
