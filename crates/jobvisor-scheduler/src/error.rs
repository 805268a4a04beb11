//! Scheduler errors.

use jobvisor_config::ConfigError;
use jobvisor_core::JobError;
use jobvisor_process::ProcessError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Jobs have not been loaded")]
    NotLoaded,

    #[error("Jobs have already been loaded")]
    AlreadyLoaded,
}
