//! Job registration errors.

use jobvisor_config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job already exists: {0}")]
    DuplicateJob(String),

    #[error("Worker already exists: {0}")]
    DuplicateWorker(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Worker not found: {0}")]
    WorkerNotFound(String),

    #[error("Invalid schedule \"{expr}\": {message}")]
    InvalidSchedule { expr: String, message: String },

    #[error("Invalid job identity: {0}")]
    InvalidIdentity(String),

    #[error("Task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl JobError {
    /// Shorthand for task bodies reporting a failure.
    pub fn task(message: impl Into<String>) -> Self {
        JobError::Task(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_job_display() {
        let err = JobError::DuplicateJob("A/app1/Ctrl1/Sync-Report".to_string());
        assert!(err.to_string().contains("already exists"));
        assert!(err.to_string().contains("Sync-Report"));
    }

    #[test]
    fn test_invalid_schedule_display() {
        let err = JobError::InvalidSchedule {
            expr: "every tuesday".to_string(),
            message: "bad field".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("every tuesday"));
        assert!(display.contains("bad field"));
    }

    #[test]
    fn test_task_helper() {
        let err = JobError::task("queue unavailable");
        assert!(matches!(err, JobError::Task(ref m) if m == "queue unavailable"));
    }

    #[test]
    fn test_from_config_error() {
        let err: JobError = ConfigError::InvalidFormat("x".to_string()).into();
        assert!(matches!(err, JobError::Config(_)));
    }
}
