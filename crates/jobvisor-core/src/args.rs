//! Process argument contract between the scheduler and a job process.

use crate::error::JobError;
use crate::id::JobIdentity;

/// First positional argument of a job process.
pub const JOB_MODE_MARKER: &str = "job";

/// Positional arguments: `job <application> <app> <controller> <job>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobArgs {
    pub application: String,
    pub app: String,
    pub controller: String,
    pub job: String,
}

impl JobArgs {
    pub fn from_identity(identity: &JobIdentity) -> Self {
        Self {
            application: identity.application.clone(),
            app: identity.app.clone(),
            controller: identity.controller.clone(),
            job: identity.name.clone(),
        }
    }

    /// Arguments passed to the child executable.
    pub fn to_args(&self) -> Vec<String> {
        vec![
            JOB_MODE_MARKER.to_string(),
            self.application.clone(),
            self.app.clone(),
            self.controller.clone(),
            self.job.clone(),
        ]
    }

    /// Parse arguments following the program name.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self, JobError> {
        match args {
            [marker, application, app, controller, job]
                if marker.as_ref() == JOB_MODE_MARKER =>
            {
                let identity = JobIdentity::new(
                    application.as_ref(),
                    app.as_ref(),
                    controller.as_ref(),
                    job.as_ref(),
                )?;
                Ok(Self::from_identity(&identity))
            }
            _ => Err(JobError::InvalidIdentity(format!(
                "expected `{JOB_MODE_MARKER} <application> <app> <controller> <job>`, got {} argument(s)",
                args.len()
            ))),
        }
    }

    pub fn identity(&self) -> Result<JobIdentity, JobError> {
        JobIdentity::new(&self.application, &self.app, &self.controller, &self.job)
    }
}
