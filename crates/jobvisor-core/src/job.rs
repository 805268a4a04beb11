//! The job descriptor.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::context::JobContext;
use crate::error::JobError;
use crate::id::{JobId, JobIdentity};
use crate::schedule::Schedule;

/// Future returned by task bodies and hooks.
pub type JobFuture = Pin<Box<dyn Future<Output = Result<(), JobError>> + Send>>;

/// A task body or a setup/teardown hook.
pub type JobFn = Arc<dyn Fn(JobContext) -> JobFuture + Send + Sync>;

/// Wrap an async closure as a [`JobFn`].
pub fn job_fn<F, Fut>(f: F) -> JobFn
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// Options attached to a job at creation.
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    pub description: Option<String>,
}

/// One schedulable unit of work.
///
/// Identity, schedule, task body and hooks are fixed once the catalog is
/// built. The only mutable part is the list of workers bound to the job.
pub struct Job {
    id: JobId,
    identity: JobIdentity,
    schedule: Schedule,
    task: JobFn,
    setup_hooks: Vec<JobFn>,
    teardown_hooks: Vec<JobFn>,
    options: JobOptions,
    workers: RwLock<Vec<String>>,
}

impl Job {
    pub(crate) fn new(
        identity: JobIdentity,
        schedule: Schedule,
        task: JobFn,
        options: JobOptions,
        setup_hooks: Vec<JobFn>,
        teardown_hooks: Vec<JobFn>,
    ) -> Self {
        Self {
            id: identity.id(),
            identity,
            schedule,
            task,
            setup_hooks,
            teardown_hooks,
            options,
            workers: RwLock::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn identity(&self) -> &JobIdentity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn task(&self) -> &JobFn {
        &self.task
    }

    pub fn setup_hooks(&self) -> &[JobFn] {
        &self.setup_hooks
    }

    pub fn teardown_hooks(&self) -> &[JobFn] {
        &self.teardown_hooks
    }

    pub fn options(&self) -> &JobOptions {
        &self.options
    }

    /// Name of the auto worker created for a scheduled job.
    pub fn scheduled_worker_name(&self) -> String {
        format!("{}-{}", self.identity.name, self.id)
    }

    /// Record that a worker executes this job.
    pub fn attach_worker(&self, worker: impl Into<String>) {
        let worker = worker.into();
        let mut workers = self.workers.write();
        if !workers.contains(&worker) {
            workers.push(worker);
        }
    }

    /// The most recently attached worker.
    pub fn worker(&self) -> Option<String> {
        self.workers.read().last().cloned()
    }

    /// Every worker attached to this job, in attach order.
    pub fn workers(&self) -> Vec<String> {
        self.workers.read().clone()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("schedule", &self.schedule)
            .field("setup_hooks", &self.setup_hooks.len())
            .field("teardown_hooks", &self.teardown_hooks.len())
            .field("workers", &*self.workers.read())
            .finish()
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.identity, self.schedule)
    }
}
