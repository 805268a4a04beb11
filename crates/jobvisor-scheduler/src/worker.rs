//! Workers: fixed-size process pools bound to a job.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::join_all;
use jobvisor_core::{Job, JobId, WorkerOptions};
use jobvisor_process::{
    JobProcess, KillOutcome, ProcessError, ProcessEvent, ProcessLauncher, ProcessObserver,
    ProcessOptions, ProcessSnapshot, ProcessTarget, RestartOutcome,
};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::error::SchedulerError;

/// What a worker is created from.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub name: String,
    pub job: Arc<Job>,
    /// Started at boot and health-checked forever.
    pub persistent: bool,
    /// Created implicitly for a scheduled job.
    pub auto: bool,
    pub options: WorkerOptions,
}

/// Forwards process events upstream and keeps failure statistics.
struct WorkerEvents {
    worker: String,
    failures: AtomicU64,
    last_failure: Mutex<Option<ProcessSnapshot>>,
    upstream: Arc<dyn ProcessObserver>,
}

impl ProcessObserver for WorkerEvents {
    fn on_process_event(&self, event: &ProcessEvent) {
        if event.is_failure() {
            self.failures.fetch_add(1, Ordering::Relaxed);
            *self.last_failure.lock() = Some(event.snapshot().clone());
        }
        self.upstream.on_process_event(event);
    }
}

/// Monitoring view of a worker.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerInfo {
    pub name: String,
    pub job_id: JobId,
    pub job: String,
    pub persistent: bool,
    pub auto: bool,
    pub concurrency: usize,
    pub failures: u64,
    pub processes: Vec<ProcessSnapshot>,
}

impl WorkerInfo {
    /// Processes with a live child.
    pub fn running(&self) -> usize {
        self.processes.iter().filter(|p| p.running).count()
    }
}

/// A named pool of up to `concurrency` job processes.
pub struct Worker {
    name: String,
    job: Arc<Job>,
    persistent: bool,
    auto: bool,
    options: WorkerOptions,
    process_options: ProcessOptions,
    launcher: Arc<dyn ProcessLauncher>,
    events: Arc<WorkerEvents>,
    processes: Mutex<Vec<Arc<JobProcess>>>,
}

impl Worker {
    pub fn new(
        spec: WorkerSpec,
        process_options: ProcessOptions,
        launcher: Arc<dyn ProcessLauncher>,
        upstream: Arc<dyn ProcessObserver>,
    ) -> Self {
        let process_options = match spec.options.kill_wait {
            Some(kill_wait) => process_options.with_kill_wait(kill_wait),
            None => process_options,
        };
        let events = Arc::new(WorkerEvents {
            worker: spec.name.clone(),
            failures: AtomicU64::new(0),
            last_failure: Mutex::new(None),
            upstream,
        });

        Self {
            name: spec.name,
            job: spec.job,
            persistent: spec.persistent,
            auto: spec.auto,
            options: spec.options,
            process_options,
            launcher,
            events,
            processes: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn job(&self) -> &Arc<Job> {
        &self.job
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn is_auto(&self) -> bool {
        self.auto
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    pub fn concurrency(&self) -> usize {
        self.options.effective_concurrency()
    }

    pub fn processes(&self) -> Vec<Arc<JobProcess>> {
        self.processes.lock().clone()
    }

    pub fn failure_count(&self) -> u64 {
        self.events.failures.load(Ordering::Relaxed)
    }

    pub fn last_failure(&self) -> Option<ProcessSnapshot> {
        self.events.last_failure.lock().clone()
    }

    /// Start the pool, or restart every process of an existing pool in place.
    pub async fn run(&self) -> Result<(), SchedulerError> {
        let existing = {
            let mut processes = self.processes.lock();
            if processes.is_empty() {
                processes.extend((1..=self.concurrency()).map(|n| self.new_process(n)));
                None
            } else {
                Some(processes.clone())
            }
        };

        match existing {
            None => self.spawn_all(),
            Some(processes) => self.restart_all(processes).await,
        }
    }

    /// Restart every process in order, continuing past failures.
    async fn restart_all(&self, processes: Vec<Arc<JobProcess>>) -> Result<(), SchedulerError> {
        let mut first_error = None;
        for process in processes {
            match process.restart().await {
                Ok(RestartOutcome::Stuck) => {
                    error!(worker = %self.name, process = %process.id(), "Restart aborted");
                }
                Ok(_) => {}
                Err(e) => {
                    error!(
                        worker = %self.name,
                        process = %process.id(),
                        error = %e,
                        "Failed to restart process"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn new_process(&self, ordinal: usize) -> Arc<JobProcess> {
        let observer: Arc<dyn ProcessObserver> = self.events.clone();
        JobProcess::new(
            format!("#{ordinal}"),
            ProcessTarget {
                worker: self.name.clone(),
                job: self.job.identity().clone(),
            },
            self.process_options.clone(),
            Arc::clone(&self.launcher),
            observer,
        )
    }

    fn spawn_all(&self) -> Result<(), SchedulerError> {
        info!(
            worker = %self.name,
            job = %self.job.name(),
            concurrency = self.concurrency(),
            "Starting worker processes"
        );

        let mut first_error = None;
        for process in self.processes() {
            match process.run() {
                Ok(_) => {}
                Err(ProcessError::AlreadyRunning(_)) => {
                    debug!(worker = %self.name, process = %process.id(), "Process already started");
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Respawn dead processes of a persistent worker. Returns the number respawned.
    pub fn check_health(&self) -> usize {
        if !self.persistent {
            return 0;
        }
        self.processes()
            .iter()
            .filter(|process| process.check_health())
            .count()
    }

    /// Stop every process without respawning.
    pub async fn terminate(&self) -> Vec<KillOutcome> {
        let processes = self.processes();
        join_all(processes.iter().map(|process| process.terminate())).await
    }

    pub fn info(&self) -> WorkerInfo {
        WorkerInfo {
            name: self.name.clone(),
            job_id: self.job.id().clone(),
            job: self.job.name().to_string(),
            persistent: self.persistent,
            auto: self.auto,
            concurrency: self.concurrency(),
            failures: self.failure_count(),
            processes: self.processes().iter().map(|p| p.snapshot()).collect(),
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("job", &self.job.name())
            .field("persistent", &self.persistent)
            .field("auto", &self.auto)
            .field("concurrency", &self.concurrency())
            .finish()
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
