//! The orchestrator: loads jobs, creates workers, wires triggers.

use std::path::PathBuf;
use std::sync::Arc;

use chrono_tz::Tz;
use jobvisor_config::{Config, JobsConfig};
use jobvisor_core::{
    Application, EnablementFilter, HookKind, HookScope, Job, JobCatalog, JobError, JobFn, JobId,
    JobRegistry, Schedule, WorkerOptions,
};
use jobvisor_process::{OsLauncher, ProcessError, ProcessEvent, ProcessLauncher, ProcessOptions};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::SchedulerError;
use crate::trigger::{CronTrigger, SystemClock, WallClock};
use crate::worker::WorkerSpec;
use crate::worker_manager::WorkerManager;

/// Monitoring view of one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: JobId,
    pub application: String,
    pub app: String,
    pub controller: String,
    pub name: String,
    pub schedule: String,
    pub description: Option<String>,
    /// Declared worker names, or `-` when the job only has an auto worker.
    pub worker: String,
    pub workers: Vec<String>,
    pub concurrency: usize,
    pub processes: usize,
    pub running: usize,
    pub persistent: bool,
    /// `waiting` or `running[N]`.
    pub status: String,
    pub next_run: Option<String>,
}

/// Builder for [`JobManager`].
pub struct JobManagerBuilder {
    config: Config,
    launcher: Option<Arc<dyn ProcessLauncher>>,
    program: Option<PathBuf>,
    env: Vec<(String, String)>,
    clock: Option<Arc<dyn WallClock>>,
}

impl JobManagerBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            launcher: None,
            program: None,
            env: Vec::new(),
            clock: None,
        }
    }

    /// Use a custom launcher instead of real OS processes.
    pub fn launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Executable started for job processes. Overrides `jobs.program`.
    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    /// Extra environment passed to every job process.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Wall clock for cron triggers. Defaults to the system clock.
    pub fn clock(mut self, clock: Arc<dyn WallClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<JobManager, SchedulerError> {
        self.config.validate()?;
        let jobs = self.config.jobs;
        let tz = jobs.tz()?;

        let program = match self.program.or_else(|| jobs.program.clone()) {
            Some(program) => program,
            None => std::env::current_exe().map_err(ProcessError::from)?,
        };
        let mut process_options = ProcessOptions::new(program).with_kill_wait(jobs.kill_wait());
        for (key, value) in self.env {
            process_options = process_options.with_env(key, value);
        }

        let launcher = self
            .launcher
            .unwrap_or_else(|| Arc::new(OsLauncher::new()));
        let workers = Arc::new(WorkerManager::new(
            launcher,
            process_options,
            jobs.health_check_interval(),
        ));

        Ok(JobManager {
            registry: Mutex::new(Some(JobRegistry::new(EnablementFilter::from_config(&jobs)))),
            catalog: RwLock::new(None),
            workers,
            triggers: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
            monitor: Mutex::new(None),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            tz,
            config: jobs,
        })
    }
}

/// Owns the job catalog, the worker manager and the cron triggers.
///
/// Lifecycle: register hooks, then [`run`](Self::run) (or the individual
/// load/create/start steps), then [`shutdown`](Self::shutdown).
pub struct JobManager {
    config: JobsConfig,
    tz: Tz,
    /// Present until jobs are loaded.
    registry: Mutex<Option<JobRegistry>>,
    catalog: RwLock<Option<Arc<JobCatalog>>>,
    workers: Arc<WorkerManager>,
    triggers: Mutex<Vec<Arc<CronTrigger>>>,
    cancel: CancellationToken,
    monitor: Mutex<Option<JoinHandle<()>>>,
    clock: Arc<dyn WallClock>,
}

impl JobManager {
    pub fn builder(config: Config) -> JobManagerBuilder {
        JobManagerBuilder::new(config)
    }

    pub fn config(&self) -> &JobsConfig {
        &self.config
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn worker_manager(&self) -> &Arc<WorkerManager> {
        &self.workers
    }

    /// Receive process events of every worker.
    pub fn subscribe(&self) -> broadcast::Receiver<ProcessEvent> {
        self.workers.subscribe()
    }

    /// Run `hook` before the task body of every job matching `scope`.
    pub fn set_setup_function(&self, hook: JobFn, scope: HookScope) -> Result<(), SchedulerError> {
        self.add_hook(HookKind::Setup, hook, scope)
    }

    /// Run `hook` after the task body of every job matching `scope`.
    pub fn set_teardown_function(
        &self,
        hook: JobFn,
        scope: HookScope,
    ) -> Result<(), SchedulerError> {
        self.add_hook(HookKind::Teardown, hook, scope)
    }

    fn add_hook(&self, kind: HookKind, hook: JobFn, scope: HookScope) -> Result<(), SchedulerError> {
        let mut registry = self.registry.lock();
        let registry = registry.as_mut().ok_or(SchedulerError::AlreadyLoaded)?;
        registry.add_hook(kind, hook, scope);
        Ok(())
    }

    /// Load every job of `application` and create its declared workers.
    ///
    /// Can only be called once. A registration error leaves the manager unloaded.
    pub async fn load(&self, application: &dyn Application) -> Result<Arc<JobCatalog>, SchedulerError> {
        let mut registry = self
            .registry
            .lock()
            .take()
            .ok_or(SchedulerError::AlreadyLoaded)?;

        registry.load(application).await?;
        let catalog = Arc::new(registry.finalize());

        for declaration in catalog.worker_declarations() {
            let job = catalog
                .get_by_id(&declaration.job)
                .ok_or_else(|| JobError::JobNotFound(declaration.job.to_string()))?;
            self.workers.create_worker(WorkerSpec {
                name: declaration.name.clone(),
                job,
                persistent: true,
                auto: false,
                options: declaration.options.clone(),
            })?;
        }

        info!(
            jobs = catalog.len(),
            workers = self.workers.len(),
            "Loaded jobs and workers"
        );
        *self.catalog.write() = Some(Arc::clone(&catalog));
        Ok(catalog)
    }

    pub fn catalog(&self) -> Result<Arc<JobCatalog>, SchedulerError> {
        self.catalog.read().clone().ok_or(SchedulerError::NotLoaded)
    }

    pub fn get_job(
        &self,
        application: &str,
        app: &str,
        controller: &str,
        name: &str,
    ) -> Result<Arc<Job>, SchedulerError> {
        Ok(self.catalog()?.get(application, app, controller, name)?)
    }

    /// Create one auto worker per scheduled job. Returns the number created.
    pub fn create_scheduled_workers(&self) -> Result<usize, SchedulerError> {
        let catalog = self.catalog()?;
        let mut created = 0;
        for job in catalog.scheduled() {
            self.workers.create_worker(WorkerSpec {
                name: job.scheduled_worker_name(),
                job: Arc::clone(job),
                persistent: false,
                auto: true,
                options: WorkerOptions::default(),
            })?;
            created += 1;
        }
        Ok(created)
    }

    /// Run `now` jobs once and register a cron trigger for every cron job.
    pub async fn start_schedule_jobs(&self) -> Result<(), SchedulerError> {
        let catalog = self.catalog()?;

        for job in catalog.scheduled() {
            let worker = job.scheduled_worker_name();
            match job.schedule() {
                Schedule::Now => {
                    info!(job = %job.name(), worker = %worker, "Running job now");
                    if let Err(e) = self.workers.run_worker_processes(&worker).await {
                        error!(job = %job.name(), error = %e, "Failed to run job");
                    }
                }
                Schedule::Cron(cron) => {
                    let workers = Arc::clone(&self.workers);
                    let name = worker.clone();
                    let trigger = CronTrigger::start_with_clock(
                        worker,
                        cron.clone(),
                        self.tz,
                        Arc::clone(&self.clock),
                        &self.cancel,
                        move || {
                            let workers = Arc::clone(&workers);
                            let name = name.clone();
                            async move { workers.run_worker_processes(&name).await }
                        },
                    );
                    info!(
                        job = %job.name(),
                        cron = %trigger.cron_expr(),
                        next = ?trigger.next_fire_time().map(|t| t.to_rfc3339()),
                        "Scheduled job"
                    );
                    self.triggers.lock().push(trigger);
                }
                Schedule::Manual => {}
            }
        }
        Ok(())
    }

    /// Run the job's worker: spawn on first call, restart afterwards.
    pub async fn run_job(&self, job: &Job) -> Result<(), SchedulerError> {
        let worker = job
            .worker()
            .ok_or_else(|| JobError::WorkerNotFound(format!("no worker for job {}", job.identity())))?;
        self.workers.run_worker_processes(&worker).await
    }

    /// Start the health monitor. Does nothing if it is already running.
    pub fn monitor_workers_health(&self) {
        let mut monitor = self.monitor.lock();
        if monitor.is_some() {
            return;
        }
        let workers = Arc::clone(&self.workers);
        *monitor = Some(tokio::spawn(
            workers.monitor_workers_health(self.cancel.child_token()),
        ));
    }

    /// Load, create workers, start persistent workers, the health monitor
    /// and the schedules.
    pub async fn run(&self, application: &dyn Application) -> Result<(), SchedulerError> {
        if !self.config.enabled {
            info!("Jobs are disabled, nothing to run");
            return Ok(());
        }

        self.load(application).await?;
        self.create_scheduled_workers()?;
        self.workers.run_persistent_workers().await;
        self.monitor_workers_health();
        self.start_schedule_jobs().await?;
        info!(timezone = %self.tz, "Job manager running");
        Ok(())
    }

    pub fn triggers(&self) -> Vec<Arc<CronTrigger>> {
        self.triggers.lock().clone()
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.lock().as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn jobs_information(&self) -> Result<Vec<JobInfo>, SchedulerError> {
        let catalog = self.catalog()?;
        let triggers = self.triggers();

        let info = catalog
            .iter()
            .map(|job| {
                let workers: Vec<_> = job
                    .workers()
                    .iter()
                    .filter_map(|name| self.workers.get_worker(name))
                    .collect();

                let declared: Vec<&str> = workers
                    .iter()
                    .filter(|w| !w.is_auto())
                    .map(|w| w.name())
                    .collect();
                let worker = if declared.is_empty() {
                    "-".to_string()
                } else {
                    declared.join(", ")
                };

                let snapshots: Vec<_> = workers.iter().map(|w| w.info()).collect();
                let running: usize = snapshots.iter().map(|w| w.running()).sum();
                let status = if running == 0 {
                    "waiting".to_string()
                } else {
                    format!("running[{running}]")
                };

                let trigger_id = job.scheduled_worker_name();
                let next_run = triggers
                    .iter()
                    .find(|t| t.id() == trigger_id)
                    .and_then(|t| t.next_fire_time())
                    .map(|t| t.to_rfc3339());

                let identity = job.identity();
                JobInfo {
                    id: job.id().clone(),
                    application: identity.application.clone(),
                    app: identity.app.clone(),
                    controller: identity.controller.clone(),
                    name: identity.name.clone(),
                    schedule: job.schedule().to_string(),
                    description: job.options().description.clone(),
                    worker,
                    workers: job.workers(),
                    concurrency: snapshots.iter().map(|w| w.concurrency).sum(),
                    processes: snapshots.iter().map(|w| w.processes.len()).sum(),
                    running,
                    persistent: workers.iter().any(|w| w.is_persistent()),
                    status,
                    next_run,
                }
            })
            .collect();
        Ok(info)
    }

    /// Cancel triggers and the health monitor, then stop every process.
    pub async fn shutdown(&self) {
        info!("Shutting down job manager");
        for trigger in self.triggers() {
            trigger.cancel();
        }
        self.cancel.cancel();

        let monitor = self.monitor.lock().take();
        if let Some(handle) = monitor {
            if let Err(e) = handle.await {
                warn!(error = %e, "Health monitor task failed");
            }
        }

        self.workers.shutdown().await;
    }
}

impl std::fmt::Debug for JobManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobManager")
            .field("enabled", &self.config.enabled)
            .field("timezone", &self.tz)
            .field("loaded", &self.catalog.read().is_some())
            .field("workers", &self.workers.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "job_manager_tests.rs"]
mod tests;
