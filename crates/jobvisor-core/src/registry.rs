//! Job registration.
//!
//! Controllers declare jobs through a [`Registrar`]. Once every controller has
//! been loaded, [`JobRegistry::finalize`] attaches the matching setup and
//! teardown hooks and freezes the result into a [`JobCatalog`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use jobvisor_config::JobsConfig;
use tracing::{debug, info};

use crate::controller::{Application, ControllerIdentity};
use crate::error::JobError;
use crate::hooks::{HookFilter, HookKind, HookScope, Reach};
use crate::id::{JobId, JobIdentity};
use crate::job::{Job, JobFn, JobOptions};
use crate::schedule::Schedule;

/// Allow-lists for applications, apps and controllers.
#[derive(Debug, Clone, Default)]
pub struct EnablementFilter {
    pub applications: Option<Vec<String>>,
    pub apps: Option<Vec<String>>,
    pub controllers: Option<Vec<String>>,
}

impl EnablementFilter {
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn from_config(config: &JobsConfig) -> Self {
        Self {
            applications: config.applications_enabled.clone(),
            apps: config.apps_enabled.clone(),
            controllers: config.controllers_enabled.clone(),
        }
    }

    /// Why a job is administratively disabled, if it is.
    pub fn disabled_reason(&self, identity: &JobIdentity) -> Option<String> {
        fn listed(list: &Option<Vec<String>>, value: &str) -> bool {
            list.as_ref().is_none_or(|names| names.iter().any(|n| n == value))
        }

        if !listed(&self.applications, &identity.application) {
            return Some(format!("Application \"{}\" disabled", identity.application));
        }
        if !listed(&self.apps, &identity.app) {
            return Some(format!("App \"{}\" disabled", identity.app));
        }
        if !listed(&self.controllers, &identity.controller) {
            return Some(format!("Controller \"{}\" disabled", identity.controller));
        }
        None
    }
}

/// Options of a declared worker.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Number of processes run side by side. Values below 1 are treated as 1.
    pub concurrency: usize,
    /// Overrides the global kill wait for this worker's processes.
    pub kill_wait: Option<Duration>,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            kill_wait: None,
        }
    }
}

impl WorkerOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_kill_wait(mut self, kill_wait: Duration) -> Self {
        self.kill_wait = Some(kill_wait);
        self
    }

    /// Concurrency clamped to at least one process.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}

/// A persistent worker declared by a controller.
#[derive(Debug, Clone)]
pub struct WorkerDeclaration {
    pub name: String,
    pub job: JobId,
    pub options: WorkerOptions,
}

struct JobDraft {
    identity: JobIdentity,
    schedule: Schedule,
    task: JobFn,
    options: JobOptions,
}

/// Mutable registry filled during the load phase.
pub struct JobRegistry {
    filter: EnablementFilter,
    drafts: Vec<JobDraft>,
    index: HashSet<JobId>,
    skipped: HashSet<JobId>,
    workers: Vec<WorkerDeclaration>,
    worker_names: HashSet<String>,
    hooks: Vec<HookFilter>,
}

impl JobRegistry {
    pub fn new(filter: EnablementFilter) -> Self {
        Self {
            filter,
            drafts: Vec::new(),
            index: HashSet::new(),
            skipped: HashSet::new(),
            workers: Vec::new(),
            worker_names: HashSet::new(),
            hooks: Vec::new(),
        }
    }

    /// Number of registered jobs.
    pub fn len(&self) -> usize {
        self.drafts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }

    /// Register a setup or teardown hook for every job matching `scope`.
    ///
    /// Hooks are attached in registration order when the registry is finalized.
    pub fn add_hook(&mut self, kind: HookKind, hook: JobFn, scope: HookScope) {
        self.hooks.push(HookFilter { kind, scope, hook });
    }

    /// Ask every controller of `application` to declare its jobs.
    pub async fn load(&mut self, application: &dyn Application) -> Result<(), JobError> {
        info!(
            "Loading jobs and workers from controllers of {}...",
            application.name()
        );
        for controller in application.controllers() {
            let identity = controller.identity();
            info!("Loading \"{}\"...", identity);
            let mut registrar = self.registrar(identity);
            controller.jobs(&mut registrar).await?;
        }
        Ok(())
    }

    /// Registration handle scoped to one controller.
    pub fn registrar(&mut self, controller: ControllerIdentity) -> Registrar<'_> {
        Registrar {
            registry: self,
            controller,
        }
    }

    /// Register a job.
    ///
    /// Returns `Ok(None)` when the job's owner is disabled and the job was skipped.
    pub fn add_job(
        &mut self,
        identity: JobIdentity,
        schedule: Schedule,
        task: JobFn,
        options: JobOptions,
    ) -> Result<Option<JobId>, JobError> {
        info!("Add new Job: {} ({})", identity, schedule);
        let id = identity.id();

        if self.index.contains(&id) || self.skipped.contains(&id) {
            return Err(JobError::DuplicateJob(identity.to_string()));
        }

        if let Some(reason) = self.filter.disabled_reason(&identity) {
            info!("{}! Skipping job \"{}\"", reason, identity.name);
            self.skipped.insert(id);
            return Ok(None);
        }

        info!(job = %identity.name, id = %id, "Loading job");
        self.index.insert(id.clone());
        self.drafts.push(JobDraft {
            identity,
            schedule,
            task,
            options,
        });
        Ok(Some(id))
    }

    /// Declare a persistent worker group for a registered job.
    ///
    /// Returns `Ok(false)` when the job was skipped as disabled.
    pub fn declare_workers(
        &mut self,
        name: impl Into<String>,
        job: &JobIdentity,
        options: WorkerOptions,
    ) -> Result<bool, JobError> {
        let name = name.into();
        let id = job.id();

        if self.skipped.contains(&id) {
            info!(worker = %name, "Job \"{}\" disabled, skipping workers", job.name);
            return Ok(false);
        }
        if !self.index.contains(&id) {
            return Err(not_found(job));
        }
        if !self.worker_names.insert(name.clone()) {
            return Err(JobError::DuplicateWorker(name));
        }

        info!(
            worker = %name,
            job = %job.name,
            concurrency = options.effective_concurrency(),
            "Declared workers"
        );
        self.workers.push(WorkerDeclaration {
            name,
            job: id,
            options,
        });
        Ok(true)
    }

    /// Attach hooks and freeze the registry.
    pub fn finalize(self) -> JobCatalog {
        let hooks = self.hooks;
        let mut jobs = Vec::with_capacity(self.drafts.len());
        let mut index = HashMap::with_capacity(self.drafts.len());

        for draft in self.drafts {
            let matching = |kind: HookKind| -> Vec<JobFn> {
                hooks
                    .iter()
                    .filter(|f| f.kind == kind && f.scope.matches(&draft.identity))
                    .map(|f| Arc::clone(&f.hook))
                    .collect()
            };
            let setup = matching(HookKind::Setup);
            let teardown = matching(HookKind::Teardown);

            debug!(
                job = %draft.identity,
                setup = setup.len(),
                teardown = teardown.len(),
                "Configured setup and teardown hooks"
            );

            let job = Job::new(
                draft.identity,
                draft.schedule,
                draft.task,
                draft.options,
                setup,
                teardown,
            );
            index.insert(job.id().clone(), jobs.len());
            jobs.push(Arc::new(job));
        }

        JobCatalog {
            jobs,
            index,
            workers: self.workers,
        }
    }
}

fn not_found(identity: &JobIdentity) -> JobError {
    JobError::JobNotFound(format!(
        "\"{}\" does not exist in application \"{}\", app \"{}\", controller \"{}\"",
        identity.name, identity.application, identity.app, identity.controller
    ))
}

/// Registration API handed to a controller's `jobs()` callback.
pub struct Registrar<'a> {
    registry: &'a mut JobRegistry,
    controller: ControllerIdentity,
}

impl Registrar<'_> {
    pub fn controller(&self) -> &ControllerIdentity {
        &self.controller
    }

    fn identity(&self, name: &str) -> Result<JobIdentity, JobError> {
        JobIdentity::new(
            &self.controller.application,
            &self.controller.app,
            &self.controller.controller,
            name,
        )
    }

    /// Create a job owned by this controller.
    ///
    /// `schedule` is `None` for manual jobs, `"now"` for a single run at
    /// startup, or a cron expression.
    pub fn create_job(
        &mut self,
        name: &str,
        schedule: Option<&str>,
        task: JobFn,
        options: JobOptions,
    ) -> Result<(), JobError> {
        let identity = self.identity(name)?;
        let schedule = Schedule::parse(schedule)?;
        self.registry.add_job(identity, schedule, task, options)?;
        Ok(())
    }

    /// Create a persistent worker group for one of this controller's jobs.
    pub fn create_workers(
        &mut self,
        name: &str,
        job_name: &str,
        options: WorkerOptions,
    ) -> Result<(), JobError> {
        let identity = self.identity(job_name)?;
        self.registry.declare_workers(name, &identity, options)?;
        Ok(())
    }

    /// Run `hook` before the task body of the jobs within `reach`.
    pub fn job_setup(&mut self, hook: JobFn, reach: Reach) {
        let scope = self.scope(reach);
        self.registry.add_hook(HookKind::Setup, hook, scope);
    }

    /// Run `hook` after the task body of the jobs within `reach`.
    pub fn job_teardown(&mut self, hook: JobFn, reach: Reach) {
        let scope = self.scope(reach);
        self.registry.add_hook(HookKind::Teardown, hook, scope);
    }

    fn scope(&self, reach: Reach) -> HookScope {
        reach.scope_from(
            &self.controller.application,
            &self.controller.app,
            &self.controller.controller,
        )
    }
}

/// Frozen set of jobs and worker declarations.
#[derive(Debug, Default)]
pub struct JobCatalog {
    jobs: Vec<Arc<Job>>,
    index: HashMap<JobId, usize>,
    workers: Vec<WorkerDeclaration>,
}

impl JobCatalog {
    /// Look up a job by its four identity components.
    pub fn get(
        &self,
        application: &str,
        app: &str,
        controller: &str,
        name: &str,
    ) -> Result<Arc<Job>, JobError> {
        let id = JobId::from_parts(application, app, controller, name);
        self.get_by_id(&id).ok_or_else(|| {
            not_found(&JobIdentity {
                application: application.to_string(),
                app: app.to_string(),
                controller: controller.to_string(),
                name: name.to_string(),
            })
        })
    }

    pub fn get_by_id(&self, id: &JobId) -> Option<Arc<Job>> {
        self.index.get(id).map(|&i| Arc::clone(&self.jobs[i]))
    }

    /// Jobs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Job>> {
        self.jobs.iter()
    }

    /// Jobs that get an auto worker.
    pub fn scheduled(&self) -> impl Iterator<Item = &Arc<Job>> {
        self.jobs.iter().filter(|job| job.schedule().is_scheduled())
    }

    pub fn worker_declarations(&self) -> &[WorkerDeclaration] {
        &self.workers
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
