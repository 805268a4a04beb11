//! Demo application shipped with the binary.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jobvisor_core::{
    Application, Controller, ControllerIdentity, HookScope, JobError, JobOptions, Reach, Registrar,
    WorkerOptions, job_fn,
};
use jobvisor_scheduler::{JobManager, SchedulerError};
use tracing::info;

pub(crate) const APPLICATION: &str = "demo";

/// Reports: a cron job, a startup job and a queue consumer pool.
struct ReportsController;

#[async_trait]
impl Controller for ReportsController {
    fn identity(&self) -> ControllerIdentity {
        ControllerIdentity::new(APPLICATION, "reports", "ReportsController")
    }

    async fn jobs(&self, registrar: &mut Registrar<'_>) -> Result<(), JobError> {
        registrar.create_job(
            "Sync-Report",
            Some("*/30 * * * * *"),
            job_fn(|ctx| async move {
                info!(job = %ctx.identity(), "Syncing report");
                tokio::time::sleep(Duration::from_secs(2)).await;
                info!(job = %ctx.identity(), "Report synced");
                Ok(())
            }),
            JobOptions {
                description: Some("Push the latest report every 30 seconds".to_string()),
            },
        )?;

        registrar.create_job(
            "Warmup",
            Some("now"),
            job_fn(|ctx| async move {
                info!(job = %ctx.identity(), "Warming caches");
                Ok(())
            }),
            JobOptions::default(),
        )?;

        registrar.create_job(
            "Process-Queue",
            None,
            job_fn(|ctx| async move {
                let mut handled = 0u64;
                loop {
                    tokio::select! {
                        _ = ctx.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(5)) => {
                            handled += 1;
                            info!(job = %ctx.identity(), handled, "Queue polled");
                        }
                    }
                }
                Ok(())
            }),
            JobOptions {
                description: Some("Consume the work queue".to_string()),
            },
        )?;

        registrar.create_workers(
            "Worker-X",
            "Process-Queue",
            WorkerOptions::default().with_concurrency(3),
        )?;

        registrar.job_teardown(
            job_fn(|ctx| async move {
                info!(job = %ctx.identity(), "Releasing report resources");
                Ok(())
            }),
            Reach::controller(),
        );

        Ok(())
    }
}

/// Maintenance: a nightly cleanup in a second app.
struct MaintenanceController;

#[async_trait]
impl Controller for MaintenanceController {
    fn identity(&self) -> ControllerIdentity {
        ControllerIdentity::new(APPLICATION, "maintenance", "CleanupController")
    }

    async fn jobs(&self, registrar: &mut Registrar<'_>) -> Result<(), JobError> {
        registrar.create_job(
            "Purge-Temp",
            Some("0 3 * * *"),
            job_fn(|ctx| async move {
                info!(job = %ctx.identity(), "Purging temporary files");
                Ok(())
            }),
            JobOptions::default(),
        )
    }
}

pub(crate) struct DemoApplication {
    controllers: Vec<Arc<dyn Controller>>,
}

impl DemoApplication {
    pub(crate) fn new() -> Self {
        Self {
            controllers: vec![Arc::new(ReportsController), Arc::new(MaintenanceController)],
        }
    }
}

impl Application for DemoApplication {
    fn name(&self) -> &str {
        APPLICATION
    }

    fn controllers(&self) -> Vec<Arc<dyn Controller>> {
        self.controllers.clone()
    }
}

/// Hooks shared by the supervisor and job processes.
pub(crate) fn install_hooks(manager: &JobManager) -> Result<(), SchedulerError> {
    manager.set_setup_function(
        job_fn(|ctx| async move {
            info!(job = %ctx.identity(), pid = std::process::id(), "Job process ready");
            Ok(())
        }),
        HookScope::all().application(APPLICATION),
    )
}
