//! Setup, task and teardown pipeline of one job process.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use jobvisor_config::JobsConfig;
use jobvisor_core::{ExitHandle, Job, JobArgs, JobCatalog, JobContext, JobError};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::RunnerError;
use crate::probe::{OsParentProbe, ParentProbe};

const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(10);

/// Runner tuning.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// How often the parent liveness probe runs.
    pub probe_interval: Duration,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            probe_interval: DEFAULT_PROBE_INTERVAL,
        }
    }
}

impl RunnerOptions {
    pub fn from_config(config: &JobsConfig) -> Self {
        Self {
            probe_interval: config.parent_probe_interval(),
        }
    }
}

/// Why the job process is finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Setup hooks and the task body finished.
    Completed,
    /// A setup hook or the task body returned an error.
    Failed,
    /// SIGINT received.
    Interrupted,
    /// The pipe to the parent closed.
    ParentDisconnected,
    /// The liveness probe found the parent gone.
    ParentGone,
    /// The task asked to exit with a code.
    ExitRequested(i32),
}

impl Termination {
    pub fn exit_code(&self) -> i32 {
        match self {
            Termination::Failed => 1,
            Termination::ExitRequested(code) => *code,
            _ => 0,
        }
    }
}

/// Result of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub termination: Termination,
    /// Whether every teardown hook succeeded.
    pub teardown_ok: bool,
}

impl RunOutcome {
    /// Process exit code. A failed teardown after a clean run exits with 1.
    pub fn exit_code(&self) -> i32 {
        match self.termination {
            Termination::Completed if !self.teardown_ok => 1,
            termination => termination.exit_code(),
        }
    }
}

/// Runs one job inside a child process.
pub struct WorkerRunner {
    options: RunnerOptions,
    interrupt: Option<BoxFuture<'static, ()>>,
    parent_pipe: Option<Box<dyn AsyncRead + Send + Unpin>>,
    probe: Option<Arc<dyn ParentProbe>>,
}

impl WorkerRunner {
    /// A runner that only stops on completion or exit requests.
    pub fn new(options: RunnerOptions) -> Self {
        Self {
            options,
            interrupt: None,
            parent_pipe: None,
            probe: None,
        }
    }

    /// A runner wired to the current process: SIGINT, stdin and the parent pid.
    pub fn for_current_process(options: RunnerOptions) -> Self {
        let runner = Self::new(options)
            .with_interrupt(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Failed to listen for SIGINT");
                    std::future::pending::<()>().await;
                }
            })
            .with_parent_pipe(tokio::io::stdin());

        match OsParentProbe::current() {
            Some(probe) => runner.with_probe(Arc::new(probe)),
            None => runner,
        }
    }

    /// Finish when `signal` resolves.
    pub fn with_interrupt(mut self, signal: impl Future<Output = ()> + Send + 'static) -> Self {
        self.interrupt = Some(Box::pin(signal));
        self
    }

    /// Finish when `pipe` reaches EOF.
    pub fn with_parent_pipe(mut self, pipe: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.parent_pipe = Some(Box::new(pipe));
        self
    }

    /// Finish when `probe` reports the parent gone.
    pub fn with_probe(mut self, probe: Arc<dyn ParentProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Run the job named by `args` (`job <application> <app> <controller> <job>`).
    pub async fn run<S: AsRef<str>>(
        self,
        catalog: &JobCatalog,
        args: &[S],
    ) -> Result<RunOutcome, RunnerError> {
        let args = JobArgs::parse(args)?;
        let job = catalog.get(&args.application, &args.app, &args.controller, &args.job)?;
        Ok(self.run_job(job).await)
    }

    /// Run `job`: setup hooks, then the task body, then teardown hooks.
    pub async fn run_job(self, job: Arc<Job>) -> RunOutcome {
        let cancel = CancellationToken::new();
        let (exit, mut exit_rx) = ExitHandle::channel();
        let ctx = JobContext::new(Arc::new(job.identity().clone()), cancel.clone(), exit);

        let WorkerRunner {
            options,
            interrupt,
            parent_pipe,
            probe,
        } = self;

        let termination = {
            let pipeline = run_pipeline(&job, &ctx);
            tokio::pin!(pipeline);

            tokio::select! {
                result = &mut pipeline => match result {
                    Ok(()) => Termination::Completed,
                    Err(e) => {
                        error!(job = %job.name(), error = %e, "Job failed");
                        Termination::Failed
                    }
                },
                _ = wait_interrupt(interrupt) => {
                    warn!(job = %job.name(), "Interrupted. Closing...");
                    Termination::Interrupted
                }
                _ = wait_disconnect(parent_pipe) => {
                    error!(job = %job.name(), "Parent disconnected. Closing...");
                    Termination::ParentDisconnected
                }
                _ = watch_parent(probe, options.probe_interval) => {
                    error!(job = %job.name(), "Parent is gone. Closing...");
                    Termination::ParentGone
                }
                Some(code) = exit_rx.recv() => {
                    info!(job = %job.name(), code, "Exit requested");
                    Termination::ExitRequested(code)
                }
            }
        };

        if termination != Termination::Completed {
            cancel.cancel();
        }
        let teardown_ok = run_teardown(&job, &ctx, termination).await;

        info!(
            job = %job.name(),
            pid = std::process::id(),
            ?termination,
            "Process closed!"
        );
        RunOutcome {
            termination,
            teardown_ok,
        }
    }
}

impl std::fmt::Debug for WorkerRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRunner")
            .field("options", &self.options)
            .field("interrupt", &self.interrupt.is_some())
            .field("parent_pipe", &self.parent_pipe.is_some())
            .field("probe", &self.probe.is_some())
            .finish()
    }
}

async fn run_pipeline(job: &Job, ctx: &JobContext) -> Result<(), JobError> {
    for hook in job.setup_hooks() {
        info!("Running job setup from \"{}\"", job.name());
        hook(ctx.clone()).await?;
    }

    info!("Running job \"{}\"", job.name());
    (job.task())(ctx.clone()).await
}

/// Run every teardown hook in order. Failures are logged and do not stop the rest.
async fn run_teardown(job: &Job, ctx: &JobContext, termination: Termination) -> bool {
    let mut ok = true;
    for hook in job.teardown_hooks() {
        if termination == Termination::Completed {
            info!("Running job teardown from \"{}\"", job.name());
        } else {
            info!("Running job teardown on {:?} from \"{}\"", termination, job.name());
        }
        if let Err(e) = hook(ctx.clone()).await {
            error!(job = %job.name(), error = %e, "Error during teardown");
            ok = false;
        }
    }
    ok
}

async fn wait_interrupt(interrupt: Option<BoxFuture<'static, ()>>) {
    match interrupt {
        Some(signal) => signal.await,
        None => std::future::pending().await,
    }
}

async fn wait_disconnect(pipe: Option<Box<dyn AsyncRead + Send + Unpin>>) {
    let Some(mut pipe) = pipe else {
        return std::future::pending().await;
    };

    let mut buf = [0u8; 256];
    loop {
        match pipe.read(&mut buf).await {
            Ok(0) => return,
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "Failed to read parent pipe");
                return std::future::pending().await;
            }
        }
    }
}

async fn watch_parent(probe: Option<Arc<dyn ParentProbe>>, interval: Duration) {
    let Some(probe) = probe else {
        return std::future::pending().await;
    };

    loop {
        tokio::time::sleep(interval).await;
        debug!("Check parent...");
        if !probe.parent_alive() {
            return;
        }
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
