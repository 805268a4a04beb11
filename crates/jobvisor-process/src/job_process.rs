//! One supervised job process slot.
//!
//! A [`JobProcess`] owns at most one live child at a time. The child is
//! replaced in place on restart; the slot itself lives as long as its worker.
//!
//! State transitions:
//!
//! ```text
//! NotStarted --run--> Running --exit--> Exited --run/check_health--> Running
//!                        |
//!                     restart
//!                        v
//!                     Killing --exit--> Running (respawned)
//!                        |
//!                  survives SIGKILL
//!                        v
//!                     Running (stuck, no respawn)
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use jobvisor_core::{JobArgs, JobIdentity};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::ProcessError;
use crate::events::{ProcessEvent, ProcessObserver, ProcessSnapshot};
use crate::launcher::{ExitInfo, LaunchCommand, ProcessLauncher};
use crate::log_relay::{ErrorLog, RelaySource, Stream, relay};
use crate::signal::Signal;

const DEFAULT_KILL_WAIT: Duration = Duration::from_millis(5000);
const DEFAULT_ERROR_CAPACITY: usize = 64;

/// Which worker and job a process runs for.
#[derive(Debug, Clone)]
pub struct ProcessTarget {
    pub worker: String,
    pub job: JobIdentity,
}

/// How job processes are started and stopped.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Executable started for every child.
    pub program: PathBuf,
    /// Wait after each termination signal.
    pub kill_wait: Duration,
    /// Extra environment for the child.
    pub env: Vec<(String, String)>,
    /// Number of recent stderr lines kept.
    pub error_capacity: usize,
}

impl ProcessOptions {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            kill_wait: DEFAULT_KILL_WAIT,
            env: Vec::new(),
            error_capacity: DEFAULT_ERROR_CAPACITY,
        }
    }

    pub fn with_kill_wait(mut self, kill_wait: Duration) -> Self {
        self.kill_wait = kill_wait;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Result of [`JobProcess::restart`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    /// No child was running; a new one was spawned.
    Spawned,
    /// The running child was stopped and replaced.
    Restarted,
    /// A kill sequence was already in flight; the request was dropped.
    Skipped,
    /// The child survived SIGKILL; no replacement was spawned.
    Stuck,
}

/// Result of a kill escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    /// Nothing was running.
    NotRunning,
    /// The child exited after `signals` signals.
    Exited { signals: usize },
    /// Another escalation holds the slot.
    Skipped,
    /// The child survived every signal.
    Stuck,
}

/// What the exit watcher does once the killed child is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KillIntent {
    Restart,
    Stop,
}

/// Why a spawn slot could not be claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Busy {
    Running,
    Spawning,
}

#[derive(Debug, Default)]
struct ProcessState {
    running: bool,
    /// A spawn is in progress; set and cleared under the state lock.
    spawning: bool,
    pid: Option<u32>,
    exit: Option<ExitInfo>,
    close_count: u64,
    generation: u64,
    kill_intent: Option<KillIntent>,
}

/// Supervises one child process of a worker.
pub struct JobProcess {
    id: String,
    target: ProcessTarget,
    options: ProcessOptions,
    launcher: Arc<dyn ProcessLauncher>,
    observer: Arc<dyn ProcessObserver>,
    state: Mutex<ProcessState>,
    killing: AtomicBool,
    errors: Arc<ErrorLog>,
}

impl JobProcess {
    pub fn new(
        id: impl Into<String>,
        target: ProcessTarget,
        options: ProcessOptions,
        launcher: Arc<dyn ProcessLauncher>,
        observer: Arc<dyn ProcessObserver>,
    ) -> Arc<Self> {
        let errors = Arc::new(ErrorLog::new(options.error_capacity));
        Arc::new(Self {
            id: id.into(),
            target,
            options,
            launcher,
            observer,
            state: Mutex::new(ProcessState::default()),
            killing: AtomicBool::new(false),
            errors,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target(&self) -> &ProcessTarget {
        &self.target
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn is_killing(&self) -> bool {
        self.killing.load(Ordering::SeqCst)
    }

    pub fn pid(&self) -> Option<u32> {
        self.state.lock().pid
    }

    pub fn close_count(&self) -> u64 {
        self.state.lock().close_count
    }

    pub fn last_exit(&self) -> Option<ExitInfo> {
        self.state.lock().exit
    }

    pub fn snapshot(&self) -> ProcessSnapshot {
        let state = self.state.lock();
        ProcessSnapshot {
            id: self.id.clone(),
            worker: self.target.worker.clone(),
            job: self.target.job.name.clone(),
            pid: state.pid,
            running: state.running,
            killing: self.killing.load(Ordering::SeqCst),
            exit_code: state.exit.and_then(|e| e.code),
            exit_signal: state.exit.and_then(|e| e.signal),
            close_count: state.close_count,
            errors: self.errors.lines(),
        }
    }

    /// Spawn a new child and start watching it.
    ///
    /// Fails with [`ProcessError::AlreadyRunning`] when a child is alive or
    /// another caller is spawning one.
    pub fn run(self: &Arc<Self>) -> Result<u32, ProcessError> {
        if self.claim_spawn().is_err() {
            return Err(ProcessError::AlreadyRunning(self.id.clone()));
        }
        self.spawn_claimed()
    }

    /// Mark the slot as spawning unless a child is alive or being spawned.
    fn claim_spawn(&self) -> Result<(), Busy> {
        let mut state = self.state.lock();
        if state.running {
            return Err(Busy::Running);
        }
        if state.spawning {
            return Err(Busy::Spawning);
        }
        state.spawning = true;
        Ok(())
    }

    /// Spawn a child into a slot claimed by [`Self::claim_spawn`].
    fn spawn_claimed(self: &Arc<Self>) -> Result<u32, ProcessError> {
        info!(
            worker = %self.target.worker,
            job = %self.target.job.name,
            process = %self.id,
            "Running process"
        );

        let command = LaunchCommand {
            program: self.options.program.clone(),
            args: JobArgs::from_identity(&self.target.job).to_args(),
            env: self.options.env.clone(),
        };

        let launched = self.launcher.spawn(&command).map_err(|e| {
            self.state.lock().spawning = false;
            error!(
                worker = %self.target.worker,
                job = %self.target.job.name,
                process = %self.id,
                error = %e,
                "Failed to spawn process"
            );
            e
        })?;
        let pid = launched.pid;

        let generation = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.spawning = false;
            state.running = true;
            state.pid = Some(pid);
            state.generation
        };
        self.errors.reset(generation);

        let source = RelaySource {
            job: self.target.job.name.clone(),
            worker: self.target.worker.clone(),
            process: self.id.clone(),
            pid,
        };
        if let Some(stdout) = launched.stdout {
            tokio::spawn(relay(
                stdout,
                Stream::Stdout,
                source.clone(),
                Arc::clone(&self.errors),
                generation,
            ));
        }
        if let Some(stderr) = launched.stderr {
            tokio::spawn(relay(
                stderr,
                Stream::Stderr,
                source,
                Arc::clone(&self.errors),
                generation,
            ));
        }

        let this = Arc::clone(self);
        let exit = launched.exit;
        tokio::spawn(async move {
            let info = exit.await;
            this.on_exit(generation, info);
        });

        self.observer
            .on_process_event(&ProcessEvent::Spawned(self.snapshot()));
        Ok(pid)
    }

    fn on_exit(self: &Arc<Self>, generation: u64, info: ExitInfo) {
        let intent = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            state.running = false;
            state.exit = Some(info);
            state.close_count += 1;
            let intent = state.kill_intent.take();
            if intent == Some(KillIntent::Restart) {
                state.spawning = true;
            }
            intent
        };

        let snapshot = self.snapshot();
        if info.success() {
            info!(
                worker = %self.target.worker,
                job = %self.target.job.name,
                process = %self.id,
                "Process finished"
            );
        } else {
            warn!(
                worker = %self.target.worker,
                job = %self.target.job.name,
                process = %self.id,
                code = ?info.code,
                signal = ?info.signal,
                "Process exited with error"
            );
        }

        self.observer
            .on_process_event(&ProcessEvent::Exited(snapshot.clone()));
        if !info.success() {
            self.observer
                .on_process_event(&ProcessEvent::Failed(snapshot));
        }

        match intent {
            Some(KillIntent::Restart) => {
                warn!(
                    worker = %self.target.worker,
                    job = %self.target.job.name,
                    process = %self.id,
                    "Killing successful"
                );
                // Spawn failures are already logged; the health sweep retries.
                let _ = self.spawn_claimed();
                self.killing.store(false, Ordering::SeqCst);
            }
            Some(KillIntent::Stop) => {
                info!(
                    worker = %self.target.worker,
                    job = %self.target.job.name,
                    process = %self.id,
                    "Process stopped"
                );
                self.killing.store(false, Ordering::SeqCst);
            }
            None => {}
        }
    }

    /// Replace the child: kill and respawn if it is running, spawn otherwise.
    ///
    /// A restart requested while a kill sequence is in flight is dropped.
    pub async fn restart(self: &Arc<Self>) -> Result<RestartOutcome, ProcessError> {
        if self.is_killing() {
            warn!(
                worker = %self.target.worker,
                job = %self.target.job.name,
                process = %self.id,
                "Job killing! Waiting..."
            );
            return Ok(RestartOutcome::Skipped);
        }

        match self.claim_spawn() {
            Ok(()) => {
                self.spawn_claimed()?;
                return Ok(RestartOutcome::Spawned);
            }
            Err(Busy::Spawning) => return Ok(self.skip_restart()),
            Err(Busy::Running) => {}
        }

        match self.escalate(KillIntent::Restart).await {
            KillOutcome::Exited { .. } => Ok(RestartOutcome::Restarted),
            KillOutcome::Skipped => Ok(RestartOutcome::Skipped),
            KillOutcome::Stuck => Ok(RestartOutcome::Stuck),
            KillOutcome::NotRunning => match self.claim_spawn() {
                Ok(()) => {
                    self.spawn_claimed()?;
                    Ok(RestartOutcome::Spawned)
                }
                Err(_) => Ok(self.skip_restart()),
            },
        }
    }

    fn skip_restart(&self) -> RestartOutcome {
        debug!(
            worker = %self.target.worker,
            process = %self.id,
            "Another caller is starting this process"
        );
        RestartOutcome::Skipped
    }

    /// Stop the child without respawning it.
    pub async fn terminate(self: &Arc<Self>) -> KillOutcome {
        self.escalate(KillIntent::Stop).await
    }

    /// Respawn the child if it is not running and no kill is in flight.
    ///
    /// Returns true when a spawn was attempted.
    pub fn check_health(self: &Arc<Self>) -> bool {
        let killing = self.is_killing();
        let claimed = !killing && self.claim_spawn().is_ok();

        debug!(
            process = %self.id,
            pid = ?self.pid(),
            claimed,
            killing,
            "Checking process"
        );

        if !claimed {
            return false;
        }

        error!(
            worker = %self.target.worker,
            job = %self.target.job.name,
            process = %self.id,
            "Process hangout"
        );
        // Spawn failures are already logged; the next sweep retries.
        let _ = self.spawn_claimed();
        true
    }

    fn has_exited(&self, pid: u32) -> bool {
        let state = self.state.lock();
        !state.running || state.pid != Some(pid)
    }

    async fn escalate(self: &Arc<Self>, intent: KillIntent) -> KillOutcome {
        if self
            .killing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(
                worker = %self.target.worker,
                job = %self.target.job.name,
                process = %self.id,
                "Job killing! Waiting..."
            );
            return KillOutcome::Skipped;
        }

        let pid = {
            let mut state = self.state.lock();
            match (state.running, state.pid) {
                (true, Some(pid)) => {
                    state.kill_intent = Some(intent);
                    pid
                }
                _ => {
                    drop(state);
                    self.killing.store(false, Ordering::SeqCst);
                    return KillOutcome::NotRunning;
                }
            }
        };

        warn!(
            worker = %self.target.worker,
            job = %self.target.job.name,
            process = %self.id,
            pid,
            "Killing job"
        );

        for (sent, signal) in Signal::ESCALATION.into_iter().enumerate() {
            warn!(process = %self.id, pid, %signal, "Sending kill signal");
            if let Err(e) = self.launcher.signal(pid, signal) {
                warn!(process = %self.id, pid, error = %e, "Failed to deliver signal");
            }
            tokio::time::sleep(self.options.kill_wait).await;
            if self.has_exited(pid) {
                return KillOutcome::Exited { signals: sent + 1 };
            }
        }

        {
            let mut state = self.state.lock();
            if !state.running || state.pid != Some(pid) || state.kill_intent.is_none() {
                return KillOutcome::Exited {
                    signals: Signal::ESCALATION.len(),
                };
            }
            state.kill_intent = None;
        }

        error!(
            worker = %self.target.worker,
            job = %self.target.job.name,
            process = %self.id,
            pid,
            "Process is stuck. It cannot be killed. Restart aborted"
        );
        self.killing.store(false, Ordering::SeqCst);
        self.observer
            .on_process_event(&ProcessEvent::Stuck(self.snapshot()));
        KillOutcome::Stuck
    }
}

impl std::fmt::Debug for JobProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobProcess")
            .field("id", &self.id)
            .field("worker", &self.target.worker)
            .field("job", &self.target.job.name)
            .field("killing", &self.is_killing())
            .finish()
    }
}

#[cfg(test)]
#[path = "job_process_tests.rs"]
mod tests;
