//! Worker registry, persistent worker startup and health sweeps.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::future::join_all;
use jobvisor_core::JobError;
use jobvisor_process::{ProcessEvent, ProcessLauncher, ProcessObserver, ProcessOptions};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::SchedulerError;
use crate::worker::{Worker, WorkerInfo, WorkerSpec};

const EVENT_CAPACITY: usize = 256;

/// Broadcasts process events of every worker to external subscribers.
pub struct EventHub {
    sender: broadcast::Sender<ProcessEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProcessEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(EVENT_CAPACITY)
    }
}

impl ProcessObserver for EventHub {
    fn on_process_event(&self, event: &ProcessEvent) {
        if event.is_failure() {
            error!(
                worker = %event.snapshot().worker,
                job = %event.snapshot().job,
                process = %event.snapshot().id,
                "Worker process error"
            );
        }
        // No subscribers is fine.
        let _ = self.sender.send(event.clone());
    }
}

/// Held while a health sweep is in progress.
pub struct SweepGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Registry of every worker in the orchestrator.
pub struct WorkerManager {
    launcher: Arc<dyn ProcessLauncher>,
    process_options: ProcessOptions,
    health_interval: Duration,
    workers: RwLock<Vec<Arc<Worker>>>,
    hub: Arc<EventHub>,
    checking: AtomicBool,
    sweep_count: AtomicU64,
}

impl WorkerManager {
    pub fn new(
        launcher: Arc<dyn ProcessLauncher>,
        process_options: ProcessOptions,
        health_interval: Duration,
    ) -> Self {
        Self {
            launcher,
            process_options,
            health_interval,
            workers: RwLock::new(Vec::new()),
            hub: Arc::new(EventHub::default()),
            checking: AtomicBool::new(false),
            sweep_count: AtomicU64::new(0),
        }
    }

    pub fn events(&self) -> &Arc<EventHub> {
        &self.hub
    }

    /// Receive every process event of every worker.
    pub fn subscribe(&self) -> broadcast::Receiver<ProcessEvent> {
        self.hub.subscribe()
    }

    pub fn health_interval(&self) -> Duration {
        self.health_interval
    }

    /// Register an already built worker. Names are unique.
    pub fn add_worker(&self, worker: Arc<Worker>) -> Result<Arc<Worker>, SchedulerError> {
        let mut workers = self.workers.write();
        if workers.iter().any(|w| w.name() == worker.name()) {
            return Err(JobError::DuplicateWorker(worker.name().to_string()).into());
        }
        workers.push(Arc::clone(&worker));
        Ok(worker)
    }

    /// Build a worker whose process events flow into the hub, register it
    /// and attach it to its job.
    pub fn create_worker(&self, spec: WorkerSpec) -> Result<Arc<Worker>, SchedulerError> {
        let upstream: Arc<dyn ProcessObserver> = self.hub.clone();
        let worker = Arc::new(Worker::new(
            spec,
            self.process_options.clone(),
            Arc::clone(&self.launcher),
            upstream,
        ));
        let worker = self.add_worker(worker)?;
        worker.job().attach_worker(worker.name());

        info!(
            worker = %worker.name(),
            job = %worker.job().name(),
            persistent = worker.is_persistent(),
            auto = worker.is_auto(),
            concurrency = worker.concurrency(),
            "Created worker"
        );
        Ok(worker)
    }

    pub fn get_worker(&self, name: &str) -> Option<Arc<Worker>> {
        self.workers.read().iter().find(|w| w.name() == name).cloned()
    }

    pub fn workers(&self) -> Vec<Arc<Worker>> {
        self.workers.read().clone()
    }

    pub fn len(&self) -> usize {
        self.workers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.read().is_empty()
    }

    /// Start every persistent worker. Failures are logged; the health sweep retries.
    pub async fn run_persistent_workers(&self) {
        let persistent: Vec<_> = self
            .workers()
            .into_iter()
            .filter(|w| w.is_persistent())
            .collect();
        info!(count = persistent.len(), "Running persistent workers");

        for worker in persistent {
            if let Err(e) = worker.run().await {
                error!(worker = %worker.name(), error = %e, "Failed to run persistent worker");
            }
        }
    }

    /// Run or restart the processes of one worker.
    pub async fn run_worker_processes(&self, name: &str) -> Result<(), SchedulerError> {
        let worker = self
            .get_worker(name)
            .ok_or_else(|| JobError::WorkerNotFound(name.to_string()))?;
        worker.run().await
    }

    /// Claim the sweep flag. `None` while another sweep is running.
    pub fn try_begin_sweep(&self) -> Option<SweepGuard<'_>> {
        self.checking
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| SweepGuard {
                flag: &self.checking,
            })
    }

    pub fn is_checking(&self) -> bool {
        self.checking.load(Ordering::SeqCst)
    }

    /// Number of completed health sweeps.
    pub fn sweep_count(&self) -> u64 {
        self.sweep_count.load(Ordering::Relaxed)
    }

    /// Run one health sweep over every worker.
    ///
    /// Returns false when a sweep was already in progress.
    pub fn verify_workers_health(&self) -> bool {
        let Some(_guard) = self.try_begin_sweep() else {
            debug!("Health sweep already running, skipping");
            return false;
        };

        let mut respawned = 0;
        for worker in self.workers() {
            respawned += worker.check_health();
        }
        self.sweep_count.fetch_add(1, Ordering::Relaxed);

        if respawned > 0 {
            warn!(respawned, "Health sweep respawned processes");
        } else {
            debug!("Health sweep completed");
        }
        true
    }

    /// Sweep every `health_interval` until `cancel` fires.
    pub async fn monitor_workers_health(self: Arc<Self>, cancel: CancellationToken) {
        let interval = self.health_interval;
        info!("Starting worker health monitor (interval: {:?})", interval);

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.verify_workers_health();
                }
                _ = cancel.cancelled() => {
                    info!("Worker health monitor shutting down");
                    break;
                }
            }
        }
    }

    pub fn workers_information(&self) -> Vec<WorkerInfo> {
        self.workers().iter().map(|w| w.info()).collect()
    }

    /// Stop every process of every worker without respawning.
    pub async fn shutdown(&self) {
        let workers = self.workers();
        info!(count = workers.len(), "Terminating workers");
        join_all(workers.iter().map(|w| w.terminate())).await;
    }
}

impl std::fmt::Debug for WorkerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerManager")
            .field("workers", &self.len())
            .field("health_interval", &self.health_interval)
            .field("checking", &self.is_checking())
            .finish()
    }
}

#[cfg(test)]
#[path = "worker_manager_tests.rs"]
mod tests;
