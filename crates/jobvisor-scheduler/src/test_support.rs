use std::sync::Arc;
use std::time::Duration;

use jobvisor_core::{
    ControllerIdentity, EnablementFilter, Job, JobOptions, JobRegistry, job_fn,
};
use chrono::{DateTime, Utc};
use jobvisor_process::{ProcessEvent, ProcessObserver, ProcessOptions};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::trigger::WallClock;

pub const KILL_WAIT: Duration = Duration::from_millis(100);

pub fn controller() -> ControllerIdentity {
    ControllerIdentity::new("A", "app1", "Ctrl1")
}

pub fn job(name: &str, schedule: Option<&str>) -> Arc<Job> {
    let mut registry = JobRegistry::new(EnablementFilter::allow_all());
    registry
        .registrar(controller())
        .create_job(name, schedule, job_fn(|_ctx| async { Ok(()) }), JobOptions::default())
        .unwrap();
    registry.finalize().get("A", "app1", "Ctrl1", name).unwrap()
}

pub fn process_options() -> ProcessOptions {
    ProcessOptions::new("/usr/local/bin/jobvisor").with_kill_wait(KILL_WAIT)
}

#[derive(Default)]
pub struct RecordingObserver {
    pub events: Mutex<Vec<ProcessEvent>>,
}

impl RecordingObserver {
    pub fn failures(&self) -> Vec<ProcessEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, ProcessEvent::Failed(_)))
            .cloned()
            .collect()
    }
}

impl ProcessObserver for RecordingObserver {
    fn on_process_event(&self, event: &ProcessEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Let spawned exit watchers run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Wall clock that advances with tokio time and can be stepped by hand.
pub struct TokioClock {
    base: DateTime<Utc>,
    started: Instant,
    offset: Mutex<chrono::Duration>,
}

impl TokioClock {
    pub fn new() -> Arc<Self> {
        Self::at(Utc::now())
    }

    pub fn at(base: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            base,
            started: Instant::now(),
            offset: Mutex::new(chrono::Duration::zero()),
        })
    }

    /// Move wall time without moving tokio time.
    pub fn step(&self, by: chrono::Duration) {
        *self.offset.lock() += by;
    }
}

impl WallClock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.started.elapsed()).unwrap_or_default();
        self.base + elapsed + *self.offset.lock()
    }
}
