//! Process lifecycle events.

use serde::Serialize;

/// Point-in-time view of a job process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessSnapshot {
    /// Ordinal within the worker, e.g. `#1`.
    pub id: String,
    pub worker: String,
    pub job: String,
    pub pid: Option<u32>,
    pub running: bool,
    pub killing: bool,
    pub exit_code: Option<i32>,
    pub exit_signal: Option<i32>,
    pub close_count: u64,
    /// Recent stderr lines of the current child.
    pub errors: Vec<String>,
}

/// Something that happened to a job process.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "process", rename_all = "snake_case")]
pub enum ProcessEvent {
    Spawned(ProcessSnapshot),
    Exited(ProcessSnapshot),
    /// The process exited without a zero exit code.
    Failed(ProcessSnapshot),
    /// The process survived SIGKILL.
    Stuck(ProcessSnapshot),
}

impl ProcessEvent {
    pub fn snapshot(&self) -> &ProcessSnapshot {
        match self {
            ProcessEvent::Spawned(s)
            | ProcessEvent::Exited(s)
            | ProcessEvent::Failed(s)
            | ProcessEvent::Stuck(s) => s,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ProcessEvent::Failed(_) | ProcessEvent::Stuck(_))
    }
}

/// Receives process events. Called synchronously from the supervising task.
pub trait ProcessObserver: Send + Sync {
    fn on_process_event(&self, event: &ProcessEvent);
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProcessObserver for NoopObserver {
    fn on_process_event(&self, _event: &ProcessEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> ProcessSnapshot {
        ProcessSnapshot {
            id: "#1".to_string(),
            worker: "Worker-X".to_string(),
            job: "Process-Queue".to_string(),
            pid: Some(100),
            running: false,
            killing: false,
            exit_code: Some(1),
            exit_signal: None,
            close_count: 1,
            errors: vec!["boom".to_string()],
        }
    }

    #[test]
    fn test_event_snapshot_access() {
        let event = ProcessEvent::Failed(snapshot());
        assert_eq!(event.snapshot().id, "#1");
        assert!(event.is_failure());
        assert!(!ProcessEvent::Exited(snapshot()).is_failure());
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(ProcessEvent::Stuck(snapshot())).unwrap();
        assert_eq!(json["event"], "stuck");
        assert_eq!(json["process"]["job"], "Process-Queue");
        assert_eq!(json["process"]["exit_code"], 1);
    }
}
