//! In-memory launcher for tests.

use std::collections::HashMap;
use std::io::Cursor;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::ProcessError;
use crate::launcher::{ExitInfo, LaunchCommand, LaunchedProcess, OutputStream, ProcessLauncher};
use crate::signal::Signal;

/// How fake children react to signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeBehavior {
    /// Exit on the given signal or any stronger one.
    ExitOn(Signal),
    /// Ignore every signal, including SIGKILL.
    Unkillable,
}

struct FakeChild {
    exit: Option<oneshot::Sender<ExitInfo>>,
}

struct FakeState {
    next_pid: u32,
    behavior: FakeBehavior,
    fail_spawns: bool,
    stdout: Option<String>,
    stderr: Option<String>,
    children: HashMap<u32, FakeChild>,
    spawned: Vec<(u32, LaunchCommand)>,
    signals: Vec<(u32, Signal)>,
}

/// Launcher whose children are simulated.
pub struct FakeLauncher {
    state: Mutex<FakeState>,
}

impl FakeLauncher {
    pub fn new(behavior: FakeBehavior) -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_pid: 1000,
                behavior,
                fail_spawns: false,
                stdout: None,
                stderr: None,
                children: HashMap::new(),
                spawned: Vec::new(),
                signals: Vec::new(),
            }),
        }
    }

    /// Children exit on SIGINT.
    pub fn cooperative() -> Self {
        Self::new(FakeBehavior::ExitOn(Signal::Interrupt))
    }

    pub fn set_behavior(&self, behavior: FakeBehavior) {
        self.state.lock().behavior = behavior;
    }

    /// Make subsequent spawns fail.
    pub fn fail_spawns(&self, fail: bool) {
        self.state.lock().fail_spawns = fail;
    }

    /// Output written by every subsequently spawned child.
    pub fn script_output(&self, stdout: Option<&str>, stderr: Option<&str>) {
        let mut state = self.state.lock();
        state.stdout = stdout.map(str::to_string);
        state.stderr = stderr.map(str::to_string);
    }

    /// Make a live child exit with `code`. Returns false if it is not alive.
    pub fn exit(&self, pid: u32, code: i32) -> bool {
        self.finish(pid, ExitInfo::code(code))
    }

    fn finish(&self, pid: u32, info: ExitInfo) -> bool {
        let sender = self
            .state
            .lock()
            .children
            .get_mut(&pid)
            .and_then(|child| child.exit.take());
        match sender {
            Some(tx) => tx.send(info).is_ok(),
            None => false,
        }
    }

    pub fn spawn_count(&self) -> usize {
        self.state.lock().spawned.len()
    }

    pub fn spawned(&self) -> Vec<(u32, LaunchCommand)> {
        self.state.lock().spawned.clone()
    }

    pub fn last_pid(&self) -> Option<u32> {
        self.state.lock().spawned.last().map(|(pid, _)| *pid)
    }

    pub fn signals(&self) -> Vec<(u32, Signal)> {
        self.state.lock().signals.clone()
    }

    pub fn signals_for(&self, pid: u32) -> Vec<Signal> {
        self.state
            .lock()
            .signals
            .iter()
            .filter(|(p, _)| *p == pid)
            .map(|(_, s)| *s)
            .collect()
    }

    /// Pids of children that have not exited.
    pub fn live_pids(&self) -> Vec<u32> {
        let state = self.state.lock();
        let mut pids: Vec<u32> = state
            .children
            .iter()
            .filter(|(_, child)| child.exit.is_some())
            .map(|(pid, _)| *pid)
            .collect();
        pids.sort_unstable();
        pids
    }
}

impl Default for FakeLauncher {
    fn default() -> Self {
        Self::cooperative()
    }
}

impl ProcessLauncher for FakeLauncher {
    fn spawn(&self, command: &LaunchCommand) -> Result<LaunchedProcess, ProcessError> {
        let mut state = self.state.lock();
        if state.fail_spawns {
            return Err(ProcessError::Spawn {
                program: command.program.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "fake spawn failure"),
            });
        }

        let pid = state.next_pid;
        state.next_pid += 1;

        let (tx, rx) = oneshot::channel();
        state.children.insert(pid, FakeChild { exit: Some(tx) });
        state.spawned.push((pid, command.clone()));

        let stream = |text: &Option<String>| {
            text.clone()
                .map(|t| Box::pin(Cursor::new(t.into_bytes())) as OutputStream)
        };
        let stdout = stream(&state.stdout);
        let stderr = stream(&state.stderr);

        Ok(LaunchedProcess {
            pid,
            exit: Box::pin(async move { rx.await.unwrap_or_default() }),
            stdout,
            stderr,
        })
    }

    fn signal(&self, pid: u32, signal: Signal) -> Result<(), ProcessError> {
        let exits = {
            let mut state = self.state.lock();
            state.signals.push((pid, signal));
            match state.behavior {
                FakeBehavior::ExitOn(threshold) => signal >= threshold,
                FakeBehavior::Unkillable => false,
            }
        };
        if exits {
            self.finish(pid, ExitInfo::signaled(signal));
        }
        Ok(())
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.state
            .lock()
            .children
            .get(&pid)
            .is_some_and(|child| child.exit.is_some())
    }
}
