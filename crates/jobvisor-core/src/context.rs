//! Execution context handed to task bodies and hooks.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::id::JobIdentity;

/// Requests a controlled exit of the job process.
///
/// The runner drains these requests, runs the teardown hooks and exits with
/// the requested code.
#[derive(Debug, Clone)]
pub struct ExitHandle {
    tx: mpsc::UnboundedSender<i32>,
}

impl ExitHandle {
    /// Create a handle and the receiver the runner listens on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<i32>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Ask the runner to exit. Ignored once the runner has stopped listening.
    pub fn request(&self, code: i32) {
        let _ = self.tx.send(code);
    }
}

/// What a task body or hook sees of the job it runs for.
#[derive(Debug, Clone)]
pub struct JobContext {
    identity: Arc<JobIdentity>,
    cancel: CancellationToken,
    exit: ExitHandle,
}

impl JobContext {
    pub fn new(identity: Arc<JobIdentity>, cancel: CancellationToken, exit: ExitHandle) -> Self {
        Self {
            identity,
            cancel,
            exit,
        }
    }

    /// A context whose exit requests go nowhere. Useful outside a runner.
    pub fn detached(identity: JobIdentity) -> Self {
        let (exit, _) = ExitHandle::channel();
        Self::new(Arc::new(identity), CancellationToken::new(), exit)
    }

    pub fn identity(&self) -> &JobIdentity {
        &self.identity
    }

    /// Token cancelled when the runner starts shutting down.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until the runner starts shutting down.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Finish the job process: teardown hooks run, then the process exits with `code`.
    pub fn exit(&self, code: i32) {
        self.exit.request(code);
    }
}
