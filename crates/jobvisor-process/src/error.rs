//! Process control errors.

use thiserror::Error;

use crate::signal::Signal;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process {0} is already running or being spawned")]
    AlreadyRunning(String),

    #[error("Failed to send {signal} to PID {pid}: {message}")]
    Signal {
        pid: u32,
        signal: Signal,
        message: String,
    },

    #[error("Not supported on this platform: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
