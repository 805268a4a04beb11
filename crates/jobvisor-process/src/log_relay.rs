//! Relays child output into the supervisor's log.
//!
//! Job processes log JSON records on stdout. Each line is parsed as a
//! leveled record and re-emitted with the job, worker and process ids
//! attached. Lines that are not records are logged as errors.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl ChildLevel {
    fn parse(level: &str) -> Option<Self> {
        match level.to_ascii_lowercase().as_str() {
            "error" | "fatal" => Some(ChildLevel::Error),
            "warn" | "warning" => Some(ChildLevel::Warn),
            "info" => Some(ChildLevel::Info),
            "debug" => Some(ChildLevel::Debug),
            "trace" => Some(ChildLevel::Trace),
            _ => None,
        }
    }
}

/// A structured log line emitted by a child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRecord {
    pub level: ChildLevel,
    pub module: Option<String>,
    pub message: String,
}

/// Parse one output line.
///
/// Accepts flat `{"level", "module", "message"}` objects and the JSON
/// format of `tracing-subscriber` (`fields.message`, `target`).
pub fn parse_line(line: &str) -> Option<ChildRecord> {
    let value: Value = serde_json::from_str(line).ok()?;
    let level = ChildLevel::parse(value.get("level")?.as_str()?)?;

    let message = value
        .get("message")
        .or_else(|| value.pointer("/fields/message"))?
        .as_str()?
        .to_string();

    let module = value
        .get("module")
        .or_else(|| value.get("target"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(ChildRecord {
        level,
        module,
        message,
    })
}

/// Bounded buffer of the most recent error lines of the current child.
#[derive(Debug)]
pub struct ErrorLog {
    capacity: usize,
    inner: Mutex<ErrorLogInner>,
}

#[derive(Debug, Default)]
struct ErrorLogInner {
    generation: u64,
    lines: VecDeque<String>,
}

impl ErrorLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(ErrorLogInner::default()),
        }
    }

    /// Drop collected lines and accept lines from `generation` only.
    pub fn reset(&self, generation: u64) {
        let mut inner = self.inner.lock();
        inner.generation = generation;
        inner.lines.clear();
    }

    /// Record a line. Lines from a previous child are ignored.
    pub fn push(&self, generation: u64, line: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return;
        }
        if inner.lines.len() == self.capacity {
            inner.lines.pop_front();
        }
        inner.lines.push_back(line.into());
    }

    pub fn lines(&self) -> Vec<String> {
        self.inner.lock().lines.iter().cloned().collect()
    }
}

/// Where relayed lines come from.
#[derive(Debug, Clone)]
pub struct RelaySource {
    pub job: String,
    pub worker: String,
    pub process: String,
    pub pid: u32,
}

/// Which child stream a relay reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Relay every line of `stream` until EOF. Stderr lines are also kept in `errors`.
pub async fn relay<R>(
    stream: R,
    kind: Stream,
    source: RelaySource,
    errors: Arc<ErrorLog>,
    generation: u64,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                // Children may write arbitrary bytes; invalid UTF-8 is replaced.
                let decoded = String::from_utf8_lossy(&buf);
                let line = decoded.trim_end_matches(['\n', '\r']);
                if line.trim().is_empty() {
                    continue;
                }
                if kind == Stream::Stderr {
                    errors.push(generation, line.to_string());
                }
                emit(&source, line);
            }
            Err(e) => {
                debug!(job = %source.job, process = %source.process, error = %e, "Child output closed");
                break;
            }
        }
    }
}

fn emit(source: &RelaySource, line: &str) {
    let Some(record) = parse_line(line) else {
        error!(
            job = %source.job,
            worker = %source.worker,
            process = %source.process,
            pid = source.pid,
            "{}",
            line
        );
        return;
    };

    let module = record.module.as_deref().unwrap_or("-");
    macro_rules! relay_event {
        ($level:ident) => {
            $level!(
                job = %source.job,
                worker = %source.worker,
                process = %source.process,
                pid = source.pid,
                module = %module,
                "{}",
                record.message
            )
        };
    }

    match record.level {
        ChildLevel::Error => relay_event!(error),
        ChildLevel::Warn => relay_event!(warn),
        ChildLevel::Info => relay_event!(info),
        ChildLevel::Debug => relay_event!(debug),
        ChildLevel::Trace => relay_event!(trace),
    }
}
