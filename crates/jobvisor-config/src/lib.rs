//! # Jobvisor Config
//!
//! Configuration for the jobvisor scheduler: the `[jobs]` table consumed by
//! the orchestrator and the child runner, and the `[logging]` table consumed
//! by the binary.

mod error;
mod loader;
mod schema;

pub use error::ConfigError;
pub use loader::{ConfigLoader, ENV_OVERRIDE_PREFIX};
pub use schema::{Config, JobsConfig, LoggingConfig};
