//! CLI definitions for jobvisor.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Environment variable carrying the configuration path, also set for job processes.
pub(crate) const CONFIG_ENV: &str = "JOBVISOR_CONFIG";

/// jobvisor CLI.
#[derive(Parser)]
#[command(name = "jobvisor")]
#[command(about = "Cron-driven job scheduler and OS-process supervisor")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        env = CONFIG_ENV,
        default_value = "config/jobvisor.toml",
        global = true
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the scheduler in foreground (default)
    Run,

    /// Run a single job inside a job process
    Job {
        /// Application name
        application: String,
        /// App name
        app: String,
        /// Controller name
        controller: String,
        /// Job name
        job: String,
    },

    /// Print the job catalog as JSON
    Jobs,
}
