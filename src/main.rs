//! jobvisor - cron-driven job scheduler and OS-process supervisor.
//!
//! `jobvisor run` supervises the demo application's jobs. Every job process
//! is this same binary started as `jobvisor job <application> <app>
//! <controller> <job>`.

mod cli;
mod demo;
mod logging;

use std::path::Path;

use clap::Parser;
use tracing::{error, info};

use jobvisor_config::{Config, ConfigLoader};
use jobvisor_core::JobArgs;
use jobvisor_runner::{RunnerOptions, WorkerRunner};
use jobvisor_scheduler::JobManager;

use crate::cli::{CONFIG_ENV, Cli, Commands};
use crate::demo::DemoApplication;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = ConfigLoader::load_or_default(&cli.config)?;

    match cli.command {
        None | Some(Commands::Run) => {
            logging::init_tracing(&config.logging)?;
            run_scheduler(config, &cli.config).await
        }
        Some(Commands::Job {
            application,
            app,
            controller,
            job,
        }) => {
            logging::init_child_tracing(&config.logging);
            let args = JobArgs {
                application,
                app,
                controller,
                job,
            };
            let code = run_job(config, args).await?;
            std::process::exit(code)
        }
        Some(Commands::Jobs) => print_jobs(config).await,
    }
}

/// Supervise every job until Ctrl+C.
async fn run_scheduler(
    config: Config,
    config_path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::path::absolute(config_path)?;
    let manager = JobManager::builder(config)
        .env(CONFIG_ENV, config_path.display().to_string())
        .build()?;
    demo::install_hooks(&manager)?;

    manager.run(&DemoApplication::new()).await?;

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");
    manager.shutdown().await;
    Ok(())
}

/// Child side: run one job and return the exit code.
async fn run_job(config: Config, args: JobArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let options = RunnerOptions::from_config(&config.jobs);
    let manager = JobManager::builder(config).build()?;
    demo::install_hooks(&manager)?;
    let catalog = manager.load(&DemoApplication::new()).await?;

    let outcome = WorkerRunner::for_current_process(options)
        .run(&catalog, &args.to_args())
        .await
        .inspect_err(|e| error!(error = %e, "Job process failed to start"))?;
    Ok(outcome.exit_code())
}

/// Print the catalog with its workers as JSON, without starting anything.
async fn print_jobs(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let manager = JobManager::builder(config).build()?;
    demo::install_hooks(&manager)?;
    manager.load(&DemoApplication::new()).await?;
    manager.create_scheduled_workers()?;

    let jobs = manager.jobs_information()?;
    println!("{}", serde_json::to_string_pretty(&jobs)?);
    Ok(())
}
