//! # Jobvisor Core
//!
//! Job model and registration for the jobvisor scheduler.
//!
//! A [`Job`] is an immutable descriptor of one schedulable unit of work:
//! its identity (application, app, controller, name), a [`Schedule`], the
//! task body and the setup/teardown hooks that wrap it inside the child
//! process. Jobs are declared by [`Controller`]s through a [`Registrar`]
//! and collected into a [`JobCatalog`] by the [`JobRegistry`].

pub mod args;
pub mod context;
pub mod controller;
pub mod error;
pub mod hooks;
pub mod id;
pub mod job;
pub mod registry;
pub mod schedule;

pub use args::{JOB_MODE_MARKER, JobArgs};
pub use context::{ExitHandle, JobContext};
pub use controller::{Application, Controller, ControllerIdentity};
pub use error::JobError;
pub use hooks::{HookKind, HookScope, Reach};
pub use id::{JobId, JobIdentity};
pub use job::{Job, JobFn, JobFuture, JobOptions, job_fn};
pub use registry::{
    EnablementFilter, JobCatalog, JobRegistry, Registrar, WorkerDeclaration, WorkerOptions,
};
pub use schedule::{CronSchedule, Schedule};
