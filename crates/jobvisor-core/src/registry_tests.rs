use super::*;

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::context::JobContext;
use crate::controller::Controller;
use crate::job::job_fn;

fn noop() -> JobFn {
    job_fn(|_ctx| async { Ok(()) })
}

fn recorder(log: &Arc<Mutex<Vec<String>>>, label: &str) -> JobFn {
    let log = Arc::clone(log);
    let label = label.to_string();
    job_fn(move |_ctx| {
        let log = Arc::clone(&log);
        let label = label.clone();
        async move {
            log.lock().push(label);
            Ok(())
        }
    })
}

fn ctrl(application: &str, app: &str, controller: &str) -> ControllerIdentity {
    ControllerIdentity::new(application, app, controller)
}

struct ReportsController;

#[async_trait]
impl Controller for ReportsController {
    fn identity(&self) -> ControllerIdentity {
        ctrl("A", "app1", "Ctrl1")
    }

    async fn jobs(&self, registrar: &mut Registrar<'_>) -> Result<(), JobError> {
        registrar.create_job("Sync-Report", Some("*/5 * * * * *"), noop(), JobOptions::default())?;
        registrar.create_job("Process-Queue", None, noop(), JobOptions::default())?;
        registrar.create_workers(
            "Worker-X",
            "Process-Queue",
            WorkerOptions::default().with_concurrency(3),
        )?;
        Ok(())
    }
}

struct SilentController;

#[async_trait]
impl Controller for SilentController {
    fn identity(&self) -> ControllerIdentity {
        ctrl("A", "app1", "Silent")
    }
}

struct TestApplication {
    loads: AtomicUsize,
}

impl Application for TestApplication {
    fn name(&self) -> &str {
        "A"
    }

    fn controllers(&self) -> Vec<Arc<dyn crate::controller::Controller>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        vec![Arc::new(ReportsController), Arc::new(SilentController)]
    }
}

#[tokio::test]
async fn test_load_application() {
    let app = TestApplication {
        loads: AtomicUsize::new(0),
    };
    let mut registry = JobRegistry::new(EnablementFilter::allow_all());
    registry.load(&app).await.unwrap();
    assert_eq!(app.loads.load(Ordering::SeqCst), 1);
    assert_eq!(registry.len(), 2);

    let catalog = registry.finalize();
    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.scheduled().count(), 1);

    let declarations = catalog.worker_declarations();
    assert_eq!(declarations.len(), 1);
    assert_eq!(declarations[0].name, "Worker-X");
    assert_eq!(declarations[0].options.concurrency, 3);

    let queue = catalog.get("A", "app1", "Ctrl1", "Process-Queue").unwrap();
    assert_eq!(&declarations[0].job, queue.id());
}

#[test]
fn test_duplicate_job_fails_and_keeps_first() {
    let mut registry = JobRegistry::new(EnablementFilter::allow_all());
    let mut registrar = registry.registrar(ctrl("A", "app1", "Ctrl1"));

    registrar
        .create_job("Sync-Report", Some("now"), noop(), JobOptions::default())
        .unwrap();
    let err = registrar
        .create_job("Sync-Report", None, noop(), JobOptions::default())
        .unwrap_err();

    assert!(matches!(err, JobError::DuplicateJob(ref name) if name.contains("Sync-Report")));
    let catalog = registry.finalize();
    assert_eq!(catalog.len(), 1);
    let job = catalog.get("A", "app1", "Ctrl1", "Sync-Report").unwrap();
    assert!(matches!(job.schedule(), Schedule::Now));
}

#[test]
fn test_same_name_in_other_controller_is_distinct() {
    let mut registry = JobRegistry::new(EnablementFilter::allow_all());
    registry
        .registrar(ctrl("A", "app1", "Ctrl1"))
        .create_job("Job", None, noop(), JobOptions::default())
        .unwrap();
    registry
        .registrar(ctrl("A", "app1", "Ctrl2"))
        .create_job("Job", None, noop(), JobOptions::default())
        .unwrap();
    assert_eq!(registry.len(), 2);
}

#[test]
fn test_invalid_schedule_is_registration_error() {
    let mut registry = JobRegistry::new(EnablementFilter::allow_all());
    let err = registry
        .registrar(ctrl("A", "app1", "Ctrl1"))
        .create_job("Bad", Some("not a cron"), noop(), JobOptions::default())
        .unwrap_err();
    assert!(matches!(err, JobError::InvalidSchedule { .. }));
    assert!(registry.is_empty());
}

#[test]
fn test_disabled_controller_skips_job_and_workers() {
    let filter = EnablementFilter {
        controllers: Some(vec!["Other".to_string()]),
        ..EnablementFilter::default()
    };
    let mut registry = JobRegistry::new(filter);
    let mut registrar = registry.registrar(ctrl("A", "app1", "Ctrl1"));

    registrar
        .create_job("Process-Queue", None, noop(), JobOptions::default())
        .unwrap();
    registrar
        .create_workers("Worker-X", "Process-Queue", WorkerOptions::default())
        .unwrap();

    let catalog = registry.finalize();
    assert!(catalog.is_empty());
    assert!(catalog.worker_declarations().is_empty());
}

#[test]
fn test_enablement_filter_levels() {
    let identity = JobIdentity::new("A", "app1", "Ctrl1", "Job").unwrap();

    assert!(EnablementFilter::allow_all().disabled_reason(&identity).is_none());

    let filter = EnablementFilter {
        applications: Some(vec!["B".to_string()]),
        ..EnablementFilter::default()
    };
    assert!(filter.disabled_reason(&identity).unwrap().contains("Application \"A\""));

    let filter = EnablementFilter {
        applications: Some(vec!["A".to_string()]),
        apps: Some(vec![]),
        controllers: None,
    };
    assert!(filter.disabled_reason(&identity).unwrap().contains("App \"app1\""));
}

#[test]
fn test_create_workers_unknown_job() {
    let mut registry = JobRegistry::new(EnablementFilter::allow_all());
    let err = registry
        .registrar(ctrl("A", "app1", "Ctrl1"))
        .create_workers("Worker-X", "Missing", WorkerOptions::default())
        .unwrap_err();
    match err {
        JobError::JobNotFound(message) => {
            assert!(message.contains("Missing"));
            assert!(message.contains("Ctrl1"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_duplicate_worker_declaration() {
    let mut registry = JobRegistry::new(EnablementFilter::allow_all());
    let mut registrar = registry.registrar(ctrl("A", "app1", "Ctrl1"));
    registrar
        .create_job("Process-Queue", None, noop(), JobOptions::default())
        .unwrap();
    registrar
        .create_workers("Worker-X", "Process-Queue", WorkerOptions::default())
        .unwrap();
    let err = registrar
        .create_workers("Worker-X", "Process-Queue", WorkerOptions::default())
        .unwrap_err();
    assert!(matches!(err, JobError::DuplicateWorker(ref n) if n == "Worker-X"));
}

#[test]
fn test_get_lookup_miss_names_all_components() {
    let catalog = JobRegistry::new(EnablementFilter::allow_all()).finalize();
    let err = catalog.get("A", "app1", "Ctrl1", "Nope").unwrap_err();
    let message = err.to_string();
    for part in ["\"A\"", "\"app1\"", "\"Ctrl1\"", "\"Nope\""] {
        assert!(message.contains(part), "{message}");
    }
}

#[tokio::test]
async fn test_hooks_attached_in_registration_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = JobRegistry::new(EnablementFilter::allow_all());

    registry.add_hook(HookKind::Setup, recorder(&log, "global"), HookScope::all());
    {
        let mut registrar = registry.registrar(ctrl("A", "app1", "Ctrl1"));
        registrar
            .create_job("Job", None, noop(), JobOptions::default())
            .unwrap();
        registrar.job_setup(recorder(&log, "controller"), Reach::controller());
        registrar.job_teardown(recorder(&log, "teardown"), Reach::controller());
    }
    registry
        .registrar(ctrl("A", "app1", "Ctrl2"))
        .create_job("Other", None, noop(), JobOptions::default())
        .unwrap();
    registry.add_hook(
        HookKind::Setup,
        recorder(&log, "app-wide"),
        HookScope::all().application("A").app("app1"),
    );

    let catalog = registry.finalize();
    let job = catalog.get("A", "app1", "Ctrl1", "Job").unwrap();
    let other = catalog.get("A", "app1", "Ctrl2", "Other").unwrap();

    assert_eq!(job.setup_hooks().len(), 3);
    assert_eq!(job.teardown_hooks().len(), 1);
    assert_eq!(other.setup_hooks().len(), 2);
    assert!(other.teardown_hooks().is_empty());

    for hook in job.setup_hooks() {
        hook(JobContext::detached(job.identity().clone())).await.unwrap();
    }
    assert_eq!(*log.lock(), vec!["global", "controller", "app-wide"]);
}

#[test]
fn test_worker_options_concurrency_floor() {
    let options = WorkerOptions::default().with_concurrency(0);
    assert_eq!(options.effective_concurrency(), 1);
    let options = WorkerOptions::default().with_kill_wait(Duration::from_millis(10));
    assert_eq!(options.kill_wait, Some(Duration::from_millis(10)));
}
