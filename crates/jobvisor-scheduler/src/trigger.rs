//! Cron triggers that run an action on every tick of a schedule.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use jobvisor_core::CronSchedule;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::SchedulerError;

/// Longest sleep before the wall clock is read again.
const RECHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Source of wall-clock time for cron triggers.
pub trait WallClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fires an action on every tick of a cron schedule until cancelled.
///
/// Ticks are computed in the configured time zone. Each action runs on its
/// own task, so a slow or failing run never delays or stops the trigger.
/// The wall clock is re-read at least every [`RECHECK_INTERVAL`], so clock
/// steps and host suspend shift at most one pending tick.
pub struct CronTrigger {
    id: String,
    schedule: CronSchedule,
    tz: Tz,
    clock: Arc<dyn WallClock>,
    valid: AtomicBool,
    fire_count: AtomicU64,
    cancel: CancellationToken,
}

impl CronTrigger {
    /// Start a trigger on the system clock. It stops when `parent` or the
    /// trigger itself is cancelled.
    pub fn start<F, Fut>(
        id: impl Into<String>,
        schedule: CronSchedule,
        tz: Tz,
        parent: &CancellationToken,
        action: F,
    ) -> Arc<Self>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SchedulerError>> + Send + 'static,
    {
        Self::start_with_clock(id, schedule, tz, Arc::new(SystemClock), parent, action)
    }

    pub fn start_with_clock<F, Fut>(
        id: impl Into<String>,
        schedule: CronSchedule,
        tz: Tz,
        clock: Arc<dyn WallClock>,
        parent: &CancellationToken,
        action: F,
    ) -> Arc<Self>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SchedulerError>> + Send + 'static,
    {
        let trigger = Arc::new(Self {
            id: id.into(),
            schedule,
            tz,
            clock,
            valid: AtomicBool::new(true),
            fire_count: AtomicU64::new(0),
            cancel: parent.child_token(),
        });

        debug!(
            trigger = %trigger.id,
            cron = %trigger.cron_expr(),
            tz = %tz,
            "Cron trigger started"
        );
        tokio::spawn(Arc::clone(&trigger).run_loop(action));
        trigger
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cron_expr(&self) -> &str {
        self.schedule.expr()
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    pub fn fire_count(&self) -> u64 {
        self.fire_count.load(Ordering::Relaxed)
    }

    /// Stop the trigger. Runs already started are not affected.
    pub fn cancel(&self) {
        self.valid.store(false, Ordering::SeqCst);
        self.cancel.cancel();
        debug!("CronTrigger {} cancelled", self.id);
    }

    /// Current time on the trigger's clock.
    pub fn now(&self) -> DateTime<Tz> {
        self.clock.now().with_timezone(&self.tz)
    }

    pub fn next_fire_time(&self) -> Option<DateTime<Tz>> {
        if !self.is_valid() {
            return None;
        }
        self.schedule.next_after(&self.now())
    }

    /// Time left until `at`; zero once it has passed.
    fn until(&self, at: &DateTime<Tz>) -> Duration {
        (at.with_timezone(&Utc) - self.clock.now())
            .to_std()
            .unwrap_or_default()
    }

    async fn run_loop<F, Fut>(self: Arc<Self>, action: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SchedulerError>> + Send + 'static,
    {
        let mut next = self.schedule.next_after(&self.now());

        while let Some(tick) = next {
            let wait = self.until(&tick);
            if !wait.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(wait.min(RECHECK_INTERVAL)) => continue,
                    _ = self.cancel.cancelled() => break,
                }
            }
            if self.cancel.is_cancelled() {
                break;
            }

            let fired = self.fire_count.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(
                trigger = %self.id,
                fire_count = fired,
                "CronTrigger fired for {}",
                tick.to_rfc3339()
            );

            let run = action();
            let id = self.id.clone();
            tokio::spawn(async move {
                if let Err(e) = run.await {
                    error!(trigger = %id, error = %e, "Scheduled run failed");
                }
            });

            // Ticks missed while the clock jumped forward are skipped.
            let now = self.now();
            next = self.schedule.next_after(if tick > now { &tick } else { &now });
        }

        if next.is_none() {
            debug!("CronTrigger {} has no upcoming schedule", self.id);
        }
        self.valid.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for CronTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronTrigger")
            .field("id", &self.id)
            .field("cron", &self.cron_expr())
            .field("tz", &self.tz)
            .field("valid", &self.is_valid())
            .field("fire_count", &self.fire_count())
            .finish()
    }
}

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod tests;
