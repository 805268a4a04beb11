use super::*;

use std::sync::atomic::AtomicUsize;
use std::time::Duration;

use chrono::TimeZone;

use crate::test_support::{TokioClock, settle};

fn every_ten_seconds() -> CronSchedule {
    CronSchedule::parse("*/10 * * * * *").unwrap()
}

/// Sleep until just after the trigger's next tick.
async fn advance_past_next(trigger: &CronTrigger) {
    let next = trigger.next_fire_time().unwrap();
    let wait = (next - trigger.now()).to_std().unwrap();
    tokio::time::sleep(wait + Duration::from_millis(1)).await;
    settle().await;
}

type Ready = std::future::Ready<Result<(), SchedulerError>>;

fn start<F>(id: &str, tz: Tz, root: &CancellationToken, action: F) -> Arc<CronTrigger>
where
    F: Fn() -> Ready + Send + Sync + 'static,
{
    CronTrigger::start_with_clock(id, every_ten_seconds(), tz, TokioClock::new(), root, action)
}

fn counting(runs: &Arc<AtomicUsize>) -> impl Fn() -> Ready + Send + Sync + 'static {
    let runs = Arc::clone(runs);
    move || {
        runs.fetch_add(1, Ordering::SeqCst);
        std::future::ready(Ok(()))
    }
}

#[tokio::test(start_paused = true)]
async fn test_trigger_fires_on_each_tick() {
    let runs = Arc::new(AtomicUsize::new(0));
    let root = CancellationToken::new();
    let trigger = start("sync-report", Tz::UTC, &root, counting(&runs));

    assert_eq!(trigger.id(), "sync-report");
    assert_eq!(trigger.cron_expr(), "*/10 * * * * *");
    assert!(trigger.is_valid());
    assert_eq!(trigger.fire_count(), 0);

    advance_past_next(&trigger).await;
    assert_eq!(trigger.fire_count(), 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    advance_past_next(&trigger).await;
    assert_eq!(trigger.fire_count(), 2);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_next_fire_time_is_in_the_future() {
    let root = CancellationToken::new();
    let runs = Arc::new(AtomicUsize::new(0));
    let trigger = start("paris", Tz::Europe__Paris, &root, counting(&runs));

    let next = trigger.next_fire_time().unwrap();
    assert!(next > trigger.now());
    assert!((next - trigger.now()) <= chrono::Duration::seconds(10));
    assert_eq!(next.timezone(), Tz::Europe__Paris);
}

#[tokio::test(start_paused = true)]
async fn test_failing_run_keeps_trigger_alive() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let root = CancellationToken::new();
    let trigger = start("failing", Tz::UTC, &root, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        std::future::ready(Err(SchedulerError::NotLoaded))
    });

    advance_past_next(&trigger).await;
    advance_past_next(&trigger).await;

    assert!(trigger.is_valid());
    assert_eq!(trigger.fire_count(), 2);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_firing() {
    let runs = Arc::new(AtomicUsize::new(0));
    let root = CancellationToken::new();
    let trigger = start("cancel", Tz::UTC, &root, counting(&runs));

    trigger.cancel();
    assert!(!trigger.is_valid());
    assert!(trigger.next_fire_time().is_none());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(trigger.fire_count(), 0);
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(!root.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_parent_cancellation_stops_trigger() {
    let runs = Arc::new(AtomicUsize::new(0));
    let root = CancellationToken::new();
    let trigger = start("parent", Tz::UTC, &root, counting(&runs));

    root.cancel();
    settle().await;

    assert!(!trigger.is_valid());
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(trigger.fire_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_wall_clock_step_moves_next_tick() {
    let runs = Arc::new(AtomicUsize::new(0));
    let root = CancellationToken::new();
    let clock = TokioClock::at(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
    let trigger = CronTrigger::start_with_clock(
        "minutely",
        CronSchedule::parse("0 * * * * *").unwrap(),
        Tz::UTC,
        clock.clone(),
        &root,
        counting(&runs),
    );
    settle().await;

    // Wall time jumps 30s ahead while tokio time stands still, as after a suspend.
    clock.step(chrono::Duration::seconds(30));
    assert_eq!(
        trigger.next_fire_time().unwrap(),
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 1, 0).unwrap()
    );

    tokio::time::sleep(Duration::from_secs(31)).await;
    settle().await;
    assert_eq!(trigger.fire_count(), 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    settle().await;
    assert_eq!(trigger.fire_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_wall_clock_jump_past_ticks_fires_once() {
    let runs = Arc::new(AtomicUsize::new(0));
    let root = CancellationToken::new();
    let clock = TokioClock::at(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
    let trigger = CronTrigger::start_with_clock(
        "minutely",
        CronSchedule::parse("0 * * * * *").unwrap(),
        Tz::UTC,
        clock.clone(),
        &root,
        counting(&runs),
    );
    settle().await;

    clock.step(chrono::Duration::minutes(5));
    tokio::time::sleep(Duration::from_secs(11)).await;
    settle().await;

    assert_eq!(trigger.fire_count(), 1);
    assert!(trigger.next_fire_time().unwrap() > trigger.now());
}
