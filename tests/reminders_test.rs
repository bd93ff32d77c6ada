//! Reminder Scheduler Integration Tests
//!
//! Dispatch semantics against a real SQLite store and a fake platform.

mod support;

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset};
use neroniel_bot::channels::traits::MAX_CONTENT_LENGTH;
use neroniel_bot::clock;
use neroniel_bot::reminders::{NewReminder, Reminder, ScheduleError};
use neroniel_bot::storage::StorageError;
use neroniel_bot::{
    ChannelId, Database, DispatchOutcome, GuildId, ReminderLog, ReminderScheduler, UserId,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use support::{FakePlatform, Sent};
use tempfile::TempDir;

fn scheduler(db: Arc<dyn ReminderLog>, platform: Arc<FakePlatform>) -> ReminderScheduler {
    ReminderScheduler::new(db, platform)
}

fn schedule_due(s: &ReminderScheduler, user: u64, channel: u64, note: &str) -> Reminder {
    s.schedule(
        UserId(user),
        GuildId(1),
        ChannelId(channel),
        note,
        clock::now() - ChronoDuration::seconds(1),
    )
    .unwrap()
}

#[tokio::test]
async fn test_due_reminder_is_delivered_once() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let platform = FakePlatform::new();
    let s = scheduler(db.clone(), platform.clone());

    let reminder = schedule_due(&s, 42, 100, "drink water");
    let report = s.tick(clock::now()).await.unwrap();

    assert_eq!(report.outcomes, [DispatchOutcome::Delivered(reminder.id)]);
    match platform.last().unwrap() {
        Sent::Message(channel, _, message) => {
            assert_eq!(channel, ChannelId(100));
            assert_eq!(message.body(), "🔔 <@42>, reminder: drink water");
        }
        other => panic!("expected channel message, got {:?}", other),
    }

    // Deleted after sending
    assert!(s.tick(clock::now()).await.unwrap().outcomes.is_empty());
    assert_eq!(platform.sent().len(), 1);
}

#[tokio::test]
async fn test_future_reminder_waits() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let platform = FakePlatform::new();
    let s = scheduler(db, platform.clone());

    let now = clock::now();
    let reminder = s
        .schedule(UserId(1), GuildId(1), ChannelId(100), "later", now + ChronoDuration::minutes(10))
        .unwrap();

    assert!(s.tick(now).await.unwrap().outcomes.is_empty());
    let report = s.tick(now + ChronoDuration::minutes(10)).await.unwrap();
    assert_eq!(report.outcomes, [DispatchOutcome::Delivered(reminder.id)]);
}

#[tokio::test]
async fn test_duplicates_are_independent() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let platform = FakePlatform::new();
    let s = scheduler(db, platform.clone());

    schedule_due(&s, 1, 100, "same");
    schedule_due(&s, 1, 100, "same");

    assert_eq!(s.tick(clock::now()).await.unwrap().delivered(), 2);
    assert_eq!(platform.bodies(), ["🔔 <@1>, reminder: same", "🔔 <@1>, reminder: same"]);
}

#[tokio::test]
async fn test_unresolvable_channel_is_retried_until_resolvable() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let platform = FakePlatform::new();
    let s = scheduler(db.clone(), platform.clone());

    let reminder = schedule_due(&s, 1, 100, "ping");
    platform.forget_channel(ChannelId(100));

    for _ in 0..3 {
        let report = s.tick(clock::now()).await.unwrap();
        assert_eq!(report.outcomes, [DispatchOutcome::SkippedUnresolvable(reminder.id)]);
    }
    assert!(platform.sent().is_empty());
    assert_eq!(db.stats().unwrap().reminders, 1);

    platform.restore_channel(ChannelId(100));
    let report = s.tick(clock::now()).await.unwrap();
    assert_eq!(report.outcomes, [DispatchOutcome::Delivered(reminder.id)]);
}

#[tokio::test]
async fn test_unresolvable_user_still_gets_raw_mention() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let platform = FakePlatform::new();
    let s = scheduler(db, platform.clone());

    schedule_due(&s, 77, 100, "stretch");
    platform.forget_user(UserId(77));

    assert_eq!(s.tick(clock::now()).await.unwrap().delivered(), 1);
    assert_eq!(platform.bodies(), ["🔔 <@77>, reminder: stretch"]);
}

#[tokio::test]
async fn test_send_failure_still_purges() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let platform = FakePlatform::new();
    let s = scheduler(db.clone(), platform.clone());

    let failing = schedule_due(&s, 1, 100, "lost");
    let ok = schedule_due(&s, 2, 200, "kept");
    platform.fail_sends_to(ChannelId(100));

    let report = s.tick(clock::now()).await.unwrap();
    assert_eq!(
        report.outcomes,
        [
            DispatchOutcome::SendFailedPurged(failing.id),
            DispatchOutcome::Delivered(ok.id)
        ]
    );
    assert_eq!(db.stats().unwrap().reminders, 0);
}

/// Reminder log whose deletes fail a fixed number of times
struct FlakyDeletes {
    inner: Database,
    failures_left: AtomicUsize,
}

impl ReminderLog for FlakyDeletes {
    fn insert_reminder(&self, reminder: &NewReminder) -> Result<Reminder, StorageError> {
        self.inner.insert_reminder(reminder)
    }

    fn due_reminders(&self, now: DateTime<FixedOffset>) -> Result<Vec<Reminder>, StorageError> {
        self.inner.due_reminders(now)
    }

    fn delete_reminder(&self, id: i64) -> Result<bool, StorageError> {
        if self.failures_left.load(Ordering::SeqCst) > 0 {
            self.failures_left.fetch_sub(1, Ordering::SeqCst);
            return Err(StorageError::Unavailable("write timeout".into()));
        }
        self.inner.delete_reminder(id)
    }
}

#[tokio::test]
async fn test_failed_delete_redelivers_next_tick() {
    let store = Arc::new(FlakyDeletes {
        inner: Database::open_in_memory().unwrap(),
        failures_left: AtomicUsize::new(1),
    });
    let platform = FakePlatform::new();
    let s = scheduler(store, platform.clone());

    schedule_due(&s, 1, 100, "twice");

    assert_eq!(s.tick(clock::now()).await.unwrap().delivered(), 1);
    assert_eq!(s.tick(clock::now()).await.unwrap().delivered(), 1);
    assert!(s.tick(clock::now()).await.unwrap().outcomes.is_empty());
    assert_eq!(platform.sent().len(), 2);
}

#[tokio::test]
async fn test_schedule_validation() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let s = scheduler(db, FakePlatform::new());

    assert!(matches!(
        s.schedule(UserId(1), GuildId(1), ChannelId(1), "   ", clock::now()),
        Err(ScheduleError::EmptyNote)
    ));
}

#[tokio::test]
async fn test_reminders_survive_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bot.db");

    {
        let db = Arc::new(Database::open(&path).unwrap());
        let s = scheduler(db, FakePlatform::new());
        schedule_due(&s, 9, 100, "persisted");
    }

    let db = Arc::new(Database::open(&path).unwrap());
    let platform = FakePlatform::new();
    let s = scheduler(db, platform.clone());
    assert_eq!(s.tick(clock::now()).await.unwrap().delivered(), 1);
    assert_eq!(platform.bodies(), ["🔔 <@9>, reminder: persisted"]);
}

#[tokio::test]
async fn test_loop_waits_for_readiness_and_stops_on_shutdown() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let platform = FakePlatform::not_ready();
    let s = Arc::new(
        scheduler(db.clone(), platform.clone()).with_interval(Duration::from_millis(20)),
    );
    schedule_due(&s, 1, 100, "after ready");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = s.clone().spawn(shutdown_rx);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(platform.sent().is_empty());

    platform.open();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(platform.bodies(), ["🔔 <@1>, reminder: after ready"]);

    shutdown_tx.send_replace(true);
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_long_note_is_capped_to_message_limit() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let platform = FakePlatform::new();
    let s = scheduler(db.clone(), platform.clone());

    schedule_due(&s, 5, 100, &"a".repeat(3000));

    assert_eq!(s.tick(clock::now()).await.unwrap().delivered(), 1);
    let body = platform.bodies().pop().unwrap();
    assert!(body.starts_with("🔔 <@5>, reminder: aaa"));
    assert_eq!(body.chars().count(), MAX_CONTENT_LENGTH);
    assert_eq!(db.stats().unwrap().reminders, 0);
}

#[tokio::test]
async fn test_zero_interval_keeps_default_cadence() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let platform = FakePlatform::new();
    let s = Arc::new(scheduler(db.clone(), platform.clone()).with_interval(Duration::ZERO));
    schedule_due(&s, 3, 100, "first tick");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = s.clone().spawn(shutdown_rx);

    // The first tick fires immediately; the next one is a default interval away
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(platform.bodies(), ["🔔 <@3>, reminder: first tick"]);

    shutdown_tx.send_replace(true);
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();
}
