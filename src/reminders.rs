//! Reminder Scheduler
//!
//! Durable one-shot reminders. `/remindme` inserts a pending record; a
//! periodic dispatch loop posts every due record to its channel and deletes
//! it. Records whose channel can no longer be resolved stay pending and are
//! retried each tick until the store's hard expiry removes them.
//!
//! Delivery is at-least-once up to the delete: if the delete fails after a
//! successful send, the next tick sends again.

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::channels::{OutgoingMessage, Platform};
use crate::clock;
use crate::storage::{ReminderLog, StorageError};
use crate::types::{ChannelId, GuildId, UserId};

/// Default dispatch cadence
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// A reminder waiting to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReminder {
    pub user_id: UserId,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub note: String,
    pub due_at: DateTime<FixedOffset>,
}

/// A stored reminder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub id: i64,
    pub user_id: UserId,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub note: String,
    pub due_at: DateTime<FixedOffset>,
}

impl Reminder {
    /// Text posted when the reminder fires
    pub fn notification(&self) -> String {
        self.notification_for(&self.user_id.mention())
    }

    /// Notification addressed with an already resolved mention
    pub fn notification_for(&self, mention: &str) -> String {
        format!("🔔 {}, reminder: {}", mention, self.note)
    }
}

/// Errors from scheduling or a dispatch tick
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("minutes must be a positive number (got {0})")]
    InvalidDelay(i64),

    #[error("reminder note is empty")]
    EmptyNote,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// What happened to one due reminder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Sent and deleted
    Delivered(i64),
    /// Channel unresolvable; left pending for the next tick
    SkippedUnresolvable(i64),
    /// Send failed; deleted anyway
    SendFailedPurged(i64),
}

/// Outcomes of one dispatch tick, in processing order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub outcomes: Vec<DispatchOutcome>,
}

impl TickReport {
    pub fn delivered(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, DispatchOutcome::Delivered(_)))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, DispatchOutcome::SkippedUnresolvable(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, DispatchOutcome::SendFailedPurged(_)))
            .count()
    }
}

/// Due time for "remind me in `minutes` minutes"
pub fn due_in(minutes: i64, now: DateTime<FixedOffset>) -> Result<DateTime<FixedOffset>, ScheduleError> {
    if minutes <= 0 {
        return Err(ScheduleError::InvalidDelay(minutes));
    }
    ChronoDuration::try_minutes(minutes)
        .and_then(|delay| now.checked_add_signed(delay))
        .ok_or(ScheduleError::InvalidDelay(minutes))
}

/// Inserts reminders and dispatches them when due
pub struct ReminderScheduler {
    store: Arc<dyn ReminderLog>,
    platform: Arc<dyn Platform>,
    interval: Duration,
}

impl ReminderScheduler {
    pub fn new(store: Arc<dyn ReminderLog>, platform: Arc<dyn Platform>) -> Self {
        Self {
            store,
            platform,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Dispatch cadence; a zero interval keeps the default
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if interval.is_zero() {
            warn!("Ignoring zero reminder poll interval");
        } else {
            self.interval = interval;
        }
        self
    }

    /// Insert a pending reminder; duplicates are independent records
    pub fn schedule(
        &self,
        user_id: UserId,
        guild_id: GuildId,
        channel_id: ChannelId,
        note: &str,
        due_at: DateTime<FixedOffset>,
    ) -> Result<Reminder, ScheduleError> {
        let note = note.trim();
        if note.is_empty() {
            return Err(ScheduleError::EmptyNote);
        }

        let reminder = self.store.insert_reminder(&NewReminder {
            user_id,
            guild_id,
            channel_id,
            note: note.to_string(),
            due_at: clock::normalize(due_at),
        })?;

        info!(
            "Scheduled reminder {} for user {} at {}",
            reminder.id,
            user_id,
            clock::display(&reminder.due_at)
        );
        Ok(reminder)
    }

    /// Dispatch every reminder due at `now`, one at a time
    pub async fn tick(&self, now: DateTime<FixedOffset>) -> Result<TickReport, ScheduleError> {
        let due = self.store.due_reminders(now)?;
        let mut report = TickReport::default();

        if due.is_empty() {
            return Ok(report);
        }
        debug!("{} reminders due", due.len());

        for reminder in due {
            report.outcomes.push(self.dispatch(&reminder).await);
        }

        info!(
            "Reminder tick: {} delivered, {} skipped, {} failed",
            report.delivered(),
            report.skipped(),
            report.failed()
        );
        Ok(report)
    }

    async fn dispatch(&self, reminder: &Reminder) -> DispatchOutcome {
        // Unresolvable user is fine: the raw mention still renders
        let mention = match self.platform.fetch_user(reminder.user_id).await {
            Ok(user) => user.mention(),
            Err(e) => {
                debug!("Could not resolve user {} for reminder {}: {}", reminder.user_id, reminder.id, e);
                reminder.user_id.mention()
            }
        };

        if let Err(e) = self.platform.fetch_channel(reminder.channel_id).await {
            debug!(
                "Skipping reminder {}: channel {} unresolvable ({})",
                reminder.id, reminder.channel_id, e
            );
            return DispatchOutcome::SkippedUnresolvable(reminder.id);
        }

        let message = OutgoingMessage::text(&reminder.notification_for(&mention));
        let outcome = match self.platform.send_message(reminder.channel_id, &message).await {
            Ok(_) => DispatchOutcome::Delivered(reminder.id),
            Err(e) => {
                warn!("Failed to send reminder {}: {}", reminder.id, e);
                DispatchOutcome::SendFailedPurged(reminder.id)
            }
        };

        if let Err(e) = self.store.delete_reminder(reminder.id) {
            warn!("Failed to delete reminder {} (may fire again): {}", reminder.id, e);
        }

        outcome
    }

    /// Run the dispatch loop once the platform is ready, until `shutdown` is set
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tokio::select! {
                _ = self.platform.wait_until_ready() => {}
                _ = shutdown.changed() => {
                    debug!("Reminder scheduler stopped before platform was ready");
                    return;
                }
            }

            info!(
                "Reminder scheduler started ({}s interval)",
                self.interval.as_secs()
            );
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.tick(clock::now()).await {
                            warn!("Reminder tick failed: {}", e);
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("Reminder scheduler shutting down");
                            break;
                        }
                    }
                }
            }
        })
    }
}
