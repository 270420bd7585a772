//! Reminder planning
//!
//! Pure time-window math: turns a task's creation time, priority and lifetime
//! into one-shot reminder instants, each with a stable structured identity.
//! Randomness and "now" are always passed in so callers and tests control them.

use chrono::{DateTime, Days, Duration, FixedOffset, NaiveDateTime, NaiveTime, Offset, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::models::{Task, TaskId, UserId};

/// Moscow time, which has no daylight saving
pub const DEFAULT_UTC_OFFSET_SECS: i32 = 3 * 3600;

/// Tunables for the reminder window and message selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderSettings {
    /// First local hour reminders may fire in
    pub window_start_hour: u32,
    /// Local hour the window closes at (exclusive)
    pub window_end_hour: u32,
    /// Delay of the dedicated first reminder after creation
    pub first_delay_minutes: i64,
    /// Maximum jitter applied around each slot's base minute
    pub jitter_minutes: i64,
    /// Offset of the reference zone tasks are created in
    pub utc_offset_secs: i32,
    /// Whole days without completion before reminders escalate
    pub escalation_days: i64,
    /// Chance of appending a light remark to a regular reminder
    pub aside_probability: f64,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            window_start_hour: 7,
            window_end_hour: 21,
            first_delay_minutes: 20,
            jitter_minutes: 10,
            utc_offset_secs: DEFAULT_UTC_OFFSET_SECS,
            escalation_days: 3,
            aside_probability: 0.4,
        }
    }
}

impl ReminderSettings {
    /// The fixed reference offset; out-of-range values fall back to UTC
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_secs).unwrap_or_else(|| Utc.fix())
    }

    /// Local wall-clock time in the reference zone
    pub fn local(&self, now: DateTime<Utc>) -> NaiveDateTime {
        now.with_timezone(&self.offset()).naive_local()
    }

    /// Resolves a local wall-clock time to an absolute instant
    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        let offset = Duration::seconds(i64::from(self.offset().local_minus_utc()));
        (local - offset).and_utc()
    }

    fn window_minutes(&self) -> (u32, u32) {
        let start = self.window_start_hour.min(24) * 60;
        let end = self.window_end_hour.min(24) * 60;
        (start, end)
    }
}

/// Which reminder of a task a job is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    /// The fixed-delay reminder right after creation
    First,
    /// A window reminder on day offset `day`, `slot`-th of that day
    Window { day: u32, slot: u32 },
}

/// Identity of a reminder job; used directly as the registry key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobKey {
    pub task: TaskId,
    #[serde(flatten)]
    pub kind: JobKind,
}

impl JobKey {
    pub fn first(task: TaskId) -> Self {
        Self {
            task,
            kind: JobKind::First,
        }
    }

    pub fn window(task: TaskId, day: u32, slot: u32) -> Self {
        Self {
            task,
            kind: JobKind::Window { day, slot },
        }
    }

    pub fn is_first(&self) -> bool {
        self.kind == JobKind::First
    }
}

/// A one-shot reminder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderJob {
    pub key: JobKey,
    pub user: UserId,
    pub run_at: DateTime<Utc>,
}

/// What to do with an instant that already lies in the past
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PastPolicy {
    /// Move it forward by one day (fresh scheduling)
    PushForward,
    /// Drop it (replay after a restart)
    Drop,
}

/// Minutes-of-day for one day's reminders, deduplicated and ascending.
///
/// The window is split into `count` equal slots. Each slot's base minute is
/// jittered, then the hour is clamped to the window's hours and the minute
/// kept as is, so 06:50 lands on 07:50.
pub fn daily_slots<R: Rng + ?Sized>(
    count: u32,
    settings: &ReminderSettings,
    rng: &mut R,
) -> Vec<u32> {
    let (start, end) = settings.window_minutes();
    if count == 0 || start >= end {
        return Vec::new();
    }

    let width = (end - start) / count;
    let jitter = settings.jitter_minutes.max(0);
    let first_hour = i64::from(start / 60);
    let last_hour = i64::from(end / 60) - 1;
    let mut minutes = BTreeSet::new();

    for i in 0..count {
        let base = i64::from(start + i * width);
        let shifted = base + rng.gen_range(-jitter..=jitter);
        let hour = shifted.div_euclid(60).clamp(first_hour, last_hour);
        let minute = shifted.rem_euclid(60);
        minutes.insert((hour * 60 + minute) as u32);
    }

    minutes.into_iter().collect()
}

fn minute_of_day(minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(minute / 60, minute % 60, 0).unwrap_or(NaiveTime::MIN)
}

/// When the first reminder of a task fires, in local time
pub fn first_reminder_local(task: &Task, settings: &ReminderSettings) -> NaiveDateTime {
    task.created_at + Duration::minutes(settings.first_delay_minutes)
}

/// Plans all reminders for a freshly scheduled task
pub fn plan_reminders<R: Rng + ?Sized>(
    task: &Task,
    now: DateTime<Utc>,
    settings: &ReminderSettings,
    rng: &mut R,
) -> Vec<ReminderJob> {
    plan_with_policy(task, now, settings, rng, PastPolicy::PushForward)
}

/// Plans reminders, handling instants before `now` according to `policy`.
///
/// The first reminder comes first in the returned list; window reminders
/// follow in day order, ascending within each day.
pub fn plan_with_policy<R: Rng + ?Sized>(
    task: &Task,
    now: DateTime<Utc>,
    settings: &ReminderSettings,
    rng: &mut R,
    policy: PastPolicy,
) -> Vec<ReminderJob> {
    let mut jobs = Vec::new();

    let first_local = first_reminder_local(task, settings);
    let first_at = settings.to_utc(first_local);
    if policy == PastPolicy::PushForward || first_at >= now {
        jobs.push(ReminderJob {
            key: JobKey::first(task.id),
            user: task.owner,
            run_at: first_at,
        });
    }

    let created_date = task.created_at.date();
    for day in 0..task.days {
        let count = rng.gen_range(task.priority.reminders_per_day());
        let Some(date) = created_date.checked_add_days(Days::new(u64::from(day))) else {
            break;
        };

        // Day 0 must never deliver before (or together with) the first reminder
        let times = daily_slots(count, settings, rng)
            .into_iter()
            .map(|minute| date.and_time(minute_of_day(minute)))
            .filter(|local| day > 0 || *local > first_local);

        for (slot, local) in times.enumerate() {
            let mut run_at = settings.to_utc(local);
            if run_at < now {
                match policy {
                    PastPolicy::PushForward => run_at += Duration::days(1),
                    PastPolicy::Drop => continue,
                }
            }
            jobs.push(ReminderJob {
                key: JobKey::window(task.id, day, slot as u32),
                user: task.owner,
                run_at,
            });
        }
    }

    jobs
}
