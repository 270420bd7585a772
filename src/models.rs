//! Core models for the nudge library
//!
//! This module contains the task data types, the error taxonomy and the `Core`
//! service object that ties the task store and the reminder scheduler together.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc, Weekday};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::composer::ReminderMessage;
use crate::notify::{BroadcastNotifier, FanoutNotifier, Notifier};
use crate::phrases;
use crate::schedule::{ReminderJob, ReminderSettings};
use crate::scheduler::{lock, Scheduler, SharedRng};
use crate::store::{NewTask, StoreError, TaskStore};

/// Shortest lifetime a task may be created with, in days
pub const MIN_DAYS: u32 = 1;
/// Longest lifetime a task may be created with, in days
pub const MAX_DAYS: u32 = 30;
/// How far back the success history looks
pub const HISTORY_DAYS: i64 = 30;

/// Unique task identifier, assigned by the task store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chat user identifier; reminders are delivered to this id
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Normal,
    Important,
}

impl Priority {
    /// Range the per-day reminder count is drawn from
    pub fn reminders_per_day(&self) -> RangeInclusive<u32> {
        match self {
            Priority::Normal => 7..=8,
            Priority::Important => 8..=10,
        }
    }
}

impl FromStr for Priority {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "normal" | "n" => Ok(Priority::Normal),
            "important" | "i" | "high" => Ok(Priority::Important),
            other => Err(CoreError::Validation(format!(
                "unknown priority '{}', expected 'normal' or 'important'",
                other
            ))),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Normal => write!(f, "normal"),
            Priority::Important => write!(f, "important"),
        }
    }
}

/// A task the user wants to be reminded about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub owner: UserId,
    pub text: String,
    /// Number of days reminders are generated for
    pub days: u32,
    /// Local wall-clock time in the reference zone
    pub created_at: NaiveDateTime,
    pub status: TaskStatus,
    pub report: Option<String>,
    pub priority: Priority,
    pub deadline: Option<NaiveDateTime>,
    /// Comma-delimited subtasks
    pub checklist: Option<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl Task {
    pub fn is_active(&self) -> bool {
        self.status == TaskStatus::Active
    }

    /// Splits the stored checklist blob into its subtasks
    pub fn checklist_items(&self) -> Vec<&str> {
        self.checklist
            .as_deref()
            .map(|blob| {
                blob.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whole days elapsed since creation
    pub fn elapsed_days(&self, now: NaiveDateTime) -> i64 {
        (now - self.created_at).num_days()
    }

    /// Returns true once the reminder lifetime is over
    pub fn lifetime_elapsed(&self, now: NaiveDateTime) -> bool {
        self.created_at + Duration::days(i64::from(self.days)) <= now
    }
}

/// Joins checklist items into the single stored blob, or `None` if nothing is left
pub fn checklist_blob<S: AsRef<str>>(items: &[S]) -> Option<String> {
    let items: Vec<&str> = items
        .iter()
        .flat_map(|item| item.as_ref().split(','))
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect();

    if items.is_empty() {
        None
    } else {
        Some(items.join(", "))
    }
}

/// User input for creating a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDraft {
    pub text: String,
    pub days: u32,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub deadline: Option<NaiveDateTime>,
    #[serde(default)]
    pub checklist: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl TaskDraft {
    pub fn new(text: impl Into<String>, days: u32, priority: Priority) -> Self {
        Self {
            text: text.into(),
            days,
            priority,
            deadline: None,
            checklist: Vec::new(),
            attachments: Vec::new(),
        }
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.text.trim().is_empty() {
            return Err(CoreError::Validation("task text is required".to_string()));
        }
        if !(MIN_DAYS..=MAX_DAYS).contains(&self.days) {
            return Err(CoreError::Validation(format!(
                "days must be between {} and {}, got {}",
                MIN_DAYS, MAX_DAYS, self.days
            )));
        }
        Ok(())
    }
}

/// Result of creating a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedTask {
    pub task: Task,
    /// Number of reminder jobs registered for the task
    pub reminders: usize,
    pub hint: String,
}

/// Result of marking a task complete
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub task: Task,
    pub praise: String,
    /// True if the task had been completed before this call
    pub already_completed: bool,
    /// Number of pending reminders dropped
    pub cancelled: usize,
}

/// Per-user completion statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub active: usize,
    /// Completion percentage rounded to one decimal
    pub percent: f64,
}

impl TaskStats {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let total = tasks.len();
        let completed = tasks.iter().filter(|t| !t.is_active()).count();
        let active = total - completed;
        let percent = if total == 0 {
            0.0
        } else {
            (completed as f64 / total as f64 * 1000.0).round() / 10.0
        };

        Self {
            total,
            completed,
            active,
            percent,
        }
    }
}

/// One line of the monthly success history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: TaskId,
    pub text: String,
    pub created_at: NaiveDateTime,
    pub status: TaskStatus,
    pub report: Option<String>,
}

impl From<&Task> for HistoryEntry {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            text: task.text.clone(),
            created_at: task.created_at,
            status: task.status,
            report: task.report.clone(),
        }
    }
}

/// Whether today is a weekend day in the reference zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekendStatus {
    pub date: NaiveDate,
    pub weekend: bool,
    pub message: String,
}

impl WeekendStatus {
    pub fn for_date(date: NaiveDate) -> Self {
        let weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
        let message = if weekend {
            phrases::WEEKEND_MESSAGE
        } else {
            phrases::WORKDAY_MESSAGE
        };

        Self {
            date,
            weekend,
            message: message.to_string(),
        }
    }
}

/// Errors surfaced to the conversation layer
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for CoreError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => CoreError::NotFound(id),
            other => CoreError::Storage(other.to_string()),
        }
    }
}

/// The reminder service, constructed once at startup and shared by handle
#[derive(Clone)]
pub struct Core {
    store: Arc<dyn TaskStore>,
    scheduler: Scheduler,
    settings: ReminderSettings,
    events: BroadcastNotifier,
    rng: SharedRng,
}

impl Core {
    /// Creates a new core. Delivered reminders go to `notifier` and to the
    /// in-process event stream returned by [`Core::subscribe`].
    pub fn new(
        store: Arc<dyn TaskStore>,
        notifier: Arc<dyn Notifier>,
        settings: ReminderSettings,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let rng: SharedRng = Arc::new(Mutex::new(rng));

        // Create a broadcast channel with capacity for 100 messages
        let events = BroadcastNotifier::new(100);
        let fanout = FanoutNotifier::new(vec![Arc::new(events.clone()), notifier]);
        let scheduler = Scheduler::new(
            store.clone(),
            Arc::new(fanout),
            settings.clone(),
            rng.clone(),
        );

        Self {
            store,
            scheduler,
            settings,
            events,
            rng,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn settings(&self) -> &ReminderSettings {
        &self.settings
    }

    /// Subscribe to every reminder delivered by this core
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ReminderMessage> {
        self.events.subscribe()
    }

    /// Starts the scheduler timer loop
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        self.scheduler.run()
    }

    /// Re-registers reminders for all active tasks that are still within their lifetime
    pub async fn resume(&self) -> Result<usize, CoreError> {
        let now = Utc::now();
        let local_now = self.settings.local(now);
        let mut registered = 0;

        for task in self.store.list_all_active().await? {
            if task.lifetime_elapsed(local_now) {
                continue;
            }
            registered += self.scheduler.resume_at(&task, now);
        }

        info!("resumed {} pending reminders", registered);
        Ok(registered)
    }

    /// Persists a new task and schedules its reminders
    pub async fn create_task(
        &self,
        owner: UserId,
        draft: TaskDraft,
    ) -> Result<CreatedTask, CoreError> {
        draft.validate()?;

        let now = Utc::now();
        let new_task = NewTask {
            owner,
            text: draft.text.trim().to_string(),
            days: draft.days,
            priority: draft.priority,
            created_at: self.settings.local(now),
            deadline: draft.deadline,
            checklist: checklist_blob(&draft.checklist),
            attachments: draft.attachments,
        };

        // Nothing is scheduled unless the task was stored
        let task = self.store.create(new_task).await?;
        let jobs = self.scheduler.schedule_at(&task, now);
        let hint = {
            let mut rng = lock(&self.rng);
            phrases::hint_for(&task.text, &mut *rng).to_string()
        };

        info!(
            "task {} created for user {} with {} reminders",
            task.id,
            owner,
            jobs.len()
        );

        Ok(CreatedTask {
            task,
            reminders: jobs.len(),
            hint,
        })
    }

    pub async fn get_task(&self, id: TaskId) -> Result<Task, CoreError> {
        self.store.get(id).await?.ok_or(CoreError::NotFound(id))
    }

    pub async fn list_active(&self, owner: UserId) -> Result<Vec<Task>, CoreError> {
        Ok(self.store.list_active(owner).await?)
    }

    /// Marks a task completed; completing twice is accepted
    pub async fn complete_task(&self, id: TaskId) -> Result<Completion, CoreError> {
        let task = self.get_task(id).await?;
        let already_completed = !task.is_active();

        let task = if already_completed {
            task
        } else {
            self.store.set_status(id, TaskStatus::Completed).await?
        };
        let cancelled = self.scheduler.cancel_task(id);
        let praise = {
            let mut rng = lock(&self.rng);
            phrases::praise(&mut *rng).to_string()
        };

        info!("task {} completed, {} reminders cancelled", id, cancelled);

        Ok(Completion {
            task,
            praise,
            already_completed,
            cancelled,
        })
    }

    /// Stores the completion report; the last write wins
    pub async fn submit_report(&self, id: TaskId, report: String) -> Result<Task, CoreError> {
        let report = report.trim();
        if report.is_empty() {
            return Err(CoreError::Validation("report text is required".to_string()));
        }
        Ok(self.store.set_report(id, report.to_string()).await?)
    }

    pub async fn edit_text(&self, id: TaskId, text: String) -> Result<Task, CoreError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CoreError::Validation("task text is required".to_string()));
        }
        Ok(self.store.set_text(id, text.to_string()).await?)
    }

    pub async fn set_checklist(&self, id: TaskId, items: Vec<String>) -> Result<Task, CoreError> {
        Ok(self.store.set_checklist(id, checklist_blob(&items)).await?)
    }

    /// Deletes a task and drops its pending reminders
    pub async fn delete_task(&self, id: TaskId) -> Result<Task, CoreError> {
        let task = self.store.delete(id).await?;
        let cancelled = self.scheduler.cancel_task(id);
        info!("task {} deleted, {} reminders cancelled", id, cancelled);
        Ok(task)
    }

    pub async fn stats(&self, owner: UserId) -> Result<TaskStats, CoreError> {
        let tasks = self.store.list_owned(owner).await?;
        Ok(TaskStats::from_tasks(&tasks))
    }

    /// Tasks created within the last month, oldest first
    pub async fn history(&self, owner: UserId) -> Result<Vec<HistoryEntry>, CoreError> {
        let since = self.settings.local(Utc::now()) - Duration::days(HISTORY_DAYS);
        let tasks = self.store.list_owned(owner).await?;
        Ok(tasks
            .iter()
            .filter(|task| task.created_at >= since)
            .map(HistoryEntry::from)
            .collect())
    }

    /// Pending reminder jobs for a task, earliest first
    pub async fn pending_reminders(&self, id: TaskId) -> Result<Vec<ReminderJob>, CoreError> {
        // Surface stale ids as NotFound rather than an empty list
        self.get_task(id).await?;
        Ok(self.scheduler.pending(id))
    }

    pub fn motivation(&self) -> String {
        let mut rng = lock(&self.rng);
        phrases::motivation(&mut *rng).to_string()
    }

    /// Weekend-mode status for the current local day
    pub fn weekend(&self) -> WeekendStatus {
        self.weekend_at(Utc::now())
    }

    pub fn weekend_at(&self, now: DateTime<Utc>) -> WeekendStatus {
        WeekendStatus::for_date(self.settings.local(now).date())
    }
}

impl fmt::Debug for Core {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Core")
            .field("settings", &self.settings)
            .field("pending_jobs", &self.scheduler.len())
            .finish()
    }
}
