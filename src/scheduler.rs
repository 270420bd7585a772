//! Reminder scheduler
//!
//! Owns the registry of pending one-shot reminder jobs and the background
//! timer loop that fires them. Each job re-reads its task when it fires, so a
//! task completed after scheduling never produces a reminder.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration as StdDuration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::composer::compose;
use crate::models::{Task, TaskId};
use crate::notify::Notifier;
use crate::schedule::{
    plan_reminders, plan_with_policy, JobKey, PastPolicy, ReminderJob, ReminderSettings,
};
use crate::store::TaskStore;

/// Random source shared by planning and composition
pub type SharedRng = Arc<Mutex<StdRng>>;

/// Longest the timer loop sleeps before re-checking the registry
const IDLE_WAIT_SECS: u64 = 60;

/// Locks a mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// What happened when a job fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    Delivered,
    /// The task is gone or already completed
    Skipped,
    Failed,
}

struct Inner {
    jobs: Mutex<BTreeMap<JobKey, ReminderJob>>,
    wake: Notify,
    store: Arc<dyn TaskStore>,
    notifier: Arc<dyn Notifier>,
    settings: ReminderSettings,
    rng: SharedRng,
}

/// Cloneable handle to the job registry and timer loop
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn TaskStore>,
        notifier: Arc<dyn Notifier>,
        settings: ReminderSettings,
        rng: SharedRng,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                jobs: Mutex::new(BTreeMap::new()),
                wake: Notify::new(),
                store,
                notifier,
                settings,
                rng,
            }),
        }
    }

    /// Plans and registers all reminders for a new task
    pub fn schedule(&self, task: &Task) -> Vec<ReminderJob> {
        self.schedule_at(task, Utc::now())
    }

    /// Like [`Scheduler::schedule`] with an explicit clock; returns the jobs registered
    pub fn schedule_at(&self, task: &Task, now: DateTime<Utc>) -> Vec<ReminderJob> {
        let planned = {
            let mut rng = lock(&self.inner.rng);
            plan_reminders(task, now, &self.inner.settings, &mut *rng)
        };

        let registered: Vec<ReminderJob> = planned
            .into_iter()
            .filter(|job| self.register(job.clone()))
            .collect();

        debug!(
            "scheduled {} reminders for task {}",
            registered.len(),
            task.id
        );
        self.inner.wake.notify_one();
        registered
    }

    /// Re-registers the still-future reminders of a task after a restart
    pub fn resume_at(&self, task: &Task, now: DateTime<Utc>) -> usize {
        let planned = {
            let mut rng = lock(&self.inner.rng);
            plan_with_policy(task, now, &self.inner.settings, &mut *rng, PastPolicy::Drop)
        };

        let registered = planned
            .into_iter()
            .filter(|job| self.register(job.clone()))
            .count();
        self.inner.wake.notify_one();
        registered
    }

    /// Adds a job to the registry.
    ///
    /// A first-reminder job replaces any existing one for the task; a window
    /// job whose key is already registered is left alone. Returns true if the
    /// job was stored.
    pub fn register(&self, job: ReminderJob) -> bool {
        let mut jobs = lock(&self.inner.jobs);
        if !job.key.is_first() && jobs.contains_key(&job.key) {
            return false;
        }
        jobs.insert(job.key, job);
        true
    }

    /// Drops every pending job of a task and returns how many were removed
    pub fn cancel_task(&self, task: TaskId) -> usize {
        let mut jobs = lock(&self.inner.jobs);
        let before = jobs.len();
        jobs.retain(|key, _| key.task != task);
        before - jobs.len()
    }

    /// Pending jobs of a task, earliest first
    pub fn pending(&self, task: TaskId) -> Vec<ReminderJob> {
        let jobs = lock(&self.inner.jobs);
        let mut pending: Vec<ReminderJob> = jobs
            .values()
            .filter(|job| job.key.task == task)
            .cloned()
            .collect();
        pending.sort_by_key(|job| job.run_at);
        pending
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.jobs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns the jobs due at `now`, earliest first
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<ReminderJob> {
        let mut due = Vec::new();
        lock(&self.inner.jobs).retain(|_, job| {
            if job.run_at <= now {
                due.push(job.clone());
                false
            } else {
                true
            }
        });
        due.sort_by_key(|job| job.run_at);
        due
    }

    /// Earliest pending run time
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        lock(&self.inner.jobs).values().map(|job| job.run_at).min()
    }

    /// Starts the timer loop; each due job fires on its own task
    pub fn run(&self) -> JoinHandle<()> {
        let scheduler = self.clone();

        tokio::spawn(async move {
            info!("scheduler started with {} pending reminders", scheduler.len());
            let idle = StdDuration::from_secs(IDLE_WAIT_SECS);

            loop {
                for job in scheduler.take_due(Utc::now()) {
                    let scheduler = scheduler.clone();
                    tokio::spawn(async move {
                        scheduler.fire(job).await;
                    });
                }

                let wait = scheduler
                    .next_due()
                    .map(|at| (at - Utc::now()).to_std().unwrap_or(StdDuration::ZERO))
                    .map_or(idle, |wait| wait.min(idle));

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = scheduler.inner.wake.notified() => {}
                }
            }
        })
    }

    /// Delivers one job now
    pub async fn fire(&self, job: ReminderJob) -> FireOutcome {
        self.fire_at(job, Utc::now()).await
    }

    /// Delivers one job as if the clock read `now`
    pub async fn fire_at(&self, job: ReminderJob, now: DateTime<Utc>) -> FireOutcome {
        let task = match self.inner.store.get(job.key.task).await {
            Ok(Some(task)) if task.is_active() => task,
            Ok(_) => {
                debug!("dropping reminder {:?}, task is no longer active", job.key);
                return FireOutcome::Skipped;
            }
            Err(e) => {
                warn!("failed to load task for reminder {:?}: {}", job.key, e);
                return FireOutcome::Failed;
            }
        };

        let message = {
            let settings = &self.inner.settings;
            let mut rng = lock(&self.inner.rng);
            compose(&task, settings.local(now), settings, &mut *rng)
        };

        match self.inner.notifier.send(&message).await {
            Ok(()) => {
                debug!("delivered reminder {:?} to user {}", job.key, job.user);
                FireOutcome::Delivered
            }
            Err(e) => {
                warn!("failed to deliver reminder {:?}: {}", job.key, e);
                FireOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::{ReminderMessage, ReminderVariant};
    use crate::models::{Priority, TaskStatus, UserId};
    use crate::notify::DeliveryError;
    use crate::store::{MemoryStore, NewTask};
    use async_trait::async_trait;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;

    #[derive(Default)]
    struct Collect {
        messages: Mutex<Vec<ReminderMessage>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for Collect {
        async fn send(&self, message: &ReminderMessage) -> Result<(), DeliveryError> {
            if self.fail {
                return Err(DeliveryError::Transient("chat unreachable".to_string()));
            }
            lock(&self.messages).push(message.clone());
            Ok(())
        }
    }

    fn setup(notifier: Arc<Collect>) -> (Arc<MemoryStore>, Scheduler) {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Scheduler::new(
            store.clone(),
            notifier,
            ReminderSettings::default(),
            Arc::new(Mutex::new(StdRng::seed_from_u64(5))),
        );
        (store, scheduler)
    }

    async fn add_task(store: &MemoryStore, days: u32) -> Task {
        let created_at = ReminderSettings::default().local(Utc::now());
        store
            .create(NewTask {
                owner: UserId::new(8),
                text: "sort the mail".to_string(),
                days,
                priority: Priority::Normal,
                created_at,
                deadline: None,
                checklist: None,
                attachments: Vec::new(),
            })
            .await
            .unwrap()
    }

    fn job(key: JobKey, run_at: DateTime<Utc>) -> ReminderJob {
        ReminderJob {
            key,
            user: UserId::new(8),
            run_at,
        }
    }

    #[test]
    fn test_register_first_replaces_window_does_not() {
        let (_, scheduler) = setup(Arc::new(Collect::default()));
        let id = TaskId::new(1);
        let t0 = Utc::now() + Duration::hours(1);

        assert!(scheduler.register(job(JobKey::first(id), t0)));
        assert!(scheduler.register(job(JobKey::first(id), t0 + Duration::minutes(5))));
        assert_eq!(scheduler.pending(id)[0].run_at, t0 + Duration::minutes(5));

        let window = JobKey::window(id, 0, 0);
        assert!(scheduler.register(job(window, t0)));
        assert!(!scheduler.register(job(window, t0 + Duration::hours(2))));
        assert_eq!(scheduler.len(), 2);
        assert_eq!(scheduler.pending(id)[0].run_at, t0);
    }

    #[tokio::test]
    async fn test_schedule_and_cancel() {
        let (store, scheduler) = setup(Arc::new(Collect::default()));
        let task = add_task(&store, 2).await;
        let other = add_task(&store, 1).await;

        let jobs = scheduler.schedule(&task);
        let other_jobs = scheduler.schedule(&other);
        assert!(jobs.len() >= 8);
        assert_eq!(scheduler.len(), jobs.len() + other_jobs.len());

        let pending = scheduler.pending(task.id);
        assert!(pending.windows(2).all(|w| w[0].run_at <= w[1].run_at));

        assert_eq!(scheduler.cancel_task(task.id), jobs.len());
        assert!(scheduler.pending(task.id).is_empty());
        assert_eq!(scheduler.len(), other_jobs.len());
        assert_eq!(scheduler.cancel_task(task.id), 0);
    }

    #[tokio::test]
    async fn test_rescheduling_keeps_existing_window_jobs() {
        let (store, scheduler) = setup(Arc::new(Collect::default()));
        let task = add_task(&store, 3).await;

        let first = scheduler.schedule(&task);
        let before = scheduler.pending(task.id);
        let again = scheduler.schedule(&task);

        // Only the first reminder is replaced; existing window slots stay put
        assert!(again.iter().all(|job| job.key.is_first() || !first.contains(job)));
        let after = scheduler.pending(task.id);
        for job in before.iter().filter(|job| !job.key.is_first()) {
            assert!(after.contains(job));
        }
    }

    #[test]
    fn test_take_due_removes_only_due_jobs() {
        let (_, scheduler) = setup(Arc::new(Collect::default()));
        let id = TaskId::new(4);
        let now = Utc::now();

        scheduler.register(job(JobKey::window(id, 0, 1), now - Duration::minutes(1)));
        scheduler.register(job(JobKey::window(id, 0, 0), now - Duration::minutes(2)));
        scheduler.register(job(JobKey::window(id, 1, 0), now + Duration::hours(3)));

        let due = scheduler.take_due(now);
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].key, JobKey::window(id, 0, 0));
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.next_due(), Some(now + Duration::hours(3)));
    }

    #[tokio::test]
    async fn test_fire_skips_completed_and_missing_tasks() {
        let notifier = Arc::new(Collect::default());
        let (store, scheduler) = setup(notifier.clone());
        let task = add_task(&store, 1).await;
        store.set_status(task.id, TaskStatus::Completed).await.unwrap();

        let now = Utc::now();
        let outcome = scheduler
            .fire(job(JobKey::first(task.id), now))
            .await;
        assert_eq!(outcome, FireOutcome::Skipped);

        let missing = TaskId::new(999);
        let outcome = scheduler
            .fire(job(JobKey::first(missing), now))
            .await;
        assert_eq!(outcome, FireOutcome::Skipped);
        assert!(lock(&notifier.messages).is_empty());
    }

    #[tokio::test]
    async fn test_fire_escalates_stale_tasks() {
        let notifier = Arc::new(Collect::default());
        let (store, scheduler) = setup(notifier.clone());
        let task = add_task(&store, 10).await;

        let later = Utc::now() + Duration::days(4) + Duration::minutes(1);
        let outcome = scheduler
            .fire_at(job(JobKey::window(task.id, 4, 0), later), later)
            .await;
        assert_eq!(outcome, FireOutcome::Delivered);

        let messages = lock(&notifier.messages);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].variant, ReminderVariant::Escalation { days: 4 });
        assert_eq!(messages[0].task, task.id);
    }

    #[tokio::test]
    async fn test_delivery_failure_is_reported() {
        let notifier = Arc::new(Collect {
            fail: true,
            ..Collect::default()
        });
        let (store, scheduler) = setup(notifier);
        let task = add_task(&store, 1).await;

        let outcome = scheduler
            .fire(job(JobKey::first(task.id), Utc::now()))
            .await;
        assert_eq!(outcome, FireOutcome::Failed);
    }

    #[tokio::test]
    async fn test_run_loop_fires_due_jobs() {
        let notifier = Arc::new(Collect::default());
        let (store, scheduler) = setup(notifier.clone());
        let task = add_task(&store, 1).await;

        let handle = scheduler.run();
        scheduler.register(job(
            JobKey::first(task.id),
            Utc::now() + Duration::milliseconds(50),
        ));
        scheduler.inner.wake.notify_one();

        let delivered = tokio::time::timeout(StdDuration::from_secs(5), async {
            loop {
                if !lock(&notifier.messages).is_empty() {
                    break;
                }
                tokio::time::sleep(StdDuration::from_millis(10)).await;
            }
        })
        .await;
        handle.abort();

        assert!(delivered.is_ok());
        assert!(scheduler.pending(task.id).is_empty());
        assert_eq!(lock(&notifier.messages)[0].user, UserId::new(8));
    }
}
