//! Task store
//!
//! The persistence seam of the service. `MemoryStore` keeps tasks in a map
//! behind a single async mutex, so every read-modify-write is serialized, and
//! can mirror its state to a JSON snapshot file after each change. Snapshot
//! writes go through `tokio::fs` and never block a runtime worker.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::{Priority, Task, TaskId, TaskStatus, UserId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Fields of a task before the store assigns its id
#[derive(Debug, Clone)]
pub struct NewTask {
    pub owner: UserId,
    pub text: String,
    pub days: u32,
    pub priority: Priority,
    pub created_at: NaiveDateTime,
    pub deadline: Option<NaiveDateTime>,
    pub checklist: Option<String>,
    pub attachments: Vec<String>,
}

/// CRUD over tasks, keyed by task id and owner
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, task: NewTask) -> Result<Task, StoreError>;

    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    async fn set_status(&self, id: TaskId, status: TaskStatus) -> Result<Task, StoreError>;

    async fn set_report(&self, id: TaskId, report: String) -> Result<Task, StoreError>;

    async fn set_text(&self, id: TaskId, text: String) -> Result<Task, StoreError>;

    async fn set_checklist(&self, id: TaskId, checklist: Option<String>)
        -> Result<Task, StoreError>;

    /// Active tasks of one user, in creation order
    async fn list_active(&self, owner: UserId) -> Result<Vec<Task>, StoreError>;

    /// All tasks of one user, in creation order
    async fn list_owned(&self, owner: UserId) -> Result<Vec<Task>, StoreError>;

    /// Active tasks of every user; used to replay reminders on startup
    async fn list_all_active(&self) -> Result<Vec<Task>, StoreError>;

    async fn delete(&self, id: TaskId) -> Result<Task, StoreError>;
}

/// On-disk snapshot layout
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    next_id: u64,
    tasks: Vec<Task>,
}

#[derive(Debug, Default)]
struct StoreState {
    next_id: u64,
    tasks: BTreeMap<TaskId, Task>,
}

/// In-memory task store with optional JSON snapshot persistence
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    path: Option<PathBuf>,
}

impl MemoryStore {
    /// Creates an empty, purely in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a store backed by a snapshot file, loading it if it exists
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let snapshot: Snapshot = serde_json::from_str(&raw)?;
            let next_id = snapshot
                .tasks
                .iter()
                .map(|t| t.id.value())
                .max()
                .unwrap_or(0)
                .max(snapshot.next_id);
            StoreState {
                next_id,
                tasks: snapshot.tasks.into_iter().map(|t| (t.id, t)).collect(),
            }
        } else {
            StoreState::default()
        };

        debug!(
            "opened task store at {} with {} tasks",
            path.display(),
            state.tasks.len()
        );

        Ok(Self {
            state: Mutex::new(state),
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Mirrors `state` to the snapshot file; called with the store lock held
    /// so snapshots land in the order the changes were made
    async fn persist(&self, state: &StoreState) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let snapshot = Snapshot {
            next_id: state.next_id,
            tasks: state.tasks.values().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;

        // Write-then-rename so a crash never leaves a truncated snapshot
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Applies `f` to one task under the store lock and persists the result
    async fn update<F>(&self, id: TaskId, f: F) -> Result<Task, StoreError>
    where
        F: FnOnce(&mut Task) + Send,
    {
        let mut state = self.state.lock().await;
        let task = state.tasks.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        let previous = task.clone();
        f(&mut *task);
        let updated = task.clone();

        if let Err(e) = self.persist(&state).await {
            // Keep memory and disk in agreement
            state.tasks.insert(id, previous);
            return Err(e);
        }
        Ok(updated)
    }

    async fn filtered<P>(&self, predicate: P) -> Vec<Task>
    where
        P: Fn(&Task) -> bool + Send,
    {
        let state = self.state.lock().await;
        state
            .tasks
            .values()
            .filter(|t| predicate(t))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create(&self, task: NewTask) -> Result<Task, StoreError> {
        let mut state = self.state.lock().await;
        let id = TaskId::new(state.next_id + 1);
        let task = Task {
            id,
            owner: task.owner,
            text: task.text,
            days: task.days,
            created_at: task.created_at,
            status: TaskStatus::Active,
            report: None,
            priority: task.priority,
            deadline: task.deadline,
            checklist: task.checklist,
            attachments: task.attachments,
        };

        state.next_id += 1;
        state.tasks.insert(id, task.clone());
        if let Err(e) = self.persist(&state).await {
            state.tasks.remove(&id);
            state.next_id -= 1;
            return Err(e);
        }
        Ok(task)
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.state.lock().await.tasks.get(&id).cloned())
    }

    async fn set_status(&self, id: TaskId, status: TaskStatus) -> Result<Task, StoreError> {
        self.update(id, |task| {
            // Completion is final
            if task.status == TaskStatus::Active {
                task.status = status;
            }
        })
        .await
    }

    async fn set_report(&self, id: TaskId, report: String) -> Result<Task, StoreError> {
        self.update(id, |task| task.report = Some(report)).await
    }

    async fn set_text(&self, id: TaskId, text: String) -> Result<Task, StoreError> {
        self.update(id, |task| task.text = text).await
    }

    async fn set_checklist(
        &self,
        id: TaskId,
        checklist: Option<String>,
    ) -> Result<Task, StoreError> {
        self.update(id, |task| task.checklist = checklist).await
    }

    async fn list_active(&self, owner: UserId) -> Result<Vec<Task>, StoreError> {
        Ok(self.filtered(|t| t.owner == owner && t.is_active()).await)
    }

    async fn list_owned(&self, owner: UserId) -> Result<Vec<Task>, StoreError> {
        Ok(self.filtered(|t| t.owner == owner).await)
    }

    async fn list_all_active(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self.filtered(Task::is_active).await)
    }

    async fn delete(&self, id: TaskId) -> Result<Task, StoreError> {
        let mut state = self.state.lock().await;
        let task = state.tasks.remove(&id).ok_or(StoreError::NotFound(id))?;
        if let Err(e) = self.persist(&state).await {
            state.tasks.insert(id, task);
            return Err(e);
        }
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn new_task(owner: i64, text: &str) -> NewTask {
        NewTask {
            owner: UserId::new(owner),
            text: text.to_string(),
            days: 3,
            priority: Priority::Normal,
            created_at: NaiveDate::from_ymd_opt(2024, 4, 1)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
            deadline: None,
            checklist: None,
            attachments: Vec::new(),
        }
    }

    fn temp_snapshot(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "nudge-store-{}-{}.json",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn test_create_assigns_increasing_ids() {
        let store = MemoryStore::new();
        let a = store.create(new_task(1, "a")).await.unwrap();
        let b = store.create(new_task(1, "b")).await.unwrap();
        assert_eq!(a.id, TaskId::new(1));
        assert_eq!(b.id, TaskId::new(2));
        assert_eq!(a.status, TaskStatus::Active);
        assert_eq!(store.get(b.id).await.unwrap(), Some(b));
        assert_eq!(store.get(TaskId::new(3)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_status_never_reverts() {
        let store = MemoryStore::new();
        let task = store.create(new_task(1, "a")).await.unwrap();

        let done = store.set_status(task.id, TaskStatus::Completed).await.unwrap();
        assert_eq!(done.status, TaskStatus::Completed);

        let again = store.set_status(task.id, TaskStatus::Active).await.unwrap();
        assert_eq!(again.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_listing_filters_owner_and_status() {
        let store = MemoryStore::new();
        let a = store.create(new_task(1, "a")).await.unwrap();
        store.create(new_task(1, "b")).await.unwrap();
        store.create(new_task(2, "c")).await.unwrap();
        store.set_status(a.id, TaskStatus::Completed).await.unwrap();

        let active: Vec<String> = store
            .list_active(UserId::new(1))
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(active, vec!["b".to_string()]);
        assert_eq!(store.list_owned(UserId::new(1)).await.unwrap().len(), 2);
        assert_eq!(store.list_all_active().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_task_errors() {
        let store = MemoryStore::new();
        let missing = TaskId::new(40);
        assert!(matches!(
            store.set_report(missing, "x".to_string()).await,
            Err(StoreError::NotFound(id)) if id == missing
        ));
        assert!(matches!(
            store.delete(missing).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let path = temp_snapshot("reopen");

        let id = {
            let store = MemoryStore::open(&path).unwrap();
            let task = store.create(new_task(5, "survive restart")).await.unwrap();
            store
                .set_report(task.id, "it did".to_string())
                .await
                .unwrap();
            let gone = store.create(new_task(5, "deleted")).await.unwrap();
            store.delete(gone.id).await.unwrap();
            task.id
        };

        let store = MemoryStore::open(&path).unwrap();
        let task = store.get(id).await.unwrap().unwrap();
        assert_eq!(task.text, "survive restart");
        assert_eq!(task.report.as_deref(), Some("it did"));
        assert_eq!(store.list_owned(UserId::new(5)).await.unwrap().len(), 1);

        // Ids are never reused after a restart
        let next = store.create(new_task(5, "next")).await.unwrap();
        assert_eq!(next.id, TaskId::new(3));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_failed_snapshot_rolls_back() {
        let dir = std::env::temp_dir().join(format!("nudge-missing-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let store = MemoryStore::open(dir.join("tasks.json")).unwrap();

        assert!(matches!(
            store.create(new_task(1, "lost")).await,
            Err(StoreError::Io(_))
        ));
        assert!(store.list_owned(UserId::new(1)).await.unwrap().is_empty());

        // Once the directory exists the next id is still the first one
        std::fs::create_dir_all(&dir).unwrap();
        let task = store.create(new_task(1, "kept")).await.unwrap();
        assert_eq!(task.id, TaskId::new(1));

        std::fs::remove_dir_all(&dir).unwrap();
        assert!(matches!(
            store.set_text(task.id, "changed".to_string()).await,
            Err(StoreError::Io(_))
        ));
        assert_eq!(store.get(task.id).await.unwrap().unwrap().text, "kept");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_all_reach_snapshot() {
        let path = temp_snapshot("concurrent");
        let store = std::sync::Arc::new(MemoryStore::open(&path).unwrap());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let task = store.create(new_task(9, &format!("task {}", i))).await?;
                    store.set_report(task.id, format!("report {}", i)).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let reopened = MemoryStore::open(&path).unwrap();
        let tasks = reopened.list_owned(UserId::new(9)).await.unwrap();
        assert_eq!(tasks.len(), 16);
        assert!(tasks.iter().all(|t| t.report.is_some()));

        let _ = std::fs::remove_file(&path);
    }
}
