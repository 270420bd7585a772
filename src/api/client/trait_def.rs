//! Client trait definition
//!
//! This module defines the `Client` trait that abstracts over different client implementations.

use super::ClientError;
use crate::models::{self, TaskDraft, TaskId, UserId};
use crate::schedule::ReminderJob;

/// Trait defining the API client interface for the reminder service
#[async_trait::async_trait]
pub trait Client {
    /// Create a task and schedule its reminders
    async fn create_task(
        &self,
        user: UserId,
        draft: TaskDraft,
    ) -> Result<models::CreatedTask, ClientError>;

    /// List the active tasks of a user
    async fn list_tasks(&self, user: UserId) -> Result<Vec<models::Task>, ClientError>;

    async fn get_task(&self, id: TaskId) -> Result<models::Task, ClientError>;

    /// Mark a task done
    async fn complete_task(&self, id: TaskId) -> Result<models::Completion, ClientError>;

    /// Store the completion report of a task
    async fn submit_report(&self, id: TaskId, report: String)
        -> Result<models::Task, ClientError>;

    async fn edit_text(&self, id: TaskId, text: String) -> Result<models::Task, ClientError>;

    /// Replace the checklist of a task
    async fn set_checklist(
        &self,
        id: TaskId,
        items: Vec<String>,
    ) -> Result<models::Task, ClientError>;

    async fn delete_task(&self, id: TaskId) -> Result<models::Task, ClientError>;

    async fn stats(&self, user: UserId) -> Result<models::TaskStats, ClientError>;

    /// Tasks of the last month
    async fn history(&self, user: UserId) -> Result<Vec<models::HistoryEntry>, ClientError>;

    /// Reminder jobs still waiting to fire for a task
    async fn pending_reminders(&self, id: TaskId) -> Result<Vec<ReminderJob>, ClientError>;

    async fn motivation(&self) -> Result<String, ClientError>;

    /// Whether today is a weekend day in the reference zone
    async fn weekend(&self) -> Result<models::WeekendStatus, ClientError>;
}
