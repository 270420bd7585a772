//! Core client implementation
//!
//! This module provides a client implementation that wraps Core directly,
//! providing the same interface as HttpClientImpl but without HTTP overhead.

use super::{Client, ClientError};
use crate::models::{self, CoreError, TaskDraft, TaskId, UserId};
use crate::schedule::ReminderJob;
use crate::Core;

/// A client implementation that wraps Core directly
#[derive(Clone)]
pub struct CoreClient {
    core: Core,
}

impl CoreClient {
    /// Create a new CoreClient with the given Core instance
    pub fn new(core: Core) -> Self {
        Self { core }
    }
}

/// Convert CoreError to ClientError for interface compatibility
impl From<CoreError> for ClientError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::NotFound(id) => ClientError::TaskNotFound(id),
            other => ClientError::Api(other.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl Client for CoreClient {
    async fn create_task(
        &self,
        user: UserId,
        draft: TaskDraft,
    ) -> Result<models::CreatedTask, ClientError> {
        Ok(self.core.create_task(user, draft).await?)
    }

    async fn list_tasks(&self, user: UserId) -> Result<Vec<models::Task>, ClientError> {
        Ok(self.core.list_active(user).await?)
    }

    async fn get_task(&self, id: TaskId) -> Result<models::Task, ClientError> {
        Ok(self.core.get_task(id).await?)
    }

    async fn complete_task(&self, id: TaskId) -> Result<models::Completion, ClientError> {
        Ok(self.core.complete_task(id).await?)
    }

    async fn submit_report(
        &self,
        id: TaskId,
        report: String,
    ) -> Result<models::Task, ClientError> {
        Ok(self.core.submit_report(id, report).await?)
    }

    async fn edit_text(&self, id: TaskId, text: String) -> Result<models::Task, ClientError> {
        Ok(self.core.edit_text(id, text).await?)
    }

    async fn set_checklist(
        &self,
        id: TaskId,
        items: Vec<String>,
    ) -> Result<models::Task, ClientError> {
        Ok(self.core.set_checklist(id, items).await?)
    }

    async fn delete_task(&self, id: TaskId) -> Result<models::Task, ClientError> {
        Ok(self.core.delete_task(id).await?)
    }

    async fn stats(&self, user: UserId) -> Result<models::TaskStats, ClientError> {
        Ok(self.core.stats(user).await?)
    }

    async fn history(&self, user: UserId) -> Result<Vec<models::HistoryEntry>, ClientError> {
        Ok(self.core.history(user).await?)
    }

    async fn pending_reminders(&self, id: TaskId) -> Result<Vec<ReminderJob>, ClientError> {
        Ok(self.core.pending_reminders(id).await?)
    }

    async fn motivation(&self) -> Result<String, ClientError> {
        Ok(self.core.motivation())
    }

    async fn weekend(&self) -> Result<models::WeekendStatus, ClientError> {
        Ok(self.core.weekend())
    }
}
