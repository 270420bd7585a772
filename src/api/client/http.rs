//! HTTP client implementation
//!
//! Talks to the API server with `reqwest` and unwraps its JSON envelope.

use std::sync::Arc;

use reqwest::{Client as ReqwestClient, Error as ReqwestError, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::Client;
use crate::models::{self, TaskDraft, TaskId, UserId};
use crate::schedule::ReminderJob;

/// API client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Generic API response structure
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] ReqwestError),

    #[error("API error: {0}")]
    Api(String),

    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("Missing data in response")]
    MissingData,
}

/// API client for the reminder service
#[derive(Debug, Clone)]
pub struct HttpClientImpl {
    http_client: Arc<ReqwestClient>,
    config: ClientConfig,
}

#[derive(Serialize)]
struct ReportBody {
    report: String,
}

#[derive(Serialize)]
struct TextBody {
    text: String,
}

#[derive(Serialize)]
struct ChecklistBody {
    items: Vec<String>,
}

impl HttpClientImpl {
    /// Create a new client with default configuration
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            http_client: Arc::new(ReqwestClient::new()),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Sends a request and unwraps the response envelope
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        self.send_inner(request, None).await
    }

    /// Like `send`, but a 404 means the given task is gone
    async fn send_for_task<T: DeserializeOwned>(
        &self,
        id: TaskId,
        request: RequestBuilder,
    ) -> Result<T, ClientError> {
        self.send_inner(request, Some(id)).await
    }

    async fn send_inner<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        task: Option<TaskId>,
    ) -> Result<T, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        let api_response: ApiResponse<T> = response.json().await?;

        if api_response.success {
            api_response.data.ok_or(ClientError::MissingData)
        } else {
            Err(error_from_envelope(status, api_response.error, task))
        }
    }
}

/// Maps a failed envelope to the same error `CoreClient` would return
fn error_from_envelope(
    status: StatusCode,
    error: Option<String>,
    task: Option<TaskId>,
) -> ClientError {
    match task {
        Some(id) if status == StatusCode::NOT_FOUND => ClientError::TaskNotFound(id),
        _ => ClientError::Api(error.unwrap_or_else(|| format!("HTTP error: {}", status))),
    }
}

impl Default for HttpClientImpl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Client for HttpClientImpl {
    async fn create_task(
        &self,
        user: UserId,
        draft: TaskDraft,
    ) -> Result<models::CreatedTask, ClientError> {
        let url = self.url(&format!("/api/users/{}/tasks", user));
        self.send(self.http_client.post(url).json(&draft)).await
    }

    async fn list_tasks(&self, user: UserId) -> Result<Vec<models::Task>, ClientError> {
        let url = self.url(&format!("/api/users/{}/tasks", user));
        self.send(self.http_client.get(url)).await
    }

    async fn get_task(&self, id: TaskId) -> Result<models::Task, ClientError> {
        let url = self.url(&format!("/api/tasks/{}", id));
        self.send_for_task(id, self.http_client.get(url)).await
    }

    async fn complete_task(&self, id: TaskId) -> Result<models::Completion, ClientError> {
        let url = self.url(&format!("/api/tasks/{}/complete", id));
        self.send_for_task(id, self.http_client.post(url)).await
    }

    async fn submit_report(
        &self,
        id: TaskId,
        report: String,
    ) -> Result<models::Task, ClientError> {
        let url = self.url(&format!("/api/tasks/{}/report", id));
        let body = ReportBody { report };
        self.send_for_task(id, self.http_client.post(url).json(&body)).await
    }

    async fn edit_text(&self, id: TaskId, text: String) -> Result<models::Task, ClientError> {
        let url = self.url(&format!("/api/tasks/{}/text", id));
        let body = TextBody { text };
        self.send_for_task(id, self.http_client.put(url).json(&body)).await
    }

    async fn set_checklist(
        &self,
        id: TaskId,
        items: Vec<String>,
    ) -> Result<models::Task, ClientError> {
        let url = self.url(&format!("/api/tasks/{}/checklist", id));
        let body = ChecklistBody { items };
        self.send_for_task(id, self.http_client.put(url).json(&body)).await
    }

    async fn delete_task(&self, id: TaskId) -> Result<models::Task, ClientError> {
        let url = self.url(&format!("/api/tasks/{}", id));
        self.send_for_task(id, self.http_client.delete(url)).await
    }

    async fn stats(&self, user: UserId) -> Result<models::TaskStats, ClientError> {
        let url = self.url(&format!("/api/users/{}/stats", user));
        self.send(self.http_client.get(url)).await
    }

    async fn history(&self, user: UserId) -> Result<Vec<models::HistoryEntry>, ClientError> {
        let url = self.url(&format!("/api/users/{}/history", user));
        self.send(self.http_client.get(url)).await
    }

    async fn pending_reminders(&self, id: TaskId) -> Result<Vec<ReminderJob>, ClientError> {
        let url = self.url(&format!("/api/tasks/{}/reminders", id));
        self.send_for_task(id, self.http_client.get(url)).await
    }

    async fn motivation(&self) -> Result<String, ClientError> {
        let url = self.url("/api/motivation");
        self.send(self.http_client.get(url)).await
    }

    async fn weekend(&self) -> Result<models::WeekendStatus, ClientError> {
        let url = self.url("/api/weekend");
        self.send(self.http_client.get(url)).await
    }
}
