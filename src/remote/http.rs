use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{ColumnSource, RepositoryError, TaskRepository};
use crate::types::{Column, Task, TaskFilters, TaskId};

const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/api".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// JSON-over-HTTP client for the task and column services.
#[derive(Debug, Clone)]
pub struct HttpBoardClient {
    config: ServerConfig,
    client: Client,
}

#[derive(Serialize)]
struct MoveBody<'a> {
    status: &'a str,
}

impl HttpBoardClient {
    pub fn new(config: ServerConfig) -> Result<Self, RepositoryError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| RepositoryError::Network(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn url(&self, segments: &[&str]) -> String {
        let mut url = self.config.base_url.trim_end_matches('/').to_string();
        for segment in segments {
            url.push('/');
            url.push_str(&urlencoding::encode(segment));
        }
        url
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<T, RepositoryError> {
        let response = request
            .send()
            .await
            .map_err(|err| self.map_transport_error(err))?;
        let response = check_status(response, what).await?;
        response.json::<T>().await.map_err(|err| {
            if err.is_timeout() {
                RepositoryError::Timeout(self.config.request_timeout)
            } else {
                RepositoryError::Decode(format!("{what}: {err}"))
            }
        })
    }

    fn map_transport_error(&self, err: reqwest::Error) -> RepositoryError {
        if err.is_timeout() {
            RepositoryError::Timeout(self.config.request_timeout)
        } else {
            RepositoryError::Network(err.to_string())
        }
    }
}

impl TaskRepository for HttpBoardClient {
    async fn list_tasks(
        &self,
        project_id: &str,
        filters: &TaskFilters,
    ) -> Result<Vec<Task>, RepositoryError> {
        let url = format!(
            "{}{}",
            self.url(&["projects", project_id, "tasks"]),
            query_string(filters)
        );
        debug!(%url, "listing tasks");
        self.send(self.client.get(&url), &format!("project {project_id}"))
            .await
    }

    async fn move_task(
        &self,
        task_id: &TaskId,
        new_status: &str,
        request_id: Uuid,
    ) -> Result<Task, RepositoryError> {
        let url = self.url(&["tasks", task_id.as_str()]);
        debug!(%request_id, task_id = %task_id, status = new_status, "sending move");
        let request = self
            .client
            .patch(&url)
            .header(REQUEST_ID_HEADER, request_id.to_string())
            .json(&MoveBody { status: new_status });
        let result = self.send(request, &format!("task {task_id}")).await;
        if let Err(err) = &result {
            warn!(%request_id, task_id = %task_id, error = %err, "move request failed");
        }
        result
    }
}

impl ColumnSource for HttpBoardClient {
    async fn list_columns(&self, project_id: &str) -> Result<Vec<Column>, RepositoryError> {
        let url = self.url(&["projects", project_id, "columns"]);
        self.send(self.client.get(&url), &format!("project {project_id}"))
            .await
    }
}

pub fn query_string(filters: &TaskFilters) -> String {
    let pairs = filters.to_query_pairs();
    if pairs.is_empty() {
        return String::new();
    }
    let encoded = pairs
        .iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    format!("?{encoded}")
}

async fn check_status(response: Response, what: &str) -> Result<Response, RepositoryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, what, &body))
}

pub fn status_error(status: StatusCode, what: &str, body: &str) -> RepositoryError {
    let detail: String = body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
    let message = if detail.is_empty() {
        format!("HTTP {} for {what}", status.as_u16())
    } else {
        format!("HTTP {} for {what}: {detail}", status.as_u16())
    };

    match status {
        StatusCode::NOT_FOUND => RepositoryError::NotFound(what.to_string()),
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => RepositoryError::Conflict(message),
        StatusCode::BAD_REQUEST
        | StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::UNPROCESSABLE_ENTITY => RepositoryError::Rejected(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            RepositoryError::Network(message)
        }
        _ => RepositoryError::Server(message),
    }
}
