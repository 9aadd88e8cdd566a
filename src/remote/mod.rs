//! Boundaries to the services that own the board's data.

pub mod http;
pub mod memory;

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::types::{Column, Task, TaskFilters, TaskId};

pub use http::{HttpBoardClient, ServerConfig};
pub use memory::InMemoryBoard;

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum RepositoryError {
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("conflicting update: {0}")]
    Conflict(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("server error: {0}")]
    Server(String),
    #[error("network failure: {0}")]
    Network(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed response: {0}")]
    Decode(String),
}

impl RepositoryError {
    /// Transport-level failures, as opposed to the server refusing the request.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RepositoryError::Network(_) | RepositoryError::Timeout(_)
        )
    }
}

/// Source of truth for tasks.
#[allow(async_fn_in_trait)]
pub trait TaskRepository {
    async fn list_tasks(
        &self,
        project_id: &str,
        filters: &TaskFilters,
    ) -> Result<Vec<Task>, RepositoryError>;

    /// Persists a new status. Repeating an identical call is harmless; the
    /// returned task is the canonical post-move state. `request_id` identifies
    /// the move end to end and is stable across retries.
    async fn move_task(
        &self,
        task_id: &TaskId,
        new_status: &str,
        request_id: Uuid,
    ) -> Result<Task, RepositoryError>;
}

/// Ordered column configuration for a project.
#[allow(async_fn_in_trait)]
pub trait ColumnSource {
    async fn list_columns(&self, project_id: &str) -> Result<Vec<Column>, RepositoryError>;
}

impl<T: TaskRepository> TaskRepository for std::sync::Arc<T> {
    async fn list_tasks(
        &self,
        project_id: &str,
        filters: &TaskFilters,
    ) -> Result<Vec<Task>, RepositoryError> {
        self.as_ref().list_tasks(project_id, filters).await
    }

    async fn move_task(
        &self,
        task_id: &TaskId,
        new_status: &str,
        request_id: Uuid,
    ) -> Result<Task, RepositoryError> {
        self.as_ref()
            .move_task(task_id, new_status, request_id)
            .await
    }
}

impl<T: ColumnSource> ColumnSource for std::sync::Arc<T> {
    async fn list_columns(&self, project_id: &str) -> Result<Vec<Column>, RepositoryError> {
        self.as_ref().list_columns(project_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_distinguished_from_rejections() {
        assert!(RepositoryError::Network("reset".to_string()).is_transport());
        assert!(RepositoryError::Timeout(Duration::from_secs(1)).is_transport());
        assert!(!RepositoryError::Rejected("no".to_string()).is_transport());
        assert!(!RepositoryError::Conflict("stale".to_string()).is_transport());
    }
}
