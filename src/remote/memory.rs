//! In-process board service used by tests and by the CLI's offline mode.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::{ColumnSource, RepositoryError, TaskRepository};
use crate::filter::visible_tasks;
use crate::types::{Column, Task, TaskFilters, TaskId};

/// On-disk shape of a board fixture.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct BoardFixture {
    pub columns: Vec<Column>,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Default)]
struct BoardState {
    columns: Vec<Column>,
    tasks: Vec<Task>,
    move_failures: VecDeque<RepositoryError>,
    move_delays: VecDeque<Duration>,
    move_calls: Vec<(TaskId, String)>,
}

#[derive(Debug, Default)]
pub struct InMemoryBoard {
    state: Mutex<BoardState>,
}

impl InMemoryBoard {
    pub fn new(columns: Vec<Column>, tasks: Vec<Task>) -> Self {
        Self {
            state: Mutex::new(BoardState {
                columns,
                tasks,
                ..BoardState::default()
            }),
        }
    }

    pub fn from_fixture(fixture: BoardFixture) -> Self {
        Self::new(fixture.columns, fixture.tasks)
    }

    pub fn load_fixture(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read board fixture '{}'", path.display()))?;
        let fixture: BoardFixture = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse board fixture '{}'", path.display()))?;
        Ok(Self::from_fixture(fixture))
    }

    /// Writes the current board back through a temporary file.
    pub fn save_fixture(&self, path: &Path) -> anyhow::Result<()> {
        let fixture = self.snapshot();
        let contents =
            serde_json::to_string_pretty(&fixture).context("failed to serialize board fixture")?;
        let file_name = path
            .file_name()
            .ok_or_else(|| anyhow!("invalid fixture path '{}'", path.display()))?
            .to_string_lossy()
            .to_string();
        let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));
        fs::write(&tmp_path, contents)
            .with_context(|| format!("failed to write '{}'", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "failed to rename '{}' to '{}'",
                tmp_path.display(),
                path.display()
            )
        })?;
        Ok(())
    }

    pub fn snapshot(&self) -> BoardFixture {
        let state = self.lock();
        BoardFixture {
            columns: state.columns.clone(),
            tasks: state.tasks.clone(),
        }
    }

    pub fn task(&self, id: &TaskId) -> Option<Task> {
        self.lock().tasks.iter().find(|task| &task.id == id).cloned()
    }

    /// Queues errors returned by upcoming `move_task` calls, in order.
    pub fn fail_next_moves(&self, errors: impl IntoIterator<Item = RepositoryError>) {
        self.lock().move_failures.extend(errors);
    }

    /// Queues artificial latency for upcoming `move_task` calls, in order.
    pub fn delay_next_moves(&self, delays: impl IntoIterator<Item = Duration>) {
        self.lock().move_delays.extend(delays);
    }

    pub fn move_calls(&self) -> Vec<(TaskId, String)> {
        self.lock().move_calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        // A poisoned lock only means a test panicked mid-update; the data is still usable.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TaskRepository for InMemoryBoard {
    async fn list_tasks(
        &self,
        _project_id: &str,
        filters: &TaskFilters,
    ) -> Result<Vec<Task>, RepositoryError> {
        let tasks = self.lock().tasks.clone();
        Ok(visible_tasks(&tasks, filters))
    }

    async fn move_task(
        &self,
        task_id: &TaskId,
        new_status: &str,
        _request_id: Uuid,
    ) -> Result<Task, RepositoryError> {
        let (delay, failure) = {
            let mut state = self.lock();
            state
                .move_calls
                .push((task_id.clone(), new_status.to_string()));
            (state.move_delays.pop_front(), state.move_failures.pop_front())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = failure {
            debug!(task_id = %task_id, error = %err, "injected move failure");
            return Err(err);
        }

        let mut state = self.lock();
        if !state.columns.iter().any(|column| column.status == new_status) {
            return Err(RepositoryError::Rejected(format!(
                "status `{new_status}` is not configured"
            )));
        }
        let task = state
            .tasks
            .iter_mut()
            .find(|task| &task.id == task_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("task {task_id}")))?;
        if task.status != new_status {
            task.status = new_status.to_string();
            task.updated_at = Some(Utc::now().to_rfc3339());
        }
        Ok(task.clone())
    }
}

impl ColumnSource for InMemoryBoard {
    async fn list_columns(&self, _project_id: &str) -> Result<Vec<Column>, RepositoryError> {
        Ok(self.lock().columns.clone())
    }
}
