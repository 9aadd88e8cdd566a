use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::warn;

use crate::types::{Column, ColumnId, Task, TaskId};

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum ColumnConfigError {
    #[error("column id `{0}` is configured more than once")]
    DuplicateId(ColumnId),
    #[error("status `{status}` is mapped by both `{first}` and `{second}`")]
    DuplicateStatus {
        status: String,
        first: ColumnId,
        second: ColumnId,
    },
}

/// Ordered column definitions with a status → column lookup.
#[derive(Debug, Clone, Default)]
pub struct ColumnRegistry {
    columns: Vec<Column>,
    by_status: HashMap<String, usize>,
    by_id: HashMap<ColumnId, usize>,
}

impl ColumnRegistry {
    pub fn new(columns: Vec<Column>) -> Result<Self, ColumnConfigError> {
        let mut by_status = HashMap::with_capacity(columns.len());
        let mut by_id = HashMap::with_capacity(columns.len());

        for (idx, column) in columns.iter().enumerate() {
            if by_id.insert(column.id.clone(), idx).is_some() {
                return Err(ColumnConfigError::DuplicateId(column.id.clone()));
            }
            if let Some(first) = by_status.insert(column.status.clone(), idx) {
                return Err(ColumnConfigError::DuplicateStatus {
                    status: column.status.clone(),
                    first: columns[first].id.clone(),
                    second: column.id.clone(),
                });
            }
        }

        Ok(Self {
            columns,
            by_status,
            by_id,
        })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, id: &ColumnId) -> Option<&Column> {
        self.by_id.get(id).map(|&idx| &self.columns[idx])
    }

    pub fn position(&self, id: &ColumnId) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn column_for_status(&self, status: &str) -> Option<&Column> {
        self.by_status.get(status).map(|&idx| &self.columns[idx])
    }

    pub fn group_by_column(&self, tasks: &[Task]) -> GroupedTasks {
        group_by_column(tasks, self)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ColumnGroup {
    pub column: Column,
    pub tasks: Vec<Task>,
}

/// Per-column task lists in configured column order.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct GroupedTasks {
    groups: Vec<ColumnGroup>,
    hidden: Vec<TaskId>,
}

impl GroupedTasks {
    pub fn groups(&self) -> &[ColumnGroup] {
        &self.groups
    }

    pub fn get(&self, column_id: &ColumnId) -> Option<&[Task]> {
        self.groups
            .iter()
            .find(|group| &group.column.id == column_id)
            .map(|group| group.tasks.as_slice())
    }

    /// Tasks left off the board because no column maps their status.
    pub fn hidden(&self) -> &[TaskId] {
        &self.hidden
    }

    pub fn column_of(&self, task_id: &TaskId) -> Option<&ColumnId> {
        self.groups
            .iter()
            .find(|group| group.tasks.iter().any(|task| &task.id == task_id))
            .map(|group| &group.column.id)
    }

    pub fn visible_count(&self) -> usize {
        self.groups.iter().map(|group| group.tasks.len()).sum()
    }
}

pub fn group_by_column(tasks: &[Task], registry: &ColumnRegistry) -> GroupedTasks {
    let mut groups: Vec<ColumnGroup> = registry
        .columns()
        .iter()
        .map(|column| ColumnGroup {
            column: column.clone(),
            tasks: Vec::new(),
        })
        .collect();
    let mut hidden = Vec::new();
    let mut unknown_statuses = HashSet::new();

    for task in tasks {
        match registry.by_status.get(task.status.as_str()) {
            Some(&idx) => groups[idx].tasks.push(task.clone()),
            None => {
                if unknown_statuses.insert(task.status.as_str()) {
                    warn!(
                        task_id = %task.id,
                        status = %task.status,
                        "task status has no configured column; hiding it from the board"
                    );
                }
                hidden.push(task.id.clone());
            }
        }
    }

    GroupedTasks { groups, hidden }
}
