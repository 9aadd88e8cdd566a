use std::collections::HashMap;

use crate::types::{Task, TaskId};

/// The board's tasks keyed by id, in the order the repository returned them.
///
/// Writes are limited to full refetches and the optimistic mover; everything
/// else only reads.
#[derive(Debug, Default, Clone)]
pub struct TaskCollection {
    tasks: Vec<Task>,
    index: HashMap<TaskId, usize>,
    revision: u64,
}

impl TaskCollection {
    pub fn new(tasks: Vec<Task>) -> Self {
        let mut collection = Self::default();
        collection.replace_all(tasks);
        collection
    }

    /// Replaces the whole set after a refetch. Later duplicates of an id win.
    pub fn replace_all(&mut self, tasks: Vec<Task>) {
        self.tasks.clear();
        self.index.clear();
        for task in tasks {
            match self.index.get(&task.id) {
                Some(&slot) => {
                    tracing::warn!(task_id = %task.id, "duplicate task id in refetch; keeping the latest");
                    self.tasks[slot] = task;
                }
                None => {
                    self.index.insert(task.id.clone(), self.tasks.len());
                    self.tasks.push(task);
                }
            }
        }
        self.revision += 1;
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.index.get(id).map(|&slot| &self.tasks[slot])
    }

    pub fn status_of(&self, id: &TaskId) -> Option<&str> {
        self.get(id).map(|task| task.status.as_str())
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.index.contains_key(id)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Bumped on every write; the derived board recomputes when it changes.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns the previous status, or `None` if the task is unknown.
    pub(in crate::board) fn set_status(&mut self, id: &TaskId, status: &str) -> Option<String> {
        let slot = *self.index.get(id)?;
        let task = &mut self.tasks[slot];
        if task.status == status {
            return Some(status.to_string());
        }
        let previous = std::mem::replace(&mut task.status, status.to_string());
        self.revision += 1;
        Some(previous)
    }

    /// Merges the canonical copy returned by the server, keeping the slot.
    pub(in crate::board) fn apply_canonical(&mut self, task: Task) -> bool {
        let Some(&slot) = self.index.get(&task.id) else {
            return false;
        };
        if self.tasks[slot] != task {
            self.tasks[slot] = task;
            self.revision += 1;
        }
        true
    }
}
