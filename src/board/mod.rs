//! Board state and the drag/drop engine driving it.

pub mod collection;
pub mod columns;
pub mod drag;
pub mod drop_zone;
pub mod mover;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::filter::{matches, visible_tasks};
use crate::notification::{Notice, Notifier};
use crate::remote::{ColumnSource, RepositoryError, TaskRepository};
use crate::types::{ColumnId, TaskFilters, TaskId};

pub use collection::TaskCollection;
pub use columns::{ColumnConfigError, ColumnGroup, ColumnRegistry, GroupedTasks};
pub use drag::{
    CancelReason, DragConfig, DragContext, DragMove, DragPhase, DragSession, DragSnapshot,
    DropIntent, DropOutcome, SubscriptionId,
};
pub use drop_zone::{DropZone, DropZoneIndex, LayoutError, Point, Rect};
pub use mover::{MoveError, MoveOutcome, MoveTicket, OptimisticMover};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Writers never leave the data half-updated, so a poisoned lock is still usable.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Remote(#[from] RepositoryError),
    #[error("invalid column configuration: {0}")]
    Columns(#[from] ColumnConfigError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub drag: DragConfig,
    pub drop_zone_slop: f64,
    pub move_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            drag: DragConfig::default(),
            drop_zone_slop: 0.0,
            move_timeout: mover::DEFAULT_MOVE_TIMEOUT,
        }
    }
}

/// Host pointer events, already resolved to the task under the cursor.
#[derive(Debug, Clone, PartialEq)]
pub enum PointerInput {
    Down { task_id: TaskId, at: Point },
    Move { at: Point },
    Up { at: Point },
    /// Pointer left the board surface.
    Leave,
    /// Explicit cancel, e.g. Escape.
    Cancel,
}

/// Result of releasing the pointer.
#[derive(Debug)]
#[must_use = "a committed release rolls back unless its pending move is resolved"]
pub enum Release<R> {
    Ignored,
    Click(TaskId),
    Cancelled(CancelReason),
    Aborted(LayoutError),
    /// The drop could not be applied locally; nothing was sent.
    Failed(MoveError),
    /// Applied locally; the remote call runs when the pending move is resolved.
    Committed(PendingMove<R>),
}

impl<R> Release<R> {
    pub fn kind(&self) -> &'static str {
        match self {
            Release::Ignored => "ignored",
            Release::Click(_) => "click",
            Release::Cancelled(_) => "cancelled",
            Release::Aborted(_) => "aborted",
            Release::Failed(_) => "failed",
            Release::Committed(_) => "committed",
        }
    }
}

/// An optimistic move whose remote confirmation is still outstanding.
///
/// Dropping it without awaiting [`resolve`](Self::resolve) to completion
/// rolls the task back to its status before the move.
#[must_use = "the move is rolled back when dropped unresolved"]
pub struct PendingMove<R> {
    intent: DropIntent,
    ticket: MoveTicket,
    mover: OptimisticMover<R>,
    notifier: Arc<dyn Notifier>,
    settled: bool,
}

impl<R> std::fmt::Debug for PendingMove<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingMove")
            .field("intent", &self.intent)
            .field("ticket", &self.ticket)
            .finish()
    }
}

impl<R: TaskRepository> PendingMove<R> {
    pub fn intent(&self) -> &DropIntent {
        &self.intent
    }

    pub fn ticket(&self) -> &MoveTicket {
        &self.ticket
    }

    /// Sends the remote update. Failures are rolled back and surfaced as a notice.
    pub async fn resolve(mut self) -> Result<MoveOutcome, MoveError> {
        let result = self.mover.complete(self.ticket.clone()).await;
        self.settled = true;
        if let Err(err) = &result {
            self.notifier.notify(Notice::move_failed(err));
        }
        result
    }
}

impl<R> Drop for PendingMove<R> {
    fn drop(&mut self) {
        if !self.settled {
            self.mover.abandon(&self.ticket);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Layout {
    viewport: Rect,
    gap: f64,
    scroll_x: f64,
}

pub struct BoardEngine<R> {
    remote: Arc<R>,
    project_id: String,
    registry: ColumnRegistry,
    collection: Arc<Mutex<TaskCollection>>,
    filters: TaskFilters,
    zones: DropZoneIndex,
    drag: DragSession,
    mover: OptimisticMover<R>,
    notifier: Arc<dyn Notifier>,
    layout: Option<Layout>,
}

impl<R: TaskRepository + ColumnSource> BoardEngine<R> {
    pub fn new(remote: Arc<R>, config: EngineConfig, notifier: Arc<dyn Notifier>) -> Self {
        let collection = Arc::new(Mutex::new(TaskCollection::default()));
        let mover = OptimisticMover::new(
            Arc::clone(&remote),
            Arc::clone(&collection),
            config.move_timeout,
        );
        Self {
            remote,
            project_id: String::new(),
            registry: ColumnRegistry::default(),
            collection,
            filters: TaskFilters::default(),
            zones: DropZoneIndex::new(config.drop_zone_slop),
            drag: DragSession::new(config.drag),
            mover,
            notifier,
            layout: None,
        }
    }

    /// Sets filters without fetching; use before the first [`load`](Self::load).
    pub fn with_filters(mut self, filters: TaskFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn registry(&self) -> &ColumnRegistry {
        &self.registry
    }

    pub fn collection(&self) -> &Arc<Mutex<TaskCollection>> {
        &self.collection
    }

    pub fn filters(&self) -> &TaskFilters {
        &self.filters
    }

    pub fn zones(&self) -> &DropZoneIndex {
        &self.zones
    }

    pub fn drag(&self) -> &DragSession {
        &self.drag
    }

    pub fn mover(&self) -> &OptimisticMover<R> {
        &self.mover
    }

    pub fn subscribe(
        &mut self,
        listener: impl FnMut(&DragSnapshot<'_>) + Send + 'static,
    ) -> SubscriptionId {
        self.drag.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.drag.unsubscribe(id)
    }

    pub async fn load(&mut self, project_id: &str) -> Result<(), EngineError> {
        self.project_id = project_id.to_string();
        self.refresh().await
    }

    pub async fn set_filters(&mut self, filters: TaskFilters) -> Result<(), EngineError> {
        self.filters = filters;
        self.refresh().await
    }

    /// Refetches columns and tasks. The current collection is kept on failure.
    /// Moves still in flight, or settled while the fetch ran, are laid back
    /// over the fetched tasks.
    pub async fn refresh(&mut self) -> Result<(), EngineError> {
        let mark = self.mover.settle_mark();
        let columns = self.remote.list_columns(&self.project_id).await?;
        let tasks = self
            .remote
            .list_tasks(&self.project_id, &self.filters)
            .await?;
        let registry = ColumnRegistry::new(columns)?;

        let task_count = tasks.len();
        let overlaid = {
            let mut collection = lock(&self.collection);
            collection.replace_all(tasks);
            self.mover.reapply_pending(&mut collection, mark)
        };
        let columns_changed = registry.columns() != self.registry.columns();
        self.registry = registry;
        info!(
            project_id = %self.project_id,
            columns = self.registry.len(),
            tasks = task_count,
            overlaid,
            "board refreshed"
        );

        if columns_changed {
            if let Some(layout) = self.layout {
                self.relayout(layout)?;
            }
        }
        Ok(())
    }

    /// Rebuilds drop zones for a new viewport or scroll offset.
    pub fn update_layout(
        &mut self,
        viewport: Rect,
        gap: f64,
        scroll_x: f64,
    ) -> Result<DragMove, EngineError> {
        self.relayout(Layout {
            viewport,
            gap,
            scroll_x,
        })
    }

    fn relayout(&mut self, layout: Layout) -> Result<DragMove, EngineError> {
        self.zones.layout_columns(
            self.registry.columns(),
            layout.viewport,
            layout.gap,
            layout.scroll_x,
        )?;
        self.layout = Some(layout);
        Ok(self.drag.refresh_candidate(&self.zones))
    }

    /// Derived view: visible tasks grouped under their columns.
    pub fn board(&self) -> GroupedTasks {
        let collection = lock(&self.collection);
        let visible = visible_tasks(collection.tasks(), &self.filters);
        self.registry.group_by_column(&visible)
    }

    /// Column currently showing `task_id`, ignoring filters.
    pub fn column_of(&self, task_id: &TaskId) -> Option<ColumnId> {
        let collection = lock(&self.collection);
        collection
            .status_of(task_id)
            .and_then(|status| self.registry.column_for_status(status))
            .map(|column| column.id.clone())
    }

    /// Moves a task without a drag, e.g. from a command. Failures are rolled
    /// back and surfaced as a notice, the same as a dropped card.
    pub async fn move_task(
        &self,
        task_id: &TaskId,
        to_column: &ColumnId,
    ) -> Result<MoveOutcome, MoveError> {
        let result = match self.column_of(task_id) {
            Some(from) => {
                self.mover
                    .move_task(&self.registry, task_id, &from, to_column)
                    .await
            }
            None => Err(MoveError::UnknownTask(task_id.clone())),
        };
        if let Err(err) = &result {
            self.notifier.notify(Notice::move_failed(err));
        }
        result
    }

    /// Arms a drag on a visible task. Returns false if the press was ignored.
    pub fn pointer_down(&mut self, task_id: &TaskId, at: Point) -> bool {
        let source = {
            let collection = lock(&self.collection);
            collection
                .get(task_id)
                .filter(|task| matches(task, &self.filters))
                .and_then(|task| self.registry.column_for_status(&task.status))
                .map(|column| column.id.clone())
        };
        match source {
            Some(source) => self.drag.pointer_down(task_id.clone(), source, at),
            None => {
                debug!(task_id = %task_id, "pointer-down on a task that is not on the board");
                false
            }
        }
    }

    pub fn pointer_move(&mut self, at: Point) -> DragMove {
        self.drag.pointer_move(at, &self.zones)
    }

    pub fn pointer_up(&mut self, at: Point) -> Release<R> {
        match self.drag.pointer_up(at, &self.zones) {
            DropOutcome::Ignored => Release::Ignored,
            DropOutcome::Click(task_id) => Release::Click(task_id),
            DropOutcome::Cancelled(reason) => Release::Cancelled(reason),
            DropOutcome::Aborted(err) => Release::Aborted(err),
            DropOutcome::Commit(intent) => {
                let begun = self.mover.begin(
                    &self.registry,
                    &intent.task_id,
                    &intent.from_column,
                    &intent.to_column,
                );
                self.drag.finish_commit();
                match begun {
                    Ok(Some(ticket)) => Release::Committed(PendingMove {
                        intent,
                        ticket,
                        mover: self.mover.clone(),
                        notifier: Arc::clone(&self.notifier),
                        settled: false,
                    }),
                    Ok(None) => Release::Cancelled(CancelReason::SameColumn),
                    Err(err) => {
                        self.notifier.notify(Notice::move_failed(&err));
                        Release::Failed(err)
                    }
                }
            }
        }
    }

    pub fn cancel_drag(&mut self) -> bool {
        self.drag.cancel()
    }

    /// Routes one host input. Only a release or a cancel of an active drag
    /// produces a [`Release`].
    pub fn dispatch(&mut self, input: PointerInput) -> Option<Release<R>> {
        match input {
            PointerInput::Down { task_id, at } => {
                self.pointer_down(&task_id, at);
                None
            }
            PointerInput::Move { at } => match self.pointer_move(at) {
                DragMove::Aborted(err) => Some(Release::Aborted(err)),
                _ => None,
            },
            PointerInput::Up { at } => Some(self.pointer_up(at)),
            PointerInput::Leave | PointerInput::Cancel => self
                .cancel_drag()
                .then_some(Release::Cancelled(CancelReason::Cancelled)),
        }
    }
}
