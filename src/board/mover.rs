//! Optimistic status changes with rollback.
//!
//! A move is applied to the shared collection before the remote call is made.
//! Each request for a task gets a generation number; only the newest request
//! still in flight may commit or roll back, so a slow response for an older
//! drag can never overwrite a newer one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::collection::TaskCollection;
use super::columns::ColumnRegistry;
use super::lock;
use crate::remote::{RepositoryError, TaskRepository};
use crate::types::{ColumnId, Task, TaskId};

pub const DEFAULT_MOVE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum MoveError {
    #[error("task {0} is not on this board")]
    UnknownTask(TaskId),
    #[error("column {0} is not configured")]
    UnknownColumn(ColumnId),
    #[error("move of {task_id} was rejected: {reason}")]
    Rejected { task_id: TaskId, reason: String },
    #[error("move of {task_id} conflicts with a newer change: {reason}")]
    Conflict { task_id: TaskId, reason: String },
    #[error("move of {task_id} timed out after {after:?}")]
    Timeout { task_id: TaskId, after: Duration },
    #[error("move of {task_id} failed: {reason}")]
    Network { task_id: TaskId, reason: String },
}

impl MoveError {
    fn from_repository(task_id: TaskId, err: RepositoryError) -> Self {
        match err {
            RepositoryError::Rejected(reason) | RepositoryError::NotFound(reason) => {
                MoveError::Rejected { task_id, reason }
            }
            RepositoryError::Conflict(reason) => MoveError::Conflict { task_id, reason },
            RepositoryError::Timeout(after) => MoveError::Timeout { task_id, after },
            RepositoryError::Network(reason)
            | RepositoryError::Server(reason)
            | RepositoryError::Decode(reason) => MoveError::Network { task_id, reason },
        }
    }

    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            MoveError::UnknownTask(task_id)
            | MoveError::Rejected { task_id, .. }
            | MoveError::Conflict { task_id, .. }
            | MoveError::Timeout { task_id, .. }
            | MoveError::Network { task_id, .. } => Some(task_id),
            MoveError::UnknownColumn(_) => None,
        }
    }

    /// Failures the user can retry by dragging again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, MoveError::UnknownTask(_) | MoveError::UnknownColumn(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MoveError::UnknownTask(_) => "unknown_task",
            MoveError::UnknownColumn(_) => "unknown_column",
            MoveError::Rejected { .. } => "rejected",
            MoveError::Conflict { .. } => "conflict",
            MoveError::Timeout { .. } => "timeout",
            MoveError::Network { .. } => "network",
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum MoveOutcome {
    /// The task already had the target status; nothing was sent.
    Unchanged,
    /// The server accepted the move; carries its canonical copy of the task.
    Committed(Task),
    /// A newer move of the same task was issued before this response arrived.
    Superseded,
}

/// An optimistic move that has been applied locally and awaits the server.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MoveTicket {
    task_id: TaskId,
    generation: u64,
    request_id: Uuid,
    from_status: String,
    to_status: String,
}

impl MoveTicket {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn from_status(&self) -> &str {
        &self.from_status
    }

    pub fn to_status(&self) -> &str {
        &self.to_status
    }
}

#[derive(Debug, Clone)]
struct InFlight {
    latest: u64,
    /// Status the latest request asks for; shown until it settles.
    target: String,
    /// Status restored if the latest request fails.
    fallback: String,
    /// Last status the server is known to hold.
    confirmed: String,
}

#[derive(Debug, Default)]
struct Tracker {
    next_generation: u64,
    in_flight: HashMap<TaskId, InFlight>,
    settle_seq: u64,
    /// Local copy of each task as of its last settled move, tagged with `settle_seq`.
    settled: HashMap<TaskId, (u64, Task)>,
}

impl Tracker {
    fn record_settled(&mut self, collection: &TaskCollection, task_id: &TaskId) {
        self.settle_seq += 1;
        if let Some(task) = collection.get(task_id) {
            self.settled
                .insert(task_id.clone(), (self.settle_seq, task.clone()));
        }
    }
}

pub struct OptimisticMover<R> {
    repository: Arc<R>,
    collection: Arc<Mutex<TaskCollection>>,
    tracker: Arc<Mutex<Tracker>>,
    timeout: Duration,
}

impl<R> Clone for OptimisticMover<R> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            collection: Arc::clone(&self.collection),
            tracker: Arc::clone(&self.tracker),
            timeout: self.timeout,
        }
    }
}

impl<R> std::fmt::Debug for OptimisticMover<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimisticMover")
            .field("timeout", &self.timeout)
            .field("in_flight", &lock(&self.tracker).in_flight.len())
            .finish()
    }
}

impl<R: TaskRepository> OptimisticMover<R> {
    pub fn new(repository: Arc<R>, collection: Arc<Mutex<TaskCollection>>, timeout: Duration) -> Self {
        Self {
            repository,
            collection,
            tracker: Arc::default(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn collection(&self) -> &Arc<Mutex<TaskCollection>> {
        &self.collection
    }

    pub fn in_flight(&self, task_id: &TaskId) -> bool {
        lock(&self.tracker).in_flight.contains_key(task_id)
    }

    pub fn in_flight_count(&self) -> usize {
        lock(&self.tracker).in_flight.len()
    }

    /// Moves `task_id` from `from_column` to `to_column`, applying the change
    /// locally before the remote call and reverting it if the call fails.
    pub async fn move_task(
        &self,
        registry: &ColumnRegistry,
        task_id: &TaskId,
        from_column: &ColumnId,
        to_column: &ColumnId,
    ) -> Result<MoveOutcome, MoveError> {
        match self.begin(registry, task_id, from_column, to_column)? {
            Some(ticket) => self.complete(ticket).await,
            None => Ok(MoveOutcome::Unchanged),
        }
    }

    /// Applies the move locally. Returns `None` when the task already has the
    /// target status, in which case no remote call is needed.
    pub fn begin(
        &self,
        registry: &ColumnRegistry,
        task_id: &TaskId,
        from_column: &ColumnId,
        to_column: &ColumnId,
    ) -> Result<Option<MoveTicket>, MoveError> {
        let from_status = registry
            .get(from_column)
            .ok_or_else(|| MoveError::UnknownColumn(from_column.clone()))?
            .status
            .clone();
        let to_status = registry
            .get(to_column)
            .ok_or_else(|| MoveError::UnknownColumn(to_column.clone()))?
            .status
            .clone();

        let mut collection = lock(&self.collection);
        let current = collection
            .status_of(task_id)
            .ok_or_else(|| MoveError::UnknownTask(task_id.clone()))?
            .to_string();

        if current == to_status {
            debug!(task_id = %task_id, status = %to_status, "move to current status skipped");
            return Ok(None);
        }
        if current != from_status {
            warn!(
                task_id = %task_id,
                expected = %from_status,
                actual = %current,
                "move source column is out of date; rolling back to the current status on failure"
            );
        }

        collection.set_status(task_id, &to_status);

        let mut tracker = lock(&self.tracker);
        tracker.next_generation += 1;
        let generation = tracker.next_generation;
        let confirmed = tracker
            .in_flight
            .get(task_id)
            .map(|entry| entry.confirmed.clone())
            .unwrap_or_else(|| current.clone());
        tracker.in_flight.insert(
            task_id.clone(),
            InFlight {
                latest: generation,
                target: to_status.clone(),
                fallback: current.clone(),
                confirmed,
            },
        );

        let ticket = MoveTicket {
            task_id: task_id.clone(),
            generation,
            request_id: Uuid::new_v4(),
            from_status: current,
            to_status,
        };
        info!(
            task_id = %ticket.task_id,
            request_id = %ticket.request_id,
            generation,
            from = %ticket.from_status,
            to = %ticket.to_status,
            "optimistic move applied"
        );
        Ok(Some(ticket))
    }

    /// Sends the remote update for a ticket from [`begin`](Self::begin) and settles it.
    pub async fn complete(&self, ticket: MoveTicket) -> Result<MoveOutcome, MoveError> {
        let remote = self
            .repository
            .move_task(&ticket.task_id, &ticket.to_status, ticket.request_id);
        let result = match tokio::time::timeout(self.timeout, remote).await {
            Ok(result) => result,
            Err(_) => Err(RepositoryError::Timeout(self.timeout)),
        };
        self.settle(ticket, result)
    }

    fn settle(
        &self,
        ticket: MoveTicket,
        result: Result<Task, RepositoryError>,
    ) -> Result<MoveOutcome, MoveError> {
        let mut collection = lock(&self.collection);
        let mut tracker = lock(&self.tracker);

        let Some(entry) = tracker.in_flight.get_mut(&ticket.task_id) else {
            debug!(request_id = %ticket.request_id, "response for a move no longer tracked; discarded");
            return Ok(MoveOutcome::Superseded);
        };

        if entry.latest != ticket.generation {
            match &result {
                Ok(task) => entry.confirmed = task.status.clone(),
                Err(_) if entry.fallback == ticket.to_status => {
                    entry.fallback = entry.confirmed.clone();
                }
                Err(_) => {}
            }
            debug!(
                task_id = %ticket.task_id,
                request_id = %ticket.request_id,
                generation = ticket.generation,
                latest = entry.latest,
                succeeded = result.is_ok(),
                "stale move response discarded"
            );
            return Ok(MoveOutcome::Superseded);
        }

        let Some(entry) = tracker.in_flight.remove(&ticket.task_id) else {
            return Ok(MoveOutcome::Superseded);
        };

        let outcome = match result {
            Ok(task) => {
                if task.status != ticket.to_status {
                    warn!(
                        task_id = %ticket.task_id,
                        requested = %ticket.to_status,
                        canonical = %task.status,
                        "server settled the move on a different status"
                    );
                }
                collection.apply_canonical(task.clone());
                debug!(task_id = %ticket.task_id, request_id = %ticket.request_id, "move committed");
                Ok(MoveOutcome::Committed(task))
            }
            Err(err) => {
                collection.set_status(&ticket.task_id, &entry.fallback);
                let err = MoveError::from_repository(ticket.task_id.clone(), err);
                warn!(
                    task_id = %ticket.task_id,
                    request_id = %ticket.request_id,
                    kind = err.kind(),
                    restored = %entry.fallback,
                    error = %err,
                    "move failed; rolled back"
                );
                Err(err)
            }
        };
        tracker.record_settled(&collection, &ticket.task_id);
        outcome
    }
}

impl<R> OptimisticMover<R> {
    /// Rolls back a ticket whose remote call was never completed. The server
    /// is assumed to still hold the status it had before the move.
    pub fn abandon(&self, ticket: &MoveTicket) {
        let mut collection = lock(&self.collection);
        let mut tracker = lock(&self.tracker);

        let Some(entry) = tracker.in_flight.get_mut(&ticket.task_id) else {
            return;
        };
        if entry.latest != ticket.generation {
            if entry.fallback == ticket.to_status {
                entry.fallback = entry.confirmed.clone();
            }
            debug!(
                task_id = %ticket.task_id,
                request_id = %ticket.request_id,
                "superseded move abandoned"
            );
            return;
        }

        if let Some(entry) = tracker.in_flight.remove(&ticket.task_id) {
            collection.set_status(&ticket.task_id, &entry.fallback);
            warn!(
                task_id = %ticket.task_id,
                request_id = %ticket.request_id,
                restored = %entry.fallback,
                "move abandoned before the server answered; rolled back"
            );
            tracker.record_settled(&collection, &ticket.task_id);
        }
    }

    /// Marks the start of a refetch; pass it to [`reapply_pending`](Self::reapply_pending).
    pub(in crate::board) fn settle_mark(&self) -> u64 {
        lock(&self.tracker).settle_seq
    }

    /// Re-applies local move state over a freshly fetched collection: tasks
    /// settled after `since` keep their settled copy, tasks still in flight
    /// keep their optimistic status. Returns how many tasks were overlaid.
    pub(in crate::board) fn reapply_pending(
        &self,
        collection: &mut TaskCollection,
        since: u64,
    ) -> usize {
        let mut tracker = lock(&self.tracker);
        let mut overlaid = 0;
        for (seq, task) in tracker.settled.values() {
            if *seq > since && collection.apply_canonical(task.clone()) {
                overlaid += 1;
            }
        }
        for (task_id, entry) in &tracker.in_flight {
            if collection.set_status(task_id, &entry.target).is_some() {
                overlaid += 1;
            }
        }
        tracker.settled.retain(|_, (seq, _)| *seq > since);
        overlaid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::InMemoryBoard;
    use crate::types::Column;

    fn columns() -> Vec<Column> {
        vec![
            Column::new("todo", "To Do", "TODO"),
            Column::new("doing", "Doing", "DOING"),
            Column::new("done", "Done", "DONE"),
        ]
    }

    fn setup() -> (
        Arc<InMemoryBoard>,
        OptimisticMover<InMemoryBoard>,
        ColumnRegistry,
    ) {
        let tasks = vec![Task::new("t1", "One", "TODO")];
        let remote = Arc::new(InMemoryBoard::new(columns(), tasks.clone()));
        let collection = Arc::new(Mutex::new(TaskCollection::new(tasks)));
        let mover = OptimisticMover::new(Arc::clone(&remote), collection, DEFAULT_MOVE_TIMEOUT);
        let registry = ColumnRegistry::new(columns()).expect("valid columns");
        (remote, mover, registry)
    }

    fn local_status(mover: &OptimisticMover<InMemoryBoard>) -> String {
        lock(mover.collection())
            .status_of(&"t1".into())
            .unwrap_or_default()
            .to_string()
    }

    #[tokio::test]
    async fn begin_applies_change_before_remote_call() {
        let (remote, mover, registry) = setup();
        let ticket = mover
            .begin(&registry, &"t1".into(), &"todo".into(), &"doing".into())
            .expect("begin")
            .expect("ticket");
        assert_eq!(local_status(&mover), "DOING");
        assert!(mover.in_flight(&"t1".into()));
        assert!(remote.move_calls().is_empty());

        let outcome = mover.complete(ticket).await.expect("complete");
        assert!(matches!(outcome, MoveOutcome::Committed(task) if task.status == "DOING"));
        assert!(!mover.in_flight(&"t1".into()));
        assert_eq!(remote.move_calls().len(), 1);
    }

    #[tokio::test]
    async fn failure_rolls_back_to_original_status() {
        let (remote, mover, registry) = setup();
        remote.fail_next_moves([RepositoryError::Rejected("not allowed".to_string())]);
        let err = mover
            .move_task(&registry, &"t1".into(), &"todo".into(), &"doing".into())
            .await
            .expect_err("move should fail");
        assert_eq!(
            err,
            MoveError::Rejected {
                task_id: "t1".into(),
                reason: "not allowed".to_string()
            }
        );
        assert!(err.is_retryable());
        assert_eq!(local_status(&mover), "TODO");
    }

    #[tokio::test]
    async fn same_status_move_is_a_local_noop() {
        let (remote, mover, registry) = setup();
        let outcome = mover
            .move_task(&registry, &"t1".into(), &"todo".into(), &"todo".into())
            .await
            .expect("noop");
        assert_eq!(outcome, MoveOutcome::Unchanged);
        assert!(remote.move_calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_task_or_column_is_reported_without_side_effects() {
        let (remote, mover, registry) = setup();
        assert_eq!(
            mover
                .move_task(&registry, &"t9".into(), &"todo".into(), &"doing".into())
                .await,
            Err(MoveError::UnknownTask("t9".into()))
        );
        assert_eq!(
            mover
                .move_task(&registry, &"t1".into(), &"todo".into(), &"archive".into())
                .await,
            Err(MoveError::UnknownColumn("archive".into()))
        );
        assert!(remote.move_calls().is_empty());
        assert_eq!(local_status(&mover), "TODO");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_handled_like_a_network_failure() {
        let tasks = vec![Task::new("t1", "One", "TODO")];
        let remote = Arc::new(InMemoryBoard::new(columns(), tasks.clone()));
        remote.delay_next_moves([Duration::from_secs(60)]);
        let collection = Arc::new(Mutex::new(TaskCollection::new(tasks)));
        let mover = OptimisticMover::new(remote, collection, Duration::from_secs(2));
        let registry = ColumnRegistry::new(columns()).expect("valid columns");

        let err = mover
            .move_task(&registry, &"t1".into(), &"todo".into(), &"done".into())
            .await
            .expect_err("should time out");
        assert_eq!(
            err,
            MoveError::Timeout {
                task_id: "t1".into(),
                after: Duration::from_secs(2)
            }
        );
        assert_eq!(local_status(&mover), "TODO");
    }

    #[tokio::test]
    async fn stale_success_is_ignored_and_latest_wins() {
        let (_remote, mover, registry) = setup();
        let first = mover
            .begin(&registry, &"t1".into(), &"todo".into(), &"doing".into())
            .expect("first")
            .expect("ticket");
        let second = mover
            .begin(&registry, &"t1".into(), &"doing".into(), &"done".into())
            .expect("second")
            .expect("ticket");

        let second_outcome = mover.settle(second, Ok(Task::new("t1", "One", "DONE")));
        assert!(matches!(second_outcome, Ok(MoveOutcome::Committed(_))));
        let first_outcome = mover.settle(first, Ok(Task::new("t1", "One", "DOING")));
        assert_eq!(first_outcome, Ok(MoveOutcome::Superseded));
        assert_eq!(local_status(&mover), "DONE");
    }

    #[tokio::test]
    async fn stale_response_arriving_before_latest_is_discarded() {
        let (_remote, mover, registry) = setup();
        let first = mover
            .begin(&registry, &"t1".into(), &"todo".into(), &"doing".into())
            .expect("first")
            .expect("ticket");
        let second = mover
            .begin(&registry, &"t1".into(), &"doing".into(), &"done".into())
            .expect("second")
            .expect("ticket");

        assert_eq!(
            mover.settle(first, Err(RepositoryError::Network("reset".to_string()))),
            Ok(MoveOutcome::Superseded)
        );
        assert_eq!(local_status(&mover), "DONE");
        assert!(mover.in_flight(&"t1".into()));

        // Both requests failed, so the server still holds the original status.
        let err = mover
            .settle(second, Err(RepositoryError::Network("reset".to_string())))
            .expect_err("latest failure surfaces");
        assert_eq!(err.kind(), "network");
        assert_eq!(local_status(&mover), "TODO");
    }

    #[tokio::test]
    async fn latest_failure_after_confirmed_earlier_move_restores_confirmed_status() {
        let (_remote, mover, registry) = setup();
        let first = mover
            .begin(&registry, &"t1".into(), &"todo".into(), &"doing".into())
            .expect("first")
            .expect("ticket");
        let second = mover
            .begin(&registry, &"t1".into(), &"doing".into(), &"done".into())
            .expect("second")
            .expect("ticket");

        mover
            .settle(first, Ok(Task::new("t1", "One", "DOING")))
            .expect("stale success");
        mover
            .settle(second, Err(RepositoryError::Conflict("locked".to_string())))
            .expect_err("latest failure");
        assert_eq!(local_status(&mover), "DOING");
    }

    #[tokio::test(start_paused = true)]
    async fn race_law_final_status_is_latest_target() {
        let (remote, mover, registry) = setup();
        remote.delay_next_moves([Duration::from_millis(200), Duration::from_millis(10)]);

        let first = mover
            .begin(&registry, &"t1".into(), &"todo".into(), &"doing".into())
            .expect("first")
            .expect("ticket");
        let second = mover
            .begin(&registry, &"t1".into(), &"doing".into(), &"done".into())
            .expect("second")
            .expect("ticket");

        let (first_outcome, second_outcome) =
            tokio::join!(mover.complete(first), mover.complete(second));
        assert_eq!(first_outcome, Ok(MoveOutcome::Superseded));
        assert!(matches!(second_outcome, Ok(MoveOutcome::Committed(_))));
        assert_eq!(local_status(&mover), "DONE");
        assert_eq!(mover.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn abandoned_ticket_rolls_back_without_remote_call() {
        let (remote, mover, registry) = setup();
        let ticket = mover
            .begin(&registry, &"t1".into(), &"todo".into(), &"done".into())
            .expect("begin")
            .expect("ticket");
        mover.abandon(&ticket);
        assert_eq!(local_status(&mover), "TODO");
        assert_eq!(mover.in_flight_count(), 0);
        assert!(remote.move_calls().is_empty());

        // A late second abandon of the same ticket is a no-op.
        mover.abandon(&ticket);
        assert_eq!(local_status(&mover), "TODO");
    }

    #[tokio::test]
    async fn abandoning_superseded_ticket_keeps_latest_move() {
        let (_remote, mover, registry) = setup();
        let first = mover
            .begin(&registry, &"t1".into(), &"todo".into(), &"doing".into())
            .expect("first")
            .expect("ticket");
        let second = mover
            .begin(&registry, &"t1".into(), &"doing".into(), &"done".into())
            .expect("second")
            .expect("ticket");

        mover.abandon(&first);
        assert_eq!(local_status(&mover), "DONE");

        // The abandoned request never reached the server, so a failure of the
        // latest one falls back past it.
        mover
            .settle(second, Err(RepositoryError::Network("reset".to_string())))
            .expect_err("latest failure");
        assert_eq!(local_status(&mover), "TODO");
    }

    #[tokio::test]
    async fn refetch_does_not_overwrite_in_flight_or_freshly_settled_moves() {
        let tasks = vec![Task::new("t1", "One", "TODO"), Task::new("t2", "Two", "TODO")];
        let remote = Arc::new(InMemoryBoard::new(columns(), tasks.clone()));
        let collection = Arc::new(Mutex::new(TaskCollection::new(tasks.clone())));
        let mover = OptimisticMover::new(remote, Arc::clone(&collection), DEFAULT_MOVE_TIMEOUT);
        let registry = ColumnRegistry::new(columns()).expect("valid columns");

        let mark = mover.settle_mark();
        let settled = mover
            .begin(&registry, &"t1".into(), &"todo".into(), &"done".into())
            .expect("begin")
            .expect("ticket");
        mover.complete(settled).await.expect("commit");
        let _pending = mover
            .begin(&registry, &"t2".into(), &"todo".into(), &"doing".into())
            .expect("begin")
            .expect("ticket");

        // A listing read before either move reached the server.
        let mut fetched = TaskCollection::new(tasks.clone());
        assert_eq!(mover.reapply_pending(&mut fetched, mark), 2);
        assert_eq!(fetched.status_of(&"t1".into()), Some("DONE"));
        assert_eq!(fetched.status_of(&"t2".into()), Some("DOING"));

        // Once a later refetch has started, the settled copy is no longer laid over it.
        let mark = mover.settle_mark();
        let mut later = TaskCollection::new(tasks);
        assert_eq!(mover.reapply_pending(&mut later, mark), 1);
        assert_eq!(later.status_of(&"t1".into()), Some("TODO"));
        assert_eq!(later.status_of(&"t2".into()), Some("DOING"));
    }
}
