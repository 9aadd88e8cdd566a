//! Pointer-driven drag state machine.
//!
//! ```text
//! idle ──down──▶ idle(armed) ──travel ≥ activation──▶ dragging ──up over other column──▶ committing ──▶ idle
//!                    │                                   │
//!                    └──up: click                        └──up over nothing / source, cancel, layout error──▶ idle
//! ```
//!
//! The session only holds ids by value; task data stays in the collection.

use tracing::{debug, error, warn};

use super::drop_zone::{DropZoneIndex, LayoutError, Point};
use crate::types::{ColumnId, TaskId};

pub const DEFAULT_ACTIVATION_DISTANCE: f64 = 8.0;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DragPhase {
    Idle,
    Dragging,
    Committing,
}

impl DragPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            DragPhase::Idle => "idle",
            DragPhase::Dragging => "dragging",
            DragPhase::Committing => "committing",
        }
    }

    pub fn can_transition_to(self, next: DragPhase) -> bool {
        matches!(
            (self, next),
            (DragPhase::Idle, DragPhase::Idle)
                | (DragPhase::Idle, DragPhase::Dragging)
                | (DragPhase::Dragging, DragPhase::Dragging)
                | (DragPhase::Dragging, DragPhase::Committing)
                | (DragPhase::Dragging, DragPhase::Idle)
                | (DragPhase::Committing, DragPhase::Idle)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragConfig {
    /// Minimum pointer travel before a press becomes a drag.
    pub activation_distance: f64,
}

impl Default for DragConfig {
    fn default() -> Self {
        Self {
            activation_distance: DEFAULT_ACTIVATION_DISTANCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DragContext {
    pub active_task_id: TaskId,
    pub source_column_id: ColumnId,
    pub candidate_column_id: Option<ColumnId>,
    pub origin: Point,
    pub pointer: Point,
}

impl DragContext {
    pub fn delta(&self) -> Point {
        Point::new(self.pointer.x - self.origin.x, self.pointer.y - self.origin.y)
    }
}

/// A drop that changes the task's column; handed to the mover.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DropIntent {
    pub task_id: TaskId,
    pub from_column: ColumnId,
    pub to_column: ColumnId,
}

#[derive(Debug, Clone, PartialEq)]
enum DragState {
    Idle,
    Armed {
        task_id: TaskId,
        source_column_id: ColumnId,
        origin: Point,
    },
    Dragging(DragContext),
    Committing(DropIntent),
}

impl DragState {
    fn phase(&self) -> DragPhase {
        match self {
            DragState::Idle | DragState::Armed { .. } => DragPhase::Idle,
            DragState::Dragging(_) => DragPhase::Dragging,
            DragState::Committing(_) => DragPhase::Committing,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DragMove {
    /// No press in progress, or the session is committing.
    Ignored,
    /// Pressed but still under the activation distance.
    Pending,
    Started,
    Moved,
    Aborted(LayoutError),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CancelReason {
    NoTarget,
    SameColumn,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DropOutcome {
    Ignored,
    Click(TaskId),
    Commit(DropIntent),
    Cancelled(CancelReason),
    Aborted(LayoutError),
}

/// What observers see on every phase or candidate change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragSnapshot<'a> {
    pub phase: DragPhase,
    pub active_task_id: Option<&'a TaskId>,
    pub source_column_id: Option<&'a ColumnId>,
    pub candidate_column_id: Option<&'a ColumnId>,
    pub pointer: Option<Point>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&DragSnapshot<'_>) + Send>;

pub struct DragSession {
    config: DragConfig,
    state: DragState,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
}

impl std::fmt::Debug for DragSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DragSession")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Default for DragSession {
    fn default() -> Self {
        Self::new(DragConfig::default())
    }
}

impl DragSession {
    pub fn new(config: DragConfig) -> Self {
        Self {
            config,
            state: DragState::Idle,
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn config(&self) -> DragConfig {
        self.config
    }

    pub fn phase(&self) -> DragPhase {
        self.state.phase()
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, DragState::Armed { .. })
    }

    /// Active drag details while dragging.
    pub fn context(&self) -> Option<&DragContext> {
        match &self.state {
            DragState::Dragging(context) => Some(context),
            _ => None,
        }
    }

    pub fn pending_drop(&self) -> Option<&DropIntent> {
        match &self.state {
            DragState::Committing(intent) => Some(intent),
            _ => None,
        }
    }

    pub fn candidate_column(&self) -> Option<&ColumnId> {
        self.context()
            .and_then(|context| context.candidate_column_id.as_ref())
    }

    pub fn snapshot(&self) -> DragSnapshot<'_> {
        match &self.state {
            DragState::Idle => DragSnapshot {
                phase: DragPhase::Idle,
                active_task_id: None,
                source_column_id: None,
                candidate_column_id: None,
                pointer: None,
            },
            DragState::Armed {
                task_id,
                source_column_id,
                origin,
            } => DragSnapshot {
                phase: DragPhase::Idle,
                active_task_id: Some(task_id),
                source_column_id: Some(source_column_id),
                candidate_column_id: None,
                pointer: Some(*origin),
            },
            DragState::Dragging(context) => DragSnapshot {
                phase: DragPhase::Dragging,
                active_task_id: Some(&context.active_task_id),
                source_column_id: Some(&context.source_column_id),
                candidate_column_id: context.candidate_column_id.as_ref(),
                pointer: Some(context.pointer),
            },
            DragState::Committing(intent) => DragSnapshot {
                phase: DragPhase::Committing,
                active_task_id: Some(&intent.task_id),
                source_column_id: Some(&intent.from_column),
                candidate_column_id: Some(&intent.to_column),
                pointer: None,
            },
        }
    }

    pub fn subscribe(
        &mut self,
        listener: impl FnMut(&DragSnapshot<'_>) + Send + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    /// Arms a drag on `task_id`. Ignored while another press or drag is active.
    pub fn pointer_down(&mut self, task_id: TaskId, source_column_id: ColumnId, at: Point) -> bool {
        if !matches!(self.state, DragState::Idle) {
            debug!(task_id = %task_id, phase = self.phase().as_str(), "pointer-down ignored; drag already active");
            return false;
        }
        if !at.is_finite() {
            warn!(task_id = %task_id, "pointer-down at non-finite position ignored");
            return false;
        }
        self.transition(DragState::Armed {
            task_id,
            source_column_id,
            origin: at,
        });
        true
    }

    pub fn pointer_move(&mut self, at: Point, zones: &DropZoneIndex) -> DragMove {
        match &mut self.state {
            DragState::Armed {
                task_id,
                source_column_id,
                origin,
            } => {
                if !at.is_finite() {
                    let err = LayoutError::InvalidPointer { x: at.x, y: at.y };
                    self.abort(&err);
                    return DragMove::Aborted(err);
                }
                if origin.distance(at) < self.config.activation_distance {
                    return DragMove::Pending;
                }
                let candidate = match zones.hit_test(at) {
                    Ok(hit) => hit.cloned(),
                    Err(err) => {
                        self.abort(&err);
                        return DragMove::Aborted(err);
                    }
                };
                let context = DragContext {
                    active_task_id: task_id.clone(),
                    source_column_id: source_column_id.clone(),
                    candidate_column_id: candidate,
                    origin: *origin,
                    pointer: at,
                };
                debug!(task_id = %context.active_task_id, "drag started");
                self.transition(DragState::Dragging(context));
                DragMove::Started
            }
            DragState::Dragging(context) => {
                let hit = match zones.hit_test(at) {
                    Ok(hit) => hit,
                    Err(err) => {
                        self.abort(&err);
                        return DragMove::Aborted(err);
                    }
                };
                context.pointer = at;
                if context.candidate_column_id.as_ref() != hit {
                    context.candidate_column_id = hit.cloned();
                    self.notify();
                }
                DragMove::Moved
            }
            DragState::Idle | DragState::Committing(_) => DragMove::Ignored,
        }
    }

    pub fn pointer_up(&mut self, at: Point, zones: &DropZoneIndex) -> DropOutcome {
        match &self.state {
            DragState::Armed { task_id, .. } => {
                let task_id = task_id.clone();
                self.transition(DragState::Idle);
                DropOutcome::Click(task_id)
            }
            DragState::Dragging(context) => {
                let target = match zones.hit_test(at) {
                    Ok(hit) => hit.cloned(),
                    Err(err) => {
                        self.abort(&err);
                        return DropOutcome::Aborted(err);
                    }
                };
                match target {
                    None => {
                        debug!(task_id = %context.active_task_id, "dropped outside any column");
                        self.transition(DragState::Idle);
                        DropOutcome::Cancelled(CancelReason::NoTarget)
                    }
                    Some(target) if target == context.source_column_id => {
                        self.transition(DragState::Idle);
                        DropOutcome::Cancelled(CancelReason::SameColumn)
                    }
                    Some(target) => {
                        let intent = DropIntent {
                            task_id: context.active_task_id.clone(),
                            from_column: context.source_column_id.clone(),
                            to_column: target,
                        };
                        self.transition(DragState::Committing(intent.clone()));
                        DropOutcome::Commit(intent)
                    }
                }
            }
            DragState::Idle | DragState::Committing(_) => DropOutcome::Ignored,
        }
    }

    /// Ends the momentary committing phase once the move has been handed off.
    pub fn finish_commit(&mut self) -> Option<DropIntent> {
        let DragState::Committing(intent) = &self.state else {
            return None;
        };
        let intent = intent.clone();
        self.transition(DragState::Idle);
        Some(intent)
    }

    /// Cancels an armed press or an active drag. Too late once committing.
    pub fn cancel(&mut self) -> bool {
        match self.state {
            DragState::Armed { .. } | DragState::Dragging(_) => {
                self.transition(DragState::Idle);
                true
            }
            DragState::Idle | DragState::Committing(_) => false,
        }
    }

    /// Re-runs the hit-test at the last pointer position after a layout change.
    pub fn refresh_candidate(&mut self, zones: &DropZoneIndex) -> DragMove {
        match self.context().map(|context| context.pointer) {
            Some(pointer) => self.pointer_move(pointer, zones),
            None => DragMove::Ignored,
        }
    }

    fn abort(&mut self, err: &LayoutError) {
        warn!(error = %err, "hit-test failed; aborting drag");
        self.transition(DragState::Idle);
    }

    fn transition(&mut self, next: DragState) {
        let from = self.state.phase();
        let to = next.phase();
        debug_assert!(
            from.can_transition_to(to),
            "illegal drag transition {} -> {}",
            from.as_str(),
            to.as_str()
        );
        if !from.can_transition_to(to) {
            error!(
                from = from.as_str(),
                to = to.as_str(),
                "illegal drag transition rejected"
            );
            return;
        }
        self.state = next;
        self.notify();
    }

    fn notify(&mut self) {
        if self.listeners.is_empty() {
            return;
        }
        let mut listeners = std::mem::take(&mut self.listeners);
        {
            let snapshot = self.snapshot();
            for (_, listener) in &mut listeners {
                listener(&snapshot);
            }
        }
        self.listeners = listeners;
    }
}
