#![forbid(unsafe_code)]

//! Global presentation queue.
//!
//! Only one native overlay transition may run at a time, across every
//! surface. The queue enforces that with a single FIFO and a single
//! in-flight slot:
//!
//! - [`enqueue`](PresentationQueue::enqueue) never blocks;
//! - [`admit`](PresentationQueue::admit) releases the next operation only when
//!   the slot is free and the minimum gap since the last native transition has
//!   elapsed;
//! - [`finish`](PresentationQueue::finish) frees the slot and runs the
//!   operation's completion exactly once.
//!
//! The queue knows nothing about surface state. Whether an admitted operation
//! is skipped, started, or failed is decided by the caller.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use portage_core::logging::TARGET_QUEUE;
use portage_core::{OperationId, SurfaceId};
use serde::{Deserialize, Serialize};
use tracing::debug;
use web_time::Instant;

use crate::error::{
    DuplicatePresentationError, Error, NativePresentationFailure, NoActiveSurfaceError,
};
use crate::surface::DismissOrigin;
use crate::surface_config::SurfaceConfig;

/// Callback run once when an operation completes.
pub type Completion = Box<dyn FnOnce(OperationId, &OperationOutcome)>;

/// What an operation asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "origin", rename_all = "snake_case")]
pub enum OperationKind {
    Present,
    Dismiss(DismissOrigin),
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Dismiss(DismissOrigin::Programmatic) => "dismiss",
            Self::Dismiss(DismissOrigin::Gesture) => "gesture_dismiss",
        }
    }
}

/// Why an admitted operation completed without doing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Present for a surface that is already active.
    DuplicatePresentation,
    /// Dismiss for a surface with nothing presented.
    NoActiveSurface,
    /// Dismiss for a surface that is already going away.
    AlreadyDismissing,
    /// Gesture dismissal whose drag was cancelled before the native
    /// dismiss completed.
    GestureCancelled,
}

/// Final result of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Completed,
    Skipped(SkipReason),
    Failed(NativePresentationFailure),
    /// The surface's anchor unmounted before the operation started.
    Cancelled,
}

impl OperationOutcome {
    /// Completed, or skipped as a benign duplicate.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Skipped(_) => "skipped",
            Self::Failed(_) => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Strict view of the outcome: skips and failures become errors.
    pub fn into_result(self, surface: SurfaceId) -> Result<(), Error> {
        match self {
            Self::Completed | Self::Cancelled | Self::Skipped(SkipReason::GestureCancelled) => Ok(()),
            Self::Skipped(SkipReason::DuplicatePresentation) => {
                Err(DuplicatePresentationError { surface }.into())
            }
            Self::Skipped(SkipReason::NoActiveSurface | SkipReason::AlreadyDismissing) => {
                Err(NoActiveSurfaceError { surface }.into())
            }
            Self::Failed(failure) => Err(failure.into()),
        }
    }
}

/// A queued present or dismiss request.
///
/// Fields are private: once built and enqueued, an operation cannot change.
pub struct PresentationOperation {
    id: OperationId,
    kind: OperationKind,
    surface: SurfaceId,
    config: Option<SurfaceConfig>,
    completion: Option<Completion>,
}

impl PresentationOperation {
    /// Request to present `surface` with `config`.
    pub fn present(surface: SurfaceId, config: SurfaceConfig) -> Self {
        Self {
            id: OperationId::new(0),
            kind: OperationKind::Present,
            surface,
            config: Some(config),
            completion: None,
        }
    }

    /// Request to dismiss `surface`.
    pub fn dismiss(surface: SurfaceId) -> Self {
        Self::dismiss_from(surface, DismissOrigin::Programmatic)
    }

    pub(crate) fn dismiss_from(surface: SurfaceId, origin: DismissOrigin) -> Self {
        Self {
            id: OperationId::new(0),
            kind: OperationKind::Dismiss(origin),
            surface,
            config: None,
            completion: None,
        }
    }

    /// Attach a completion callback.
    #[must_use]
    pub fn with_completion(mut self, completion: impl FnOnce(OperationId, &OperationOutcome) + 'static) -> Self {
        self.completion = Some(Box::new(completion));
        self
    }

    /// Id assigned at enqueue time.
    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    /// Presentation options; present operations only.
    pub fn config(&self) -> Option<&SurfaceConfig> {
        self.config.as_ref()
    }
}

impl fmt::Debug for PresentationOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresentationOperation")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("surface", &self.surface)
            .field("has_completion", &self.completion.is_some())
            .finish()
    }
}

/// The operation currently holding the slot.
pub struct InFlight {
    id: OperationId,
    kind: OperationKind,
    surface: SurfaceId,
    started: Instant,
    deadline: Option<Instant>,
    native_issued: bool,
    completion: Option<Completion>,
}

impl InFlight {
    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    /// Watchdog deadline, if the watchdog is enabled.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// A native call was accepted by the host for this operation.
    pub fn native_issued(&self) -> bool {
        self.native_issued
    }
}

impl fmt::Debug for InFlight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlight")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("surface", &self.surface)
            .field("native_issued", &self.native_issued)
            .finish()
    }
}

/// A finished operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedOperation {
    pub id: OperationId,
    pub surface: SurfaceId,
    pub kind: OperationKind,
    pub outcome: OperationOutcome,
}

/// Queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub completed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// Operations force-finished because no native callback arrived.
    pub watchdog_expirations: u64,
}

impl QueueStats {
    /// Operations that reached any final outcome.
    pub fn finished(&self) -> u64 {
        self.completed + self.skipped + self.failed + self.cancelled
    }
}

/// Single-flight FIFO of presentation operations.
pub struct PresentationQueue {
    pending: VecDeque<PresentationOperation>,
    in_flight: Option<InFlight>,
    gap: Duration,
    watchdog: Option<Duration>,
    ready_at: Option<Instant>,
    next_id: u64,
    stats: QueueStats,
}

impl PresentationQueue {
    pub fn new(gap: Duration, watchdog: Option<Duration>) -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: None,
            gap,
            watchdog,
            ready_at: None,
            next_id: 0,
            stats: QueueStats::default(),
        }
    }

    /// Append an operation and return its id.
    pub fn enqueue(&mut self, mut operation: PresentationOperation) -> OperationId {
        self.next_id += 1;
        operation.id = OperationId::new(self.next_id);
        self.stats.enqueued += 1;
        debug!(
            target: TARGET_QUEUE,
            operation_id = self.next_id,
            surface_id = operation.surface.raw(),
            kind = operation.kind.as_str(),
            pending = self.pending.len() + 1,
            "enqueue"
        );
        let id = operation.id;
        self.pending.push_back(operation);
        id
    }

    /// Take the next operation if the slot is free and the gap has elapsed.
    pub fn admit(&mut self, now: Instant) -> Option<PresentationOperation> {
        if self.in_flight.is_some() {
            return None;
        }
        if let Some(ready_at) = self.ready_at
            && now < ready_at
        {
            return None;
        }
        let operation = self.pending.pop_front()?;
        self.ready_at = None;
        Some(operation)
    }

    /// Give the slot to an admitted operation.
    pub fn begin(&mut self, operation: PresentationOperation, now: Instant) -> OperationId {
        let id = operation.id;
        self.in_flight = Some(InFlight {
            id,
            kind: operation.kind,
            surface: operation.surface,
            started: now,
            deadline: self.watchdog.map(|timeout| now + timeout),
            native_issued: false,
            completion: operation.completion,
        });
        id
    }

    /// Record that the host accepted a native call for the in-flight operation.
    pub fn mark_native_issued(&mut self) {
        if let Some(in_flight) = self.in_flight.as_mut() {
            in_flight.native_issued = true;
        }
    }

    /// Complete the in-flight operation and free the slot.
    ///
    /// The minimum gap is armed only if a native call was issued.
    pub fn finish(&mut self, outcome: OperationOutcome, now: Instant) -> Option<CompletedOperation> {
        let in_flight = self.in_flight.take()?;
        if in_flight.native_issued && !self.gap.is_zero() {
            self.ready_at = Some(now + self.gap);
        }
        Some(self.complete(in_flight.id, in_flight.surface, in_flight.kind, in_flight.completion, outcome))
    }

    /// Complete an admitted operation that never took the slot.
    pub fn complete_unstarted(&mut self, operation: PresentationOperation, outcome: OperationOutcome) -> CompletedOperation {
        self.complete(operation.id, operation.surface, operation.kind, operation.completion, outcome)
    }

    /// Cancel every pending operation for `surface`.
    pub fn cancel_surface(&mut self, surface: SurfaceId) -> Vec<CompletedOperation> {
        let (cancelled, kept): (VecDeque<_>, VecDeque<_>) =
            self.pending.drain(..).partition(|op| op.surface == surface);
        self.pending = kept;
        cancelled
            .into_iter()
            .map(|op| self.complete_unstarted(op, OperationOutcome::Cancelled))
            .collect()
    }

    /// The in-flight operation is past its watchdog deadline.
    pub fn expired(&self, now: Instant) -> bool {
        self.in_flight
            .as_ref()
            .and_then(InFlight::deadline)
            .is_some_and(|deadline| now >= deadline)
    }

    pub(crate) fn note_watchdog_expiry(&mut self) {
        self.stats.watchdog_expirations += 1;
    }

    pub fn in_flight(&self) -> Option<&InFlight> {
        self.in_flight.as_ref()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Surfaces of pending operations, in queue order.
    pub fn pending_surfaces(&self) -> impl Iterator<Item = (SurfaceId, OperationKind)> + '_ {
        self.pending.iter().map(|op| (op.surface, op.kind))
    }

    /// Nothing running and nothing waiting.
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.pending.is_empty()
    }

    /// Earliest instant at which [`admit`](Self::admit) or the watchdog could
    /// make progress.
    pub fn next_wakeup(&self) -> Option<Instant> {
        let gap = self.ready_at.filter(|_| !self.pending.is_empty() && self.in_flight.is_none());
        let deadline = self.in_flight.as_ref().and_then(InFlight::deadline);
        match (gap, deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    fn complete(
        &mut self,
        id: OperationId,
        surface: SurfaceId,
        kind: OperationKind,
        completion: Option<Completion>,
        outcome: OperationOutcome,
    ) -> CompletedOperation {
        match &outcome {
            OperationOutcome::Completed => self.stats.completed += 1,
            OperationOutcome::Skipped(_) => self.stats.skipped += 1,
            OperationOutcome::Failed(_) => self.stats.failed += 1,
            OperationOutcome::Cancelled => self.stats.cancelled += 1,
        }
        debug!(
            target: TARGET_QUEUE,
            operation_id = id.raw(),
            surface_id = surface.raw(),
            kind = kind.as_str(),
            outcome = outcome.label(),
            "operation finished"
        );
        if let Some(completion) = completion {
            completion(id, &outcome);
        }
        CompletedOperation {
            id,
            surface,
            kind,
            outcome,
        }
    }
}

impl fmt::Debug for PresentationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresentationQueue")
            .field("pending", &self.pending.len())
            .field("in_flight", &self.in_flight)
            .field("ready_at", &self.ready_at)
            .field("stats", &self.stats)
            .finish()
    }
}
