#![forbid(unsafe_code)]

//! Recording host with fault injection.
//!
//! [`RecordingHost`] accepts every call the runtime makes, records it, and
//! queues the native callback the real platform would eventually deliver.
//! Nothing is delivered on its own: tests pop callbacks explicitly (or let
//! [`Scenario`](crate::Scenario) do it), which makes every interleaving
//! reproducible.
//!
//! # Faults
//!
//! | Knob | Effect |
//! |------|--------|
//! | [`set_window_available(false)`](RecordingHost::set_window_available) | every present fails with `NoActiveWindow` |
//! | [`fail_next_present`](RecordingHost::fail_next_present) | the next present fails synchronously |
//! | [`reject_next_dismiss`](RecordingHost::reject_next_dismiss) | the next dismiss is refused |
//! | [`drop_next_callbacks`](RecordingHost::drop_next_callbacks) | accepted calls whose callback never arrives |

use std::collections::{BTreeMap, VecDeque};

use portage_core::{Frame, NodeId, SurfaceId, TargetId};
use portage_runtime::{
    DismissOrigin, HostFailure, Owner, Placement, PresentationHost, SurfaceConfig,
    TargetRegistration, TransitionStyle,
};
use tracing::trace;

/// One call made by the runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    Present {
        surface: SurfaceId,
        style: TransitionStyle,
    },
    Dismiss {
        surface: SurfaceId,
        origin: DismissOrigin,
    },
    CancelDismiss(SurfaceId),
    Teardown(SurfaceId),
    Place(Placement),
    Detach(NodeId),
    ApplyFrame(NodeId, Frame),
    TargetRegistered(TargetId),
    TargetUnregistered(TargetId),
}

/// A native callback the host owes the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingCallback {
    PresentCompleted(SurfaceId),
    DismissCompleted(SurfaceId),
}

impl PendingCallback {
    pub fn surface(self) -> SurfaceId {
        match self {
            Self::PresentCompleted(surface) | Self::DismissCompleted(surface) => surface,
        }
    }
}

/// Host that records calls and defers native callbacks.
#[derive(Debug)]
pub struct RecordingHost {
    calls: Vec<HostCall>,
    pending: VecDeque<PendingCallback>,
    window_available: bool,
    next_present_failure: Option<HostFailure>,
    next_dismiss_rejection: Option<String>,
    drop_callbacks: usize,
    dropped: u64,
    owners: BTreeMap<NodeId, Owner>,
    frames: BTreeMap<NodeId, Frame>,
}

impl Default for RecordingHost {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            pending: VecDeque::new(),
            window_available: true,
            next_present_failure: None,
            next_dismiss_rejection: None,
            drop_callbacks: 0,
            dropped: 0,
            owners: BTreeMap::new(),
            frames: BTreeMap::new(),
        }
    }
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// With no window, every present fails with `NoActiveWindow`.
    pub fn set_window_available(&mut self, available: bool) {
        self.window_available = available;
    }

    pub fn fail_next_present(&mut self, failure: HostFailure) {
        self.next_present_failure = Some(failure);
    }

    pub fn reject_next_dismiss(&mut self, reason: impl Into<String>) {
        self.next_dismiss_rejection = Some(reason.into());
    }

    /// Accept the next `count` present/dismiss calls but never call back.
    pub fn drop_next_callbacks(&mut self, count: usize) {
        self.drop_callbacks = count;
    }

    pub fn calls(&self) -> &[HostCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<HostCall> {
        std::mem::take(&mut self.calls)
    }

    /// Surfaces passed to `present`, in call order.
    pub fn presented(&self) -> Vec<SurfaceId> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                HostCall::Present { surface, .. } => Some(*surface),
                _ => None,
            })
            .collect()
    }

    /// Surfaces passed to `dismiss`, in call order.
    pub fn dismissed(&self) -> Vec<(SurfaceId, DismissOrigin)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                HostCall::Dismiss { surface, origin } => Some((*surface, *origin)),
                _ => None,
            })
            .collect()
    }

    pub fn torn_down(&self) -> Vec<SurfaceId> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                HostCall::Teardown(surface) => Some(*surface),
                _ => None,
            })
            .collect()
    }

    pub fn pending_callbacks(&self) -> &VecDeque<PendingCallback> {
        &self.pending
    }

    pub fn pop_callback(&mut self) -> Option<PendingCallback> {
        self.pending.pop_front()
    }

    /// Callbacks swallowed by [`drop_next_callbacks`](Self::drop_next_callbacks).
    pub fn dropped_callbacks(&self) -> u64 {
        self.dropped
    }

    /// Owner of `node` as mirrored from placements.
    pub fn mirrored_owner(&self, node: NodeId) -> Option<&Owner> {
        self.owners.get(&node)
    }

    /// Last frame applied to `node`.
    pub fn frame(&self, node: NodeId) -> Option<Frame> {
        self.frames.get(&node).copied()
    }

    fn owe(&mut self, callback: PendingCallback) {
        if self.drop_callbacks > 0 {
            self.drop_callbacks -= 1;
            self.dropped += 1;
            trace!(?callback, "dropping native callback");
        } else {
            self.pending.push_back(callback);
        }
    }
}

impl PresentationHost for RecordingHost {
    fn present(&mut self, surface: SurfaceId, config: &SurfaceConfig) -> Result<(), HostFailure> {
        if !self.window_available {
            return Err(HostFailure::NoActiveWindow);
        }
        if let Some(failure) = self.next_present_failure.take() {
            return Err(failure);
        }
        self.calls.push(HostCall::Present {
            surface,
            style: config.transition_style,
        });
        self.owe(PendingCallback::PresentCompleted(surface));
        Ok(())
    }

    fn dismiss(&mut self, surface: SurfaceId, origin: DismissOrigin) -> Result<(), HostFailure> {
        if let Some(reason) = self.next_dismiss_rejection.take() {
            return Err(HostFailure::Rejected(reason));
        }
        self.calls.push(HostCall::Dismiss { surface, origin });
        self.owe(PendingCallback::DismissCompleted(surface));
        Ok(())
    }

    fn cancel_dismiss(&mut self, surface: SurfaceId) {
        self.pending
            .retain(|callback| *callback != PendingCallback::DismissCompleted(surface));
        self.calls.push(HostCall::CancelDismiss(surface));
    }

    fn teardown(&mut self, surface: SurfaceId) {
        self.pending.retain(|callback| callback.surface() != surface);
        self.calls.push(HostCall::Teardown(surface));
    }

    fn place(&mut self, placement: &Placement) {
        self.owners.insert(placement.node, placement.to.clone());
        self.calls.push(HostCall::Place(placement.clone()));
    }

    fn detach(&mut self, node: NodeId) {
        self.owners.remove(&node);
        self.frames.remove(&node);
        self.calls.push(HostCall::Detach(node));
    }

    fn apply_frame(&mut self, node: NodeId, frame: Frame) {
        self.frames.insert(node, frame);
        self.calls.push(HostCall::ApplyFrame(node, frame));
    }

    fn target_registered(&mut self, registration: &TargetRegistration) {
        self.calls.push(HostCall::TargetRegistered(registration.target.clone()));
    }

    fn target_unregistered(&mut self, registration: &TargetRegistration) {
        self.calls.push(HostCall::TargetUnregistered(registration.target.clone()));
    }
}
