#![forbid(unsafe_code)]

//! Host environment seam.
//!
//! [`PresentationHost`] is everything the runtime asks of the platform:
//! starting native transitions, mirroring ledger moves into the real view
//! tree, and applying computed frames. Platform quirks belong in the
//! implementation of this trait, never in the runtime.
//!
//! `present` and `dismiss` only *start* a transition. Completion is reported
//! back through the context's native callbacks
//! (`native_present_completed`, `native_dismiss_completed`).

use std::fmt;

use portage_core::{Frame, NodeId, SurfaceId};

use crate::error::FailureReason;
use crate::ledger::Placement;
use crate::registry::TargetRegistration;
use crate::surface::DismissOrigin;
use crate::surface_config::SurfaceConfig;

/// Synchronous refusal from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostFailure {
    /// Nothing to present into, e.g. no key window yet.
    NoActiveWindow,
    Rejected(String),
}

impl fmt::Display for HostFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoActiveWindow => f.write_str("no active window"),
            Self::Rejected(detail) => write!(f, "rejected: {detail}"),
        }
    }
}

impl std::error::Error for HostFailure {}

impl From<HostFailure> for FailureReason {
    fn from(value: HostFailure) -> Self {
        match value {
            HostFailure::NoActiveWindow => Self::NoActiveWindow,
            HostFailure::Rejected(detail) => Self::HostRejected(detail),
        }
    }
}

/// Platform side of a presentation context.
pub trait PresentationHost {
    /// Start presenting `surface`.
    fn present(&mut self, surface: SurfaceId, config: &SurfaceConfig) -> Result<(), HostFailure>;

    /// Start dismissing `surface`.
    fn dismiss(&mut self, surface: SurfaceId, origin: DismissOrigin) -> Result<(), HostFailure>;

    /// Abandon a gesture dismissal of `surface` that is still animating.
    /// No dismiss callback is expected afterwards.
    fn cancel_dismiss(&mut self, _surface: SurfaceId) {}

    /// Remove `surface` immediately, without animation.
    fn teardown(&mut self, _surface: SurfaceId) {}

    /// Mirror a ledger move.
    fn place(&mut self, _placement: &Placement) {}

    /// A node left the ledger for good.
    fn detach(&mut self, _node: NodeId) {}

    /// Position a node inside its surface.
    fn apply_frame(&mut self, _node: NodeId, _frame: Frame) {}

    fn target_registered(&mut self, _registration: &TargetRegistration) {}

    fn target_unregistered(&mut self, _registration: &TargetRegistration) {}
}

impl<H: PresentationHost + ?Sized> PresentationHost for Box<H> {
    fn present(&mut self, surface: SurfaceId, config: &SurfaceConfig) -> Result<(), HostFailure> {
        (**self).present(surface, config)
    }

    fn dismiss(&mut self, surface: SurfaceId, origin: DismissOrigin) -> Result<(), HostFailure> {
        (**self).dismiss(surface, origin)
    }

    fn cancel_dismiss(&mut self, surface: SurfaceId) {
        (**self).cancel_dismiss(surface);
    }

    fn teardown(&mut self, surface: SurfaceId) {
        (**self).teardown(surface);
    }

    fn place(&mut self, placement: &Placement) {
        (**self).place(placement);
    }

    fn detach(&mut self, node: NodeId) {
        (**self).detach(node);
    }

    fn apply_frame(&mut self, node: NodeId, frame: Frame) {
        (**self).apply_frame(node, frame);
    }

    fn target_registered(&mut self, registration: &TargetRegistration) {
        (**self).target_registered(registration);
    }

    fn target_unregistered(&mut self, registration: &TargetRegistration) {
        (**self).target_unregistered(registration);
    }
}
