#![forbid(unsafe_code)]

//! Overlay surface lifecycle machine.
//!
//! ```text
//! Idle -> Presenting -> Presented -> DismissingAnimating -> Dismissed
//!              |             \-> DismissRequested(Gesture) -/     |
//!              \-> Idle (native present failed)      |            |
//!                            Presented <- cancelled -/------------/
//! ```
//!
//! The machine is pure: [`SurfaceController::apply`] updates the state and
//! returns the side effects the caller must perform. It never touches the
//! ledger or the host, so it can be driven by synthetic events in tests.
//!
//! # Invariants
//!
//! 1. Content returns to its anchor only on entering `Dismissed`, never on
//!    a dismiss request, because a gesture may still be cancelled.
//! 2. `Dismissed` is terminal; every later event is a no-op.
//! 3. A gesture dismissal stays cancellable until the native dismiss
//!    completes. A programmatic dismissal never is.
//! 4. Events that do not apply in the current state produce a
//!    [`SurfaceEffect::Noop`] with a reason, never a state change.

use portage_core::{Frame, NodeId, SurfaceId};
use serde::{Deserialize, Serialize};

use crate::surface_config::SurfaceConfig;

/// What started a dismissal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DismissOrigin {
    /// Application code called `dismiss`.
    Programmatic,
    /// The user dragged the surface away.
    Gesture,
}

impl DismissOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Programmatic => "programmatic",
            Self::Gesture => "gesture",
        }
    }
}

/// Lifecycle state of one surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "origin", rename_all = "snake_case")]
pub enum SurfaceState {
    Idle,
    Presenting,
    Presented,
    DismissRequested(DismissOrigin),
    DismissingAnimating,
    Dismissed,
}

impl SurfaceState {
    /// A native transition is running.
    #[inline]
    pub const fn is_transitioning(self) -> bool {
        matches!(self, Self::Presenting | Self::DismissingAnimating)
    }

    /// The surface has content moved into it.
    #[inline]
    pub const fn holds_content(self) -> bool {
        matches!(
            self,
            Self::Presenting | Self::Presented | Self::DismissRequested(_) | Self::DismissingAnimating
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Presenting => "presenting",
            Self::Presented => "presented",
            Self::DismissRequested(DismissOrigin::Programmatic) => "dismiss_requested_programmatic",
            Self::DismissRequested(DismissOrigin::Gesture) => "dismiss_requested_gesture",
            Self::DismissingAnimating => "dismissing_animating",
            Self::Dismissed => "dismissed",
        }
    }
}

/// Why a forced teardown happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownReason {
    /// The anchor node unmounted.
    AnchorUnmounted,
    /// No native callback arrived in time.
    WatchdogExpired,
    /// The host refused to dismiss.
    DismissFailed,
}

impl TeardownReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AnchorUnmounted => "anchor_unmounted",
            Self::WatchdogExpired => "watchdog_expired",
            Self::DismissFailed => "dismiss_failed",
        }
    }
}

/// Inputs to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "detail", rename_all = "snake_case")]
pub enum SurfaceEvent {
    PresentDispatched,
    NativePresented,
    NativePresentFailed,
    DismissDispatched(DismissOrigin),
    DragStarted,
    GestureCancelled,
    GestureCompleted,
    NativeDismissed,
    ForceTeardown(TeardownReason),
}

/// Explicit reasons for events that are safely ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceNoopReason {
    /// The event has no meaning in the current state.
    NotApplicable,
    /// Drag started on a surface configured as not dismissible.
    NotDismissible,
    /// The gesture already committed to dismissing.
    GestureAlreadyCommitted,
    /// A dismissal is already under way.
    AlreadyDismissing,
    /// The surface reached `Dismissed`.
    Terminal,
}

/// Side effect the caller must carry out, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", content = "detail", rename_all = "snake_case")]
pub enum SurfaceEffect {
    /// Move the anchor's content into the surface.
    MoveContentIn,
    /// Ask the host to present the surface.
    IssueNativePresent,
    /// Emit `onShow` and `onOpen`.
    EmitShown,
    /// Ask the host to dismiss the surface.
    IssueNativeDismiss(DismissOrigin),
    /// Ask the host to abandon a running gesture dismissal and release
    /// the in-flight operation.
    AbortNativeDismiss,
    /// Queue an internal gesture dismissal.
    RequestDismissSlot,
    /// Re-attach content that drifted out of the surface.
    ReattachContent,
    /// Present failed; return content to the anchor.
    RevertContent,
    /// Return content to the anchor on dismissal.
    RestoreContent,
    /// Emit `onDismiss`.
    EmitDismissed,
    Noop(SurfaceNoopReason),
}

/// One step of the machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceTransition {
    pub transition_id: u64,
    pub surface: SurfaceId,
    pub event: SurfaceEvent,
    pub from: SurfaceState,
    pub to: SurfaceState,
    pub effects: Vec<SurfaceEffect>,
}

impl SurfaceTransition {
    /// The event was ignored.
    pub fn is_noop(&self) -> bool {
        matches!(self.effects.as_slice(), [SurfaceEffect::Noop(_)])
    }

    pub fn has_effect(&self, effect: SurfaceEffect) -> bool {
        self.effects.contains(&effect)
    }
}

/// Live record of one overlay surface.
#[derive(Debug, Clone)]
pub struct SurfaceController {
    surface: SurfaceId,
    state: SurfaceState,
    gesture_committed: bool,
    dismissing: Option<DismissOrigin>,
    progressed: bool,
    config: SurfaceConfig,
    anchor: Option<NodeId>,
    content: Vec<NodeId>,
    bounds: Option<Frame>,
    transition_counter: u64,
}

impl SurfaceController {
    pub fn new(surface: SurfaceId, config: SurfaceConfig) -> Self {
        Self {
            surface,
            state: SurfaceState::Idle,
            gesture_committed: false,
            dismissing: None,
            progressed: false,
            config,
            anchor: None,
            content: Vec::new(),
            bounds: None,
            transition_counter: 0,
        }
    }

    #[inline]
    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    #[inline]
    pub fn state(&self) -> SurfaceState {
        self.state
    }

    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: SurfaceConfig) {
        self.config = config;
    }

    pub(crate) fn config_mut(&mut self) -> &mut SurfaceConfig {
        &mut self.config
    }

    /// Source anchor node, when the surface is declared in the tree.
    pub fn anchor(&self) -> Option<NodeId> {
        self.anchor
    }

    pub fn set_anchor(&mut self, anchor: Option<NodeId>) {
        self.anchor = anchor;
    }

    /// Declared content, in order.
    pub fn content(&self) -> &[NodeId] {
        &self.content
    }

    pub fn set_content(&mut self, content: Vec<NodeId>) {
        self.content = content;
    }

    pub fn bounds(&self) -> Option<Frame> {
        self.bounds
    }

    pub fn set_bounds(&mut self, bounds: Frame) {
        self.bounds = Some(bounds);
    }

    /// A gesture has committed to dismissing the surface.
    pub fn gesture_committed(&self) -> bool {
        self.gesture_committed
    }

    /// Origin of the native dismissal currently animating.
    pub fn dismissing_origin(&self) -> Option<DismissOrigin> {
        self.dismissing
    }

    /// A dismissal is running or committed, so another one would be redundant.
    pub fn is_dismissing(&self) -> bool {
        match self.state {
            SurfaceState::DismissingAnimating => true,
            SurfaceState::DismissRequested(DismissOrigin::Gesture) => self.gesture_committed,
            SurfaceState::DismissRequested(DismissOrigin::Programmatic) => true,
            _ => false,
        }
    }

    /// Apply one event and return the resulting transition.
    pub fn apply(&mut self, event: SurfaceEvent) -> SurfaceTransition {
        use SurfaceEffect as E;
        use SurfaceState as S;

        let from = self.state;
        let (to, effects) = match (from, event) {
            (S::Dismissed, _) => (from, vec![E::Noop(SurfaceNoopReason::Terminal)]),

            (_, SurfaceEvent::ForceTeardown(_)) => {
                let mut effects = Vec::with_capacity(2);
                if from.holds_content() {
                    effects.push(E::RestoreContent);
                }
                if self.progressed {
                    effects.push(E::EmitDismissed);
                }
                (S::Dismissed, effects)
            }

            (S::Idle, SurfaceEvent::PresentDispatched) => {
                self.progressed = true;
                self.gesture_committed = false;
                (S::Presenting, vec![E::MoveContentIn, E::IssueNativePresent])
            }
            (S::Presenting, SurfaceEvent::NativePresented) => (S::Presented, vec![E::EmitShown]),
            (S::Presenting, SurfaceEvent::NativePresentFailed) => {
                self.progressed = false;
                (S::Idle, vec![E::RevertContent])
            }

            (S::Presented, SurfaceEvent::DismissDispatched(origin)) => {
                (S::DismissingAnimating, vec![E::IssueNativeDismiss(origin)])
            }
            (S::Presented, SurfaceEvent::DragStarted) => {
                if self.config.is_dismissible {
                    self.gesture_committed = false;
                    (S::DismissRequested(DismissOrigin::Gesture), Vec::new())
                } else {
                    (from, vec![E::Noop(SurfaceNoopReason::NotDismissible)])
                }
            }

            (S::DismissRequested(DismissOrigin::Gesture), SurfaceEvent::GestureCancelled) => {
                self.gesture_committed = false;
                (S::Presented, vec![E::ReattachContent])
            }
            (S::DismissRequested(DismissOrigin::Gesture), SurfaceEvent::GestureCompleted) => {
                if self.gesture_committed {
                    (from, vec![E::Noop(SurfaceNoopReason::GestureAlreadyCommitted)])
                } else {
                    self.gesture_committed = true;
                    (from, vec![E::RequestDismissSlot])
                }
            }
            (S::DismissRequested(DismissOrigin::Gesture), SurfaceEvent::DismissDispatched(origin)) => {
                match (origin, self.gesture_committed) {
                    (DismissOrigin::Gesture, true) | (DismissOrigin::Programmatic, false) => {
                        (S::DismissingAnimating, vec![E::IssueNativeDismiss(origin)])
                    }
                    (DismissOrigin::Programmatic, true) => {
                        (from, vec![E::Noop(SurfaceNoopReason::AlreadyDismissing)])
                    }
                    (DismissOrigin::Gesture, false) => (from, vec![E::Noop(SurfaceNoopReason::NotApplicable)]),
                }
            }
            (S::DismissRequested(DismissOrigin::Programmatic), SurfaceEvent::DismissDispatched(_)) => {
                (S::DismissingAnimating, vec![E::IssueNativeDismiss(DismissOrigin::Programmatic)])
            }

            (S::DismissingAnimating, SurfaceEvent::DismissDispatched(_)) => {
                (from, vec![E::Noop(SurfaceNoopReason::AlreadyDismissing)])
            }
            (S::DismissingAnimating, SurfaceEvent::GestureCancelled) => {
                if self.dismissing == Some(DismissOrigin::Gesture) {
                    self.gesture_committed = false;
                    (S::Presented, vec![E::AbortNativeDismiss, E::ReattachContent])
                } else {
                    (from, vec![E::Noop(SurfaceNoopReason::AlreadyDismissing)])
                }
            }
            (S::DismissingAnimating, SurfaceEvent::NativeDismissed) => {
                (S::Dismissed, vec![E::RestoreContent, E::EmitDismissed])
            }

            _ => (from, vec![E::Noop(SurfaceNoopReason::NotApplicable)]),
        };

        self.dismissing = match effects.as_slice() {
            [E::IssueNativeDismiss(origin)] => Some(*origin),
            _ if to == S::DismissingAnimating => self.dismissing,
            _ => None,
        };
        self.state = to;
        self.transition_counter = self.transition_counter.saturating_add(1);
        SurfaceTransition {
            transition_id: self.transition_counter,
            surface: self.surface,
            event,
            from,
            to,
            effects,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> SurfaceController {
        SurfaceController::new(SurfaceId::new(1), SurfaceConfig::default())
    }

    fn presented() -> SurfaceController {
        let mut c = controller();
        c.apply(SurfaceEvent::PresentDispatched);
        c.apply(SurfaceEvent::NativePresented);
        assert_eq!(c.state(), SurfaceState::Presented);
        c
    }

    #[test]
    fn present_path_moves_content_then_shows() {
        let mut c = controller();
        let t = c.apply(SurfaceEvent::PresentDispatched);
        assert_eq!((t.from, t.to), (SurfaceState::Idle, SurfaceState::Presenting));
        assert_eq!(t.effects, vec![SurfaceEffect::MoveContentIn, SurfaceEffect::IssueNativePresent]);
        let t = c.apply(SurfaceEvent::NativePresented);
        assert_eq!(t.to, SurfaceState::Presented);
        assert_eq!(t.effects, vec![SurfaceEffect::EmitShown]);
        assert_eq!(t.transition_id, 2);
    }

    #[test]
    fn failed_present_reverts_to_idle() {
        let mut c = controller();
        c.apply(SurfaceEvent::PresentDispatched);
        let t = c.apply(SurfaceEvent::NativePresentFailed);
        assert_eq!(t.to, SurfaceState::Idle);
        assert_eq!(t.effects, vec![SurfaceEffect::RevertContent]);
        let t = c.apply(SurfaceEvent::ForceTeardown(TeardownReason::AnchorUnmounted));
        assert_eq!(t.to, SurfaceState::Dismissed);
        assert!(t.effects.is_empty(), "idle teardown has nothing to restore or announce");
    }

    #[test]
    fn drag_does_not_move_content() {
        let mut c = presented();
        let t = c.apply(SurfaceEvent::DragStarted);
        assert_eq!(t.to, SurfaceState::DismissRequested(DismissOrigin::Gesture));
        assert!(t.effects.is_empty());
    }

    #[test]
    fn cancelled_gesture_returns_to_presented() {
        let mut c = presented();
        c.apply(SurfaceEvent::DragStarted);
        let t = c.apply(SurfaceEvent::GestureCancelled);
        assert_eq!(t.to, SurfaceState::Presented);
        assert_eq!(t.effects, vec![SurfaceEffect::ReattachContent]);
    }

    #[test]
    fn completed_gesture_requests_slot_then_animates() {
        let mut c = presented();
        c.apply(SurfaceEvent::DragStarted);
        let t = c.apply(SurfaceEvent::GestureCompleted);
        assert_eq!(t.effects, vec![SurfaceEffect::RequestDismissSlot]);
        assert!(c.gesture_committed());
        assert!(c.is_dismissing());

        let t = c.apply(SurfaceEvent::GestureCompleted);
        assert_eq!(t.effects, vec![SurfaceEffect::Noop(SurfaceNoopReason::GestureAlreadyCommitted)]);

        let t = c.apply(SurfaceEvent::DismissDispatched(DismissOrigin::Gesture));
        assert_eq!(t.to, SurfaceState::DismissingAnimating);
        let t = c.apply(SurfaceEvent::NativeDismissed);
        assert_eq!(t.to, SurfaceState::Dismissed);
        assert_eq!(t.effects, vec![SurfaceEffect::RestoreContent, SurfaceEffect::EmitDismissed]);
    }

    #[test]
    fn committed_gesture_can_still_be_cancelled() {
        let mut c = presented();
        c.apply(SurfaceEvent::DragStarted);
        c.apply(SurfaceEvent::GestureCompleted);
        let t = c.apply(SurfaceEvent::GestureCancelled);
        assert_eq!(t.to, SurfaceState::Presented);
        assert_eq!(t.effects, vec![SurfaceEffect::ReattachContent]);
        assert!(!c.gesture_committed());
    }

    #[test]
    fn animating_gesture_dismissal_is_cancellable() {
        let mut c = presented();
        c.apply(SurfaceEvent::DragStarted);
        c.apply(SurfaceEvent::GestureCompleted);
        c.apply(SurfaceEvent::DismissDispatched(DismissOrigin::Gesture));
        assert_eq!(c.dismissing_origin(), Some(DismissOrigin::Gesture));

        let t = c.apply(SurfaceEvent::GestureCancelled);
        assert_eq!((t.from, t.to), (SurfaceState::DismissingAnimating, SurfaceState::Presented));
        assert_eq!(t.effects, vec![SurfaceEffect::AbortNativeDismiss, SurfaceEffect::ReattachContent]);
        assert_eq!(c.dismissing_origin(), None);
        assert!(c.apply(SurfaceEvent::NativeDismissed).is_noop());
    }

    #[test]
    fn programmatic_dismissal_ignores_gesture_cancel() {
        let mut c = presented();
        c.apply(SurfaceEvent::DismissDispatched(DismissOrigin::Programmatic));
        let t = c.apply(SurfaceEvent::GestureCancelled);
        assert_eq!(t.effects, vec![SurfaceEffect::Noop(SurfaceNoopReason::AlreadyDismissing)]);
        assert_eq!(c.state(), SurfaceState::DismissingAnimating);
    }

    #[test]
    fn programmatic_dismiss_overrides_uncommitted_gesture() {
        let mut c = presented();
        c.apply(SurfaceEvent::DragStarted);
        let t = c.apply(SurfaceEvent::DismissDispatched(DismissOrigin::Programmatic));
        assert_eq!(t.to, SurfaceState::DismissingAnimating);
        assert_eq!(
            t.effects,
            vec![SurfaceEffect::IssueNativeDismiss(DismissOrigin::Programmatic)]
        );
    }

    #[test]
    fn non_dismissible_surface_ignores_drag() {
        let mut c = SurfaceController::new(SurfaceId::new(2), SurfaceConfig::default().dismissible(false));
        c.apply(SurfaceEvent::PresentDispatched);
        c.apply(SurfaceEvent::NativePresented);
        let t = c.apply(SurfaceEvent::DragStarted);
        assert_eq!(t.effects, vec![SurfaceEffect::Noop(SurfaceNoopReason::NotDismissible)]);
        assert_eq!(c.state(), SurfaceState::Presented);
    }

    #[test]
    fn force_teardown_from_any_live_state_restores_content() {
        for steps in 1..=4 {
            let mut c = controller();
            let events = [
                SurfaceEvent::PresentDispatched,
                SurfaceEvent::NativePresented,
                SurfaceEvent::DragStarted,
                SurfaceEvent::DismissDispatched(DismissOrigin::Programmatic),
            ];
            for event in &events[..steps] {
                c.apply(*event);
            }
            let t = c.apply(SurfaceEvent::ForceTeardown(TeardownReason::WatchdogExpired));
            assert_eq!(t.to, SurfaceState::Dismissed);
            assert_eq!(t.effects, vec![SurfaceEffect::RestoreContent, SurfaceEffect::EmitDismissed]);
        }
    }

    #[test]
    fn dismissed_is_terminal() {
        let mut c = presented();
        c.apply(SurfaceEvent::ForceTeardown(TeardownReason::AnchorUnmounted));
        for event in [
            SurfaceEvent::PresentDispatched,
            SurfaceEvent::NativeDismissed,
            SurfaceEvent::ForceTeardown(TeardownReason::AnchorUnmounted),
        ] {
            let t = c.apply(event);
            assert_eq!(t.effects, vec![SurfaceEffect::Noop(SurfaceNoopReason::Terminal)]);
            assert_eq!(t.to, SurfaceState::Dismissed);
        }
    }

    #[test]
    fn stray_events_are_noops() {
        let mut c = controller();
        assert!(c.apply(SurfaceEvent::NativePresented).is_noop());
        assert!(c.apply(SurfaceEvent::GestureCompleted).is_noop());
        assert!(c.apply(SurfaceEvent::DismissDispatched(DismissOrigin::Programmatic)).is_noop());
        assert_eq!(c.state(), SurfaceState::Idle);
    }

    #[test]
    fn state_serializes_with_tag() {
        let json = serde_json::to_string(&SurfaceState::DismissRequested(DismissOrigin::Gesture)).unwrap();
        assert_eq!(json, r#"{"state":"dismiss_requested","origin":"gesture"}"#);
    }
}
