#![forbid(unsafe_code)]

//! Presentation context.
//!
//! A [`PresentationContext`] owns one ledger, one portal registry, one
//! presentation queue and the live surface controllers, and connects them to
//! a [`PresentationHost`] and a [`LayoutEngine`]. Independent contexts can
//! coexist; nothing here is process-global.
//!
//! # Inputs
//!
//! | Source | Calls |
//! |--------|-------|
//! | reconciliation | [`on_mount`](PresentationContext::on_mount), [`on_children_changed`](PresentationContext::on_children_changed), [`on_unmount`](PresentationContext::on_unmount) |
//! | application | [`present`](PresentationContext::present), [`dismiss`](PresentationContext::dismiss), [`register_target`](PresentationContext::register_target), [`submit_content`](PresentationContext::submit_content) |
//! | host | `native_*` callbacks, `gesture_*` events, [`surface_bounds_changed`](PresentationContext::surface_bounds_changed) |
//! | layout engine | [`layout_did_settle`](PresentationContext::layout_did_settle) |
//! | timer | [`tick`](PresentationContext::tick) |
//!
//! Every public entry point leaves the queue pumped: if the slot is free and
//! the minimum gap has elapsed, the next operation is already dispatched when
//! the call returns.
//!
//! # Outputs
//!
//! Host calls, layout requests, [`NodeEvent`]s (drained with
//! [`drain_events`](PresentationContext::drain_events)) and finished
//! operations (drained with [`drain_outcomes`](PresentationContext::drain_outcomes)).

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use portage_core::logging::{TARGET_LAYOUT, TARGET_QUEUE, TARGET_SURFACE};
use portage_core::{
    Clock, EventLog, EventName, EventPayload, EventTarget, Frame, HostHandle, NodeEvent, NodeId,
    OperationId, SurfaceId, SystemClock, TargetId,
};
use portage_layout::{LayoutEngine, MeasureCache, Stack};
use serde_json::{Map, Value};
use tracing::{debug, debug_span, error, info, warn};
use web_time::Instant;

use crate::config::RuntimeConfig;
use crate::error::{Error, FailureReason, NativePresentationFailure};
use crate::host::{HostFailure, PresentationHost};
use crate::ledger::{Ledger, Owner, Placement};
use crate::queue::{
    CompletedOperation, InFlight, OperationKind, OperationOutcome, PresentationOperation,
    PresentationQueue, QueueStats, SkipReason,
};
use crate::registry::{RegistrationOrigin, Registry};
use crate::surface::{
    DismissOrigin, SurfaceController, SurfaceEffect, SurfaceEvent, SurfaceState, SurfaceTransition,
    TeardownReason,
};
use crate::surface_config::{HeaderSlot, SurfaceConfig};

/// What a mounted node means to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRole {
    /// Ordinary content. Tracked only when its parent is an anchor.
    Content,
    /// Declares the content of an overlay surface.
    SurfaceAnchor { surface: SurfaceId },
    /// Sends its children to a portal target.
    PortalSource {
        target: TargetId,
        create_on_demand: bool,
    },
    /// Receives portal content.
    PortalTarget {
        target: TargetId,
        create_on_demand: bool,
    },
}

impl NodeRole {
    /// Children of this node park in the ledger under `Owner::Anchor`.
    fn parks_children(&self) -> bool {
        matches!(self, Self::SurfaceAnchor { .. } | Self::PortalSource { .. })
    }
}

/// Declared anchor and children of a surface, kept even while it is idle.
#[derive(Debug, Clone)]
struct SurfaceSlot {
    anchor: NodeId,
    children: Vec<NodeId>,
}

/// Runtime for portals and overlay surfaces.
pub struct PresentationContext<H: PresentationHost, L: LayoutEngine> {
    host: H,
    layout: L,
    clock: Box<dyn Clock>,
    config: RuntimeConfig,
    ledger: Ledger,
    registry: Registry,
    queue: PresentationQueue,
    surfaces: BTreeMap<SurfaceId, SurfaceController>,
    retired: BTreeSet<SurfaceId>,
    slots: BTreeMap<SurfaceId, SurfaceSlot>,
    roles: BTreeMap<NodeId, NodeRole>,
    measured: MeasureCache,
    events: EventLog,
    outcomes: Vec<CompletedOperation>,
    history: VecDeque<SurfaceTransition>,
}

impl<H: PresentationHost, L: LayoutEngine> PresentationContext<H, L> {
    /// Context driven by the system clock.
    pub fn new(host: H, layout: L, config: RuntimeConfig) -> Self {
        Self::with_clock(host, layout, config, Box::new(SystemClock))
    }

    pub fn with_clock(host: H, layout: L, config: RuntimeConfig, clock: Box<dyn Clock>) -> Self {
        let queue = PresentationQueue::new(config.gap(), config.watchdog());
        Self {
            host,
            layout,
            clock,
            queue,
            ledger: Ledger::new(),
            registry: Registry::new(),
            surfaces: BTreeMap::new(),
            retired: BTreeSet::new(),
            slots: BTreeMap::new(),
            roles: BTreeMap::new(),
            measured: MeasureCache::new(),
            events: EventLog::new(),
            outcomes: Vec::new(),
            history: VecDeque::with_capacity(config.transition_history.min(64)),
            config,
        }
    }

    // --- reconciliation ---------------------------------------------------

    /// A node entered the tree.
    ///
    /// Children of surface anchors and portal sources are adopted into the
    /// ledger under their parent. Portal targets register immediately.
    pub fn on_mount(&mut self, node: NodeId, parent: Option<NodeId>, role: NodeRole) -> Result<(), Error> {
        if let Some(parent) = parent
            && self.roles.get(&parent).is_some_and(NodeRole::parks_children)
            && !self.ledger.contains(node)
        {
            let placement = self.ledger.adopt(node, Owner::Anchor(parent))?;
            self.host.place(&placement);
        }
        match &role {
            NodeRole::SurfaceAnchor { surface } => {
                self.slots.insert(
                    *surface,
                    SurfaceSlot {
                        anchor: node,
                        children: Vec::new(),
                    },
                );
                if let Some(controller) = self.surfaces.get_mut(surface) {
                    controller.set_anchor(Some(node));
                }
            }
            NodeRole::PortalTarget {
                target,
                create_on_demand,
            } => {
                self.register(target.clone(), *create_on_demand, RegistrationOrigin::Declared(node))?;
            }
            NodeRole::Content | NodeRole::PortalSource { .. } => {}
        }
        self.roles.insert(node, role);
        Ok(())
    }

    /// The ordered children of `node` changed.
    ///
    /// For a surface anchor this updates the declared content, and moves it
    /// into the surface while the surface holds content. For a portal source
    /// it resubmits the children to the target; an unregistered target yields
    /// [`Error::UnknownTarget`] after the content has been buffered.
    pub fn on_children_changed(&mut self, node: NodeId, ordered: &[NodeId]) -> Result<(), Error> {
        let Some(role) = self.roles.get(&node).cloned() else {
            return Ok(());
        };
        if !role.parks_children() {
            return Ok(());
        }
        for child in ordered {
            if !self.ledger.contains(*child) {
                let placement = self.ledger.adopt(*child, Owner::Anchor(node))?;
                self.host.place(&placement);
            }
        }
        match role {
            NodeRole::SurfaceAnchor { surface } => self.update_surface_children(surface, node, ordered),
            NodeRole::PortalSource {
                target,
                create_on_demand,
            } => self.submit_content(&target, node, ordered, create_on_demand),
            NodeRole::Content | NodeRole::PortalTarget { .. } => Ok(()),
        }
    }

    /// A node left the tree.
    ///
    /// Unmounting a surface anchor tears its surface down without animation
    /// and cancels pending operations for it. Unmounting a portal target
    /// unregisters it; unmounting a portal source releases its content.
    pub fn on_unmount(&mut self, node: NodeId) -> Result<(), Error> {
        match self.roles.remove(&node) {
            Some(NodeRole::SurfaceAnchor { surface }) => {
                if self.slots.get(&surface).is_some_and(|slot| slot.anchor == node) {
                    self.slots.remove(&surface);
                }
                let cancelled = self.queue.cancel_surface(surface);
                self.outcomes.extend(cancelled);
                if self.surfaces.contains_key(&surface) {
                    self.force_teardown(surface, TeardownReason::AnchorUnmounted, FailureReason::TornDown);
                }
            }
            Some(NodeRole::PortalTarget { target, .. }) => {
                let declared_here = self
                    .registry
                    .registration(&target)
                    .is_some_and(|r| r.origin == RegistrationOrigin::Declared(node));
                if declared_here {
                    self.unregister_target(&target)?;
                }
            }
            Some(NodeRole::PortalSource { target, .. }) => {
                self.release_content(&target, Some(node))?;
            }
            Some(NodeRole::Content) | None => {}
        }
        self.forget_tracked(node)?;
        self.pump();
        Ok(())
    }

    // --- application API --------------------------------------------------

    /// Queue an arbitrary operation.
    ///
    /// A present whose config fails [`SurfaceConfig::validate`] is rejected
    /// before it reaches the queue.
    pub fn enqueue(&mut self, operation: PresentationOperation) -> Result<OperationId, Error> {
        if let Some(config) = operation.config()
            && let Err(err) = config.validate()
        {
            warn!(
                target: TARGET_QUEUE,
                surface_id = %operation.surface(),
                error = %err,
                "rejecting present with invalid config"
            );
            return Err(err.into());
        }
        Ok(self.push(operation))
    }

    fn push(&mut self, operation: PresentationOperation) -> OperationId {
        let id = self.queue.enqueue(operation);
        self.pump();
        id
    }

    pub fn present(&mut self, surface: SurfaceId, config: SurfaceConfig) -> Result<OperationId, Error> {
        self.enqueue(PresentationOperation::present(surface, config))
    }

    pub fn present_with_completion(
        &mut self,
        surface: SurfaceId,
        config: SurfaceConfig,
        completion: impl FnOnce(OperationId, &OperationOutcome) + 'static,
    ) -> Result<OperationId, Error> {
        self.enqueue(PresentationOperation::present(surface, config).with_completion(completion))
    }

    /// Present with raw application props, coerced and validated first.
    pub fn present_with_props(&mut self, surface: SurfaceId, props: &Map<String, Value>) -> Result<OperationId, Error> {
        let config = SurfaceConfig::from_props(props)?;
        self.present(surface, config)
    }

    pub fn dismiss(&mut self, surface: SurfaceId) -> OperationId {
        self.push(PresentationOperation::dismiss(surface))
    }

    pub fn dismiss_with_completion(
        &mut self,
        surface: SurfaceId,
        completion: impl FnOnce(OperationId, &OperationOutcome) + 'static,
    ) -> OperationId {
        self.push(PresentationOperation::dismiss(surface).with_completion(completion))
    }

    /// Register a portal target from application code.
    pub fn register_target(&mut self, target: impl Into<TargetId>, create_on_demand: bool) -> Result<HostHandle, Error> {
        self.register(target.into(), create_on_demand, RegistrationOrigin::Application)
    }

    /// Remove a target registration. Returns `false` if it was not registered.
    pub fn unregister_target(&mut self, target: &TargetId) -> Result<bool, Error> {
        let Some((registration, placements)) = self.registry.unregister_target(&mut self.ledger, target)? else {
            return Ok(false);
        };
        self.apply_placements(&placements);
        self.host.target_unregistered(&registration);
        Ok(true)
    }

    /// Show `nodes`, in order, under `target`.
    pub fn submit_content(
        &mut self,
        target: &TargetId,
        source_anchor: NodeId,
        nodes: &[NodeId],
        create_on_demand: bool,
    ) -> Result<(), Error> {
        let outcome = self
            .registry
            .submit_content(&mut self.ledger, target, source_anchor, nodes, create_on_demand)?;
        if let Some(created) = &outcome.created {
            self.host.target_registered(created);
        }
        self.apply_placements(&outcome.placements);
        match outcome.unknown_target {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Return content relocated to `target` to its source anchors.
    pub fn release_content(&mut self, target: &TargetId, source_anchor: Option<NodeId>) -> Result<(), Error> {
        let placements = self.registry.release_content(&mut self.ledger, target, source_anchor)?;
        self.apply_placements(&placements);
        Ok(())
    }

    /// Attach interaction state to a node; it survives every reparent.
    pub fn mark(&mut self, node: NodeId, key: impl Into<String>, value: impl Into<String>) -> Result<(), Error> {
        Ok(self.ledger.mark(node, key, value)?)
    }

    // --- native callbacks -------------------------------------------------

    /// The host finished the present animation.
    pub fn native_present_completed(&mut self, surface: SurfaceId) -> Option<SurfaceTransition> {
        if !self.awaiting(surface, SurfaceState::Presenting) {
            self.stale(surface, "present_completed");
            return None;
        }
        let transition = self.drive(surface, SurfaceEvent::NativePresented);
        self.finish_for(surface, OperationOutcome::Completed);
        self.pump();
        transition
    }

    /// The host gave up on a present it had accepted.
    pub fn native_present_failed(&mut self, surface: SurfaceId, failure: HostFailure) -> Option<SurfaceTransition> {
        if !self.awaiting(surface, SurfaceState::Presenting) {
            self.stale(surface, "present_failed");
            return None;
        }
        let transition = self.present_failed(surface, failure);
        self.pump();
        transition
    }

    /// The host finished the dismiss animation.
    pub fn native_dismiss_completed(&mut self, surface: SurfaceId) -> Option<SurfaceTransition> {
        if !self.awaiting(surface, SurfaceState::DismissingAnimating) {
            self.stale(surface, "dismiss_completed");
            return None;
        }
        let transition = self.drive(surface, SurfaceEvent::NativeDismissed);
        self.finish_for(surface, OperationOutcome::Completed);
        self.pump();
        transition
    }

    // --- gestures and interactions ---------------------------------------

    pub fn gesture_drag_started(&mut self, surface: SurfaceId) -> Option<SurfaceTransition> {
        self.drive(surface, SurfaceEvent::DragStarted)
    }

    /// The drag was abandoned. Also reverses a gesture dismissal that is
    /// still queued or animating.
    pub fn gesture_cancelled(&mut self, surface: SurfaceId) -> Option<SurfaceTransition> {
        let transition = self.drive(surface, SurfaceEvent::GestureCancelled);
        self.pump();
        transition
    }

    /// The drag crossed the dismiss threshold. The dismissal waits for a
    /// queue slot; with an idle queue it starts before this returns.
    pub fn gesture_completed(&mut self, surface: SurfaceId) -> Option<SurfaceTransition> {
        let transition = self.drive(surface, SurfaceEvent::GestureCompleted);
        self.pump();
        transition
    }

    /// Tap outside a presented surface. Dismisses it when allowed.
    pub fn backdrop_tapped(&mut self, surface: SurfaceId) -> Option<OperationId> {
        let controller = self.surfaces.get(&surface)?;
        let config = controller.config();
        if controller.state() != SurfaceState::Presented || !config.allows_background_dismiss || !config.is_dismissible {
            debug!(target: TARGET_SURFACE, surface_id = surface.raw(), "backdrop tap ignored");
            return None;
        }
        Some(self.dismiss(surface))
    }

    /// A header action was pressed. Returns `false` if no such action exists.
    pub fn header_action_pressed(&mut self, surface: SurfaceId, slot: HeaderSlot, index: usize) -> bool {
        let Some(action) = self
            .surfaces
            .get(&surface)
            .filter(|c| c.state().holds_content())
            .and_then(|c| c.config().header_action(slot, index))
            .cloned()
        else {
            return false;
        };
        let payload = EventPayload::new()
            .with("slot", slot.as_str())
            .with("index", index)
            .with("id", action.id)
            .with("title", action.title);
        self.emit(surface, EventName::HeaderAction, payload);
        true
    }

    /// The user settled the surface on another detent.
    pub fn detent_changed(&mut self, surface: SurfaceId, index: usize) -> bool {
        let Some(controller) = self.surfaces.get_mut(&surface) else {
            return false;
        };
        let Some(detent) = controller.config().detent_at(index) else {
            return false;
        };
        controller.config_mut().selected_detent_index = Some(index);
        let mut payload = EventPayload::new().with("index", index).with("detent", detent.label());
        if let Some(bounds) = controller.bounds() {
            payload.insert("height", detent.resolve(bounds.height));
        }
        self.emit(surface, EventName::DetentChange, payload);
        true
    }

    /// Forward a host-originated event (e.g. `onLoadStart`) to the application.
    pub fn host_event(&mut self, node: NodeId, name: EventName, payload: EventPayload) {
        debug!(target: TARGET_SURFACE, node_id = node.raw(), event = name.as_str(), "host event");
        self.events.emit(NodeEvent::new(EventTarget::Node(node), name, payload));
    }

    // --- layout -----------------------------------------------------------

    /// The host resized a surface. Returns `false` for unknown surfaces.
    pub fn surface_bounds_changed(&mut self, surface: SurfaceId, bounds: Frame) -> bool {
        let Some(controller) = self.surfaces.get_mut(&surface) else {
            return false;
        };
        controller.set_bounds(bounds);
        self.restack(surface);
        true
    }

    /// The layout engine finished laying out `node`.
    ///
    /// Records its height and restacks the surface that owns it. Returns
    /// `true` when the measured height changed.
    pub fn layout_did_settle(&mut self, node: NodeId) -> bool {
        let Some(frame) = self.layout.computed_frame(node) else {
            return false;
        };
        if !self.measured.record(node, frame.height) {
            return false;
        }
        if let Some(Owner::Surface(surface)) = self.ledger.current_owner(node).cloned() {
            self.restack(surface);
        }
        true
    }

    // --- timers -----------------------------------------------------------

    /// Run the watchdog and admit queued work whose gap has elapsed.
    pub fn tick(&mut self) {
        let now = self.clock.now();
        if self.queue.expired(now)
            && let Some((id, surface, kind)) = self.queue.in_flight().map(|f| (f.id(), f.surface(), f.kind()))
        {
            error!(
                target: TARGET_QUEUE,
                operation_id = id.raw(),
                surface_id = surface.raw(),
                kind = kind.as_str(),
                "watchdog expired waiting for native callback"
            );
            self.queue.note_watchdog_expiry();
            self.force_teardown(surface, TeardownReason::WatchdogExpired, FailureReason::WatchdogExpired);
        }
        self.pump();
    }

    /// Earliest instant at which [`tick`](Self::tick) has work to do.
    pub fn next_wakeup(&self) -> Option<Instant> {
        self.queue.next_wakeup()
    }

    // --- queries ----------------------------------------------------------

    /// Lifecycle state of `surface`. Retired surfaces report `Dismissed`.
    pub fn surface_state(&self, surface: SurfaceId) -> Option<SurfaceState> {
        self.surfaces
            .get(&surface)
            .map(SurfaceController::state)
            .or_else(|| self.retired.contains(&surface).then_some(SurfaceState::Dismissed))
    }

    pub fn surface(&self, surface: SurfaceId) -> Option<&SurfaceController> {
        self.surfaces.get(&surface)
    }

    /// Surfaces with a live controller.
    pub fn active_surfaces(&self) -> impl Iterator<Item = SurfaceId> + '_ {
        self.surfaces.keys().copied()
    }

    pub fn current_owner(&self, node: NodeId) -> Option<&Owner> {
        self.ledger.current_owner(node)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    pub fn in_flight(&self) -> Option<&InFlight> {
        self.queue.in_flight()
    }

    pub fn pending_operations(&self) -> usize {
        self.queue.pending_len()
    }

    /// Recent surface transitions, oldest first.
    pub fn transitions(&self) -> impl Iterator<Item = &SurfaceTransition> {
        self.history.iter()
    }

    pub fn drain_events(&mut self) -> Vec<NodeEvent> {
        self.events.drain()
    }

    pub fn pending_events(&self) -> &[NodeEvent] {
        self.events.pending()
    }

    pub fn drain_outcomes(&mut self) -> Vec<CompletedOperation> {
        std::mem::take(&mut self.outcomes)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn layout(&self) -> &L {
        &self.layout
    }

    pub fn layout_mut(&mut self) -> &mut L {
        &mut self.layout
    }

    // --- queue driving ----------------------------------------------------

    fn pump(&mut self) {
        loop {
            let now = self.clock.now();
            let Some(operation) = self.queue.admit(now) else {
                break;
            };
            self.dispatch(operation, now);
        }
    }

    fn dispatch(&mut self, operation: PresentationOperation, now: Instant) {
        let surface = operation.surface();
        let span = debug_span!(
            target: TARGET_QUEUE,
            "presentation.dispatch",
            operation_id = operation.id().raw(),
            surface_id = surface.raw(),
            kind = operation.kind().as_str()
        );
        let _guard = span.enter();

        match operation.kind() {
            OperationKind::Present => {
                if self.surfaces.get(&surface).is_some_and(|c| c.state() != SurfaceState::Idle) {
                    self.skip(operation, SkipReason::DuplicatePresentation);
                    return;
                }
                let config = operation.config().cloned().unwrap_or_default();
                let (anchor, content) = self
                    .slots
                    .get(&surface)
                    .map_or((None, Vec::new()), |slot| (Some(slot.anchor), slot.children.clone()));
                self.retired.remove(&surface);
                let controller = self
                    .surfaces
                    .entry(surface)
                    .or_insert_with(|| SurfaceController::new(surface, SurfaceConfig::default()));
                controller.set_config(config);
                controller.set_anchor(anchor);
                controller.set_content(content);
                self.queue.begin(operation, now);
                self.drive(surface, SurfaceEvent::PresentDispatched);
            }
            OperationKind::Dismiss(origin) => {
                let Some(controller) = self.surfaces.get(&surface) else {
                    self.skip(operation, SkipReason::NoActiveSurface);
                    return;
                };
                let gesture = SurfaceState::DismissRequested(DismissOrigin::Gesture);
                let committed = controller.gesture_committed();
                let skip = match (controller.state(), origin) {
                    (SurfaceState::Idle, _) => Some(SkipReason::NoActiveSurface),
                    (SurfaceState::Presented, DismissOrigin::Gesture) => Some(SkipReason::GestureCancelled),
                    (SurfaceState::Presented, DismissOrigin::Programmatic) => None,
                    (state, DismissOrigin::Programmatic) if state == gesture && !committed => None,
                    (state, DismissOrigin::Gesture) if state == gesture && committed => None,
                    _ => Some(SkipReason::AlreadyDismissing),
                };
                if let Some(reason) = skip {
                    self.skip(operation, reason);
                    return;
                }
                self.queue.begin(operation, now);
                self.drive(surface, SurfaceEvent::DismissDispatched(origin));
            }
        }
    }

    fn skip(&mut self, operation: PresentationOperation, reason: SkipReason) {
        debug!(
            target: TARGET_QUEUE,
            operation_id = operation.id().raw(),
            surface_id = operation.surface().raw(),
            ?reason,
            "skipping operation"
        );
        let done = self.queue.complete_unstarted(operation, OperationOutcome::Skipped(reason));
        self.outcomes.push(done);
    }

    /// Finish the in-flight operation if it belongs to `surface`.
    fn finish_for(&mut self, surface: SurfaceId, outcome: OperationOutcome) -> Option<CompletedOperation> {
        let started = self.queue.in_flight().filter(|f| f.surface() == surface)?.started();
        let now = self.clock.now();
        let done = self.queue.finish(outcome, now)?;
        let elapsed_ms = u64::try_from(now.saturating_duration_since(started).as_millis()).unwrap_or(u64::MAX);
        if done.outcome.is_success() {
            info!(
                target: TARGET_QUEUE,
                operation_id = done.id.raw(),
                surface_id = surface.raw(),
                kind = done.kind.as_str(),
                elapsed_ms,
                "operation completed"
            );
        } else {
            warn!(
                target: TARGET_QUEUE,
                operation_id = done.id.raw(),
                surface_id = surface.raw(),
                kind = done.kind.as_str(),
                outcome = done.outcome.label(),
                elapsed_ms,
                "operation did not complete"
            );
        }
        self.outcomes.push(done.clone());
        Some(done)
    }

    fn fail_in_flight(&mut self, surface: SurfaceId, reason: FailureReason) {
        let failure = NativePresentationFailure { surface, reason };
        if let Some(done) = self.finish_for(surface, OperationOutcome::Failed(failure.clone())) {
            self.diagnostic(done.id, &failure);
        }
    }

    fn awaiting(&self, surface: SurfaceId, state: SurfaceState) -> bool {
        self.surfaces.get(&surface).is_some_and(|c| c.state() == state)
            && self.queue.in_flight().is_some_and(|f| f.surface() == surface)
    }

    fn stale(&self, surface: SurfaceId, callback: &'static str) {
        warn!(
            target: TARGET_SURFACE,
            surface_id = surface.raw(),
            callback,
            state = self.surface_state(surface).map_or("unknown", SurfaceState::as_str),
            "ignoring stale native callback"
        );
    }

    // --- surface effects --------------------------------------------------

    /// Apply `event` to the surface's controller and carry out its effects.
    fn drive(&mut self, surface: SurfaceId, event: SurfaceEvent) -> Option<SurfaceTransition> {
        let transition = self.surfaces.get_mut(&surface)?.apply(event);
        debug!(
            target: TARGET_SURFACE,
            surface_id = surface.raw(),
            transition_id = transition.transition_id,
            ?event,
            from = transition.from.as_str(),
            to = transition.to.as_str(),
            "surface transition"
        );
        self.remember(transition.clone());
        for effect in transition.effects.clone() {
            self.run_effect(&transition, effect);
        }
        if transition.to == SurfaceState::Dismissed && transition.from != SurfaceState::Dismissed {
            self.surfaces.remove(&surface);
            self.retired.insert(surface);
            info!(target: TARGET_SURFACE, surface_id = surface.raw(), "surface dismissed");
        }
        Some(transition)
    }

    fn run_effect(&mut self, transition: &SurfaceTransition, effect: SurfaceEffect) {
        let surface = transition.surface;
        match effect {
            SurfaceEffect::MoveContentIn => self.move_content_in(surface),
            SurfaceEffect::IssueNativePresent => self.issue_present(surface),
            SurfaceEffect::EmitShown => {
                info!(target: TARGET_SURFACE, surface_id = surface.raw(), "surface presented");
                let payload = EventPayload::new().with("surface", surface.raw());
                self.emit(surface, EventName::Show, payload.clone());
                self.emit(surface, EventName::Open, payload);
            }
            SurfaceEffect::IssueNativeDismiss(origin) => self.issue_dismiss(surface, origin),
            SurfaceEffect::AbortNativeDismiss => {
                self.host.cancel_dismiss(surface);
                self.finish_for(surface, OperationOutcome::Skipped(SkipReason::GestureCancelled));
            }
            SurfaceEffect::RequestDismissSlot => {
                let id = self
                    .queue
                    .enqueue(PresentationOperation::dismiss_from(surface, DismissOrigin::Gesture));
                debug!(target: TARGET_SURFACE, surface_id = surface.raw(), operation_id = id.raw(), "gesture dismissal queued");
            }
            SurfaceEffect::ReattachContent => self.reattach_content(surface),
            SurfaceEffect::RevertContent | SurfaceEffect::RestoreContent => self.restore_content(surface),
            SurfaceEffect::EmitDismissed => {
                let origin = match transition.event {
                    SurfaceEvent::ForceTeardown(reason) => reason.as_str(),
                    _ => match self.queue.in_flight().map(InFlight::kind) {
                        Some(OperationKind::Dismiss(origin)) => origin.as_str(),
                        _ => DismissOrigin::Programmatic.as_str(),
                    },
                };
                let payload = EventPayload::new()
                    .with("surface", surface.raw())
                    .with("origin", origin);
                self.emit(surface, EventName::Dismiss, payload);
            }
            SurfaceEffect::Noop(reason) => {
                debug!(
                    target: TARGET_SURFACE,
                    surface_id = surface.raw(),
                    event = ?transition.event,
                    ?reason,
                    "surface event ignored"
                );
            }
        }
    }

    fn issue_present(&mut self, surface: SurfaceId) {
        let Some(config) = self.surfaces.get(&surface).map(|c| c.config().clone()) else {
            return;
        };
        match self.host.present(surface, &config) {
            Ok(()) => self.queue.mark_native_issued(),
            Err(failure) => {
                self.present_failed(surface, failure);
            }
        }
    }

    fn present_failed(&mut self, surface: SurfaceId, failure: HostFailure) -> Option<SurfaceTransition> {
        warn!(target: TARGET_SURFACE, surface_id = surface.raw(), %failure, "native present failed");
        let transition = self.drive(surface, SurfaceEvent::NativePresentFailed);
        self.fail_in_flight(surface, failure.into());
        transition
    }

    fn issue_dismiss(&mut self, surface: SurfaceId, origin: DismissOrigin) {
        match self.host.dismiss(surface, origin) {
            Ok(()) => self.queue.mark_native_issued(),
            Err(failure) => {
                warn!(
                    target: TARGET_SURFACE,
                    surface_id = surface.raw(),
                    %failure,
                    "native dismiss failed; tearing surface down"
                );
                self.force_teardown(surface, TeardownReason::DismissFailed, failure.into());
            }
        }
    }

    fn force_teardown(&mut self, surface: SurfaceId, reason: TeardownReason, failure: FailureReason) {
        self.host.teardown(surface);
        self.drive(surface, SurfaceEvent::ForceTeardown(reason));
        self.fail_in_flight(surface, failure);
    }

    fn move_content_in(&mut self, surface: SurfaceId) {
        let Some(content) = self.surfaces.get(&surface).map(|c| c.content().to_vec()) else {
            return;
        };
        let inside = Owner::Surface(surface);
        for node in &content {
            let Some(current) = self.ledger.current_owner(*node).cloned() else {
                continue;
            };
            if current == inside {
                continue;
            }
            match self.ledger.reparent(*node, &current, inside.clone()) {
                Ok(placement) => self.apply_placement(&placement),
                Err(err) => error!(
                    target: TARGET_SURFACE,
                    surface_id = surface.raw(),
                    node_id = node.raw(),
                    %err,
                    "could not move content into surface"
                ),
            }
        }
        self.ledger.reorder(&inside, &content);
        self.restack(surface);
    }

    fn reattach_content(&mut self, surface: SurfaceId) {
        let Some(content) = self.surfaces.get(&surface).map(|c| c.content().to_vec()) else {
            return;
        };
        let inside = Owner::Surface(surface);
        for node in &content {
            let Some(current) = self.ledger.current_owner(*node).cloned() else {
                continue;
            };
            if current == inside {
                continue;
            }
            warn!(
                target: TARGET_SURFACE,
                surface_id = surface.raw(),
                node_id = node.raw(),
                owner = %current,
                "content drifted out of surface; reattaching"
            );
            match self.ledger.reparent(*node, &current, inside.clone()) {
                Ok(placement) => self.apply_placement(&placement),
                Err(err) => error!(target: TARGET_SURFACE, node_id = node.raw(), %err, "reattach failed"),
            }
        }
        self.ledger.reorder(&inside, &content);
        self.restack(surface);
    }

    fn restore_content(&mut self, surface: SurfaceId) {
        let inside = Owner::Surface(surface);
        let nodes = self.ledger.children(&inside).to_vec();
        if nodes.is_empty() {
            return;
        }
        let Some(anchor) = self.surfaces.get(&surface).and_then(SurfaceController::anchor) else {
            warn!(
                target: TARGET_SURFACE,
                surface_id = surface.raw(),
                nodes = nodes.len(),
                "surface content has no anchor to return to"
            );
            return;
        };
        match self.ledger.reparent_group(&nodes, &inside, &Owner::Anchor(anchor)) {
            Ok(placements) => self.apply_placements(&placements),
            Err(err) => error!(target: TARGET_SURFACE, surface_id = surface.raw(), %err, "could not restore content"),
        }
    }

    /// Lay out the surface's content inside its bounds.
    fn restack(&mut self, surface: SurfaceId) {
        let Some(controller) = self.surfaces.get(&surface) else {
            return;
        };
        let Some(bounds) = controller.bounds() else {
            return;
        };
        let header = controller.config().header.as_ref().map(|_| self.config.header_height);
        let stack = Stack::new().header(header).gap(controller.config().content_gap);
        let nodes = self.ledger.children(&Owner::Surface(surface)).to_vec();
        let (measured, layout) = (&self.measured, &self.layout);
        let placed = stack.arrange_with(bounds.size(), &nodes, |node| {
            measured
                .height(node)
                .or_else(|| layout.computed_frame(node).map(|frame| frame.height))
        });
        debug!(
            target: TARGET_LAYOUT,
            surface_id = surface.raw(),
            nodes = placed.len(),
            width = bounds.width,
            height = bounds.height,
            "restack surface"
        );
        for item in placed {
            self.host.apply_frame(item.node, item.frame);
        }
    }

    // --- helpers ----------------------------------------------------------

    fn register(&mut self, target: TargetId, create_on_demand: bool, origin: RegistrationOrigin) -> Result<HostHandle, Error> {
        let outcome = self
            .registry
            .register_target(&mut self.ledger, target, create_on_demand, origin)?;
        if outcome.newly_registered {
            self.host.target_registered(&outcome.registration);
        }
        self.apply_placements(&outcome.placements);
        Ok(outcome.registration.host)
    }

    fn update_surface_children(&mut self, surface: SurfaceId, anchor: NodeId, ordered: &[NodeId]) -> Result<(), Error> {
        let previous = self
            .slots
            .get_mut(&surface)
            .map(|slot| std::mem::replace(&mut slot.children, ordered.to_vec()))
            .unwrap_or_default();
        let holds_content = match self.surfaces.get_mut(&surface) {
            Some(controller) => {
                controller.set_content(ordered.to_vec());
                controller.state().holds_content()
            }
            None => false,
        };
        if !holds_content {
            self.ledger.reorder(&Owner::Anchor(anchor), ordered);
            return Ok(());
        }

        let inside = Owner::Surface(surface);
        for child in previous.iter().filter(|c| !ordered.contains(c)) {
            if self.ledger.current_owner(*child) == Some(&inside) {
                let placement = self.ledger.reparent(*child, &inside, Owner::Anchor(anchor))?;
                self.apply_placement(&placement);
            }
        }
        for child in ordered {
            if let Some(current) = self.ledger.current_owner(*child).cloned()
                && current != inside
            {
                let placement = self.ledger.reparent(*child, &current, inside.clone())?;
                self.apply_placement(&placement);
            }
        }
        self.ledger.reorder(&inside, ordered);
        self.restack(surface);
        Ok(())
    }

    fn forget_tracked(&mut self, node: NodeId) -> Result<(), Error> {
        if !self.ledger.contains(node) {
            return Ok(());
        }
        self.registry.forget_node(node);
        for slot in self.slots.values_mut() {
            slot.children.retain(|child| *child != node);
        }
        for controller in self.surfaces.values_mut() {
            if controller.content().contains(&node) {
                let remaining = controller.content().iter().copied().filter(|c| *c != node).collect();
                controller.set_content(remaining);
            }
        }
        let owner = self.ledger.release(node)?;
        self.measured.forget(node);
        self.host.detach(node);
        if let Owner::Surface(surface) = owner {
            self.restack(surface);
        }
        Ok(())
    }

    fn apply_placement(&mut self, placement: &Placement) {
        self.host.place(placement);
        self.layout.request_layout(placement.node);
    }

    fn apply_placements(&mut self, placements: &[Placement]) {
        for placement in placements {
            self.apply_placement(placement);
        }
    }

    fn emit(&mut self, surface: SurfaceId, name: EventName, payload: EventPayload) {
        let target = self
            .surfaces
            .get(&surface)
            .and_then(SurfaceController::anchor)
            .or_else(|| self.slots.get(&surface).map(|slot| slot.anchor))
            .map_or(EventTarget::Surface(surface), EventTarget::Node);
        self.events.emit(NodeEvent::new(target, name, payload));
    }

    fn diagnostic(&mut self, operation: OperationId, failure: &NativePresentationFailure) {
        if !self.config.emit_diagnostics {
            return;
        }
        let payload = EventPayload::new()
            .with("code", failure.reason.code())
            .with("message", failure.to_string())
            .with("operation", operation.raw());
        self.emit(failure.surface, EventName::Diagnostic, payload);
    }

    fn remember(&mut self, transition: SurfaceTransition) {
        if self.history.len() >= self.config.transition_history.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(transition);
    }
}

impl<H: PresentationHost, L: LayoutEngine> std::fmt::Debug for PresentationContext<H, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresentationContext")
            .field("surfaces", &self.surfaces.len())
            .field("retired", &self.retired.len())
            .field("tracked_nodes", &self.ledger.len())
            .field("queue", &self.queue)
            .finish()
    }
}
