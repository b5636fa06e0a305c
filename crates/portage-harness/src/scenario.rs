#![forbid(unsafe_code)]

//! Scenario driver.
//!
//! Wraps a [`PresentationContext`] wired to a [`RecordingHost`], a
//! [`ScriptedLayout`] and a [`ManualClock`], and adds the small verbs tests
//! keep repeating: mount an anchor with children, deliver owed native
//! callbacks, advance time.

use std::time::Duration;

use portage_core::{NodeEvent, NodeId, SurfaceId, TargetId};
use portage_runtime::{Error, NodeRole, PresentationContext, RuntimeConfig, SurfaceTransition};
use tracing::debug;

use crate::clock::ManualClock;
use crate::host::{PendingCallback, RecordingHost};
use crate::layout::ScriptedLayout;

/// Context type every scenario drives.
pub type HarnessContext = PresentationContext<RecordingHost, ScriptedLayout>;

/// Upper bound on callbacks delivered by one [`Scenario::settle`].
const SETTLE_LIMIT: usize = 10_000;

pub struct Scenario {
    ctx: HarnessContext,
    clock: ManualClock,
    delivered: u64,
}

impl Default for Scenario {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl Scenario {
    pub fn new(config: RuntimeConfig) -> Self {
        let clock = ManualClock::new();
        let ctx = PresentationContext::with_clock(
            RecordingHost::new(),
            ScriptedLayout::new(),
            config,
            Box::new(clock.clone()),
        );
        Self {
            ctx,
            clock,
            delivered: 0,
        }
    }

    pub fn ctx(&self) -> &HarnessContext {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut HarnessContext {
        &mut self.ctx
    }

    pub fn host(&self) -> &RecordingHost {
        self.ctx.host()
    }

    pub fn host_mut(&mut self) -> &mut RecordingHost {
        self.ctx.host_mut()
    }

    pub fn layout_mut(&mut self) -> &mut ScriptedLayout {
        self.ctx.layout_mut()
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Mount a surface anchor and its content children.
    pub fn mount_anchor(&mut self, anchor: NodeId, surface: SurfaceId, children: &[NodeId]) -> Result<(), Error> {
        self.ctx.on_mount(anchor, None, NodeRole::SurfaceAnchor { surface })?;
        self.mount_children(anchor, children)
    }

    /// Mount a portal source and its children. The initial submission's
    /// result is returned, so an unregistered target yields an error.
    pub fn mount_source(
        &mut self,
        anchor: NodeId,
        target: impl Into<TargetId>,
        create_on_demand: bool,
        children: &[NodeId],
    ) -> Result<(), Error> {
        let role = NodeRole::PortalSource {
            target: target.into(),
            create_on_demand,
        };
        self.ctx.on_mount(anchor, None, role)?;
        self.mount_children(anchor, children)
    }

    /// Mount a declared portal target.
    pub fn mount_target(&mut self, node: NodeId, target: impl Into<TargetId>, create_on_demand: bool) -> Result<(), Error> {
        let role = NodeRole::PortalTarget {
            target: target.into(),
            create_on_demand,
        };
        self.ctx.on_mount(node, None, role)
    }

    fn mount_children(&mut self, parent: NodeId, children: &[NodeId]) -> Result<(), Error> {
        for child in children {
            self.ctx.on_mount(*child, Some(parent), NodeRole::Content)?;
        }
        self.ctx.on_children_changed(parent, children)
    }

    /// Deliver the oldest owed native callback.
    pub fn deliver_next(&mut self) -> Option<(PendingCallback, Option<SurfaceTransition>)> {
        let callback = self.ctx.host_mut().pop_callback()?;
        self.delivered += 1;
        debug!(?callback, delivered = self.delivered, "delivering native callback");
        let transition = match callback {
            PendingCallback::PresentCompleted(surface) => self.ctx.native_present_completed(surface),
            PendingCallback::DismissCompleted(surface) => self.ctx.native_dismiss_completed(surface),
        };
        Some((callback, transition))
    }

    /// Deliver callbacks until none are owed. Returns how many were delivered.
    pub fn settle(&mut self) -> usize {
        let mut count = 0;
        while count < SETTLE_LIMIT && self.deliver_next().is_some() {
            count += 1;
        }
        count
    }

    /// Move the clock forward and run the context's timers.
    pub fn advance(&mut self, by: Duration) {
        self.clock.advance(by);
        self.ctx.tick();
    }

    /// Names of pending events, drained.
    pub fn event_names(&mut self) -> Vec<String> {
        self.ctx
            .drain_events()
            .into_iter()
            .map(|event| event.name.as_str().to_owned())
            .collect()
    }

    pub fn drain_events(&mut self) -> Vec<NodeEvent> {
        self.ctx.drain_events()
    }

    /// Native callbacks delivered so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}
