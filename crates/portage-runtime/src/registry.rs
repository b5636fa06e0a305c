#![forbid(unsafe_code)]

//! Portal target registry.
//!
//! A portal takes the children of a source anchor and shows them under a
//! named target somewhere else in the host tree. Targets and content may
//! arrive in either order:
//!
//! - content for an unregistered target waits in the target's buffer (a
//!   hidden ledger owner) and is flushed, in arrival order, the moment the
//!   target registers;
//! - a target registered before its content simply sits empty.
//!
//! The registry never moves a node itself. Every move goes through the
//! [`Ledger`] passed into each call, and the resulting [`Placement`]s are
//! returned so the caller can mirror them in the host.

use std::collections::BTreeMap;

use portage_core::logging::TARGET_REGISTRY;
use portage_core::{HostHandle, NodeId, TargetId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{LedgerError, UnknownTargetError};
use crate::ledger::{Ledger, Owner, Placement};

/// Who declared a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationOrigin {
    /// A mounted portal-target node.
    Declared(NodeId),
    /// Application code, outside the declarative tree.
    Application,
    /// Created implicitly by content submitted with create-on-demand.
    OnDemand,
}

/// An active portal target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRegistration {
    pub target: TargetId,
    pub host: HostHandle,
    /// Keep content buffered (rather than returning it) when the target goes away.
    pub create_on_demand: bool,
    pub origin: RegistrationOrigin,
}

/// A node currently relocated by a portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocatedNode {
    pub node: NodeId,
    /// Logical parent the node returns to when released.
    pub source_anchor: NodeId,
    pub target: TargetId,
}

/// Result of a content submission.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    /// Moves performed, in order.
    pub placements: Vec<Placement>,
    /// Set when the target was unknown and content went to the buffer.
    pub unknown_target: Option<UnknownTargetError>,
    /// Set when the submission created an on-demand registration.
    pub created: Option<TargetRegistration>,
}

/// Result of registering a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterOutcome {
    pub registration: TargetRegistration,
    /// `false` when the target was already registered.
    pub newly_registered: bool,
    /// Buffered content flushed into the target.
    pub placements: Vec<Placement>,
}

/// Registry of portal targets and relocated content.
#[derive(Debug, Default)]
pub struct Registry {
    registrations: BTreeMap<TargetId, TargetRegistration>,
    relocations: BTreeMap<NodeId, RelocatedNode>,
    next_handle: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `target`, flushing any buffered content into it.
    ///
    /// Idempotent: registering an active target returns its existing handle.
    /// A declared or application registration upgrades an on-demand one.
    pub fn register_target(
        &mut self,
        ledger: &mut Ledger,
        target: TargetId,
        create_on_demand: bool,
        origin: RegistrationOrigin,
    ) -> Result<RegisterOutcome, LedgerError> {
        if let Some(existing) = self.registrations.get_mut(&target) {
            if existing.origin == RegistrationOrigin::OnDemand && origin != RegistrationOrigin::OnDemand {
                debug!(target: TARGET_REGISTRY, target_id = %existing.target, "upgrading on-demand registration");
                existing.origin = origin;
                existing.create_on_demand = create_on_demand;
            }
            return Ok(RegisterOutcome {
                registration: existing.clone(),
                newly_registered: false,
                placements: Vec::new(),
            });
        }

        self.next_handle += 1;
        let registration = TargetRegistration {
            target: target.clone(),
            host: HostHandle::new(self.next_handle),
            create_on_demand,
            origin,
        };
        self.registrations.insert(target.clone(), registration.clone());

        let buffer = Owner::Buffer(target.clone());
        let waiting = ledger.children(&buffer).to_vec();
        let placements = ledger.reparent_group(&waiting, &buffer, &Owner::Target(target.clone()))?;
        debug!(
            target: TARGET_REGISTRY,
            target_id = %target,
            host = registration.host.raw(),
            flushed = placements.len(),
            "registered target"
        );
        Ok(RegisterOutcome {
            registration,
            newly_registered: true,
            placements,
        })
    }

    /// Declare that `source_anchor` wants `nodes`, in order, shown under `target`.
    ///
    /// Nodes the anchor previously sent to this target but no longer lists
    /// return to the anchor. Content for an unknown target is buffered; with
    /// `create_on_demand` an on-demand registration is created instead.
    pub fn submit_content(
        &mut self,
        ledger: &mut Ledger,
        target: &TargetId,
        source_anchor: NodeId,
        nodes: &[NodeId],
        create_on_demand: bool,
    ) -> Result<SubmitOutcome, LedgerError> {
        if let Some(missing) = nodes.iter().find(|node| !ledger.contains(**node)) {
            return Err(LedgerError::UnknownNode(*missing));
        }

        let mut outcome = SubmitOutcome::default();
        let destination = if self.registrations.contains_key(target) {
            Owner::Target(target.clone())
        } else if create_on_demand {
            self.next_handle += 1;
            let registration = TargetRegistration {
                target: target.clone(),
                host: HostHandle::new(self.next_handle),
                create_on_demand: true,
                origin: RegistrationOrigin::OnDemand,
            };
            debug!(target: TARGET_REGISTRY, target_id = %target, "created on-demand target");
            self.registrations.insert(target.clone(), registration.clone());
            outcome.created = Some(registration);
            Owner::Target(target.clone())
        } else {
            Owner::Buffer(target.clone())
        };
        if outcome.created.is_some() {
            let buffer = Owner::Buffer(target.clone());
            let waiting = ledger.children(&buffer).to_vec();
            outcome
                .placements
                .extend(ledger.reparent_group(&waiting, &buffer, &destination)?);
        }

        let dropped: Vec<NodeId> = self
            .relocations
            .values()
            .filter(|r| r.source_anchor == source_anchor && &r.target == target && !nodes.contains(&r.node))
            .map(|r| r.node)
            .collect();
        for node in dropped {
            outcome.placements.extend(self.return_to_anchor(ledger, node)?);
        }

        for node in nodes {
            let Some(current) = ledger.current_owner(*node).cloned() else {
                continue;
            };
            if current != destination {
                outcome.placements.push(ledger.reparent(*node, &current, destination.clone())?);
            }
            self.relocations.insert(
                *node,
                RelocatedNode {
                    node: *node,
                    source_anchor,
                    target: target.clone(),
                },
            );
        }
        ledger.reorder(&destination, nodes);

        if let Owner::Buffer(_) = destination {
            let buffered = ledger.children(&destination).len();
            warn!(
                target: TARGET_REGISTRY,
                target_id = %target,
                buffered,
                "content submitted to unregistered target; buffering"
            );
            outcome.unknown_target = Some(UnknownTargetError {
                target: target.clone(),
                buffered,
            });
        }
        Ok(outcome)
    }

    /// Return relocated content for `target` to its source anchors.
    ///
    /// With `source_anchor` set, only that anchor's content is released.
    pub fn release_content(
        &mut self,
        ledger: &mut Ledger,
        target: &TargetId,
        source_anchor: Option<NodeId>,
    ) -> Result<Vec<Placement>, LedgerError> {
        let nodes = self.ordered_relocations(ledger, target, source_anchor);
        let mut placements = Vec::with_capacity(nodes.len());
        for node in nodes {
            placements.extend(self.return_to_anchor(ledger, node)?);
        }
        Ok(placements)
    }

    /// Remove the registration for `target`.
    ///
    /// Attached content is rebuffered when the registration was
    /// create-on-demand (it will reappear on re-registration) and returned to
    /// its source anchors otherwise.
    pub fn unregister_target(
        &mut self,
        ledger: &mut Ledger,
        target: &TargetId,
    ) -> Result<Option<(TargetRegistration, Vec<Placement>)>, LedgerError> {
        let Some(registration) = self.registrations.remove(target) else {
            return Ok(None);
        };
        let attached = Owner::Target(target.clone());
        let nodes = ledger.children(&attached).to_vec();
        let placements = if registration.create_on_demand {
            ledger.reparent_group(&nodes, &attached, &Owner::Buffer(target.clone()))?
        } else {
            let mut placements = Vec::with_capacity(nodes.len());
            for node in nodes {
                placements.extend(self.return_to_anchor(ledger, node)?);
            }
            placements
        };
        debug!(
            target: TARGET_REGISTRY,
            target_id = %target,
            moved = placements.len(),
            rebuffered = registration.create_on_demand,
            "unregistered target"
        );
        Ok(Some((registration, placements)))
    }

    /// Drop bookkeeping for an unmounted node.
    pub fn forget_node(&mut self, node: NodeId) -> Option<RelocatedNode> {
        self.relocations.remove(&node)
    }

    pub fn registration(&self, target: &TargetId) -> Option<&TargetRegistration> {
        self.registrations.get(target)
    }

    /// All active registrations, ordered by target name.
    pub fn registrations(&self) -> impl Iterator<Item = &TargetRegistration> {
        self.registrations.values()
    }

    /// Nodes shown under `target`, in order.
    pub fn host_children<'a>(&self, ledger: &'a Ledger, target: &TargetId) -> &'a [NodeId] {
        ledger.children(&Owner::Target(target.clone()))
    }

    /// Nodes waiting for `target` to register, in arrival order.
    pub fn buffered<'a>(&self, ledger: &'a Ledger, target: &TargetId) -> &'a [NodeId] {
        ledger.children(&Owner::Buffer(target.clone()))
    }

    pub fn relocated(&self, node: NodeId) -> Option<&RelocatedNode> {
        self.relocations.get(&node)
    }

    /// Relocations for `target`, in the order they appear under the target
    /// and then in its buffer.
    fn ordered_relocations(&self, ledger: &Ledger, target: &TargetId, source_anchor: Option<NodeId>) -> Vec<NodeId> {
        let wanted = |node: &NodeId| {
            self.relocations
                .get(node)
                .is_some_and(|r| &r.target == target && source_anchor.is_none_or(|a| a == r.source_anchor))
        };
        ledger
            .children(&Owner::Target(target.clone()))
            .iter()
            .chain(ledger.children(&Owner::Buffer(target.clone())))
            .copied()
            .filter(wanted)
            .collect()
    }

    fn return_to_anchor(&mut self, ledger: &mut Ledger, node: NodeId) -> Result<Option<Placement>, LedgerError> {
        let Some(record) = self.relocations.remove(&node) else {
            return Ok(None);
        };
        let home = Owner::Anchor(record.source_anchor);
        match ledger.current_owner(node).cloned() {
            Some(current) if current != home => Ok(Some(ledger.reparent(node, &current, home)?)),
            Some(_) => Ok(None),
            None => Err(LedgerError::UnknownNode(node)),
        }
    }
}
