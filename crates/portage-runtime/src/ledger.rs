#![forbid(unsafe_code)]

//! Child ownership ledger.
//!
//! The ledger is the single source of truth for where a content node lives.
//! Every move between a source anchor, a portal buffer, a portal target, or an
//! overlay surface goes through [`Ledger::reparent`] (or one of its variants),
//! which checks the caller's view of the current owner before moving anything.
//!
//! # Invariants
//!
//! 1. A tracked node has exactly one owner at any instant.
//! 2. A node appears in exactly one owner's child list, at most once.
//! 3. Visibility is derived from the owner and updated in the same step:
//!    anchors and buffers hide, targets and surfaces show.
//! 4. Moving never changes a node's [`instance`](Ledger::instance) stamp or
//!    its markers. Identity is preserved; nothing is recreated.
//! 5. Nodes moved together keep their relative order.
//!
//! # Failure Modes
//!
//! | Condition | Result |
//! |-----------|--------|
//! | Node never adopted | [`LedgerError::UnknownNode`] |
//! | Node adopted twice | [`LedgerError::DuplicateNode`] |
//! | Caller's `from` is stale | [`LedgerError::ConcurrentReparent`], nothing moved |

use std::collections::BTreeMap;
use std::fmt;

use portage_core::{NodeId, SurfaceId, TargetId};
use portage_core::logging::TARGET_LEDGER;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConcurrentReparentError, LedgerError};

/// A location that can own content nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Owner {
    /// Parking place under the node's original logical parent.
    Anchor(NodeId),
    /// Holding area for content submitted to a target that does not exist yet.
    Buffer(TargetId),
    /// A registered portal target.
    Target(TargetId),
    /// An overlay surface.
    Surface(SurfaceId),
}

impl Owner {
    /// Visibility implied by this owner.
    #[inline]
    pub fn visibility(&self) -> Visibility {
        match self {
            Self::Anchor(_) | Self::Buffer(_) => Visibility::Hidden,
            Self::Target(_) | Self::Surface(_) => Visibility::Visible,
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anchor(node) => write!(f, "anchor({node})"),
            Self::Buffer(target) => write!(f, "buffer({target})"),
            Self::Target(target) => write!(f, "target({target})"),
            Self::Surface(surface) => write!(f, "surface({surface})"),
        }
    }
}

/// Whether a node takes part in layout and hit testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    Hidden,
    Visible,
}

/// Record of one ownership change, handed to the host so it can mirror it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub node: NodeId,
    /// Previous owner; `None` on first adoption.
    pub from: Option<Owner>,
    pub to: Owner,
    /// Position within the new owner's child list.
    pub index: usize,
    pub visibility: Visibility,
}

#[derive(Debug, Clone)]
struct Entry {
    owner: Owner,
    instance: u64,
    markers: BTreeMap<String, String>,
}

/// Authoritative parent pointers for every tracked content node.
#[derive(Debug, Default)]
pub struct Ledger {
    entries: FxHashMap<NodeId, Entry>,
    children: FxHashMap<Owner, Vec<NodeId>>,
    next_instance: u64,
    moves: u64,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a freshly mounted node under `owner`.
    pub fn adopt(&mut self, node: NodeId, owner: Owner) -> Result<Placement, LedgerError> {
        if self.entries.contains_key(&node) {
            return Err(LedgerError::DuplicateNode(node));
        }
        self.next_instance += 1;
        let list = self.children.entry(owner.clone()).or_default();
        list.push(node);
        let index = list.len() - 1;
        self.entries.insert(
            node,
            Entry {
                owner: owner.clone(),
                instance: self.next_instance,
                markers: BTreeMap::new(),
            },
        );
        debug!(target: TARGET_LEDGER, %node, to = %owner, "adopt");
        Ok(Placement {
            node,
            from: None,
            visibility: owner.visibility(),
            to: owner,
            index,
        })
    }

    /// Move `node` from `from` to the end of `to`.
    pub fn reparent(&mut self, node: NodeId, from: &Owner, to: Owner) -> Result<Placement, LedgerError> {
        self.reparent_at(node, from, to, usize::MAX)
    }

    /// Move `node` from `from` into `to` at `index` (clamped to the list end).
    ///
    /// Moving within the same owner repositions the node.
    pub fn reparent_at(
        &mut self,
        node: NodeId,
        from: &Owner,
        to: Owner,
        index: usize,
    ) -> Result<Placement, LedgerError> {
        self.check(node, from)?;
        Ok(self.move_unchecked(node, from, to, index))
    }

    /// Move several nodes that share an owner, keeping their relative order.
    ///
    /// Every node is validated before any of them moves; a single stale
    /// owner aborts the whole group. Repeated ids are moved once.
    pub fn reparent_group(
        &mut self,
        nodes: &[NodeId],
        from: &Owner,
        to: &Owner,
    ) -> Result<Vec<Placement>, LedgerError> {
        let mut unique: Vec<NodeId> = Vec::with_capacity(nodes.len());
        for node in nodes {
            if !unique.contains(node) {
                unique.push(*node);
            }
        }
        for node in &unique {
            self.check(*node, from)?;
        }
        Ok(unique
            .into_iter()
            .map(|node| self.move_unchecked(node, from, to.clone(), usize::MAX))
            .collect())
    }

    /// Arrange the listed children of `owner` in the given order.
    ///
    /// Listed nodes are permuted among the positions they already occupy;
    /// unlisted children keep their positions. Nodes not owned by `owner` are
    /// ignored. Returns `true` when the order changed.
    pub fn reorder(&mut self, owner: &Owner, ordered: &[NodeId]) -> bool {
        let Some(list) = self.children.get_mut(owner) else {
            return false;
        };
        let slots: Vec<usize> = list
            .iter()
            .enumerate()
            .filter(|(_, node)| ordered.contains(node))
            .map(|(index, _)| index)
            .collect();
        let mut wanted: Vec<NodeId> = Vec::with_capacity(slots.len());
        for node in ordered {
            if list.contains(node) && !wanted.contains(node) {
                wanted.push(*node);
            }
        }
        let mut changed = false;
        for (slot, node) in slots.into_iter().zip(wanted) {
            if list[slot] != node {
                list[slot] = node;
                changed = true;
            }
        }
        if changed {
            debug!(target: TARGET_LEDGER, owner = %owner, "reorder");
        }
        changed
    }

    /// Stop tracking `node`. Only called when the node unmounts.
    pub fn release(&mut self, node: NodeId) -> Result<Owner, LedgerError> {
        let entry = self.entries.remove(&node).ok_or(LedgerError::UnknownNode(node))?;
        self.detach_from(&entry.owner, node);
        debug!(target: TARGET_LEDGER, %node, from = %entry.owner, "release");
        Ok(entry.owner)
    }

    /// Current owner of `node`.
    #[inline]
    pub fn current_owner(&self, node: NodeId) -> Option<&Owner> {
        self.entries.get(&node).map(|entry| &entry.owner)
    }

    /// Children of `owner` in order.
    pub fn children(&self, owner: &Owner) -> &[NodeId] {
        self.children.get(owner).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Visibility of `node`.
    pub fn visibility(&self, node: NodeId) -> Option<Visibility> {
        self.current_owner(node).map(Owner::visibility)
    }

    /// Attach an interaction-state marker to `node`.
    pub fn mark(&mut self, node: NodeId, key: impl Into<String>, value: impl Into<String>) -> Result<(), LedgerError> {
        let entry = self.entries.get_mut(&node).ok_or(LedgerError::UnknownNode(node))?;
        entry.markers.insert(key.into(), value.into());
        Ok(())
    }

    /// Read a marker previously set with [`mark`](Self::mark).
    pub fn read(&self, node: NodeId, key: &str) -> Option<&str> {
        self.entries.get(&node)?.markers.get(key).map(String::as_str)
    }

    /// Creation stamp assigned at adoption; unchanged by moves.
    pub fn instance(&self, node: NodeId) -> Option<u64> {
        self.entries.get(&node).map(|entry| entry.instance)
    }

    #[inline]
    pub fn contains(&self, node: NodeId) -> bool {
        self.entries.contains_key(&node)
    }

    /// Number of tracked nodes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total successful moves since creation.
    pub fn move_count(&self) -> u64 {
        self.moves
    }

    fn check(&self, node: NodeId, from: &Owner) -> Result<(), LedgerError> {
        let entry = self.entries.get(&node).ok_or(LedgerError::UnknownNode(node))?;
        if &entry.owner != from {
            return Err(LedgerError::ConcurrentReparent(ConcurrentReparentError {
                node,
                expected: from.clone(),
                actual: entry.owner.clone(),
            }));
        }
        Ok(())
    }

    fn move_unchecked(&mut self, node: NodeId, from: &Owner, to: Owner, index: usize) -> Placement {
        self.detach_from(from, node);
        let list = self.children.entry(to.clone()).or_default();
        let index = index.min(list.len());
        list.insert(index, node);
        if let Some(entry) = self.entries.get_mut(&node) {
            entry.owner = to.clone();
        }
        self.moves += 1;
        debug!(target: TARGET_LEDGER, %node, from = %from, to = %to, index, "reparent");
        Placement {
            node,
            from: Some(from.clone()),
            visibility: to.visibility(),
            to,
            index,
        }
    }

    fn detach_from(&mut self, owner: &Owner, node: NodeId) {
        if let Some(list) = self.children.get_mut(owner) {
            list.retain(|child| *child != node);
            if list.is_empty() {
                self.children.remove(owner);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(raw: u64) -> NodeId {
        NodeId::new(raw)
    }

    fn anchor(raw: u64) -> Owner {
        Owner::Anchor(n(raw))
    }

    fn surface(raw: u64) -> Owner {
        Owner::Surface(SurfaceId::new(raw))
    }

    #[test]
    fn adopt_places_node_hidden_under_anchor() {
        let mut ledger = Ledger::new();
        let placement = ledger.adopt(n(1), anchor(100)).unwrap();
        assert_eq!(placement.from, None);
        assert_eq!(placement.visibility, Visibility::Hidden);
        assert_eq!(ledger.current_owner(n(1)), Some(&anchor(100)));
        assert_eq!(ledger.children(&anchor(100)), &[n(1)]);
    }

    #[test]
    fn adopt_twice_is_rejected() {
        let mut ledger = Ledger::new();
        ledger.adopt(n(1), anchor(100)).unwrap();
        assert_eq!(ledger.adopt(n(1), anchor(200)), Err(LedgerError::DuplicateNode(n(1))));
        assert_eq!(ledger.current_owner(n(1)), Some(&anchor(100)));
    }

    #[test]
    fn reparent_preserves_markers_and_instance() {
        let mut ledger = Ledger::new();
        ledger.adopt(n(1), anchor(100)).unwrap();
        ledger.mark(n(1), "scroll", "v1").unwrap();
        let instance = ledger.instance(n(1));
        let placement = ledger.reparent(n(1), &anchor(100), surface(7)).unwrap();
        assert_eq!(placement.visibility, Visibility::Visible);
        assert_eq!(ledger.read(n(1), "scroll"), Some("v1"));
        assert_eq!(ledger.instance(n(1)), instance);
        assert_eq!(ledger.visibility(n(1)), Some(Visibility::Visible));
        assert!(ledger.children(&anchor(100)).is_empty());
    }

    #[test]
    fn stale_from_is_reported_and_nothing_moves() {
        let mut ledger = Ledger::new();
        ledger.adopt(n(1), anchor(100)).unwrap();
        let err = ledger.reparent(n(1), &surface(7), anchor(200)).unwrap_err();
        match err {
            LedgerError::ConcurrentReparent(e) => {
                assert_eq!(e.node, n(1));
                assert_eq!(e.expected, surface(7));
                assert_eq!(e.actual, anchor(100));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(ledger.current_owner(n(1)), Some(&anchor(100)));
        assert_eq!(ledger.move_count(), 0);
    }

    #[test]
    fn group_move_is_all_or_nothing() {
        let mut ledger = Ledger::new();
        ledger.adopt(n(1), anchor(100)).unwrap();
        ledger.adopt(n(2), anchor(100)).unwrap();
        ledger.adopt(n(3), anchor(200)).unwrap();
        let result = ledger.reparent_group(&[n(1), n(2), n(3)], &anchor(100), &surface(1));
        assert!(matches!(result, Err(LedgerError::ConcurrentReparent(_))));
        assert_eq!(ledger.children(&anchor(100)), &[n(1), n(2)]);
        assert!(ledger.children(&surface(1)).is_empty());
    }

    #[test]
    fn group_move_keeps_relative_order() {
        let mut ledger = Ledger::new();
        for raw in [3, 1, 2] {
            ledger.adopt(n(raw), anchor(100)).unwrap();
        }
        let placements = ledger
            .reparent_group(&[n(3), n(1), n(2), n(1)], &anchor(100), &surface(1))
            .unwrap();
        assert_eq!(placements.len(), 3);
        assert_eq!(ledger.children(&surface(1)), &[n(3), n(1), n(2)]);
        assert_eq!(placements[2].index, 2);
    }

    #[test]
    fn reparent_at_inserts_at_position() {
        let mut ledger = Ledger::new();
        ledger.adopt(n(1), surface(1)).unwrap();
        ledger.adopt(n(2), surface(1)).unwrap();
        ledger.adopt(n(3), anchor(9)).unwrap();
        let placement = ledger.reparent_at(n(3), &anchor(9), surface(1), 1).unwrap();
        assert_eq!(placement.index, 1);
        assert_eq!(ledger.children(&surface(1)), &[n(1), n(3), n(2)]);
        let placement = ledger.reparent_at(n(1), &surface(1), surface(1), 99).unwrap();
        assert_eq!(placement.index, 2);
        assert_eq!(ledger.children(&surface(1)), &[n(3), n(2), n(1)]);
    }

    #[test]
    fn reorder_permutes_listed_nodes_in_place() {
        let mut ledger = Ledger::new();
        for raw in 1..=4 {
            ledger.adopt(n(raw), surface(1)).unwrap();
        }
        assert!(ledger.reorder(&surface(1), &[n(4), n(2), n(99)]));
        assert_eq!(ledger.children(&surface(1)), &[n(1), n(4), n(3), n(2)]);
        assert!(!ledger.reorder(&surface(1), &[n(4), n(2)]));
    }

    #[test]
    fn release_forgets_node() {
        let mut ledger = Ledger::new();
        ledger.adopt(n(1), anchor(100)).unwrap();
        assert_eq!(ledger.release(n(1)), Ok(anchor(100)));
        assert!(!ledger.contains(n(1)));
        assert_eq!(ledger.release(n(1)), Err(LedgerError::UnknownNode(n(1))));
        assert!(ledger.children(&anchor(100)).is_empty());
        assert!(ledger.mark(n(1), "k", "v").is_err());
    }

    #[test]
    fn buffer_owner_hides_target_owner_shows() {
        let target = TargetId::new("t1");
        assert_eq!(Owner::Buffer(target.clone()).visibility(), Visibility::Hidden);
        assert_eq!(Owner::Target(target).visibility(), Visibility::Visible);
        assert_eq!(anchor(5).to_string(), "anchor(node#5)");
    }
}
