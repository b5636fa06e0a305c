#![forbid(unsafe_code)]

//! Measured content heights.
//!
//! Surface stacking uses the height each node last settled at. The cache is
//! keyed by node id, so a node keeps its measurement while it moves between
//! owners.

use portage_core::NodeId;
use rustc_hash::FxHashMap;

/// Last known height per node.
#[derive(Debug, Default, Clone)]
pub struct MeasureCache {
    heights: FxHashMap<NodeId, f64>,
    generation: u64,
}

impl MeasureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a settled height. Returns `true` when the stored value changed.
    ///
    /// Non-finite or negative heights are stored as zero.
    pub fn record(&mut self, node: NodeId, height: f64) -> bool {
        let height = if height.is_finite() { height.max(0.0) } else { 0.0 };
        let previous = self.heights.insert(node, height);
        let changed = previous != Some(height);
        if changed {
            self.generation = self.generation.wrapping_add(1);
        }
        changed
    }

    /// Last recorded height for `node`.
    #[inline]
    pub fn height(&self, node: NodeId) -> Option<f64> {
        self.heights.get(&node).copied()
    }

    /// Drop the measurement for a node that unmounted.
    pub fn forget(&mut self, node: NodeId) {
        if self.heights.remove(&node).is_some() {
            self.generation = self.generation.wrapping_add(1);
        }
    }

    /// Bumped on every change; lets callers skip restacking when nothing moved.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.heights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }
}
