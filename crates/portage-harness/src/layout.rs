#![forbid(unsafe_code)]

//! Layout engine with frames set by the test.

use std::collections::BTreeMap;

use portage_core::{Frame, NodeId};
use portage_layout::LayoutEngine;

/// Returns whatever frames the test scripted and records layout requests.
#[derive(Debug, Default, Clone)]
pub struct ScriptedLayout {
    frames: BTreeMap<NodeId, Frame>,
    requests: Vec<NodeId>,
}

impl ScriptedLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame returned for `node` from now on.
    pub fn set_frame(&mut self, node: NodeId, frame: Frame) {
        self.frames.insert(node, frame);
    }

    /// Shorthand for a frame of the given height at the origin.
    pub fn set_height(&mut self, node: NodeId, height: f64) {
        self.set_frame(node, Frame::new(0.0, 0.0, 0.0, height));
    }

    /// Nodes passed to `request_layout`, in order.
    pub fn requests(&self) -> &[NodeId] {
        &self.requests
    }

    pub fn take_requests(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.requests)
    }
}

impl LayoutEngine for ScriptedLayout {
    fn computed_frame(&self, node: NodeId) -> Option<Frame> {
        self.frames.get(&node).copied()
    }

    fn request_layout(&mut self, node: NodeId) {
        self.requests.push(node);
    }
}
