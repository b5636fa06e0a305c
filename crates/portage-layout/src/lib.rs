#![forbid(unsafe_code)]

//! Layout interface and surface content arrangement.
//!
//! Portage does not compute layout for arbitrary trees; an external engine
//! does that. This crate defines the narrow interface the runtime needs from
//! that engine ([`LayoutEngine`]) and the one piece of layout Portage owns
//! itself: stacking the content of an overlay surface ([`Stack`]).

pub mod detent;
pub mod measure;
pub mod stack;

pub use detent::Detent;
pub use measure::MeasureCache;
pub use stack::{Placed, Stack};

use portage_core::{Frame, NodeId};

/// External layout engine.
///
/// The runtime calls [`request_layout`](LayoutEngine::request_layout) after
/// every ownership move and reads [`computed_frame`](LayoutEngine::computed_frame)
/// when the engine reports that a node has settled.
pub trait LayoutEngine {
    /// Last frame the engine computed for `node`, if any.
    fn computed_frame(&self, node: NodeId) -> Option<Frame>;

    /// Ask the engine to recompute `node` and its subtree.
    fn request_layout(&mut self, node: NodeId);
}

/// Layout engine that never produces frames.
///
/// Useful for hosts that size content themselves; every surface child is then
/// stacked with a height of zero unless a measurement is recorded directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLayout;

impl LayoutEngine for NoLayout {
    fn computed_frame(&self, _node: NodeId) -> Option<Frame> {
        None
    }

    fn request_layout(&mut self, _node: NodeId) {}
}

impl<L: LayoutEngine + ?Sized> LayoutEngine for Box<L> {
    fn computed_frame(&self, node: NodeId) -> Option<Frame> {
        (**self).computed_frame(node)
    }

    fn request_layout(&mut self, node: NodeId) {
        (**self).request_layout(node);
    }
}
