#![forbid(unsafe_code)]

//! Vertical stacking of surface content.
//!
//! # Rules
//!
//! - A lone node fills the content area: the container minus the header band.
//! - Several nodes stack top to bottom in declaration order. Each gets the
//!   full container width and its last measured height, or its intrinsic
//!   height when it has never settled, separated by `gap`.
//! - Frames are local to the surface container, so `x` is always zero.

use portage_core::{Frame, NodeId, Size};

use crate::measure::MeasureCache;

/// A node and the frame assigned to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placed {
    pub node: NodeId,
    pub frame: Frame,
}

/// Surface content arranger.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stack {
    header_height: Option<f64>,
    gap: f64,
}

impl Stack {
    /// A stack with no header band and no gap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a header band of `height` points at the top of the container.
    #[must_use]
    pub fn header(mut self, height: Option<f64>) -> Self {
        self.header_height = height.filter(|h| h.is_finite() && *h > 0.0);
        self
    }

    /// Vertical gap between stacked nodes.
    #[must_use]
    pub fn gap(mut self, gap: f64) -> Self {
        self.gap = if gap.is_finite() { gap.max(0.0) } else { 0.0 };
        self
    }

    /// Content area for a container of the given size.
    pub fn content_area(&self, container: Size) -> Frame {
        let frame = Frame::from_size(container.width, container.height);
        match self.header_height {
            Some(band) => frame.inset_top(band),
            None => frame,
        }
    }

    /// Assign frames to `nodes` in order.
    pub fn arrange(&self, container: Size, nodes: &[NodeId], measured: &MeasureCache) -> Vec<Placed> {
        self.arrange_with(container, nodes, |node| measured.height(node))
    }

    /// Like [`Stack::arrange`], with heights from `lookup`. Nodes it knows
    /// nothing about get zero height until they are measured.
    pub fn arrange_with(
        &self,
        container: Size,
        nodes: &[NodeId],
        lookup: impl Fn(NodeId) -> Option<f64>,
    ) -> Vec<Placed> {
        let area = self.content_area(container);
        match nodes {
            [] => Vec::new(),
            [only] => vec![Placed {
                node: *only,
                frame: area,
            }],
            many => {
                let mut offset = area.y;
                let mut placed = Vec::with_capacity(many.len());
                for (index, node) in many.iter().enumerate() {
                    if index > 0 {
                        offset += self.gap;
                    }
                    let height = lookup(*node)
                        .filter(|h| h.is_finite())
                        .map_or(0.0, |h| h.max(0.0));
                    placed.push(Placed {
                        node: *node,
                        frame: Frame::new(0.0, offset, area.width, height),
                    });
                    offset += height;
                }
                placed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u64]) -> Vec<NodeId> {
        raw.iter().copied().map(NodeId::new).collect()
    }

    #[test]
    fn single_node_fills_area_below_header() {
        let stack = Stack::new().header(Some(56.0));
        let placed = stack.arrange(Size::new(320.0, 600.0), &ids(&[1]), &MeasureCache::new());
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].frame, Frame::new(0.0, 56.0, 320.0, 544.0));
    }

    #[test]
    fn lookup_heights_fill_unmeasured_nodes() {
        let lookup = |node: NodeId| match node.raw() {
            1 => Some(30.0),
            2 => Some(f64::NAN),
            _ => None,
        };
        let placed = Stack::new().gap(5.0).arrange_with(Size::new(80.0, 400.0), &ids(&[1, 2, 3]), lookup);
        assert_eq!(placed[0].frame, Frame::new(0.0, 0.0, 80.0, 30.0));
        assert_eq!(placed[1].frame, Frame::new(0.0, 35.0, 80.0, 0.0));
        assert_eq!(placed[2].frame, Frame::new(0.0, 40.0, 80.0, 0.0));
    }

    #[test]
    fn single_node_without_header_gets_everything() {
        let placed = Stack::new().arrange(Size::new(100.0, 50.0), &ids(&[9]), &MeasureCache::new());
        assert_eq!(placed[0].frame, Frame::from_size(100.0, 50.0));
    }

    #[test]
    fn many_nodes_stack_with_measured_heights_and_gap() {
        let mut cache = MeasureCache::new();
        cache.record(NodeId::new(1), 40.0);
        cache.record(NodeId::new(2), 60.0);
        let stack = Stack::new().gap(8.0);
        let placed = stack.arrange(Size::new(300.0, 500.0), &ids(&[1, 2, 3]), &cache);
        let frames: Vec<Frame> = placed.iter().map(|p| p.frame).collect();
        assert_eq!(
            frames,
            vec![
                Frame::new(0.0, 0.0, 300.0, 40.0),
                Frame::new(0.0, 48.0, 300.0, 60.0),
                Frame::new(0.0, 116.0, 300.0, 0.0),
            ]
        );
    }

    #[test]
    fn stacking_starts_below_header() {
        let mut cache = MeasureCache::new();
        cache.record(NodeId::new(1), 10.0);
        cache.record(NodeId::new(2), 10.0);
        let placed = Stack::new()
            .header(Some(56.0))
            .arrange(Size::new(200.0, 400.0), &ids(&[2, 1]), &cache);
        assert_eq!(placed[0].node, NodeId::new(2));
        assert_eq!(placed[0].frame.y, 56.0);
        assert_eq!(placed[1].frame.y, 66.0);
    }

    #[test]
    fn invalid_header_and_gap_are_ignored() {
        let stack = Stack::new().header(Some(f64::NAN)).gap(-4.0);
        assert_eq!(stack, Stack::new());
    }

    #[test]
    fn empty_content_places_nothing() {
        assert!(
            Stack::new()
                .arrange(Size::new(10.0, 10.0), &[], &MeasureCache::new())
                .is_empty()
        );
    }
}
