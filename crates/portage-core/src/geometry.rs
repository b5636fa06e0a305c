#![forbid(unsafe_code)]

//! Geometric primitives.

use serde::{Deserialize, Serialize};

/// A frame in host points, relative to the owning container.
///
/// Frames come from the external layout engine, so components are `f64` and
/// may be fractional. Negative sizes are never produced by Portage; values fed
/// in from outside are clamped by the constructors.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Frame {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width in points.
    pub width: f64,
    /// Height in points.
    pub height: f64,
}

impl Frame {
    /// Create a new frame. Negative or non-finite sizes clamp to zero.
    #[inline]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width: sanitize_extent(width),
            height: sanitize_extent(height),
        }
    }

    /// Create a frame at the origin with the given size.
    #[inline]
    pub fn from_size(width: f64, height: f64) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    /// Bottom edge (exclusive).
    #[inline]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Right edge (exclusive).
    #[inline]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Size of the frame.
    #[inline]
    pub fn size(&self) -> Size {
        Size {
            width: self.width,
            height: self.height,
        }
    }

    /// Check if the frame has zero area.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Remove a band of `amount` points from the top of the frame.
    ///
    /// The band is clamped to the frame height, so the result is never
    /// negative.
    pub fn inset_top(&self, amount: f64) -> Frame {
        let amount = sanitize_extent(amount).min(self.height);
        Frame {
            x: self.x,
            y: self.y + amount,
            width: self.width,
            height: self.height - amount,
        }
    }
}

/// A width/height pair.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    #[inline]
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width: sanitize_extent(width),
            height: sanitize_extent(height),
        }
    }
}

fn sanitize_extent(value: f64) -> f64 {
    if value.is_finite() { value.max(0.0) } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_and_nan_extents_clamp_to_zero() {
        let frame = Frame::new(1.0, 2.0, -5.0, f64::NAN);
        assert_eq!(frame.width, 0.0);
        assert_eq!(frame.height, 0.0);
        assert!(frame.is_empty());
    }

    #[test]
    fn inset_top_moves_origin_and_shrinks() {
        let frame = Frame::new(0.0, 10.0, 320.0, 480.0);
        let inner = frame.inset_top(56.0);
        assert_eq!(inner.y, 66.0);
        assert_eq!(inner.height, 424.0);
        assert_eq!(inner.width, 320.0);
        assert_eq!(inner.bottom(), frame.bottom());
    }

    #[test]
    fn inset_top_clamps_to_height() {
        let frame = Frame::from_size(100.0, 20.0);
        let inner = frame.inset_top(50.0);
        assert_eq!(inner.height, 0.0);
        assert_eq!(inner.y, 20.0);
    }

    #[test]
    fn edges_and_size() {
        let frame = Frame::new(5.0, 6.0, 10.0, 20.0);
        assert_eq!(frame.right(), 15.0);
        assert_eq!(frame.bottom(), 26.0);
        assert_eq!(frame.size(), Size::new(10.0, 20.0));
    }
}
