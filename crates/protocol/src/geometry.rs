//! Unit-tagged rectangles.
//!
//! UI layout produces [`LogicalRect`]s in device-independent units. Native
//! window calls take [`PhysicalRect`]s in device pixels. The only way from one
//! to the other is [`LogicalRect::to_physical`], which makes the scaling
//! boundary explicit at every call site.

use serde::{Deserialize, Serialize};

/// Rectangle in logical (UI) units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogicalRect {
	pub x: f64,
	pub y: f64,
	pub w: f64,
	pub h: f64,
}

/// Rectangle in physical (device pixel) units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhysicalRect {
	pub x: i32,
	pub y: i32,
	pub w: i32,
	pub h: i32,
}

impl LogicalRect {
	pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
		Self { x, y, w, h }
	}

	/// Scales into device pixels, rounding each edge to the nearest pixel.
	///
	/// Edges are rounded rather than the size so adjacent regions never leave
	/// a one-pixel seam between them.
	pub fn to_physical(self, scale: f64) -> PhysicalRect {
		let left = (self.x * scale).round();
		let top = (self.y * scale).round();
		let right = ((self.x + self.w) * scale).round();
		let bottom = ((self.y + self.h) * scale).round();
		PhysicalRect {
			x: left as i32,
			y: top as i32,
			w: (right - left).max(0.0) as i32,
			h: (bottom - top).max(0.0) as i32,
		}
	}

	pub fn is_finite(&self) -> bool {
		self.x.is_finite() && self.y.is_finite() && self.w.is_finite() && self.h.is_finite()
	}
}

impl PhysicalRect {
	pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
		Self { x, y, w, h }
	}

	/// A rect with no area cannot host a window.
	pub fn is_empty(&self) -> bool {
		self.w <= 0 || self.h <= 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn identity_scale_keeps_integral_rect() {
		let rect = LogicalRect::new(0.0, 36.0, 1280.0, 720.0).to_physical(1.0);
		assert_eq!(rect, PhysicalRect::new(0, 36, 1280, 720));
	}

	#[test]
	fn fractional_scale_rounds_edges() {
		let rect = LogicalRect::new(10.0, 10.0, 101.0, 51.0).to_physical(1.5);
		assert_eq!(rect, PhysicalRect::new(15, 15, 152, 76));
	}

	#[test]
	fn negative_size_collapses_to_empty() {
		let rect = LogicalRect::new(0.0, 0.0, -5.0, 10.0).to_physical(2.0);
		assert!(rect.is_empty());
	}
}
