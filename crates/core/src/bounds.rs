//! Keeps the embedded window on top of the UI's game region.
//!
//! Layout changes arrive as logical rects at any time, independent of the
//! session actor. They are scaled here, and only here, before reaching the
//! window embedder.

use std::sync::Arc;

use hs_protocol::{LogicalRect, PhysicalRect};
use hs_runtime::WindowEmbedder;
use parking_lot::Mutex;
use tracing::{trace, warn};

struct BoundsState {
	scale: f64,
	game: Option<LogicalRect>,
}

pub struct BoundsSync {
	embedder: Arc<WindowEmbedder>,
	state: Mutex<BoundsState>,
}

impl BoundsSync {
	pub fn new(embedder: Arc<WindowEmbedder>, scale: f64) -> Self {
		let scale = if valid_scale(scale) { scale } else { 1.0 };
		Self {
			embedder,
			state: Mutex::new(BoundsState { scale, game: None }),
		}
	}

	pub fn scale_factor(&self) -> f64 {
		self.state.lock().scale
	}

	/// Records the game region and moves the embedded window onto it.
	///
	/// Returns the physical rect, or `None` if the input was not finite.
	/// With nothing attached the rect is still remembered for the next attach.
	pub fn sync_game_region(&self, rect: LogicalRect) -> Option<PhysicalRect> {
		if !rect.is_finite() {
			warn!(target: "hs.session", ?rect, "ignoring non-finite game region");
			return None;
		}
		let scale = {
			let mut state = self.state.lock();
			state.game = Some(rect);
			state.scale
		};
		let physical = rect.to_physical(scale);
		let moved = self.embedder.resize_current(physical);
		trace!(target: "hs.session", ?physical, moved, "game region synced");
		Some(physical)
	}

	/// Changes the logical-to-physical scale and re-applies the last game region.
	pub fn set_scale_factor(&self, scale: f64) -> Option<PhysicalRect> {
		if !valid_scale(scale) {
			warn!(target: "hs.session", scale, "ignoring invalid scale factor");
			return None;
		}
		let game = {
			let mut state = self.state.lock();
			state.scale = scale;
			state.game
		};
		let physical = game?.to_physical(scale);
		self.embedder.resize_current(physical);
		Some(physical)
	}

	/// Game region in physical units at the current scale.
	pub fn current_physical(&self) -> Option<PhysicalRect> {
		let state = self.state.lock();
		state.game.map(|rect| rect.to_physical(state.scale))
	}
}

fn valid_scale(scale: f64) -> bool {
	scale.is_finite() && scale > 0.0
}
