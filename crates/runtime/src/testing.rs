//! Test doubles for the window backend.
//!
//! [`RecordingBackend`] keeps an in-memory window table and records every
//! mutating native call, so embedding behaviour can be asserted without a
//! window system.

use std::collections::{HashMap, HashSet};

use hs_protocol::PhysicalRect;
use parking_lot::Mutex;

use crate::embed::{NativeWindow, WindowBackend};
use crate::error::{Result, RuntimeError};

/// A mutating call observed by [`RecordingBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendOp {
	Reparent { window: NativeWindow, host: NativeWindow },
	Restore { window: NativeWindow },
	Move { window: NativeWindow, rect: PhysicalRect },
	BringToTop { window: NativeWindow },
}

pub struct RecordingBackend {
	state: Mutex<RecordingState>,
}

struct RecordingState {
	ops: Vec<BackendOp>,
	windows: HashMap<u32, NativeWindow>,
	destroyed: HashSet<NativeWindow>,
	polls: HashMap<u32, u32>,
	next_window: isize,
	create_windows: bool,
	window_delay: u32,
	fail_reparent: bool,
	crash_bring_to_top: bool,
	find_calls: usize,
}

impl Default for RecordingBackend {
	fn default() -> Self {
		Self::new()
	}
}

impl RecordingBackend {
	/// Every pid gets a window the first time it is looked up.
	pub fn new() -> Self {
		Self {
			state: Mutex::new(RecordingState {
				ops: Vec::new(),
				windows: HashMap::new(),
				destroyed: HashSet::new(),
				polls: HashMap::new(),
				next_window: 0x1000,
				create_windows: true,
				window_delay: 0,
				fail_reparent: false,
				crash_bring_to_top: false,
				find_calls: 0,
			}),
		}
	}

	/// No process ever shows a window.
	pub fn without_windows() -> Self {
		let backend = Self::new();
		backend.state.lock().create_windows = false;
		backend
	}

	/// A pid's window only appears after `polls` unsuccessful lookups.
	pub fn with_window_delay(self, polls: u32) -> Self {
		self.state.lock().window_delay = polls;
		self
	}

	pub fn fail_reparent(&self, fail: bool) {
		self.state.lock().fail_reparent = fail;
	}

	/// The next `bring_to_top` panics instead of recording, as a crashing native call would.
	pub fn crash_next_bring_to_top(&self) {
		self.state.lock().crash_bring_to_top = true;
	}

	/// Simulates the owning process closing `window`.
	pub fn destroy(&self, window: NativeWindow) {
		self.state.lock().destroyed.insert(window);
	}

	pub fn window_for(&self, pid: u32) -> Option<NativeWindow> {
		self.state.lock().windows.get(&pid).copied()
	}

	pub fn ops(&self) -> Vec<BackendOp> {
		self.state.lock().ops.clone()
	}

	pub fn moves(&self) -> Vec<PhysicalRect> {
		self.state
			.lock()
			.ops
			.iter()
			.filter_map(|op| match op {
				BackendOp::Move { rect, .. } => Some(*rect),
				_ => None,
			})
			.collect()
	}

	pub fn find_calls(&self) -> usize {
		self.state.lock().find_calls
	}

	pub fn clear(&self) {
		self.state.lock().ops.clear();
	}
}

impl WindowBackend for RecordingBackend {
	fn find_process_window(&self, pid: u32) -> Option<NativeWindow> {
		let mut state = self.state.lock();
		state.find_calls += 1;
		if let Some(window) = state.windows.get(&pid).copied() {
			return (!state.destroyed.contains(&window)).then_some(window);
		}
		if !state.create_windows {
			return None;
		}
		let delay = state.window_delay;
		let polls = state.polls.entry(pid).or_default();
		if *polls < delay {
			*polls += 1;
			return None;
		}
		state.next_window += 1;
		let window = NativeWindow(state.next_window);
		state.windows.insert(pid, window);
		Some(window)
	}

	fn reparent(&self, child: NativeWindow, host: NativeWindow) -> Result<isize> {
		let mut state = self.state.lock();
		if state.fail_reparent {
			return Err(RuntimeError::Backend("reparent rejected".to_string()));
		}
		state.ops.push(BackendOp::Reparent { window: child, host });
		Ok(0x14CF_0000)
	}

	fn restore(&self, child: NativeWindow, _saved_style: isize) {
		self.state.lock().ops.push(BackendOp::Restore { window: child });
	}

	fn is_window(&self, window: NativeWindow) -> bool {
		let state = self.state.lock();
		state.windows.values().any(|known| *known == window) && !state.destroyed.contains(&window)
	}

	fn move_window(&self, window: NativeWindow, rect: PhysicalRect) {
		self.state.lock().ops.push(BackendOp::Move { window, rect });
	}

	fn bring_to_top(&self, window: NativeWindow) {
		let mut state = self.state.lock();
		if std::mem::take(&mut state.crash_bring_to_top) {
			drop(state);
			panic!("native call crashed");
		}
		state.ops.push(BackendOp::BringToTop { window });
	}
}
