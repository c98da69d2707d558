//! Embedding a foreign top-level window beneath the host window.
//!
//! [`WindowEmbedder`] is the only owner of the foreign window. Callers get an
//! opaque [`EmbeddedWindowHandle`]; the native handle never leaves this module.
//! Platform calls go through a [`WindowBackend`] so the embedder can run
//! against [`crate::testing::RecordingBackend`] or the headless backend.
//!
//! At most one window is attached at a time. Attach is atomic from the caller's
//! point of view: it returns a usable handle or nothing, and never leaves a
//! reparented window behind on failure.

mod headless;
#[cfg(windows)]
mod win32;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub use headless::HeadlessBackend;
use hs_protocol::PhysicalRect;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
#[cfg(windows)]
pub use win32::Win32Backend;

use crate::error::{Result, RuntimeError};

/// Raw native window identifier as the platform reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeWindow(pub isize);

/// Native windowing calls used by the embedder.
///
/// Implementations are expected to be thin wrappers over the platform API and
/// must tolerate being handed windows that no longer exist.
pub trait WindowBackend: Send + Sync {
	/// Top-level, unowned window created by `pid`, if any exists yet.
	fn find_process_window(&self, pid: u32) -> Option<NativeWindow>;

	/// Makes `child` a child window of `host`, returning the style it had before.
	fn reparent(&self, child: NativeWindow, host: NativeWindow) -> Result<isize>;

	/// Turns `child` back into a top-level window with `saved_style`.
	fn restore(&self, child: NativeWindow, saved_style: isize);

	fn is_window(&self, window: NativeWindow) -> bool;

	fn move_window(&self, window: NativeWindow, rect: PhysicalRect);

	/// Raises `window` to the top of its siblings' z-order.
	fn bring_to_top(&self, window: NativeWindow);
}

/// Backend for the current platform: Win32 on Windows, headless elsewhere.
pub fn default_backend() -> Arc<dyn WindowBackend> {
	#[cfg(windows)]
	{
		Arc::new(Win32Backend)
	}
	#[cfg(not(windows))]
	{
		Arc::new(HeadlessBackend)
	}
}

/// Opaque reference to the currently embedded window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EmbeddedWindowHandle {
	id: u64,
}

/// Retry budget for finding the client's window after the process starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachPolicy {
	pub attempts: u32,
	pub interval: Duration,
}

impl Default for AttachPolicy {
	fn default() -> Self {
		Self {
			attempts: 60,
			interval: Duration::from_millis(100),
		}
	}
}

impl AttachPolicy {
	/// Upper bound on how long an attach may poll.
	pub fn budget(&self) -> Duration {
		self.interval.checked_mul(self.attempts).unwrap_or(Duration::MAX)
	}
}

#[derive(Debug, Clone, Copy)]
struct Attached {
	handle: EmbeddedWindowHandle,
	window: NativeWindow,
	pid: u32,
	saved_style: isize,
}

#[derive(Default)]
struct Slot {
	attached: Option<Attached>,
	last_rect: Option<PhysicalRect>,
}

pub struct WindowEmbedder {
	backend: Arc<dyn WindowBackend>,
	host: Mutex<Option<NativeWindow>>,
	slot: Mutex<Slot>,
	next_id: AtomicU64,
	policy: AttachPolicy,
}

impl WindowEmbedder {
	pub fn new(backend: Arc<dyn WindowBackend>, policy: AttachPolicy) -> Self {
		Self {
			backend,
			host: Mutex::new(None),
			slot: Mutex::new(Slot::default()),
			next_id: AtomicU64::new(0),
			policy,
		}
	}

	/// Registers the host window the client window is embedded into.
	pub fn set_host_window(&self, host: NativeWindow) {
		*self.host.lock() = Some(host);
	}

	pub fn current(&self) -> Option<EmbeddedWindowHandle> {
		self.slot.lock().attached.map(|attached| attached.handle)
	}

	/// Polls for the window of `pid` and embeds it at `rect`.
	///
	/// When `rect` is `None` the last rect passed to [`Self::resize_current`]
	/// is used. Polling stops early once `still_alive` reports the process gone.
	pub async fn attach(&self, pid: u32, rect: Option<PhysicalRect>, still_alive: &(dyn Fn() -> bool + Send + Sync)) -> Result<EmbeddedWindowHandle> {
		if self.slot.lock().attached.is_some() {
			return Err(RuntimeError::AlreadyAttached);
		}
		let host = (*self.host.lock()).ok_or(RuntimeError::NoHostWindow)?;

		let window = self.wait_for_window(pid, still_alive).await?;
		let saved_style = self.backend.reparent(window, host).map_err(|err| RuntimeError::AttachFailed {
			pid,
			reason: err.to_string(),
		})?;

		let handle = EmbeddedWindowHandle {
			id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
		};
		let rect = {
			let mut slot = self.slot.lock();
			if slot.attached.is_some() {
				drop(slot);
				self.backend.restore(window, saved_style);
				return Err(RuntimeError::AlreadyAttached);
			}
			slot.attached = Some(Attached {
				handle,
				window,
				pid,
				saved_style,
			});
			rect.or(slot.last_rect)
		};

		let rollback = AttachRollback { embedder: self, handle };
		if let Some(rect) = rect.filter(|rect| !rect.is_empty()) {
			self.backend.move_window(window, rect);
		}
		self.backend.bring_to_top(window);
		std::mem::forget(rollback);
		info!(target: "hs.embed", pid, ?rect, "client window embedded");
		Ok(handle)
	}

	async fn wait_for_window(&self, pid: u32, still_alive: &(dyn Fn() -> bool + Send + Sync)) -> Result<NativeWindow> {
		let attempts = self.policy.attempts.max(1);
		for attempt in 1..=attempts {
			if let Some(window) = self.backend.find_process_window(pid) {
				debug!(target: "hs.embed", pid, attempt, "client window found");
				return Ok(window);
			}
			if !still_alive() {
				return Err(RuntimeError::AttachFailed {
					pid,
					reason: "process exited before creating a window".to_string(),
				});
			}
			if attempt < attempts {
				tokio::time::sleep(self.policy.interval).await;
			}
		}
		Err(RuntimeError::AttachFailed {
			pid,
			reason: format!("no window appeared after {attempts} attempts ({:?})", self.policy.budget()),
		})
	}

	/// Moves the window behind `handle`. Stale handles are ignored.
	///
	/// Returns `true` if a native move was issued.
	pub fn resize(&self, handle: EmbeddedWindowHandle, rect: PhysicalRect) -> bool {
		let window = {
			let mut slot = self.slot.lock();
			match slot.attached {
				Some(attached) if attached.handle == handle => {
					slot.last_rect = Some(rect);
					attached.window
				}
				_ => return false,
			}
		};
		self.apply_rect(window, rect)
	}

	/// Records `rect` as the embed region and moves the attached window, if any.
	pub fn resize_current(&self, rect: PhysicalRect) -> bool {
		let window = {
			let mut slot = self.slot.lock();
			slot.last_rect = Some(rect);
			slot.attached.map(|attached| attached.window)
		};
		match window {
			Some(window) => self.apply_rect(window, rect),
			None => false,
		}
	}

	fn apply_rect(&self, window: NativeWindow, rect: PhysicalRect) -> bool {
		if rect.is_empty() {
			debug!(target: "hs.embed", ?rect, "skipping move to empty rect");
			return false;
		}
		self.backend.move_window(window, rect);
		true
	}

	/// Releases the window behind `handle`, restoring it to a top-level window
	/// if it still exists.
	///
	/// Detaching a stale handle, or a window whose process already exited, is
	/// a no-op. Returns `true` if a window was released.
	pub fn detach(&self, handle: EmbeddedWindowHandle) -> bool {
		let attached = {
			let mut slot = self.slot.lock();
			match slot.attached {
				Some(attached) if attached.handle == handle => slot.attached.take(),
				_ => None,
			}
		};
		let Some(attached) = attached else {
			debug!(target: "hs.embed", ?handle, "detach ignored; handle not attached");
			return false;
		};
		if self.backend.is_window(attached.window) {
			self.backend.restore(attached.window, attached.saved_style);
			info!(target: "hs.embed", pid = attached.pid, "client window released");
		} else {
			debug!(target: "hs.embed", pid = attached.pid, "client window already gone");
		}
		true
	}

	/// Re-establishes the embedded window above the host's own surface.
	pub fn raise_above_host(&self) {
		let window = self.slot.lock().attached.map(|attached| attached.window);
		match window {
			Some(window) if self.backend.is_window(window) => self.backend.bring_to_top(window),
			Some(_) => warn!(target: "hs.embed", "attached window no longer exists"),
			None => {}
		}
	}
}

/// Releases a freshly attached window if a native call unwinds before attach returns.
struct AttachRollback<'a> {
	embedder: &'a WindowEmbedder,
	handle: EmbeddedWindowHandle,
}

impl Drop for AttachRollback<'_> {
	fn drop(&mut self) {
		warn!(target: "hs.embed", handle = ?self.handle, "attach interrupted; releasing window");
		self.embedder.detach(self.handle);
	}
}
