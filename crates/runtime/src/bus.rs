//! Process-wide diagnostic bus.
//!
//! Producers never wait: [`DiagnosticBus::push`] makes a single non-blocking
//! attempt at the buffer lock and drops the event when another thread holds it.
//! Every drop is counted in [`BusStats::dropped`]. Events that overflow the
//! pending queue evict the oldest entry and are counted in [`BusStats::evicted`].
//!
//! A forwarder task ([`spawn_forwarder`]) drains the pending queue in batches
//! and hands each batch to a sink after the lock has been released.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use hs_protocol::{LogEvent, LogLevel};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

pub const DEFAULT_QUEUE_CAPACITY: usize = 2000;
pub const DEFAULT_HISTORY_CAPACITY: usize = 500;
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(200);

/// Point-in-time counters for a [`DiagnosticBus`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
	/// Push attempts, including dropped ones.
	pub received: u64,
	/// Events lost because the buffer lock was contended.
	pub dropped: u64,
	/// Events pushed out of a full pending queue before being drained.
	pub evicted: u64,
	/// Events waiting for the forwarder.
	pub pending: usize,
	/// Events retained for replay.
	pub history: usize,
}

pub struct DiagnosticBus {
	state: Mutex<BusState>,
	received: AtomicU64,
	dropped: AtomicU64,
	evicted: AtomicU64,
}

struct BusState {
	pending: VecDeque<LogEvent>,
	queue_capacity: usize,
	history: VecDeque<LogEvent>,
	history_capacity: usize,
}

impl BusState {
	/// Appends to both rings. Returns `true` when a pending event was evicted.
	fn record(&mut self, event: LogEvent) -> bool {
		if self.history_capacity > 0 {
			if self.history.len() == self.history_capacity {
				self.history.pop_front();
			}
			self.history.push_back(event.clone());
		}

		let mut evicted = false;
		if self.pending.len() == self.queue_capacity {
			self.pending.pop_front();
			evicted = true;
		}
		if self.queue_capacity > 0 {
			self.pending.push_back(event);
		} else {
			evicted = true;
		}
		evicted
	}
}

impl Default for DiagnosticBus {
	fn default() -> Self {
		Self::new(DEFAULT_QUEUE_CAPACITY, DEFAULT_HISTORY_CAPACITY)
	}
}

impl DiagnosticBus {
	pub fn new(queue_capacity: usize, history_capacity: usize) -> Self {
		Self {
			state: Mutex::new(BusState {
				pending: VecDeque::with_capacity(queue_capacity.min(DEFAULT_QUEUE_CAPACITY)),
				queue_capacity,
				history: VecDeque::with_capacity(history_capacity.min(DEFAULT_HISTORY_CAPACITY)),
				history_capacity,
			}),
			received: AtomicU64::new(0),
			dropped: AtomicU64::new(0),
			evicted: AtomicU64::new(0),
		}
	}

	/// Records `event` without blocking.
	///
	/// Returns `false` if the event was dropped because the buffer was busy.
	pub fn push(&self, event: LogEvent) -> bool {
		self.received.fetch_add(1, Ordering::Relaxed);
		let Some(mut state) = self.state.try_lock() else {
			self.dropped.fetch_add(1, Ordering::Relaxed);
			return false;
		};
		if state.record(event) {
			self.evicted.fetch_add(1, Ordering::Relaxed);
		}
		true
	}

	/// Mirrors the line to `tracing` and pushes it onto the bus.
	pub fn log(&self, level: LogLevel, source: &str, text: impl Into<String>) -> bool {
		let text = text.into();
		match level {
			LogLevel::Error => error!(target: "hs.bus", source, "{text}"),
			LogLevel::Warn => warn!(target: "hs.bus", source, "{text}"),
			LogLevel::Info => info!(target: "hs.bus", source, "{text}"),
			LogLevel::Debug => debug!(target: "hs.bus", source, "{text}"),
			LogLevel::Trace => trace!(target: "hs.bus", source, "{text}"),
		}
		self.push(LogEvent::new(level, source, text))
	}

	/// Removes up to `max` pending events, oldest first.
	pub fn drain(&self, max: usize) -> Vec<LogEvent> {
		let mut state = self.state.lock();
		let take = max.min(state.pending.len());
		state.pending.drain(..take).collect()
	}

	/// The last `limit` events pushed, oldest first, whether drained or not.
	pub fn recent(&self, limit: usize) -> Vec<LogEvent> {
		let state = self.state.lock();
		let skip = state.history.len().saturating_sub(limit);
		state.history.iter().skip(skip).cloned().collect()
	}

	pub fn stats(&self) -> BusStats {
		let (pending, history) = {
			let state = self.state.lock();
			(state.pending.len(), state.history.len())
		};
		BusStats {
			received: self.received.load(Ordering::Relaxed),
			dropped: self.dropped.load(Ordering::Relaxed),
			evicted: self.evicted.load(Ordering::Relaxed),
			pending,
			history,
		}
	}

	#[cfg(test)]
	fn hold(&self) -> parking_lot::MutexGuard<'_, BusState> {
		self.state.lock()
	}
}

/// Forwards pending events to `sink` every `interval`, in batches of at most `batch_size`.
///
/// The task holds only a weak reference and exits at the first tick after the
/// bus is dropped.
pub fn spawn_forwarder<F>(bus: &Arc<DiagnosticBus>, interval: Duration, batch_size: usize, mut sink: F) -> JoinHandle<()>
where
	F: FnMut(Vec<LogEvent>) + Send + 'static,
{
	let bus: Weak<DiagnosticBus> = Arc::downgrade(bus);
	let batch_size = batch_size.max(1);
	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(interval);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
		loop {
			ticker.tick().await;
			let Some(bus) = bus.upgrade() else {
				debug!(target: "hs.bus", "bus dropped; forwarder exiting");
				return;
			};
			loop {
				let batch = bus.drain(batch_size);
				if batch.is_empty() {
					break;
				}
				let full = batch.len() == batch_size;
				sink(batch);
				if !full {
					break;
				}
			}
		}
	})
}
