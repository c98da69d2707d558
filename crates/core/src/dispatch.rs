//! Command dispatch: sequencing, timing, and fault isolation.
//!
//! Every UI-invocable operation runs through [`Dispatcher`]. Each call gets a
//! sequence number, a start/end pair on the diagnostic bus, and a warning when
//! it overruns its budget. A panic inside the operation becomes
//! [`CommandFailure::Faulted`] instead of unwinding into the host.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use hs_protocol::LogLevel;
use hs_runtime::DiagnosticBus;
use serde::Serialize;
use thiserror::Error;
use tracing::{Instrument, debug, info_span, warn};

use crate::error::ShellError;

const SOURCE: &str = "dispatch";

/// One in-flight command.
#[derive(Debug, Clone)]
pub struct CommandInvocation {
	pub name: &'static str,
	pub sequence: u64,
	pub started: Instant,
}

/// Failure of a dispatched command.
#[derive(Debug)]
pub enum CommandFailure<E> {
	/// The operation returned an error.
	Failed { sequence: u64, error: E },
	/// The operation panicked.
	Faulted { sequence: u64, detail: String },
}

impl<E> CommandFailure<E> {
	pub fn sequence(&self) -> u64 {
		match self {
			CommandFailure::Failed { sequence, .. } | CommandFailure::Faulted { sequence, .. } => *sequence,
		}
	}
}

/// Structured failure string returned to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{command} #{sequence} failed ({kind}): {message}")]
pub struct CommandError {
	pub command: String,
	pub sequence: u64,
	pub kind: String,
	pub message: String,
}

impl CommandError {
	pub fn from_failure(command: &str, failure: CommandFailure<ShellError>) -> Self {
		match failure {
			CommandFailure::Failed { sequence, error } => Self {
				command: command.to_string(),
				sequence,
				kind: error.kind().to_string(),
				message: error.to_string(),
			},
			CommandFailure::Faulted { sequence, detail } => Self {
				command: command.to_string(),
				sequence,
				kind: "Faulted".to_string(),
				message: detail,
			},
		}
	}
}

pub struct Dispatcher {
	sequence: AtomicU64,
	bus: Arc<DiagnosticBus>,
}

impl Dispatcher {
	pub fn new(bus: Arc<DiagnosticBus>) -> Self {
		Self {
			sequence: AtomicU64::new(0),
			bus,
		}
	}

	fn begin(&self, name: &'static str) -> CommandInvocation {
		let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
		self.bus.log(LogLevel::Debug, SOURCE, format!("{name} #{sequence} started"));
		CommandInvocation {
			name,
			sequence,
			started: Instant::now(),
		}
	}

	/// Runs `operation` as command `name`, flagging it if it takes longer than `budget`.
	pub async fn dispatch<R, E, Fut>(&self, name: &'static str, budget: Duration, operation: Fut) -> Result<R, CommandFailure<E>>
	where
		Fut: Future<Output = Result<R, E>>,
		E: fmt::Display,
	{
		let invocation = self.begin(name);
		let span = info_span!(target: "hs.dispatch", "command", name, seq = invocation.sequence);
		let outcome = AssertUnwindSafe(operation).catch_unwind().instrument(span).await;
		self.finish(invocation, budget, outcome)
	}

	/// Synchronous counterpart of [`Self::dispatch`] for operations that never wait.
	pub fn dispatch_sync<R, E, F>(&self, name: &'static str, budget: Duration, operation: F) -> Result<R, CommandFailure<E>>
	where
		F: FnOnce() -> Result<R, E>,
		E: fmt::Display,
	{
		let invocation = self.begin(name);
		let span = info_span!(target: "hs.dispatch", "command", name, seq = invocation.sequence);
		let outcome = span.in_scope(|| panic::catch_unwind(AssertUnwindSafe(operation)));
		self.finish(invocation, budget, outcome)
	}

	fn finish<R, E: fmt::Display>(
		&self,
		invocation: CommandInvocation,
		budget: Duration,
		outcome: std::thread::Result<Result<R, E>>,
	) -> Result<R, CommandFailure<E>> {
		let CommandInvocation { name, sequence, started } = invocation;
		let elapsed = started.elapsed();
		let ms = elapsed.as_millis();

		let result = match outcome {
			Ok(Ok(value)) => {
				self.bus.log(LogLevel::Debug, SOURCE, format!("{name} #{sequence} ok in {ms}ms"));
				Ok(value)
			}
			Ok(Err(error)) => {
				self.bus.log(LogLevel::Warn, SOURCE, format!("{name} #{sequence} failed in {ms}ms: {error}"));
				Err(CommandFailure::Failed { sequence, error })
			}
			Err(payload) => {
				let detail = panic_detail(payload.as_ref());
				self.bus.log(LogLevel::Error, SOURCE, format!("{name} #{sequence} faulted in {ms}ms: {detail}"));
				Err(CommandFailure::Faulted { sequence, detail })
			}
		};

		if elapsed > budget {
			warn!(target: "hs.dispatch", name, sequence, elapsed_ms = ms as u64, budget_ms = budget.as_millis() as u64, "command over budget");
			self.bus.push(hs_protocol::LogEvent::new(
				LogLevel::Warn,
				SOURCE,
				format!("{name} #{sequence} slow: {ms}ms (budget {}ms)", budget.as_millis()),
			));
		} else {
			debug!(target: "hs.dispatch", name, sequence, elapsed_ms = ms as u64, "command finished");
		}
		result
	}
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_detail(payload: &(dyn Any + Send)) -> String {
	if let Some(text) = payload.downcast_ref::<&str>() {
		(*text).to_string()
	} else if let Some(text) = payload.downcast_ref::<String>() {
		text.clone()
	} else {
		"unknown panic".to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn dispatcher() -> (Dispatcher, Arc<DiagnosticBus>) {
		let bus = Arc::new(DiagnosticBus::new(256, 256));
		(Dispatcher::new(Arc::clone(&bus)), bus)
	}

	fn texts(bus: &DiagnosticBus) -> Vec<String> {
		bus.recent(256).into_iter().map(|event| event.text).collect()
	}

	#[tokio::test]
	async fn sequences_increase_per_call() {
		let (dispatcher, _) = dispatcher();
		let first = dispatcher.dispatch("stop", Duration::from_secs(1), async { Err::<(), _>("nope") }).await.unwrap_err();
		let second = dispatcher.dispatch_sync("stop", Duration::from_secs(1), || Err::<(), _>("nope")).unwrap_err();
		assert_eq!(first.sequence(), 1);
		assert_eq!(second.sequence(), 2);
	}

	#[tokio::test]
	async fn logs_start_and_end() {
		let (dispatcher, bus) = dispatcher();
		let value = dispatcher.dispatch("arm_capture", Duration::from_secs(1), async { Ok::<_, String>(7) }).await.unwrap();
		assert_eq!(value, 7);
		let lines = texts(&bus);
		assert_eq!(lines.len(), 2);
		assert!(lines[0].starts_with("arm_capture #1 started"));
		assert!(lines[1].starts_with("arm_capture #1 ok"));
	}

	#[tokio::test]
	async fn panic_becomes_faulted() {
		let (dispatcher, bus) = dispatcher();
		let failure = dispatcher
			.dispatch("restart", Duration::from_secs(1), async {
				if true {
					panic!("window vanished");
				}
				Ok::<(), String>(())
			})
			.await
			.unwrap_err();
		match failure {
			CommandFailure::Faulted { detail, .. } => assert_eq!(detail, "window vanished"),
			other => panic!("expected fault, got {other:?}"),
		}
		assert!(texts(&bus).iter().any(|line| line.contains("faulted")));

		// The dispatcher keeps working after a fault.
		assert!(dispatcher.dispatch_sync("stop", Duration::from_secs(1), || Ok::<_, String>(())).is_ok());
	}

	#[test]
	fn sync_panic_with_formatted_message() {
		let (dispatcher, _) = dispatcher();
		let failure = dispatcher
			.dispatch_sync("set_game_region", Duration::from_secs(1), || -> Result<(), String> { panic!("bad rect {}", 3) })
			.unwrap_err();
		assert!(matches!(failure, CommandFailure::Faulted { ref detail, .. } if detail == "bad rect 3"));
	}

	#[tokio::test]
	async fn slow_command_is_flagged_not_aborted() {
		let (dispatcher, bus) = dispatcher();
		let result = dispatcher
			.dispatch("restart", Duration::from_millis(5), async {
				tokio::time::sleep(Duration::from_millis(30)).await;
				Ok::<_, String>("done")
			})
			.await;
		assert_eq!(result.unwrap(), "done");
		assert!(texts(&bus).iter().any(|line| line.contains("slow") && line.contains("budget 5ms")));
	}

	#[test]
	fn command_error_carries_kind() {
		let failure = CommandFailure::Failed {
			sequence: 4,
			error: ShellError::SpawnFailed("no such file".to_string()),
		};
		let error = CommandError::from_failure("restart", failure);
		assert_eq!(error.kind, "SpawnFailed");
		assert_eq!(error.to_string(), "restart #4 failed (SpawnFailed): could not start client: no such file");
	}
}
