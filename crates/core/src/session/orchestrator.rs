//! The session actor.
//!
//! All state transitions happen on one task that drains an unbounded inbox,
//! one message at a time. UI commands, captured credentials, capture timeouts,
//! and process exits are all inbox messages, so a transition and every native
//! call it makes finish before the next message is looked at.
//!
//! Background producers (the interceptor callback, the capture timer, process
//! watchers) hold weak senders. Once every [`crate::Shell`] clone is dropped the
//! inbox closes and the actor tears down whatever it still owns.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use hs_protocol::{LogLevel, Status, StatusPayload};
use hs_runtime::{DiagnosticBus, EmbeddedWindowHandle, ExitInfo, ProcessHandle, ProcessManager, WindowEmbedder};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::machine::{Event, next_status};
use crate::bounds::BoundsSync;
use crate::capture::{CaptureInterceptor, LaunchCredential};
use crate::client::resolve_client_path;
use crate::config::ShellConfig;
use crate::dispatch::panic_detail;
use crate::error::{Result, ShellError};
use crate::view::{BrowserView, ViewError};

const SOURCE: &str = "session";

/// UI commands the actor executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
	ArmCapture,
	CancelCapture,
	ResetToLogin,
	Stop,
	Restart,
	SwitchContext,
}

pub(crate) enum Inbox {
	Command {
		command: Command,
		reply: oneshot::Sender<Result<StatusPayload>>,
	},
	CredentialCaptured {
		generation: u64,
		credential: LaunchCredential,
	},
	CaptureTimedOut {
		generation: u64,
	},
	ProcessExited(ExitInfo),
	Shutdown {
		reply: oneshot::Sender<()>,
	},
}

/// Sends into the inbox if the actor is still running.
pub(crate) fn post(inbox: &mpsc::WeakUnboundedSender<Inbox>, message: Inbox) {
	if let Some(sender) = inbox.upgrade() {
		let _ = sender.send(message);
	}
}

/// Client process and window owned by a running session.
struct Launched {
	process: ProcessHandle,
	window: EmbeddedWindowHandle,
	watcher: JoinHandle<()>,
}

struct Session {
	status: Status,
	message: Option<String>,
	credential: Option<LaunchCredential>,
	capture_generation: Option<u64>,
	capture_timer: Option<JoinHandle<()>>,
	launched: Option<Launched>,
}

impl Session {
	fn new() -> Self {
		Self {
			status: Status::Login,
			message: None,
			credential: None,
			capture_generation: None,
			capture_timer: None,
			launched: None,
		}
	}
}

pub(crate) struct Collaborators {
	pub config: Arc<ShellConfig>,
	pub view: Arc<dyn BrowserView>,
	pub interceptor: Arc<CaptureInterceptor>,
	pub processes: ProcessManager,
	pub embedder: Arc<WindowEmbedder>,
	pub bounds: Arc<BoundsSync>,
	pub bus: Arc<DiagnosticBus>,
	pub status: watch::Sender<StatusPayload>,
	pub events: broadcast::Sender<StatusPayload>,
	pub inbox: mpsc::WeakUnboundedSender<Inbox>,
}

pub(crate) struct Orchestrator {
	deps: Collaborators,
	session: Session,
}

impl Orchestrator {
	pub(crate) fn new(deps: Collaborators) -> Self {
		Self {
			deps,
			session: Session::new(),
		}
	}

	pub(crate) async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Inbox>) {
		debug!(target: "hs.session", "session actor started");
		while let Some(message) = inbox.recv().await {
			match message {
				Inbox::Shutdown { reply } => {
					self.teardown().await;
					let _ = reply.send(());
					break;
				}
				Inbox::Command { command, reply } => {
					let outcome = AssertUnwindSafe(self.handle_command(command)).catch_unwind().await;
					let result = match outcome {
						Ok(result) => result,
						Err(payload) => Err(self.fault(panic_detail(payload.as_ref())).await),
					};
					let _ = reply.send(result);
				}
				event => {
					let outcome = AssertUnwindSafe(self.handle_event(event)).catch_unwind().await;
					if let Err(payload) = outcome {
						self.fault(panic_detail(payload.as_ref())).await;
					}
				}
			}
		}
		self.teardown().await;
		debug!(target: "hs.session", "session actor stopped");
	}

	async fn handle_command(&mut self, command: Command) -> Result<StatusPayload> {
		match command {
			Command::ArmCapture => self.arm_capture(),
			Command::CancelCapture => self.cancel_capture(),
			Command::ResetToLogin => self.reset_to_login().await,
			Command::Stop => self.stop().await,
			Command::Restart => self.restart().await,
			Command::SwitchContext => match self.session.status {
				Status::Running => self.restart().await,
				_ => self.reset_to_login().await,
			},
		}
	}

	async fn handle_event(&mut self, event: Inbox) {
		match event {
			Inbox::CredentialCaptured { generation, credential } => self.credential_captured(generation, credential).await,
			Inbox::CaptureTimedOut { generation } => self.capture_timed_out(generation),
			Inbox::ProcessExited(info) => self.process_exited(info),
			Inbox::Command { .. } | Inbox::Shutdown { .. } => {}
		}
	}

	fn current(&self) -> StatusPayload {
		StatusPayload::new(self.session.status, self.session.message.clone())
	}

	/// Validates `event` against the table without changing anything.
	fn check(&self, event: Event) -> Result<Status> {
		let from = self.session.status;
		next_status(from, event).ok_or_else(|| {
			let err = ShellError::InvalidTransition {
				from,
				event: event.describe(),
			};
			self.deps.bus.log(LogLevel::Warn, SOURCE, format!("rejected: {err}"));
			err
		})
	}

	fn transition(&mut self, event: Event, message: Option<String>) -> Result<StatusPayload> {
		let to = self.check(event)?;
		Ok(self.enter(to, message))
	}

	/// Sets the status and publishes exactly one notification.
	fn enter(&mut self, to: Status, message: Option<String>) -> StatusPayload {
		let from = self.session.status;
		let message = match to {
			Status::Error => Some(message.filter(|text| !text.trim().is_empty()).unwrap_or_else(|| "unknown error".to_string())),
			_ => message,
		};
		if to == Status::Login {
			self.session.credential = None;
		}
		self.session.status = to;
		self.session.message = message.clone();

		let payload = StatusPayload::new(to, message);
		info!(target: "hs.session", %from, %to, "status changed");
		let (level, text) = match &payload.message {
			Some(message) if to == Status::Error => (LogLevel::Error, format!("{from} -> {to}: {message}")),
			_ => (LogLevel::Info, format!("{from} -> {to}")),
		};
		self.deps.bus.push(hs_protocol::LogEvent::new(level, SOURCE, text));
		self.deps.status.send_replace(payload.clone());
		let _ = self.deps.events.send(payload.clone());
		payload
	}

	/// Converts a caught panic into an Error transition.
	///
	/// The interrupted handler may have left a client running or a window
	/// attached without recording either, so everything is released first.
	async fn fault(&mut self, detail: String) -> ShellError {
		let err = ShellError::Faulted(detail);
		warn!(target: "hs.session", error = %err, "transition handler faulted");
		self.end_capture();
		if let Err(payload) = AssertUnwindSafe(self.release_all()).catch_unwind().await {
			warn!(target: "hs.session", detail = %panic_detail(payload.as_ref()), "cleanup after fault failed");
		}
		self.enter(Status::Error, Some(err.to_string()));
		err
	}

	fn view_call(&self, action: &str, call: impl FnOnce(&dyn BrowserView) -> std::result::Result<(), ViewError>) {
		if let Err(err) = call(self.deps.view.as_ref()) {
			self.deps.bus.log(LogLevel::Warn, SOURCE, format!("browser view {action} failed: {err}"));
		}
	}

	fn arm_capture(&mut self) -> Result<StatusPayload> {
		if self.session.status == Status::Capturing {
			return Ok(self.current());
		}
		self.check(Event::CaptureStart)?;
		let generation = self.deps.interceptor.arm();
		self.session.capture_generation = Some(generation);
		self.start_capture_timer(generation);
		self.view_call("show", |view| view.show());
		self.transition(Event::CaptureStart, None)
	}

	fn start_capture_timer(&mut self, generation: u64) {
		if let Some(timer) = self.session.capture_timer.take() {
			timer.abort();
		}
		let timeout = self.deps.config.capture.timeout();
		if timeout.is_zero() {
			return;
		}
		let inbox = self.deps.inbox.clone();
		self.session.capture_timer = Some(tokio::spawn(async move {
			tokio::time::sleep(timeout).await;
			post(&inbox, Inbox::CaptureTimedOut { generation });
		}));
	}

	fn end_capture(&mut self) {
		self.deps.interceptor.disarm();
		self.session.capture_generation = None;
		if let Some(timer) = self.session.capture_timer.take() {
			timer.abort();
		}
	}

	fn cancel_capture(&mut self) -> Result<StatusPayload> {
		self.check(Event::CancelRequested)?;
		self.end_capture();
		self.view_call("show", |view| view.show());
		self.transition(Event::CancelRequested, None)
	}

	async fn reset_to_login(&mut self) -> Result<StatusPayload> {
		match self.session.status {
			Status::Login => Ok(self.current()),
			Status::Capturing => {
				self.cancel_capture()?;
				self.rearm()
			}
			Status::Running => self.stop().await,
			Status::Error => self.relogin().await,
			Status::FoundValue | Status::Launching => self.transition(Event::ReloginRequested, None),
		}
	}

	async fn stop(&mut self) -> Result<StatusPayload> {
		self.check(Event::StopRequested)?;
		self.teardown_launched().await;
		self.view_call("show", |view| view.show());
		self.transition(Event::StopRequested, None)?;
		self.rearm()
	}

	async fn relogin(&mut self) -> Result<StatusPayload> {
		self.check(Event::ReloginRequested)?;
		self.teardown_launched().await;
		self.view_call("show", |view| view.show());
		self.transition(Event::ReloginRequested, None)?;
		self.rearm()
	}

	/// Sends the view back to the login page and, if configured, arms capture again.
	fn rearm(&mut self) -> Result<StatusPayload> {
		let login_url = self.deps.config.capture.login_url.clone();
		self.view_call("navigate", |view| view.navigate(&login_url));
		self.deps.embedder.raise_above_host();
		if self.deps.config.capture.rearm_on_reset {
			self.arm_capture()
		} else {
			Ok(self.current())
		}
	}

	async fn restart(&mut self) -> Result<StatusPayload> {
		self.check(Event::RestartRequested)?;
		if self.session.capture_generation.is_some() {
			self.end_capture();
		}
		self.teardown_launched().await;
		self.transition(Event::RestartRequested, None)?;
		self.launch().await
	}

	async fn credential_captured(&mut self, generation: u64, credential: LaunchCredential) {
		if self.session.status != Status::Capturing || self.session.capture_generation != Some(generation) {
			debug!(target: "hs.session", generation, status = %self.session.status, "dropping stale credential");
			return;
		}
		if self.deps.config.capture.log_field_names {
			self.deps.bus.log(LogLevel::Debug, SOURCE, format!("captured fields: {}", credential.field_names().join(", ")));
		}
		self.end_capture();
		self.session.credential = Some(credential);
		if self.transition(Event::CredentialFound, None).is_err() {
			return;
		}
		if self.transition(Event::LaunchRequested, None).is_err() {
			return;
		}
		if let Err(err) = self.launch().await {
			debug!(target: "hs.session", error = %err, "automatic launch failed");
		}
	}

	/// Runs the Launching path. The session must already be in Launching.
	async fn launch(&mut self) -> Result<StatusPayload> {
		match self.start_client().await {
			Ok(launched) => {
				self.session.launched = Some(launched);
				self.transition(Event::LaunchSucceeded, None)
			}
			Err(err) => {
				self.view_call("show", |view| view.show());
				self.transition(Event::LaunchFailed, Some(err.to_string()))?;
				Err(err)
			}
		}
	}

	async fn start_client(&self) -> Result<Launched> {
		let credential = self
			.session
			.credential
			.clone()
			.ok_or_else(|| ShellError::SpawnFailed("no launch credential available".to_string()))?;
		let client = &self.deps.config.client;
		self.view_call("hide", |view| view.hide());

		let program = resolve_client_path(client)?;
		let args = credential.launch_arguments(client);
		let process = self.deps.processes.start(&program, &args)?;

		let processes = self.deps.processes.clone();
		let alive = move || processes.is_alive(process);
		let rect = self.deps.bounds.current_physical();
		let window = match self.deps.embedder.attach(process.pid(), rect, &alive).await {
			Ok(window) => window,
			Err(err) => {
				self.deps.processes.stop(process).await;
				return Err(err.into());
			}
		};
		self.deps.embedder.raise_above_host();

		let inbox = self.deps.inbox.clone();
		let watcher = self.deps.processes.on_exit(process, move |info| post(&inbox, Inbox::ProcessExited(info)));
		Ok(Launched { process, window, watcher })
	}

	/// Stops the client and releases its window. Safe to call with nothing launched.
	async fn teardown_launched(&mut self) {
		let Some(launched) = self.session.launched.take() else {
			return;
		};
		launched.watcher.abort();
		self.deps.processes.stop(launched.process).await;
		self.deps.embedder.detach(launched.window);
	}

	fn process_exited(&mut self, info: ExitInfo) {
		let current = self.session.launched.as_ref().map(|launched| launched.process);
		if self.session.status != Status::Running || current != Some(info.handle) {
			debug!(target: "hs.session", pid = info.handle.pid(), "ignoring exit of a process no longer tracked");
			return;
		}
		if let Some(launched) = self.session.launched.take() {
			self.deps.embedder.detach(launched.window);
		}
		let err = ShellError::UnexpectedExit(info.describe());
		let _ = self.transition(Event::ProcessExited, Some(err.to_string()));
	}

	fn capture_timed_out(&mut self, generation: u64) {
		if self.session.status != Status::Capturing || self.session.capture_generation != Some(generation) {
			return;
		}
		self.end_capture();
		let message = format!("Login timed out ({}s). Please retry.", self.deps.config.capture.timeout_secs);
		let _ = self.transition(Event::Failure, Some(message));
	}

	/// Stops every client process and releases any embedded window, tracked or not.
	async fn release_all(&mut self) {
		self.teardown_launched().await;
		self.deps.processes.stop_all().await;
		if let Some(handle) = self.deps.embedder.current() {
			self.deps.embedder.detach(handle);
		}
	}

	async fn teardown(&mut self) {
		self.end_capture();
		self.release_all().await;
	}
}
