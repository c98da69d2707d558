//! The UI-facing facade.

use std::sync::Arc;

use hs_protocol::{LogLevel, LogicalRect, NetworkResponse, PhysicalRect, StatusPayload};
use hs_runtime::embed::default_backend;
use hs_runtime::{DiagnosticBus, NativeWindow, ProcessManager, WindowBackend, WindowEmbedder};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::bounds::BoundsSync;
use crate::capture::{CaptureInterceptor, CaptureOutcome, ParseFailure};
use crate::config::ShellConfig;
use crate::dispatch::{CommandError, Dispatcher};
use crate::error::{Result, ShellError};
use crate::session::orchestrator::{Collaborators, Command, Inbox, Orchestrator, post};
use crate::view::BrowserView;

const STATUS_CHANNEL_CAPACITY: usize = 64;

/// Result of a UI command.
pub type CommandResult<T = StatusPayload> = std::result::Result<T, CommandError>;

/// Configures and starts a [`Shell`].
pub struct ShellBuilder {
	config: ShellConfig,
	view: Arc<dyn BrowserView>,
	backend: Option<Arc<dyn WindowBackend>>,
	host_window: Option<NativeWindow>,
	bus: Option<Arc<DiagnosticBus>>,
	scale_factor: f64,
}

impl ShellBuilder {
	pub fn new(config: ShellConfig, view: Arc<dyn BrowserView>) -> Self {
		Self {
			config,
			view,
			backend: None,
			host_window: None,
			bus: None,
			scale_factor: 1.0,
		}
	}

	/// Window backend; defaults to the platform backend.
	pub fn window_backend(mut self, backend: Arc<dyn WindowBackend>) -> Self {
		self.backend = Some(backend);
		self
	}

	/// Native handle of the host window the client is embedded into.
	pub fn host_window(mut self, host: NativeWindow) -> Self {
		self.host_window = Some(host);
		self
	}

	/// Shares an existing diagnostic bus instead of creating one from config.
	pub fn bus(mut self, bus: Arc<DiagnosticBus>) -> Self {
		self.bus = Some(bus);
		self
	}

	pub fn scale_factor(mut self, scale: f64) -> Self {
		self.scale_factor = scale;
		self
	}

	/// Starts the session actor. Must be called from within a Tokio runtime.
	pub fn spawn(self) -> Result<Shell> {
		let config = Arc::new(self.config);
		let bus = self
			.bus
			.unwrap_or_else(|| Arc::new(DiagnosticBus::new(config.bus.queue_capacity, config.bus.history_capacity)));

		let embedder = Arc::new(WindowEmbedder::new(self.backend.unwrap_or_else(default_backend), config.embed.policy()));
		if let Some(host) = self.host_window {
			embedder.set_host_window(host);
		}
		let bounds = Arc::new(BoundsSync::new(Arc::clone(&embedder), self.scale_factor));
		let processes = ProcessManager::new(config.process.stop_grace(), config.process.exit_poll());

		let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
		let weak_inbox = inbox_tx.downgrade();
		let interceptor = {
			let inbox = inbox_tx.downgrade();
			Arc::new(CaptureInterceptor::new(&config.capture, move |generation, credential| {
				post(&inbox, Inbox::CredentialCaptured { generation, credential });
			})?)
		};

		let (status_tx, status_rx) = watch::channel(StatusPayload::login());
		let (events_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);

		let orchestrator = Orchestrator::new(Collaborators {
			config: Arc::clone(&config),
			view: Arc::clone(&self.view),
			interceptor: Arc::clone(&interceptor),
			processes,
			embedder: Arc::clone(&embedder),
			bounds: Arc::clone(&bounds),
			bus: Arc::clone(&bus),
			status: status_tx,
			events: events_tx.clone(),
			inbox: weak_inbox,
		});
		let actor = tokio::spawn(orchestrator.run(inbox_rx));
		debug!(target: "hs.session", "shell started");

		Ok(Shell {
			inner: Arc::new(ShellInner {
				dispatcher: Dispatcher::new(Arc::clone(&bus)),
				config,
				inbox: inbox_tx,
				interceptor,
				view: self.view,
				bounds,
				embedder,
				bus,
				status: status_rx,
				events: events_tx,
				actor: Mutex::new(Some(actor)),
			}),
		})
	}
}

/// Handle to the single process-wide session.
///
/// Cheap to clone. The session lives until [`Shell::shutdown`] is called or
/// the last clone is dropped.
#[derive(Clone)]
pub struct Shell {
	inner: Arc<ShellInner>,
}

struct ShellInner {
	config: Arc<ShellConfig>,
	inbox: mpsc::UnboundedSender<Inbox>,
	dispatcher: Dispatcher,
	interceptor: Arc<CaptureInterceptor>,
	view: Arc<dyn BrowserView>,
	bounds: Arc<BoundsSync>,
	embedder: Arc<WindowEmbedder>,
	bus: Arc<DiagnosticBus>,
	status: watch::Receiver<StatusPayload>,
	events: broadcast::Sender<StatusPayload>,
	actor: Mutex<Option<JoinHandle<()>>>,
}

impl Shell {
	pub fn builder(config: ShellConfig, view: Arc<dyn BrowserView>) -> ShellBuilder {
		ShellBuilder::new(config, view)
	}

	pub fn config(&self) -> &ShellConfig {
		&self.inner.config
	}

	pub fn bus(&self) -> &Arc<DiagnosticBus> {
		&self.inner.bus
	}

	/// Latest published status.
	pub fn status(&self) -> StatusPayload {
		self.inner.status.borrow().clone()
	}

	/// Receiver that always holds the latest status.
	pub fn watch_status(&self) -> watch::Receiver<StatusPayload> {
		self.inner.status.clone()
	}

	/// Every notification published from now on, in order.
	pub fn subscribe(&self) -> broadcast::Receiver<StatusPayload> {
		self.inner.events.subscribe()
	}

	async fn command(&self, name: &'static str, command: Command) -> CommandResult {
		let budget = self.inner.config.dispatch.budget(name);
		let inbox = self.inner.inbox.clone();
		self.inner
			.dispatcher
			.dispatch(name, budget, async move {
				let (reply, response) = oneshot::channel();
				inbox.send(Inbox::Command { command, reply }).map_err(|_| ShellError::Unavailable)?;
				response.await.map_err(|_| ShellError::Unavailable)?
			})
			.await
			.map_err(|failure| CommandError::from_failure(name, failure))
	}

	/// Login → Capturing. Already capturing is a no-op.
	pub async fn arm_capture(&self) -> CommandResult {
		self.command("arm_capture", Command::ArmCapture).await
	}

	/// Capturing → Login without re-arming.
	pub async fn cancel_capture(&self) -> CommandResult {
		self.command("cancel_capture", Command::CancelCapture).await
	}

	/// Returns to the login page from Capturing, Running, or Error.
	pub async fn reset_to_login(&self) -> CommandResult {
		self.command("reset_to_login", Command::ResetToLogin).await
	}

	/// Running → Login: stops the client and releases its window.
	pub async fn stop(&self) -> CommandResult {
		self.command("stop", Command::Stop).await
	}

	/// Tears down any running client and launches again with the last credential.
	pub async fn restart(&self) -> CommandResult {
		self.command("restart", Command::Restart).await
	}

	/// Restart when running, otherwise back to the login page.
	pub async fn switch_context(&self) -> CommandResult {
		self.command("switch_context", Command::SwitchContext).await
	}

	/// Lays out the browser view.
	pub fn set_host_region(&self, rect: LogicalRect) -> CommandResult<()> {
		let budget = self.inner.config.dispatch.budget("set_host_region");
		self.inner
			.dispatcher
			.dispatch_sync("set_host_region", budget, || self.inner.view.set_bounds(rect).map_err(ShellError::from))
			.map_err(|failure| CommandError::from_failure("set_host_region", failure))
	}

	/// Moves the embedded window onto `rect`. Accepted in every state.
	pub fn set_game_region(&self, rect: LogicalRect) -> CommandResult<Option<PhysicalRect>> {
		let budget = self.inner.config.dispatch.budget("set_game_region");
		self.inner
			.dispatcher
			.dispatch_sync("set_game_region", budget, || Ok::<_, ShellError>(self.inner.bounds.sync_game_region(rect)))
			.map_err(|failure| CommandError::from_failure("set_game_region", failure))
	}

	pub fn set_scale_factor(&self, scale: f64) -> CommandResult<Option<PhysicalRect>> {
		let budget = self.inner.config.dispatch.budget("set_scale_factor");
		self.inner
			.dispatcher
			.dispatch_sync("set_scale_factor", budget, || Ok::<_, ShellError>(self.inner.bounds.set_scale_factor(scale)))
			.map_err(|failure| CommandError::from_failure("set_scale_factor", failure))
	}

	/// Call after the host window is shown or restored so the embedded window
	/// is drawn above the host's own surface.
	pub fn host_shown(&self) {
		self.inner.embedder.raise_above_host();
	}

	/// Feeds one response observed by the browser view to the capture interceptor.
	pub fn deliver_response(&self, response: &NetworkResponse) -> std::result::Result<CaptureOutcome, ParseFailure> {
		let outcome = self.inner.interceptor.observe(response);
		if let Err(err) = &outcome {
			let reason = match err {
				ParseFailure::MissingFields { missing } if !self.inner.config.capture.log_field_names => {
					format!("{} required field(s) missing", missing.len())
				}
				other => other.to_string(),
			};
			self.inner
				.bus
				.log(LogLevel::Warn, "capture", format!("login response rejected: {reason} ({})", response.redacted_url()));
		}
		outcome
	}

	/// Stops the client, releases its window, and ends the session actor.
	pub async fn shutdown(&self) {
		let (reply, done) = oneshot::channel();
		if self.inner.inbox.send(Inbox::Shutdown { reply }).is_ok() {
			let _ = done.await;
		}
		let actor = self.inner.actor.lock().take();
		if let Some(actor) = actor {
			if let Err(err) = actor.await {
				warn!(target: "hs.session", error = %err, "session actor ended abnormally");
			}
		}
	}
}
