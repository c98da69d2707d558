//! Headless session run.
//!
//! A saved login response stands in for the one the browser view would have
//! observed. Everything after delivery is the real session: the client is
//! started, attached, and kept until `--hold-secs` runs out or it exits.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use hostshell::{CaptureOutcome, Shell, ShellConfig};
use hs_protocol::{LogicalRect, NetworkResponse, Status, StatusPayload};
use hs_runtime::NativeWindow;
use hs_runtime::bus::spawn_forwarder;
use serde_json::json;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use crate::console::{ConsoleView, emit, log_line, status_line};

/// Slack on top of the attach budget for the session to settle after delivery.
const SETTLE_SLACK: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RunOptions {
	pub response: PathBuf,
	pub url: Option<String>,
	pub client: Option<PathBuf>,
	pub host_window: Option<isize>,
	pub scale: f64,
	pub game_rect: Option<LogicalRect>,
	pub hold_secs: u64,
}

pub async fn execute(mut config: ShellConfig, options: RunOptions) -> Result<()> {
	if let Some(client) = options.client.clone() {
		config.client.executable = Some(client);
	}
	let body = fs::read_to_string(&options.response).with_context(|| format!("failed to read {}", options.response.display()))?;
	let url = options.url.clone().unwrap_or_else(|| replay_url(&config.capture.endpoint_needle));
	let settle = config.embed.policy().budget().saturating_add(SETTLE_SLACK);

	let mut builder = Shell::builder(config, Arc::new(ConsoleView)).scale_factor(options.scale);
	if let Some(handle) = options.host_window {
		builder = builder.host_window(NativeWindow(handle));
	}
	let shell = builder.spawn()?;
	let bus_config = shell.config().bus.clone();
	let forwarder = spawn_forwarder(shell.bus(), bus_config.flush_interval(), bus_config.batch_size, |batch| {
		for event in &batch {
			emit(&log_line(event));
		}
	});
	let mut statuses = shell.subscribe();

	let outcome = drive(&shell, &mut statuses, &options, &body, &url, settle).await;

	shell.shutdown().await;
	forwarder.abort();
	for event in shell.bus().drain(usize::MAX) {
		emit(&log_line(&event));
	}
	while let Ok(payload) = statuses.try_recv() {
		emit(&status_line(&payload));
	}
	let last = shell.status();
	emit(&json!({ "type": "result", "status": last.status, "message": last.message }));
	outcome
}

async fn drive(
	shell: &Shell,
	statuses: &mut broadcast::Receiver<StatusPayload>,
	options: &RunOptions,
	body: &str,
	url: &str,
	settle: Duration,
) -> Result<()> {
	if let Some(rect) = options.game_rect {
		shell.set_game_region(rect)?;
	}
	shell.arm_capture().await?;

	let response = NetworkResponse::new(url, body);
	match shell.deliver_response(&response)? {
		CaptureOutcome::Captured { generation } => {
			info!(target: "hostshell", generation, "replayed response captured");
		}
		outcome => bail!("response at {} was not captured ({outcome:?})", response.redacted_url()),
	}

	let settled = tokio::time::timeout(settle, until_settled(statuses))
		.await
		.with_context(|| format!("session did not settle within {}s", settle.as_secs()))??;
	if settled.status == Status::Error {
		bail!("session failed: {}", settled.message.unwrap_or_default());
	}

	if options.hold_secs > 0 {
		hold(statuses, Duration::from_secs(options.hold_secs)).await?;
	}
	Ok(())
}

/// Echoes notifications until the session is Running or in Error.
async fn until_settled(statuses: &mut broadcast::Receiver<StatusPayload>) -> Result<StatusPayload> {
	loop {
		match statuses.recv().await {
			Ok(payload) => {
				emit(&status_line(&payload));
				if matches!(payload.status, Status::Running | Status::Error) {
					return Ok(payload);
				}
			}
			Err(RecvError::Lagged(missed)) => warn!(target: "hostshell", missed, "status notifications lagged"),
			Err(RecvError::Closed) => bail!("session ended before settling"),
		}
	}
}

/// Keeps the client running for `duration`, failing early if it exits.
async fn hold(statuses: &mut broadcast::Receiver<StatusPayload>, duration: Duration) -> Result<()> {
	let deadline = tokio::time::sleep(duration);
	tokio::pin!(deadline);
	loop {
		tokio::select! {
			_ = &mut deadline => return Ok(()),
			received = statuses.recv() => match received {
				Ok(payload) => {
					emit(&status_line(&payload));
					if payload.status == Status::Error {
						bail!("session failed: {}", payload.message.unwrap_or_default());
					}
				}
				Err(RecvError::Lagged(missed)) => warn!(target: "hostshell", missed, "status notifications lagged"),
				Err(RecvError::Closed) => return Ok(()),
			},
		}
	}
}

fn replay_url(endpoint_needle: &str) -> String {
	format!("https://replay.invalid/{}", endpoint_needle.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn replay_url_matches_endpoint() {
		let needle = ShellConfig::default().capture.endpoint_needle;
		assert!(replay_url(&needle).contains(&needle));
	}
}
