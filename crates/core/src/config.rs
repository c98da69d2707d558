//! Session configuration loaded from `config.json`.
//!
//! Every section and field is optional; anything absent takes the built-in
//! default. A missing file is the same as an empty one.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hs_runtime::AttachPolicy;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShellError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShellConfig {
	pub client: ClientConfig,
	pub capture: CaptureConfig,
	pub embed: EmbedConfig,
	pub process: ProcessConfig,
	pub bus: BusConfig,
	pub dispatch: DispatchConfig,
}

impl ShellConfig {
	/// Reads `path`, falling back to defaults when the file does not exist.
	pub fn load(path: &Path) -> Result<Self> {
		match fs::read_to_string(path) {
			Ok(content) => Self::from_json(&content).map_err(|err| ShellError::Config(format!("{}: {err}", path.display()))),
			Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
			Err(err) => Err(ShellError::Config(format!("{}: {err}", path.display()))),
		}
	}

	pub fn from_json(content: &str) -> Result<Self> {
		if content.trim().is_empty() {
			return Ok(Self::default());
		}
		serde_json::from_str(content).map_err(|err| ShellError::Config(err.to_string()))
	}
}

/// Where the client lives and how its launch URL is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
	/// Explicit client executable. Skips resource lookup when set.
	pub executable: Option<PathBuf>,
	/// File name searched for under `resources/` beside the running binary.
	pub executable_name: String,
	/// Base URL the captured query string is appended to.
	pub launch_url: String,
	/// Prefix the query with a time-derived key so caches never serve a stale entry.
	pub cache_bust: bool,
	/// Arguments placed before the launch URL.
	pub extra_args: Vec<String>,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			executable: None,
			executable_name: "projector.exe".to_string(),
			launch_url: "https://res.17roco.qq.com/main.swf".to_string(),
			cache_bust: true,
			extra_args: Vec::new(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureConfig {
	/// Substring a response URL must contain to be considered.
	pub endpoint_needle: String,
	/// Attribute holding the launch query string.
	pub attribute: String,
	/// Marker that starts the preferred search region of the response.
	pub scope_marker: String,
	pub required_fields: Vec<String>,
	/// Larger bodies are truncated before parsing.
	pub max_response_bytes: usize,
	pub timeout_secs: u64,
	/// Page the browser view returns to whenever the session resets.
	pub login_url: String,
	/// Arm capture again immediately after returning to Login.
	pub rearm_on_reset: bool,
	/// Log captured field names (never values) to the diagnostic bus.
	pub log_field_names: bool,
}

impl Default for CaptureConfig {
	fn default() -> Self {
		Self {
			endpoint_needle: "/fcgi-bin/login3".to_string(),
			attribute: "flashVars".to_string(),
			scope_marker: "function swf".to_string(),
			required_fields: vec!["config".to_string(), "angel_uin".to_string()],
			max_response_bytes: 1_500_000,
			timeout_secs: 180,
			login_url: "https://17roco.qq.com/login.html".to_string(),
			rearm_on_reset: true,
			log_field_names: false,
		}
	}
}

impl CaptureConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_secs)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbedConfig {
	pub attach_attempts: u32,
	pub attach_interval_ms: u64,
}

impl Default for EmbedConfig {
	fn default() -> Self {
		let policy = AttachPolicy::default();
		Self {
			attach_attempts: policy.attempts,
			attach_interval_ms: policy.interval.as_millis() as u64,
		}
	}
}

impl EmbedConfig {
	pub fn policy(&self) -> AttachPolicy {
		AttachPolicy {
			attempts: self.attach_attempts.max(1),
			interval: Duration::from_millis(self.attach_interval_ms),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessConfig {
	/// Wait after a termination request before the client is killed.
	pub stop_grace_ms: u64,
	pub exit_poll_ms: u64,
}

impl Default for ProcessConfig {
	fn default() -> Self {
		Self {
			stop_grace_ms: 1500,
			exit_poll_ms: 250,
		}
	}
}

impl ProcessConfig {
	pub fn stop_grace(&self) -> Duration {
		Duration::from_millis(self.stop_grace_ms)
	}

	pub fn exit_poll(&self) -> Duration {
		Duration::from_millis(self.exit_poll_ms)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusConfig {
	pub history_capacity: usize,
	pub queue_capacity: usize,
	pub batch_size: usize,
	pub flush_interval_ms: u64,
}

impl Default for BusConfig {
	fn default() -> Self {
		Self {
			history_capacity: hs_runtime::bus::DEFAULT_HISTORY_CAPACITY,
			queue_capacity: hs_runtime::bus::DEFAULT_QUEUE_CAPACITY,
			batch_size: hs_runtime::bus::DEFAULT_BATCH_SIZE,
			flush_interval_ms: hs_runtime::bus::DEFAULT_FLUSH_INTERVAL.as_millis() as u64,
		}
	}
}

impl BusConfig {
	pub fn flush_interval(&self) -> Duration {
		Duration::from_millis(self.flush_interval_ms.max(1))
	}
}

const DEFAULT_BUDGETS_MS: &[(&str, u64)] = &[
	("arm_capture", 500),
	("cancel_capture", 200),
	("reset_to_login", 1000),
	("stop", 500),
	("restart", 2000),
	("switch_context", 2000),
	("set_host_region", 50),
	("set_game_region", 50),
	("set_scale_factor", 50),
];

const FALLBACK_BUDGET_MS: u64 = 1000;

/// Per-command duration beyond which a dispatch is flagged as slow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatchConfig {
	/// Overrides keyed by command name.
	pub budgets_ms: HashMap<String, u64>,
}

impl DispatchConfig {
	pub fn budget(&self, command: &str) -> Duration {
		let ms = self.budgets_ms.get(command).copied().unwrap_or_else(|| {
			DEFAULT_BUDGETS_MS
				.iter()
				.find(|(name, _)| *name == command)
				.map_or(FALLBACK_BUDGET_MS, |(_, ms)| *ms)
		});
		Duration::from_millis(ms)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_file_yields_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let config = ShellConfig::load(&dir.path().join("config.json")).unwrap();
		assert_eq!(config, ShellConfig::default());
		assert_eq!(config.capture.required_fields, ["config", "angel_uin"]);
		assert_eq!(config.embed.policy(), AttachPolicy::default());
	}

	#[test]
	fn partial_file_overrides_only_named_fields() {
		let config = ShellConfig::from_json(r#"{ "capture": { "timeoutSecs": 5 }, "embed": { "attachAttempts": 3 } }"#).unwrap();
		assert_eq!(config.capture.timeout(), Duration::from_secs(5));
		assert_eq!(config.capture.endpoint_needle, "/fcgi-bin/login3");
		assert_eq!(config.embed.attach_attempts, 3);
		assert_eq!(config.embed.attach_interval_ms, 100);
	}

	#[test]
	fn malformed_file_is_config_error() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.json");
		fs::write(&path, "{ not json").unwrap();
		let err = ShellConfig::load(&path).unwrap_err();
		assert_eq!(err.kind(), "Config");
		assert!(err.to_string().contains("config.json"));
	}

	#[test]
	fn budgets_fall_back_to_builtin_table() {
		let mut dispatch = DispatchConfig::default();
		assert_eq!(dispatch.budget("restart"), Duration::from_millis(2000));
		assert_eq!(dispatch.budget("unknown"), Duration::from_millis(FALLBACK_BUDGET_MS));

		dispatch.budgets_ms.insert("restart".to_string(), 10);
		assert_eq!(dispatch.budget("restart"), Duration::from_millis(10));
	}
}
