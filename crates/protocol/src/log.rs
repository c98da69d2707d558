//! Diagnostic events forwarded to log observers.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Severity of a [`LogEvent`], ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
	Error,
	Warn,
	Info,
	Debug,
	Trace,
}

impl LogLevel {
	pub fn as_str(&self) -> &'static str {
		match self {
			LogLevel::Error => "ERROR",
			LogLevel::Warn => "WARN",
			LogLevel::Info => "INFO",
			LogLevel::Debug => "DEBUG",
			LogLevel::Trace => "TRACE",
		}
	}
}

impl fmt::Display for LogLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One entry on the diagnostic bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
	/// Unix timestamp in milliseconds.
	pub timestamp: u64,
	pub level: LogLevel,
	/// Component that produced the event (`session`, `dispatch`, ...).
	pub source: String,
	pub text: String,
}

impl LogEvent {
	pub fn new(level: LogLevel, source: impl Into<String>, text: impl Into<String>) -> Self {
		Self {
			timestamp: now_millis(),
			level,
			source: source.into(),
			text: text.into(),
		}
	}
}

fn now_millis() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|elapsed| elapsed.as_millis() as u64)
		.unwrap_or_default()
}
