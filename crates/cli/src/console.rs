//! JSON-lines output on stdout.

use std::io::Write;

use hostshell::{BrowserView, ViewError};
use hs_protocol::{LogEvent, LogicalRect, StatusPayload};
use serde_json::{Value, json};

/// Writes one JSON value as a line on stdout.
pub fn emit(value: &Value) {
	let mut out = std::io::stdout().lock();
	let _ = writeln!(out, "{value}");
	let _ = out.flush();
}

pub fn status_line(payload: &StatusPayload) -> Value {
	json!({ "type": "status", "status": payload.status, "message": payload.message })
}

pub fn log_line(event: &LogEvent) -> Value {
	json!({
		"type": "log",
		"timestamp": event.timestamp,
		"level": event.level,
		"source": event.source,
		"text": event.text,
	})
}

/// Stand-in browser view that reports each call instead of rendering.
#[derive(Debug, Default)]
pub struct ConsoleView;

impl ConsoleView {
	fn report(&self, action: &str, detail: Value) {
		let mut line = json!({ "type": "view", "action": action });
		if let (Some(line), Value::Object(detail)) = (line.as_object_mut(), detail) {
			line.extend(detail);
		}
		emit(&line);
	}
}

impl BrowserView for ConsoleView {
	fn show(&self) -> Result<(), ViewError> {
		self.report("show", Value::Null);
		Ok(())
	}

	fn hide(&self) -> Result<(), ViewError> {
		self.report("hide", Value::Null);
		Ok(())
	}

	fn navigate(&self, url: &str) -> Result<(), ViewError> {
		self.report("navigate", json!({ "url": url }));
		Ok(())
	}

	fn set_bounds(&self, rect: LogicalRect) -> Result<(), ViewError> {
		self.report("setBounds", json!({ "rect": rect }));
		Ok(())
	}
}
