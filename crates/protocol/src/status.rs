//! Session status as published to the UI.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Orchestration phase of the single process-wide session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
	/// Browser view shows the login page; nothing is being captured.
	Login,
	/// Browser traffic is watched for the credential-bearing response.
	Capturing,
	/// A launch credential has been recovered.
	FoundValue,
	/// The client process is starting and its window is being embedded.
	Launching,
	/// The client window is embedded and tracked.
	Running,
	/// Something failed; `message` carries the reason.
	Error,
}

impl Status {
	/// Every status, in declaration order.
	pub const ALL: [Status; 6] = [
		Status::Login,
		Status::Capturing,
		Status::FoundValue,
		Status::Launching,
		Status::Running,
		Status::Error,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			Status::Login => "Login",
			Status::Capturing => "Capturing",
			Status::FoundValue => "FoundValue",
			Status::Launching => "Launching",
			Status::Running => "Running",
			Status::Error => "Error",
		}
	}
}

impl fmt::Display for Status {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Notification emitted on every status transition.
///
/// ```json
/// { "status": "Error", "message": "process exited (exit code 1)" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
	pub status: Status,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
}

impl StatusPayload {
	pub fn new(status: Status, message: Option<String>) -> Self {
		Self { status, message }
	}

	/// Payload for the initial Login state.
	pub fn login() -> Self {
		Self::new(Status::Login, None)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn payload_omits_missing_message() {
		let json = serde_json::to_value(StatusPayload::login()).unwrap();
		assert_eq!(json, serde_json::json!({ "status": "Login" }));
	}

	#[test]
	fn payload_carries_error_message() {
		let payload = StatusPayload::new(Status::Error, Some("process exited".to_string()));
		let json = serde_json::to_value(&payload).unwrap();
		assert_eq!(json["status"], "Error");
		assert_eq!(json["message"], "process exited");
	}

	#[test]
	fn display_matches_wire_name() {
		for status in Status::ALL {
			let wire = serde_json::to_value(status).unwrap();
			assert_eq!(wire, status.to_string());
		}
	}
}
