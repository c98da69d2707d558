//! Network events delivered by the browser-view collaborator.

use serde::{Deserialize, Serialize};

/// A completed response observed inside the browser view.
///
/// The collaborator decodes the body lossily; the core only ever looks at it
/// as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkResponse {
	pub url: String,
	#[serde(default = "default_status")]
	pub status: u16,
	pub body: String,
}

fn default_status() -> u16 {
	200
}

impl NetworkResponse {
	pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			status: default_status(),
			body: body.into(),
		}
	}

	/// URL with any query string replaced by a marker, safe for logs.
	pub fn redacted_url(&self) -> String {
		match self.url.split_once('?') {
			Some((base, _)) => format!("{base}?REDACTED"),
			None => self.url.clone(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn redacted_url_drops_query() {
		let response = NetworkResponse::new("https://host/fcgi-bin/login3?skey=secret", "");
		assert_eq!(response.redacted_url(), "https://host/fcgi-bin/login3?REDACTED");
	}

	#[test]
	fn status_defaults_when_absent() {
		let response: NetworkResponse = serde_json::from_str(r#"{"url":"u","body":"b"}"#).unwrap();
		assert_eq!(response.status, 200);
	}
}
