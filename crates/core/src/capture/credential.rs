use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::ClientConfig;

/// Fields recovered from the login response, needed to launch the client.
///
/// Values are secrets. `Debug` prints field names only, and nothing in this
/// crate logs or persists a value.
#[derive(Clone, PartialEq, Eq)]
pub struct LaunchCredential {
	query: String,
	fields: Vec<(String, String)>,
}

impl LaunchCredential {
	/// Splits an `a=1&b=2` query into fields, keeping the original text for launch.
	pub fn from_query(query: &str) -> Self {
		let fields = query
			.split('&')
			.filter(|pair| !pair.is_empty())
			.map(|pair| match pair.split_once('=') {
				Some((name, value)) => (name.to_string(), value.to_string()),
				None => (pair.to_string(), String::new()),
			})
			.collect();
		Self {
			query: query.to_string(),
			fields,
		}
	}

	pub fn field_names(&self) -> Vec<&str> {
		self.fields.iter().map(|(name, _)| name.as_str()).collect()
	}

	pub fn has(&self, name: &str) -> bool {
		self.fields.iter().any(|(field, _)| field == name)
	}

	/// First value recorded for `name`.
	pub fn get(&self, name: &str) -> Option<&str> {
		self.fields.iter().find(|(field, _)| field == name).map(|(_, value)| value.as_str())
	}

	pub fn len(&self) -> usize {
		self.fields.len()
	}

	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}

	/// Argument list for the client: configured extra args, then the launch URL.
	///
	/// Field values are copied into the URL byte for byte.
	pub fn launch_arguments(&self, client: &ClientConfig) -> Vec<String> {
		let nonce = client.cache_bust.then(cache_bust_key);
		let mut args = client.extra_args.clone();
		args.push(self.launch_url(&client.launch_url, nonce.as_deref()));
		args
	}

	fn launch_url(&self, base: &str, nonce: Option<&str>) -> String {
		let separator = if base.contains('?') { '&' } else { '?' };
		match nonce {
			Some(nonce) => format!("{base}{separator}{nonce}=&{}", self.query),
			None => format!("{base}{separator}{}", self.query),
		}
	}
}

impl fmt::Debug for LaunchCredential {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LaunchCredential").field("fields", &self.field_names()).finish_non_exhaustive()
	}
}

/// Time-derived key that makes every launch URL unique.
fn cache_bust_key() -> String {
	let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|elapsed| elapsed.subsec_nanos()).unwrap_or_default();
	format!("{:.16}", f64::from(nanos) / 1_000_000_000.0)
}
