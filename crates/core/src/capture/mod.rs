//! Capture of the credential-bearing login response.
//!
//! [`CaptureInterceptor`] watches responses delivered by the browser view.
//! While armed, the first response whose URL matches the endpoint and whose
//! body parses into a [`LaunchCredential`] is handed to the capture callback,
//! and the interceptor disarms itself. Every `arm` starts a new generation;
//! a parse that finishes after `disarm` (or after a re-arm) is dropped.

mod credential;
mod parse;

pub use credential::LaunchCredential;
use hs_protocol::NetworkResponse;
use parking_lot::Mutex;
pub use parse::{ParseFailure, ResponseParser};
use tracing::{debug, info};

use crate::config::CaptureConfig;
use crate::error::Result;

/// What [`CaptureInterceptor::observe`] did with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
	/// Not armed, or the URL is not the capture endpoint.
	Ignored,
	/// A credential was delivered for `generation`.
	Captured { generation: u64 },
	/// A credential was parsed but the capture was disarmed meanwhile.
	Dropped,
}

type CaptureCallback = Box<dyn Fn(u64, LaunchCredential) + Send + Sync>;

#[derive(Debug, Default)]
struct ArmState {
	armed: bool,
	generation: u64,
}

pub struct CaptureInterceptor {
	parser: ResponseParser,
	endpoint_needle: String,
	state: Mutex<ArmState>,
	on_capture: CaptureCallback,
}

impl CaptureInterceptor {
	/// `on_capture` runs with the arm lock held and must not block or call
	/// back into the interceptor.
	pub fn new<F>(config: &CaptureConfig, on_capture: F) -> Result<Self>
	where
		F: Fn(u64, LaunchCredential) + Send + Sync + 'static,
	{
		Ok(Self {
			parser: ResponseParser::new(config)?,
			endpoint_needle: config.endpoint_needle.clone(),
			state: Mutex::new(ArmState::default()),
			on_capture: Box::new(on_capture),
		})
	}

	/// Starts a new capture generation and returns its number.
	pub fn arm(&self) -> u64 {
		let mut state = self.state.lock();
		state.generation += 1;
		state.armed = true;
		debug!(target: "hs.capture", generation = state.generation, "capture armed");
		state.generation
	}

	/// Stops capturing. Parses already in flight will be dropped.
	pub fn disarm(&self) {
		let mut state = self.state.lock();
		if state.armed {
			debug!(target: "hs.capture", generation = state.generation, "capture disarmed");
		}
		state.armed = false;
		state.generation += 1;
	}

	pub fn is_armed(&self) -> bool {
		self.state.lock().armed
	}

	pub fn matches(&self, url: &str) -> bool {
		url.contains(&self.endpoint_needle)
	}

	/// Inspects one response.
	///
	/// A matching response that fails to parse leaves the interceptor armed
	/// and returns the failure.
	pub fn observe(&self, response: &NetworkResponse) -> std::result::Result<CaptureOutcome, ParseFailure> {
		if !self.matches(&response.url) {
			return Ok(CaptureOutcome::Ignored);
		}
		let generation = {
			let state = self.state.lock();
			if !state.armed {
				debug!(target: "hs.capture", url = %response.redacted_url(), "endpoint response while disarmed");
				return Ok(CaptureOutcome::Ignored);
			}
			state.generation
		};

		let credential = self.parser.parse(&response.body)?;

		let mut state = self.state.lock();
		if !state.armed || state.generation != generation {
			debug!(target: "hs.capture", generation, "capture disarmed during parse; dropping credential");
			return Ok(CaptureOutcome::Dropped);
		}
		state.armed = false;
		info!(target: "hs.capture", generation, fields = credential.len(), url = %response.redacted_url(), "launch credential captured");
		(self.on_capture)(generation, credential);
		Ok(CaptureOutcome::Captured { generation })
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;

	const URL: &str = "https://ssl.example/fcgi-bin/login3?appid=1";
	const BODY: &str = r#"function swf(){ '<embed flashVars="config=c&angel_uin=7">' }"#;

	fn interceptor() -> (CaptureInterceptor, Arc<Mutex<Vec<(u64, LaunchCredential)>>>) {
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&seen);
		let interceptor = CaptureInterceptor::new(&CaptureConfig::default(), move |generation, credential| {
			sink.lock().push((generation, credential));
		})
		.unwrap();
		(interceptor, seen)
	}

	#[test]
	fn ignores_responses_until_armed() {
		let (interceptor, seen) = interceptor();
		assert_eq!(interceptor.observe(&NetworkResponse::new(URL, BODY)), Ok(CaptureOutcome::Ignored));
		assert!(seen.lock().is_empty());
	}

	#[test]
	fn ignores_other_endpoints() {
		let (interceptor, _) = interceptor();
		interceptor.arm();
		let response = NetworkResponse::new("https://ssl.example/index.html", BODY);
		assert_eq!(interceptor.observe(&response), Ok(CaptureOutcome::Ignored));
		assert!(interceptor.is_armed());
	}

	#[test]
	fn reports_once_per_arm() {
		let (interceptor, seen) = interceptor();
		let generation = interceptor.arm();
		let response = NetworkResponse::new(URL, BODY);

		assert_eq!(interceptor.observe(&response), Ok(CaptureOutcome::Captured { generation }));
		assert_eq!(interceptor.observe(&response), Ok(CaptureOutcome::Ignored));
		assert_eq!(seen.lock().len(), 1);

		let next = interceptor.arm();
		assert!(next > generation);
		assert_eq!(interceptor.observe(&response), Ok(CaptureOutcome::Captured { generation: next }));
		assert_eq!(seen.lock().len(), 2);
	}

	#[test]
	fn parse_failure_keeps_capture_armed() {
		let (interceptor, seen) = interceptor();
		interceptor.arm();
		let broken = NetworkResponse::new(URL, r#"flashVars="config=c""#);
		let err = interceptor.observe(&broken).unwrap_err();
		assert!(matches!(err, ParseFailure::MissingFields { .. }));
		assert!(interceptor.is_armed());
		assert!(seen.lock().is_empty());

		assert!(matches!(interceptor.observe(&NetworkResponse::new(URL, BODY)), Ok(CaptureOutcome::Captured { .. })));
	}

	#[test]
	fn disarm_drops_later_matches() {
		let (interceptor, seen) = interceptor();
		interceptor.arm();
		interceptor.disarm();
		assert_eq!(interceptor.observe(&NetworkResponse::new(URL, BODY)), Ok(CaptureOutcome::Ignored));
		assert!(seen.lock().is_empty());
	}

	#[test]
	fn disarm_racing_parse_never_delivers_after_disarm() {
		let (interceptor, seen) = interceptor();
		let interceptor = Arc::new(interceptor);
		let big_body = format!("{}{BODY}", " ".repeat(200_000));

		for _ in 0..50 {
			interceptor.arm();
			let observer = {
				let interceptor = Arc::clone(&interceptor);
				let body = big_body.clone();
				std::thread::spawn(move || interceptor.observe(&NetworkResponse::new(URL, body)).unwrap())
			};
			interceptor.disarm();
			let disarmed_at = interceptor.state.lock().generation;
			let outcome = observer.join().unwrap();
			if let CaptureOutcome::Captured { generation } = outcome {
				assert!(generation < disarmed_at);
			}
		}
		for (generation, _) in seen.lock().iter() {
			assert!(*generation > 0);
		}
		assert!(!interceptor.is_armed());
	}
}
