//! The session transition table.

use hs_protocol::Status;

/// Inputs that can move the session between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
	CaptureStart,
	CredentialFound,
	LaunchRequested,
	LaunchSucceeded,
	LaunchFailed,
	StopRequested,
	ProcessExited,
	RestartRequested,
	ReloginRequested,
	CancelRequested,
	/// Any failure outside the launch path (capture timeout, internal fault).
	Failure,
}

impl Event {
	pub const ALL: [Event; 11] = [
		Event::CaptureStart,
		Event::CredentialFound,
		Event::LaunchRequested,
		Event::LaunchSucceeded,
		Event::LaunchFailed,
		Event::StopRequested,
		Event::ProcessExited,
		Event::RestartRequested,
		Event::ReloginRequested,
		Event::CancelRequested,
		Event::Failure,
	];

	/// Verb phrase used in rejection messages ("cannot stop while Login").
	pub fn describe(&self) -> &'static str {
		match self {
			Event::CaptureStart => "start capture",
			Event::CredentialFound => "accept a credential",
			Event::LaunchRequested => "launch",
			Event::LaunchSucceeded => "finish launching",
			Event::LaunchFailed => "fail a launch",
			Event::StopRequested => "stop",
			Event::ProcessExited => "handle process exit",
			Event::RestartRequested => "restart",
			Event::ReloginRequested => "re-login",
			Event::CancelRequested => "cancel capture",
			Event::Failure => "fail",
		}
	}
}

/// Next status for `event` in `from`, or `None` if the table has no such edge.
pub fn next_status(from: Status, event: Event) -> Option<Status> {
	use Event::*;
	use Status::*;

	match (from, event) {
		(_, RestartRequested) => Some(Launching),
		(_, Failure) => Some(Error),
		(Login, CaptureStart) => Some(Capturing),
		(Capturing, CredentialFound) => Some(FoundValue),
		(Capturing, CancelRequested) => Some(Login),
		(FoundValue, LaunchRequested) => Some(Launching),
		(Launching, LaunchSucceeded) => Some(Running),
		(Launching, LaunchFailed) => Some(Error),
		(Running, StopRequested) => Some(Login),
		(Running, ProcessExited) => Some(Error),
		(Error, ReloginRequested) => Some(Login),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn legal(from: Status) -> Vec<(Event, Status)> {
		Event::ALL
			.iter()
			.filter_map(|event| next_status(from, *event).map(|to| (*event, to)))
			.collect()
	}

	#[test]
	fn table_is_exactly_the_documented_edges() {
		use Event::*;
		use Status::*;

		let universal = [(RestartRequested, Launching), (Failure, Error)];
		let specific: [(Status, Vec<(Event, Status)>); 6] = [
			(Login, vec![(CaptureStart, Capturing)]),
			(Capturing, vec![(CredentialFound, FoundValue), (CancelRequested, Login)]),
			(FoundValue, vec![(LaunchRequested, Launching)]),
			(Launching, vec![(LaunchSucceeded, Running), (LaunchFailed, Error)]),
			(Running, vec![(StopRequested, Login), (ProcessExited, Error)]),
			(Error, vec![(ReloginRequested, Login)]),
		];

		for (from, edges) in specific {
			let mut expected = edges;
			expected.extend(universal);
			expected.sort_by_key(|(event, _)| Event::ALL.iter().position(|e| e == event));
			assert_eq!(legal(from), expected, "edges from {from}");
		}
	}

	#[test]
	fn error_reachable_from_everywhere() {
		for from in Status::ALL {
			assert_eq!(next_status(from, Event::Failure), Some(Status::Error));
		}
	}

	#[test]
	fn every_walk_stays_inside_the_state_set() {
		// Exhaustive walk of depth 4 from Login; every reached state must be a known status.
		let mut frontier = vec![Status::Login];
		for _ in 0..4 {
			let mut next = Vec::new();
			for from in frontier {
				for event in Event::ALL {
					if let Some(to) = next_status(from, event) {
						assert!(Status::ALL.contains(&to));
						next.push(to);
					}
				}
			}
			next.sort_by_key(|status| status.as_str());
			next.dedup();
			frontier = next;
		}
		assert_eq!(frontier.len(), Status::ALL.len());
	}
}
