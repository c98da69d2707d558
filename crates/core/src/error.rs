use hs_protocol::Status;
use hs_runtime::RuntimeError;
use thiserror::Error;

use crate::capture::ParseFailure;
use crate::view::ViewError;

#[derive(Debug, Error)]
pub enum ShellError {
	#[error(transparent)]
	ParseFailure(#[from] ParseFailure),

	#[error("could not embed client window: {0}")]
	AttachFailed(String),

	#[error("could not start client: {0}")]
	SpawnFailed(String),

	#[error("process exited ({0})")]
	UnexpectedExit(String),

	#[error("internal fault: {0}")]
	Faulted(String),

	#[error("cannot {event} while {from}")]
	InvalidTransition { from: Status, event: &'static str },

	#[error("browser view: {0}")]
	View(#[from] ViewError),

	#[error("config: {0}")]
	Config(String),

	#[error("session is shutting down")]
	Unavailable,
}

impl ShellError {
	/// Stable category name reported to the UI.
	pub fn kind(&self) -> &'static str {
		match self {
			ShellError::ParseFailure(_) => "ParseFailure",
			ShellError::AttachFailed(_) => "AttachFailed",
			ShellError::SpawnFailed(_) => "SpawnFailed",
			ShellError::UnexpectedExit(_) => "UnexpectedExit",
			ShellError::Faulted(_) => "Faulted",
			ShellError::InvalidTransition { .. } => "InvalidTransition",
			ShellError::View(_) => "View",
			ShellError::Config(_) => "Config",
			ShellError::Unavailable => "Unavailable",
		}
	}
}

impl From<RuntimeError> for ShellError {
	fn from(err: RuntimeError) -> Self {
		match err {
			RuntimeError::SpawnFailed { .. } => ShellError::SpawnFailed(err.to_string()),
			RuntimeError::AttachFailed { .. } | RuntimeError::AlreadyAttached | RuntimeError::NoHostWindow | RuntimeError::Backend(_) => {
				ShellError::AttachFailed(err.to_string())
			}
		}
	}
}

pub type Result<T> = std::result::Result<T, ShellError>;
