use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
	#[error("failed to start {program}: {source}")]
	SpawnFailed {
		program: String,
		#[source]
		source: io::Error,
	},

	#[error("could not embed window of process {pid}: {reason}")]
	AttachFailed { pid: u32, reason: String },

	#[error("a window is already attached; detach it first")]
	AlreadyAttached,

	#[error("no host window registered")]
	NoHostWindow,

	#[error("window backend error: {0}")]
	Backend(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
