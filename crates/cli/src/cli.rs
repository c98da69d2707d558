use std::path::PathBuf;

use clap::{Parser, Subcommand};
use hs_protocol::LogicalRect;

#[derive(Parser, Debug)]
#[command(name = "hostshell")]
#[command(about = "hostshell - drive a login-capture and client-embedding session headlessly")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug, -vvv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Configuration file (defaults to <config dir>/hostshell/config.json)
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Extract the launch credential from a saved login response
	///
	/// Prints field names and the launch argument count; values are never shown.
	Parse {
		/// Saved response body
		file: PathBuf,
	},

	/// Run a full session, replaying a saved login response as the captured one
	///
	/// Status changes, view calls and diagnostics stream to stdout as JSON lines.
	Run {
		/// Saved response body to deliver once capture is armed
		#[arg(long, value_name = "FILE")]
		response: PathBuf,

		/// URL the response is reported under (defaults to one matching the capture endpoint)
		#[arg(long)]
		url: Option<String>,

		/// Client executable, overriding the configured one
		#[arg(long, value_name = "PATH")]
		client: Option<PathBuf>,

		/// Native handle of the host window to embed into
		#[arg(long, value_name = "HANDLE")]
		host_window: Option<isize>,

		/// Logical-to-physical scale factor
		#[arg(long, default_value_t = 1.0)]
		scale: f64,

		/// Game region in logical units
		#[arg(long, value_name = "X,Y,W,H", value_parser = parse_rect)]
		game_rect: Option<LogicalRect>,

		/// Seconds to keep a running client before stopping it
		#[arg(long, default_value_t = 0)]
		hold_secs: u64,
	},

	/// Print the effective configuration
	Config,
}

/// Parses `x,y,w,h` into a logical rect.
pub fn parse_rect(value: &str) -> Result<LogicalRect, String> {
	let parts: Vec<f64> = value
		.split(',')
		.map(|part| part.trim().parse::<f64>().map_err(|err| format!("invalid number {part:?}: {err}")))
		.collect::<Result<_, _>>()?;
	match parts.as_slice() {
		[x, y, w, h] => {
			let rect = LogicalRect::new(*x, *y, *w, *h);
			if rect.is_finite() {
				Ok(rect)
			} else {
				Err("rect values must be finite".to_string())
			}
		}
		_ => Err(format!("expected X,Y,W,H but got {} values", parts.len())),
	}
}
