mod config;
mod parse;
mod run;

use std::path::{Path, PathBuf};

use anyhow::Result;
use hostshell::ShellConfig;
use tracing::debug;

use crate::cli::{Cli, Commands};

pub use run::RunOptions;

pub async fn dispatch(cli: Cli) -> Result<()> {
	let path = config_path(cli.config);
	let config = load_config(path.as_deref())?;

	match cli.command {
		Commands::Parse { file } => parse::execute(&file, &config),
		Commands::Run {
			response,
			url,
			client,
			host_window,
			scale,
			game_rect,
			hold_secs,
		} => {
			run::execute(
				config,
				RunOptions {
					response,
					url,
					client,
					host_window,
					scale,
					game_rect,
					hold_secs,
				},
			)
			.await
		}
		Commands::Config => config::execute(&config),
	}
}

/// `--config` if given, else `<config dir>/hostshell/config.json`.
pub fn config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
	explicit.or_else(|| dirs::config_dir().map(|dir| dir.join("hostshell").join("config.json")))
}

fn load_config(path: Option<&Path>) -> Result<ShellConfig> {
	let Some(path) = path else {
		return Ok(ShellConfig::default());
	};
	debug!(target: "hostshell", path = %path.display(), "loading configuration");
	Ok(ShellConfig::load(path)?)
}
