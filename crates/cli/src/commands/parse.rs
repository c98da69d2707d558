use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use hostshell::ShellConfig;
use hostshell::capture::ResponseParser;
use serde_json::json;
use tracing::info;

use crate::console::emit;

/// Reports which credential fields a saved response carries. Values stay private.
pub fn execute(file: &Path, config: &ShellConfig) -> Result<()> {
	info!(target: "hostshell", file = %file.display(), "parsing saved response");
	let body = fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;

	let parser = ResponseParser::new(&config.capture)?;
	let credential = parser
		.parse(&body)
		.with_context(|| format!("no launch credential in {}", file.display()))?;
	let arguments = credential.launch_arguments(&config.client);

	emit(&json!({
		"fields": credential.field_names(),
		"argumentCount": arguments.len(),
	}));
	Ok(())
}
