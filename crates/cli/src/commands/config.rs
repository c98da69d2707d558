use anyhow::Result;
use hostshell::ShellConfig;

pub fn execute(config: &ShellConfig) -> Result<()> {
	println!("{}", serde_json::to_string_pretty(config)?);
	Ok(())
}
