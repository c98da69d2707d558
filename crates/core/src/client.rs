//! Locating the client executable.

use std::path::{Path, PathBuf};

use crate::config::ClientConfig;
use crate::error::{Result, ShellError};

/// Resolves the executable to launch.
///
/// An explicit `executable` is returned untouched; a missing file then
/// surfaces as a spawn failure. Otherwise `resources/<executable_name>` is
/// searched for beside the running binary and up to two directories above it.
pub fn resolve_client_path(config: &ClientConfig) -> Result<PathBuf> {
	if let Some(path) = &config.executable {
		return Ok(path.clone());
	}
	let exe = std::env::current_exe().map_err(|err| ShellError::SpawnFailed(format!("cannot locate running executable: {err}")))?;
	let base = exe.parent().unwrap_or_else(|| Path::new("."));
	find_in_resources(base, &config.executable_name)
}

fn candidates(base: &Path, name: &str) -> [PathBuf; 3] {
	[
		base.join("resources").join(name),
		base.join("..").join("resources").join(name),
		base.join("..").join("..").join("resources").join(name),
	]
}

fn find_in_resources(base: &Path, name: &str) -> Result<PathBuf> {
	let candidates = candidates(base, name);
	if let Some(found) = candidates.iter().find(|path| path.is_file()) {
		return Ok(found.clone());
	}
	let checked: Vec<String> = candidates.iter().map(|path| path.display().to_string()).collect();
	Err(ShellError::SpawnFailed(format!("{name} not found; checked {}", checked.join(", "))))
}

#[cfg(test)]
mod tests {
	use std::fs;

	use super::*;

	#[test]
	fn explicit_path_wins() {
		let config = ClientConfig {
			executable: Some(PathBuf::from("/opt/client/run")),
			..ClientConfig::default()
		};
		assert_eq!(resolve_client_path(&config).unwrap(), PathBuf::from("/opt/client/run"));
	}

	#[test]
	fn finds_resources_above_binary() {
		let root = tempfile::tempdir().unwrap();
		let bin = root.path().join("app").join("bin");
		fs::create_dir_all(&bin).unwrap();
		fs::create_dir_all(root.path().join("app").join("resources")).unwrap();
		fs::write(root.path().join("app").join("resources").join("projector.exe"), b"").unwrap();

		let found = find_in_resources(&bin, "projector.exe").unwrap();
		assert!(found.ends_with("resources/projector.exe"));
	}

	#[test]
	fn missing_client_lists_checked_paths() {
		let root = tempfile::tempdir().unwrap();
		let err = find_in_resources(root.path(), "projector.exe").unwrap_err();
		assert_eq!(err.kind(), "SpawnFailed");
		let message = err.to_string();
		assert_eq!(message.matches("projector.exe").count(), 4);
	}
}
