use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

const RESPONSE: &str = r#"<html><script>
function swf(id) {
	var html = '<embed src="main.swf" flashVars="config=//res.example/Global.xml&angel_uin=4242&angel_key=s3cr3tKey" />';
}
</script></html>"#;

fn hostshell_binary() -> PathBuf {
	let mut path = std::env::current_exe().expect("current_exe should resolve");
	path.pop();
	path.pop();
	path.push(format!("hostshell{}", std::env::consts::EXE_SUFFIX));
	path
}

fn run_hostshell(workdir: &Path, args: &[&str]) -> (bool, String, String) {
	let output = Command::new(hostshell_binary())
		.current_dir(workdir)
		.env_remove("RUST_LOG")
		.args(args)
		.output()
		.expect("failed to execute hostshell");

	let stdout = String::from_utf8_lossy(&output.stdout).to_string();
	let stderr = String::from_utf8_lossy(&output.stderr).to_string();
	(output.status.success(), stdout, stderr)
}

fn json_lines(stdout: &str) -> Vec<Value> {
	stdout
		.lines()
		.filter(|line| !line.trim().is_empty())
		.map(|line| serde_json::from_str(line).unwrap_or_else(|err| panic!("not JSON ({err}): {line}")))
		.collect()
}

fn write(dir: &TempDir, name: &str, content: &str) -> String {
	let path = dir.path().join(name);
	std::fs::write(&path, content).expect("fixture should be written");
	path.display().to_string()
}

#[test]
fn config_prints_defaults_when_file_missing() {
	let tmp = TempDir::new().expect("temp dir should be created");
	let missing = tmp.path().join("absent.json").display().to_string();

	let (success, stdout, stderr) = run_hostshell(tmp.path(), &["--config", &missing, "config"]);
	assert!(success, "config failed: {stderr}");
	let config: Value = serde_json::from_str(&stdout).expect("config should be JSON");
	assert_eq!(config["capture"]["endpointNeedle"], "/fcgi-bin/login3");
	assert_eq!(config["capture"]["requiredFields"], serde_json::json!(["config", "angel_uin"]));
	assert_eq!(config["embed"]["attachAttempts"], 60);
}

#[test]
fn config_file_overrides_sections() {
	let tmp = TempDir::new().expect("temp dir should be created");
	let path = write(&tmp, "config.json", r#"{"capture":{"timeoutSecs":30},"process":{"stopGraceMs":400}}"#);

	let (success, stdout, stderr) = run_hostshell(tmp.path(), &["--config", &path, "config"]);
	assert!(success, "config failed: {stderr}");
	let config: Value = serde_json::from_str(&stdout).unwrap();
	assert_eq!(config["capture"]["timeoutSecs"], 30);
	assert_eq!(config["capture"]["attribute"], "flashVars");
	assert_eq!(config["process"]["stopGraceMs"], 400);
}

#[test]
fn malformed_config_is_rejected() {
	let tmp = TempDir::new().expect("temp dir should be created");
	let path = write(&tmp, "config.json", "{ not json");

	let (success, _, stderr) = run_hostshell(tmp.path(), &["--config", &path, "config"]);
	assert!(!success);
	assert!(stderr.contains("config.json"), "stderr: {stderr}");
}

#[test]
fn parse_reports_field_names_without_values() {
	let tmp = TempDir::new().expect("temp dir should be created");
	let config = tmp.path().join("none.json").display().to_string();
	let response = write(&tmp, "login3.html", RESPONSE);

	let (success, stdout, stderr) = run_hostshell(tmp.path(), &["--config", &config, "parse", &response]);
	assert!(success, "parse failed: {stderr}");
	let lines = json_lines(&stdout);
	assert_eq!(lines.len(), 1);
	assert_eq!(lines[0]["fields"], serde_json::json!(["config", "angel_uin", "angel_key"]));
	assert_eq!(lines[0]["argumentCount"], 1);
	assert!(!stdout.contains("s3cr3tKey"));
	assert!(!stderr.contains("s3cr3tKey"));
}

#[test]
fn parse_names_missing_fields() {
	let tmp = TempDir::new().expect("temp dir should be created");
	let config = tmp.path().join("none.json").display().to_string();
	let response = write(&tmp, "login3.html", r#"<embed flashVars="config=//res.example/Global.xml">"#);

	let (success, stdout, stderr) = run_hostshell(tmp.path(), &["--config", &config, "parse", &response]);
	assert!(!success);
	assert!(stdout.is_empty());
	assert!(stderr.contains("angel_uin"), "stderr: {stderr}");
}

#[cfg(unix)]
#[test]
fn run_without_host_window_ends_in_error() {
	let tmp = TempDir::new().expect("temp dir should be created");
	let config = write(
		&tmp,
		"config.json",
		r#"{"client":{"cacheBust":false,"extraArgs":["-c","sleep 5"]},"embed":{"attachAttempts":2,"attachIntervalMs":10},"process":{"stopGraceMs":300,"exitPollMs":20},"bus":{"flushIntervalMs":10}}"#,
	);
	let response = write(&tmp, "login3.html", RESPONSE);

	let (success, stdout, stderr) = run_hostshell(
		tmp.path(),
		&["--config", &config, "run", "--response", &response, "--client", "/bin/sh", "--game-rect", "0,40,960,560"],
	);
	assert!(!success, "run should fail without a host window");
	assert!(stderr.contains("no host window"), "stderr: {stderr}");

	let lines = json_lines(&stdout);
	let statuses: Vec<&str> = lines
		.iter()
		.filter(|line| line["type"] == "status")
		.filter_map(|line| line["status"].as_str())
		.collect();
	assert_eq!(statuses, ["Capturing", "FoundValue", "Launching", "Error"]);

	let actions: Vec<&str> = lines
		.iter()
		.filter(|line| line["type"] == "view")
		.filter_map(|line| line["action"].as_str())
		.collect();
	assert_eq!(actions, ["show", "hide", "show"]);

	let result = lines.last().expect("result line");
	assert_eq!(result["type"], "result");
	assert_eq!(result["status"], "Error");
	assert!(lines.iter().any(|line| line["type"] == "log" && line["source"] == "dispatch"));
	assert!(!stdout.contains("s3cr3tKey"));
	assert!(!stderr.contains("s3cr3tKey"));
}

#[test]
fn run_rejects_response_without_credential() {
	let tmp = TempDir::new().expect("temp dir should be created");
	let config = tmp.path().join("none.json").display().to_string();
	let response = write(&tmp, "login3.html", "<html>nothing here</html>");

	let (success, stdout, stderr) = run_hostshell(tmp.path(), &["--config", &config, "run", "--response", &response]);
	assert!(!success);
	assert!(stderr.contains("flashVars"), "stderr: {stderr}");
	let lines = json_lines(&stdout);
	assert_eq!(lines.last().unwrap()["status"], "Capturing");
}
