//! Client process lifecycle.
//!
//! [`ProcessManager`] owns every child it starts. Callers hold copyable
//! [`ProcessHandle`]s and route all mutation through the manager; a handle
//! whose child has been stopped or reaped simply stops matching anything.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, RuntimeError};

pub const DEFAULT_STOP_GRACE: Duration = Duration::from_millis(1500);
pub const DEFAULT_EXIT_POLL: Duration = Duration::from_millis(250);

/// Opaque reference to a child started by a [`ProcessManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessHandle {
	id: u64,
	pid: u32,
}

impl ProcessHandle {
	pub fn pid(&self) -> u32 {
		self.pid
	}
}

/// Reported once when a watched child exits on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
	pub handle: ProcessHandle,
	/// `None` when the child was terminated by a signal or its status could not be read.
	pub code: Option<i32>,
}

impl ExitInfo {
	pub fn describe(&self) -> String {
		match self.code {
			Some(code) => format!("exit code {code}"),
			None => "terminated without exit code".to_string(),
		}
	}
}

#[derive(Default)]
struct ProcessTable {
	next_id: u64,
	children: HashMap<u64, Child>,
}

/// Starts, watches, and stops client processes.
///
/// Cheap to clone; clones share the same process table.
#[derive(Clone)]
pub struct ProcessManager {
	table: Arc<Mutex<ProcessTable>>,
	grace: Duration,
	poll: Duration,
}

impl Default for ProcessManager {
	fn default() -> Self {
		Self::new(DEFAULT_STOP_GRACE, DEFAULT_EXIT_POLL)
	}
}

impl ProcessManager {
	/// `grace` bounds the wait after a termination request before the child
	/// is killed. `poll` is the liveness check interval used by [`Self::on_exit`].
	pub fn new(grace: Duration, poll: Duration) -> Self {
		Self {
			table: Arc::new(Mutex::new(ProcessTable::default())),
			grace,
			poll: poll.max(Duration::from_millis(10)),
		}
	}

	/// Spawns `program` with `args`. Must be called from within a Tokio runtime.
	pub fn start(&self, program: &Path, args: &[String]) -> Result<ProcessHandle> {
		let mut command = Command::new(program);
		command
			.args(args)
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::null())
			.kill_on_drop(true);
		#[cfg(unix)]
		command.process_group(0);

		let child = command.spawn().map_err(|source| RuntimeError::SpawnFailed {
			program: program.display().to_string(),
			source,
		})?;
		let Some(pid) = child.id() else {
			return Err(RuntimeError::SpawnFailed {
				program: program.display().to_string(),
				source: std::io::Error::other("child exited before its pid could be read"),
			});
		};

		let mut table = self.table.lock();
		table.next_id += 1;
		let handle = ProcessHandle { id: table.next_id, pid };
		table.children.insert(handle.id, child);
		info!(target: "hs.process", pid, argc = args.len(), program = %program.display(), "client process started");
		Ok(handle)
	}

	/// Returns `true` while the child behind `handle` is running.
	pub fn is_alive(&self, handle: ProcessHandle) -> bool {
		let mut table = self.table.lock();
		match table.children.get_mut(&handle.id) {
			Some(child) => matches!(child.try_wait(), Ok(None)),
			None => false,
		}
	}

	/// Requests graceful termination, killing the child once the grace period runs out.
	///
	/// Stopping a handle that is no longer tracked is a no-op and returns `false`.
	pub async fn stop(&self, handle: ProcessHandle) -> bool {
		let Some(mut child) = self.table.lock().children.remove(&handle.id) else {
			debug!(target: "hs.process", pid = handle.pid, "stop ignored; process not tracked");
			return false;
		};

		if let Ok(Some(status)) = child.try_wait() {
			debug!(target: "hs.process", pid = handle.pid, ?status, "process had already exited");
			return true;
		}

		signal_group(handle.pid, false);
		match tokio::time::timeout(self.grace, child.wait()).await {
			Ok(Ok(status)) => info!(target: "hs.process", pid = handle.pid, ?status, "client process stopped"),
			Ok(Err(err)) => warn!(target: "hs.process", pid = handle.pid, error = %err, "waiting for client process failed"),
			Err(_) => {
				warn!(target: "hs.process", pid = handle.pid, grace_ms = self.grace.as_millis() as u64, "graceful stop timed out; killing");
				signal_group(handle.pid, true);
				if let Err(err) = child.start_kill() {
					warn!(target: "hs.process", pid = handle.pid, error = %err, "kill failed");
				}
				let _ = child.wait().await;
			}
		}
		true
	}

	/// Stops every tracked child.
	pub async fn stop_all(&self) {
		let handles: Vec<ProcessHandle> = {
			let table = self.table.lock();
			table
				.children
				.iter()
				.filter_map(|(id, child)| child.id().map(|pid| ProcessHandle { id: *id, pid }))
				.collect()
		};
		for handle in handles {
			self.stop(handle).await;
		}
	}

	/// Watches `handle` and calls `callback` once if the child exits on its own.
	///
	/// The watcher ends silently when the handle is stopped through [`Self::stop`].
	/// Abort the returned task to stop watching early.
	pub fn on_exit<F>(&self, handle: ProcessHandle, callback: F) -> JoinHandle<()>
	where
		F: FnOnce(ExitInfo) + Send + 'static,
	{
		let table = Arc::clone(&self.table);
		let poll = self.poll;
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(poll);
			loop {
				ticker.tick().await;
				let code = {
					let mut table = table.lock();
					let Some(child) = table.children.get_mut(&handle.id) else {
						return;
					};
					match child.try_wait() {
						Ok(None) => continue,
						Ok(Some(status)) => {
							table.children.remove(&handle.id);
							status.code()
						}
						Err(err) => {
							warn!(target: "hs.process", pid = handle.pid, error = %err, "lost track of client process");
							table.children.remove(&handle.id);
							None
						}
					}
				};
				let info = ExitInfo { handle, code };
				info!(target: "hs.process", pid = handle.pid, outcome = %info.describe(), "client process exited");
				callback(info);
				return;
			}
		})
	}
}

/// Signals the child's whole tree: a termination request, or a kill when `force` is set.
#[cfg(unix)]
fn signal_group(pid: u32, force: bool) {
	// Children lead their own process group, so the whole group gets the signal.
	let signal = if force { "-KILL" } else { "-TERM" };
	let status = std::process::Command::new("kill")
		.args([signal, "--", &format!("-{pid}")])
		.stdout(Stdio::null())
		.stderr(Stdio::null())
		.status();
	if let Err(err) = status {
		debug!(target: "hs.process", pid, force, error = %err, "could not signal process group");
	}
}

#[cfg(windows)]
fn signal_group(pid: u32, force: bool) {
	let pid_arg = pid.to_string();
	let mut args = vec!["/PID", pid_arg.as_str(), "/T"];
	if force {
		args.push("/F");
	}
	let status = std::process::Command::new("taskkill")
		.args(&args)
		.stdout(Stdio::null())
		.stderr(Stdio::null())
		.status();
	if let Err(err) = status {
		debug!(target: "hs.process", pid, force, error = %err, "could not signal process tree");
	}
}

#[cfg(not(any(unix, windows)))]
fn signal_group(_pid: u32, _force: bool) {}

#[cfg(all(test, unix))]
mod tests {
	use std::path::PathBuf;
	use std::time::Instant;

	use super::*;

	fn sh() -> PathBuf {
		PathBuf::from("/bin/sh")
	}

	fn script(body: &str) -> Vec<String> {
		vec!["-c".to_string(), body.to_string()]
	}

	#[tokio::test]
	async fn stop_is_idempotent() {
		let manager = ProcessManager::new(Duration::from_secs(2), Duration::from_millis(20));
		let handle = manager.start(&sh(), &script("sleep 30")).unwrap();
		assert!(manager.is_alive(handle));

		assert!(manager.stop(handle).await);
		assert!(!manager.is_alive(handle));
		assert!(!manager.stop(handle).await);
	}

	#[tokio::test]
	async fn missing_program_is_spawn_failure() {
		let manager = ProcessManager::default();
		let err = manager.start(Path::new("/definitely/not/here/client"), &[]).unwrap_err();
		assert!(matches!(err, RuntimeError::SpawnFailed { .. }));
		assert!(err.to_string().contains("/definitely/not/here/client"));
	}

	#[tokio::test]
	async fn on_exit_reports_exit_code() {
		let manager = ProcessManager::new(Duration::from_secs(1), Duration::from_millis(20));
		let handle = manager.start(&sh(), &script("exit 3")).unwrap();
		let (tx, rx) = tokio::sync::oneshot::channel();
		manager.on_exit(handle, move |info| {
			let _ = tx.send(info);
		});

		let info = tokio::time::timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();
		assert_eq!(info.handle, handle);
		assert_eq!(info.code, Some(3));
		assert!(!manager.stop(handle).await);
	}

	#[tokio::test]
	async fn stopped_process_never_reports_exit() {
		let manager = ProcessManager::new(Duration::from_secs(2), Duration::from_millis(20));
		let handle = manager.start(&sh(), &script("sleep 30")).unwrap();
		let (tx, rx) = tokio::sync::oneshot::channel::<ExitInfo>();
		let watcher = manager.on_exit(handle, move |info| {
			let _ = tx.send(info);
		});

		manager.stop(handle).await;
		tokio::time::timeout(Duration::from_secs(2), watcher).await.unwrap().unwrap();
		assert!(rx.await.is_err());
	}

	#[tokio::test]
	async fn stop_escalates_after_grace() {
		let manager = ProcessManager::new(Duration::from_millis(200), Duration::from_millis(20));
		let handle = manager.start(&sh(), &script("trap '' TERM; while true; do sleep 1; done")).unwrap();
		tokio::time::sleep(Duration::from_millis(100)).await;

		let started = Instant::now();
		assert!(manager.stop(handle).await);
		assert!(started.elapsed() < Duration::from_secs(5));
		assert!(!manager.is_alive(handle));
	}

	#[tokio::test]
	async fn stop_all_stops_every_child() {
		let manager = ProcessManager::new(Duration::from_secs(2), Duration::from_millis(20));
		let first = manager.start(&sh(), &script("sleep 30")).unwrap();
		let second = manager.start(&sh(), &script("sleep 30")).unwrap();

		manager.stop_all().await;
		assert!(!manager.is_alive(first));
		assert!(!manager.is_alive(second));
		assert!(!manager.stop(first).await);
	}

	/// True once `pid` is gone or only a zombie.
	#[cfg(target_os = "linux")]
	fn process_gone(pid: u32) -> bool {
		match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
			Ok(stat) => stat.rsplit_once(") ").is_some_and(|(_, rest)| rest.starts_with('Z')),
			Err(_) => true,
		}
	}

	#[cfg(target_os = "linux")]
	#[tokio::test]
	async fn forced_stop_kills_group_members_that_ignore_term() {
		let dir = tempfile::tempdir().unwrap();
		let pid_file = dir.path().join("member.pid");
		let body = format!("trap '' TERM; sleep 30 & echo $! > '{}'; wait", pid_file.display());
		let manager = ProcessManager::new(Duration::from_millis(200), Duration::from_millis(20));
		let handle = manager.start(&sh(), &script(&body)).unwrap();

		let mut member = None;
		for _ in 0..100 {
			if let Ok(text) = std::fs::read_to_string(&pid_file) {
				if let Ok(pid) = text.trim().parse::<u32>() {
					member = Some(pid);
					break;
				}
			}
			tokio::time::sleep(Duration::from_millis(20)).await;
		}
		let member = member.expect("background member started");
		assert!(!process_gone(member));

		assert!(manager.stop(handle).await);
		let mut gone = false;
		for _ in 0..100 {
			if process_gone(member) {
				gone = true;
				break;
			}
			tokio::time::sleep(Duration::from_millis(20)).await;
		}
		assert!(gone, "group member {member} survived a forced stop");
	}
}
