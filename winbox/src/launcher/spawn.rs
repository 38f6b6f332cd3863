//! Spawning guest and helper processes.

use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};

use crate::errors::{WinboxError, WinboxResult};

/// Invoked once, on the watcher thread, with the child's exit status.
pub type ExitCallback = Box<dyn FnOnce(i32) + Send + 'static>;

/// What to run: a whitespace-separated command line, the complete child
/// environment as `KEY=VALUE` strings, and the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnSpec {
    pub command: String,
    pub env: Vec<String>,
    pub working_dir: PathBuf,
}

/// Narrow seam to the host process API.
///
/// `spawn` returns as soon as the child exists. Exit is reported through
/// `on_exit` on another thread; it is never an error.
pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, spec: SpawnSpec, on_exit: ExitCallback) -> WinboxResult<u32>;
}

/// [`ProcessSpawner`] backed by `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsProcessSpawner;

impl ProcessSpawner for OsProcessSpawner {
    fn spawn(&self, spec: SpawnSpec, on_exit: ExitCallback) -> WinboxResult<u32> {
        let mut cmd = build_command(&spec)?;
        // Detached from our stdio so a dropped reader never SIGPIPEs the guest
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());

        let mut child = cmd.spawn().map_err(|e| {
            let err_msg = format!("Failed to spawn `{}`: {}", spec.command, e);
            tracing::error!("{}", err_msg);
            WinboxError::Process(err_msg)
        })?;
        let pid = child.id();

        let watcher = std::thread::Builder::new()
            .name(format!("winbox-wait-{}", pid))
            .spawn(move || {
                let status = match child.wait() {
                    Ok(status) => exit_code(status),
                    Err(e) => {
                        tracing::warn!(pid, error = %e, "Failed to wait for process");
                        -1
                    }
                };
                tracing::debug!(pid, status, "Process exited");
                on_exit(status);
            });
        if let Err(e) = watcher {
            crate::util::process::kill_process(pid);
            return Err(WinboxError::Process(format!(
                "Failed to start watcher for pid {}: {}",
                pid, e
            )));
        }

        tracing::debug!(pid, command = %spec.command, "Spawned process");
        Ok(pid)
    }
}

/// `Command` with exactly the requested environment (nothing inherited).
pub(crate) fn build_command(spec: &SpawnSpec) -> WinboxResult<Command> {
    let mut parts = spec.command.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| WinboxError::InvalidArgument("empty command".into()))?;

    let mut cmd = Command::new(program);
    cmd.args(parts);
    cmd.env_clear();
    for entry in &spec.env {
        if let Some((key, value)) = entry.split_once('=') {
            cmd.env(key, value);
        }
    }
    cmd.current_dir(&spec.working_dir);
    Ok(cmd)
}

/// Exit code, or `128 + signo` for signal-terminated children.
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => -1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn spec(command: &str, env: &[&str]) -> SpawnSpec {
        SpawnSpec {
            command: command.to_string(),
            env: env.iter().map(|s| s.to_string()).collect(),
            working_dir: std::env::temp_dir(),
        }
    }

    #[test]
    fn test_exit_status_delivered() {
        let (tx, rx) = mpsc::channel();
        let pid = OsProcessSpawner
            .spawn(
                spec("/bin/true", &[]),
                Box::new(move |status| tx.send(status).unwrap()),
            )
            .unwrap();
        assert!(pid > 0);
        let status = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(status, 0);
    }

    #[test]
    fn test_signal_exit_reports_128_plus_signo() {
        let (tx, rx) = mpsc::channel();
        let pid = OsProcessSpawner
            .spawn(
                spec("/bin/sleep 30", &[]),
                Box::new(move |status| tx.send(status).unwrap()),
            )
            .unwrap();
        crate::util::process::kill_process(pid);
        let status = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(status, 128 + libc::SIGKILL);
    }

    #[test]
    fn test_missing_binary_is_process_error() {
        let err = OsProcessSpawner
            .spawn(spec("/nonexistent/box64 game.exe", &[]), Box::new(|_| {}))
            .unwrap_err();
        assert!(matches!(err, WinboxError::Process(_)));
    }

    #[test]
    fn test_environment_is_exactly_the_list() {
        let spec = spec("/usr/bin/env", &["A=1", "B=two=2"]);
        let output = build_command(&spec).unwrap().output().unwrap();
        let stdout = String::from_utf8(output.stdout).unwrap();
        let mut lines: Vec<&str> = stdout.lines().collect();
        lines.sort();
        assert_eq!(lines, vec!["A=1", "B=two=2"]);
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(build_command(&spec("   ", &[])).is_err());
    }
}
