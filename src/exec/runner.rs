//! Timeout-bounded process execution
//!
//! Every command runs in its own process group. When the deadline passes the
//! whole group is killed, so a `limactl shell` wrapper cannot leave its
//! children behind holding our pipes.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::common::{Error, Result};

use super::invocation::CommandInvocation;

/// Captured result of a finished process
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; `None` if the process was killed by a signal
    pub code: Option<i32>,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Non-empty, trimmed stdout lines
    pub fn stdout_lines(&self) -> Vec<&str> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect()
    }

    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

/// Run and fail unless the process exits zero
pub async fn run(inv: &CommandInvocation) -> Result<CommandOutput> {
    let output = execute(inv).await?;
    if output.success() {
        Ok(output)
    } else {
        Err(Error::command_failed(&inv.display(), output.code, &output.stderr))
    }
}

/// Run and fail unless the process exits non-zero
pub async fn run_expect_failure(inv: &CommandInvocation) -> Result<CommandOutput> {
    let output = execute(inv).await?;
    if output.success() {
        Err(Error::assertion(format!(
            "expected `{}` to fail but it exited 0",
            inv.display()
        )))
    } else {
        Ok(output)
    }
}

/// Spawn the invocation and wait for it within its timeout
///
/// Only spawn failures and timeouts are errors here; the exit status is left
/// to the caller.
pub async fn execute(inv: &CommandInvocation) -> Result<CommandOutput> {
    let line = inv.display();
    let limit = inv.timeout();
    tracing::debug!(command = %line, timeout_secs = limit.as_secs(), "Running command");

    let started = Instant::now();
    let child = spawn(inv)?;
    let pid = child.id();

    match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let result = CommandOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                code: output.status.code(),
                duration: started.elapsed(),
            };
            tracing::debug!(
                command = %line,
                code = ?result.code,
                elapsed_ms = result.duration.as_millis() as u64,
                "Command finished"
            );
            Ok(result)
        }
        Ok(Err(e)) => Err(Error::Io(e)),
        Err(_) => {
            kill_process_group(pid);
            tracing::warn!(command = %line, timeout_secs = limit.as_secs(), "Command timed out");
            Err(Error::Timeout {
                command: line,
                secs: limit.as_secs(),
            })
        }
    }
}

/// Run a streaming command for `window`, then kill it and keep its output
///
/// For commands that never exit on their own (`events`, `logs -f`). A
/// process that exits earlier is returned as-is. `code` is `None` when the
/// window closed first.
pub async fn capture_for(inv: &CommandInvocation, window: Duration) -> Result<CommandOutput> {
    let line = inv.display();
    tracing::debug!(command = %line, window_secs = window.as_secs(), "Capturing command output");

    let started = Instant::now();
    let mut child = spawn(inv)?;
    let pid = child.id();

    let stdout = child.stdout.take().map(|pipe| tokio::spawn(read_all(pipe)));
    let stderr = child.stderr.take().map(|pipe| tokio::spawn(read_all(pipe)));

    let code = match tokio::time::timeout(window, child.wait()).await {
        Ok(status) => status?.code(),
        Err(_) => {
            kill_process_group(pid);
            child.wait().await?;
            None
        }
    };

    Ok(CommandOutput {
        stdout: join_reader(stdout).await,
        stderr: join_reader(stderr).await,
        code,
        duration: started.elapsed(),
    })
}

async fn read_all<R: AsyncRead + Unpin>(mut pipe: R) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut buf).await {
        tracing::debug!("Failed to read pipe: {}", e);
    }
    buf
}

async fn join_reader(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    match reader {
        Some(handle) => match handle.await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                tracing::debug!("Pipe reader failed: {}", e);
                String::new()
            }
        },
        None => String::new(),
    }
}

/// Build and spawn the child in its own process group with piped output
fn spawn(inv: &CommandInvocation) -> Result<Child> {
    let argv = inv.argv();
    let program = resolve_program(&argv[0])?;

    let mut cmd = Command::new(&program);
    cmd.args(&argv[1..]);
    inv.option().env_policy().apply(&mut cmd);
    for (key, value) in inv.env() {
        cmd.env(key, value);
    }
    cmd.stdin(if inv.stdin().is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|e| Error::Spawn {
        program: argv[0].clone(),
        source: e,
    })?;

    if let (Some(input), Some(mut stdin)) = (inv.stdin(), child.stdin.take()) {
        let input = input.to_vec();
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(&input).await {
                tracing::debug!("Failed to write stdin: {}", e);
            }
        });
    }

    Ok(child)
}

/// Resolve bare program names on the current PATH
fn resolve_program(program: &str) -> Result<PathBuf> {
    let path = PathBuf::from(program);
    if path.components().count() > 1 {
        return Ok(path);
    }
    which::which(program).map_err(|_| Error::ProgramNotFound {
        program: program.to_string(),
    })
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // The child was spawned with process_group(0), so its pid is the pgid.
        let result = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        if result != 0 {
            tracing::debug!(pid, "killpg failed; process group already gone");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {
    // kill_on_drop covers the direct child
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::exec::{EnvPolicy, ExecutionOption};

    fn sh() -> ExecutionOption {
        ExecutionOption::new(["sh", "-c"], EnvPolicy::Inherit).unwrap()
    }

    #[tokio::test]
    async fn test_captures_stdout_and_stderr() {
        let out = CommandInvocation::new(&sh(), ["echo out; echo err >&2"])
            .run()
            .await
            .unwrap();
        assert_eq!(out.stdout_lines(), vec!["out"]);
        assert_eq!(out.stderr.trim(), "err");
        assert!(out.success());
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_command_failed() {
        let err = CommandInvocation::new(&sh(), ["echo nope >&2; exit 3"])
            .run()
            .await
            .unwrap_err();
        match err {
            Error::CommandFailed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "nope");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_expect_failure() {
        let out = CommandInvocation::new(&sh(), ["exit 1"])
            .run_expect_failure()
            .await
            .unwrap();
        assert_eq!(out.code, Some(1));

        let err = CommandInvocation::new(&sh(), ["true"])
            .run_expect_failure()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TestAssertion(_)));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let started = Instant::now();
        let err = CommandInvocation::new(&sh(), ["sleep 30"])
            .with_timeout(Duration::from_millis(200))
            .run()
            .await
            .unwrap_err();
        assert!(err.is_timeout(), "expected timeout, got {err}");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    /// True once `pid` is gone or only a zombie awaiting its reaper
    fn is_dead(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Err(_) => true,
            // The comm field is parenthesized and may contain spaces.
            Ok(stat) => stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.split_whitespace().next())
                .map_or(false, |state| state == "Z" || state == "X"),
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_grandchildren() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("grandchild.pid");
        let script = format!("sleep 30 & echo $! > '{}'; wait", pid_file.display());

        let started = Instant::now();
        let err = CommandInvocation::new(&sh(), [script])
            .with_timeout(Duration::from_millis(500))
            .output()
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(10));

        let pid: u32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !is_dead(pid) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(is_dead(pid), "grandchild {pid} survived the timeout");
    }

    #[tokio::test]
    async fn test_capture_keeps_output_of_a_stream() {
        let started = Instant::now();
        let out = CommandInvocation::new(&sh(), ["echo first-event; sleep 30"])
            .capture_for(Duration::from_millis(500))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "first-event");
        assert_eq!(out.code, None);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_capture_returns_early_exit() {
        let out = CommandInvocation::new(&sh(), ["echo done; echo oops >&2; exit 3"])
            .capture_for(Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "done");
        assert_eq!(out.stderr.trim(), "oops");
        assert_eq!(out.code, Some(3));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let opt = ExecutionOption::new(["vm-e2e-definitely-not-installed"], EnvPolicy::Inherit)
            .unwrap();
        let err = CommandInvocation::new(&opt, ["start"]).run().await.unwrap_err();
        assert!(matches!(err, Error::ProgramNotFound { .. }));
    }

    #[tokio::test]
    async fn test_stdin_is_piped() {
        let opt = ExecutionOption::new(["cat"], EnvPolicy::Inherit).unwrap();
        let out = CommandInvocation::new(&opt, Vec::<String>::new())
            .with_stdin("hello from stdin")
            .run()
            .await
            .unwrap();
        assert_eq!(out.stdout, "hello from stdin");
    }

    #[tokio::test]
    async fn test_passthrough_controls_host_env() {
        std::env::set_var("VM_E2E_RUNNER_MARKER", "leaked");
        let script = ["echo \"marker=${VM_E2E_RUNNER_MARKER}\""];

        let inherit = ExecutionOption::new(["sh", "-c"], EnvPolicy::Inherit).unwrap();
        let isolated =
            ExecutionOption::new(["sh", "-c"], EnvPolicy::isolated(["PATH", "HOME"])).unwrap();

        let out = CommandInvocation::new(&inherit, script).run().await.unwrap();
        assert_eq!(out.stdout.trim(), "marker=leaked");

        let out = CommandInvocation::new(&isolated, script).run().await.unwrap();
        assert_eq!(out.stdout.trim(), "marker=");
    }

    #[tokio::test]
    async fn test_explicit_env_survives_isolation() {
        let isolated = ExecutionOption::new(["sh", "-c"], EnvPolicy::isolated(["PATH"])).unwrap();
        let out = CommandInvocation::new(&isolated, ["echo $EXPLICIT"])
            .with_env("EXPLICIT", "yes")
            .run()
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "yes");
    }
}
