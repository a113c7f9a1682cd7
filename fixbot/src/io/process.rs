//! Helpers for running child processes with timeouts and bounded output.

use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Where a child's output is echoed while it is being captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Echo {
    /// Capture only.
    Silent,
    /// Echo both stdout and stderr to our stdout (progress output).
    Stdout,
    /// Echo stdout to stdout and stderr to stderr.
    Passthrough,
}

#[derive(Debug, Clone, Copy)]
enum Sink {
    Discard,
    Stdout,
    Stderr,
}

impl Echo {
    fn sinks(self) -> (Sink, Sink) {
        match self {
            Echo::Silent => (Sink::Discard, Sink::Discard),
            Echo::Stdout => (Sink::Stdout, Sink::Stdout),
            Echo::Passthrough => (Sink::Stdout, Sink::Stderr),
        }
    }
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    pub fn stderr_truncated_notice(&self, label: &str) -> String {
        if self.stderr_truncated > 0 {
            format!(" [{label} stderr truncated {} bytes]", self.stderr_truncated)
        } else {
            String::new()
        }
    }
}

/// Run a command with a timeout, capturing stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs and echoed line by line
/// according to `echo`. `output_limit_bytes` bounds what is kept in memory per
/// stream; bytes beyond it are still drained (and echoed) but discarded.
///
/// On unix the child leads its own process group. A timed-out child is killed
/// together with its descendants (git transport helpers, interpreter
/// subprocesses) so that no grandchild keeps the pipes open, and is reported
/// with `timed_out = true`.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes, echo = ?echo))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
    echo: Echo,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!(program = ?cmd.get_program(), "spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, program = ?cmd.get_program(), "failed to spawn command");
            return Err(e).with_context(|| format!("spawn {}", cmd.get_program().to_string_lossy()));
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let (stdout_sink, stderr_sink) = echo.sinks();
    let stdout_handle =
        thread::spawn(move || read_stream_limited(stdout, output_limit_bytes, stdout_sink));
    let stderr_handle =
        thread::spawn(move || read_stream_limited(stderr, output_limit_bytes, stderr_sink));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            kill_tree(&mut child).context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        debug!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// Kill the child's whole process group.
#[cfg(unix)]
fn kill_tree(child: &mut Child) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = i32::try_from(child.id()).context("child pid out of range")?;
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        // Group already gone; reap the leader below.
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => {
            warn!(err = %e, pgid, "killpg failed, killing child only");
            child.kill().context("kill child")
        }
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) -> Result<()> {
    child.kill().context("kill child")
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

/// Read a stream line by line with a size limit, echoing each line to `sink`.
fn read_stream_limited<R: Read>(reader: R, limit: usize, sink: Sink) -> Result<(Vec<u8>, usize)> {
    let mut buf_reader = BufReader::new(reader);
    let mut collected = Vec::new();
    let mut truncated = 0usize;

    loop {
        let mut line = Vec::new();
        let n = buf_reader
            .read_until(b'\n', &mut line)
            .context("read output")?;
        if n == 0 {
            break;
        }

        echo_line(sink, &line);

        let remaining = limit.saturating_sub(collected.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            collected.extend_from_slice(&line[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((collected, truncated))
}

fn echo_line(sink: Sink, line: &[u8]) {
    let result = match sink {
        Sink::Discard => return,
        Sink::Stdout => {
            let mut out = std::io::stdout().lock();
            out.write_all(line).and_then(|()| out.flush())
        }
        Sink::Stderr => {
            let mut err = std::io::stderr().lock();
            err.write_all(line).and_then(|()| err.flush())
        }
    };
    // A closed stdout must not abort the child; keep draining.
    if let Err(e) = result {
        warn!(err = %e, "failed to echo child output");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_both_streams_and_status() {
        let output = run_command_with_timeout(
            sh("echo out; echo err >&2; exit 3"),
            Duration::from_secs(10),
            1000,
            Echo::Silent,
        )
        .expect("run");
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.stdout_lossy(), "out\n");
        assert_eq!(output.stderr_lossy(), "err\n");
        assert!(!output.timed_out);
    }

    #[test]
    fn truncates_beyond_limit_but_drains() {
        let output = run_command_with_timeout(
            sh("printf 'abcdefghij'"),
            Duration::from_secs(10),
            4,
            Echo::Silent,
        )
        .expect("run");
        assert_eq!(output.stdout, b"abcd");
        assert_eq!(output.stdout_truncated, 6);
        assert!(output.status.success());
    }

    #[test]
    fn kills_on_timeout() {
        let output = run_command_with_timeout(
            sh("exec sleep 5"),
            Duration::from_millis(200),
            1000,
            Echo::Silent,
        )
        .expect("run");
        assert!(output.timed_out);
        assert!(!output.status.success());
    }

    #[test]
    fn timeout_kills_grandchildren_holding_the_pipes() {
        let started = std::time::Instant::now();
        let output = run_command_with_timeout(
            sh("sleep 5; echo done"),
            Duration::from_millis(200),
            1000,
            Echo::Silent,
        )
        .expect("run");
        assert!(output.timed_out);
        assert!(output.stdout.is_empty());
        assert!(
            started.elapsed() < Duration::from_secs(3),
            "returned after {:?}",
            started.elapsed()
        );
    }

    #[test]
    fn spawn_failure_names_program() {
        let err = run_command_with_timeout(
            Command::new("/nonexistent/fixbot-test-binary"),
            Duration::from_secs(1),
            1000,
            Echo::Silent,
        )
        .unwrap_err();
        assert!(err.to_string().contains("fixbot-test-binary"));
    }
}
