//! Helpers for running child processes with timeouts and bounded output.

use std::io::{ErrorKind, Read, Write};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

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
    pub fn stderr_lossy(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stderr).trim().to_string();
        if self.stderr_truncated > 0 {
            text.push_str(&format!(
                "\n[stderr truncated {} bytes]",
                self.stderr_truncated
            ));
        }
        text
    }
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Stdin is fed and stdout/stderr are drained on their own threads while the child runs, so
/// the timeout holds even for a child that never reads its input. `output_limit_bytes` bounds
/// the stdout/stderr kept in memory; bytes beyond it are drained and discarded.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = cmd
        .spawn()
        .inspect_err(|e| error!(err = %e, "failed to spawn command"))
        .context("spawn command")?;

    match supervise(&mut child, stdin, timeout, output_limit_bytes) {
        Ok(output) => Ok(output),
        Err(err) => {
            reap(&mut child);
            Err(err)
        }
    }
}

/// Kill and wait for a child that is being abandoned.
fn reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!(err = %e, "kill after failure");
    }
    if let Err(e) = child.wait() {
        warn!(err = %e, "wait after failure");
    }
}

fn supervise(
    child: &mut Child,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let writer = match stdin {
        Some(input) => {
            let pipe = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("stdin was not piped"))?;
            let input = input.to_vec();
            Some(thread::spawn(move || write_input(pipe, &input)))
        }
        None => None,
    };

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    // The child is reaped by now, so a blocked writer sees a closed pipe.
    if let Some(writer) = writer {
        join_thread(writer).context("write stdin")?;
    }
    let (stdout, stdout_truncated) = join_thread(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_thread(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
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

/// Write `input` and close the pipe. A child that exits without reading
/// closes its end early; that is not an error.
fn write_input(mut pipe: ChildStdin, input: &[u8]) -> Result<()> {
    match pipe.write_all(input) {
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
            debug!("child closed stdin early");
            Ok(())
        }
        other => other.context("write to child stdin"),
    }
}

fn join_thread<T>(handle: thread::JoinHandle<Result<T>>) -> Result<T> {
    handle
        .join()
        .map_err(|_| anyhow!("pipe thread panicked"))?
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
