//! Blocking execution of external commands with a time bound.
//!
//! Output is drained on reader threads that stream chunks back over a
//! channel. The caller stops listening at the deadline, so a background
//! process that inherited the pipes cannot hold the call open.

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use wait_timeout::ChildExt;

/// How long to keep collecting output after the child has exited.
const POST_EXIT_GRACE: Duration = Duration::from_secs(2);

const READ_CHUNK: usize = 8 * 1024;

/// Why an external command did not succeed.
#[derive(Debug)]
pub enum CommandFailure {
    /// The program could not be started (e.g. not on `PATH`).
    Spawn(std::io::Error),
    /// Waiting on the started program failed.
    Wait(std::io::Error),
    /// The program exited unsuccessfully. `code` is `None` when killed by a signal.
    Exit { code: Option<i32>, stderr: String },
    /// The program ran past the time bound and was killed.
    TimedOut(Duration),
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandFailure::Spawn(e) => write!(f, "could not start: {}", e),
            CommandFailure::Wait(e) => write!(f, "failed to wait for exit: {}", e),
            CommandFailure::Exit { code: Some(code), stderr } => {
                write!(f, "exited with status {}: {}", code, stderr.trim())
            }
            CommandFailure::Exit { code: None, stderr } => {
                write!(f, "terminated by signal: {}", stderr.trim())
            }
            CommandFailure::TimedOut(limit) => {
                write!(f, "timed out after {} seconds", limit.as_secs())
            }
        }
    }
}

/// Formats a program and its arguments for logs and error messages.
pub fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Runs `program args...` in `cwd` and returns its stdout on success.
///
/// The child is killed if it has not exited within `timeout`. Once it has
/// exited, output still arriving after a short grace period (or after the
/// deadline) is dropped.
pub fn run_command(
    program: &str,
    args: &[&str],
    cwd: &Path,
    timeout: Duration,
) -> Result<String, CommandFailure> {
    tracing::debug!(command = %command_line(program, args), cwd = ?cwd, "running command");

    let deadline = Instant::now() + timeout;
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(CommandFailure::Spawn)?;

    let (tx, rx) = mpsc::channel();
    if let Some(stdout) = child.stdout.take() {
        drain(stdout, Stream::Stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        drain(stderr, Stream::Stderr, tx.clone());
    }
    drop(tx);

    let status = match child.wait_timeout(timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            if let Err(e) = child.kill() {
                tracing::warn!(error = %e, "failed to kill timed out command");
            }
            let _ = child.wait();
            return Err(CommandFailure::TimedOut(timeout));
        }
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CommandFailure::Wait(e));
        }
    };

    let collect_until = deadline.min(Instant::now() + POST_EXIT_GRACE);
    let (stdout, stderr, complete) = collect(&rx, collect_until);
    if !complete {
        // Readers stay detached; a leftover background process owns the pipes.
        tracing::warn!(
            command = %command_line(program, args),
            "command exited but its output pipes are still open, likely held by a background process"
        );
    }

    if status.success() {
        Ok(stdout)
    } else {
        Err(CommandFailure::Exit {
            code: status.code(),
            stderr,
        })
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R, stream: Stream, tx: Sender<(Stream, Vec<u8>)>) {
    std::thread::spawn(move || {
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            match pipe.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send((stream, buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

/// Gathers output until both pipes close or `until` passes. The flag is
/// false when the deadline cut collection short.
fn collect(rx: &Receiver<(Stream, Vec<u8>)>, until: Instant) -> (String, String, bool) {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    let complete = loop {
        let left = until.saturating_duration_since(Instant::now());
        match rx.recv_timeout(left) {
            Ok((Stream::Stdout, chunk)) => stdout.extend_from_slice(&chunk),
            Ok((Stream::Stderr, chunk)) => stderr.extend_from_slice(&chunk),
            Err(RecvTimeoutError::Disconnected) => break true,
            Err(RecvTimeoutError::Timeout) => break false,
        }
    };

    (
        String::from_utf8_lossy(&stdout).into_owned(),
        String::from_utf8_lossy(&stderr).into_owned(),
        complete,
    )
}
