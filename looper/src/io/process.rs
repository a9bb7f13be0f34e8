//! Running the agent child process with live mirroring and bounded capture.
//!
//! Stdout and stderr are consumed by reader threads while the child runs:
//! each line is mirrored to the controlling terminal as it arrives, buffered
//! (up to a byte limit) for session-id extraction, and optionally teed
//! verbatim to an event-log file. The wait is interrupt-aware: when the
//! cancellation flag is set mid-wait the child is killed, and the resulting
//! close is observed by the same wait rather than surfacing as an error.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::interrupt::Interrupt;

/// Knobs for one streamed child run.
#[derive(Debug, Clone)]
pub struct StreamParams {
    /// Bound on the in-memory capture of each stream. Mirroring and the
    /// event-log tee keep draining past the limit.
    pub output_limit_bytes: usize,
    /// How often the wait loop checks the interrupt flag.
    pub poll_interval: Duration,
    /// When set, stdout bytes are written verbatim to this file.
    pub events_path: Option<PathBuf>,
}

/// Captured outcome of one child run.
#[derive(Debug)]
pub struct ChildOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    /// True when the close was forced by a cancellation request.
    pub interrupted: bool,
}

impl ChildOutput {
    pub fn combined_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        text.push('\n');
        text.push_str(&String::from_utf8_lossy(&self.stderr));
        text
    }
}

/// Spawn `cmd` and stream it to completion.
///
/// Fails only when the child cannot be started or errors before producing a
/// close event; a nonzero exit is a normal outcome. The child is registered
/// as "current" on `interrupt` for the duration of the run.
#[instrument(skip_all, fields(events = params.events_path.is_some()))]
pub fn run_streaming(
    mut cmd: Command,
    params: &StreamParams,
    interrupt: &Interrupt,
) -> Result<ChildOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning agent process");
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            error!(err = %err, "failed to spawn agent process");
            return Err(err).context("spawn agent process");
        }
    };
    interrupt.register_child(child.id());

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let tee = match params.events_path.as_deref() {
        Some(path) => Some(open_tee(path)?),
        None => None,
    };
    let tee = Arc::new(tee);
    let limit = params.output_limit_bytes;

    let stdout_tee = Arc::clone(&tee);
    let stdout_handle =
        thread::spawn(move || mirror_lines(stdout, limit, MirrorTarget::Stdout, stdout_tee));
    let stderr_handle =
        thread::spawn(move || mirror_lines(stderr, limit, MirrorTarget::Stderr, Arc::new(None)));

    let mut interrupted = false;
    let status = loop {
        if interrupt.is_requested() {
            warn!("cancellation requested, terminating agent process");
            interrupted = true;
            child.kill().context("terminate agent process")?;
            break child.wait().context("wait agent process after terminate")?;
        }
        match child
            .wait_timeout(params.poll_interval)
            .context("wait for agent process")?
        {
            Some(status) => break status,
            None => continue,
        }
    };
    interrupt.clear_child();

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "capture truncated");
    }

    debug!(exit_code = ?status.code(), interrupted, "agent process finished");
    Ok(ChildOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        interrupted,
    })
}

enum MirrorTarget {
    Stdout,
    Stderr,
}

type Tee = Mutex<std::io::BufWriter<std::fs::File>>;

fn open_tee(path: &Path) -> Result<Tee> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create event log dir {}", parent.display()))?;
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("create event log {}", path.display()))?;
    Ok(Mutex::new(std::io::BufWriter::new(file)))
}

/// Read a stream line by line, mirroring each line live, teeing it when a
/// sink is attached, and collecting up to `limit` bytes.
fn mirror_lines<R: Read>(
    reader: R,
    limit: usize,
    target: MirrorTarget,
    tee: Arc<Option<Tee>>,
) -> Result<(Vec<u8>, usize)> {
    use std::io::BufRead;

    let mut buf_reader = std::io::BufReader::new(reader);
    let mut collected = Vec::new();
    let mut truncated = 0usize;

    loop {
        let mut line = Vec::new();
        let n = buf_reader
            .read_until(b'\n', &mut line)
            .context("read agent output")?;
        if n == 0 {
            break;
        }

        match target {
            MirrorTarget::Stdout => {
                let mut out = std::io::stdout().lock();
                let _ = out.write_all(&line);
                let _ = out.flush();
            }
            MirrorTarget::Stderr => {
                let mut err = std::io::stderr().lock();
                let _ = err.write_all(&line);
                let _ = err.flush();
            }
        }

        if let Some(ref mutex) = *tee
            && let Ok(mut writer) = mutex.lock()
        {
            if let Err(err) = writer.write_all(&line) {
                warn!(err = %err, "failed to write event log");
            } else if let Err(err) = writer.flush() {
                warn!(err = %err, "failed to flush event log");
            }
        }

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

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(events_path: Option<PathBuf>) -> StreamParams {
        StreamParams {
            output_limit_bytes: 100_000,
            poll_interval: Duration::from_millis(50),
            events_path,
        }
    }

    #[test]
    fn captures_both_streams() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo out-line; echo err-line >&2");
        let output = run_streaming(cmd, &params(None), &Interrupt::new()).expect("run");
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout), "out-line\n");
        assert_eq!(String::from_utf8_lossy(&output.stderr), "err-line\n");
        assert!(!output.interrupted);
    }

    #[test]
    fn spawn_failure_is_an_error() {
        let cmd = Command::new("looper-test-no-such-binary");
        let err = run_streaming(cmd, &params(None), &Interrupt::new()).unwrap_err();
        assert!(err.to_string().contains("spawn agent process"));
    }

    #[test]
    fn nonzero_exit_is_a_normal_outcome() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("exit 7");
        let output = run_streaming(cmd, &params(None), &Interrupt::new()).expect("run");
        assert_eq!(output.status.code(), Some(7));
    }

    #[test]
    fn tees_stdout_to_event_log() {
        let temp = tempfile::tempdir().expect("tempdir");
        let events = temp.path().join("artifacts").join("events.jsonl");
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("printf 'a\\nb\\n'");
        let output =
            run_streaming(cmd, &params(Some(events.clone())), &Interrupt::new()).expect("run");
        assert_eq!(String::from_utf8_lossy(&output.stdout), "a\nb\n");
        assert_eq!(std::fs::read_to_string(&events).expect("read"), "a\nb\n");
    }

    #[test]
    fn pending_interrupt_terminates_child() {
        let interrupt = Interrupt::new();
        interrupt.request();
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let started = std::time::Instant::now();
        let output = run_streaming(cmd, &params(None), &interrupt).expect("run");
        assert!(output.interrupted);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!output.status.success());
    }

    #[test]
    fn capture_limit_bounds_memory_not_draining() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("printf 'abcdefgh\\nijklmnop\\n'");
        let output = run_streaming(
            cmd,
            &StreamParams {
                output_limit_bytes: 10,
                poll_interval: Duration::from_millis(50),
                events_path: None,
            },
            &Interrupt::new(),
        )
        .expect("run");
        assert_eq!(output.stdout.len(), 10);
        assert_eq!(output.stdout_truncated, 8);
    }
}
