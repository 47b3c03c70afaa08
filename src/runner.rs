//! Process runner
//!
//! Launches a script under the environment's interpreter and hands its
//! output to the caller one line at a time.
//!
//! ## Stream model
//!
//! stdout and stderr share one OS pipe, so the reader sees a single stream
//! in the order the child wrote it. A worker thread per launch drains the
//! pipe and pushes [`RunEvent`]s onto a bounded channel. The foreground
//! drains the channel on its own schedule; the channel is the only hand-off
//! between the two.
//!
//! Every stream ends with exactly one terminal event, [`RunEvent::Exited`]
//! or [`RunEvent::Cancelled`], after which the channel closes.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use async_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{LauncherError, Result, ResultExt};

#[cfg(unix)]
use std::os::unix::process::CommandExt;

/// Lines buffered between the reader thread and the consumer. A full queue
/// blocks the reader, which in turn blocks the child on its pipe.
pub const LINE_QUEUE_CAPACITY: usize = 256;

/// Exit polling interval once the child has closed its output
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[cfg(unix)]
mod unix_process {
    use libc::{c_int, pid_t, ESRCH};

    /// Signal every process in the group led by `pgid`
    pub fn signal_group(pgid: u32, signal: c_int) -> std::io::Result<()> {
        // Safety: kill() has no memory safety requirements; a negative pid
        // addresses the process group
        let rc = unsafe { libc::kill(-(pgid as pid_t), signal) };
        if rc == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    /// True while any member of the group exists (EPERM counts as alive)
    pub fn group_alive(pgid: u32) -> bool {
        // Safety: signal 0 only checks for existence
        let rc = unsafe { libc::kill(-(pgid as pid_t), 0) };
        rc == 0 || std::io::Error::last_os_error().raw_os_error() != Some(ESRCH)
    }

    pub fn is_gone(err: &std::io::Error) -> bool {
        err.raw_os_error() == Some(ESRCH)
    }

    pub const SIGTERM: c_int = libc::SIGTERM;
    pub const SIGKILL: c_int = libc::SIGKILL;
}

/// One item of a launch's output stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// One line of merged stdout/stderr, without its line terminator
    Line(String),
    /// The child exited on its own. `code` is `None` when it was killed by a
    /// signal that did not come from [`RunningScript::cancel`].
    Exited { code: Option<i32> },
    /// The child was terminated through [`RunningScript::cancel`]
    Cancelled,
}

impl RunEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunEvent::Line(_))
    }
}

/// A launched script and the receiving end of its output stream
pub struct RunningScript {
    pid: u32,
    script: String,
    events: Receiver<RunEvent>,
    child: Arc<Mutex<Child>>,
    cancelled: Arc<AtomicBool>,
}

impl std::fmt::Debug for RunningScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningScript")
            .field("pid", &self.pid)
            .field("script", &self.script)
            .field("cancelled", &self.cancelled.load(Ordering::SeqCst))
            .finish()
    }
}

/// Start `<interpreter> <script> [args...]` with stderr merged into stdout.
///
/// Fails immediately when the process cannot be started; an empty stream is
/// never returned in place of an error.
#[instrument(level = "info", skip_all, fields(script = %script.display()))]
pub fn launch(script: &Path, interpreter: &Path, args: &[String]) -> Result<RunningScript> {
    let script_name = script.display().to_string();
    let launch_error = |source: std::io::Error| LauncherError::Launch {
        script: script_name.clone(),
        source,
    };

    let (reader, writer) = std::io::pipe().map_err(launch_error)?;

    // The Command holds the parent's copies of the write end; it must be
    // dropped right after spawning or the reader never sees EOF.
    let child = {
        let mut command = Command::new(interpreter);
        command
            .arg(script)
            .args(args)
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::null())
            .stdout(writer.try_clone().map_err(launch_error)?)
            .stderr(writer);

        #[cfg(unix)]
        command.process_group(0);

        command.spawn().map_err(launch_error)?
    };

    let pid = child.id();
    info!(
        pid,
        interpreter = %interpreter.display(),
        arg_count = args.len(),
        "Script launched"
    );

    let child = Arc::new(Mutex::new(child));
    let cancelled = Arc::new(AtomicBool::new(false));
    let (tx, rx) = async_channel::bounded(LINE_QUEUE_CAPACITY);

    let worker_child = Arc::clone(&child);
    let worker_cancelled = Arc::clone(&cancelled);
    let spawned = thread::Builder::new()
        .name(format!("app-book-run-{}", pid))
        .spawn(move || pump_output(reader, worker_child, worker_cancelled, tx));

    if let Err(e) = spawned {
        warn!(pid, error = %e, "Could not start output reader, killing child");
        let mut child = child.lock();
        child.kill().warn_on_err();
        child.wait().warn_on_err();
        return Err(launch_error(e));
    }

    Ok(RunningScript {
        pid,
        script: script_name,
        events: rx,
        child,
        cancelled,
    })
}

/// Reader thread body: forward lines, then report how the child ended
fn pump_output(
    reader: std::io::PipeReader,
    child: Arc<Mutex<Child>>,
    cancelled: Arc<AtomicBool>,
    tx: Sender<RunEvent>,
) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut consumer_gone = false;
    let mut line_count: u64 = 0;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                line_count += 1;
                if consumer_gone {
                    continue;
                }
                let line = String::from_utf8_lossy(trim_line_ending(&buf)).into_owned();
                // keep draining after the consumer leaves so the child never
                // blocks on a full pipe
                consumer_gone = tx.send_blocking(RunEvent::Line(line)).is_err();
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                if !cancelled.load(Ordering::SeqCst) {
                    warn!(error = %e, "Output stream read failed");
                }
                break;
            }
        }
    }
    drop(reader);

    let code = wait_for_exit(&child);
    let terminal = if cancelled.load(Ordering::SeqCst) {
        RunEvent::Cancelled
    } else {
        RunEvent::Exited { code }
    };
    debug!(lines = line_count, ?terminal, "Output stream finished");

    if !consumer_gone {
        let _ = tx.send_blocking(terminal);
    }
}

fn wait_for_exit(child: &Mutex<Child>) -> Option<i32> {
    // Poll rather than block in wait() so cancel() can still take the lock
    // when a child closes its output but keeps running.
    loop {
        match child.lock().try_wait() {
            Ok(Some(status)) => return status.code(),
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Could not collect child exit status");
                return None;
            }
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
}

fn trim_line_ending(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}

impl RunningScript {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    /// The receiving end of the output stream, for callers that poll
    pub fn events(&self) -> &Receiver<RunEvent> {
        &self.events
    }

    /// Block until the next event. `None` once the stream is exhausted.
    pub fn next_event(&self) -> Option<RunEvent> {
        self.events.recv_blocking().ok()
    }

    /// Non-blocking variant of [`next_event`](Self::next_event)
    pub fn try_next_event(&self) -> Option<RunEvent> {
        self.events.try_recv().ok()
    }

    /// Blocking iterator over the remaining events
    pub fn iter(&self) -> impl Iterator<Item = RunEvent> + '_ {
        std::iter::from_fn(move || self.next_event())
    }

    /// Whether the child process has terminated (its output may still be
    /// queued)
    pub fn has_exited(&self) -> bool {
        matches!(self.child.lock().try_wait(), Ok(Some(_)))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Terminate the script.
    ///
    /// On unix the whole process group gets SIGTERM, then SIGKILL if it is
    /// still alive after a short grace period. The stream then ends with
    /// [`RunEvent::Cancelled`]. A script that already exited is left alone
    /// and keeps its [`RunEvent::Exited`] report. Calling this more than
    /// once is harmless.
    #[instrument(level = "info", skip(self), fields(pid = self.pid))]
    pub fn cancel(&self) {
        {
            // While the lock is held the reader cannot reap the child, so the
            // pid (and process group) stays ours until SIGTERM is sent.
            let mut child = self.child.lock();
            match child.try_wait() {
                Ok(None) => {}
                Ok(Some(status)) => {
                    debug!(code = ?status.code(), "Script already exited, nothing to cancel");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "Cannot query script state, not signalling");
                    return;
                }
            }

            if self.cancelled.swap(true, Ordering::SeqCst) {
                debug!("Already cancelled");
                return;
            }

            #[cfg(unix)]
            if !request_group_exit(self.pid) {
                return;
            }

            #[cfg(not(unix))]
            {
                child.kill().warn_on_err();
                return;
            }
        }

        #[cfg(unix)]
        escalate_group_exit(self.pid);
    }
}

#[cfg(unix)]
const TERM_GRACE: Duration = Duration::from_millis(250);

/// Send SIGTERM to the group. Returns false when the group is already gone.
#[cfg(unix)]
fn request_group_exit(pgid: u32) -> bool {
    use unix_process::{is_gone, signal_group, SIGTERM};

    match signal_group(pgid, SIGTERM) {
        Ok(()) => debug!(pgid, "SIGTERM sent"),
        Err(e) if is_gone(&e) => {
            debug!(pgid, "Process group already exited");
            return false;
        }
        Err(e) => warn!(pgid, error = %e, "SIGTERM failed, escalating"),
    }
    true
}

/// Wait out the grace period, then SIGKILL whatever is left of the group
#[cfg(unix)]
fn escalate_group_exit(pgid: u32) {
    use unix_process::{group_alive, is_gone, signal_group, SIGKILL};

    const POLL_INTERVAL: Duration = Duration::from_millis(50);

    let start = std::time::Instant::now();
    while start.elapsed() < TERM_GRACE {
        if !group_alive(pgid) {
            info!(pgid, "Script terminated after SIGTERM");
            return;
        }
        thread::sleep(POLL_INTERVAL);
    }

    match signal_group(pgid, SIGKILL) {
        Ok(()) => info!(pgid, grace_ms = TERM_GRACE.as_millis() as u64, "Script killed"),
        Err(e) if is_gone(&e) => debug!(pgid, "Process group exited before SIGKILL"),
        Err(e) => warn!(pgid, error = %e, "SIGKILL failed"),
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
