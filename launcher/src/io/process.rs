//! Helpers for running child processes that honor shutdown requests.
//!
//! Every child leads its own process group. Children are polled with a short
//! timeout so a SIGINT/SIGTERM recorded in [`Shutdown`] is noticed while they
//! run; the group then gets SIGTERM, and SIGKILL once the grace period is
//! over. Output can be relayed line by line to the console and a log file at
//! the same time.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::io::run_log::Console;
use crate::io::signals::Shutdown;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How long relayed output may keep flowing after the child is gone.
///
/// A descendant that inherited the output pipe can hold it open
/// indefinitely; past this point the relay is left to finish on its own.
const RELAY_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How a child process run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    /// The child exited; `None` when it was killed by a signal.
    Exited(Option<i32>),
    /// Shutdown was requested while the child ran. The child has been reaped.
    Interrupted,
}

impl ChildExit {
    pub fn success(self) -> bool {
        self == ChildExit::Exited(Some(0))
    }
}

/// Destination for relayed child output: console plus a dedicated log file.
pub struct Tee {
    log: Mutex<File>,
    console: Console,
}

impl Tee {
    pub fn new(log: File, console: Console) -> Arc<Self> {
        Arc::new(Self {
            log: Mutex::new(log),
            console,
        })
    }

    /// Write one line of child output to the console and the log.
    pub fn write_line(&self, line: &[u8]) {
        if let Ok(mut console) = self.console.lock()
            && let Err(e) = console.write_all(line).and_then(|()| console.flush())
        {
            warn!(err = %e, "failed to relay child output to console");
        }
        if let Ok(mut log) = self.log.lock()
            && let Err(e) = log.write_all(line)
        {
            warn!(err = %e, "failed to append child output to log");
        }
    }
}

/// Whether a non-relayed child's output reaches the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Inherit,
    Discard,
}

/// Run a command to completion without capturing its output.
#[instrument(skip_all, fields(program = ?cmd.get_program(), mode = ?mode))]
pub fn run_plain(
    mut cmd: Command,
    mode: OutputMode,
    shutdown: &Shutdown,
    grace: Duration,
) -> io::Result<ChildExit> {
    cmd.stdin(Stdio::null());
    if mode == OutputMode::Discard {
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
    }
    let mut child = spawn(&mut cmd)?;
    supervise(&mut child, shutdown, grace)
}

/// Run a command with stdout and stderr merged into one pipe, relaying it
/// through `tee`.
///
/// Both streams share the pipe the way `2>&1` does, so lines keep the order
/// the child wrote them in. A failure while relaying is logged and does not
/// replace the child's exit status.
#[instrument(skip_all, fields(program = ?cmd.get_program()))]
pub fn run_tee(
    mut cmd: Command,
    tee: Arc<Tee>,
    shutdown: &Shutdown,
    grace: Duration,
) -> io::Result<ChildExit> {
    let (reader, writer) = io::pipe()?;
    cmd.stdin(Stdio::null())
        .stdout(writer.try_clone()?)
        .stderr(writer);
    let spawned = spawn(&mut cmd);
    // The command still owns the write ends; the relay only sees EOF once they are closed.
    drop(cmd);
    let mut child = spawned?;

    let (done_tx, done_rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = done_tx.send(relay_lines(reader, &tee));
    });

    let exit = supervise(&mut child, shutdown, grace)?;

    match done_rx.recv_timeout(RELAY_DRAIN_TIMEOUT) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(err = %e, "relaying child output failed"),
        Err(RecvTimeoutError::Timeout) => {
            debug!("output pipe still held open by a descendant, detaching relay");
        }
        Err(RecvTimeoutError::Disconnected) => warn!("output relay thread panicked"),
    }
    Ok(exit)
}

/// Send `signal` to the process group led by `pid`.
///
/// A group that no longer exists is not an error.
pub fn signal_group(pid: u32, signal: Signal) -> io::Result<()> {
    let pgid = i32::try_from(pid).map_err(|_| io::Error::other("pid out of range"))?;
    match killpg(Pid::from_raw(pgid), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(errno.into()),
    }
}

fn spawn(cmd: &mut Command) -> io::Result<Child> {
    debug!("spawning child process");
    cmd.process_group(0)
        .spawn()
        .inspect_err(|e| error!(err = %e, "failed to spawn command"))
}

/// Wait for `child` while exposing its group to a forced exit.
fn supervise(child: &mut Child, shutdown: &Shutdown, grace: Duration) -> io::Result<ChildExit> {
    shutdown.set_child(Some(child.id()));
    let exit = wait_for_exit(child, shutdown, grace);
    shutdown.set_child(None);
    exit
}

fn wait_for_exit(child: &mut Child, shutdown: &Shutdown, grace: Duration) -> io::Result<ChildExit> {
    loop {
        if let Some(status) = child.wait_timeout(POLL_INTERVAL)? {
            debug!(exit_code = ?status.code(), "command finished");
            return Ok(ChildExit::Exited(status.code()));
        }
        if shutdown.is_requested() {
            return stop_child(child, grace);
        }
    }
}

fn stop_child(child: &mut Child, grace: Duration) -> io::Result<ChildExit> {
    let pid = child.id();
    debug!(pid, grace_secs = grace.as_secs(), "shutdown requested, terminating child process group");
    signal_group(pid, Signal::SIGTERM)?;
    if child.wait_timeout(grace)?.is_none() {
        debug!(pid, "child still running after grace period, killing process group");
        signal_group(pid, Signal::SIGKILL)?;
        child.wait()?;
    }
    Ok(ChildExit::Interrupted)
}

fn relay_lines<R: Read>(reader: R, tee: &Tee) -> io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(());
        }
        tee.write_line(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::CapturedConsole;
    use std::fs;
    use std::time::Instant;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    fn log_tee(temp: &tempfile::TempDir) -> (Arc<Tee>, CapturedConsole, std::path::PathBuf) {
        let log_path = temp.path().join("app.log");
        let console = CapturedConsole::new();
        let tee = Tee::new(File::create(&log_path).expect("create"), console.sink());
        (tee, console, log_path)
    }

    #[test]
    fn tee_merges_streams_into_console_and_log() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (tee, console, log_path) = log_tee(&temp);

        let exit = run_tee(
            sh("echo out-1; echo err-1 >&2; echo out-2"),
            tee,
            &Shutdown::new(),
            Duration::from_secs(1),
        )
        .expect("run");

        assert_eq!(exit, ChildExit::Exited(Some(0)));
        let log = fs::read_to_string(&log_path).expect("read log");
        assert_eq!(log, "out-1\nerr-1\nout-2\n");
        assert_eq!(console.contents(), log);
    }

    #[test]
    fn merged_streams_keep_write_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (tee, _console, log_path) = log_tee(&temp);

        let exit = run_tee(
            sh("i=0; while [ $i -lt 200 ]; do echo o$i; echo e$i >&2; i=$((i+1)); done"),
            tee,
            &Shutdown::new(),
            Duration::from_secs(1),
        )
        .expect("run");

        assert_eq!(exit, ChildExit::Exited(Some(0)));
        let expected: Vec<String> = (0..200)
            .flat_map(|i| [format!("o{i}"), format!("e{i}")])
            .collect();
        let log = fs::read_to_string(&log_path).expect("read log");
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines, expected);
    }

    #[test]
    fn shutdown_sends_sigterm_to_child_group() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (tee, console, log_path) = log_tee(&temp);
        let shutdown = Shutdown::new();

        let requester = {
            let shutdown = shutdown.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    if console.contents().contains("ready") {
                        break;
                    }
                    thread::sleep(Duration::from_millis(50));
                }
                shutdown.request();
            })
        };

        let started = Instant::now();
        let exit = run_tee(
            sh("trap 'echo got-term; exit 0' TERM; echo ready; while :; do sleep 0.1; done"),
            tee,
            &shutdown,
            Duration::from_secs(20),
        )
        .expect("run");
        requester.join().expect("requester");

        assert_eq!(exit, ChildExit::Interrupted);
        assert!(started.elapsed() < Duration::from_secs(15));
        let log = fs::read_to_string(&log_path).expect("read log");
        assert!(log.contains("got-term"), "child never saw SIGTERM: {log}");
    }

    #[test]
    fn descendant_holding_the_pipe_does_not_block_return() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (tee, _console, log_path) = log_tee(&temp);

        let started = Instant::now();
        let exit = run_tee(
            sh("sleep 8 & echo parent-done"),
            tee,
            &Shutdown::new(),
            Duration::from_secs(1),
        )
        .expect("run");

        assert_eq!(exit, ChildExit::Exited(Some(0)));
        assert!(started.elapsed() < Duration::from_secs(6));
        let log = fs::read_to_string(&log_path).expect("read log");
        assert_eq!(log, "parent-done\n");
    }

    #[test]
    fn exit_code_is_reported() {
        let exit = run_plain(
            sh("exit 7"),
            OutputMode::Discard,
            &Shutdown::new(),
            Duration::from_secs(1),
        )
        .expect("run");
        assert_eq!(exit, ChildExit::Exited(Some(7)));
        assert!(!exit.success());
    }

    #[test]
    fn spawn_failure_is_an_error() {
        let err = run_plain(
            Command::new("/nonexistent/launcher-test-binary"),
            OutputMode::Discard,
            &Shutdown::new(),
            Duration::from_secs(1),
        )
        .expect_err("spawn should fail");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn shutdown_request_stops_long_running_child() {
        let shutdown = Shutdown::new();
        shutdown.request();

        let started = Instant::now();
        let exit = run_plain(
            sh("sleep 30"),
            OutputMode::Discard,
            &shutdown,
            Duration::from_millis(100),
        )
        .expect("run");

        assert_eq!(exit, ChildExit::Interrupted);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
