use anyhow::{Context, Result};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Outcome of a single execution of the shell under test.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunResult {
    /// `None` when the process never produced a status (timeout, launch failure).
    /// Death by signal `n` is recorded as `-n`.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub problem: Option<String>,
}

impl RunResult {
    fn problem(message: String) -> Self {
        Self {
            problem: Some(message),
            ..Self::default()
        }
    }
}

/// Runs `shell` with no arguments inside `workdir`, feeding `input` as stdin.
///
/// Only failing to open `input` is an error. Timeouts and launch failures are
/// reported through [`RunResult::problem`].
pub fn run_shell(shell: &Path, input: &Path, workdir: &Path, timeout: Duration) -> Result<RunResult> {
    let stdin = File::open(input).with_context(|| format!("opening test input {input:?}"))?;

    let mut command = Command::new(shell);
    command
        .current_dir(workdir)
        .stdin(Stdio::from(stdin))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // Own process group so a timeout also takes down anything the shell forked.
        .process_group(0);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Ok(RunResult::problem(format!(
                "Could not find executable: {}",
                shell.display()
            )));
        }
        Err(err) => {
            return Ok(RunResult::problem(format!(
                "Could not launch {}: {err}",
                shell.display()
            )));
        }
    };

    let stdout_rx = drain(child.stdout.take());
    let stderr_rx = drain(child.stderr.take());
    let deadline = Instant::now() + timeout;
    let timed_out = || RunResult::problem(format!("TIMEOUT after {}s", timeout.as_secs()));

    let Some(status) = wait_until(&mut child, deadline)? else {
        terminate(&mut child);
        return Ok(timed_out());
    };

    // A background job may still hold the pipes open after the shell exits.
    let (Some(stdout), Some(stderr)) = (collect(&stdout_rx, deadline), collect(&stderr_rx, deadline))
    else {
        terminate(&mut child);
        return Ok(timed_out());
    };

    log::debug!(
        "[CMD ] {} < {} -> status {:?}, stdout {}B, stderr {}B",
        shell.display(),
        input.display(),
        exit_code(status),
        stdout.len(),
        stderr.len()
    );

    Ok(RunResult {
        exit_code: exit_code(status),
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        problem: None,
    })
}

fn exit_code(status: ExitStatus) -> Option<i32> {
    status.code().or_else(|| status.signal().map(|sig| -sig))
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send(buf);
    });
    rx
}

fn collect(rx: &Receiver<Vec<u8>>, deadline: Instant) -> Option<Vec<u8>> {
    rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
        .ok()
}

fn wait_until(child: &mut Child, deadline: Instant) -> Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait().context("waiting for shell")? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn terminate(child: &mut Child) {
    if let Ok(pid) = i32::try_from(child.id()) {
        let _ = killpg(Pid::from_raw(pid), Signal::SIGKILL);
    }
    let _ = child.kill();
    let _ = child.wait();
}
