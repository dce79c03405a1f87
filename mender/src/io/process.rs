//! Bounded child processes shared by shell transports and command backends.
//!
//! A child gets its stdin fed and both output pipes drained on helper threads
//! while the caller waits with a deadline, so neither a chatty child nor a
//! large prompt can deadlock the mission thread.

use std::io::{self, Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

#[derive(Debug, Error)]
pub enum ProcessError {
    /// The program could not be started (missing binary, permissions).
    #[error("spawn {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("{step}: {source}")]
    Io {
        step: &'static str,
        source: io::Error,
    },
    #[error("{0} thread panicked")]
    Panicked(&'static str),
}

/// How the child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    /// Exit code, or `-1` when the child was killed by a signal.
    Code(i32),
    /// The deadline passed and the child was killed.
    TimedOut,
}

#[derive(Debug)]
pub struct ChildOutput {
    pub exit: ChildExit,
    pub stdout: String,
    pub stderr: String,
    /// Bytes drained past `output_limit` on either stream.
    pub dropped_bytes: u64,
}

impl ChildOutput {
    pub fn succeeded(&self) -> bool {
        self.exit == ChildExit::Code(0)
    }
}

/// Run `cmd` to completion or until `timeout`, keeping at most `output_limit`
/// bytes of each output stream.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs()))]
pub fn run_bounded(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit: usize,
) -> Result<ChildOutput, ProcessError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    #[cfg(unix)]
    std::os::unix::process::CommandExt::process_group(&mut cmd, 0);

    let mut child = cmd
        .spawn()
        .map_err(|source| ProcessError::Spawn { program, source })?;
    debug!(pid = child.id(), "child started");

    let writer = stdin.map(|input| feed(&mut child, input.to_vec()));
    let stdout = drain(child.stdout.take(), output_limit);
    let stderr = drain(child.stderr.take(), output_limit);

    let Some(status) = child.wait_timeout(timeout).map_err(io_step("wait for child"))? else {
        warn!("deadline passed, killing child process group");
        kill_group(&mut child)?;
        child.wait().map_err(io_step("reap child"))?;
        // A descendant that left the group may still hold the pipes open, so
        // the helper threads are left to finish on their own.
        return Ok(ChildOutput {
            exit: ChildExit::TimedOut,
            stdout: String::new(),
            stderr: String::new(),
            dropped_bytes: 0,
        });
    };
    let exit = ChildExit::Code(status.code().unwrap_or(-1));

    if let Some(writer) = writer {
        match join(writer, "stdin writer")? {
            Err(err) if err.kind() != io::ErrorKind::BrokenPipe => {
                return Err(ProcessError::Io {
                    step: "write stdin",
                    source: err,
                });
            }
            _ => {}
        }
    }
    let (stdout, dropped_out) = join(stdout, "stdout reader")?.map_err(io_step("read stdout"))?;
    let (stderr, dropped_err) = join(stderr, "stderr reader")?.map_err(io_step("read stderr"))?;

    let dropped_bytes = dropped_out + dropped_err;
    if dropped_bytes > 0 {
        warn!(dropped_bytes, "child output exceeded limit");
    }
    debug!(?exit, "child finished");
    Ok(ChildOutput {
        exit,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        dropped_bytes,
    })
}

/// Kill the child together with every process still in its group.
#[cfg(unix)]
fn kill_group(child: &mut Child) -> Result<(), ProcessError> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = Pid::from_raw(child.id() as i32);
    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(ProcessError::Io {
            step: "kill child group",
            source: io::Error::from(errno),
        }),
    }
}

#[cfg(not(unix))]
fn kill_group(child: &mut Child) -> Result<(), ProcessError> {
    child.kill().map_err(io_step("kill child"))
}

fn io_step(step: &'static str) -> impl FnOnce(io::Error) -> ProcessError {
    move |source| ProcessError::Io { step, source }
}

/// Write `input` and close the pipe so the child sees EOF.
fn feed(child: &mut Child, input: Vec<u8>) -> JoinHandle<io::Result<()>> {
    let pipe = child.stdin.take();
    thread::spawn(move || match pipe {
        Some(mut pipe) => pipe.write_all(&input),
        None => Ok(()),
    })
}

/// Keep the first `limit` bytes and discard the rest while still draining.
fn drain<R>(pipe: Option<R>, limit: usize) -> JoinHandle<io::Result<(Vec<u8>, u64)>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let Some(mut pipe) = pipe else {
            return Ok((Vec::new(), 0));
        };
        let mut kept = Vec::new();
        (&mut pipe).take(limit as u64).read_to_end(&mut kept)?;
        let dropped = io::copy(&mut pipe, &mut io::sink())?;
        Ok((kept, dropped))
    })
}

fn join<T>(handle: JoinHandle<T>, name: &'static str) -> Result<T, ProcessError> {
    handle.join().map_err(|_| ProcessError::Panicked(name))
}
