//! Command execution transports.
//!
//! The [`Transport`] trait is the only path from the mission loop to the
//! managed target. Shell transports run vetted command strings through a
//! local shell, `docker exec` or `ssh`; the simulated transport answers from
//! canned fixtures so simulation missions never touch a real host.

use std::process::Command;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::platform::Platform;
use crate::io::config::TransportKind;
use crate::io::process::{ChildExit, ProcessError, run_bounded};

const OUTPUT_LIMIT_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("command timed out after {}s", .0.as_secs_f64())]
    TimedOut(Duration),
    #[error("failed to start transport: {0}")]
    Spawn(String),
    #[error("transport i/o failure: {0}")]
    Io(String),
}

/// Raw result of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOutput {
    pub stdout: String,
    pub stderr: String,
    /// `-1` when the process was terminated by a signal.
    pub exit_code: i32,
}

impl TransportOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
        }
    }
}

pub trait Transport {
    /// Execute one vetted command string, waiting at most `timeout`.
    fn execute(&self, command: &str, timeout: Duration) -> Result<TransportOutput, TransportError>;
}

/// Transport that shells out locally, into a container, or over SSH.
#[derive(Debug, Clone)]
pub struct ShellTransport {
    kind: TransportKind,
    target: String,
}

impl ShellTransport {
    pub fn new(kind: TransportKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
        }
    }

    fn build_command(&self, command: &str) -> Command {
        match self.kind {
            TransportKind::Local => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(command);
                cmd
            }
            TransportKind::Docker => {
                let mut cmd = Command::new("docker");
                cmd.arg("exec")
                    .arg(&self.target)
                    .arg("sh")
                    .arg("-c")
                    .arg(command);
                cmd
            }
            TransportKind::Ssh => {
                let mut cmd = Command::new("ssh");
                cmd.arg("-o")
                    .arg("BatchMode=yes")
                    .arg("-o")
                    .arg("ConnectTimeout=5")
                    .arg(&self.target)
                    .arg("--")
                    .arg(command);
                cmd
            }
        }
    }
}

impl Transport for ShellTransport {
    #[instrument(skip_all, fields(kind = ?self.kind, target = %self.target))]
    fn execute(&self, command: &str, timeout: Duration) -> Result<TransportOutput, TransportError> {
        debug!(command, "executing command");
        let output = run_bounded(self.build_command(command), None, timeout, OUTPUT_LIMIT_BYTES)
            .map_err(|err| {
                let message = err.to_string();
                if matches!(err, ProcessError::Spawn { .. }) {
                    TransportError::Spawn(message)
                } else {
                    TransportError::Io(message)
                }
            })?;

        let exit_code = match output.exit {
            ChildExit::Code(code) => code,
            ChildExit::TimedOut => {
                warn!(command, "command timed out");
                return Err(TransportError::TimedOut(timeout));
            }
        };
        Ok(TransportOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code,
        })
    }
}

/// Deterministic transport answering from canned fixtures.
///
/// Fixtures are consistent with the built-in simulation scenarios: a memory
/// hog (`stress-ng-vm`), an inactive `nginx`, a few listening ports and a
/// syslog with OOM-killer events.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedTransport;

pub const SIM_OS_RELEASE: &str = "PRETTY_NAME=\"Ubuntu 22.04.4 LTS\"\nNAME=\"Ubuntu\"\nVERSION_ID=\"22.04\"\nID=ubuntu\nID_LIKE=debian\n";

pub const SIM_PROCESS_TABLE: &str = "\
USER         PID %CPU %MEM    VSZ   RSS TTY      STAT START   TIME COMMAND
root        4242 97.3 38.5 2103308 1578240 ?     R    09:12  14:02 stress-ng-vm --vm-bytes 1500M
postgres     811  1.2  4.1 215432 168020 ?       Ss   08:01   0:41 postgres: checkpointer
root         902  0.4  1.9 1245872 77904 ?       Ssl  08:01   0:12 /usr/bin/containerd
www-data    1033  0.0  0.6  55284 24820 ?        S    08:02   0:00 nginx: worker process
root           1  0.0  0.3 167748 12924 ?        Ss   08:00   0:03 /sbin/init
";

const SIM_NGINX_STATUS: &str = "\
x nginx.service - A high performance web server and a reverse proxy server
     Loaded: loaded (/lib/systemd/system/nginx.service; enabled; vendor preset: enabled)
     Active: inactive (dead) since Mon 2026-10-19 09:30:11 UTC; 4min ago
";

const SIM_NET_STATS: &str = "\
Netid State  Recv-Q Send-Q Local Address:Port Peer Address:Port
tcp   LISTEN 0      128          0.0.0.0:22        0.0.0.0:*
tcp   LISTEN 0      511          0.0.0.0:80        0.0.0.0:*
tcp   LISTEN 0      244        127.0.0.1:5432      0.0.0.0:*
";

const SIM_SYSLOG: &str = "\
Oct 19 09:14:02 sandbox kernel: stress-ng-vm invoked oom-killer: gfp_mask=0x140cca
Oct 19 09:14:02 sandbox kernel: Out of memory: Killed process 4239 (stress-ng-vm)
Oct 19 09:20:45 sandbox systemd[1]: nginx.service: Main process exited, code=killed
";

impl Transport for SimulatedTransport {
    fn execute(&self, command: &str, _timeout: Duration) -> Result<TransportOutput, TransportError> {
        let words = shell_words::split(command).unwrap_or_default();
        let program = words.first().map(String::as_str).unwrap_or_default();
        let sub = words.get(1).map(String::as_str).unwrap_or_default();

        let output = match (program, sub) {
            ("cat", "/etc/os-release") => TransportOutput::success(SIM_OS_RELEASE),
            ("ps", _) => TransportOutput::success(SIM_PROCESS_TABLE),
            ("kill" | "printf", _) | ("systemctl", "restart") => TransportOutput::success(""),
            ("systemctl", "status") => TransportOutput {
                stdout: SIM_NGINX_STATUS.to_string(),
                stderr: String::new(),
                exit_code: 3,
            },
            ("ss", _) => TransportOutput::success(SIM_NET_STATS),
            ("tail", _) => TransportOutput::success(SIM_SYSLOG),
            ("grep", _) => TransportOutput::success(
                "2-Oct 19 09:14:02 sandbox kernel: Out of memory: Killed process 4239 (stress-ng-vm)\n",
            ),
            ("ls", _) => TransportOutput::success("app/\nlog/\nnginx.conf\n"),
            _ => TransportOutput::failure(127, format!("sh: 1: {program}: not found\n")),
        };
        Ok(output)
    }
}

/// Detect the target platform once per mission. Failures fall back to the
/// default platform.
#[instrument(skip_all)]
pub fn detect_platform(transport: &dyn Transport, timeout: Duration) -> Platform {
    match transport.execute("cat /etc/os-release", timeout) {
        Ok(output) if output.exit_code == 0 => Platform::detect(&output.stdout),
        Ok(output) => {
            warn!(exit_code = output.exit_code, "os-release unavailable, using default platform");
            Platform::default()
        }
        Err(err) => {
            warn!(err = %err, "platform detection failed, using default platform");
            Platform::default()
        }
    }
}
