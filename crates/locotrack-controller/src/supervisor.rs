//! [`BridgeSupervisor`] – lifecycle of the bridge child process.
//!
//! The bridge is spawned in its own process group so a Ctrl-C aimed at the
//! controller's terminal does not reach it; the supervisor alone decides
//! when it stops.  Shutdown is two-phase:
//!
//! 1. SIGTERM, then wait up to the caller's timeout;
//! 2. if the child is still alive, SIGKILL followed (on unix) by a
//!    redundant SIGTERM, both sent before the child is reaped so its pid
//!    cannot have been recycled.
//!
//! [`BridgeSupervisor::close`] cannot fail: whatever happens, the handle is
//! cleared and the supervisor is back in the not-started state.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use locotrack_types::LocoError;
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// How long to wait for the kernel to reap a SIGKILLed child before giving
/// the handle to Tokio's background reaper.
const KILL_REAP_GRACE: Duration = Duration::from_secs(1);

/// Default graceful-shutdown window used by callers without an opinion.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Launch parameters of the bridge process.
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorConfig {
    /// Executable to run.
    pub program: String,
    /// Arguments placed before the four positional bridge arguments, e.g. a
    /// script path when `program` is an interpreter.
    pub program_args: Vec<String>,
    pub host: String,
    pub port: u16,
    pub device_path: String,
    pub baud_rate: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            program: "locotrack-bridge".to_string(),
            program_args: Vec::new(),
            host: "127.0.0.1".to_string(),
            port: 33335,
            device_path: "/dev/ttyACM0".to_string(),
            baud_rate: 57600,
        }
    }
}

impl SupervisorConfig {
    /// Full argument vector passed to `program`.
    pub fn command_args(&self) -> Vec<String> {
        let mut args = self.program_args.clone();
        args.extend([
            self.host.clone(),
            self.port.to_string(),
            self.device_path.clone(),
            self.baud_rate.to_string(),
        ]);
        args
    }
}

/// How a [`BridgeSupervisor::close`] call ended.  Every variant is a
/// successful close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Nothing was running.
    NotStarted,
    /// The bridge exited on its own after SIGTERM.
    Exited(ExitStatus),
    /// The bridge outlived the timeout and was killed.
    Killed,
}

/// Starts, tracks and stops one bridge child process.
///
/// Must be used from within a Tokio runtime.
#[derive(Debug)]
pub struct BridgeSupervisor {
    config: SupervisorConfig,
    child: Option<Child>,
}

impl BridgeSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            child: None,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Change where the next spawned bridge sends its state datagrams.
    pub fn set_endpoint(&mut self, host: impl Into<String>, port: u16) {
        self.config.host = host.into();
        self.config.port = port;
    }

    /// `true` while a child handle is held.
    pub fn is_started(&self) -> bool {
        self.child.is_some()
    }

    /// Process id of the running bridge, if any.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Spawn the bridge.  Logs and does nothing if one is already running.
    ///
    /// # Errors
    ///
    /// Returns [`LocoError::Spawn`] if the process cannot be started; the
    /// supervisor then stays in the not-started state.
    pub fn start(&mut self) -> Result<(), LocoError> {
        if self.child.is_some() {
            info!(pid = ?self.pid(), "bridge is already running");
            return Ok(());
        }

        let mut std_command = std::process::Command::new(&self.config.program);
        std_command
            .args(self.config.command_args())
            .stdin(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            std_command.process_group(0);
        }
        let mut command = Command::from(std_command);
        command.kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|e| LocoError::Spawn(format!("{}: {e}", self.config.program)))?;
        info!(
            pid = ?child.id(),
            program = %self.config.program,
            host = %self.config.host,
            port = self.config.port,
            device = %self.config.device_path,
            "bridge started"
        );
        self.child = Some(child);
        Ok(())
    }

    /// Stop the bridge: SIGTERM, wait up to `timeout`, then kill.
    ///
    /// Always returns with the supervisor in the not-started state, within
    /// roughly `timeout` plus a short reap grace period.
    pub async fn close(&mut self, timeout: Duration) -> ShutdownOutcome {
        let Some(mut child) = self.child.take() else {
            info!("bridge has not been started; nothing to close");
            return ShutdownOutcome::NotStarted;
        };

        if let Err(e) = request_termination(&mut child) {
            warn!(error = %e, "failed to signal bridge");
        }

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                info!(%status, "bridge exited");
                ShutdownOutcome::Exited(status)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "waiting for bridge failed; killing it");
                force_kill(child).await;
                ShutdownOutcome::Killed
            }
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "timeout expired closing bridge; killing it"
                );
                force_kill(child).await;
                ShutdownOutcome::Killed
            }
        }
    }
}

async fn force_kill(mut child: Child) {
    if let Err(e) = child.start_kill() {
        warn!(error = %e, "SIGKILL failed");
    }
    // The redundant SIGTERM exists on unix only; elsewhere `start_kill` is
    // the whole escalation.  The pid is still ours until the wait below
    // reaps it.
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            let _ = send_signal(pid, Signal::Terminate);
        }
    }
    match tokio::time::timeout(KILL_REAP_GRACE, child.wait()).await {
        Ok(Ok(status)) => info!(%status, "bridge killed"),
        Ok(Err(e)) => warn!(error = %e, "reaping killed bridge failed"),
        Err(_) => warn!("killed bridge not reaped yet; leaving it to the runtime"),
    }
}

#[cfg(unix)]
#[derive(Debug, Clone, Copy)]
enum Signal {
    Terminate,
}

#[cfg(unix)]
fn request_termination(child: &mut Child) -> std::io::Result<()> {
    match child.id() {
        Some(pid) => send_signal(pid, Signal::Terminate),
        // Already reaped: nothing left to terminate.
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) -> std::io::Result<()> {
    child.start_kill()
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: Signal) -> std::io::Result<()> {
    let pid = libc::pid_t::try_from(pid).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range")
    })?;
    let signo = match signal {
        Signal::Terminate => libc::SIGTERM,
    };
    // SAFETY: kill(2) has no memory-safety preconditions.
    if unsafe { libc::kill(pid, signo) } == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}
