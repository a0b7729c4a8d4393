//! [`TrackingBridge`] – the device-read loop and the command-receive loop.
//!
//! ```text
//!  serial ──► read_line ──► parse_ticks ──► SharedPose::advance ──► send_state ──► controller
//!                                                  ▲
//!  controller ──► try_recv_token ──► reset_pos ──► SharedPose::reset
//! ```
//!
//! The device loop runs on the caller's thread and is the only one allowed
//! to end the bridge: on shutdown or on a closed device.  Nothing the
//! command loop sees, and no transport failure, can stop it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use locotrack_types::{wire, BridgeCommand, LocoError, Pose};
use tracing::{debug, info, trace, warn};

use crate::odometry::{parse_ticks, WheelGeometry};
use crate::pose_cell::SharedPose;
use crate::serial::LineSource;
use crate::transport::PoseLink;

/// Bridges one [`LineSource`] to one [`PoseLink`].
pub struct TrackingBridge<S> {
    source: S,
    link: Arc<PoseLink>,
    pose: Arc<SharedPose>,
    geometry: WheelGeometry,
    running: Arc<AtomicBool>,
    command_idle: Duration,
}

impl<S: LineSource> TrackingBridge<S> {
    /// Create a bridge starting from [`Pose::ZERO`].
    ///
    /// `running` is the process-wide shutdown flag; clearing it stops both
    /// loops.
    pub fn new(
        source: S,
        link: PoseLink,
        geometry: WheelGeometry,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            link: Arc::new(link),
            pose: Arc::new(SharedPose::new()),
            geometry,
            running,
            command_idle: Duration::from_millis(1),
        }
    }

    /// Pause between empty polls of the command socket.
    pub fn with_command_idle(mut self, idle: Duration) -> Self {
        self.command_idle = idle;
        self
    }

    /// Handle to the shared pose, e.g. for inspection in tests.
    pub fn pose(&self) -> Arc<SharedPose> {
        Arc::clone(&self.pose)
    }

    /// Integrate one serial line and transmit the resulting pose.
    ///
    /// Returns the pose that was sent, or `None` for blank and malformed
    /// lines.  A failed send is logged and otherwise ignored.
    pub fn handle_line(&self, line: &str) -> Option<Pose> {
        let ticks = match parse_ticks(line) {
            Ok(Some(ticks)) => ticks,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "skipping malformed device line");
                return None;
            }
        };

        let pose = self.pose.advance(self.geometry.displacement(ticks));
        if let Err(e) = self.link.send_state(&pose, wire::now_seconds()) {
            warn!(error = %e, "failed to send state message");
        }
        trace!(ticks, y = pose.y, "sample integrated");
        Some(pose)
    }

    /// Start the command-receive loop on its own thread.
    ///
    /// # Errors
    ///
    /// Returns [`LocoError::Io`] if the thread cannot be spawned.
    pub fn spawn_command_loop(&self) -> Result<JoinHandle<()>, LocoError> {
        let link = Arc::clone(&self.link);
        let pose = Arc::clone(&self.pose);
        let running = Arc::clone(&self.running);
        let idle = self.command_idle;

        let handle = thread::Builder::new()
            .name("command-rx".to_string())
            .spawn(move || command_loop(&link, &pose, &running, idle))?;
        Ok(handle)
    }

    /// Run the bridge until `running` is cleared or the device goes away.
    ///
    /// The command loop is started first and joined before returning.
    ///
    /// # Errors
    ///
    /// Returns the device error ([`LocoError::DeviceClosed`] or
    /// [`LocoError::Io`]) that ended the device loop.  A requested shutdown
    /// returns `Ok(())`.
    pub fn run(mut self) -> Result<(), LocoError> {
        let command_thread = self.spawn_command_loop()?;
        info!(peer = %self.link.peer(), "tracking bridge running");

        let outcome = self.device_loop();

        self.running.store(false, Ordering::SeqCst);
        if command_thread.join().is_err() {
            warn!("command-rx thread panicked");
        }
        info!("tracking bridge stopped");
        outcome
    }

    fn device_loop(&mut self) -> Result<(), LocoError> {
        while self.running.load(Ordering::SeqCst) {
            match self.source.read_line()? {
                Some(line) => {
                    self.handle_line(&line);
                }
                None => continue,
            }
        }
        Ok(())
    }
}

/// Apply one received command token to `pose`.  Unknown tokens are ignored.
pub fn apply_command(pose: &SharedPose, token: &str) -> Option<BridgeCommand> {
    let command = BridgeCommand::parse(token)?;
    match command {
        BridgeCommand::ResetPose => {
            pose.reset();
            info!("pose reset by controller");
        }
    }
    Some(command)
}

fn command_loop(link: &PoseLink, pose: &SharedPose, running: &AtomicBool, idle: Duration) {
    while running.load(Ordering::SeqCst) {
        match link.try_recv_token() {
            Ok(Some((token, from))) => {
                if apply_command(pose, &token).is_none() {
                    debug!(%from, token = token.trim(), "ignoring unknown command");
                }
            }
            Ok(None) => thread::sleep(idle),
            Err(e) => {
                debug!(error = %e, "command receive failed");
                thread::sleep(idle);
            }
        }
    }
}
