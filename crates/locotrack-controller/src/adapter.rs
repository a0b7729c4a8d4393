//! [`BridgeClosedLoop`] – the closed-loop source backed by the serial
//! tracking bridge.
//!
//! It is a [`ClosedLoop`] with a [`BridgeParser`], plus a
//! [`BridgeSupervisor`] so that starting the source also launches the bridge
//! process and closing it tears the bridge down again.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use locotrack_types::{wire, BridgeCommand, LocoError, Pose, PoseUpdate};
use tracing::{info, warn};

use crate::closed_loop::{ClosedLoop, ClosedLoopSource, PoseParser, ZeroOptions};
use crate::supervisor::{BridgeSupervisor, ShutdownOutcome, SupervisorConfig, DEFAULT_CLOSE_TIMEOUT};

/// Parser for the bridge's `AD, …` state datagrams.
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgeParser;

impl PoseParser for BridgeParser {
    /// Angles arrive in radians and leave in degrees.  The bridge sends one
    /// sample per datagram, hence `frame_num` is always `1`.
    fn parse_line(&self, line: &str) -> Option<PoseUpdate> {
        match wire::parse_state(line) {
            Some((pose, timestamp)) => Some(PoseUpdate::from_radians(pose, 1, timestamp)),
            None => {
                warn!(line = line.trim_end(), "bad read from bridge; datagram dropped");
                None
            }
        }
    }
}

/// Settings of a [`BridgeClosedLoop`].
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeClosedLoopConfig {
    /// Address the controller listens on for state datagrams.
    pub listen_host: String,
    /// `0` picks a free port; the bridge is told the bound one.
    pub listen_port: u16,
    /// How to launch the bridge.  Its `host`/`port` are overwritten with the
    /// listening address on [`BridgeClosedLoop::start`].
    pub bridge: SupervisorConfig,
    /// Graceful window given to the bridge on close.
    pub close_timeout: Duration,
}

impl Default for BridgeClosedLoopConfig {
    fn default() -> Self {
        let bridge = SupervisorConfig::default();
        Self {
            listen_host: bridge.host.clone(),
            listen_port: bridge.port,
            bridge,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

/// Closed-loop source fed by a supervised tracking bridge.
#[derive(Debug)]
pub struct BridgeClosedLoop {
    base: ClosedLoop<BridgeParser>,
    supervisor: BridgeSupervisor,
    close_timeout: Duration,
}

impl BridgeClosedLoop {
    pub fn new(config: BridgeClosedLoopConfig) -> Self {
        Self {
            base: ClosedLoop::new(BridgeParser, config.listen_host, config.listen_port),
            supervisor: BridgeSupervisor::new(config.bridge),
            close_timeout: config.close_timeout,
        }
    }

    pub fn supervisor(&self) -> &BridgeSupervisor {
        &self.supervisor
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.base.local_addr()
    }

    pub fn is_started(&self) -> bool {
        self.base.is_started() && self.supervisor.is_started()
    }

    /// Bind the listening socket, then spawn the bridge aimed at it.
    ///
    /// # Errors
    ///
    /// Binding or spawn failures.  On a spawn failure the socket is closed
    /// again, leaving nothing running.
    pub async fn start(&mut self) -> Result<(), LocoError> {
        self.base.start().await?;
        if let Some(addr) = self.base.local_addr() {
            let host = if addr.ip().is_unspecified() {
                "127.0.0.1".to_string()
            } else {
                addr.ip().to_string()
            };
            self.supervisor.set_endpoint(host, addr.port());
        }
        if let Err(e) = self.supervisor.start() {
            self.base.close();
            return Err(e);
        }
        Ok(())
    }

    /// Close the socket, then stop the bridge.  Never fails.
    pub async fn close(&mut self) -> ShutdownOutcome {
        self.base.close();
        self.supervisor.close(self.close_timeout).await
    }

    pub fn poll_update(&mut self) -> Option<PoseUpdate> {
        self.base.poll_update()
    }

    pub async fn next_update(&mut self) -> Result<PoseUpdate, LocoError> {
        self.base.next_update().await
    }

    /// Ask the bridge to zero its own pose, then re-zero locally.
    ///
    /// Both sides end up at [`Pose::ZERO`]: after `reset_pos` the bridge's
    /// stream restarts from zero, so the local reset uses a zero baseline
    /// and a zero origin whatever `_opts` requests.  Datagrams already in
    /// flight may still carry the pre-reset pose.
    pub async fn set_pose_zero(&mut self, _opts: ZeroOptions) {
        if !self.base.send_message(BridgeCommand::ResetPose.as_token()).await {
            info!("bridge not reachable yet; resetting local pose only");
        }
        self.base.set_pose_zero(ZeroOptions {
            origin: Pose::ZERO,
            use_data_prev: false,
        });
    }

    pub fn latest(&self) -> Option<PoseUpdate> {
        self.base.latest()
    }
}

#[async_trait]
impl ClosedLoopSource for BridgeClosedLoop {
    async fn start(&mut self) -> Result<(), LocoError> {
        BridgeClosedLoop::start(self).await
    }

    async fn close(&mut self) {
        BridgeClosedLoop::close(self).await;
    }

    fn poll_update(&mut self) -> Option<PoseUpdate> {
        BridgeClosedLoop::poll_update(self)
    }

    async fn next_update(&mut self) -> Result<PoseUpdate, LocoError> {
        BridgeClosedLoop::next_update(self).await
    }

    async fn set_pose_zero(&mut self, opts: ZeroOptions) {
        BridgeClosedLoop::set_pose_zero(self, opts).await;
    }

    fn latest(&self) -> Option<PoseUpdate> {
        BridgeClosedLoop::latest(self)
    }
}
