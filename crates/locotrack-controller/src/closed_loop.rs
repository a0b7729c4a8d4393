//! The generic closed-loop locomotion base.
//!
//! # Overview
//!
//! - [`PoseParser`] – turns one received datagram into a [`PoseUpdate`].
//! - [`ClosedLoop`] – owns the [`SocketManager`], runs every datagram through
//!   its parser and re-expresses the result relative to the last zeroing.
//! - [`ClosedLoopSource`] – the trait the stimulus side drives, implemented
//!   by the base and by every device-specific adapter.
//!
//! # Zeroing
//!
//! [`ClosedLoop::set_pose_zero`] records a *baseline* and an *origin*; every
//! published update is `origin + (raw - baseline)`, component-wise, in the
//! units of [`PoseUpdate`] (metres and degrees).

use std::net::SocketAddr;

use async_trait::async_trait;
use locotrack_types::{LocoError, Pose, PoseUpdate};
use tracing::{debug, info, warn};

use crate::socket::SocketManager;

/// Parses the text of one datagram.
///
/// Returning `None` means "no update from this datagram"; it is never an
/// error and the caller simply moves on.
pub trait PoseParser: Send + Sync {
    fn parse_line(&self, line: &str) -> Option<PoseUpdate>;
}

/// Arguments of [`ClosedLoop::set_pose_zero`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZeroOptions {
    /// Pose reported right after zeroing.
    pub origin: Pose,
    /// Use the newest raw sample as the baseline.  When `false` the baseline
    /// is the all-zero pose, i.e. the source itself is assumed to restart
    /// from zero.
    pub use_data_prev: bool,
}

impl Default for ZeroOptions {
    fn default() -> Self {
        Self {
            origin: Pose::ZERO,
            use_data_prev: true,
        }
    }
}

/// Datagram-fed closed-loop pose source.
#[derive(Debug)]
pub struct ClosedLoop<P> {
    parser: P,
    host: String,
    port: u16,
    socket: Option<SocketManager>,
    baseline: Pose,
    origin: Pose,
    latest_raw: Option<PoseUpdate>,
    latest: Option<PoseUpdate>,
}

impl<P: PoseParser> ClosedLoop<P> {
    /// Create a stopped loop that will listen on `host:port`.
    pub fn new(parser: P, host: impl Into<String>, port: u16) -> Self {
        Self {
            parser,
            host: host.into(),
            port,
            socket: None,
            baseline: Pose::ZERO,
            origin: Pose::ZERO,
            latest_raw: None,
            latest: None,
        }
    }

    pub fn parser(&self) -> &P {
        &self.parser
    }

    pub fn is_started(&self) -> bool {
        self.socket.is_some()
    }

    /// Bound address while started.  Useful when the configured port is `0`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Bind the listening socket.  A second call is a logged no-op.
    pub async fn start(&mut self) -> Result<(), LocoError> {
        if self.socket.is_some() {
            info!("closed loop already started");
            return Ok(());
        }
        let socket = SocketManager::bind(&self.host, self.port).await?;
        info!(local = ?socket.local_addr().ok(), "closed loop listening");
        self.socket = Some(socket);
        Ok(())
    }

    /// Drop the socket.  Zeroing state and the last update are kept.
    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            info!("closed loop stopped");
        }
    }

    /// Send a command token to the device side, best-effort.
    pub async fn send_message(&self, token: &str) -> bool {
        match &self.socket {
            Some(socket) => socket.send_message(token).await,
            None => {
                warn!(token, "closed loop not started; command not sent");
                false
            }
        }
    }

    /// Drain every datagram already queued and return the newest one that
    /// parsed, or `None` when nothing new arrived.
    pub fn poll_update(&mut self) -> Option<PoseUpdate> {
        let socket = self.socket.as_mut()?;
        let mut newest = None;
        loop {
            match socket.try_recv_line() {
                Ok(Some(line)) => {
                    if let Some(raw) = self.parser.parse_line(&line) {
                        newest = Some(raw);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "receive failed");
                    break;
                }
            }
        }
        newest.map(|raw| self.accept(raw))
    }

    /// Wait for the next datagram that parses.
    ///
    /// # Errors
    ///
    /// [`LocoError::NotStarted`] before [`start`][Self::start], or a
    /// [`LocoError::Transport`] error from the socket.
    pub async fn next_update(&mut self) -> Result<PoseUpdate, LocoError> {
        let socket = self
            .socket
            .as_mut()
            .ok_or(LocoError::NotStarted("closed loop"))?;
        let raw = loop {
            let line = socket.recv_line().await?;
            if let Some(raw) = self.parser.parse_line(&line) {
                break raw;
            }
        };
        Ok(self.accept(raw))
    }

    /// Re-zero the published pose.
    pub fn set_pose_zero(&mut self, opts: ZeroOptions) {
        self.baseline = match (opts.use_data_prev, self.latest_raw) {
            (true, Some(raw)) => raw.pose(),
            _ => Pose::ZERO,
        };
        self.origin = opts.origin;
        self.latest = self.latest_raw.map(|raw| self.publish(raw));
        debug!(baseline = ?self.baseline, origin = ?self.origin, "pose zeroed");
    }

    /// Most recent published update, if any.
    pub fn latest(&self) -> Option<PoseUpdate> {
        self.latest
    }

    fn accept(&mut self, raw: PoseUpdate) -> PoseUpdate {
        self.latest_raw = Some(raw);
        let published = self.publish(raw);
        self.latest = Some(published);
        published
    }

    fn publish(&self, raw: PoseUpdate) -> PoseUpdate {
        raw.with_pose(self.origin.offset_by(raw.pose().delta_from(self.baseline)))
    }
}

/// Pose source driven by the stimulus side.
///
/// Polling is synchronous so it can sit inside a render loop; `None` is the
/// normal "nothing new" answer.
#[async_trait]
pub trait ClosedLoopSource: Send {
    async fn start(&mut self) -> Result<(), LocoError>;

    /// Stop the source.  Never fails.
    async fn close(&mut self);

    fn poll_update(&mut self) -> Option<PoseUpdate>;

    async fn next_update(&mut self) -> Result<PoseUpdate, LocoError>;

    async fn set_pose_zero(&mut self, opts: ZeroOptions);

    fn latest(&self) -> Option<PoseUpdate>;
}

#[async_trait]
impl<P: PoseParser> ClosedLoopSource for ClosedLoop<P> {
    async fn start(&mut self) -> Result<(), LocoError> {
        ClosedLoop::start(self).await
    }

    async fn close(&mut self) {
        ClosedLoop::close(self);
    }

    fn poll_update(&mut self) -> Option<PoseUpdate> {
        ClosedLoop::poll_update(self)
    }

    async fn next_update(&mut self) -> Result<PoseUpdate, LocoError> {
        ClosedLoop::next_update(self).await
    }

    async fn set_pose_zero(&mut self, opts: ZeroOptions) {
        ClosedLoop::set_pose_zero(self, opts);
    }

    fn latest(&self) -> Option<PoseUpdate> {
        ClosedLoop::latest(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::UdpSocket;

    /// `"x y"` → update with those two fields, anything else → `None`.
    struct XyParser;

    impl PoseParser for XyParser {
        fn parse_line(&self, line: &str) -> Option<PoseUpdate> {
            let mut it = line.split_whitespace().map(str::parse::<f64>);
            let x = it.next()?.ok()?;
            let y = it.next()?.ok()?;
            Some(PoseUpdate::from_radians(
                Pose { x, y, ..Pose::ZERO },
                1,
                0.0,
            ))
        }
    }

    async fn started() -> (ClosedLoop<XyParser>, UdpSocket, SocketAddr) {
        let mut cl = ClosedLoop::new(XyParser, "127.0.0.1", 0);
        cl.start().await.unwrap();
        let addr = cl.local_addr().unwrap();
        let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        (cl, device, addr)
    }

    #[tokio::test]
    async fn poll_before_start_is_none() {
        let mut cl = ClosedLoop::new(XyParser, "127.0.0.1", 0);
        assert!(cl.poll_update().is_none());
        assert!(!cl.send_message("reset_pos").await);
        assert!(matches!(
            cl.next_update().await,
            Err(LocoError::NotStarted(_))
        ));
    }

    #[tokio::test]
    async fn poll_keeps_newest_valid_update() {
        let (mut cl, device, addr) = started().await;
        device.send_to(b"1 1", addr).await.unwrap();
        device.send_to(b"2 2", addr).await.unwrap();
        device.send_to(b"garbage", addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let update = cl.poll_update().unwrap();
        assert_eq!((update.x, update.y), (2.0, 2.0));
        assert!(cl.poll_update().is_none());
        assert_eq!(cl.latest(), Some(update));
    }

    #[tokio::test]
    async fn next_update_skips_unparseable_datagrams() {
        let (mut cl, device, addr) = started().await;
        device.send_to(b"nope", addr).await.unwrap();
        device.send_to(b"3 4", addr).await.unwrap();

        let update = tokio::time::timeout(Duration::from_secs(2), cl.next_update())
            .await
            .unwrap()
            .unwrap();
        assert_eq!((update.x, update.y), (3.0, 4.0));
    }

    #[tokio::test]
    async fn zero_with_previous_data_rebases_stream() {
        let (mut cl, device, addr) = started().await;
        device.send_to(b"1 5", addr).await.unwrap();
        cl.next_update().await.unwrap();

        cl.set_pose_zero(ZeroOptions::default());
        assert_eq!(cl.latest().unwrap().y, 0.0);

        device.send_to(b"1 5.5", addr).await.unwrap();
        let update = cl.next_update().await.unwrap();
        assert!((update.y - 0.5).abs() < 1e-12);
        assert_eq!(update.x, 0.0);
    }

    #[tokio::test]
    async fn zero_without_previous_data_applies_origin_only() {
        let (mut cl, device, addr) = started().await;
        device.send_to(b"1 5", addr).await.unwrap();
        cl.next_update().await.unwrap();

        cl.set_pose_zero(ZeroOptions {
            origin: Pose { x: 10.0, ..Pose::ZERO },
            use_data_prev: false,
        });
        device.send_to(b"0 0.25", addr).await.unwrap();
        let update = cl.next_update().await.unwrap();
        assert_eq!(update.x, 10.0);
        assert_eq!(update.y, 0.25);
    }

    #[tokio::test]
    async fn close_then_restart_rebinds() {
        let (mut cl, _device, _addr) = started().await;
        cl.close();
        assert!(!cl.is_started());
        assert!(cl.poll_update().is_none());
        cl.start().await.unwrap();
        assert!(cl.is_started());
    }

    #[tokio::test]
    async fn works_through_trait_object() {
        let (cl, device, addr) = started().await;
        let mut source: Box<dyn ClosedLoopSource> = Box::new(cl);
        device.send_to(b"7 8", addr).await.unwrap();
        let update = source.next_update().await.unwrap();
        assert_eq!(update.x, 7.0);
        source.close().await;
    }
}
