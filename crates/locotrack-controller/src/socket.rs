//! [`SocketManager`] – the controller's end of the datagram link.
//!
//! The controller listens on a fixed `host:port`.  The bridge sends from an
//! ephemeral port and reads commands on that same port, so the manager
//! remembers the source of the most recent datagram and aims
//! [`send_message`][SocketManager::send_message] at it.

use std::io::ErrorKind;
use std::net::SocketAddr;

use locotrack_types::LocoError;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// One state datagram is well under this; larger payloads are truncated.
const RECV_BUFFER_SIZE: usize = 1024;

/// UDP socket bound on the controller side plus the last-known peer.
#[derive(Debug)]
pub struct SocketManager {
    socket: UdpSocket,
    peer: Option<SocketAddr>,
}

impl SocketManager {
    /// Bind to `host:port` (port `0` picks an ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns [`LocoError::Transport`] if the address cannot be bound.
    pub async fn bind(host: &str, port: u16) -> Result<Self, LocoError> {
        let socket = UdpSocket::bind((host, port))
            .await
            .map_err(|e| LocoError::Transport(format!("bind {host}:{port}: {e}")))?;
        Ok(Self { socket, peer: None })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, LocoError> {
        Ok(self.socket.local_addr()?)
    }

    /// Address the next [`send_message`][Self::send_message] goes to.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Pin the peer address instead of learning it from traffic.
    pub fn set_peer(&mut self, peer: SocketAddr) {
        self.peer = Some(peer);
    }

    /// Send `token` to the peer, best-effort.
    ///
    /// Returns `false` (after logging) when no peer is known yet or the send
    /// fails; callers carry on either way.
    pub async fn send_message(&self, token: &str) -> bool {
        let Some(peer) = self.peer else {
            warn!(token, "no peer seen yet; command not sent");
            return false;
        };
        match self.socket.send_to(token.as_bytes(), peer).await {
            Ok(_) => {
                debug!(token, %peer, "command sent");
                true
            }
            Err(e) => {
                warn!(token, %peer, error = %e, "failed to send command");
                false
            }
        }
    }

    /// Take one already-queued datagram as text without waiting.
    ///
    /// Readiness is tracked by the Tokio reactor, so a datagram that landed
    /// since the task last yielded may only show up on a later call.
    pub fn try_recv_line(&mut self) -> Result<Option<String>, LocoError> {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        match self.socket.try_recv_from(&mut buf) {
            Ok((n, from)) => Ok(Some(self.accept(&buf[..n], from))),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(LocoError::Transport(format!("recv: {e}"))),
        }
    }

    /// Wait for the next datagram and return it as text.
    pub async fn recv_line(&mut self) -> Result<String, LocoError> {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        let (n, from) = self
            .socket
            .recv_from(&mut buf)
            .await
            .map_err(|e| LocoError::Transport(format!("recv: {e}")))?;
        Ok(self.accept(&buf[..n], from))
    }

    fn accept(&mut self, payload: &[u8], from: SocketAddr) -> String {
        if self.peer != Some(from) {
            debug!(%from, "bridge address learned");
            self.peer = Some(from);
        }
        String::from_utf8_lossy(payload).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn bridge_socket() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").await.unwrap()
    }

    #[tokio::test]
    async fn send_without_peer_is_refused() {
        let manager = SocketManager::bind("127.0.0.1", 0).await.unwrap();
        assert!(manager.peer().is_none());
        assert!(!manager.send_message("reset_pos").await);
    }

    #[tokio::test]
    async fn recv_learns_peer_and_reply_reaches_it() {
        let mut manager = SocketManager::bind("127.0.0.1", 0).await.unwrap();
        let addr = manager.local_addr().unwrap();
        let bridge = bridge_socket().await;

        bridge.send_to(b"AD, 0, 0, 0, 0, 0, 0, 1.0\n", addr).await.unwrap();
        let line = manager.recv_line().await.unwrap();
        assert!(line.starts_with("AD"));
        assert_eq!(manager.peer(), Some(bridge.local_addr().unwrap()));

        assert!(manager.send_message("reset_pos").await);
        let mut buf = [0u8; 64];
        let (n, _) = tokio::time::timeout(Duration::from_secs(2), bridge.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"reset_pos");
    }

    #[tokio::test]
    async fn try_recv_line_is_none_when_idle() {
        let mut manager = SocketManager::bind("127.0.0.1", 0).await.unwrap();
        assert!(manager.try_recv_line().unwrap().is_none());
    }

    #[tokio::test]
    async fn try_recv_line_drains_queued_datagrams() {
        let mut manager = SocketManager::bind("127.0.0.1", 0).await.unwrap();
        let addr = manager.local_addr().unwrap();
        let bridge = bridge_socket().await;

        bridge.send_to(b"one", addr).await.unwrap();
        bridge.send_to(b"two", addr).await.unwrap();
        // Yield so the reactor observes readiness.
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(manager.try_recv_line().unwrap().as_deref(), Some("one"));
        assert_eq!(manager.try_recv_line().unwrap().as_deref(), Some("two"));
        assert!(manager.try_recv_line().unwrap().is_none());
    }

    #[tokio::test]
    async fn pinned_peer_is_used() {
        let mut manager = SocketManager::bind("127.0.0.1", 0).await.unwrap();
        let bridge = bridge_socket().await;
        manager.set_peer(bridge.local_addr().unwrap());
        assert!(manager.send_message("reset_pos").await);
    }
}
