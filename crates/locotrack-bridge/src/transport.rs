//! [`PoseLink`] – the bridge's best-effort UDP endpoint.
//!
//! One non-blocking socket, bound to an ephemeral port, carries traffic in
//! both directions: state datagrams go out to the controller and the
//! controller answers commands to whatever address those datagrams came
//! from.  Nothing here retries or queues; a lost datagram is simply lost.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};

use locotrack_types::{wire, LocoError, Pose};

/// Commands are short ASCII tokens; anything longer is truncated garbage.
const RECV_BUFFER_SIZE: usize = 1024;

/// Non-blocking UDP socket paired with the controller's address.
#[derive(Debug)]
pub struct PoseLink {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl PoseLink {
    /// Resolve `host:port` and bind a non-blocking socket on an ephemeral
    /// local port of the matching address family.
    ///
    /// # Errors
    ///
    /// Returns [`LocoError::Config`] if the address does not resolve and
    /// [`LocoError::Io`] if the socket cannot be created.
    pub fn open(host: &str, port: u16) -> Result<Self, LocoError> {
        let peer = (host, port)
            .to_socket_addrs()
            .map_err(|e| LocoError::Config(format!("cannot resolve {host}:{port}: {e}")))?
            .next()
            .ok_or_else(|| LocoError::Config(format!("{host}:{port} resolved to nothing")))?;

        let local: SocketAddr = if peer.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        Self::with_socket(UdpSocket::bind(local)?, peer)
    }

    /// Wrap an already-bound socket, switching it to non-blocking mode.
    pub fn with_socket(socket: UdpSocket, peer: SocketAddr) -> Result<Self, LocoError> {
        socket.set_nonblocking(true)?;
        Ok(Self { socket, peer })
    }

    /// Address of the controller state datagrams are sent to.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Local address commands must be sent to.
    pub fn local_addr(&self) -> Result<SocketAddr, LocoError> {
        Ok(self.socket.local_addr()?)
    }

    /// Send one state datagram for `pose` captured at `timestamp`.
    ///
    /// # Errors
    ///
    /// Returns [`LocoError::Transport`] on any send failure, including a
    /// full socket buffer.  Callers on the device path log and move on.
    pub fn send_state(&self, pose: &Pose, timestamp: f64) -> Result<usize, LocoError> {
        let message = wire::format_state(pose, timestamp);
        self.socket
            .send_to(message.as_bytes(), self.peer)
            .map_err(|e| LocoError::Transport(format!("send to {}: {e}", self.peer)))
    }

    /// Receive one pending datagram as text, if any.
    ///
    /// Returns `Ok(None)` immediately when nothing is queued.
    ///
    /// # Errors
    ///
    /// Returns [`LocoError::Transport`] for receive failures other than
    /// "no data yet".
    pub fn try_recv_token(&self) -> Result<Option<(String, SocketAddr)>, LocoError> {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        match self.socket.recv_from(&mut buf) {
            Ok((n, from)) => Ok(Some((String::from_utf8_lossy(&buf[..n]).into_owned(), from))),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(LocoError::Transport(format!("recv: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn controller_socket() -> UdpSocket {
        let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
        sock.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        sock
    }

    fn wait_for_token(link: &PoseLink) -> Option<String> {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Some((token, _)) = link.try_recv_token().unwrap() {
                return Some(token);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        None
    }

    #[test]
    fn empty_socket_returns_none_immediately() {
        let link = PoseLink::open("127.0.0.1", 9).unwrap();
        let start = Instant::now();
        assert!(link.try_recv_token().unwrap().is_none());
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn state_reaches_controller() {
        let controller = controller_socket();
        let port = controller.local_addr().unwrap().port();
        let link = PoseLink::open("127.0.0.1", port).unwrap();

        let pose = Pose { y: 1.5, ..Pose::ZERO };
        link.send_state(&pose, 12.5).unwrap();

        let mut buf = [0u8; 256];
        let (n, _) = controller.recv_from(&mut buf).unwrap();
        let text = std::str::from_utf8(&buf[..n]).unwrap();
        assert_eq!(wire::parse_state(text), Some((pose, 12.5)));
    }

    #[test]
    fn controller_can_reply_to_state_source() {
        let controller = controller_socket();
        let port = controller.local_addr().unwrap().port();
        let link = PoseLink::open("127.0.0.1", port).unwrap();
        link.send_state(&Pose::ZERO, 0.0).unwrap();

        let mut buf = [0u8; 256];
        let (_, bridge_addr) = controller.recv_from(&mut buf).unwrap();
        controller.send_to(b"reset_pos", bridge_addr).unwrap();

        assert_eq!(wait_for_token(&link).as_deref(), Some("reset_pos"));
    }

    #[test]
    fn send_without_listener_does_not_panic() {
        // Nothing listens on the discard port; the send may or may not
        // error depending on the platform, but it must never block.
        let link = PoseLink::open("127.0.0.1", 9).unwrap();
        let _ = link.send_state(&Pose::ZERO, 0.0);
        let _ = link.send_state(&Pose::ZERO, 0.0);
    }

    #[test]
    fn unresolvable_host_is_config_error() {
        let err = PoseLink::open("no-such-host.invalid", 33335).unwrap_err();
        assert!(matches!(err, LocoError::Config(_)));
    }
}
