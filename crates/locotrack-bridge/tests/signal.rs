//! End-to-end check of the `locotrack-bridge` binary against a pseudo
//! terminal standing in for the encoder: tick lines in, state datagrams out,
//! `reset_pos` honoured, and SIGTERM ending the process with status 0.

#![cfg(unix)]

use std::ffi::CStr;
use std::fs::File;
use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, UdpSocket};
use std::os::fd::FromRawFd;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use locotrack_bridge::WheelGeometry;
use locotrack_types::{wire, Pose};

/// Kills the bridge if the test bails out early.
struct BridgeProcess(Child);

impl Drop for BridgeProcess {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

/// Master and slave ends of a fresh pty, plus the slave's device path.
fn open_pty() -> (File, File, String) {
    let mut master = -1;
    let mut slave = -1;
    // SAFETY: out-pointers are valid; name, termios and winsize are unused.
    let rc = unsafe {
        libc::openpty(
            &mut master,
            &mut slave,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        )
    };
    assert_eq!(rc, 0, "openpty: {}", std::io::Error::last_os_error());

    // SAFETY: `slave` is an open terminal descriptor; the returned string is
    // copied before any other pty call.
    let path = unsafe { CStr::from_ptr(libc::ttyname(slave)) }
        .to_string_lossy()
        .into_owned();
    // SAFETY: both descriptors were just opened and are owned by nobody else.
    let (master, slave) = unsafe { (File::from_raw_fd(master), File::from_raw_fd(slave)) };
    (master, slave, path)
}

fn recv_state(controller: &UdpSocket) -> Option<(Pose, SocketAddr)> {
    let mut buf = [0u8; 512];
    match controller.recv_from(&mut buf) {
        Ok((n, from)) => {
            let text = std::str::from_utf8(&buf[..n]).ok()?;
            let (pose, _) = wire::parse_state(text)?;
            Some((pose, from))
        }
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => None,
        Err(e) => panic!("controller recv failed: {e}"),
    }
}

fn wait_with_deadline(child: &mut Child, deadline: Duration) -> Option<ExitStatus> {
    let until = Instant::now() + deadline;
    while Instant::now() < until {
        if let Some(status) = child.try_wait().unwrap() {
            return Some(status);
        }
        thread::sleep(Duration::from_millis(10));
    }
    None
}

#[test]
fn bridge_streams_resets_and_exits_cleanly_on_sigterm() {
    let controller = UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = controller.local_addr().unwrap().port();
    let (mut master, _slave, tty) = open_pty();

    let child = Command::new(env!("CARGO_BIN_EXE_locotrack-bridge"))
        .args(["127.0.0.1", &port.to_string(), &tty, "57600.0"])
        .stdin(Stdio::null())
        .spawn()
        .unwrap();
    let mut bridge = BridgeProcess(child);

    // The bridge may not have opened the device yet; keep feeding the same
    // sample until the first state datagram shows up.
    controller
        .set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();
    let deadline = Instant::now() + Duration::from_secs(10);
    let (first, bridge_addr) = loop {
        assert!(Instant::now() < deadline, "no state datagram from the bridge");
        master.write_all(b"10\n").unwrap();
        if let Some(state) = recv_state(&controller) {
            break state;
        }
    };
    let ten_ticks = WheelGeometry::default().displacement(10);
    assert!((first.y - ten_ticks).abs() < 1e-4, "y = {}", first.y);
    assert_eq!(first.x, 0.0);

    // Let any duplicate samples from the retry loop drain.
    controller
        .set_read_timeout(Some(Duration::from_millis(300)))
        .unwrap();
    while recv_state(&controller).is_some() {}

    controller.send_to(b"reset_pos", bridge_addr).unwrap();
    thread::sleep(Duration::from_millis(200));

    master.write_all(b"0\n").unwrap();
    controller
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let (after, _) = recv_state(&controller).expect("state after reset");
    assert_eq!(after, Pose::ZERO);

    let pid = bridge.0.id() as libc::pid_t;
    // SAFETY: kill(2) has no memory-safety preconditions.
    assert_eq!(unsafe { libc::kill(pid, libc::SIGTERM) }, 0);

    let status = wait_with_deadline(&mut bridge.0, Duration::from_secs(5))
        .expect("bridge still running 5 s after SIGTERM");
    assert!(status.success(), "bridge exited with {status}");
}
