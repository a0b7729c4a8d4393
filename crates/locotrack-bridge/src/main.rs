//! `locotrack-bridge` – tracking bridge process.
//!
//! ```text
//! locotrack-bridge [host] [port] [device_path] [baud_rate]
//! ```
//!
//! Reads wheel-encoder tick deltas from the serial device, integrates them
//! into a pose and streams `AD, …` state datagrams to `host:port`, while
//! accepting `reset_pos` commands on the same socket.  SIGTERM and SIGINT
//! close the serial port and exit with status 0.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use locotrack_bridge::serial::open_serial;
use locotrack_bridge::{init_tracing, BridgeConfig, PoseLink, TrackingBridge};
use locotrack_types::LocoError;
use tracing::{error, info, warn};

fn main() -> ExitCode {
    let _guard = init_tracing("locotrack-bridge");

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "bridge exiting");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), LocoError> {
    let cfg = BridgeConfig::resolve(std::env::args().skip(1))?;
    info!(
        host = %cfg.host,
        port = cfg.port,
        device = %cfg.device_path,
        baud_rate = cfg.baud_rate,
        "locotrack-bridge v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    // ── Termination handling ──────────────────────────────────────────────
    // With the `termination` feature ctrlc also catches SIGTERM, which is
    // what the supervisor sends first.  The device loop notices the flag
    // within one serial read timeout and drops the port on its way out.
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || {
        info!("termination signal received; closing serial device");
        flag.store(false, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install termination handler; SIGTERM will kill without cleanup");
    }

    // ── Device and link ───────────────────────────────────────────────────
    let source = open_serial(&cfg.device_path, cfg.baud_rate, cfg.read_timeout())?;
    let link = PoseLink::open(&cfg.host, cfg.port)?;
    info!(local = %link.local_addr()?, "command socket ready");

    TrackingBridge::new(source, link, cfg.geometry(), running)
        .with_command_idle(cfg.command_idle())
        .run()
}
