//! `locotrack-bridge` – serial wheel encoder to UDP pose stream.
//!
//! The bridge owns one serial device and one UDP socket.  Two execution
//! contexts share a single [`SharedPose`]:
//!
//! - the **device-read loop** (calling thread) blocks on the serial port,
//!   integrates every tick delta into the pose and sends a state datagram;
//! - the **command-receive loop** (`command-rx` thread) polls the same UDP
//!   socket for controller commands such as `reset_pos`.
//!
//! # Modules
//!
//! - [`config`] – [`BridgeConfig`]: defaults, TOML file, `LOCOTRACK_*`
//!   environment overrides and positional arguments.
//! - [`odometry`] – [`WheelGeometry`]: tick to metre conversion.
//! - [`pose_cell`] – [`SharedPose`]: the mutex-guarded pose record.
//! - [`serial`] – [`LineSource`] and the buffered [`LineReader`] over a
//!   `serialport` device.
//! - [`transport`] – [`PoseLink`]: the best-effort UDP endpoint.
//! - [`bridge`] – [`TrackingBridge`]: both loops wired together.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: logging and
//!   optional OTLP export.

pub mod bridge;
pub mod config;
pub mod odometry;
pub mod pose_cell;
pub mod serial;
pub mod telemetry;
pub mod transport;

pub use bridge::TrackingBridge;
pub use config::BridgeConfig;
pub use odometry::WheelGeometry;
pub use pose_cell::SharedPose;
pub use serial::{LineReader, LineSource};
pub use telemetry::{init_tracing, TracerProviderGuard};
pub use transport::PoseLink;

/// Held by every test that mutates the process environment.
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
pub(crate) fn lock_env() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
