//! `locotrack-types` – shared vocabulary of the locomotion tracking bridge.
//!
//! Both sides of the datagram link depend on this crate: the bridge process
//! that owns the serial device and the controller that consumes its pose
//! stream.
//!
//! # Modules
//!
//! - [`wire`] – ASCII framing of state and command datagrams.

pub mod wire;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Six-degree-of-freedom pose: position in metres, orientation in radians.
///
/// A `Pose` is a plain value.  Producers build a new record and swap it in
/// whole; nothing ever edits a shared pose one field at a time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub theta: f64,
    pub phi: f64,
    pub roll: f64,
}

impl Pose {
    /// The all-zero pose every bridge starts from and resets to.
    pub const ZERO: Pose = Pose {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        theta: 0.0,
        phi: 0.0,
        roll: 0.0,
    };

    /// Return a copy moved `displacement_m` metres along the forward (`y`)
    /// axis.
    ///
    /// Encoder ticks drive a single axis only; the other five fields are
    /// carried over unchanged.
    pub fn advanced_forward(self, displacement_m: f64) -> Pose {
        Pose {
            y: self.y + displacement_m,
            ..self
        }
    }

    /// Component-wise `self - other`.
    pub fn delta_from(self, other: Pose) -> Pose {
        Pose {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
            theta: self.theta - other.theta,
            phi: self.phi - other.phi,
            roll: self.roll - other.roll,
        }
    }

    /// Component-wise `self + other`.
    pub fn offset_by(self, other: Pose) -> Pose {
        Pose {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
            theta: self.theta + other.theta,
            phi: self.phi + other.phi,
            roll: self.roll + other.roll,
        }
    }
}

/// Pose sample as handed to the rendering / scheduling layer.
///
/// Angles are in **degrees** here, unlike [`Pose`].  `frame_num` is the
/// number of device frames folded into this update; the serial bridge always
/// reports one sample per datagram, so it is always `1` for that source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseUpdate {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub theta: f64,
    pub phi: f64,
    pub roll: f64,
    pub frame_num: u32,
    /// Capture time on the bridge host, seconds since the Unix epoch.
    pub timestamp: f64,
}

impl PoseUpdate {
    /// Build an update from a bridge-side pose, converting angles from
    /// radians to degrees.
    pub fn from_radians(pose: Pose, frame_num: u32, timestamp: f64) -> Self {
        Self {
            x: pose.x,
            y: pose.y,
            z: pose.z,
            theta: pose.theta.to_degrees(),
            phi: pose.phi.to_degrees(),
            roll: pose.roll.to_degrees(),
            frame_num,
            timestamp,
        }
    }

    /// The positional and angular part of this update (angles in degrees).
    pub fn pose(&self) -> Pose {
        Pose {
            x: self.x,
            y: self.y,
            z: self.z,
            theta: self.theta,
            phi: self.phi,
            roll: self.roll,
        }
    }

    /// Replace the positional and angular part, keeping frame count and
    /// timestamp.
    pub fn with_pose(self, pose: Pose) -> Self {
        Self {
            x: pose.x,
            y: pose.y,
            z: pose.z,
            theta: pose.theta,
            phi: pose.phi,
            roll: pose.roll,
            ..self
        }
    }
}

/// Out-of-band commands the controller may send to a running bridge.
///
/// Unknown tokens never map to a variant; receivers drop them silently so
/// newer controllers can talk to older bridges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BridgeCommand {
    /// Replace the integrated pose with [`Pose::ZERO`].
    ResetPose,
}

impl BridgeCommand {
    /// The ASCII token carried on the wire for this command.
    pub fn as_token(self) -> &'static str {
        match self {
            BridgeCommand::ResetPose => "reset_pos",
        }
    }

    /// Map a received token to a command.  Surrounding whitespace is ignored.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim() {
            "reset_pos" => Some(BridgeCommand::ResetPose),
            _ => None,
        }
    }
}

impl std::fmt::Display for BridgeCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_token())
    }
}

/// Error type shared by the bridge, the supervisor and the closed-loop
/// adapter.
///
/// Only configuration, device and spawn failures are ever fatal.  Transport
/// errors are expected steady-state noise on a best-effort link and are
/// logged where they occur.
#[derive(Error, Debug)]
pub enum LocoError {
    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Device Open Failed on {path}: {details}")]
    DeviceOpen { path: String, details: String },

    #[error("Device Closed: {0}")]
    DeviceClosed(String),

    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("Bridge Spawn Failed: {0}")]
    Spawn(String),

    #[error("Not Started: {0}")]
    NotStarted(&'static str),
}
