//! ASCII framing for the bridge ↔ controller datagrams.
//!
//! State (bridge → controller), one datagram per device sample:
//!
//! ```text
//! AD, <x>, <y>, <z>, <theta>, <phi>, <roll>, <timestamp>\n
//! ```
//!
//! Numbers are free-form decimal text, angles are radians and the timestamp
//! is seconds since the Unix epoch on the bridge host.  Commands (controller
//! → bridge) are bare tokens, see [`BridgeCommand`][crate::BridgeCommand].

use chrono::Utc;

use crate::Pose;

/// Leading token of every state datagram.
pub const STATE_TAG: &str = "AD";

/// Separator between state fields.
pub const FIELD_SEPARATOR: &str = ", ";

/// Render `pose` captured at `timestamp` as a state datagram.
pub fn format_state(pose: &Pose, timestamp: f64) -> String {
    format!(
        "{STATE_TAG}{sep}{}{sep}{}{sep}{}{sep}{}{sep}{}{sep}{}{sep}{}\n",
        pose.x,
        pose.y,
        pose.z,
        pose.theta,
        pose.phi,
        pose.roll,
        timestamp,
        sep = FIELD_SEPARATOR,
    )
}

/// Parse a state datagram back into its pose (radians) and timestamp.
///
/// Returns `None` when the first token is not exactly [`STATE_TAG`] (no
/// surrounding whitespace), when fewer than seven values follow it, or when
/// any of them is not a number.  Trailing fields beyond the seventh are
/// ignored.  Never panics.
pub fn parse_state(line: &str) -> Option<(Pose, f64)> {
    let mut toks = line.trim_end().split(FIELD_SEPARATOR);
    if toks.next()? != STATE_TAG {
        return None;
    }

    let mut values = [0.0_f64; 7];
    for slot in values.iter_mut() {
        *slot = toks.next()?.trim().parse().ok()?;
    }
    let [x, y, z, theta, phi, roll, timestamp] = values;

    Some((
        Pose {
            x,
            y,
            z,
            theta,
            phi,
            roll,
        },
        timestamp,
    ))
}

/// Wall-clock time in seconds since the Unix epoch, microsecond resolution.
pub fn now_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
