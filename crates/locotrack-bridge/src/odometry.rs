//! Wheel encoder odometry.
//!
//! The serial device reports signed tick deltas, one per line.  A tick is
//! `circumference / ticks_per_revolution` metres of travel along the forward
//! axis.

use locotrack_types::LocoError;

/// Physical description of the encoder wheel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelGeometry {
    /// Wheel radius in metres.
    pub radius_m: f64,
    /// Encoder ticks per full wheel revolution.
    pub ticks_per_revolution: u32,
}

impl WheelGeometry {
    pub fn new(radius_m: f64, ticks_per_revolution: u32) -> Self {
        Self {
            radius_m,
            ticks_per_revolution,
        }
    }

    pub fn circumference_m(&self) -> f64 {
        std::f64::consts::TAU * self.radius_m
    }

    /// Linear travel represented by a single tick.
    pub fn metres_per_tick(&self) -> f64 {
        self.circumference_m() / f64::from(self.ticks_per_revolution)
    }

    /// Linear travel represented by `ticks`.
    pub fn displacement(&self, ticks: i64) -> f64 {
        ticks as f64 * self.metres_per_tick()
    }
}

impl Default for WheelGeometry {
    /// 7.5 inch diameter wheel with a 1024-tick encoder.
    fn default() -> Self {
        Self::new(3.75 * 0.0254, 1024)
    }
}

/// Parse one serial line as a tick delta.
///
/// Blank lines yield `Ok(None)`; the device emits them between samples and
/// they carry no motion.
///
/// # Errors
///
/// Returns [`LocoError::Transport`] when the line is not a signed integer.
pub fn parse_ticks(line: &str) -> Result<Option<i64>, LocoError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<i64>()
        .map(Some)
        .map_err(|e| LocoError::Transport(format!("bad tick line {trimmed:?}: {e}")))
}
