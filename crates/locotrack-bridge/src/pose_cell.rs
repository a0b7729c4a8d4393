//! [`SharedPose`] – the only state the two bridge loops share.
//!
//! Every operation takes the lock once and replaces the whole record, so a
//! reader never sees half of an integration step and half of a reset.

use std::sync::{Mutex, MutexGuard};

use locotrack_types::Pose;

/// Mutex-guarded pose record shared between the device-read loop and the
/// command-receive loop.
#[derive(Debug, Default)]
pub struct SharedPose {
    inner: Mutex<Pose>,
}

impl SharedPose {
    /// Create a cell holding [`Pose::ZERO`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current pose.
    pub fn snapshot(&self) -> Pose {
        *self.lock()
    }

    /// Move the pose `displacement_m` metres forward and return the new
    /// record.  The returned copy is what the caller should transmit.
    pub fn advance(&self, displacement_m: f64) -> Pose {
        let mut guard = self.lock();
        *guard = guard.advanced_forward(displacement_m);
        *guard
    }

    /// Replace the pose with [`Pose::ZERO`].
    pub fn reset(&self) {
        *self.lock() = Pose::ZERO;
    }

    // A panic while holding the lock cannot leave a `Pose` half-written, so
    // a poisoned mutex is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Pose> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn starts_at_zero() {
        assert_eq!(SharedPose::new().snapshot(), Pose::ZERO);
    }

    #[test]
    fn advance_returns_updated_snapshot() {
        let cell = SharedPose::new();
        let after = cell.advance(0.25);
        assert_eq!(after.y, 0.25);
        assert_eq!(cell.snapshot(), after);
    }

    #[test]
    fn reset_is_idempotent() {
        let cell = SharedPose::new();
        cell.advance(5.0);
        cell.reset();
        assert_eq!(cell.snapshot(), Pose::ZERO);
        cell.reset();
        assert_eq!(cell.snapshot(), Pose::ZERO);
    }

    #[test]
    fn sequential_integration_equals_integrating_the_sum() {
        let wheel = crate::odometry::WheelGeometry::default();
        let ticks = [10_i64, -3, 250, 0, 17, -1024, 4096, 1];
        let cell = SharedPose::new();
        for t in ticks {
            cell.advance(wheel.displacement(t));
        }
        let total: i64 = ticks.iter().sum();
        assert!((cell.snapshot().y - wheel.displacement(total)).abs() < 1e-9);
    }

    #[test]
    fn concurrent_resets_never_tear_the_record() {
        let cell = Arc::new(SharedPose::new());
        let writer = {
            let cell = Arc::clone(&cell);
            thread::spawn(move || {
                for _ in 0..10_000 {
                    let p = cell.advance(1.0);
                    // Only y is ever touched by integration.
                    assert_eq!(p.delta_from(Pose { y: p.y, ..Pose::ZERO }), Pose::ZERO);
                }
            })
        };
        for _ in 0..1_000 {
            cell.reset();
        }
        writer.join().unwrap();
        let end = cell.snapshot();
        assert!(end.y >= 0.0 && end.y <= 10_000.0);
        assert_eq!(end.y.fract(), 0.0);
    }
}
