//! Closed-loop joint positioning: one motor, one potentiometer.

use super::motor::Motor;
use super::potentiometer::PotentiometerChannel;
use limb_common::hal::config::JointConfig;
use limb_common::hal::error::HalError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Drives a motor until the potentiometer on the same joint reads the
/// target angle.
pub struct JointController {
    name: String,
    motor: Arc<Motor>,
    pot: Arc<PotentiometerChannel>,
    tolerance_deg: f64,
    poll_interval: Duration,
    timeout: Duration,
    invert: bool,
}

impl JointController {
    /// Build a controller from its config and the devices it names.
    pub fn new(config: &JointConfig, motor: Arc<Motor>, pot: Arc<PotentiometerChannel>) -> Self {
        info!(
            "Joint '{}': motor '{}', potentiometer '{}', tolerance {} deg",
            config.name,
            motor.name(),
            pot.name(),
            config.tolerance_deg
        );
        Self {
            name: config.name.clone(),
            motor,
            pot,
            tolerance_deg: config.tolerance_deg,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            timeout: Duration::from_millis(config.timeout_ms),
            invert: config.invert,
        }
    }

    /// Current joint angle.
    pub fn angle(&self) -> Result<f64, HalError> {
        self.pot.read_angle()
    }

    /// Rotate to `target_deg` (clamped to the potentiometer's range) at
    /// `speed`, blocking until the angle is within tolerance or has passed
    /// the target. Returns the final reading.
    ///
    /// The motor is stopped on every exit path.
    ///
    /// # Errors
    /// `Timeout` if the target is not reached in time, otherwise whatever the
    /// motor or potentiometer reported.
    pub fn rotate_to(&self, target_deg: f64, speed: i32) -> Result<f64, HalError> {
        let target = target_deg.clamp(0.0, self.pot.max_rotation_deg());
        match self.drive_to(target, speed) {
            Ok(angle) => {
                self.motor.stop()?;
                debug!("Joint '{}' at {:.1} deg (target {:.1})", self.name, angle, target);
                Ok(angle)
            }
            Err(e) => {
                if let Err(stop_err) = self.motor.stop() {
                    warn!("Joint '{}': stop after error failed: {}", self.name, stop_err);
                }
                Err(e)
            }
        }
    }

    /// Rotate by `delta_deg` relative to the current reading.
    pub fn rotate_by(&self, delta_deg: f64, speed: i32) -> Result<f64, HalError> {
        let current = self.angle()?;
        self.rotate_to(current + delta_deg, speed)
    }

    /// Stop the motor.
    pub fn stop(&self) -> Result<(), HalError> {
        self.motor.stop()
    }

    /// Joint name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn drive_to(&self, target: f64, speed: i32) -> Result<f64, HalError> {
        let start = Instant::now();
        let current = self.angle()?;
        if (target - current).abs() <= self.tolerance_deg {
            return Ok(current);
        }

        let increasing = target > current;
        // Clockwise lowers the reading unless the joint is inverted.
        let clockwise = increasing == self.invert;
        self.motor.run(clockwise, speed)?;
        debug!(
            "Joint '{}': {:.1} -> {:.1} deg, clockwise={}",
            self.name, current, target, clockwise
        );

        loop {
            std::thread::sleep(self.poll_interval);
            let angle = self.angle()?;
            let reached = if increasing {
                angle >= target - self.tolerance_deg
            } else {
                angle <= target + self.tolerance_deg
            };
            if reached {
                return Ok(angle);
            }
            if start.elapsed() >= self.timeout {
                return Err(HalError::Timeout(format!(
                    "joint '{}' stuck at {:.1} deg, target {:.1}",
                    self.name, angle, target
                )));
            }
        }
    }
}
