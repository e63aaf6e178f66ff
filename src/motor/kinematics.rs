// Differential-drive inverse kinematics
// Converts a body velocity command (linear_x, angular_z) into right/left wheel RPM.

use std::f64::consts::PI;

use crate::config::RobotGeometry;
use crate::messages::VelocityCommand;

/// Integer wheel speed targets sent to the motor board
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WheelCommand {
    pub rpm_right: i32,
    pub rpm_left: i32,
}

impl WheelCommand {
    pub fn new(rpm_right: i32, rpm_left: i32) -> Self {
        Self {
            rpm_right,
            rpm_left,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

/// Saturate each axis independently to the configured limits.
///
/// NaN on an axis is treated as 0.0 (no motion on that axis).
pub fn clamp_command(cmd: VelocityCommand, geometry: &RobotGeometry) -> VelocityCommand {
    VelocityCommand {
        linear_x: saturate(cmd.linear_x, geometry.max_linear_speed()),
        angular_z: saturate(cmd.angular_z, geometry.max_angular_speed()),
    }
}

fn saturate(value: f64, limit: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(-limit, limit)
}

/// RPM to integer conversion policy: truncate toward zero, never round.
///
/// The cast saturates at the i32 bounds.
pub fn truncate_rpm(rpm: f64) -> i32 {
    rpm.trunc() as i32
}

/// Convert an (already clamped) body velocity to wheel RPM
///
/// # Arguments
/// * `linear_x` - Forward velocity, same length unit as the wheel radius per second
/// * `angular_z` - Rotational velocity in rad/s (positive = counter-clockwise)
pub fn body_to_wheel_rpm(linear_x: f64, angular_z: f64, geometry: &RobotGeometry) -> WheelCommand {
    // wheel surface speed (m/s) -> revolutions per minute
    let rpm_per_speed = 60.0 / (2.0 * PI * geometry.wheel_radius());
    let half_track = angular_z * geometry.wheel_separation() / 2.0;

    WheelCommand {
        rpm_right: truncate_rpm(rpm_per_speed * (linear_x + half_track)),
        rpm_left: truncate_rpm(rpm_per_speed * (linear_x - half_track)),
    }
}
