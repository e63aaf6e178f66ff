// Simulated motor board for running the runtime without hardware

use std::f64::consts::PI;
use std::time::Instant;

use tracing::debug;

use super::kinematics::WheelCommand;
use super::link::{ActuatorLink, Result, TelemetryFrame};

/// Ideal drivetrain: wheels reach the commanded RPM immediately, wheel
/// positions (rad) integrate that RPM over wall-clock time, and both lift
/// switches follow the last lift request. Never reports faults.
pub struct SimulatedLink {
    command: WheelCommand,
    lift_requested: bool,
    wheel_pos: [f64; 2],
    last_update: Instant,
}

impl SimulatedLink {
    pub fn new() -> Self {
        Self {
            command: WheelCommand::zero(),
            lift_requested: false,
            wheel_pos: [0.0, 0.0],
            last_update: Instant::now(),
        }
    }

    /// Advance wheel positions by `dt_secs` at the current command
    fn integrate(&mut self, dt_secs: f64) {
        let rads_per_rpm = 2.0 * PI / 60.0;
        self.wheel_pos[0] += self.command.rpm_right as f64 * rads_per_rpm * dt_secs;
        self.wheel_pos[1] += self.command.rpm_left as f64 * rads_per_rpm * dt_secs;
    }

    fn advance_clock(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_update).as_secs_f64();
        self.last_update = now;
        self.integrate(dt);
    }

    fn frame(&self) -> TelemetryFrame {
        TelemetryFrame {
            wheel_pos: self.wheel_pos,
            wheel_rpm: [self.command.rpm_right, self.command.rpm_left],
            lift_switch: [self.lift_requested; 2],
            wheel_fault: [false; 2],
            lift_fault: [false; 2],
        }
    }
}

impl Default for SimulatedLink {
    fn default() -> Self {
        Self::new()
    }
}

impl ActuatorLink for SimulatedLink {
    fn write(&mut self, command: WheelCommand, lift_requested: bool) -> Result<()> {
        // Settle position under the previous command before switching
        self.advance_clock();
        debug!("Simulated drive: {:?}, lift={}", command, lift_requested);
        self.command = command;
        self.lift_requested = lift_requested;
        Ok(())
    }

    fn poll(&mut self) -> Result<TelemetryFrame> {
        self.advance_clock();
        Ok(self.frame())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_commanded_rpm_and_lift() {
        let mut link = SimulatedLink::new();
        link.write(WheelCommand::new(60, -30), true).unwrap();

        let frame = link.poll().unwrap();
        assert_eq!(frame.wheel_rpm, [60, -30]);
        assert_eq!(frame.lift_switch, [true, true]);
        assert_eq!(frame.wheel_fault, [false, false]);
        assert_eq!(frame.lift_fault, [false, false]);
    }

    #[test]
    fn test_position_integrates_rpm() {
        let mut link = SimulatedLink::new();
        link.command = WheelCommand::new(60, -60);

        // 60 rpm for 0.5 s = half a revolution
        link.integrate(0.5);
        let frame = link.frame();
        assert!((frame.wheel_pos[0] - PI).abs() < 1e-9);
        assert!((frame.wheel_pos[1] + PI).abs() < 1e-9);
    }

    #[test]
    fn test_idle_wheels_do_not_move() {
        let mut link = SimulatedLink::new();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(link.poll().unwrap().wheel_pos, [0.0, 0.0]);
    }
}
