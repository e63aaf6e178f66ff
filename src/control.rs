// Command ingestion and telemetry polling around one exclusive actuator link
//
// Velocity commands and the 100 Hz poll arrive from independent tasks. Both go
// through `Controller`, which keeps the link and the control state behind a
// single mutex: a transaction and the state it reads or produces are never
// observed half-done.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};

use crate::config::{LINK_DEGRADED_AFTER, RobotGeometry};
use crate::messages::{LiftRequest, RuntimeHealth, VelocityCommand};
use crate::motor::kinematics::{WheelCommand, body_to_wheel_rpm, clamp_command};
use crate::motor::link::{ActuatorLink, LinkError, TelemetryFrame};

/// Last known robot state. Starts zeroed, lives for the process lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlState {
    pub lift_requested: bool,
    pub wheel_pos: [f64; 2],
    pub wheel_rpm: [i32; 2],
    pub lift_switch: [bool; 2],
    pub wheel_fault: [bool; 2],
    pub lift_fault: [bool; 2],
}

impl ControlState {
    /// Overwrite every telemetry field from a successfully polled frame
    fn apply(&mut self, frame: &TelemetryFrame) {
        self.wheel_pos = frame.wheel_pos;
        self.wheel_rpm = frame.wheel_rpm;
        self.lift_switch = frame.lift_switch;
        self.wheel_fault = frame.wheel_fault;
        self.lift_fault = frame.lift_fault;
    }
}

/// Result of one control-loop poll
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollOutcome {
    /// State after the poll; unchanged from before when `fresh` is false
    pub state: ControlState,
    pub fresh: bool,
    pub health: RuntimeHealth,
}

/// Counts consecutive failed polls and flags the link as degraded past a threshold
#[derive(Debug)]
struct LinkHealth {
    consecutive_failures: u32,
    threshold: u32,
    status: RuntimeHealth,
}

impl LinkHealth {
    fn new(threshold: u32) -> Self {
        Self {
            consecutive_failures: 0,
            threshold: threshold.max(1),
            status: RuntimeHealth::Ok,
        }
    }

    fn record_success(&mut self) -> RuntimeHealth {
        if self.status == RuntimeHealth::LinkDegraded {
            info!(
                "Actuator link recovered after {} failed polls",
                self.consecutive_failures
            );
        } else if self.consecutive_failures > 0 {
            debug!(
                "Telemetry poll recovered after {} failures",
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
        self.status = RuntimeHealth::Ok;
        self.status
    }

    fn record_failure(&mut self, err: &LinkError) -> RuntimeHealth {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        // One warning per failure streak; the loop runs at 100 Hz
        if self.consecutive_failures == 1 {
            warn!("Telemetry poll failed, keeping last known state: {}", err);
        } else {
            debug!(
                "Telemetry poll failed ({} in a row): {}",
                self.consecutive_failures, err
            );
        }

        if self.status == RuntimeHealth::Ok && self.consecutive_failures >= self.threshold {
            error!(
                "Actuator link degraded: {} consecutive failed polls (last error: {})",
                self.consecutive_failures, err
            );
            self.status = RuntimeHealth::LinkDegraded;
        }
        self.status
    }
}

struct Shared<L> {
    link: L,
    state: ControlState,
    health: LinkHealth,
}

/// Single access point to the actuator link.
///
/// Cheap to clone; all clones share the same link and state. Every method
/// holds the lock for the whole transaction, so callers on other threads
/// block until the link is free.
pub struct Controller<L> {
    geometry: RobotGeometry,
    shared: Arc<Mutex<Shared<L>>>,
}

impl<L> Clone for Controller<L> {
    fn clone(&self) -> Self {
        Self {
            geometry: self.geometry,
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<L: ActuatorLink> Controller<L> {
    pub fn new(link: L, geometry: RobotGeometry) -> Self {
        Self::with_degraded_threshold(link, geometry, LINK_DEGRADED_AFTER)
    }

    /// Create with a custom number of consecutive failed polls before the
    /// link is reported degraded
    pub fn with_degraded_threshold(link: L, geometry: RobotGeometry, threshold: u32) -> Self {
        Self {
            geometry,
            shared: Arc::new(Mutex::new(Shared {
                link,
                state: ControlState::default(),
                health: LinkHealth::new(threshold),
            })),
        }
    }

    // A panic mid-transaction leaves only plain Copy fields behind, so the
    // state is still usable
    fn lock(&self) -> MutexGuard<'_, Shared<L>> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn geometry(&self) -> &RobotGeometry {
        &self.geometry
    }

    /// Clamp, convert to wheel RPM and write it with the current lift request.
    ///
    /// A failed write is returned to the caller; the command is dropped, not retried.
    pub fn on_velocity(&self, cmd: VelocityCommand) -> Result<WheelCommand, LinkError> {
        let clamped = clamp_command(cmd, &self.geometry);
        let wheels = body_to_wheel_rpm(clamped.linear_x, clamped.angular_z, &self.geometry);

        let mut shared = self.lock();
        let lift_requested = shared.state.lift_requested;
        shared.link.write(wheels, lift_requested)?;

        debug!(
            "cmd_vel ({:.3}, {:.3}) -> rpm right={} left={}, lift={}",
            clamped.linear_x, clamped.angular_z, wheels.rpm_right, wheels.rpm_left, lift_requested
        );
        Ok(wheels)
    }

    /// Record the lift request; it is sent with the next velocity command
    pub fn on_lift(&self, request: LiftRequest) {
        let mut shared = self.lock();
        if shared.state.lift_requested != request.raised {
            info!("Lift requested {}", if request.raised { "up" } else { "down" });
        }
        shared.state.lift_requested = request.raised;
    }

    /// Poll the link once. On failure the state keeps its last known values.
    pub fn poll(&self) -> PollOutcome {
        let mut shared = self.lock();
        let Shared {
            link,
            state,
            health,
        } = &mut *shared;

        let (fresh, health) = match link.poll() {
            Ok(frame) => {
                state.apply(&frame);
                (true, health.record_success())
            }
            Err(e) => (false, health.record_failure(&e)),
        };

        PollOutcome {
            state: *state,
            fresh,
            health,
        }
    }

    /// Command zero wheel speed, keeping the current lift request
    pub fn stop(&self) -> Result<(), LinkError> {
        info!("Stopping wheels");
        let mut shared = self.lock();
        let lift_requested = shared.state.lift_requested;
        shared.link.write(WheelCommand::zero(), lift_requested)
    }

    pub fn snapshot(&self) -> ControlState {
        self.lock().state
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::motor::link::testing::ScriptedLink;

    fn frame(rpm: [i32; 2]) -> TelemetryFrame {
        TelemetryFrame {
            wheel_pos: [1.25, -0.5],
            wheel_rpm: rpm,
            lift_switch: [true, false],
            wheel_fault: [false, true],
            lift_fault: [true, true],
        }
    }

    #[test]
    fn test_initial_state_is_zeroed() {
        let (link, _probe) = ScriptedLink::new();
        let controller = Controller::new(link, RobotGeometry::default());
        assert_eq!(controller.snapshot(), ControlState::default());
        assert!(!controller.snapshot().lift_requested);
    }

    #[test]
    fn test_velocity_writes_converted_rpm() {
        let (link, probe) = ScriptedLink::new();
        let controller = Controller::new(link, RobotGeometry::default());

        let wheels = controller
            .on_velocity(VelocityCommand::new(1.0, 0.0))
            .unwrap();
        assert_eq!(wheels, WheelCommand::new(116, 116));
        assert_eq!(probe.writes(), vec![(WheelCommand::new(116, 116), false)]);
    }

    #[test]
    fn test_velocity_is_clamped_before_conversion() {
        let geometry = RobotGeometry::new(0.082, 0.185, 1.0, 1.0).unwrap();
        let (link, probe) = ScriptedLink::new();
        let controller = Controller::new(link, geometry);

        controller
            .on_velocity(VelocityCommand::new(25.0, 0.0))
            .unwrap();
        controller
            .on_velocity(VelocityCommand::new(0.0, -50.0))
            .unwrap();

        let writes = probe.writes();
        assert_eq!(writes[0].0, WheelCommand::new(116, 116));
        assert_eq!(writes[1].0, WheelCommand::new(-10, 10));
    }

    #[test]
    fn test_lift_applies_from_next_velocity_command() {
        let (link, probe) = ScriptedLink::new();
        let controller = Controller::new(link, RobotGeometry::default());

        controller
            .on_velocity(VelocityCommand::new(0.2, 0.0))
            .unwrap();
        controller.on_lift(LiftRequest { raised: true });

        // No link traffic for the lift request itself
        assert_eq!(probe.writes().len(), 1);
        assert_eq!(probe.transactions.load(Ordering::SeqCst), 1);
        assert!(controller.snapshot().lift_requested);

        controller
            .on_velocity(VelocityCommand::new(0.2, 0.0))
            .unwrap();
        controller.on_lift(LiftRequest { raised: false });
        controller.on_lift(LiftRequest { raised: true });
        controller.on_lift(LiftRequest { raised: false });
        controller
            .on_velocity(VelocityCommand::new(0.2, 0.0))
            .unwrap();

        let lifts: Vec<bool> = probe.writes().iter().map(|&(_, lift)| lift).collect();
        assert_eq!(lifts, vec![false, true, false]);
    }

    #[test]
    fn test_failed_write_drops_command() {
        let (link, probe) = ScriptedLink::new();
        let controller = Controller::new(link, RobotGeometry::default());

        probe.fail_writes.store(true, Ordering::SeqCst);
        let err = controller
            .on_velocity(VelocityCommand::new(1.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, LinkError::Disconnected));
        assert_eq!(probe.transactions.load(Ordering::SeqCst), 1);

        // Not replayed once the link is back
        probe.fail_writes.store(false, Ordering::SeqCst);
        controller
            .on_velocity(VelocityCommand::new(0.5, 0.0))
            .unwrap();
        assert_eq!(probe.writes(), vec![(WheelCommand::new(58, 58), false)]);
    }

    #[test]
    fn test_successful_poll_overwrites_telemetry() {
        let (link, probe) = ScriptedLink::new();
        let controller = Controller::new(link, RobotGeometry::default());
        controller.on_lift(LiftRequest { raised: true });
        probe.push_poll(Ok(frame([10, -10])));

        let outcome = controller.poll();
        assert!(outcome.fresh);
        assert_eq!(outcome.health, RuntimeHealth::Ok);
        assert_eq!(outcome.state.wheel_rpm, [10, -10]);
        assert_eq!(outcome.state.wheel_pos, [1.25, -0.5]);
        assert_eq!(outcome.state.lift_switch, [true, false]);
        assert_eq!(outcome.state.wheel_fault, [false, true]);
        assert_eq!(outcome.state.lift_fault, [true, true]);
        // Lift request is not telemetry
        assert!(outcome.state.lift_requested);
        assert_eq!(controller.snapshot(), outcome.state);
    }

    #[test]
    fn test_failed_poll_keeps_last_known_state() {
        let (link, probe) = ScriptedLink::new();
        let controller = Controller::new(link, RobotGeometry::default());
        probe.push_poll(Ok(frame([42, 43])));
        probe.push_poll(Err(LinkError::Timeout));
        probe.push_poll(Err(LinkError::Disconnected));
        probe.push_poll(Ok(frame([7, 8])));

        let before = controller.poll().state;

        for _ in 0..2 {
            let outcome = controller.poll();
            assert!(!outcome.fresh);
            assert_eq!(outcome.state, before);
            assert_eq!(controller.snapshot(), before);
        }

        // Next tick proceeds normally
        let outcome = controller.poll();
        assert!(outcome.fresh);
        assert_eq!(outcome.state.wheel_rpm, [7, 8]);
    }

    #[test]
    fn test_link_degrades_after_threshold_and_recovers() {
        let (link, probe) = ScriptedLink::new();
        let controller = Controller::with_degraded_threshold(link, RobotGeometry::default(), 3);

        // Unscripted polls time out
        assert_eq!(controller.poll().health, RuntimeHealth::Ok);
        assert_eq!(controller.poll().health, RuntimeHealth::Ok);
        assert_eq!(controller.poll().health, RuntimeHealth::LinkDegraded);
        assert_eq!(controller.poll().health, RuntimeHealth::LinkDegraded);

        probe.push_poll(Ok(frame([1, 1])));
        let outcome = controller.poll();
        assert!(outcome.fresh);
        assert_eq!(outcome.health, RuntimeHealth::Ok);
    }

    #[test]
    fn test_stop_writes_zero_with_lift_state() {
        let (link, probe) = ScriptedLink::new();
        let controller = Controller::new(link, RobotGeometry::default());
        controller.on_lift(LiftRequest { raised: true });

        controller.stop().unwrap();
        assert_eq!(probe.writes(), vec![(WheelCommand::zero(), true)]);
    }

    #[test]
    fn test_transactions_never_overlap() {
        let (link, probe) = ScriptedLink::with_latency(Duration::from_micros(200));
        let controller = Controller::new(link, RobotGeometry::default());

        let mut handles = Vec::new();
        for i in 0..4 {
            let c = controller.clone();
            handles.push(thread::spawn(move || {
                for j in 0..25 {
                    c.on_velocity(VelocityCommand::new(0.01 * (i * 25 + j) as f64, 0.0))
                        .unwrap();
                }
            }));
        }
        let poller = controller.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..50 {
                poller.poll();
            }
        }));
        let lifter = controller.clone();
        handles.push(thread::spawn(move || {
            for k in 0..50 {
                lifter.on_lift(LiftRequest { raised: k % 2 == 0 });
            }
        }));

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(probe.overlaps.load(Ordering::SeqCst), 0);
        assert_eq!(probe.writes().len(), 100);
        assert_eq!(probe.transactions.load(Ordering::SeqCst), 150);
    }
}
