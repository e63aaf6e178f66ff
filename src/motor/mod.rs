// Motor control module for the DORO differential-drive base
//
// Provides:
// - Differential-drive inverse kinematics (body velocity -> wheel RPM)
// - The actuator link trait and its error type
// - DORO motor board serial link and a simulated board

pub mod doro;
pub mod kinematics;
pub mod link;
pub mod sim;

pub use doro::DoroBus;
pub use kinematics::{WheelCommand, body_to_wheel_rpm, clamp_command};
pub use link::{ActuatorLink, LinkError, TelemetryFrame};
pub use sim::SimulatedLink;
