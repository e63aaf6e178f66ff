// Message types exchanged over the bus

use serde::{Deserialize, Serialize};

// Velocity command from teleop/navigation -> runtime
// linear_x in m/s, angular_z in rad/s
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocityCommand {
    pub linear_x: f64,
    pub angular_z: f64,
}

impl VelocityCommand {
    pub fn new(linear_x: f64, angular_z: f64) -> Self {
        Self {
            linear_x,
            angular_z,
        }
    }
}

// Lift request, carried on the bus as a bare JSON boolean (`true` = raise)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LiftRequest {
    pub raised: bool,
}

/// Any inbound event, so both topics can share one arrival-ordered queue
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InboundCommand {
    Velocity(VelocityCommand),
    Lift(LiftRequest),
}

/// Health status published by the runtime on transitions
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    #[default]
    Ok,
    LinkDegraded,
}
