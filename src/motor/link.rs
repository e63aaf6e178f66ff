// Actuator link abstraction
//
// The motor board is reached through one stateful channel that accepts wheel
// commands and returns decoded telemetry frames. Implementations: the serial
// board link (`doro`) and an in-process simulation (`sim`).

use super::kinematics::WheelCommand;

/// Error types for actuator link transactions
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout waiting for telemetry frame")]
    Timeout,

    #[error("Invalid frame: {reason}")]
    InvalidFrame { reason: String },

    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{received:02X}")]
    ChecksumMismatch { expected: u8, received: u8 },

    #[error("Link disconnected")]
    Disconnected,
}

impl LinkError {
    /// True when no frame arrived within the expected window
    pub fn is_timeout(&self) -> bool {
        match self {
            LinkError::Timeout => true,
            LinkError::Io(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;

/// One decoded telemetry snapshot from the motor board.
///
/// Wheel pairs are ordered (right, left). Lift pairs are in the board's slot
/// order (slot 0, slot 1).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetryFrame {
    pub wheel_pos: [f64; 2],
    pub wheel_rpm: [i32; 2],
    pub lift_switch: [bool; 2],
    pub wheel_fault: [bool; 2],
    pub lift_fault: [bool; 2],
}

/// A channel to the drivetrain. Callers must serialize access; one
/// transaction at a time.
pub trait ActuatorLink {
    /// Send wheel speed targets and the requested lift state
    fn write(&mut self, command: WheelCommand, lift_requested: bool) -> Result<()>;

    /// Fetch the latest telemetry frame
    fn poll(&mut self) -> Result<TelemetryFrame>;
}

impl<L: ActuatorLink + ?Sized> ActuatorLink for Box<L> {
    fn write(&mut self, command: WheelCommand, lift_requested: bool) -> Result<()> {
        (**self).write(command, lift_requested)
    }

    fn poll(&mut self) -> Result<TelemetryFrame> {
        (**self).poll()
    }
}
