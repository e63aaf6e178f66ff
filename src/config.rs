// Loop rate, topics, geometry and serial link configuration
use std::time::Duration;

use clap::Parser;

// Control loop frequency (telemetry poll + publish)
pub const LOOP_HZ: u64 = 100;

// Consecutive failed polls before the link is reported as degraded (0.5 s at 100 Hz)
pub const LINK_DEGRADED_AFTER: u32 = 50;

// Zenoh topics
pub const TOPIC_CMD_VEL: &str = "cmd_vel"; // velocity commands
pub const TOPIC_LIFT: &str = "lift"; // lift requests
pub const TOPIC_WHEEL_POS: &str = "WheelPos";
pub const TOPIC_RPM: &str = "rpm";
pub const TOPIC_LIFT_STATE: &str = "lift_state";
pub const TOPIC_ERROR_STATE: &str = "error_state";
pub const TOPIC_HEALTH: &str = "doro/state/health";

// Serial link to the motor board
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_LINK_TIMEOUT_MS: u64 = 8;

// Base geometry (meters) and command limits (m/s, rad/s)
pub const WHEEL_RADIUS: f64 = 0.082;
pub const WHEEL_SEPARATION: f64 = 0.185;
pub const MAX_LINEAR_SPEED: f64 = 10.0;
pub const MAX_ANGULAR_SPEED: f64 = 10.0;

/// Invalid startup configuration. Always fatal.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("wheel_radius must be a positive finite number, got {0}")]
    WheelRadius(f64),

    #[error("wheel_separation must be a positive finite number, got {0}")]
    WheelSeparation(f64),

    #[error("max_linear_speed must be a non-negative finite number, got {0}")]
    MaxLinearSpeed(f64),

    #[error("max_angular_speed must be a non-negative finite number, got {0}")]
    MaxAngularSpeed(f64),

    #[error("serial port name is empty")]
    EmptyPort,

    #[error("baudrate must be non-zero")]
    Baudrate,

    #[error("link timeout must be non-zero")]
    LinkTimeout,
}

/// Differential-drive geometry and command limits.
///
/// Only constructed through [`RobotGeometry::new`] (or `Default`), so every
/// instance has already been validated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobotGeometry {
    wheel_radius: f64,
    wheel_separation: f64,
    max_linear_speed: f64,
    max_angular_speed: f64,
}

impl RobotGeometry {
    pub fn new(
        wheel_radius: f64,
        wheel_separation: f64,
        max_linear_speed: f64,
        max_angular_speed: f64,
    ) -> Result<Self, ConfigError> {
        if !(wheel_radius.is_finite() && wheel_radius > 0.0) {
            return Err(ConfigError::WheelRadius(wheel_radius));
        }
        if !(wheel_separation.is_finite() && wheel_separation > 0.0) {
            return Err(ConfigError::WheelSeparation(wheel_separation));
        }
        if !(max_linear_speed.is_finite() && max_linear_speed >= 0.0) {
            return Err(ConfigError::MaxLinearSpeed(max_linear_speed));
        }
        if !(max_angular_speed.is_finite() && max_angular_speed >= 0.0) {
            return Err(ConfigError::MaxAngularSpeed(max_angular_speed));
        }

        Ok(Self {
            wheel_radius,
            wheel_separation,
            max_linear_speed,
            max_angular_speed,
        })
    }

    pub fn wheel_radius(&self) -> f64 {
        self.wheel_radius
    }

    pub fn wheel_separation(&self) -> f64 {
        self.wheel_separation
    }

    pub fn max_linear_speed(&self) -> f64 {
        self.max_linear_speed
    }

    pub fn max_angular_speed(&self) -> f64 {
        self.max_angular_speed
    }
}

impl Default for RobotGeometry {
    fn default() -> Self {
        Self {
            wheel_radius: WHEEL_RADIUS,
            wheel_separation: WHEEL_SEPARATION,
            max_linear_speed: MAX_LINEAR_SPEED,
            max_angular_speed: MAX_ANGULAR_SPEED,
        }
    }
}

/// Serial link settings
#[derive(Debug, Clone, PartialEq)]
pub struct LinkSettings {
    pub port: String,
    pub baudrate: u32,
    pub timeout: Duration,
    /// Use the in-process simulated link instead of the serial port
    pub simulate: bool,
}

impl LinkSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port.trim().is_empty() {
            return Err(ConfigError::EmptyPort);
        }
        if self.baudrate == 0 {
            return Err(ConfigError::Baudrate);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::LinkTimeout);
        }
        Ok(())
    }
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baudrate: DEFAULT_BAUDRATE,
            timeout: Duration::from_millis(DEFAULT_LINK_TIMEOUT_MS),
            simulate: false,
        }
    }
}

/// Static startup configuration, read once before the control loop starts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotConfig {
    pub geometry: RobotGeometry,
    pub link: LinkSettings,
}

/// Command-line arguments for the runtime binary
#[derive(Debug, Parser)]
#[command(
    name = "doro-mobile-runtime",
    version,
    about = "Differential-drive base motor control runtime"
)]
pub struct Args {
    /// Serial port of the motor board
    #[arg(long, default_value = DEFAULT_PORT)]
    pub port: String,

    /// Serial baudrate
    #[arg(long, default_value_t = DEFAULT_BAUDRATE)]
    pub baudrate: u32,

    /// Timeout for a single telemetry read (ms)
    #[arg(long, default_value_t = DEFAULT_LINK_TIMEOUT_MS)]
    pub link_timeout_ms: u64,

    /// Wheel radius (m)
    #[arg(long, default_value_t = WHEEL_RADIUS)]
    pub wheel_radius: f64,

    /// Distance between the two drive wheels (m)
    #[arg(long, default_value_t = WHEEL_SEPARATION)]
    pub wheel_separation: f64,

    /// Linear velocity limit (m/s)
    #[arg(long, default_value_t = MAX_LINEAR_SPEED, allow_negative_numbers = true)]
    pub max_linear_speed: f64,

    /// Angular velocity limit (rad/s)
    #[arg(long, default_value_t = MAX_ANGULAR_SPEED, allow_negative_numbers = true)]
    pub max_angular_speed: f64,

    /// Run against a simulated link (no hardware)
    #[arg(long)]
    pub simulate: bool,
}

impl Args {
    pub fn into_config(self) -> Result<RobotConfig, ConfigError> {
        let geometry = RobotGeometry::new(
            self.wheel_radius,
            self.wheel_separation,
            self.max_linear_speed,
            self.max_angular_speed,
        )?;

        let link = LinkSettings {
            port: self.port,
            baudrate: self.baudrate,
            timeout: Duration::from_millis(self.link_timeout_ms),
            simulate: self.simulate,
        };
        link.validate()?;

        Ok(RobotConfig { geometry, link })
    }
}
