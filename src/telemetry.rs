// Outbound telemetry signals
//
// Every control tick publishes four JSON arrays. Downstream consumers index
// into them by position, so the order inside each array is fixed:
//   WheelPos    [right, left]                         f64
//   rpm         [right, left]                         i64
//   lift_state  [slot 1, slot 0]                      0/1
//   error_state [lift slot 1, lift slot 0, right, left] 0/1
// Lift values are published in reverse of the board's slot order.

use serde::Serialize;
use zenoh::Session;
use zenoh::pubsub::Publisher;

use crate::config::{TOPIC_ERROR_STATE, TOPIC_LIFT_STATE, TOPIC_RPM, TOPIC_WHEEL_POS};
use crate::control::ControlState;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetrySignals {
    pub wheel_pos: [f64; 2],
    pub wheel_rpm: [i64; 2],
    pub lift_state: [i16; 2],
    pub error_state: [i16; 4],
}

fn flag(value: bool) -> i16 {
    value as i16
}

impl From<&ControlState> for TelemetrySignals {
    fn from(state: &ControlState) -> Self {
        Self {
            wheel_pos: state.wheel_pos,
            wheel_rpm: [state.wheel_rpm[0] as i64, state.wheel_rpm[1] as i64],
            lift_state: [flag(state.lift_switch[1]), flag(state.lift_switch[0])],
            error_state: [
                flag(state.lift_fault[1]),
                flag(state.lift_fault[0]),
                flag(state.wheel_fault[0]),
                flag(state.wheel_fault[1]),
            ],
        }
    }
}

impl TelemetrySignals {
    /// (topic, JSON payload) for each signal, in publish order
    pub fn encode(&self) -> serde_json::Result<[(&'static str, String); 4]> {
        Ok([
            (TOPIC_WHEEL_POS, serde_json::to_string(&self.wheel_pos)?),
            (TOPIC_RPM, serde_json::to_string(&self.wheel_rpm)?),
            (TOPIC_LIFT_STATE, serde_json::to_string(&self.lift_state)?),
            (TOPIC_ERROR_STATE, serde_json::to_string(&self.error_state)?),
        ])
    }
}

/// Zenoh publishers for the four telemetry topics
pub struct TelemetryPublisher {
    wheel_pos: Publisher<'static>,
    rpm: Publisher<'static>,
    lift_state: Publisher<'static>,
    error_state: Publisher<'static>,
}

impl TelemetryPublisher {
    pub async fn declare(session: &Session) -> Result<Self, BoxError> {
        Ok(Self {
            wheel_pos: session.declare_publisher(TOPIC_WHEEL_POS).await?,
            rpm: session.declare_publisher(TOPIC_RPM).await?,
            lift_state: session.declare_publisher(TOPIC_LIFT_STATE).await?,
            error_state: session.declare_publisher(TOPIC_ERROR_STATE).await?,
        })
    }

    /// Publish all four signals, unconditionally
    pub async fn publish(&self, signals: &TelemetrySignals) -> Result<(), BoxError> {
        let [wheel_pos, rpm, lift_state, error_state] = signals.encode()?;

        self.wheel_pos.put(wheel_pos.1).await?;
        self.rpm.put(rpm.1).await?;
        self.lift_state.put(lift_state.1).await?;
        self.error_state.put(error_state.1).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_signals() {
        let signals = TelemetrySignals::from(&ControlState::default());
        let encoded = signals.encode().unwrap();
        assert_eq!(
            encoded,
            [
                ("WheelPos", "[0.0,0.0]".to_string()),
                ("rpm", "[0,0]".to_string()),
                ("lift_state", "[0,0]".to_string()),
                ("error_state", "[0,0,0,0]".to_string()),
            ]
        );
    }

    #[test]
    fn test_wheel_pairs_keep_right_left_order() {
        let state = ControlState {
            wheel_pos: [3.5, -1.0],
            wheel_rpm: [116, -20],
            ..Default::default()
        };
        let signals = TelemetrySignals::from(&state);
        assert_eq!(signals.wheel_pos, [3.5, -1.0]);
        assert_eq!(signals.wheel_rpm, [116, -20]);
    }

    #[test]
    fn test_lift_switch_published_slot_one_first() {
        let state = ControlState {
            lift_switch: [true, false],
            ..Default::default()
        };
        assert_eq!(TelemetrySignals::from(&state).lift_state, [0, 1]);

        let state = ControlState {
            lift_switch: [false, true],
            ..Default::default()
        };
        assert_eq!(TelemetrySignals::from(&state).lift_state, [1, 0]);
    }

    #[test]
    fn test_error_state_order() {
        // Each fault alone lights exactly one fixed position
        let cases = [
            (([false, true], [false, false]), [1, 0, 0, 0]),
            (([true, false], [false, false]), [0, 1, 0, 0]),
            (([false, false], [true, false]), [0, 0, 1, 0]),
            (([false, false], [false, true]), [0, 0, 0, 1]),
        ];
        for ((lift_fault, wheel_fault), expected) in cases {
            let state = ControlState {
                lift_fault,
                wheel_fault,
                ..Default::default()
            };
            assert_eq!(
                TelemetrySignals::from(&state).error_state,
                expected,
                "lift_fault={:?} wheel_fault={:?}",
                lift_fault,
                wheel_fault
            );
        }
    }

    #[test]
    fn test_unchanged_state_encodes_identically() {
        let state = ControlState {
            wheel_pos: [0.25, 0.5],
            wheel_rpm: [1, 2],
            lift_switch: [true, true],
            wheel_fault: [true, false],
            lift_fault: [false, true],
            lift_requested: true,
        };
        let first = TelemetrySignals::from(&state).encode().unwrap();
        let second = TelemetrySignals::from(&state).encode().unwrap();
        assert_eq!(first, second);
        assert_eq!(first[3].1, "[1,0,1,0]");
    }
}
