// Keyboard teleop: W/S drive, A/D turn, L toggle lift, R/F speed, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use doro_mobile_runtime::config::{TOPIC_CMD_VEL, TOPIC_LIFT};
use doro_mobile_runtime::messages::{LiftRequest, VelocityCommand};
use std::time::{Duration, Instant};
use tracing::info;

const SPEEDS: [f64; 3] = [0.1, 0.3, 0.6]; // m/s
const TURN_SPEEDS: [f64; 3] = [0.5, 1.0, 2.0]; // rad/s
const INPUT_TIMEOUT_MS: u64 = 100; // Reset velocities after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_cmd_vel = session.declare_publisher(TOPIC_CMD_VEL).await?;
    let pub_lift = session.declare_publisher(TOPIC_LIFT).await?;

    info!("Controls: W/S=drive, A/D=turn, L=lift, R/F=speed, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&pub_cmd_vel, &pub_lift).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    pub_cmd_vel: &zenoh::pubsub::Publisher<'_>,
    pub_lift: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;
    let mut lift = LiftRequest::default();

    let mut cmd = VelocityCommand::default();
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => {
                        cmd.linear_x = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        cmd.linear_x = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        cmd.angular_z = TURN_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        cmd.angular_z = -TURN_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }

                    // Lift toggles on key press only (ignore auto-repeat)
                    KeyCode::Char('l') if kind == KeyEventKind::Press => {
                        lift.raised = !lift.raised;
                        info!("Lift: {}", if lift.raised { "UP" } else { "DOWN" });
                        pub_lift.put(serde_json::to_string(&lift)?).await?;
                    }

                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            cmd = VelocityCommand::default();
        }

        // Always publish at ~50Hz
        pub_cmd_vel.put(serde_json::to_string(&cmd)?).await?;
    }

    // Leave the base stopped
    pub_cmd_vel
        .put(serde_json::to_string(&VelocityCommand::default())?)
        .await?;
    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
