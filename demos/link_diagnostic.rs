// Link diagnostic: READ-ONLY telemetry dump from the motor board
//
// Sends status requests only; never writes wheel commands.
//
// Usage: cargo run --example link_diagnostic -- [port] [baudrate]
// Example: cargo run --example link_diagnostic -- /dev/ttyUSB0 115200

use doro_mobile_runtime::config::{DEFAULT_BAUDRATE, DEFAULT_PORT};
use doro_mobile_runtime::motor::{ActuatorLink, DoroBus};
use std::thread::sleep;
use std::time::Duration;

const POLLS: usize = 20;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let port = args.next().unwrap_or_else(|| DEFAULT_PORT.to_string());
    let baudrate = match args.next() {
        Some(raw) => raw.parse()?,
        None => DEFAULT_BAUDRATE,
    };

    println!("DORO link diagnostic (read-only)");
    println!("Serial port: {} @ {} baud", port, baudrate);
    println!();

    println!("Step 1: Opening serial port...");
    let mut bus = match DoroBus::open_with(&port, baudrate, Duration::from_millis(50)) {
        Ok(bus) => {
            println!("  ✓ Serial port opened");
            bus
        }
        Err(e) => {
            println!("  ✗ Failed to open serial port: {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  - Check the port path is correct");
            println!("  - Verify the USB cable is connected");
            println!("  - Check the user is in the dialout group");
            return Err(e.into());
        }
    };
    println!();

    println!("Step 2: Polling telemetry ({} frames)...", POLLS);
    let mut failures = 0;
    for i in 0..POLLS {
        match bus.poll() {
            Ok(frame) => println!(
                "  [{:2}] pos R={:+.3} L={:+.3}  rpm R={:+5} L={:+5}  \
                 lift {:?}  wheel_fault {:?}  lift_fault {:?}",
                i,
                frame.wheel_pos[0],
                frame.wheel_pos[1],
                frame.wheel_rpm[0],
                frame.wheel_rpm[1],
                frame.lift_switch,
                frame.wheel_fault,
                frame.lift_fault,
            ),
            Err(e) => {
                failures += 1;
                println!("  [{:2}] ✗ {}{}", i, e, if e.is_timeout() { " (timeout)" } else { "" });
            }
        }
        sleep(Duration::from_millis(100));
    }
    println!();

    if failures == 0 {
        println!("✓ All {} polls succeeded", POLLS);
    } else {
        println!("⚠ {} of {} polls failed", failures, POLLS);
        println!("  - Check the baudrate matches the board");
        println!("  - Check the board is powered");
    }
    Ok(())
}
