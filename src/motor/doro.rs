// Serial link to the DORO motor board
//
// Packet format: [0xFF, 0xFF, Length, Instruction, Params..., Checksum]
// Length counts instruction + params + checksum.
// Checksum = !(Length + Instruction + Params) & 0xFF

use serialport::{self, ClearBuffer, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::{debug, info};

use super::kinematics::WheelCommand;
use super::link::{ActuatorLink, LinkError, Result, TelemetryFrame};
use crate::config::LinkSettings;

/// Packet header bytes
const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Status reply params: pos_r f32, pos_l f32, rpm_r i16, rpm_l i16, flags u8
const STATUS_PARAMS_LEN: usize = 4 + 4 + 2 + 2 + 1;

/// Instruction set
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    Drive = 0x01,
    Status = 0x02,
}

/// Bits of the status flag byte
mod flags {
    pub const LIFT_SWITCH_0: u8 = 1 << 0;
    pub const LIFT_SWITCH_1: u8 = 1 << 1;
    pub const WHEEL_FAULT_RIGHT: u8 = 1 << 2;
    pub const WHEEL_FAULT_LEFT: u8 = 1 << 3;
    pub const LIFT_FAULT_0: u8 = 1 << 4;
    pub const LIFT_FAULT_1: u8 = 1 << 5;
}

/// Motor board link over a serial port
pub struct DoroBus {
    port: Box<dyn SerialPort>,
}

impl DoroBus {
    /// Open the serial port described by `settings`
    pub fn open(settings: &LinkSettings) -> Result<Self> {
        Self::open_with(&settings.port, settings.baudrate, settings.timeout)
    }

    pub fn open_with(port_name: &str, baudrate: u32, timeout: Duration) -> Result<Self> {
        info!("Opening motor board link on {} @ {} baud", port_name, baudrate);
        let port = serialport::new(port_name, baudrate)
            .timeout(timeout)
            .open()?;

        Ok(Self { port })
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }
}

impl ActuatorLink for DoroBus {
    fn write(&mut self, command: WheelCommand, lift_requested: bool) -> Result<()> {
        let packet = encode_drive(command, lift_requested);
        debug!(
            "Drive: right={} left={} lift={}",
            command.rpm_right, command.rpm_left, lift_requested
        );
        // Drive has no reply
        self.send_packet(&packet)
    }

    fn poll(&mut self) -> Result<TelemetryFrame> {
        // Drop anything left over from an earlier, timed-out exchange
        self.port.clear(ClearBuffer::Input)?;
        self.send_packet(&build_packet(Instruction::Status, &[]))?;

        let (instruction, params) = read_packet(&mut self.port)?;
        if instruction != Instruction::Status as u8 {
            return Err(LinkError::InvalidFrame {
                reason: format!("Unexpected instruction 0x{:02X}", instruction),
            });
        }
        decode_status(&params)
    }
}

/// Calculate checksum over length, instruction and params
fn checksum(data: &[u8]) -> u8 {
    let sum: u16 = data.iter().map(|&b| b as u16).sum();
    (!sum & 0xFF) as u8
}

/// Build a packet with header and checksum
pub fn build_packet(instruction: Instruction, params: &[u8]) -> Vec<u8> {
    let length = (params.len() + 2) as u8; // instruction + params + checksum
    let mut packet = Vec::with_capacity(5 + params.len());

    packet.extend_from_slice(&HEADER);
    packet.push(length);
    packet.push(instruction as u8);
    packet.extend_from_slice(params);

    let sum = checksum(&packet[2..]);
    packet.push(sum);

    packet
}

/// Board speed registers are 16-bit; saturate instead of wrapping
fn saturate_i16(rpm: i32) -> i16 {
    rpm.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Encode a drive packet (rpm right, rpm left, lift)
pub fn encode_drive(command: WheelCommand, lift_requested: bool) -> Vec<u8> {
    let right = saturate_i16(command.rpm_right).to_le_bytes();
    let left = saturate_i16(command.rpm_left).to_le_bytes();
    let params = [right[0], right[1], left[0], left[1], lift_requested as u8];
    build_packet(Instruction::Drive, &params)
}

/// Read one packet from `reader`, returning (instruction, params)
pub fn read_packet<R: Read + ?Sized>(reader: &mut R) -> Result<(u8, Vec<u8>)> {
    let mut header = [0u8; 2];
    read_exact(reader, &mut header)?;

    if header != HEADER {
        return Err(LinkError::InvalidFrame {
            reason: format!("Invalid header: {:02X?}", header),
        });
    }

    let mut length = [0u8; 1];
    read_exact(reader, &mut length)?;
    let length = length[0] as usize;
    if length < 2 {
        return Err(LinkError::InvalidFrame {
            reason: format!("Length {} too short", length),
        });
    }

    // instruction + params + checksum
    let mut body = vec![0u8; length];
    read_exact(reader, &mut body)?;

    let mut checksum_data = Vec::with_capacity(length);
    checksum_data.push(length as u8);
    checksum_data.extend_from_slice(&body[..length - 1]);
    let expected = checksum(&checksum_data);
    let received = body[length - 1];

    if expected != received {
        return Err(LinkError::ChecksumMismatch { expected, received });
    }

    Ok((body[0], body[1..length - 1].to_vec()))
}

fn read_exact<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::TimedOut => LinkError::Timeout,
        std::io::ErrorKind::UnexpectedEof => LinkError::Disconnected,
        _ => LinkError::Io(e),
    })
}

/// Decode status params into a telemetry frame
pub fn decode_status(params: &[u8]) -> Result<TelemetryFrame> {
    if params.len() != STATUS_PARAMS_LEN {
        return Err(LinkError::InvalidFrame {
            reason: format!(
                "Expected {} status bytes, got {}",
                STATUS_PARAMS_LEN,
                params.len()
            ),
        });
    }

    let f32_at = |i: usize| {
        f32::from_le_bytes([params[i], params[i + 1], params[i + 2], params[i + 3]])
    };
    let i16_at = |i: usize| i16::from_le_bytes([params[i], params[i + 1]]);
    let bits = params[12];
    let set = |mask: u8| bits & mask != 0;

    Ok(TelemetryFrame {
        wheel_pos: [f32_at(0) as f64, f32_at(4) as f64],
        wheel_rpm: [i16_at(8) as i32, i16_at(10) as i32],
        lift_switch: [set(flags::LIFT_SWITCH_0), set(flags::LIFT_SWITCH_1)],
        wheel_fault: [set(flags::WHEEL_FAULT_RIGHT), set(flags::WHEEL_FAULT_LEFT)],
        lift_fault: [set(flags::LIFT_FAULT_0), set(flags::LIFT_FAULT_1)],
    })
}
