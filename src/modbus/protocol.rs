use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::crc::crc16_modbus;
use crate::utils::error::ModbusError;

pub const READ_HOLDING_REGISTERS: u8 = 0x03;
const EXCEPTION_FLAG: u8 = 0x80;

/// Unit id, function code and byte count (or exception code).
pub const RTU_HEADER_LEN: usize = 3;
/// Transaction id, protocol id, length and unit id.
pub const MBAP_HEADER_LEN: usize = 7;

pub const MAX_REGISTERS_PER_READ: u16 = 125;

/// Wire protocol used to talk to the batteries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Protocol {
    /// Use the battery profile's default protocol.
    Auto,
    ModbusRtu,
    ModbusTcp,
}

impl Protocol {
    pub const NAMES: [&'static str; 3] = ["auto", "ModbusRTU", "ModbusTCP"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Auto => "auto",
            Protocol::ModbusRtu => "ModbusRTU",
            Protocol::ModbusTcp => "ModbusTCP",
        }
    }

    /// Replaces `Auto` with `default`, leaves explicit choices untouched.
    pub fn resolve(self, default: Protocol) -> Protocol {
        match self {
            Protocol::Auto => default,
            explicit => explicit,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ModbusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Protocol::Auto),
            "modbusrtu" | "rtu" => Ok(Protocol::ModbusRtu),
            "modbustcp" | "tcp" => Ok(Protocol::ModbusTcp),
            other => Err(ModbusError::ConfigError(format!(
                "unknown protocol '{}', expected one of {}",
                other,
                Protocol::NAMES.join(", ")
            ))),
        }
    }
}

impl TryFrom<String> for Protocol {
    type Error = ModbusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Protocol> for String {
    fn from(protocol: Protocol) -> Self {
        protocol.as_str().to_string()
    }
}

pub fn encode_rtu_read(unit: u8, start: u16, count: u16) -> Bytes {
    let mut frame = BytesMut::with_capacity(8);
    frame.put_u8(unit);
    frame.put_u8(READ_HOLDING_REGISTERS);
    frame.put_u16(start);
    frame.put_u16(count);
    let crc = crc16_modbus(&frame);
    frame.put_u16_le(crc);
    frame.freeze()
}

/// Bytes that still have to arrive once the RTU header has been read.
pub fn rtu_remaining_len(header: &[u8]) -> Result<usize, ModbusError> {
    if header.len() < RTU_HEADER_LEN {
        return Err(ModbusError::InvalidResponse(format!(
            "RTU header too short: {} bytes",
            header.len()
        )));
    }
    if header[1] & EXCEPTION_FLAG != 0 {
        // exception code already read, only the CRC is left
        Ok(2)
    } else {
        Ok(header[2] as usize + 2)
    }
}

pub fn decode_rtu_response(unit: u8, count: u16, frame: &[u8]) -> Result<Vec<u16>, ModbusError> {
    if frame.len() < 5 {
        return Err(ModbusError::InvalidResponse(format!(
            "RTU frame too short: {} bytes",
            frame.len()
        )));
    }

    let (body, crc_bytes) = frame.split_at(frame.len() - 2);
    let received = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
    let expected = crc16_modbus(body);
    if received != expected {
        return Err(ModbusError::CrcError { expected, received });
    }

    if body[0] != unit {
        return Err(ModbusError::InvalidResponse(format!(
            "unexpected unit id {} (expected {})",
            body[0], unit
        )));
    }

    decode_pdu(&body[1..], count)
}

pub fn encode_tcp_read(transaction_id: u16, unit: u8, start: u16, count: u16) -> Bytes {
    let mut frame = BytesMut::with_capacity(12);
    frame.put_u16(transaction_id);
    frame.put_u16(0);
    frame.put_u16(6);
    frame.put_u8(unit);
    frame.put_u8(READ_HOLDING_REGISTERS);
    frame.put_u16(start);
    frame.put_u16(count);
    frame.freeze()
}

/// Bytes that still have to arrive once the MBAP header has been read.
pub fn tcp_remaining_len(header: &[u8]) -> Result<usize, ModbusError> {
    if header.len() < MBAP_HEADER_LEN {
        return Err(ModbusError::InvalidResponse(format!(
            "MBAP header too short: {} bytes",
            header.len()
        )));
    }
    let length = u16::from_be_bytes([header[4], header[5]]) as usize;
    if length < 2 {
        return Err(ModbusError::InvalidResponse(format!("MBAP length {} too small", length)));
    }
    // the length field counts the unit id, which is part of the header
    Ok(length - 1)
}

pub fn decode_tcp_response(
    transaction_id: u16,
    unit: u8,
    count: u16,
    frame: &[u8],
) -> Result<Vec<u16>, ModbusError> {
    if frame.len() < MBAP_HEADER_LEN + 2 {
        return Err(ModbusError::InvalidResponse(format!(
            "TCP frame too short: {} bytes",
            frame.len()
        )));
    }

    let tid = u16::from_be_bytes([frame[0], frame[1]]);
    if tid != transaction_id {
        return Err(ModbusError::InvalidResponse(format!(
            "unexpected transaction id {} (expected {})",
            tid, transaction_id
        )));
    }
    let protocol_id = u16::from_be_bytes([frame[2], frame[3]]);
    if protocol_id != 0 {
        return Err(ModbusError::InvalidResponse(format!("unexpected protocol id {}", protocol_id)));
    }
    let length = u16::from_be_bytes([frame[4], frame[5]]) as usize;
    if length != frame.len() - 6 {
        return Err(ModbusError::InvalidResponse(format!(
            "MBAP length {} does not match {} received bytes",
            length,
            frame.len() - 6
        )));
    }
    if frame[6] != unit {
        return Err(ModbusError::InvalidResponse(format!(
            "unexpected unit id {} (expected {})",
            frame[6], unit
        )));
    }

    decode_pdu(&frame[MBAP_HEADER_LEN..], count)
}

fn decode_pdu(pdu: &[u8], count: u16) -> Result<Vec<u16>, ModbusError> {
    if pdu.len() < 2 {
        return Err(ModbusError::InvalidResponse("empty PDU".to_string()));
    }

    let function = pdu[0];
    if function == READ_HOLDING_REGISTERS | EXCEPTION_FLAG {
        return Err(ModbusError::Exception {
            function: READ_HOLDING_REGISTERS,
            code: pdu[1],
        });
    }
    if function != READ_HOLDING_REGISTERS {
        return Err(ModbusError::InvalidResponse(format!(
            "unexpected function code 0x{:02X}",
            function
        )));
    }

    let byte_count = pdu[1] as usize;
    let data = &pdu[2..];
    if byte_count != count as usize * 2 || data.len() != byte_count {
        return Err(ModbusError::InvalidResponse(format!(
            "expected {} data bytes, header says {} and {} arrived",
            count as usize * 2,
            byte_count,
            data.len()
        )));
    }

    Ok(data
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}
