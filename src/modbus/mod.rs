pub mod client;
pub mod protocol;
pub mod crc;

pub use client::{reader_from_protocol, RegisterReader, RtuReader, TcpReader};
pub use protocol::Protocol;
pub use crc::crc16_modbus;
