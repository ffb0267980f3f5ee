use async_trait::async_trait;
use log::debug;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

use super::protocol::{
    decode_rtu_response, decode_tcp_response, encode_rtu_read, encode_tcp_read, rtu_remaining_len,
    tcp_remaining_len, Protocol, MAX_REGISTERS_PER_READ, MBAP_HEADER_LEN, RTU_HEADER_LEN,
};
use crate::transport::{Port, SharedPort};
use crate::utils::error::ModbusError;

/// Typed register reads over the run's shared port.
#[async_trait]
pub trait RegisterReader: Send + Sync {
    async fn read_holding_registers(
        &self,
        unit: u8,
        start: u16,
        count: u16,
        timeout: Duration,
    ) -> Result<Vec<u16>, ModbusError>;

    fn protocol(&self) -> Protocol;
}

/// Builds the reader for an explicit protocol. `Auto` has to be resolved
/// against the battery type before getting here.
pub fn reader_from_protocol(
    port: SharedPort,
    protocol: Protocol,
) -> Result<Box<dyn RegisterReader>, ModbusError> {
    match protocol {
        Protocol::ModbusRtu => Ok(Box::new(RtuReader::new(port))),
        Protocol::ModbusTcp => Ok(Box::new(TcpReader::new(port))),
        Protocol::Auto => Err(ModbusError::ConfigError(
            "protocol 'auto' has no reader, resolve it against the battery type first".to_string(),
        )),
    }
}

fn check_count(count: u16) -> Result<(), ModbusError> {
    if count == 0 || count > MAX_REGISTERS_PER_READ {
        return Err(ModbusError::InvalidData(format!(
            "cannot read {} registers at once (1..={})",
            count, MAX_REGISTERS_PER_READ
        )));
    }
    Ok(())
}

async fn read_exact(port: &mut dyn Port, len: usize, deadline: Instant) -> Result<Vec<u8>, ModbusError> {
    let mut buffer = Vec::with_capacity(len);
    while buffer.len() < len {
        let now = Instant::now();
        if now >= deadline {
            return Err(ModbusError::Timeout);
        }
        let chunk = port.read(len - buffer.len(), deadline - now).await?;
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer)
}

pub struct RtuReader {
    port: SharedPort,
}

impl RtuReader {
    pub fn new(port: SharedPort) -> Self {
        Self { port }
    }
}

#[async_trait]
impl RegisterReader for RtuReader {
    async fn read_holding_registers(
        &self,
        unit: u8,
        start: u16,
        count: u16,
        timeout: Duration,
    ) -> Result<Vec<u16>, ModbusError> {
        check_count(count)?;
        let request = encode_rtu_read(unit, start, count);

        let mut guard = self.port.lock().await;
        let port: &mut dyn Port = &mut **guard;

        debug!("📤 TX #{} {}", unit, hex::encode(&request));
        port.write(&request).await?;

        let deadline = Instant::now() + timeout;
        let mut frame = read_exact(port, RTU_HEADER_LEN, deadline).await?;
        let remaining = rtu_remaining_len(&frame)?;
        frame.extend(read_exact(port, remaining, deadline).await?);
        debug!("📥 RX #{} {}", unit, hex::encode(&frame));

        decode_rtu_response(unit, count, &frame)
    }

    fn protocol(&self) -> Protocol {
        Protocol::ModbusRtu
    }
}

pub struct TcpReader {
    port: SharedPort,
    next_transaction: AtomicU16,
}

impl TcpReader {
    pub fn new(port: SharedPort) -> Self {
        Self {
            port,
            next_transaction: AtomicU16::new(1),
        }
    }
}

#[async_trait]
impl RegisterReader for TcpReader {
    async fn read_holding_registers(
        &self,
        unit: u8,
        start: u16,
        count: u16,
        timeout: Duration,
    ) -> Result<Vec<u16>, ModbusError> {
        check_count(count)?;
        let transaction_id = self.next_transaction.fetch_add(1, Ordering::Relaxed);
        let request = encode_tcp_read(transaction_id, unit, start, count);

        let mut guard = self.port.lock().await;
        let port: &mut dyn Port = &mut **guard;

        debug!("📤 TX #{} tid={} {}", unit, transaction_id, hex::encode(&request));
        port.write(&request).await?;

        let deadline = Instant::now() + timeout;
        let mut frame = read_exact(port, MBAP_HEADER_LEN, deadline).await?;
        let remaining = tcp_remaining_len(&frame)?;
        frame.extend(read_exact(port, remaining, deadline).await?);
        debug!("📥 RX #{} tid={} {}", unit, transaction_id, hex::encode(&frame));

        decode_tcp_response(transaction_id, unit, count, &frame)
    }

    fn protocol(&self) -> Protocol {
        Protocol::ModbusTcp
    }
}
