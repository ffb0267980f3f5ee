use async_trait::async_trait;
use log::debug;
use std::time::Duration;

use super::telemetry::{flags, require_len, scaled, signed, TelemetryRecord, Value};
use super::traits::BatteryProfile;
use crate::modbus::{Protocol, RegisterReader};
use crate::utils::error::ModbusError;

pub const INFO_START: u16 = 0;
pub const INFO_COUNT: u16 = 37;

/// Batteries built on a Pace BMS speaking its Modbus register map.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaceProfile;

/// Decodes holding registers 0..37. Capacities are in 10 mAh steps and
/// temperatures in 0.1 °C.
pub fn decode_info(registers: &[u16]) -> Result<TelemetryRecord, ModbusError> {
    require_len(registers, INFO_COUNT as usize, "Pace info")?;
    let r = registers;

    let cells = r[15..31].iter().map(|&mv| Value::UInt(mv as u64)).collect();
    let cell_temps = r[31..35]
        .iter()
        .map(|&t| scaled(signed(t), 10.0))
        .collect();

    Ok(TelemetryRecord::new()
        .with("current", "A", scaled(signed(r[0]), 100.0))
        .with("voltage", "V", scaled(r[1] as i64, 100.0))
        .with("soc", "%", Value::UInt(r[2] as u64))
        .with("soh", "%", Value::UInt(r[3] as u64))
        .with("remaining_capacity", "Ah", scaled(r[4] as i64, 100.0))
        .with("full_capacity", "Ah", scaled(r[5] as i64, 100.0))
        .with("design_capacity", "Ah", scaled(r[6] as i64, 100.0))
        .with("cycle_count", "", Value::UInt(r[7] as u64))
        .with("warning_flags", "", flags(r[9]))
        .with("protection_flags", "", flags(r[10]))
        .with("status_flags", "", flags(r[11]))
        .with("balance_status", "", flags(r[12]))
        .with("cell_voltages", "mV", Value::List(cells))
        .with("cell_temperatures", "°C", Value::List(cell_temps))
        .with("mosfet_temp", "°C", scaled(signed(r[35]), 10.0))
        .with("environment_temp", "°C", scaled(signed(r[36]), 10.0)))
}

#[async_trait]
impl BatteryProfile for PaceProfile {
    fn name(&self) -> &str {
        "pacemodbus"
    }

    fn default_protocol(&self) -> Protocol {
        Protocol::ModbusRtu
    }

    async fn read_info(
        &self,
        reader: &dyn RegisterReader,
        id: u8,
        timeout: Duration,
    ) -> Result<TelemetryRecord, ModbusError> {
        debug!("Reading Pace info from battery {}", id);
        let registers = reader
            .read_holding_registers(id, INFO_START, INFO_COUNT, timeout)
            .await?;
        decode_info(&registers)
    }

    async fn read_extra_info(
        &self,
        _reader: &dyn RegisterReader,
        _id: u8,
        _timeout: Duration,
    ) -> Result<Option<TelemetryRecord>, ModbusError> {
        // the Pace map has no identification block
        Ok(None)
    }
}
