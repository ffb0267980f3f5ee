use async_trait::async_trait;
use log::debug;
use std::time::Duration;

use super::telemetry::{ascii, flags, require_len, scaled, signed, u32_be, TelemetryRecord, Value};
use super::traits::BatteryProfile;
use crate::modbus::{Protocol, RegisterReader};
use crate::utils::error::ModbusError;

pub const INFO_START: u16 = 0;
pub const INFO_COUNT: u16 = 39;
pub const EXTRA_INFO_START: u16 = 105;
pub const EXTRA_INFO_COUNT: u16 = 23;

const CELL_COUNT: usize = 16;

/// EG4 LL v2 rack battery, Modbus RTU over RS-485.
#[derive(Debug, Clone, Copy, Default)]
pub struct Eg4LlV2Profile;

/// Decodes holding registers 0..39.
pub fn decode_info(registers: &[u16]) -> Result<TelemetryRecord, ModbusError> {
    require_len(registers, INFO_COUNT as usize, "EG4LLv2 info")?;
    let r = registers;

    let cells = r[2..2 + CELL_COUNT]
        .iter()
        .map(|&mv| Value::UInt(mv as u64))
        .collect();
    let temperatures = r[33..37].iter().map(|&t| Value::Int(signed(t))).collect();

    Ok(TelemetryRecord::new()
        .with("voltage", "V", scaled(r[0] as i64, 100.0))
        .with("current", "A", scaled(signed(r[1]), 100.0))
        .with("cell_voltages", "mV", Value::List(cells))
        .with("pcb_temp", "°C", Value::Int(signed(r[18])))
        .with("max_temp", "°C", Value::Int(signed(r[19])))
        .with("avg_temp", "°C", Value::Int(signed(r[20])))
        .with("cap_remaining", "%", Value::UInt(r[21] as u64))
        .with("max_charging_current", "A", Value::UInt(r[22] as u64))
        .with("soh", "%", Value::UInt(r[23] as u64))
        .with("soc", "%", Value::UInt(r[24] as u64))
        .with("status", "", flags(r[25]))
        .with("warning", "", flags(r[26]))
        .with("protection", "", flags(r[27]))
        .with("error_code", "", flags(r[28]))
        .with("cycle_counts", "", Value::UInt(u32_be(r[29], r[30])))
        .with("full_capacity", "mAh", Value::UInt(u32_be(r[31], r[32])))
        .with("temperatures", "°C", Value::List(temperatures))
        .with("cell_num", "", Value::UInt(r[37] as u64))
        .with("designed_capacity", "Ah", scaled(r[38] as i64, 10.0)))
}

/// Decodes holding registers 105..128: model, firmware and serial number.
pub fn decode_extra_info(registers: &[u16]) -> Result<TelemetryRecord, ModbusError> {
    require_len(registers, EXTRA_INFO_COUNT as usize, "EG4LLv2 extra info")?;

    Ok(TelemetryRecord::new()
        .with("model", "", ascii(&registers[0..12]))
        .with("firmware_version", "", ascii(&registers[12..15]))
        .with("serial", "", ascii(&registers[15..23])))
}

#[async_trait]
impl BatteryProfile for Eg4LlV2Profile {
    fn name(&self) -> &str {
        "EG4LLv2"
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
        debug!("Reading EG4LLv2 info from battery {}", id);
        let registers = reader
            .read_holding_registers(id, INFO_START, INFO_COUNT, timeout)
            .await?;
        decode_info(&registers)
    }

    async fn read_extra_info(
        &self,
        reader: &dyn RegisterReader,
        id: u8,
        timeout: Duration,
    ) -> Result<Option<TelemetryRecord>, ModbusError> {
        debug!("Reading EG4LLv2 extra info from battery {}", id);
        let registers = reader
            .read_holding_registers(id, EXTRA_INFO_START, EXTRA_INFO_COUNT, timeout)
            .await?;
        decode_extra_info(&registers).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::testing::StaticReader;

    fn info_block() -> Vec<u16> {
        let mut r = vec![0u16; INFO_COUNT as usize];
        r[0] = 5321;
        r[1] = (-1250i16) as u16;
        for (i, cell) in r[2..18].iter_mut().enumerate() {
            *cell = 3320 + i as u16;
        }
        r[18] = 31;
        r[19] = 27;
        r[20] = 25;
        r[21] = 87;
        r[22] = 100;
        r[23] = 99;
        r[24] = 88;
        r[25] = 0x0002;
        r[30] = 412;
        r[31] = 0x0001;
        r[32] = 0x86A0;
        r[33] = 24;
        r[34] = 25;
        r[35] = (-2i16) as u16;
        r[36] = 26;
        r[37] = 16;
        r[38] = 1000;
        r
    }

    #[test]
    fn test_decode_info() {
        let record = decode_info(&info_block()).unwrap();

        assert_eq!(record.get("voltage").unwrap().to_string(), "53.21");
        assert_eq!(record.get("current").unwrap().to_string(), "-12.5");
        assert_eq!(record.get("soc"), Some(&Value::UInt(88)));
        assert_eq!(record.get("status").unwrap().to_string(), "0x0002");
        assert_eq!(record.get("cycle_counts"), Some(&Value::UInt(412)));
        assert_eq!(record.get("full_capacity"), Some(&Value::UInt(100_000)));
        assert_eq!(record.get("temperatures").unwrap().to_string(), "[24, 25, -2, 26]");
        assert_eq!(record.get("designed_capacity").unwrap().to_string(), "100");
        match record.get("cell_voltages") {
            Some(Value::List(cells)) => {
                assert_eq!(cells.len(), 16);
                assert_eq!(cells[15], Value::UInt(3335));
            }
            other => panic!("unexpected cell voltages {:?}", other),
        }
        assert_eq!(record.fields()[0].name, "voltage");
    }

    #[test]
    fn test_decode_info_rejects_short_block() {
        assert!(matches!(
            decode_info(&[0u16; 10]),
            Err(ModbusError::InvalidData(_))
        ));
    }

    #[test]
    fn test_decode_extra_info() {
        let mut r = vec![0u16; EXTRA_INFO_COUNT as usize];
        // "LL-V2" / "Z02T" / "2023A0001"
        r[0..3].copy_from_slice(&[0x4C4C, 0x2D56, 0x3200]);
        r[12..14].copy_from_slice(&[0x5A30, 0x3254]);
        r[15..20].copy_from_slice(&[0x3230, 0x3233, 0x4130, 0x3030, 0x3100]);

        let record = decode_extra_info(&r).unwrap();
        assert_eq!(record.get("model").unwrap().to_string(), "LL-V2");
        assert_eq!(record.get("firmware_version").unwrap().to_string(), "Z02T");
        assert_eq!(record.get("serial").unwrap().to_string(), "2023A0001");
    }

    #[tokio::test]
    async fn test_reads_request_expected_blocks() {
        let reader = StaticReader::new(info_block());
        let record = Eg4LlV2Profile
            .read_info(&reader, 3, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(record.get("cell_num"), Some(&Value::UInt(16)));
        assert_eq!(reader.requests(), vec![(3, INFO_START, INFO_COUNT)]);

        let reader = StaticReader::new(vec![0x4141; EXTRA_INFO_COUNT as usize]);
        let extra = Eg4LlV2Profile
            .read_extra_info(&reader, 3, Duration::from_millis(100))
            .await
            .unwrap();
        assert!(extra.is_some());
        assert_eq!(reader.requests(), vec![(3, EXTRA_INFO_START, EXTRA_INFO_COUNT)]);
    }
}
