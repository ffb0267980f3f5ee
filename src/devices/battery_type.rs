use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::eg4_llv2::Eg4LlV2Profile;
use super::pace::PaceProfile;
use super::telemetry::TelemetryRecord;
use super::traits::BatteryProfile;
use crate::modbus::{Protocol, RegisterReader};
use crate::utils::error::ModbusError;

/// Supported battery models, chosen once when the run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BatteryType {
    Eg4LlV2,
    PaceModbus,
}

impl BatteryType {
    pub const NAMES: [&'static str; 2] = ["EG4LLv2", "pacemodbus"];

    pub fn all() -> [BatteryType; 2] {
        [BatteryType::Eg4LlV2, BatteryType::PaceModbus]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatteryType::Eg4LlV2 => "EG4LLv2",
            BatteryType::PaceModbus => "pacemodbus",
        }
    }

    fn profile(&self) -> &'static dyn BatteryProfile {
        match self {
            BatteryType::Eg4LlV2 => &Eg4LlV2Profile,
            BatteryType::PaceModbus => &PaceProfile,
        }
    }
}

impl fmt::Display for BatteryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatteryType {
    type Err = ModbusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eg4llv2" | "eg4-ll-v2" => Ok(BatteryType::Eg4LlV2),
            "pacemodbus" | "pace" => Ok(BatteryType::PaceModbus),
            other => Err(ModbusError::ConfigError(format!(
                "unknown battery type '{}', expected one of {}",
                other,
                BatteryType::NAMES.join(", ")
            ))),
        }
    }
}

impl TryFrom<String> for BatteryType {
    type Error = ModbusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BatteryType> for String {
    fn from(battery_type: BatteryType) -> Self {
        battery_type.as_str().to_string()
    }
}

#[async_trait]
impl BatteryProfile for BatteryType {
    fn name(&self) -> &str {
        self.as_str()
    }

    fn default_protocol(&self) -> Protocol {
        self.profile().default_protocol()
    }

    async fn read_info(
        &self,
        reader: &dyn RegisterReader,
        id: u8,
        timeout: Duration,
    ) -> Result<TelemetryRecord, ModbusError> {
        self.profile().read_info(reader, id, timeout).await
    }

    async fn read_extra_info(
        &self,
        reader: &dyn RegisterReader,
        id: u8,
        timeout: Duration,
    ) -> Result<Option<TelemetryRecord>, ModbusError> {
        self.profile().read_extra_info(reader, id, timeout).await
    }
}
