use async_trait::async_trait;
use std::time::Duration;

use super::telemetry::TelemetryRecord;
use crate::modbus::{Protocol, RegisterReader};
use crate::utils::error::ModbusError;

/// Register layout and decoding for one battery model.
#[async_trait]
pub trait BatteryProfile: Send + Sync {
    fn name(&self) -> &str;

    /// Protocol used when the run asks for `auto`.
    fn default_protocol(&self) -> Protocol;

    async fn read_info(
        &self,
        reader: &dyn RegisterReader,
        id: u8,
        timeout: Duration,
    ) -> Result<TelemetryRecord, ModbusError>;

    /// `Ok(None)` means the model has no extended data, which is not a failure.
    async fn read_extra_info(
        &self,
        reader: &dyn RegisterReader,
        id: u8,
        timeout: Duration,
    ) -> Result<Option<TelemetryRecord>, ModbusError>;
}
