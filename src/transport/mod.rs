pub mod backoff;
pub mod port;
pub mod serial;
pub mod tcp;

#[cfg(test)]
pub(crate) mod memory;

pub use backoff::BackoffPolicy;
pub use port::{shared, Connector, Port, SharedPort, StreamPort};
pub use serial::{list_ports, SerialConnector};
pub use tcp::TcpPort;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::Config;
use crate::utils::error::ModbusError;

/// Physical link the batteries hang off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeviceType {
    Serial,
    Tcp,
}

impl DeviceType {
    pub const NAMES: [&'static str; 2] = ["serial", "tcp"];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Serial => "serial",
            DeviceType::Tcp => "tcp",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = ModbusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serial" => Ok(DeviceType::Serial),
            "tcp" => Ok(DeviceType::Tcp),
            other => Err(ModbusError::ConfigError(format!(
                "unknown device type '{}', expected one of {}",
                other,
                DeviceType::NAMES.join(", ")
            ))),
        }
    }
}

impl TryFrom<String> for DeviceType {
    type Error = ModbusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceType> for String {
    fn from(device_type: DeviceType) -> Self {
        device_type.as_str().to_string()
    }
}

/// Opens the run's single port as described by `config`.
pub async fn open_port(config: &Config) -> Result<SharedPort, ModbusError> {
    let port: Box<dyn Port> = match config.device_type {
        DeviceType::Serial => Box::new(StreamPort::open(
            SerialConnector::new(&config.address, config.baud_rate, config.parity),
            config.reopen.clone(),
        )?),
        DeviceType::Tcp => Box::new(
            TcpPort::open(&config.address, config.read_timeout(), config.reopen.clone()).await?,
        ),
    };
    Ok(shared(port))
}
