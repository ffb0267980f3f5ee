use clap::ArgMatches;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::devices::BatteryType;
use crate::modbus::Protocol;
use crate::output::OutputFormat;
use crate::transport::{BackoffPolicy, DeviceType};
use crate::utils::error::ModbusError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Connection settings
    pub address: String,
    pub device_type: DeviceType,
    pub baud_rate: u32,
    pub parity: ParityConfig,
    pub read_timeout_ms: u64,

    // Batteries on the bus, polled in this order
    pub battery_ids: Vec<u8>,
    pub battery_type: BatteryType,
    pub protocol: Protocol,

    pub format: OutputFormat,

    // Reopen policy after a failed exchange
    pub reopen: BackoffPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParityConfig {
    None,
    Even,
    Odd,
}

impl FromStr for ParityConfig {
    type Err = ModbusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "n" => Ok(ParityConfig::None),
            "even" | "e" => Ok(ParityConfig::Even),
            "odd" | "o" => Ok(ParityConfig::Odd),
            other => Err(ModbusError::ConfigError(format!("unknown parity '{}'", other))),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: String::new(),
            device_type: DeviceType::Serial,
            baud_rate: 9600,
            parity: ParityConfig::None,
            read_timeout_ms: 500,

            battery_ids: Vec::new(),
            battery_type: BatteryType::Eg4LlV2,
            protocol: Protocol::Auto,

            format: OutputFormat::Text,

            reopen: BackoffPolicy::default(),
        }
    }
}

impl Config {
    /// Defaults, then the `--config` file if given, then command line flags.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, ModbusError> {
        let mut config = match matches.get_one::<String>("config") {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_matches(matches)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModbusError> {
        let path = path.as_ref();
        info!("📄 Loading configuration from {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|e| {
            ModbusError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Overrides fields with the flags present on the command line.
    pub fn apply_matches(&mut self, matches: &ArgMatches) -> Result<(), ModbusError> {
        if let Some(address) = matches.get_one::<String>("address") {
            self.address = address.clone();
        }
        if let Some(ids) = matches.get_many::<String>("battery-ids") {
            self.battery_ids = parse_battery_ids(ids.map(String::as_str))?;
        }
        if let Some(timeout) = matches.get_one::<String>("read-timeout") {
            self.read_timeout_ms = parse_duration(timeout)?.as_millis() as u64;
        }
        if let Some(baud) = matches.get_one::<String>("baud-rate") {
            self.baud_rate = baud
                .parse()
                .map_err(|e| ModbusError::ConfigError(format!("invalid baud rate '{}': {}", baud, e)))?;
        }
        if let Some(parity) = matches.get_one::<String>("parity") {
            self.parity = parity.parse()?;
        }
        if let Some(battery_type) = matches.get_one::<String>("battery-type") {
            self.battery_type = battery_type.parse()?;
        }
        if let Some(protocol) = matches.get_one::<String>("protocol") {
            self.protocol = protocol.parse()?;
        }
        if let Some(device_type) = matches.get_one::<String>("device-type") {
            self.device_type = device_type.parse()?;
        }
        if let Some(format) = matches.get_one::<String>("format") {
            self.format = format.parse()?;
        }
        if let Some(attempts) = matches.get_one::<String>("reopen-attempts") {
            self.reopen.max_attempts = attempts.parse().map_err(|e| {
                ModbusError::ConfigError(format!("invalid reopen attempts '{}': {}", attempts, e))
            })?;
        }

        debug!("Effective configuration: {:?}", self);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ModbusError> {
        if self.address.trim().is_empty() {
            return Err(ModbusError::ConfigError(
                "no port or address given (use --address)".to_string(),
            ));
        }
        if self.battery_ids.is_empty() {
            return Err(ModbusError::ConfigError(
                "no battery ids given (use --battery-ids)".to_string(),
            ));
        }
        if self.read_timeout_ms == 0 {
            return Err(ModbusError::ConfigError("read timeout must be positive".to_string()));
        }
        if self.baud_rate == 0 {
            return Err(ModbusError::ConfigError("baud rate must be positive".to_string()));
        }
        if self.reopen.max_attempts == 0 {
            return Err(ModbusError::ConfigError(
                "at least one reopen attempt is required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Accepts `500ms`, `2s`, `1.5s`, `1m` or a bare number of milliseconds.
pub fn parse_duration(text: &str) -> Result<Duration, ModbusError> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| ModbusError::ConfigError(format!("invalid duration '{}'", text)))?;
    let millis = match unit.trim() {
        "" | "ms" => value,
        "s" => value * 1000.0,
        "m" | "min" => value * 60_000.0,
        other => {
            return Err(ModbusError::ConfigError(format!(
                "unknown duration unit '{}' in '{}'",
                other, text
            )))
        }
    };

    Ok(Duration::from_millis(millis.round() as u64))
}

/// Ids may be repeated values, comma separated, or both. Order and duplicates
/// are kept.
pub fn parse_battery_ids<'a, I>(values: I) -> Result<Vec<u8>, ModbusError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut ids = Vec::new();
    for value in values {
        for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let id = part.parse::<u8>().map_err(|e| {
                ModbusError::ConfigError(format!("invalid battery id '{}': {}", part, e))
            })?;
            ids.push(id);
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_cli_defaults() {
        let config = Config::default();
        assert_eq!(config.read_timeout(), Duration::from_millis(500));
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.battery_type, BatteryType::Eg4LlV2);
        assert_eq!(config.protocol, Protocol::Auto);
        assert_eq!(config.device_type, DeviceType::Serial);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("750").unwrap(), Duration::from_millis(750));
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("3h").is_err());
    }

    #[test]
    fn test_parse_battery_ids_keeps_order_and_duplicates() {
        let ids = parse_battery_ids(["3,3", "7"]).unwrap();
        assert_eq!(ids, vec![3, 3, 7]);
        assert!(parse_battery_ids(["300"]).is_err());
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("bms-poller-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            r#"
address = "/dev/ttyUSB1"
battery_ids = [1, 2]
battery_type = "pacemodbus"
protocol = "ModbusRTU"
parity = "Even"

[reopen]
max_attempts = 5
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.address, "/dev/ttyUSB1");
        assert_eq!(config.battery_ids, vec![1, 2]);
        assert_eq!(config.battery_type, BatteryType::PaceModbus);
        assert_eq!(config.protocol, Protocol::ModbusRtu);
        assert_eq!(config.parity, ParityConfig::Even);
        assert_eq!(config.reopen.max_attempts, 5);
        assert_eq!(config.reopen.initial_delay_ms, 500);
        assert_eq!(config.baud_rate, 9600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_rejects_unknown_battery() {
        let path = std::env::temp_dir().join(format!("bms-poller-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "battery_type = \"lifepower4\"\n").unwrap();
        let result = Config::from_file(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(ModbusError::ConfigError(_))));
    }
}
