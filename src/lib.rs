//! Battery management system poller
//!
//! Reads identification and status registers from batteries sharing one
//! RS485 bus or Modbus TCP gateway, one battery after the other, and prints
//! a report per battery. A failed read is recorded, the port is reopened and
//! polling moves on to the next battery.

pub mod cli;
pub mod config;
pub mod devices;
pub mod modbus;
pub mod output;
pub mod services;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use devices::{BatteryProfile, BatteryType, TelemetryRecord};
pub use modbus::{Protocol, RegisterReader};
pub use output::{OutputFormat, ReportEmitter};
pub use services::{BatteryPoller, RunOutcome};
pub use utils::error::{ModbusError, PollError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
