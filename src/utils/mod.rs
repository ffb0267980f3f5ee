pub mod error;

pub use error::{ModbusError, PollError};
