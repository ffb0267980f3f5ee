pub mod settings;

pub use settings::{parse_battery_ids, parse_duration, Config, ParityConfig};
