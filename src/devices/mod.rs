pub mod traits;
pub mod telemetry;
pub mod battery_type;
pub mod eg4_llv2;
pub mod pace;

pub use traits::BatteryProfile;
pub use telemetry::{Field, TelemetryRecord, Value};
pub use battery_type::BatteryType;
pub use eg4_llv2::Eg4LlV2Profile;
pub use pace::PaceProfile;
