pub mod outcome;
pub mod poller;

pub use outcome::{Operation, ReadFailure, RunFailed, RunOutcome};
pub use poller::BatteryPoller;
