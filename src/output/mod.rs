pub mod formatters;

pub use formatters::{JsonEmitter, OutputFormat, ReportEmitter, TextEmitter};
