pub mod commands;

pub use commands::{build_cli, handle_subcommands, run_battery_info};
