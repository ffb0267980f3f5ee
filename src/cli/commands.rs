use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::info;

use crate::config::Config;
use crate::devices::BatteryProfile;
use crate::modbus::reader_from_protocol;
use crate::output::ReportEmitter;
use crate::services::{BatteryPoller, RunOutcome};
use crate::transport::{list_ports, open_port};
use crate::utils::error::PollError;

pub fn build_cli() -> Command {
    Command::new("bms-poller")
        .version(crate::VERSION)
        .about("Reads battery management systems over Modbus RTU/TCP")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file, command line flags take precedence")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Log progress to stderr")
                .global(true),
        )
        .subcommand(battery_info_command())
        .subcommand(Command::new("list-ports").about("List serial ports found on this machine"))
}

fn battery_info_command() -> Command {
    Command::new("battery-info")
        .about("Read information and status from one or more batteries")
        .arg(
            Arg::new("address")
                .short('p')
                .long("address")
                .value_name("PORT")
                .help("Serial port path, or host[:port] with --device-type tcp"),
        )
        .arg(
            Arg::new("battery-ids")
                .short('i')
                .long("battery-ids")
                .value_name("ID")
                .num_args(1..)
                .action(ArgAction::Append)
                .help("Modbus ids to poll, repeated or comma separated"),
        )
        .arg(
            Arg::new("read-timeout")
                .short('t')
                .long("read-timeout")
                .value_name("DURATION")
                .help("Timeout for each request, e.g. 500ms or 2s [default: 500ms]"),
        )
        .arg(
            Arg::new("baud-rate")
                .short('B')
                .long("baud-rate")
                .value_name("BAUD")
                .help("Serial baud rate [default: 9600]"),
        )
        .arg(
            Arg::new("parity")
                .long("parity")
                .value_name("PARITY")
                .help("Serial parity: none, even or odd [default: none]"),
        )
        .arg(
            Arg::new("battery-type")
                .long("battery-type")
                .value_name("TYPE")
                .help("Battery model: EG4LLv2 or pacemodbus [default: EG4LLv2]"),
        )
        .arg(
            Arg::new("protocol")
                .long("protocol")
                .value_name("PROTOCOL")
                .help("auto, ModbusRTU or ModbusTCP [default: auto]"),
        )
        .arg(
            Arg::new("device-type")
                .short('T')
                .long("device-type")
                .value_name("TYPE")
                .help("serial or tcp [default: serial]"),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .value_name("FORMAT")
                .help("Report format: text or json [default: text]"),
        )
        .arg(
            Arg::new("reopen-attempts")
                .long("reopen-attempts")
                .value_name("N")
                .help("Attempts to reopen the port after a failed read [default: 3]"),
        )
}

/// Polls every configured battery over one port.
///
/// Read failures end up in the returned outcome. Failing to open the port,
/// to build the reader or to reopen the port is fatal.
pub async fn run_battery_info(
    config: &Config,
    emitter: &mut dyn ReportEmitter,
) -> Result<RunOutcome, PollError> {
    let protocol = config
        .protocol
        .resolve(config.battery_type.default_protocol());
    info!(
        "🔋 Battery type {} using {} on {} ({})",
        config.battery_type, protocol, config.address, config.device_type
    );

    let port = open_port(config).await.map_err(|source| PollError::Open {
        port: config.address.clone(),
        source,
    })?;

    let reader = reader_from_protocol(port.clone(), protocol).map_err(|source| PollError::Reader {
        protocol: protocol.to_string(),
        source,
    })?;

    let poller = BatteryPoller::new(
        port,
        reader,
        Box::new(config.battery_type),
        config.read_timeout(),
    );
    poller.poll(&config.battery_ids, emitter).await
}

pub async fn handle_subcommands(matches: &ArgMatches) -> anyhow::Result<()> {
    match matches.subcommand() {
        Some(("battery-info", sub_matches)) => {
            let config = Config::from_matches(sub_matches).context("invalid configuration")?;
            let mut emitter = config.format.emitter(std::io::stdout());

            let outcome = run_battery_info(&config, emitter.as_mut()).await?;
            outcome.into_result()?;
            Ok(())
        }
        Some(("list-ports", _)) => {
            let ports = list_ports()?;
            if ports.is_empty() {
                println!("No serial ports found");
            }
            for port in ports {
                println!("{}", port);
            }
            Ok(())
        }
        Some((other, _)) => anyhow::bail!("unknown command '{}'", other),
        None => anyhow::bail!("no command given"),
    }
}
