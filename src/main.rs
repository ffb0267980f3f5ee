use bms_poller::cli::{build_cli, handle_subcommands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = build_cli().get_matches();

    let verbose = matches.get_flag("verbose")
        || matches
            .subcommand()
            .map_or(false, |(_, sub_matches)| sub_matches.get_flag("verbose"));
    let default_filter = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    handle_subcommands(&matches).await
}
