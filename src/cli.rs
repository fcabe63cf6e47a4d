use clap::{value_parser, Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    Command::new("meter-sync")
        .about("Poll prompt wizard usage/credit meters and count down to reset")
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .num_args(1)
                .help("Override RUST_LOG level (e.g., info, debug)"),
        )
        .arg(
            Arg::new("version")
                .long("version")
                .help("Print version and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("base-url")
                .long("base-url")
                .num_args(1)
                .help("Backend origin (overrides METER_BASE_URL)"),
        )
        .arg(
            Arg::new("interval")
                .long("interval")
                .num_args(1)
                .value_parser(value_parser!(u64).range(1..))
                .help("Poll interval in seconds (overrides METER_POLL_INTERVAL_SECS)"),
        )
        .arg(
            Arg::new("once")
                .long("once")
                .help("Sync once, print the meter state as JSON and exit")
                .action(ArgAction::SetTrue),
        )
}

pub fn init_logging(level: Option<&str>) {
    // Explicit level wins, then RUST_LOG, then info. Logs stay on stderr so
    // the status line and --once JSON own stdout.
    if let Some(lvl) = level {
        std::env::set_var("RUST_LOG", lvl);
    } else if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .format_target(false)
        .init();
}
