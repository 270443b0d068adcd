use clap::{Arg, ArgAction, ArgMatches, Command};
use log::info;

use crate::config::settings::{parse_interval, Config, OutputFormat};

pub fn build_cli() -> Command {
    Command::new("modbus-logger")
        .version(crate::VERSION)
        .about("Polls Modbus RTU sensors, evaluates their formulas and logs one row per cycle")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Serial port (skips auto-discovery)"),
        )
        .arg(
            Arg::new("metadata")
                .short('m')
                .long("metadata")
                .value_name("CSV")
                .help("Sensor metadata CSV"),
        )
        .arg(
            Arg::new("database")
                .short('d')
                .long("database")
                .value_name("PATH")
                .help("SQLite database file"),
        )
        .arg(
            Arg::new("table")
                .long("table")
                .value_name("NAME")
                .help("Table receiving one row per cycle"),
        )
        .arg(
            Arg::new("interval")
                .short('i')
                .long("interval")
                .value_name("SECONDS")
                .allow_negative_numbers(true)
                .help("Polling interval in seconds (overrides INTERVAL)"),
        )
        .arg(
            Arg::new("print")
                .long("print")
                .action(ArgAction::SetTrue)
                .help("Print the values of every cycle"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .value_parser(["console", "json"])
                .help("Format of printed values"),
        )
        .arg(
            Arg::new("output-file")
                .short('o')
                .long("output-file")
                .value_name("FILE")
                .help("Also append printed values to this file"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Log SQL statements instead of writing the database"),
        )
        .arg(
            Arg::new("once")
                .long("once")
                .action(ArgAction::SetTrue)
                .help("Run a single poll cycle and exit"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Debug logging"),
        )
        .arg(
            Arg::new("write-config")
                .long("write-config")
                .value_name("FILE")
                .help("Write the effective configuration as TOML and exit"),
        )
        .subcommand(
            Command::new("scan").about("List serial ports and probe for responding devices"),
        )
        .subcommand(
            Command::new("check").about("Evaluate every sensor once and print, without writing"),
        )
}

/// Applies command-line flags on top of file and environment settings.
pub fn apply_overrides(matches: &ArgMatches, config: &mut Config) {
    if let Some(port) = matches.get_one::<String>("port") {
        info!("🔌 Using serial port from command line: {}", port);
        config.serial.port = Some(port.clone());
    }

    if let Some(path) = matches.get_one::<String>("metadata") {
        config.metadata.csv_path = path.clone();
    }

    if let Some(path) = matches.get_one::<String>("database") {
        config.database.path = path.clone();
    }

    if let Some(table) = matches.get_one::<String>("table") {
        config.database.table = table.clone();
    }

    if let Some(raw) = matches.get_one::<String>("interval") {
        config.polling.interval_seconds = parse_interval(Some(raw));
    }

    if matches.get_flag("print") {
        config.output.print_values = true;
    }

    if let Some(format) = matches.get_one::<String>("format") {
        config.output.format = match format.as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Console,
        };
    }

    if let Some(file) = matches.get_one::<String>("output-file") {
        info!("📝 Adding file output: {}", file);
        config.output.file = Some(file.clone());
        config.output.print_values = true;
    }

    if matches.get_flag("dry-run") {
        config.database.enabled = false;
    }

    // `check` evaluates and prints but never writes.
    if matches.subcommand_matches("check").is_some() {
        config.database.enabled = false;
        config.output.print_values = true;
    }
}
