pub mod args;
pub mod command;
pub mod config;
pub mod console;
pub mod dispatcher;
pub mod values;

use clap::{Arg, ArgMatches, Command};

pub use config::Settings;
pub use console::Console;
pub use dispatcher::{Dispatcher, Flow};

/// Build the process argument parser.
pub fn build_command() -> Command {
    Command::new("modbus_master")
        .about("Interactive command-line master client for Modbus TCP")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("PATH")
                .help("Settings file (JSON, or TOML by extension); defaults to ./appsettings.json"),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .value_name("PATH")
                .help("Append logs to this file instead of stderr (also MODBUS_MASTER_LOG_FILE)"),
        )
        .arg(
            Arg::new("no-color")
                .long("no-color")
                .help("Disable colored console output")
                .action(clap::ArgAction::SetTrue),
        )
}

/// Parse command line arguments and return ArgMatches.
pub fn parse_args() -> ArgMatches {
    build_command().get_matches()
}
