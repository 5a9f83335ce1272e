use anyhow::Result;
use chrono::Local;
use clap::ArgMatches;
use log::LevelFilter;
use std::{io::Write, path::Path, sync::Arc};
use tokio::io::BufReader;

use crate::{
    api::{connection::ConnectionManager, traits::LoggingHook},
    cli::{Console, Dispatcher, Settings},
    protocol::modbus::TcpTransport,
};
use env_logger::{Builder, Target};

pub const LOG_FILE_ENV: &str = "MODBUS_MASTER_LOG_FILE";

/// Initialize logging; a log file keeps the console free for the REPL.
pub fn init_logger(log_file: Option<&str>) {
    let log_file = log_file
        .map(str::to_string)
        .or_else(|| std::env::var(LOG_FILE_ENV).ok());

    if let Some(path) = log_file {
        if let Err(err) = init_file_logger(&path) {
            eprintln!("Failed to initialize file logger at '{path}': {err}");
            init_stderr_logger();
        }
    } else {
        init_stderr_logger();
    }
}

fn init_stderr_logger() {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .target(Target::Stderr)
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();
}

fn init_file_logger(path: &str) -> std::io::Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;

    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{}:{} {} [{}] - {}",
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(file)))
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    log::info!("File logger initialized at {path}");

    Ok(())
}

/// Load settings and run the interactive loop on stdin/stdout.
pub async fn start(matches: &ArgMatches) -> Result<()> {
    let config_path = matches.get_one::<String>("config").map(Path::new);
    let settings = match Settings::load(config_path) {
        Ok(settings) => settings,
        Err(err) => {
            log::warn!("{err:#}; using default settings");
            Settings::default()
        }
    };
    let config = settings.connection_config();
    log::info!("Initial target {} (slave id {})", config.endpoint(), config.slave_id);

    let manager =
        ConnectionManager::new(TcpTransport::new(), config).add_hook(Arc::new(LoggingHook));
    let colored = !matches.get_flag("no-color");
    let mut dispatcher = Dispatcher::new(
        manager,
        BufReader::new(tokio::io::stdin()),
        Console::stdout(colored),
    );
    dispatcher.run().await
}
