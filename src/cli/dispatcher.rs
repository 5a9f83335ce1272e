//! The interactive command loop
//!
//! One line is read, parsed, validated and executed before the next prompt.
//! All arguments of a command are parsed up front; if any is invalid the
//! collected errors are printed and no transport operation runs.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::{fmt::Display, io::Write, sync::Arc, time::Duration};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use super::{
    args::{self, ParsedArgument},
    command::{Command, HelpGroup, Keyword},
    console::Console,
    values::RegisterValues,
};
use crate::api::{
    codec::{floats_to_words, word_to_bits, words_to_floats},
    connection::{ConnectionConfig, ConnectionManager},
    traits::{ConnectionHook, Transport, TransportError, TransportResult},
};

pub const PROMPT_HINT: &str = "Please enter a command. For help, type 'help'";
pub const PROMPT: &str = "Command: ";

/// Whether the loop keeps running after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Register table targeted by a read command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Table {
    Input,
    Holding,
}

impl Table {
    fn label(self) -> &'static str {
        match self {
            Table::Input => "input register",
            Table::Holding => "holding register",
        }
    }

    fn title(self) -> &'static str {
        match self {
            Table::Input => "Input register",
            Table::Holding => "Holding register",
        }
    }
}

/// `start - end` for `count` consecutive addresses
fn span(start: u16, count: u32) -> String {
    let end = u32::from(start) + count.max(1) - 1;
    format!("{start} - {end}")
}

/// Gather errors of every parsed argument; empty means all are valid.
fn errors_of<const N: usize>(errors: [&Vec<String>; N]) -> Vec<String> {
    args::collect_errors(errors)
}

fn list_errors<T>(values: &[ParsedArgument<T>]) -> Vec<String> {
    args::collect_errors(values.iter().map(|v| &v.errors))
}

/// Failed connect attempts waiting to be shown on the console
#[derive(Default)]
struct RetryNotices {
    pending: Mutex<Vec<String>>,
}

impl RetryNotices {
    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.pending.lock())
    }
}

impl ConnectionHook for RetryNotices {
    fn on_attempt_failed(
        &self,
        _config: &ConnectionConfig,
        _attempt: u32,
        _error: &TransportError,
        retry_in: Option<Duration>,
    ) {
        if let Some(delay) = retry_in {
            self.pending.lock().push(format!(
                "Unable to establish connection. Trying again in {} milliseconds",
                delay.as_millis()
            ));
        }
    }
}

pub struct Dispatcher<T: Transport, R, W: Write> {
    manager: ConnectionManager<T>,
    input: R,
    console: Console<W>,
    notices: Arc<RetryNotices>,
}

impl<T, R, W> Dispatcher<T, R, W>
where
    T: Transport,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    pub fn new(manager: ConnectionManager<T>, input: R, console: Console<W>) -> Self {
        let notices = Arc::new(RetryNotices::default());
        Self {
            manager: manager.add_hook(notices.clone()),
            input,
            console,
            notices,
        }
    }

    pub fn manager(&self) -> &ConnectionManager<T> {
        &self.manager
    }

    pub fn console(&self) -> &Console<W> {
        &self.console
    }

    pub fn into_parts(self) -> (ConnectionManager<T>, Console<W>) {
        (self.manager, self.console)
    }

    /// Connect with the initial configuration, then serve commands until
    /// `EXIT` or end of input.
    pub async fn run(&mut self) -> Result<()> {
        let config = self.manager.config().clone();
        self.console.blank();
        self.console.info("Found default connection values:");
        self.print_config(&config, false);
        self.connect_with(config).await;

        loop {
            self.console.blank();
            self.console.plain(PROMPT_HINT);
            self.console.question(PROMPT);

            let line = match self.read_line().await {
                Ok(line) => line,
                Err(err) => {
                    self.exit().await;
                    return Err(err);
                }
            };
            let Some(line) = line else {
                log::info!("Input closed, exiting");
                self.console.blank();
                self.exit().await;
                return Ok(());
            };

            let flow = self.handle_line(&line).await;
            self.console.blank();
            if flow == Flow::Exit {
                return Ok(());
            }
        }
    }

    /// Next input line without its terminator; `None` at end of input.
    ///
    /// Bytes that are not valid UTF-8 are replaced, so a stray byte only spoils
    /// its own line.
    async fn read_line(&mut self) -> Result<Option<String>> {
        let mut buf = Vec::new();
        let read = self
            .input
            .read_until(b'\n', &mut buf)
            .await
            .context("Failed to read command from input")?;
        if read == 0 {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&buf);
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }

    /// Execute one operator line.
    pub async fn handle_line(&mut self, line: &str) -> Flow {
        let command = Command::parse(line);
        if command.is_blank() {
            return Flow::Continue;
        }
        log::debug!("Command: {}", command.text);

        let Some(keyword) = command.keyword else {
            self.console
                .error("Unknown command. Type 'HELP' for a list of valid commands.");
            return Flow::Continue;
        };

        let text = command.text.as_str();
        let result = match keyword {
            Keyword::ReadCoils => self.read_coils(text, false).await,
            Keyword::ReadDiscretes => self.read_coils(text, true).await,
            Keyword::WriteCoil => self.write_coil(text).await,
            Keyword::WriteCoils => self.write_coils(text).await,
            Keyword::ReadInputRegisters => self.read_registers(text, Table::Input).await,
            Keyword::ReadInputRegistersBits => self.read_register_bits(text, Table::Input).await,
            Keyword::ReadInputRegistersFloats => {
                self.read_register_floats(text, Table::Input).await
            }
            Keyword::ReadHoldingRegisters => self.read_registers(text, Table::Holding).await,
            Keyword::ReadHoldingRegistersBits => {
                self.read_register_bits(text, Table::Holding).await
            }
            Keyword::ReadHoldingRegistersFloats => {
                self.read_register_floats(text, Table::Holding).await
            }
            Keyword::WriteHoldingRegister => self.write_holding_register(text).await,
            Keyword::WriteHoldingRegisters => self.write_holding_registers(text).await,
            Keyword::Connect => {
                self.connect(text).await;
                Ok(())
            }
            Keyword::SetSlaveId => {
                self.set_slave_id(text);
                Ok(())
            }
            Keyword::SetIpAddress => {
                self.set_ip_address(text).await;
                Ok(())
            }
            Keyword::SetPort => {
                self.set_port(text).await;
                Ok(())
            }
            Keyword::Help => {
                self.help();
                Ok(())
            }
            Keyword::Exit => {
                self.exit().await;
                return Flow::Exit;
            }
        };

        if let Err(err) = result {
            self.handle_failure(err).await;
        }
        Flow::Continue
    }

    /// Print the errors and report whether there were none.
    fn check(&mut self, errors: Vec<String>) -> bool {
        if errors.is_empty() {
            true
        } else {
            self.console.errors(&errors);
            false
        }
    }

    async fn handle_failure(&mut self, err: TransportError) {
        if !self.manager.is_connected() {
            log::warn!("Operation failed without a connection: {err}");
            self.console
                .error("Not connected to slave. Attempting to reconnect...");
            self.reconnect().await;
        } else {
            log::warn!("Operation failed: {err}");
            self.console.error(&format!(
                "Unable to read/write to slave. Make sure target slave ID exists. Current slave ID: {}",
                self.manager.slave_id()
            ));
            self.console.error(&err.to_string());
        }
    }

    fn print_config(&mut self, config: &ConnectionConfig, with_timeouts: bool) {
        self.console.info(&format!("IpAddress: {}", config.address));
        self.console.info(&format!("TcpPort: {}", config.port));
        self.console.info(&format!("SlaveId: {}", config.slave_id));
        self.console
            .info(&format!("RetryCount: {}", config.max_retry_count));
        self.console
            .info(&format!("RetryInterval: {}", config.retry_interval_ms));
        if with_timeouts {
            self.console
                .info(&format!("SendTimeout: {}", config.send_timeout_ms));
            self.console
                .info(&format!("ReceiveTimeout: {}", config.receive_timeout_ms));
        }
    }

    fn announce_disconnect(&mut self) {
        if let Some(active) = self.manager.active_config() {
            let endpoint = active.endpoint();
            self.console
                .info(&format!("Disconnecting from IP address: {endpoint}"));
        }
    }

    async fn connect_with(&mut self, config: ConnectionConfig) {
        self.announce_disconnect();
        self.console.info("Current connection settings:");
        self.print_config(&config, true);

        let endpoint = config.endpoint();
        self.console.info(&format!(
            "Trying to connect to IP address: {endpoint} ({} attempts, {} ms apart)",
            config.max_retry_count.max(1),
            config.retry_interval_ms
        ));
        let result = self.manager.connect(config).await;
        for notice in self.notices.take() {
            self.console.warning(&notice);
        }
        match result {
            Ok(()) => self
                .console
                .success(&format!("Master connected to IP address: {endpoint}")),
            Err(err) => {
                log::error!("{err}");
                self.console.error(&format!(
                    "Could not connect to IP address: {endpoint} within the maximum allowed retry attempts."
                ));
            }
        }
    }

    async fn reconnect(&mut self) {
        let config = self.manager.config().clone();
        self.connect_with(config).await;
    }

    async fn exit(&mut self) {
        self.announce_disconnect();
        self.manager.disconnect().await;
    }

    fn range_args(&mut self, text: &str) -> Option<(u16, u16)> {
        let start = args::parse::<u16>(text, "STARTADDRESS");
        let count = args::parse::<u16>(text, "NUMBERTOREAD");
        self.check(errors_of([&start.errors, &count.errors]))
            .then_some((start.value, count.value))
    }

    async fn read_coils(&mut self, text: &str, discrete: bool) -> TransportResult<()> {
        let Some((start, count)) = self.range_args(text) else {
            return Ok(());
        };
        let label = if discrete { "discrete input" } else { "coil" };
        let title = if discrete { "Discrete input" } else { "Coil" };

        self.console.info2(&format!(
            "Reading {label} addresses {}:",
            span(start, count.into())
        ));
        let values = if discrete {
            self.manager.read_discrete_inputs(start, count).await?
        } else {
            self.manager.read_coils(start, count).await?
        };
        for (address, value) in (u32::from(start)..).zip(values) {
            self.console
                .info(&format!("{title} address: {address} | Value: {value}"));
        }
        self.console.success("Read complete!");
        Ok(())
    }

    async fn read_words(
        &mut self,
        table: Table,
        start: u16,
        count: u16,
    ) -> TransportResult<Vec<u16>> {
        match table {
            Table::Input => self.manager.read_input_registers(start, count).await,
            Table::Holding => self.manager.read_holding_registers(start, count).await,
        }
    }

    async fn read_registers(&mut self, text: &str, table: Table) -> TransportResult<()> {
        let Some((start, count)) = self.range_args(text) else {
            return Ok(());
        };
        self.console.info2(&format!(
            "Reading {} addresses {}:",
            table.label(),
            span(start, count.into())
        ));
        let words = self.read_words(table, start, count).await?;
        for (address, word) in (u32::from(start)..).zip(words) {
            self.console.info(&format!(
                "{} address: {address} | Value: {word}",
                table.title()
            ));
        }
        self.console.success("Read complete!");
        Ok(())
    }

    async fn read_register_bits(&mut self, text: &str, table: Table) -> TransportResult<()> {
        let Some((start, count)) = self.range_args(text) else {
            return Ok(());
        };
        self.console.info2(&format!(
            "Reading bit values from {} addresses {}:",
            table.label(),
            span(start, count.into())
        ));
        let words = self.read_words(table, start, count).await?;
        for (address, word) in (u32::from(start)..).zip(words) {
            self.console.info(&format!(
                "{} address: {address} | Value: {word}",
                table.title()
            ));
            self.console.info2("LSB");
            for (i, bit) in word_to_bits(word).iter().enumerate() {
                self.console.info(&format!("Bit{i}: {}", u8::from(*bit)));
            }
            self.console.info2("MSB");
        }
        self.console.success("Read complete!");
        Ok(())
    }

    async fn read_register_floats(&mut self, text: &str, table: Table) -> TransportResult<()> {
        let Some((start, floats)) = self.range_args(text) else {
            return Ok(());
        };
        let Some(count) = floats.checked_mul(2) else {
            self.console.error(&format!(
                "Unable to read {floats} floats for argument --NUMBERTOREAD: {} registers exceed u16 (0-65535)",
                u32::from(floats) * 2
            ));
            return Ok(());
        };

        self.console.info2(&format!(
            "Reading float values from {}s addresses {}:",
            table.label(),
            span(start, count.into())
        ));
        let words = self.read_words(table, start, count).await?;
        let values = words_to_floats(&words).map_err(TransportError::protocol)?;
        for (address, value) in (u32::from(start)..).step_by(2).zip(values) {
            self.console.info(&format!(
                "{} addresses {address} - {} | Value: {value}",
                table.title(),
                address + 1
            ));
        }
        self.console.success("Read complete!");
        Ok(())
    }

    async fn write_coil(&mut self, text: &str) -> TransportResult<()> {
        let address = args::parse::<u16>(text, "ADDRESS");
        let value = args::parse::<bool>(text, "VALUE");
        if !self.check(errors_of([&address.errors, &value.errors])) {
            return Ok(());
        }

        self.console.info2(&format!(
            "Writing value: {} to coil address {}:",
            value.value, address.value
        ));
        self.manager
            .write_single_coil(address.value, value.value)
            .await?;
        self.console.success("Write complete!");
        Ok(())
    }

    async fn write_coils(&mut self, text: &str) -> TransportResult<()> {
        let start = args::parse::<u16>(text, "STARTADDRESS");
        let values = args::parse_multiple::<bool>(text, "VALUES");
        let mut errors = start.errors.clone();
        errors.extend(list_errors(&values));
        if !self.check(errors) {
            return Ok(());
        }

        let values = values.into_iter().map(|v| v.value).collect::<Vec<_>>();
        self.console.info2("Writing values to coils:");
        for (address, value) in (u32::from(start.value)..).zip(&values) {
            self.console
                .info(&format!("Coil address: {address} | Value: {value}"));
        }
        self.manager
            .write_multiple_coils(start.value, &values)
            .await?;
        self.console.success("Write complete!");
        Ok(())
    }

    async fn write_holding_register(&mut self, text: &str) -> TransportResult<()> {
        let address = args::parse::<u16>(text, "ADDRESS");
        let value = args::parse::<String>(text, "VALUE");
        let mut errors = errors_of([&address.errors, &value.errors]);
        let detected = if value.is_valid() {
            RegisterValues::detect(std::slice::from_ref(&value.value), "--VALUE")
                .map_err(|value_errors| errors.extend(value_errors))
                .ok()
        } else {
            None
        };
        let (Some(detected), true) = (detected, self.check(errors)) else {
            return Ok(());
        };
        let address = address.value;

        match detected {
            RegisterValues::Floats(floats) => {
                self.console.info2(&format!(
                    "Writing 32-bit float value: {} to holding register addresses {}:",
                    floats[0],
                    span(address, 2)
                ));
                self.manager
                    .write_multiple_registers(address, &floats_to_words(&floats))
                    .await?;
            }
            other => {
                let words = other.to_words().map_err(TransportError::protocol)?;
                let word = words[0];
                let shown = match &other {
                    RegisterValues::Binary(strings) => format!("{} ({word})", strings[0]),
                    _ => word.to_string(),
                };
                self.console.info2(&format!(
                    "Writing value: {shown} to holding register address {address}:"
                ));
                self.manager.write_single_register(address, word).await?;
            }
        }
        self.console.success("Write complete!");
        Ok(())
    }

    async fn write_holding_registers(&mut self, text: &str) -> TransportResult<()> {
        let start = args::parse::<u16>(text, "STARTADDRESS");
        let values = args::parse_multiple::<String>(text, "VALUES");
        let mut errors = start.errors.clone();
        errors.extend(list_errors(&values));

        let detected = if list_errors(&values).is_empty() {
            let tokens = values.into_iter().map(|v| v.value).collect::<Vec<_>>();
            RegisterValues::detect(&tokens, "--VALUES")
                .map_err(|value_errors| errors.extend(value_errors))
                .ok()
        } else {
            None
        };
        let (Some(detected), true) = (detected, self.check(errors)) else {
            return Ok(());
        };
        let start = start.value;
        let words = detected.to_words().map_err(TransportError::protocol)?;

        match &detected {
            RegisterValues::Words(words) => {
                self.console.info2("Writing values to holding registers:");
                self.print_writes(start, words);
            }
            RegisterValues::Binary(strings) => {
                self.console
                    .info2("Writing 16 bit binary values to holding registers:");
                let shown = strings
                    .iter()
                    .zip(&words)
                    .map(|(s, word)| format!("{s} ({word})"))
                    .collect::<Vec<_>>();
                self.print_writes(start, &shown);
            }
            RegisterValues::Floats(floats) => {
                self.console
                    .info2("Writing 32-bit float values to holding registers:");
                for (address, value) in (u32::from(start)..).step_by(2).zip(floats) {
                    self.console.info(&format!(
                        "Register address: {address}-{} | Value: {value}",
                        address + 1
                    ));
                }
            }
        }
        self.manager.write_multiple_registers(start, &words).await?;
        self.console.success("Write complete!");
        Ok(())
    }

    fn print_writes<V: Display>(&mut self, start: u16, values: &[V]) {
        for (address, value) in (u32::from(start)..).zip(values) {
            self.console
                .info(&format!("Register address: {address} | Value: {value}"));
        }
    }

    async fn connect(&mut self, text: &str) {
        let address = args::parse::<std::net::IpAddr>(text, "IPADDRESS");
        let port = args::parse::<u16>(text, "PORT");
        let slave_id = args::parse::<u8>(text, "SLAVEID");
        if !self.check(errors_of([&address.errors, &port.errors, &slave_id.errors])) {
            return;
        }
        let config = self
            .manager
            .config()
            .with_target(address.value, port.value, slave_id.value);
        self.connect_with(config).await;
    }

    fn set_slave_id(&mut self, text: &str) {
        let slave_id = args::parse::<u8>(text, "SLAVEID");
        if !self.check(slave_id.errors) {
            return;
        }
        let previous = self.manager.set_slave_id(slave_id.value);
        self.console.info(&format!(
            "Setting new slave id. Previous value: {previous} => New value {}",
            slave_id.value
        ));
    }

    async fn set_ip_address(&mut self, text: &str) {
        let address = args::parse::<std::net::IpAddr>(text, "IPADDRESS");
        if !self.check(address.errors) {
            return;
        }
        let current = self.manager.config().clone();
        self.console.info(&format!(
            "Setting slave IP address. Previous value: {} => New value {}",
            current.address, address.value
        ));
        self.connect_with(current.with_address(address.value)).await;
    }

    async fn set_port(&mut self, text: &str) {
        let port = args::parse::<u16>(text, "PORT");
        if !self.check(port.errors) {
            return;
        }
        let current = self.manager.config().clone();
        self.console.info(&format!(
            "Setting slave TCP port. Previous value: {} => New value {}",
            current.port, port.value
        ));
        self.connect_with(current.with_port(port.value)).await;
    }

    fn help(&mut self) {
        for (title, group) in [
            ("Modbus Commands:", HelpGroup::Modbus),
            ("Client Commands:", HelpGroup::Client),
        ] {
            self.console.blank();
            self.console.plain(title);
            for keyword in Keyword::in_group(group) {
                self.console.info(&keyword.help_line());
            }
        }
    }
}
