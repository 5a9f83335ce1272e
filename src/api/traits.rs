/// Core Modbus master API traits - Abstract interfaces without a concrete socket
///
/// This module defines the seams of the master client:
/// - [`Transport`]: the Modbus request/response capability the connection
///   manager drives (the TCP implementation lives in `protocol::modbus`)
/// - [`ConnectionHook`]: observers notified about connection lifecycle events
///
/// Tests substitute both with in-memory implementations.
use async_trait::async_trait;
use derive_more::{Display, Error};
use std::{net::SocketAddr, time::Duration};

use super::connection::{ConnectionConfig, ConnectionState};

/// Socket timeouts applied to every transport operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub send: Duration,
    pub receive: Duration,
}

impl Timeouts {
    pub fn from_millis(send_ms: u64, receive_ms: u64) -> Self {
        Self {
            send: Duration::from_millis(send_ms),
            receive: Duration::from_millis(receive_ms),
        }
    }
}

/// Operation name carried by a [`TransportError::Timeout`] while waiting for a response
pub const RECEIVE_OPERATION: &str = "receive";

/// Typed failure of a transport call
///
/// `is_connection_loss` tells the connection manager whether the link is gone
/// (and the state must drop to disconnected) or whether the remote side merely
/// rejected or ignored the request. A receive timeout keeps the link: a slave
/// that does not serve the addressed unit id usually stays silent.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum TransportError {
    #[display("not connected")]
    NotConnected,
    #[display("I/O error: {message}")]
    Io { message: String },
    #[display("{operation} timed out after {after_ms} ms")]
    Timeout { operation: String, after_ms: u64 },
    #[display("invalid response: {message}")]
    Protocol { message: String },
    #[display("slave returned Modbus exception 0x{code:02X}")]
    Exception { code: u8 },
}

impl TransportError {
    pub fn io(err: impl std::fmt::Display) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }

    pub fn protocol(err: impl std::fmt::Display) -> Self {
        Self::Protocol {
            message: err.to_string(),
        }
    }

    pub fn receive_timeout(after_ms: u64) -> Self {
        Self::Timeout {
            operation: RECEIVE_OPERATION.to_string(),
            after_ms,
        }
    }

    pub fn is_connection_loss(&self) -> bool {
        match self {
            Self::NotConnected | Self::Io { .. } => true,
            Self::Timeout { operation, .. } => operation != RECEIVE_OPERATION,
            Self::Protocol { .. } | Self::Exception { .. } => false,
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Modbus master transport capability
///
/// Every register operation is addressed at `slave_id` (the Modbus unit id).
/// Implementations keep at most one open link; `connect` on an open transport
/// replaces the link.
#[async_trait]
pub trait Transport: Send {
    async fn connect(&mut self, endpoint: SocketAddr, timeouts: Timeouts) -> TransportResult<()>;

    async fn disconnect(&mut self);

    /// Whether a link is currently open
    fn is_open(&self) -> bool;

    async fn read_coils(&mut self, slave_id: u8, start: u16, count: u16)
        -> TransportResult<Vec<bool>>;

    async fn read_discrete_inputs(
        &mut self,
        slave_id: u8,
        start: u16,
        count: u16,
    ) -> TransportResult<Vec<bool>>;

    async fn read_input_registers(
        &mut self,
        slave_id: u8,
        start: u16,
        count: u16,
    ) -> TransportResult<Vec<u16>>;

    async fn read_holding_registers(
        &mut self,
        slave_id: u8,
        start: u16,
        count: u16,
    ) -> TransportResult<Vec<u16>>;

    async fn write_single_coil(&mut self, slave_id: u8, address: u16, value: bool)
        -> TransportResult<()>;

    async fn write_multiple_coils(
        &mut self,
        slave_id: u8,
        start: u16,
        values: &[bool],
    ) -> TransportResult<()>;

    async fn write_single_register(
        &mut self,
        slave_id: u8,
        address: u16,
        value: u16,
    ) -> TransportResult<()>;

    async fn write_multiple_registers(
        &mut self,
        slave_id: u8,
        start: u16,
        values: &[u16],
    ) -> TransportResult<()>;
}

/// Observer for connection lifecycle events
///
/// All methods default to no-ops so implementors only override what they need.
pub trait ConnectionHook: Send + Sync {
    fn on_state_change(&self, _from: ConnectionState, _to: ConnectionState) {}

    /// Called before each connect attempt (`attempt` is 1-based)
    fn on_attempt(&self, _config: &ConnectionConfig, _attempt: u32) {}

    fn on_attempt_failed(
        &self,
        _config: &ConnectionConfig,
        _attempt: u32,
        _error: &TransportError,
        _retry_in: Option<Duration>,
    ) {
    }

    fn on_connected(&self, _config: &ConnectionConfig) {}

    fn on_exhausted(&self, _config: &ConnectionConfig, _attempts: u32) {}

    fn on_disconnected(&self, _config: &ConnectionConfig) {}
}

/// Logging hook that reports connection events through the `log` facade
pub struct LoggingHook;

impl ConnectionHook for LoggingHook {
    fn on_state_change(&self, from: ConnectionState, to: ConnectionState) {
        log::debug!("Connection state: {from} -> {to}");
    }

    fn on_attempt(&self, config: &ConnectionConfig, attempt: u32) {
        log::info!(
            "Trying to connect to {} - connection attempt {}/{}",
            config.endpoint(),
            attempt,
            config.max_retry_count
        );
    }

    fn on_attempt_failed(
        &self,
        config: &ConnectionConfig,
        attempt: u32,
        error: &TransportError,
        retry_in: Option<Duration>,
    ) {
        match retry_in {
            Some(delay) => log::warn!(
                "Unable to connect to {} (attempt {attempt}): {error}. Trying again in {} milliseconds",
                config.endpoint(),
                delay.as_millis()
            ),
            None => log::warn!(
                "Unable to connect to {} (attempt {attempt}): {error}",
                config.endpoint()
            ),
        }
    }

    fn on_connected(&self, config: &ConnectionConfig) {
        log::info!(
            "Master connected to {} (slave id {})",
            config.endpoint(),
            config.slave_id
        );
    }

    fn on_exhausted(&self, config: &ConnectionConfig, attempts: u32) {
        log::error!(
            "Could not connect to {} within {attempts} attempts",
            config.endpoint()
        );
    }

    fn on_disconnected(&self, config: &ConnectionConfig) {
        log::info!("Disconnected from {}", config.endpoint());
    }
}
