use derive_more::{Display, Error};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use super::traits::{ConnectionHook, Timeouts, Transport, TransportError, TransportResult};

pub const DEFAULT_PORT: u16 = 502;
pub const DEFAULT_SLAVE_ID: u8 = 1;
pub const DEFAULT_MAX_RETRY_COUNT: u32 = 10;
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_RECEIVE_TIMEOUT_MS: u64 = 5000;

/// Everything needed to reach one slave
///
/// A config is never edited in place while a connection uses it; reconfiguring
/// builds a new value with the `with_*` helpers and connects with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub address: IpAddr,
    pub port: u16,
    pub slave_id: u8,
    /// Total connect attempts per `connect` call, at least 1
    pub max_retry_count: u32,
    /// Fixed delay between two failed attempts
    pub retry_interval_ms: u64,
    pub send_timeout_ms: u64,
    pub receive_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            slave_id: DEFAULT_SLAVE_ID,
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
            receive_timeout_ms: DEFAULT_RECEIVE_TIMEOUT_MS,
        }
    }
}

impl ConnectionConfig {
    pub fn endpoint(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts::from_millis(self.send_timeout_ms, self.receive_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn with_address(&self, address: IpAddr) -> Self {
        Self {
            address,
            ..self.clone()
        }
    }

    pub fn with_port(&self, port: u16) -> Self {
        Self {
            port,
            ..self.clone()
        }
    }

    pub fn with_target(&self, address: IpAddr, port: u16, slave_id: u8) -> Self {
        Self {
            address,
            port,
            slave_id,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum ConnectError {
    #[display("could not connect to {endpoint} within {attempts} attempts")]
    RetriesExhausted { endpoint: SocketAddr, attempts: u32 },
}

/// Owns the transport, the connection state and the target configuration
///
/// The dispatcher holds the manager by `&mut`, so every transition happens on
/// a single execution path. Register operations go through the manager, which
/// addresses them at the configured slave id and drops to `Disconnected` when
/// the transport reports a lost link.
pub struct ConnectionManager<T: Transport> {
    transport: T,
    state: ConnectionState,
    config: ConnectionConfig,
    active: Option<ConnectionConfig>,
    hooks: Vec<Arc<dyn ConnectionHook>>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: T, config: ConnectionConfig) -> Self {
        Self {
            transport,
            state: ConnectionState::Disconnected,
            config,
            active: None,
            hooks: Vec::new(),
        }
    }

    /// Add a hook (hooks are notified in the order they were added)
    pub fn add_hook(mut self, hook: Arc<dyn ConnectionHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Last known configuration (the one `reconnect` uses)
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Configuration of the live connection, if any
    pub fn active_config(&self) -> Option<&ConnectionConfig> {
        self.active.as_ref()
    }

    pub fn slave_id(&self) -> u8 {
        self.config.slave_id
    }

    /// Change the addressed slave without reconnecting; returns the previous id.
    pub fn set_slave_id(&mut self, slave_id: u8) -> u8 {
        let previous = std::mem::replace(&mut self.config.slave_id, slave_id);
        if let Some(active) = self.active.as_mut() {
            active.slave_id = slave_id;
        }
        previous
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state != next {
            let previous = std::mem::replace(&mut self.state, next);
            for hook in &self.hooks {
                hook.on_state_change(previous, next);
            }
        }
    }

    /// Connect with `config`, retrying with a fixed delay
    ///
    /// Runs at most `max_retry_count` attempts (at least one) and returns as
    /// soon as one succeeds. Exhausting the attempts leaves the manager
    /// disconnected; the error is meant for reporting, not for aborting.
    pub async fn connect(&mut self, config: ConnectionConfig) -> Result<(), ConnectError> {
        self.disconnect().await;
        self.config = config.clone();

        let endpoint = config.endpoint();
        let max_attempts = config.max_retry_count.max(1);

        self.set_state(ConnectionState::Connecting);
        for attempt in 1..=max_attempts {
            for hook in &self.hooks {
                hook.on_attempt(&config, attempt);
            }

            match self.transport.connect(endpoint, config.timeouts()).await {
                Ok(()) => {
                    self.active = Some(config.clone());
                    self.set_state(ConnectionState::Connected);
                    for hook in &self.hooks {
                        hook.on_connected(&config);
                    }
                    return Ok(());
                }
                Err(err) => {
                    let retry_in = (attempt < max_attempts).then(|| config.retry_interval());
                    for hook in &self.hooks {
                        hook.on_attempt_failed(&config, attempt, &err, retry_in);
                    }
                    if let Some(delay) = retry_in {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        self.set_state(ConnectionState::Disconnected);
        for hook in &self.hooks {
            hook.on_exhausted(&config, max_attempts);
        }
        Err(ConnectError::RetriesExhausted {
            endpoint,
            attempts: max_attempts,
        })
    }

    pub async fn reconnect(&mut self) -> Result<(), ConnectError> {
        let config = self.config.clone();
        self.connect(config).await
    }

    /// Close the link if one is open; safe to call repeatedly.
    pub async fn disconnect(&mut self) {
        if self.state == ConnectionState::Disconnected && !self.transport.is_open() {
            return;
        }
        self.transport.disconnect().await;
        let was_connected = self.state == ConnectionState::Connected;
        self.set_state(ConnectionState::Disconnected);
        if let Some(active) = self.active.take() {
            if was_connected {
                for hook in &self.hooks {
                    hook.on_disconnected(&active);
                }
            }
        }
    }

    fn ensure_connected(&self) -> TransportResult<u8> {
        if self.is_connected() {
            Ok(self.config.slave_id)
        } else {
            Err(TransportError::NotConnected)
        }
    }

    /// Drop to disconnected when the transport reports a lost link.
    async fn observe<R>(&mut self, result: TransportResult<R>) -> TransportResult<R> {
        if let Err(err) = &result {
            if err.is_connection_loss() {
                log::warn!("Connection lost: {err}");
                self.disconnect().await;
            }
        }
        result
    }

    pub async fn read_coils(&mut self, start: u16, count: u16) -> TransportResult<Vec<bool>> {
        let slave_id = self.ensure_connected()?;
        let result = self.transport.read_coils(slave_id, start, count).await;
        self.observe(result).await
    }

    pub async fn read_discrete_inputs(
        &mut self,
        start: u16,
        count: u16,
    ) -> TransportResult<Vec<bool>> {
        let slave_id = self.ensure_connected()?;
        let result = self
            .transport
            .read_discrete_inputs(slave_id, start, count)
            .await;
        self.observe(result).await
    }

    pub async fn read_input_registers(
        &mut self,
        start: u16,
        count: u16,
    ) -> TransportResult<Vec<u16>> {
        let slave_id = self.ensure_connected()?;
        let result = self
            .transport
            .read_input_registers(slave_id, start, count)
            .await;
        self.observe(result).await
    }

    pub async fn read_holding_registers(
        &mut self,
        start: u16,
        count: u16,
    ) -> TransportResult<Vec<u16>> {
        let slave_id = self.ensure_connected()?;
        let result = self
            .transport
            .read_holding_registers(slave_id, start, count)
            .await;
        self.observe(result).await
    }

    pub async fn write_single_coil(&mut self, address: u16, value: bool) -> TransportResult<()> {
        let slave_id = self.ensure_connected()?;
        let result = self
            .transport
            .write_single_coil(slave_id, address, value)
            .await;
        self.observe(result).await
    }

    pub async fn write_multiple_coils(
        &mut self,
        start: u16,
        values: &[bool],
    ) -> TransportResult<()> {
        let slave_id = self.ensure_connected()?;
        let result = self
            .transport
            .write_multiple_coils(slave_id, start, values)
            .await;
        self.observe(result).await
    }

    pub async fn write_single_register(
        &mut self,
        address: u16,
        value: u16,
    ) -> TransportResult<()> {
        let slave_id = self.ensure_connected()?;
        let result = self
            .transport
            .write_single_register(slave_id, address, value)
            .await;
        self.observe(result).await
    }

    pub async fn write_multiple_registers(
        &mut self,
        start: u16,
        values: &[u16],
    ) -> TransportResult<()> {
        let slave_id = self.ensure_connected()?;
        let result = self
            .transport
            .write_multiple_registers(slave_id, start, values)
            .await;
        self.observe(result).await
    }
}
