use async_trait::async_trait;
use parking_lot::Mutex;
use std::{collections::VecDeque, net::SocketAddr, sync::Arc};
use tokio::io::BufReader;

use modbus_master::{
    api::{
        codec::floats_to_words,
        connection::{ConnectionConfig, ConnectionManager, ConnectionState},
        traits::{Timeouts, Transport, TransportError, TransportResult},
    },
    cli::{Console, Dispatcher, Flow},
};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Connect(SocketAddr),
    Disconnect,
    ReadCoils(u8, u16, u16),
    ReadDiscretes(u8, u16, u16),
    ReadInputs(u8, u16, u16),
    ReadHoldings(u8, u16, u16),
    WriteCoil(u8, u16, bool),
    WriteCoils(u8, u16, Vec<bool>),
    WriteRegister(u8, u16, u16),
    WriteRegisters(u8, u16, Vec<u16>),
}

#[derive(Default)]
struct Shared {
    calls: Vec<Call>,
    connect_failures: usize,
    op_errors: VecDeque<TransportError>,
    holdings: Vec<u16>,
}

/// Transport that records every call; operations fail with the queued errors.
struct RecordingTransport {
    shared: Arc<Mutex<Shared>>,
    open: bool,
}

impl RecordingTransport {
    fn record(&mut self, call: Call) -> TransportResult<()> {
        let mut shared = self.shared.lock();
        shared.calls.push(call);
        match shared.op_errors.pop_front() {
            Some(err) => {
                if err.is_connection_loss() {
                    self.open = false;
                }
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn words(&self, start: u16, count: u16) -> Vec<u16> {
        let shared = self.shared.lock();
        (start..start + count)
            .map(|i| shared.holdings.get(usize::from(i)).copied().unwrap_or(0))
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn connect(&mut self, endpoint: SocketAddr, _timeouts: Timeouts) -> TransportResult<()> {
        let mut shared = self.shared.lock();
        shared.calls.push(Call::Connect(endpoint));
        if shared.connect_failures > 0 {
            shared.connect_failures -= 1;
            return Err(TransportError::io("connection refused"));
        }
        self.open = true;
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.shared.lock().calls.push(Call::Disconnect);
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn read_coils(
        &mut self,
        slave_id: u8,
        start: u16,
        count: u16,
    ) -> TransportResult<Vec<bool>> {
        self.record(Call::ReadCoils(slave_id, start, count))?;
        Ok((0..count).map(|i| i % 2 == 0).collect())
    }

    async fn read_discrete_inputs(
        &mut self,
        slave_id: u8,
        start: u16,
        count: u16,
    ) -> TransportResult<Vec<bool>> {
        self.record(Call::ReadDiscretes(slave_id, start, count))?;
        Ok(vec![true; usize::from(count)])
    }

    async fn read_input_registers(
        &mut self,
        slave_id: u8,
        start: u16,
        count: u16,
    ) -> TransportResult<Vec<u16>> {
        self.record(Call::ReadInputs(slave_id, start, count))?;
        Ok(self.words(start, count))
    }

    async fn read_holding_registers(
        &mut self,
        slave_id: u8,
        start: u16,
        count: u16,
    ) -> TransportResult<Vec<u16>> {
        self.record(Call::ReadHoldings(slave_id, start, count))?;
        Ok(self.words(start, count))
    }

    async fn write_single_coil(
        &mut self,
        slave_id: u8,
        address: u16,
        value: bool,
    ) -> TransportResult<()> {
        self.record(Call::WriteCoil(slave_id, address, value))
    }

    async fn write_multiple_coils(
        &mut self,
        slave_id: u8,
        start: u16,
        values: &[bool],
    ) -> TransportResult<()> {
        self.record(Call::WriteCoils(slave_id, start, values.to_vec()))
    }

    async fn write_single_register(
        &mut self,
        slave_id: u8,
        address: u16,
        value: u16,
    ) -> TransportResult<()> {
        self.record(Call::WriteRegister(slave_id, address, value))
    }

    async fn write_multiple_registers(
        &mut self,
        slave_id: u8,
        start: u16,
        values: &[u16],
    ) -> TransportResult<()> {
        self.record(Call::WriteRegisters(slave_id, start, values.to_vec()))
    }
}

struct Session {
    calls: Vec<Call>,
    output: String,
    state: ConnectionState,
    config: ConnectionConfig,
}

impl Session {
    fn connects(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, Call::Connect(_)))
            .count()
    }

    /// Calls other than connection management
    fn operations(&self) -> Vec<Call> {
        self.calls
            .iter()
            .filter(|call| !matches!(call, Call::Connect(_) | Call::Disconnect))
            .cloned()
            .collect()
    }
}

fn test_config() -> ConnectionConfig {
    ConnectionConfig {
        max_retry_count: 2,
        retry_interval_ms: 0,
        ..Default::default()
    }
}

fn recording_manager(shared: &Arc<Mutex<Shared>>) -> ConnectionManager<RecordingTransport> {
    let transport = RecordingTransport {
        shared: shared.clone(),
        open: false,
    };
    ConnectionManager::new(transport, test_config())
}

async fn run_session(
    input: &(impl AsRef<[u8]> + ?Sized),
    setup: impl FnOnce(&mut Shared),
) -> Session {
    let shared = Arc::new(Mutex::new(Shared::default()));
    setup(&mut shared.lock());

    let console = Console::new(Vec::new(), false);
    let mut dispatcher = Dispatcher::new(recording_manager(&shared), input.as_ref(), console);
    dispatcher.run().await.unwrap();

    let (manager, console) = dispatcher.into_parts();
    let calls = shared.lock().calls.clone();
    Session {
        calls,
        output: String::from_utf8(console.into_inner()).unwrap(),
        state: manager.state(),
        config: manager.config().clone(),
    }
}

#[tokio::test]
async fn test_write_binary_strings_to_holding_registers() {
    let session = run_session(
        "WRITE HOLDREGS --startAddress 0 --values 1010101010101010,0101010101010101\nEXIT\n",
        |_| {},
    )
    .await;

    assert_eq!(
        session.operations(),
        vec![Call::WriteRegisters(1, 0, vec![0x5555, 0xAAAA])]
    );
    assert!(session
        .output
        .contains("Register address: 0 | Value: 1010101010101010 (21845)"));
    assert!(session.output.contains("Write complete!"));
    assert_eq!(session.calls.last(), Some(&Call::Disconnect));
    assert_eq!(session.state, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_unknown_command_has_no_side_effects() {
    let shared = Arc::new(Mutex::new(Shared::default()));
    let mut manager = recording_manager(&shared);
    manager.reconnect().await.unwrap();
    let mut dispatcher = Dispatcher::new(manager, &b""[..], Console::new(Vec::new(), false));
    assert_eq!(dispatcher.manager().state(), ConnectionState::Connected);

    let flow = dispatcher.handle_line("READ EVERYTHING --startAddress 0").await;

    assert_eq!(flow, Flow::Continue);
    assert_eq!(dispatcher.manager().state(), ConnectionState::Connected);
    assert_eq!(dispatcher.manager().config(), &test_config());
    assert_eq!(
        shared.lock().calls,
        vec![Call::Connect("127.0.0.1:502".parse().unwrap())]
    );
    let output = String::from_utf8(dispatcher.console().get_ref().clone()).unwrap();
    assert!(output.contains("Unknown command. Type 'HELP' for a list of valid commands."));
}

#[tokio::test]
async fn test_invalid_utf8_line_does_not_end_the_loop() {
    let session = run_session(
        &b"READ COILS \xE9\nREAD COILS --startAddress 0 --numberToRead 2\nEXIT\n"[..],
        |_| {},
    )
    .await;

    assert_eq!(session.operations(), vec![Call::ReadCoils(1, 0, 2)]);
    assert!(session.output.contains("Read complete!"));
    assert_eq!(session.calls.last(), Some(&Call::Disconnect));
    assert_eq!(session.state, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_mixed_values_invoke_no_operation() {
    let session = run_session("WRITE HOLDREGS --startAddress 0 --values 1,abc\n", |_| {}).await;

    assert!(session.operations().is_empty());
    assert!(session.output.contains("Unable to parse value ABC"));
}

#[tokio::test]
async fn test_all_argument_errors_are_reported_together() {
    let session = run_session("READ COILS --startAddress x\n", |_| {}).await;

    assert!(session.operations().is_empty());
    assert!(session
        .output
        .contains("Unable to parse value X to type u16 (0-65535) for argument --STARTADDRESS\nMissing argument --NUMBERTOREAD\n"));
}

#[tokio::test]
async fn test_read_coils_and_discretes() {
    let session = run_session(
        "read coils --startAddress 10 --numberToRead 3\nREAD DISCRETES --startAddress 0 --numberToRead 1\n",
        |_| {},
    )
    .await;

    assert_eq!(
        session.operations(),
        vec![Call::ReadCoils(1, 10, 3), Call::ReadDiscretes(1, 0, 1)]
    );
    assert!(session.output.contains("Reading coil addresses 10 - 12:"));
    assert!(session.output.contains("Coil address: 11 | Value: false"));
    assert!(session
        .output
        .contains("Discrete input address: 0 | Value: true"));
}

#[tokio::test]
async fn test_write_coils() {
    let session = run_session(
        "WRITE COIL --address 4 --value true\nWRITE COILS --startAddress 1 --values true,false\n",
        |_| {},
    )
    .await;

    assert_eq!(
        session.operations(),
        vec![
            Call::WriteCoil(1, 4, true),
            Call::WriteCoils(1, 1, vec![true, false])
        ]
    );
}

#[tokio::test]
async fn test_read_holding_registers_as_bits() {
    let session = run_session("READ HOLDREGSB --startAddress 0 --numberToRead 1\n", |shared| {
        shared.holdings = vec![0b101];
    })
    .await;

    assert!(session
        .output
        .contains("Holding register address: 0 | Value: 5\nLSB\nBit0: 1\nBit1: 0\nBit2: 1\n"));
    assert!(session.output.contains("Bit15: 0\nMSB\n"));
}

#[tokio::test]
async fn test_read_floats_counts_floats() {
    let session = run_session("READ HOLDREGSF --startAddress 0 --numberToRead 2\n", |shared| {
        shared.holdings = floats_to_words(&[1.0, 2.5]);
    })
    .await;

    assert_eq!(session.operations(), vec![Call::ReadHoldings(1, 0, 4)]);
    assert!(session
        .output
        .contains("Holding register addresses 0 - 1 | Value: 1"));
    assert!(session
        .output
        .contains("Holding register addresses 2 - 3 | Value: 2.5"));
}

#[tokio::test]
async fn test_read_floats_rejects_register_overflow() {
    let session = run_session(
        "READ INPUTREGSF --startAddress 0 --numberToRead 40000\n",
        |_| {},
    )
    .await;

    assert!(session.operations().is_empty());
    assert!(session.output.contains("exceed u16"));
}

#[tokio::test]
async fn test_write_single_register_encodings() {
    let session = run_session(
        "WRITE HOLDREG --address 3 --value 1.5\nWRITE HOLDREG --address 4 --value 42\nWRITE HOLDREG --address 5 --value 1000000000000000\n",
        |_| {},
    )
    .await;

    assert_eq!(
        session.operations(),
        vec![
            Call::WriteRegisters(1, 3, floats_to_words(&[1.5])),
            Call::WriteRegister(1, 4, 42),
            Call::WriteRegister(1, 5, 1),
        ]
    );
}

#[tokio::test]
async fn test_connection_loss_triggers_one_reconnect() {
    let session = run_session("READ HOLDREGS --startAddress 0 --numberToRead 2\n", |shared| {
        shared
            .op_errors
            .push_back(TransportError::io("connection reset by peer"));
    })
    .await;

    assert!(session
        .output
        .contains("Not connected to slave. Attempting to reconnect..."));
    assert_eq!(session.connects(), 2);
}

#[tokio::test]
async fn test_exception_reports_slave_id_and_keeps_connection() {
    let session = run_session(
        "READ INPUTREGS --startAddress 0 --numberToRead 2\nREAD INPUTREGS --startAddress 0 --numberToRead 1\n",
        |shared| {
            shared
                .op_errors
                .push_back(TransportError::Exception { code: 0x02 });
        },
    )
    .await;

    assert!(session.output.contains(
        "Unable to read/write to slave. Make sure target slave ID exists. Current slave ID: 1"
    ));
    assert_eq!(session.connects(), 1);
    assert_eq!(
        session.operations(),
        vec![Call::ReadInputs(1, 0, 2), Call::ReadInputs(1, 0, 1)]
    );
}

#[tokio::test]
async fn test_receive_timeout_reports_slave_id_without_reconnecting() {
    let session = run_session(
        "SET SLAVEID --slaveId 9\nREAD HOLDREGS --startAddress 0 --numberToRead 2\n",
        |shared| {
            shared
                .op_errors
                .push_back(TransportError::receive_timeout(5000));
        },
    )
    .await;

    assert!(session.output.contains(
        "Unable to read/write to slave. Make sure target slave ID exists. Current slave ID: 9"
    ));
    assert!(session.output.contains("receive timed out after 5000 ms"));
    assert!(!session.output.contains("Attempting to reconnect"));
    assert_eq!(session.connects(), 1);
}

#[tokio::test]
async fn test_set_slave_id_applies_to_later_operations() {
    let session = run_session(
        "SET SLAVEID --slaveId 7\nREAD HOLDREGS --startAddress 0 --numberToRead 1\n",
        |_| {},
    )
    .await;

    assert!(session
        .output
        .contains("Setting new slave id. Previous value: 1 => New value 7"));
    assert_eq!(session.operations(), vec![Call::ReadHoldings(7, 0, 1)]);
    assert_eq!(session.connects(), 1);
}

#[tokio::test]
async fn test_set_port_and_ip_reconnect() {
    let session = run_session(
        "SET PORT --port 1502\nSET IPADDRESS --ipAddress 10.0.0.2\nSET PORT --port 99999\n",
        |_| {},
    )
    .await;

    let endpoints = session
        .calls
        .iter()
        .filter_map(|call| match call {
            Call::Connect(endpoint) => Some(endpoint.to_string()),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(
        endpoints,
        vec!["127.0.0.1:502", "127.0.0.1:1502", "10.0.0.2:1502"]
    );
    assert!(session
        .output
        .contains("Unable to parse value 99999 to type u16 (0-65535) for argument --PORT"));
}

#[tokio::test]
async fn test_connect_command() {
    let session = run_session(
        "CONNECT --ipAddress 192.168.1.5 --port 5020 --slaveId 3\nREAD COILS --startAddress 0 --numberToRead 1\n",
        |_| {},
    )
    .await;

    assert_eq!(session.connects(), 2);
    assert_eq!(session.config.endpoint().to_string(), "192.168.1.5:5020");
    assert_eq!(session.operations(), vec![Call::ReadCoils(3, 0, 1)]);
}

#[tokio::test]
async fn test_failed_initial_connect_retries_before_first_operation() {
    let session = run_session("READ COILS --startAddress 0 --numberToRead 1\n", |shared| {
        shared.connect_failures = 2;
    })
    .await;

    assert!(session
        .output
        .contains("Could not connect to IP address: 127.0.0.1:502 within the maximum allowed retry attempts."));
    assert!(session
        .output
        .contains("Unable to establish connection. Trying again in 0 milliseconds"));
    // Two exhausted attempts, then one successful reconnect from the failed read
    assert_eq!(session.connects(), 3);
    assert!(session.operations().is_empty());
}

#[tokio::test]
async fn test_exit_stops_the_loop() {
    let session = run_session("EXIT\nREAD COILS --startAddress 0 --numberToRead 1\n", |_| {}).await;

    assert!(session.operations().is_empty());
    assert_eq!(
        session.calls,
        vec![
            Call::Connect("127.0.0.1:502".parse().unwrap()),
            Call::Disconnect
        ]
    );
}

#[tokio::test]
async fn test_help_lists_command_groups() {
    let input = tokio_test::io::Builder::new().read(b"help\n").build();
    let shared = Arc::new(Mutex::new(Shared::default()));
    let mut dispatcher = Dispatcher::new(
        recording_manager(&shared),
        BufReader::new(input),
        Console::new(Vec::new(), false),
    );
    dispatcher.run().await.unwrap();

    let output = String::from_utf8(dispatcher.console().get_ref().clone()).unwrap();
    assert!(output.contains("Modbus Commands:"));
    assert!(output.contains("Client Commands:"));
    assert!(output.contains("READ HOLDREGSF"));
    assert!(output.contains("SET IPADDRESS"));
}

#[tokio::test]
async fn test_handle_line_flow() {
    let shared = Arc::new(Mutex::new(Shared::default()));
    let console = Console::new(Vec::new(), false);
    let mut dispatcher = Dispatcher::new(recording_manager(&shared), &b""[..], console);

    assert_eq!(dispatcher.handle_line("   ").await, Flow::Continue);
    assert_eq!(dispatcher.handle_line("help").await, Flow::Continue);
    assert_eq!(dispatcher.handle_line("exit").await, Flow::Exit);
    assert_eq!(dispatcher.manager().state(), ConnectionState::Disconnected);
}
