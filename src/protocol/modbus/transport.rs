use async_trait::async_trait;
use rmodbus::client::ModbusRequest;
use std::net::SocketAddr;
use tokio::{io::AsyncWriteExt, net::TcpStream};

use super::{
    bounded, check_response, generate_pull_get_coils_request,
    generate_pull_get_discrete_inputs_request, generate_pull_get_holdings_request,
    generate_pull_get_inputs_request, generate_pull_set_coil_request,
    generate_pull_set_coils_request, generate_pull_set_holding_request,
    generate_pull_set_holdings_request, parse_pull_get_bits, parse_pull_get_words,
    read_modbus_frame, transaction_id, write_modbus_frame,
};
use crate::api::traits::{Timeouts, Transport, TransportError, TransportResult};

/// Late replies skipped while waiting for the current response
const MAX_STALE_RESPONSES: usize = 8;

/// Modbus TCP master over a single `TcpStream`
///
/// Requests are strictly sequential: one frame is written and its response
/// read before the next request is built.
pub struct TcpTransport {
    stream: Option<TcpStream>,
    timeouts: Timeouts,
    transaction_id: u16,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpTransport {
    pub fn new() -> Self {
        Self {
            stream: None,
            timeouts: Timeouts::from_millis(0, 0),
            transaction_id: 0,
        }
    }

    fn next_transaction_id(&mut self) -> u16 {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        self.transaction_id
    }

    /// Write `frame`, then read until the response for `tr_id` arrives.
    ///
    /// Replies that arrive after their request timed out are discarded.
    async fn round_trip(&mut self, tr_id: u16, frame: &[u8]) -> TransportResult<Vec<u8>> {
        let timeouts = self.timeouts;
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        write_modbus_frame(stream, frame, timeouts.send).await?;
        for _ in 0..=MAX_STALE_RESPONSES {
            let response = read_modbus_frame(stream, timeouts.receive).await?;
            match transaction_id(&response) {
                Some(id) if id == tr_id => return Ok(response),
                id => log::debug!("Discarding stale response {id:?} while waiting for {tr_id}"),
            }
        }
        Err(TransportError::protocol(format!(
            "no response with transaction id {tr_id} among {} frames",
            MAX_STALE_RESPONSES + 1
        )))
    }

    /// Send `frame` and return the validated response for `request`.
    async fn exchange(
        &mut self,
        request: &ModbusRequest,
        frame: &[u8],
    ) -> TransportResult<Vec<u8>> {
        let response = match self.round_trip(request.tr_id, frame).await {
            Ok(response) => response,
            Err(err) => {
                if err.is_connection_loss() {
                    // The stream state is unknown after a failed exchange
                    self.stream = None;
                }
                return Err(err);
            }
        };
        check_response(request, &response)?;
        Ok(response)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self, endpoint: SocketAddr, timeouts: Timeouts) -> TransportResult<()> {
        self.disconnect().await;
        let stream = bounded("connect", timeouts.send, TcpStream::connect(endpoint)).await?;
        if let Err(err) = stream.set_nodelay(true) {
            log::debug!("Failed to set TCP_NODELAY: {err}");
        }
        log::debug!("TCP connection established to {endpoint}");
        self.stream = Some(stream);
        self.timeouts = timeouts;
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(err) = stream.shutdown().await {
                log::debug!("Error while closing TCP connection: {err}");
            }
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    async fn read_coils(
        &mut self,
        slave_id: u8,
        start: u16,
        count: u16,
    ) -> TransportResult<Vec<bool>> {
        let tr_id = self.next_transaction_id();
        let (request, frame) = generate_pull_get_coils_request(slave_id, tr_id, start, count)?;
        let response = self.exchange(&request, &frame).await?;
        parse_pull_get_bits(&request, &response, count)
    }

    async fn read_discrete_inputs(
        &mut self,
        slave_id: u8,
        start: u16,
        count: u16,
    ) -> TransportResult<Vec<bool>> {
        let tr_id = self.next_transaction_id();
        let (request, frame) =
            generate_pull_get_discrete_inputs_request(slave_id, tr_id, start, count)?;
        let response = self.exchange(&request, &frame).await?;
        parse_pull_get_bits(&request, &response, count)
    }

    async fn read_input_registers(
        &mut self,
        slave_id: u8,
        start: u16,
        count: u16,
    ) -> TransportResult<Vec<u16>> {
        let tr_id = self.next_transaction_id();
        let (request, frame) = generate_pull_get_inputs_request(slave_id, tr_id, start, count)?;
        let response = self.exchange(&request, &frame).await?;
        parse_pull_get_words(&request, &response, count)
    }

    async fn read_holding_registers(
        &mut self,
        slave_id: u8,
        start: u16,
        count: u16,
    ) -> TransportResult<Vec<u16>> {
        let tr_id = self.next_transaction_id();
        let (request, frame) = generate_pull_get_holdings_request(slave_id, tr_id, start, count)?;
        let response = self.exchange(&request, &frame).await?;
        parse_pull_get_words(&request, &response, count)
    }

    async fn write_single_coil(
        &mut self,
        slave_id: u8,
        address: u16,
        value: bool,
    ) -> TransportResult<()> {
        let tr_id = self.next_transaction_id();
        let (request, frame) = generate_pull_set_coil_request(slave_id, tr_id, address, value)?;
        self.exchange(&request, &frame).await.map(|_| ())
    }

    async fn write_multiple_coils(
        &mut self,
        slave_id: u8,
        start: u16,
        values: &[bool],
    ) -> TransportResult<()> {
        let tr_id = self.next_transaction_id();
        let (request, frame) = generate_pull_set_coils_request(slave_id, tr_id, start, values)?;
        self.exchange(&request, &frame).await.map(|_| ())
    }

    async fn write_single_register(
        &mut self,
        slave_id: u8,
        address: u16,
        value: u16,
    ) -> TransportResult<()> {
        let tr_id = self.next_transaction_id();
        let (request, frame) = generate_pull_set_holding_request(slave_id, tr_id, address, value)?;
        self.exchange(&request, &frame).await.map(|_| ())
    }

    async fn write_multiple_registers(
        &mut self,
        slave_id: u8,
        start: u16,
        values: &[u16],
    ) -> TransportResult<()> {
        let tr_id = self.next_transaction_id();
        let (request, frame) =
            generate_pull_set_holdings_request(slave_id, tr_id, start, values)?;
        self.exchange(&request, &frame).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_ids_increment_and_wrap() {
        let mut transport = TcpTransport::new();
        assert_eq!(transport.next_transaction_id(), 1);
        transport.transaction_id = u16::MAX;
        assert_eq!(transport.next_transaction_id(), 0);
    }

    #[tokio::test]
    async fn test_operations_without_connection() {
        let mut transport = TcpTransport::new();
        assert!(!transport.is_open());
        assert_eq!(
            transport.read_holding_registers(1, 0, 1).await,
            Err(TransportError::NotConnected)
        );
    }
}
