use rmodbus::{client::ModbusRequest, ModbusProto};

use super::encode_error;
use crate::api::traits::{TransportError, TransportResult};

/// Build a read holding registers (0x03) request
pub fn generate_pull_get_holdings_request(
    id: u8,
    transaction_id: u16,
    start_address: u16,
    count: u16,
) -> TransportResult<(ModbusRequest, Vec<u8>)> {
    let mut request = ModbusRequest::new(id, ModbusProto::TcpUdp);
    request.tr_id = transaction_id;
    let mut raw = Vec::with_capacity(12);
    request
        .generate_get_holdings(start_address, count, &mut raw)
        .map_err(encode_error)?;
    Ok((request, raw))
}

/// Build a read input registers (0x04) request
pub fn generate_pull_get_inputs_request(
    id: u8,
    transaction_id: u16,
    start_address: u16,
    count: u16,
) -> TransportResult<(ModbusRequest, Vec<u8>)> {
    let mut request = ModbusRequest::new(id, ModbusProto::TcpUdp);
    request.tr_id = transaction_id;
    let mut raw = Vec::with_capacity(12);
    request
        .generate_get_inputs(start_address, count, &mut raw)
        .map_err(encode_error)?;
    Ok((request, raw))
}

/// Decode the big-endian words of a register read response
pub fn parse_pull_get_words(
    request: &ModbusRequest,
    response: &[u8],
    count: u16,
) -> TransportResult<Vec<u16>> {
    let mut values = Vec::with_capacity(usize::from(count));
    request
        .parse_u16(response, &mut values)
        .map_err(|err| TransportError::protocol(format!("{err:?}")))?;
    if values.len() != usize::from(count) {
        return Err(TransportError::protocol(format!(
            "expected {count} registers, received {}",
            values.len()
        )));
    }
    log::debug!("Received registers: {values:?}");
    Ok(values)
}
