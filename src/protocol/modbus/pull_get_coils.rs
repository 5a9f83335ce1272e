use rmodbus::{client::ModbusRequest, ModbusProto};

use super::encode_error;
use crate::api::traits::{TransportError, TransportResult};

/// Build a read coils (0x01) request
pub fn generate_pull_get_coils_request(
    id: u8,
    transaction_id: u16,
    start_address: u16,
    count: u16,
) -> TransportResult<(ModbusRequest, Vec<u8>)> {
    let mut request = ModbusRequest::new(id, ModbusProto::TcpUdp);
    request.tr_id = transaction_id;
    let mut raw = Vec::with_capacity(12);
    request
        .generate_get_coils(start_address, count, &mut raw)
        .map_err(encode_error)?;
    Ok((request, raw))
}

/// Build a read discrete inputs (0x02) request
pub fn generate_pull_get_discrete_inputs_request(
    id: u8,
    transaction_id: u16,
    start_address: u16,
    count: u16,
) -> TransportResult<(ModbusRequest, Vec<u8>)> {
    let mut request = ModbusRequest::new(id, ModbusProto::TcpUdp);
    request.tr_id = transaction_id;
    let mut raw = Vec::with_capacity(12);
    request
        .generate_get_discretes(start_address, count, &mut raw)
        .map_err(encode_error)?;
    Ok((request, raw))
}

/// Unpack the bits of a coils or discrete inputs response
///
/// The first value is bit 0 of the first data byte; padding bits of the last
/// byte are dropped.
pub fn parse_pull_get_bits(
    request: &ModbusRequest,
    response: &[u8],
    count: u16,
) -> TransportResult<Vec<bool>> {
    let mut values = Vec::with_capacity(usize::from(count));
    request
        .parse_bool(response, &mut values)
        .map_err(|err| TransportError::protocol(format!("{err:?}")))?;
    values.truncate(usize::from(count));
    if values.len() != usize::from(count) {
        return Err(TransportError::protocol(format!(
            "expected {count} bits, received {}",
            values.len()
        )));
    }
    log::debug!("Received bits: {values:?}");
    Ok(values)
}
