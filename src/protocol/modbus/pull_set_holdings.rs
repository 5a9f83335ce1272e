use rmodbus::{client::ModbusRequest, ModbusProto};

use super::encode_error;
use crate::api::traits::TransportResult;

/// Build a frame to write a single holding register (function 0x06)
pub fn generate_pull_set_holding_request(
    id: u8,
    transaction_id: u16,
    address: u16,
    value: u16,
) -> TransportResult<(ModbusRequest, Vec<u8>)> {
    let mut request = ModbusRequest::new(id, ModbusProto::TcpUdp);
    request.tr_id = transaction_id;
    let mut raw = Vec::with_capacity(12);
    request
        .generate_set_holding(address, value, &mut raw)
        .map_err(encode_error)?;
    Ok((request, raw))
}

/// Build a frame to write consecutive holding registers (function 0x10)
pub fn generate_pull_set_holdings_request(
    id: u8,
    transaction_id: u16,
    start_address: u16,
    values: &[u16],
) -> TransportResult<(ModbusRequest, Vec<u8>)> {
    let mut request = ModbusRequest::new(id, ModbusProto::TcpUdp);
    request.tr_id = transaction_id;
    let mut raw = Vec::new();
    request
        .generate_set_holdings_bulk(start_address, values, &mut raw)
        .map_err(encode_error)?;
    Ok((request, raw))
}
