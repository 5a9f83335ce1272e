use rmodbus::{client::ModbusRequest, ModbusProto};

use super::encode_error;
use crate::api::traits::TransportResult;

/// Build a write single coil (0x05) request
pub fn generate_pull_set_coil_request(
    id: u8,
    transaction_id: u16,
    address: u16,
    value: bool,
) -> TransportResult<(ModbusRequest, Vec<u8>)> {
    let mut request = ModbusRequest::new(id, ModbusProto::TcpUdp);
    request.tr_id = transaction_id;
    let mut raw = Vec::with_capacity(12);
    request
        .generate_set_coil(address, value, &mut raw)
        .map_err(encode_error)?;
    Ok((request, raw))
}

/// Build a write multiple coils (0x0F) request; bits are packed LSB first.
pub fn generate_pull_set_coils_request(
    id: u8,
    transaction_id: u16,
    start_address: u16,
    values: &[bool],
) -> TransportResult<(ModbusRequest, Vec<u8>)> {
    let mut request = ModbusRequest::new(id, ModbusProto::TcpUdp);
    request.tr_id = transaction_id;
    let mut raw = Vec::new();
    request
        .generate_set_coils_bulk(start_address, values, &mut raw)
        .map_err(encode_error)?;
    Ok((request, raw))
}
