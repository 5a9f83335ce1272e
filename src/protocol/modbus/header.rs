use derive_more::{Display, Error};
use rmodbus::client::ModbusRequest;

use crate::api::traits::{TransportError, TransportResult};

/// Bytes of the MBAP header before the unit id: transaction id, protocol id, length
pub const MBAP_PREFIX_LEN: usize = 6;
/// Unit id plus the largest PDU (253 bytes)
pub const MAX_MBAP_LENGTH: u16 = 254;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    /// Number of bytes following the length field (unit id + PDU)
    pub length: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum HeaderError {
    #[display("unexpected MBAP protocol id {found}")]
    ProtocolId { found: u16 },
    #[display("invalid MBAP length {length}")]
    Length { length: u16 },
}

impl MbapHeader {
    pub fn parse(buf: [u8; MBAP_PREFIX_LEN]) -> Result<Self, HeaderError> {
        let header = Self {
            transaction_id: u16::from_be_bytes([buf[0], buf[1]]),
            protocol_id: u16::from_be_bytes([buf[2], buf[3]]),
            length: u16::from_be_bytes([buf[4], buf[5]]),
        };
        if header.protocol_id != 0 {
            return Err(HeaderError::ProtocolId {
                found: header.protocol_id,
            });
        }
        // At least unit id and function code
        if !(2..=MAX_MBAP_LENGTH).contains(&header.length) {
            return Err(HeaderError::Length {
                length: header.length,
            });
        }
        Ok(header)
    }
}

/// Transaction id of a raw MBAP frame
pub fn transaction_id(frame: &[u8]) -> Option<u16> {
    match frame {
        [high, low, ..] => Some(u16::from_be_bytes([*high, *low])),
        _ => None,
    }
}

/// Exception code of a response frame whose function code has the 0x80 bit set
pub fn exception_code(frame: &[u8]) -> Option<u8> {
    let func = *frame.get(MBAP_PREFIX_LEN + 1)?;
    (func & 0x80 != 0).then(|| frame.get(MBAP_PREFIX_LEN + 2).copied().unwrap_or(0))
}

/// Match a response frame against the request it answers.
pub fn check_response(request: &ModbusRequest, frame: &[u8]) -> TransportResult<()> {
    let prefix: [u8; MBAP_PREFIX_LEN] = frame
        .get(..MBAP_PREFIX_LEN)
        .and_then(|prefix| prefix.try_into().ok())
        .ok_or_else(|| TransportError::protocol("response shorter than the MBAP header"))?;
    let header = MbapHeader::parse(prefix).map_err(TransportError::protocol)?;
    if header.transaction_id != request.tr_id {
        return Err(TransportError::protocol(format!(
            "transaction id mismatch: sent {}, received {}",
            request.tr_id, header.transaction_id
        )));
    }
    if let Some(code) = exception_code(frame) {
        return Err(TransportError::Exception { code });
    }
    request
        .parse_ok(frame)
        .map_err(|err| TransportError::protocol(format!("{err:?}")))
}
