//! Modbus TCP client transport
//!
//! Requests are encoded and responses decoded with `rmodbus` in `TcpUdp`
//! mode; `tokio` carries the frames. Each request gets the next MBAP
//! transaction id and its response must echo it.

mod frame;
mod header;
mod pull_get_coils;
mod pull_get_holdings;
mod pull_set_coils;
mod pull_set_holdings;
mod transport;

use crate::api::traits::TransportError;

pub use frame::{bounded, read_modbus_frame, write_modbus_frame};
pub use header::{
    check_response, exception_code, transaction_id, HeaderError, MbapHeader, MBAP_PREFIX_LEN,
};
pub use pull_get_coils::{
    generate_pull_get_coils_request, generate_pull_get_discrete_inputs_request,
    parse_pull_get_bits,
};
pub use pull_get_holdings::{
    generate_pull_get_holdings_request, generate_pull_get_inputs_request, parse_pull_get_words,
};
pub use pull_set_coils::{generate_pull_set_coil_request, generate_pull_set_coils_request};
pub use pull_set_holdings::{generate_pull_set_holding_request, generate_pull_set_holdings_request};
pub use transport::TcpTransport;

/// Request encoding failures (e.g. too many values for one frame)
fn encode_error(err: rmodbus::ErrorKind) -> TransportError {
    TransportError::protocol(format!("unable to encode request: {err:?}"))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::traits::TransportError;

    #[test]
    fn test_out_of_range_read_is_exception() {
        let (request, raw) = generate_pull_get_holdings_request(1, 1, 60000, 10).unwrap();
        let response = test_support::respond(1, &raw, |_| {});
        assert_eq!(
            check_response(&request, &response),
            Err(TransportError::Exception { code: 0x02 })
        );
    }
}
