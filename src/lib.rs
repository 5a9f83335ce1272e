//! modbus_master — Interactive command-line master client for Modbus TCP
//!
//! The operator types commands such as `READ HOLDREGS --startAddress 0
//! --numberToRead 4`; each line is parsed, validated and turned into one
//! Modbus request against the configured slave.
//!
//! - [`api`]: register value codec, the transport seam and the connection
//!   manager with bounded fixed-delay retry
//! - [`cli`]: argument parsing, the command table, settings and the REPL
//! - [`protocol`]: the Modbus TCP transport built on `rmodbus` and `tokio`

pub mod api;
#[doc(hidden)]
pub mod boot;
pub mod cli;
pub mod protocol;

pub use api::*;
