pub mod codec;
pub mod connection;
pub mod traits;

// Re-export the types most callers need
pub use codec::{
    binary_str_to_word, bits_to_word, floats_to_words, is_binary_word, word_to_binary_str,
    word_to_bits, words_to_float, words_to_floats, BitVector16, CodecError,
};
pub use connection::{
    ConnectError, ConnectionConfig, ConnectionManager, ConnectionState, DEFAULT_MAX_RETRY_COUNT,
    DEFAULT_PORT, DEFAULT_RECEIVE_TIMEOUT_MS, DEFAULT_RETRY_INTERVAL_MS, DEFAULT_SEND_TIMEOUT_MS,
    DEFAULT_SLAVE_ID,
};
pub use traits::{
    ConnectionHook, LoggingHook, Timeouts, Transport, TransportError, TransportResult,
};
