/// Register value codec - Pure conversions between register words and typed values
///
/// Modbus only moves 16-bit words (and single bits for coils). This module turns
/// those words into the representations an operator actually types or wants to
/// see: 32-bit floats spread over two registers, per-bit views of one register,
/// and 16-character binary strings.
///
/// Word order for floats is fixed: the first register carries the low-order
/// half of the float's little-endian byte layout, the second carries the
/// high-order half. All conversions go through explicit `to_le_bytes` /
/// `from_le_bytes` so the result never depends on host endianness.
use derive_more::{Display, Error};

/// Number of bits in one register word
pub const WORD_BITS: usize = 16;

/// The 16 bits of one register, index 0 = least-significant bit
pub type BitVector16 = [bool; WORD_BITS];

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum CodecError {
    #[display("expected {expected} bits, got {actual}")]
    BitCount { expected: usize, actual: usize },
    #[display("invalid binary string '{input}': expected 16 characters of '0' or '1'")]
    BinaryString { input: String },
    #[display("float values need an even number of registers, got {count}")]
    OddWordCount { count: usize },
}

/// Combine two consecutive registers into an IEEE-754 single precision float.
pub fn words_to_float(first: u16, second: u16) -> f32 {
    let low = first.to_le_bytes();
    let high = second.to_le_bytes();
    f32::from_le_bytes([low[0], low[1], high[0], high[1]])
}

/// Split floats into register words, two words per float, low half first.
pub fn floats_to_words(floats: &[f32]) -> Vec<u16> {
    floats
        .iter()
        .flat_map(|value| {
            let bytes = value.to_le_bytes();
            [
                u16::from_le_bytes([bytes[0], bytes[1]]),
                u16::from_le_bytes([bytes[2], bytes[3]]),
            ]
        })
        .collect()
}

/// Decode a register slice as consecutive float pairs.
pub fn words_to_floats(words: &[u16]) -> Result<Vec<f32>, CodecError> {
    if words.len() % 2 != 0 {
        return Err(CodecError::OddWordCount { count: words.len() });
    }
    Ok(words
        .chunks_exact(2)
        .map(|pair| words_to_float(pair[0], pair[1]))
        .collect())
}

pub fn word_to_bits(word: u16) -> BitVector16 {
    let mut bits = [false; WORD_BITS];
    for (i, bit) in bits.iter_mut().enumerate() {
        *bit = (word >> i) & 1 == 1;
    }
    bits
}

pub fn bits_to_word(bits: &[bool]) -> Result<u16, CodecError> {
    if bits.len() != WORD_BITS {
        return Err(CodecError::BitCount {
            expected: WORD_BITS,
            actual: bits.len(),
        });
    }
    Ok(bits
        .iter()
        .enumerate()
        .filter(|(_, bit)| **bit)
        .fold(0u16, |word, (i, _)| word | (1 << i)))
}

/// Check whether `input` is a 16-character string made only of '0' and '1'.
pub fn is_binary_word(input: &str) -> bool {
    input.len() == WORD_BITS && input.chars().all(|c| c == '0' || c == '1')
}

/// Parse an LSB-first binary string (character 0 is bit 0) into a register word.
pub fn binary_str_to_word(input: &str) -> Result<u16, CodecError> {
    if !is_binary_word(input) {
        return Err(CodecError::BinaryString {
            input: input.to_string(),
        });
    }
    let bits = input.chars().map(|c| c == '1').collect::<Vec<_>>();
    bits_to_word(&bits)
}

/// Render a register word as an LSB-first binary string.
pub fn word_to_binary_str(word: u16) -> String {
    word_to_bits(word)
        .iter()
        .map(|bit| if *bit { '1' } else { '0' })
        .collect()
}
