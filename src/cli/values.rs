use crate::api::codec::{binary_str_to_word, floats_to_words, is_binary_word, CodecError};

/// Holding-register values typed by the operator, by detected encoding
///
/// Detection is all-or-nothing with a fixed priority: every token a `u16`,
/// else every token a 16-character binary string, else every token an `f32`.
/// Leading zeros make `0000000000000001` a plain word, not a binary string.
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterValues {
    Words(Vec<u16>),
    /// LSB-first binary strings, one register each
    Binary(Vec<String>),
    /// Two registers per value
    Floats(Vec<f32>),
}

impl RegisterValues {
    pub fn detect(tokens: &[String], display_name: &str) -> Result<Self, Vec<String>> {
        if tokens.is_empty() {
            return Err(vec![format!("No values given for argument {display_name}")]);
        }

        if let Some(words) = parse_all::<u16>(tokens) {
            return Ok(Self::Words(words));
        }
        if tokens.iter().all(|token| is_binary_word(token)) {
            return Ok(Self::Binary(tokens.to_vec()));
        }
        if let Some(floats) = parse_all::<f32>(tokens) {
            return Ok(Self::Floats(floats));
        }

        // Words and binary strings also parse as floats, so only tokens that
        // fit no encoding at all are left to report
        Err(tokens
            .iter()
            .filter(|token| token.parse::<f32>().is_err())
            .map(|token| {
                format!(
                    "Unable to parse value {token} to type u16 (0-65535), 16 bit binary string or f32 for argument {display_name}"
                )
            })
            .collect())
    }

    /// Register words to write, in order
    pub fn to_words(&self) -> Result<Vec<u16>, CodecError> {
        match self {
            Self::Words(words) => Ok(words.clone()),
            Self::Binary(strings) => strings.iter().map(|s| binary_str_to_word(s)).collect(),
            Self::Floats(floats) => Ok(floats_to_words(floats)),
        }
    }
}

fn parse_all<T: std::str::FromStr>(tokens: &[String]) -> Option<Vec<T>> {
    tokens.iter().map(|token| token.parse().ok()).collect()
}
