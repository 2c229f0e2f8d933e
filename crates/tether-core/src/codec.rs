//! Identifier codec
//!
//! Converts opaque binary identifiers into text tokens that can travel inside
//! text-based signaling messages, and back. Any alphabet of at least two
//! distinct symbols works; three standard alphabets are predefined.
//!
//! # Token layout
//!
//! A token is a run of leading-zero markers followed by the big-endian value
//! of the remaining bytes written in base `N`, most significant symbol first.
//!
//! Each marker is the zero-digit symbol followed by a count symbol in
//! `[1, N-1]`. Runs longer than `N-1` zero bytes repeat the `N-1` marker and
//! finish with a remainder marker. Input that is entirely zero bytes
//! (including empty input) encodes to the markers alone.
//!
//! The value part never starts with the zero-digit symbol because digits are
//! only emitted while the remaining magnitude is positive, so the markers
//! are unambiguous on decode.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;

use crate::errors::TetherError;

/// 36-symbol alphabet: digits and upper-case letters
pub const BASE36_SYMBOLS: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// 62-symbol alphabet: digits, upper-case and lower-case letters (default)
pub const BASE62_SYMBOLS: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// 92-symbol alphabet: the base62 symbols plus printable ASCII punctuation
pub const BASE92_SYMBOLS: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz~!@#$%^&*()_+{}:\"<>?`-=[];',./";

static BASE36: Lazy<Charset> = Lazy::new(|| Charset::from_trusted(BASE36_SYMBOLS));
static BASE62: Lazy<Charset> = Lazy::new(|| Charset::from_trusted(BASE62_SYMBOLS));
static BASE92: Lazy<Charset> = Lazy::new(|| Charset::from_trusted(BASE92_SYMBOLS));

/// Codec failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Input was not of the kind the operation decodes (e.g. non UTF-8 token bytes)
    #[error("Type mismatch: expected {expected}")]
    TypeMismatch {
        /// Description of the expected input
        expected: &'static str,
    },

    /// A token contained a symbol outside the alphabet
    #[error("base{base}: Invalid character ({symbol:?})")]
    InvalidCharacter {
        /// The offending symbol
        symbol: char,
        /// Size of the alphabet used for decoding
        base: usize,
    },

    /// The alphabet itself is unusable
    #[error("Invalid charset: {reason}")]
    InvalidCharset {
        /// Why the alphabet was rejected
        reason: String,
    },
}

impl From<CodecError> for TetherError {
    fn from(err: CodecError) -> Self {
        TetherError::invalid(err.to_string())
    }
}

/// An ordered alphabet of distinct symbols defining a numeral base
#[derive(Clone)]
pub struct Charset {
    symbols: Vec<char>,
    positions: HashMap<char, u32>,
}

impl Charset {
    /// Build an alphabet from caller-supplied symbols.
    ///
    /// Requires at least two symbols and no repeats.
    pub fn new(symbols: &str) -> Result<Self, CodecError> {
        let symbols: Vec<char> = symbols.chars().collect();
        if symbols.len() < 2 {
            return Err(CodecError::InvalidCharset {
                reason: format!("need at least 2 symbols, got {}", symbols.len()),
            });
        }
        if u32::try_from(symbols.len()).is_err() {
            return Err(CodecError::InvalidCharset {
                reason: "too many symbols".to_string(),
            });
        }

        let mut positions = HashMap::with_capacity(symbols.len());
        for (position, symbol) in symbols.iter().enumerate() {
            if positions.insert(*symbol, position as u32).is_some() {
                return Err(CodecError::InvalidCharset {
                    reason: format!("duplicate symbol {symbol:?}"),
                });
            }
        }

        Ok(Self { symbols, positions })
    }

    // Only for the compile-time constants above, which are known valid.
    fn from_trusted(symbols: &str) -> Self {
        let symbols: Vec<char> = symbols.chars().collect();
        let positions = symbols
            .iter()
            .enumerate()
            .map(|(position, symbol)| (*symbol, position as u32))
            .collect();
        Self { symbols, positions }
    }

    /// The standard 36-symbol alphabet
    pub fn base36() -> &'static Charset {
        &BASE36
    }

    /// The standard 62-symbol alphabet
    pub fn base62() -> &'static Charset {
        &BASE62
    }

    /// The standard 92-symbol alphabet
    pub fn base92() -> &'static Charset {
        &BASE92
    }

    /// Number of symbols in the alphabet
    pub fn base(&self) -> usize {
        self.symbols.len()
    }

    fn zero(&self) -> char {
        self.symbols[0]
    }

    fn digit(&self, symbol: char) -> Result<u32, CodecError> {
        self.positions
            .get(&symbol)
            .copied()
            .ok_or(CodecError::InvalidCharacter {
                symbol,
                base: self.base(),
            })
    }

    /// Encode bytes into a text token.
    pub fn encode(&self, bytes: &[u8]) -> String {
        let base = self.base();
        let leading_zeros = bytes.iter().take_while(|byte| **byte == 0).count();

        let mut token = String::new();
        let (full_markers, remainder) = (leading_zeros / (base - 1), leading_zeros % (base - 1));
        for _ in 0..full_markers {
            token.push(self.zero());
            token.push(self.symbols[base - 1]);
        }
        if remainder > 0 {
            token.push(self.zero());
            token.push(self.symbols[remainder]);
        }

        if leading_zeros == bytes.len() {
            return token;
        }

        for digit in to_base_digits(&bytes[leading_zeros..], base as u64) {
            token.push(self.symbols[digit as usize]);
        }
        token
    }

    /// Decode a text token back into bytes.
    pub fn decode(&self, token: &str) -> Result<Vec<u8>, CodecError> {
        let symbols: Vec<char> = token.chars().collect();
        let mut cursor = 0;
        let mut bytes = Vec::new();

        while symbols.len() - cursor >= 2 && symbols[cursor] == self.zero() {
            let count = self.digit(symbols[cursor + 1])?;
            bytes.resize(bytes.len() + count as usize, 0);
            cursor += 2;
        }

        let digits = symbols[cursor..]
            .iter()
            .map(|symbol| self.digit(*symbol))
            .collect::<Result<Vec<_>, _>>()?;
        bytes.extend(from_base_digits(&digits, self.base() as u64));
        Ok(bytes)
    }

    /// Decode a token that arrived as raw bytes off a text protocol.
    pub fn decode_utf8(&self, token: &[u8]) -> Result<Vec<u8>, CodecError> {
        let token = std::str::from_utf8(token).map_err(|_| CodecError::TypeMismatch {
            expected: "UTF-8 text token",
        })?;
        self.decode(token)
    }
}

impl Default for Charset {
    fn default() -> Self {
        Self::base62().clone()
    }
}

impl PartialEq for Charset {
    fn eq(&self, other: &Self) -> bool {
        self.symbols == other.symbols
    }
}

impl Eq for Charset {}

impl fmt::Debug for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Charset")
            .field("base", &self.base())
            .field("symbols", &self.symbols.iter().collect::<String>())
            .finish()
    }
}

/// Encode bytes with the default base62 alphabet.
pub fn encode(bytes: &[u8]) -> String {
    Charset::base62().encode(bytes)
}

/// Decode a token with the default base62 alphabet.
pub fn decode(token: &str) -> Result<Vec<u8>, CodecError> {
    Charset::base62().decode(token)
}

/// Big-endian bytes to base digits, most significant first.
///
/// A zero magnitude yields the single digit `0`.
fn to_base_digits(bytes: &[u8], base: u64) -> Vec<u32> {
    let mut magnitude: Vec<u8> = bytes.iter().copied().skip_while(|b| *b == 0).collect();
    let mut digits = Vec::new();

    while !magnitude.is_empty() {
        let mut quotient = Vec::with_capacity(magnitude.len());
        let mut remainder = 0u64;
        for byte in &magnitude {
            let acc = (remainder << 8) | u64::from(*byte);
            let q = acc / base;
            remainder = acc % base;
            if !(quotient.is_empty() && q == 0) {
                quotient.push(q as u8);
            }
        }
        digits.push(remainder as u32);
        magnitude = quotient;
    }

    if digits.is_empty() {
        digits.push(0);
    }
    digits.reverse();
    digits
}

/// Base digits (most significant first) to minimal big-endian bytes.
///
/// A zero value yields no bytes.
fn from_base_digits(digits: &[u32], base: u64) -> Vec<u8> {
    // little-endian accumulator
    let mut value: Vec<u8> = Vec::new();

    for digit in digits {
        let mut carry = u64::from(*digit);
        for byte in value.iter_mut() {
            let acc = u64::from(*byte) * base + carry;
            *byte = (acc & 0xFF) as u8;
            carry = acc >> 8;
        }
        while carry > 0 {
            value.push((carry & 0xFF) as u8);
            carry >>= 8;
        }
    }

    value.reverse();
    value
}
