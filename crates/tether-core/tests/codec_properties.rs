//! Property tests for the identifier codec
//!
//! - Round trip holds for every alphabet and every byte string
//! - Leading zero bytes survive exactly
//! - Tokens only ever contain alphabet symbols

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use tether_core::codec::{self, Charset};

fn standard_charsets() -> [&'static Charset; 3] {
    [Charset::base36(), Charset::base62(), Charset::base92()]
}

/// Byte strings biased towards leading zero runs
fn identifier_bytes() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..64),
        (0usize..200, prop::collection::vec(any::<u8>(), 0..32)).prop_map(|(zeros, tail)| {
            let mut bytes = vec![0u8; zeros];
            bytes.extend(tail);
            bytes
        }),
        (0usize..200).prop_map(|zeros| vec![0u8; zeros]),
    ]
}

/// Alphabets of 2..=40 distinct symbols drawn from printable ASCII
fn custom_charset() -> impl Strategy<Value = Charset> {
    (2usize..=40)
        .prop_flat_map(|size| {
            Just((b'!'..=b'~').map(char::from).collect::<Vec<_>>())
                .prop_shuffle()
                .prop_map(move |symbols| symbols.into_iter().take(size).collect::<String>())
        })
        .prop_map(|symbols| Charset::new(&symbols).unwrap())
}

proptest! {
    /// Property: decode(encode(b)) == b for every standard alphabet
    #[test]
    fn standard_round_trip(bytes in identifier_bytes()) {
        for charset in standard_charsets() {
            let token = charset.encode(&bytes);
            prop_assert_eq!(charset.decode(&token).unwrap(), bytes.clone());
        }
    }

    /// Property: round trip holds for caller-supplied alphabets
    #[test]
    fn custom_round_trip(charset in custom_charset(), bytes in identifier_bytes()) {
        let token = charset.encode(&bytes);
        prop_assert_eq!(charset.decode(&token).unwrap(), bytes);
    }

    /// Property: the decoded leading zero run matches the input exactly
    #[test]
    fn leading_zero_count_preserved(zeros in 0usize..300, first in 1u8..=255, rest in prop::collection::vec(any::<u8>(), 0..16)) {
        let mut bytes = vec![0u8; zeros];
        bytes.push(first);
        bytes.extend(rest);

        let decoded = codec::decode(&codec::encode(&bytes)).unwrap();
        let decoded_zeros = decoded.iter().take_while(|b| **b == 0).count();
        prop_assert_eq!(decoded_zeros, zeros);
    }

    /// Property: tokens use only symbols of their alphabet
    #[test]
    fn tokens_stay_in_alphabet(bytes in identifier_bytes()) {
        let token = Charset::base36().encode(&bytes);
        prop_assert!(token.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }
}

#[test]
fn three_leading_zero_bytes() {
    let bytes = [0u8, 0, 0, 0xde, 0xad, 0xbe, 0xef];
    for charset in standard_charsets() {
        let decoded = charset.decode(&charset.encode(&bytes)).unwrap();
        assert_eq!(decoded, bytes);
        assert_eq!(&decoded[..3], &[0, 0, 0]);
        assert_ne!(decoded[3], 0);
    }
}
