//! Base43 text codec.
//!
//! QR codes have a dense alphanumeric mode restricted to a 45-character
//! set; base43 packs arbitrary bytes into a subset of it. The alphabet and
//! big-endian positional encoding (leading zero bytes map to leading `'0'`
//! digits) match the wallet encoding this chain's ecosystem settled on.

use crate::Error;

const ALPHABET: &[u8; 43] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ$*+-./:";

fn digit_value(c: char) -> Result<u32, Error> {
    ALPHABET
        .iter()
        .position(|&a| a as char == c)
        .map(|i| i as u32)
        .ok_or(Error::BadBase43Char(c))
}

pub fn encode(data: &[u8]) -> String {
    let zeros = data.iter().take_while(|&&b| b == 0).count();

    // base-43 digits, least significant first
    let mut digits: Vec<u8> = Vec::with_capacity(data.len() * 2);
    for &byte in &data[zeros..] {
        let mut carry = byte as u32;
        for d in digits.iter_mut() {
            carry += (*d as u32) << 8;
            *d = (carry % 43) as u8;
            carry /= 43;
        }
        while carry > 0 {
            digits.push((carry % 43) as u8);
            carry /= 43;
        }
    }

    let mut out = String::with_capacity(zeros + digits.len());
    for _ in 0..zeros {
        out.push(ALPHABET[0] as char);
    }
    for &d in digits.iter().rev() {
        out.push(ALPHABET[d as usize] as char);
    }
    out
}

pub fn decode(text: &str) -> Result<Vec<u8>, Error> {
    let zeros = text
        .chars()
        .take_while(|&c| c == ALPHABET[0] as char)
        .count();

    // bytes, least significant first
    let mut bytes: Vec<u8> = Vec::with_capacity(text.len());
    for c in text.chars().skip(zeros) {
        let mut carry = digit_value(c)?;
        for b in bytes.iter_mut() {
            carry += *b as u32 * 43;
            *b = (carry & 0xff) as u8;
            carry >>= 8;
        }
        while carry > 0 {
            bytes.push((carry & 0xff) as u8);
            carry >>= 8;
        }
    }

    let mut out = vec![0u8; zeros];
    out.extend(bytes.iter().rev());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_digits() {
        assert_eq!(encode(&[]), "");
        assert_eq!(encode(&[0]), "0");
        assert_eq!(encode(&[1]), "1");
        assert_eq!(encode(&[42]), ":");
        assert_eq!(encode(&[43]), "10");
        assert_eq!(encode(&[255]), "5.");
        assert_eq!(encode(&[0, 1]), "01");
    }

    #[test]
    fn rejects_foreign_characters() {
        assert_eq!(decode("ab").unwrap_err(), Error::BadBase43Char('a'));
        assert_eq!(decode("1 2").unwrap_err(), Error::BadBase43Char(' '));
    }

    proptest! {
        #[test]
        fn round_trip(data: Vec<u8>) {
            let text = encode(&data);
            prop_assert_eq!(decode(&text).unwrap(), data);
        }
    }
}
