//! Order-preserving binary key encoding.
//!
//! Backends that only compare bytes (SQLite BLOB keys) need an encoding where
//! `a.encode() < b.encode()` exactly when `a < b`. Every component encoding is
//! prefix-free, so tuples concatenate their parts:
//!
//! - integers: fixed-width big-endian
//! - strings: UTF-8 with `0x00` escaped as `0x00 0xFF`, terminated by `0x00 0x00`

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyDecodeError {
    #[error("key truncated")]
    Truncated,
    #[error("invalid escape byte {0:#04x} in string key")]
    BadEscape(u8),
    #[error("string key is not UTF-8")]
    Utf8,
    #[error("{0} trailing bytes after key")]
    Trailing(usize),
}

/// A key usable with every [`crate::OrderedStore`] backend.
pub trait StoreKey: Ord + Clone + fmt::Debug + 'static {
    fn encode_into(&self, out: &mut Vec<u8>);

    /// Decode one key from the front of `input`, advancing it.
    fn decode_from(input: &mut &[u8]) -> Result<Self, KeyDecodeError>;

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    fn decode(mut bytes: &[u8]) -> Result<Self, KeyDecodeError> {
        let key = Self::decode_from(&mut bytes)?;
        if bytes.is_empty() {
            Ok(key)
        } else {
            Err(KeyDecodeError::Trailing(bytes.len()))
        }
    }
}

fn take<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8], KeyDecodeError> {
    if input.len() < n {
        return Err(KeyDecodeError::Truncated);
    }
    let (head, rest) = input.split_at(n);
    *input = rest;
    Ok(head)
}

impl StoreKey for u32 {
    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }

    fn decode_from(input: &mut &[u8]) -> Result<Self, KeyDecodeError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(take(input, 4)?);
        Ok(u32::from_be_bytes(buf))
    }
}

impl StoreKey for u64 {
    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }

    fn decode_from(input: &mut &[u8]) -> Result<Self, KeyDecodeError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(take(input, 8)?);
        Ok(u64::from_be_bytes(buf))
    }
}

impl StoreKey for String {
    fn encode_into(&self, out: &mut Vec<u8>) {
        for &b in self.as_bytes() {
            out.push(b);
            if b == 0x00 {
                out.push(0xFF);
            }
        }
        out.extend_from_slice(&[0x00, 0x00]);
    }

    fn decode_from(input: &mut &[u8]) -> Result<Self, KeyDecodeError> {
        let mut bytes = Vec::new();
        loop {
            let b = take(input, 1)?[0];
            if b != 0x00 {
                bytes.push(b);
                continue;
            }
            match take(input, 1)?[0] {
                0x00 => break,
                0xFF => bytes.push(0x00),
                other => return Err(KeyDecodeError::BadEscape(other)),
            }
        }
        String::from_utf8(bytes).map_err(|_| KeyDecodeError::Utf8)
    }
}

impl<A: StoreKey, B: StoreKey> StoreKey for (A, B) {
    fn encode_into(&self, out: &mut Vec<u8>) {
        self.0.encode_into(out);
        self.1.encode_into(out);
    }

    fn decode_from(input: &mut &[u8]) -> Result<Self, KeyDecodeError> {
        Ok((A::decode_from(input)?, B::decode_from(input)?))
    }
}

impl<A: StoreKey, B: StoreKey, C: StoreKey> StoreKey for (A, B, C) {
    fn encode_into(&self, out: &mut Vec<u8>) {
        self.0.encode_into(out);
        self.1.encode_into(out);
        self.2.encode_into(out);
    }

    fn decode_from(input: &mut &[u8]) -> Result<Self, KeyDecodeError> {
        Ok((
            A::decode_from(input)?,
            B::decode_from(input)?,
            C::decode_from(input)?,
        ))
    }
}
