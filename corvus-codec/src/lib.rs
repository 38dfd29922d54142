//! Wire framing shared across the Corvus workspace.
//!
//! Ravencoin frames its network structures by hand: fixed-width
//! little-endian integers, compact-size varints and length-prefixed byte
//! strings over a flat byte buffer. This crate provides the cursor-based
//! [`Reader`] / [`Writer`] pair implementing that framing, the
//! [`Encodable`] / [`Decodable`] traits the rest of the workspace hangs its
//! structures on, and the base43 text codec used for QR payloads.

pub mod base43;
mod stream;

pub use stream::{Reader, Writer};

use thiserror::Error;

/// Failure while reading or writing a wire structure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("attempt to read past end of buffer")]
    PastEnd,

    #[error("extra junk at the end of the stream")]
    TrailingJunk,

    #[error("bad wire field: {0}")]
    BadField(&'static str),

    #[error("invalid base43 character {0:?}")]
    BadBase43Char(char),
}

/// A structure with a canonical wire encoding.
pub trait Encodable {
    fn encode(&self, w: &mut Writer);

    /// Convenience wrapper allocating a fresh buffer.
    fn to_wire(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.encode(&mut w);
        w.into_bytes()
    }
}

/// A structure parseable from its canonical wire encoding.
pub trait Decodable: Sized {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error>;

    /// Parse a complete buffer, rejecting trailing bytes.
    fn from_wire(bytes: &[u8]) -> Result<Self, Error> {
        let mut r = Reader::new(bytes);
        let value = Self::decode(&mut r)?;
        r.expect_end()?;
        Ok(value)
    }
}
