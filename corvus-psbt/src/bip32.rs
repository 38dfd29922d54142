//! Extended-public-key plumbing for PSBT derivation records.
//!
//! PSBTs carry BIP-32 material in two shapes: serialized extended public
//! keys (the 78-byte `xpub` payload) as global map keys, and key sources —
//! a root fingerprint plus an integer derivation path — as values of the
//! derivation records. Derivation itself is wallet territory and out of
//! scope; this module only frames, validates and renders.

use std::cmp::Ordering;
use std::fmt;

use corvus_codec::{Reader, Writer};
use corvus_crypto::hash::sha256d;

use crate::Error;

/// Root-key fingerprint: the first four bytes of the HASH160 of the
/// master public key.
pub type Fingerprint = [u8; 4];

/// `(root fingerprint, integer derivation path)` as PSBT derivation
/// records carry it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySource {
    pub fingerprint: Fingerprint,
    pub path: Vec<u32>,
}

impl KeySource {
    /// Wire form: fingerprint, then each path element as 4 LE bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_bytes(&self.fingerprint);
        for child in &self.path {
            w.write_u32(*child);
        }
        w.into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() % 4 != 0 || bytes.is_empty() {
            return Err(Error::BadValueLength {
                kind: "bip32 derivation",
                len: bytes.len(),
            });
        }
        let mut r = Reader::new(bytes);
        let fingerprint = r.read_array::<4>()?;
        let mut path = Vec::with_capacity(bytes.len() / 4 - 1);
        while r.can_read_more() {
            path.push(r.read_u32()?);
        }
        Ok(KeySource { fingerprint, path })
    }
}

impl fmt::Display for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.fingerprint))?;
        for child in &self.path {
            if child & 0x8000_0000 != 0 {
                write!(f, "/{}'", child & 0x7fff_ffff)?;
            } else {
                write!(f, "/{child}")?;
            }
        }
        Ok(())
    }
}

/// A parsed 78-byte extended public key.
///
/// Hardened-derivation internals are not interpreted; the node is kept
/// for consistency checks and round-tripping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bip32Node {
    /// Network/version prefix, big-endian on the wire.
    pub version: u32,
    pub depth: u8,
    pub parent_fingerprint: Fingerprint,
    /// Child number of the final derivation step, big-endian on the wire.
    pub child_number: u32,
    pub chain_code: [u8; 32],
    /// 33-byte SEC1 compressed public key.
    pub pubkey: [u8; 33],
}

impl Bip32Node {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != 78 {
            return Err(Error::BadBip32Node);
        }
        let mut r = Reader::new(bytes);
        let version = u32::from_be_bytes(r.read_array()?);
        let depth = r.read_u8()?;
        let parent_fingerprint = r.read_array()?;
        let child_number = u32::from_be_bytes(r.read_array()?);
        let chain_code = r.read_array()?;
        let pubkey = r.read_array()?;
        Ok(Bip32Node {
            version,
            depth,
            parent_fingerprint,
            child_number,
            chain_code,
            pubkey,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(78);
        out.extend_from_slice(&self.version.to_be_bytes());
        out.push(self.depth);
        out.extend_from_slice(&self.parent_fingerprint);
        out.extend_from_slice(&self.child_number.to_be_bytes());
        out.extend_from_slice(&self.chain_code);
        out.extend_from_slice(&self.pubkey);
        out
    }

    /// Base58check rendering, i.e. the familiar `xpub…` string.
    pub fn to_xpub(&self) -> String {
        use base58::ToBase58;

        let mut data = self.to_bytes();
        let checksum = sha256d(&data);
        data.extend_from_slice(&checksum[..4]);
        data.to_base58()
    }

    /// Enforce the PSBT rule tying a global xpub to its claimed
    /// derivation: depth equals path length, and the final child number
    /// matches the last path element (zero at the root).
    pub fn check_derivation(&self, source: &KeySource) -> Result<(), Error> {
        if self.depth as usize != source.path.len() {
            return Err(Error::InconsistentBip32Derivation);
        }
        let consistent = if self.depth == 0 {
            self.child_number == 0
        } else {
            Some(&self.child_number) == source.path.last()
        };
        if !consistent {
            return Err(Error::InconsistentBip32Derivation);
        }
        Ok(())
    }
}

// PSBT maps are emitted sorted by key bytes; order nodes by their
// serialized form.
impl Ord for Bip32Node {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_bytes().cmp(&other.to_bytes())
    }
}

impl PartialOrd for Bip32Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> Bip32Node {
        Bip32Node {
            version: 0x0488b21e,
            depth: 2,
            parent_fingerprint: [1, 2, 3, 4],
            child_number: 7,
            chain_code: [0xaa; 32],
            pubkey: {
                let mut pk = [0x02; 33];
                pk[32] = 0x55;
                pk
            },
        }
    }

    #[test]
    fn node_round_trip() {
        let bytes = node().to_bytes();
        assert_eq!(bytes.len(), 78);
        assert_eq!(Bip32Node::from_bytes(&bytes).unwrap(), node());
        assert_eq!(Bip32Node::from_bytes(&bytes[..77]).unwrap_err(), Error::BadBip32Node);
    }

    #[test]
    fn xpub_has_familiar_prefix() {
        // version 0x0488b21e renders as the classic xpub prefix
        assert!(node().to_xpub().starts_with("xpub"));
    }

    #[test]
    fn key_source_round_trip() {
        let source = KeySource {
            fingerprint: [9, 8, 7, 6],
            path: vec![0x8000_002c, 0x8000_00af, 0, 7],
        };
        assert_eq!(KeySource::from_bytes(&source.to_bytes()).unwrap(), source);

        assert!(KeySource::from_bytes(&[0, 1, 2]).is_err());
        assert!(KeySource::from_bytes(&[]).is_err());
    }

    #[test]
    fn key_source_display_marks_hardened() {
        let source = KeySource {
            fingerprint: [0; 4],
            path: vec![0x8000_002c, 1],
        };
        assert_eq!(source.to_string(), "00000000/44'/1");
    }

    #[test]
    fn derivation_consistency() {
        let mut n = node();
        let good = KeySource {
            fingerprint: [0; 4],
            path: vec![3, 7],
        };
        assert!(n.check_derivation(&good).is_ok());

        // wrong depth
        let short = KeySource {
            fingerprint: [0; 4],
            path: vec![7],
        };
        assert!(n.check_derivation(&short).is_err());

        // wrong final child
        let wrong = KeySource {
            fingerprint: [0; 4],
            path: vec![3, 8],
        };
        assert!(n.check_derivation(&wrong).is_err());

        // root node must claim child 0
        n.depth = 0;
        n.child_number = 0;
        let root = KeySource {
            fingerprint: [0; 4],
            path: vec![],
        };
        assert!(n.check_derivation(&root).is_ok());
    }
}
