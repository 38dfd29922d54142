//! Abstract ECDSA capability.
//!
//! Corvus computes signature digests but never performs curve arithmetic;
//! the embedding application supplies an implementation of these traits
//! (typically backed by libsecp256k1 or a hardware signer). Signatures
//! cross the boundary DER-encoded, public keys as SEC1 bytes (33-byte
//! compressed or 65-byte uncompressed).

use thiserror::Error;

use crate::hash::Hash;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignError {
    /// Secret key material rejected by the backend
    #[error("invalid secret key material")]
    BadSecretKey,
    /// Any other backend-side failure
    #[error("signer backend failure: {0}")]
    Backend(String),
}

/// Produces DER-encoded ECDSA signatures over a 32-byte digest.
pub trait EcdsaSigner {
    fn sign(&self, secret: &[u8], digest: &Hash<32>) -> Result<Vec<u8>, SignError>;
}

/// Verifies signatures and recovers public keys from them.
pub trait EcdsaVerifier {
    /// Recover the compressed public key from a DER signature and a
    /// recovery id in `0..=3`. `None` when the candidate point is not on
    /// the curve for this recid.
    fn recover(&self, der_sig: &[u8], recid: u8, digest: &Hash<32>) -> Option<Vec<u8>>;

    fn verify(&self, pubkey: &[u8], der_sig: &[u8], digest: &Hash<32>) -> bool;
}
