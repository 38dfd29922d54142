//! Cryptographic hashes for Ravencoin
//!
//! we expose two helper objects:
//!
//! * [`Hasher`] to help streaming objects or bytes into a hasher and
//!   computing a digest without intermediate buffers
//! * [`struct@Hash`] a conveniently strongly typed byte array
//!
//! The algorithms exposed here are the ones the chain actually uses:
//! single SHA-256, double SHA-256 (txids, checksums, signature digests) and
//! HASH160, i.e. RIPEMD-160 over SHA-256 (key and script hashes).
//!
//! # Example
//!
//! ```
//! use corvus_crypto::hash::Hasher;
//!
//! let mut hasher = Hasher::new();
//! hasher.input(b"abc");
//!
//! let digest = hasher.finalize();
//! # assert_eq!(
//! #   "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
//! #   hex::encode(digest)
//! # );
//! ```

#[allow(clippy::module_inception)]
mod hash;
mod hasher;
mod serde;

pub use self::{
    hash::Hash,
    hasher::{hash160, sha256, sha256d, Hasher},
};
