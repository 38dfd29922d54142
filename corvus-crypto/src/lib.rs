//! Cryptographic primitives consumed by the Corvus workspace.
//!
//! The hashing side is concrete (SHA-256, double SHA-256 and HASH160 over a
//! const-generic digest type). The ECDSA side is deliberately abstract: the
//! workspace never touches curve arithmetic itself, it talks to whatever
//! signer backend the embedding application provides through the traits in
//! [`sign`].

pub mod hash;
pub mod sign;
