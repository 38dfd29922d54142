//! Rust-native building blocks for the Ravencoin blockchain ecosystem
//!
//! Corvus is a collection of modules re-implementing common Ravencoin
//! logic in native Rust: the transaction wire codec with the chain's
//! asset-aware script extensions, the partially-signed transaction
//! (BIP-174) object model, signature pre-images for legacy and segwit
//! spends, and the address formats around them. This crate doesn't
//! provide any particular application, it is meant to be used as a base
//! layer for higher-level use-cases, such as wallets or explorers.

#[doc(inline)]
pub use corvus_codec as codec;

#[doc(inline)]
pub use corvus_crypto as crypto;

#[doc(inline)]
pub use corvus_script as script;

#[doc(inline)]
pub use corvus_addresses as addresses;

#[doc(inline)]
pub use corvus_primitives as primitives;

#[doc(inline)]
pub use corvus_psbt as psbt;
