//! Transaction primitives and the network codec.
//!
//! The model follows the chain's wire format: [`Outpoint`], [`TxInput`],
//! [`TxOutput`] and [`Transaction`] parse from and serialize to the exact
//! byte strings the network relays, including the segwit marker/flag
//! variant. Txids, weights and the sighash flag type live here as well.
//!
//! Partially-signed counterparts carrying signing metadata are in the
//! `corvus-psbt` crate; this crate only knows about concrete transactions.

mod sighash;
mod tx;
mod value;

pub use sighash::{Sighash, SighashBase};
pub use tx::{sighash_from_script_sig, Outpoint, Transaction, TxInput, TxOutput};
pub use value::{OutputValue, RvnValue};

use thiserror::Error;

/// Satoshis per coin.
pub const COIN: u64 = 100_000_000;

/// Hard cap of the coin supply, in coins.
pub const TOTAL_COIN_SUPPLY: u64 = 21_000_000_000;

/// Largest admissible output amount, in satoshis.
pub const MAX_MONEY: i64 = (TOTAL_COIN_SUPPLY * COIN) as i64;

/// Default nSequence: final, but signalling opt-in RBF is still possible
/// by decrementing.
pub const SEQUENCE_DEFAULT: u32 = 0xffff_fffe;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("serialization failed: {0}")]
    Codec(#[from] corvus_codec::Error),

    #[error("invalid output amount (negative)")]
    NegativeValue,

    #[error("invalid output amount (too large)")]
    ValueOverflow,

    #[error("tx needs to have at least 1 input")]
    NoInputs,

    #[error("tx needs to have at least 1 output")]
    NoOutputs,

    #[error("invalid txn marker byte: {0:#04x}")]
    BadSegwitMarker(u8),

    #[error("output value is a dynamic spend marker, not a concrete amount")]
    NonConcreteValue,

    #[error("invalid sighash: {0:#04x}")]
    BadSighash(u8),

    #[error("asset outputs need a concrete amount")]
    AssetWithoutAmount,
}
