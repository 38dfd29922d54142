//! Partially signed transactions.
//!
//! This crate carries the signing-round object model: the [`PartialInput`]
//! / [`PartialOutput`] sidecars holding per-entry signing metadata, the
//! [`PartialTransaction`] that frames them, the BIP-174 key-value codec
//! with unknown-field passthrough, signature pre-images (legacy and the
//! segwit v0 digest), the keypair-table signing engine, finalization,
//! combine/join, and the deterministic input/output ordering with the
//! chain's asset overlay.
//!
//! Curve arithmetic stays behind the signer traits of `corvus-crypto`; the
//! wire formats live in `corvus-primitives`.

pub mod bip32;
mod convert;
mod input;
mod order;
mod output;
mod preimage;
mod ser;
mod sign;
mod tx;

pub use convert::{tx_from_any, tx_from_any_bytes, AnyTx};
pub use input::PartialInput;
pub use output::PartialOutput;
pub use preimage::Bip143SharedFields;
pub use ser::{parse_psbt, serialize_psbt};
pub use sign::{Keypairs, SignOptions};
pub use tx::{PartialTransaction, TxOptions};

use corvus_primitives::Outpoint;
use corvus_script::ScriptType;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("serialization failed: {0}")]
    Codec(#[from] corvus_codec::Error),

    #[error(transparent)]
    Primitives(#[from] corvus_primitives::Error),

    #[error(transparent)]
    Script(#[from] corvus_script::Error),

    #[error("bad magic")]
    BadHeaderMagic,

    #[error("PSBT input validation: {0}")]
    InputConsistency(&'static str),

    #[error("duplicate key: {0}")]
    DuplicateKey(&'static str),

    #[error("key for {0} must be empty")]
    NonEmptyKey(&'static str),

    #[error("key for {kind} has unexpected length: {len}")]
    BadKeyLength { kind: &'static str, len: usize },

    #[error("value for {kind} has unexpected length: {len}")]
    BadValueLength { kind: &'static str, len: usize },

    #[error("PSBT missing required global unsigned tx")]
    MissingUnsignedTx,

    #[error("unsigned tx must have empty scriptSigs and witnesses")]
    UnsignedTxHasScripts,

    #[error("only PSBTs with version 0 are supported, found version {0}")]
    UnsupportedVersion(u64),

    #[error("malformed bip32 extended key")]
    BadBip32Node,

    #[error("bip32 derivation does not match its extended key")]
    InconsistentBip32Derivation,

    #[error("cannot construct scriptSig or witness for txin type {0:?}")]
    UnknownTxinType(Option<ScriptType>),

    #[error("missing input amount")]
    MissingInputAmount,

    #[error("OP_CODESEPARATOR black magic is not supported")]
    CodeSeparator,

    #[error("not enough outputs for SIGHASH_SINGLE (input {0})")]
    SingleWithoutMatchingOutput(usize),

    #[error("input index {0} out of range")]
    InputIndexOutOfRange(usize),

    #[error("a combiner must not combine two different PSBTs")]
    CombineMismatch,

    #[error("duplicate inputs; transactions spending {0} cannot be joined")]
    DuplicatePrevout(Outpoint),

    #[error("expected {expected} signatures, got {got}")]
    SignatureCountMismatch { expected: usize, got: usize },

    #[error(
        "partial transactions generated by old wallet versions are no \
         longer supported; recreate the transaction on an upgraded wallet"
    )]
    LegacyPartialTx,

    #[error("failed to recognise transaction encoding")]
    UnrecognizedEncoding,

    #[error("signer backend: {0}")]
    Sign(#[from] corvus_crypto::sign::SignError),
}
