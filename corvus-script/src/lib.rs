//! Locking-script plumbing: opcode walking, shape templates and the
//! chain-specific asset extension.
//!
//! A Ravencoin locking script is a standard Bitcoin-shaped script,
//! optionally followed by an *asset suffix*: the `OP_RVN_ASSET` marker, a
//! push of `rvn`-tagged payload describing an asset operation, and a drop.
//! Everything in this crate that matches on standard shapes first truncates
//! the script at the marker, so that asset-carrying scripts classify the
//! same as their plain counterparts.

pub mod asset;
pub mod builder;
pub mod opcodes;
pub mod template;
pub mod walker;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A push opcode ran past the end of the script.
    #[error("malformed script: truncated push")]
    TruncatedPush,

    /// Multisig parameters outside `1 <= m <= n <= 15`.
    #[error("cannot express {m}-of-{n} multisig")]
    BadMultisig { m: usize, n: usize },

    /// Witness stack bytes that do not frame correctly.
    #[error("malformed witness: {0}")]
    BadWitness(corvus_codec::Error),

    /// Asset suffix present but not following the typed grammar.
    #[error("non-standard asset portion")]
    BadAssetPortion,
}

pub use template::ScriptType;
pub use walker::{decode_script, instructions, Instruction, Instructions};
