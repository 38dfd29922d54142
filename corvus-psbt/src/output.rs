use std::collections::BTreeMap;

use corvus_addresses::Address;
use corvus_primitives::{OutputValue, TxOutput};
use corvus_script::ScriptType;

use crate::bip32::KeySource;

/// A transaction output together with its PSBT metadata and the wallet's
/// view of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialOutput {
    pub script_pubkey: Vec<u8>,
    pub value: OutputValue,
    pub asset: Option<String>,

    pub redeem_script: Option<Vec<u8>>,
    pub witness_script: Option<Vec<u8>>,
    /// pubkey -> key source
    pub bip32_paths: BTreeMap<Vec<u8>, KeySource>,
    /// Unrecognized PSBT records, round-tripped verbatim.
    pub unknown: BTreeMap<Vec<u8>, Vec<u8>>,

    pub script_type: Option<ScriptType>,
    pub num_sig: usize,
    /// Signing pubkeys; order matters.
    pub pubkeys: Vec<Vec<u8>>,
    /// Whether the wallet considers the output its own.
    pub is_mine: bool,
    /// Whether the wallet considers the output change.
    pub is_change: bool,
}

impl PartialOutput {
    pub fn new(script_pubkey: Vec<u8>, value: impl Into<OutputValue>) -> Self {
        PartialOutput {
            script_pubkey,
            value: value.into(),
            asset: None,
            redeem_script: None,
            witness_script: None,
            bip32_paths: BTreeMap::new(),
            unknown: BTreeMap::new(),
            script_type: None,
            num_sig: 0,
            pubkeys: Vec::new(),
            is_mine: false,
            is_change: false,
        }
    }

    pub fn from_txout(txout: &TxOutput) -> Self {
        let mut output = PartialOutput::new(txout.script_pubkey.clone(), txout.value);
        output.asset = txout.asset.clone();
        output
    }

    pub fn to_txout(&self) -> TxOutput {
        TxOutput {
            script_pubkey: self.script_pubkey.clone(),
            value: self.value,
            asset: self.asset.clone(),
        }
    }

    pub fn address(&self) -> Option<Address> {
        Address::from_script(&self.script_pubkey).ok()
    }

    /// Pull in metadata `other` has; scalars are last-write-wins.
    pub fn combine_with(&mut self, other: &PartialOutput) {
        debug_assert_eq!(self.script_pubkey, other.script_pubkey);
        if other.redeem_script.is_some() {
            self.redeem_script = other.redeem_script.clone();
        }
        if other.witness_script.is_some() {
            self.witness_script = other.witness_script.clone();
        }
        self.bip32_paths
            .extend(other.bip32_paths.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.unknown
            .extend(other.unknown.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}
