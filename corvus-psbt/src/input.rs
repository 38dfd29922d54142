use std::collections::BTreeMap;

use corvus_addresses::Address;
use corvus_crypto::hash::{hash160, sha256, Hash};
use corvus_primitives::{
    Outpoint, RvnValue, Sighash, Transaction, TxInput, TxOutput, SEQUENCE_DEFAULT,
};
use corvus_script::builder::{
    build_witness, multisig_script, p2wsh_nested_script, ScriptBuilder,
};
use corvus_script::template::{script_type_of, witness_program};
use corvus_script::{decode_script, ScriptType};

use crate::bip32::KeySource;
use crate::Error;

/// Placeholder signature length used for size estimation. DER-encoded
/// ECDSA signatures are 71 or 72 bytes in practice; low S is assumed (a
/// standardness rule), low R is not (external signers cannot be expected
/// to produce it).
const PLACEHOLDER_SIG_LEN: usize = 72;

/// Guess a script type from an address alone, for size estimation only.
///
/// A p2sh address hides its redeem script and a witness address of
/// unknown program hides its script, so the guess defaults to the
/// pubkey-hash shapes.
pub(crate) fn guess_txintype_from_address(address: Option<&Address>) -> ScriptType {
    match address {
        Some(Address::P2pkh(_)) => ScriptType::P2pkh,
        Some(Address::P2sh(_)) => ScriptType::P2wpkhP2sh,
        Some(Address::Witness { .. }) | None => ScriptType::P2wpkh,
    }
}

/// A transaction input together with the metadata accumulated across
/// signing rounds: the coin it spends, partial signatures, derivation
/// info, the scripts needed to satisfy it, and pass-through unknown PSBT
/// records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialInput {
    pub prevout: Outpoint,
    /// Final script-sig (BIP-174 `FINAL_SCRIPTSIG`), or the concrete
    /// script-sig when converted from a network input.
    pub script_sig: Option<Vec<u8>>,
    pub sequence: u32,
    /// Final serialized witness stack (`FINAL_SCRIPTWITNESS`).
    pub witness: Option<Vec<u8>>,
    pub is_coinbase_output: bool,
    pub sighash: Option<Sighash>,

    /// Full funding transaction (`NON_WITNESS_UTXO`); setter-validated.
    utxo: Option<Transaction>,
    /// Spent-output snapshot (`WITNESS_UTXO`); setter-validated.
    witness_utxo: Option<TxOutput>,

    /// pubkey -> signature (with sighash byte appended)
    pub part_sigs: BTreeMap<Vec<u8>, Vec<u8>>,
    /// pubkey -> key source
    pub bip32_paths: BTreeMap<Vec<u8>, KeySource>,
    pub redeem_script: Option<Vec<u8>>,
    pub witness_script: Option<Vec<u8>>,
    /// Unrecognized PSBT records, full key -> value, round-tripped
    /// verbatim.
    pub unknown: BTreeMap<Vec<u8>, Vec<u8>>,

    /// Script class, when the wallet (or [`Self::detect_script_type`])
    /// knows it.
    pub script_type: Option<ScriptType>,
    /// Threshold for multisig inputs.
    pub num_sig: usize,
    /// Signing pubkeys; order matters for multisig scripts.
    pub pubkeys: Vec<Vec<u8>>,
    /// Wallet-asserted value of the spent coin.
    pub trusted_value: Option<RvnValue>,
    /// Wallet-asserted address of the spent coin.
    pub trusted_address: Option<Address>,
    /// Height at which the spent coin was mined, when known.
    pub block_height: Option<u32>,
    /// Height at which the coin was spent, when known.
    pub spent_height: Option<u32>,
    pub spent_txid: Option<Hash<32>>,
    /// Byte size of the complete serialized witness, for estimation.
    pub witness_sizehint: Option<usize>,
}

impl PartialInput {
    pub fn new(prevout: Outpoint) -> Self {
        PartialInput {
            prevout,
            script_sig: None,
            sequence: SEQUENCE_DEFAULT,
            witness: None,
            is_coinbase_output: false,
            sighash: None,
            utxo: None,
            witness_utxo: None,
            part_sigs: BTreeMap::new(),
            bip32_paths: BTreeMap::new(),
            redeem_script: None,
            witness_script: None,
            unknown: BTreeMap::new(),
            script_type: None,
            num_sig: 0,
            pubkeys: Vec::new(),
            trusted_value: None,
            trusted_address: None,
            block_height: None,
            spent_height: None,
            spent_txid: None,
            witness_sizehint: None,
        }
    }

    /// Lift a network input into the partial model, optionally stripping
    /// its scripts so they get rebuilt from signing metadata.
    pub fn from_txin(txin: &TxInput, strip_scripts: bool) -> Self {
        let mut input = PartialInput::new(txin.prevout);
        if !strip_scripts {
            input.script_sig = txin.script_sig.clone();
            input.witness = txin.witness.clone();
        }
        input.sequence = txin.sequence;
        input.is_coinbase_output = txin.is_coinbase_output;
        input.sighash = txin.sighash;
        input
    }

    /// The concrete network form of this input's scalar fields.
    pub fn to_txin(&self) -> TxInput {
        TxInput {
            prevout: self.prevout,
            script_sig: self.script_sig.clone(),
            sequence: self.sequence,
            witness: self.witness.clone(),
            is_coinbase_output: self.is_coinbase_output,
            sighash: self.sighash,
        }
    }

    pub fn is_coinbase_input(&self) -> bool {
        self.prevout.is_coinbase()
    }

    pub fn utxo(&self) -> Option<&Transaction> {
        self.utxo.as_ref()
    }

    pub fn witness_utxo(&self) -> Option<&TxOutput> {
        self.witness_utxo.as_ref()
    }

    /// Attach the full funding transaction. Passing `None` is a no-op;
    /// on a failed consistency check the input is left untouched.
    pub fn set_utxo(&mut self, tx: Option<Transaction>) -> Result<(), Error> {
        let Some(tx) = tx else {
            return Ok(());
        };
        let previous = self.utxo.replace(tx);
        if let Err(e) = self.validate_data(false, false) {
            self.utxo = previous;
            return Err(e);
        }
        self.ensure_there_is_only_one_utxo();
        Ok(())
    }

    /// Attach (or clear) the spent-output snapshot, keeping the input
    /// untouched when the consistency check fails.
    pub fn set_witness_utxo(&mut self, output: Option<TxOutput>) -> Result<(), Error> {
        let previous = std::mem::replace(&mut self.witness_utxo, output);
        if let Err(e) = self.validate_data(false, false) {
            self.witness_utxo = previous;
            return Err(e);
        }
        self.ensure_there_is_only_one_utxo();
        Ok(())
    }

    /// The full previous tx is preferred over the snapshot whenever both
    /// are present; it also serves witness inputs.
    pub fn ensure_there_is_only_one_utxo(&mut self) {
        if self.utxo.is_some() && self.witness_utxo.is_some() {
            self.witness_utxo = None;
        }
    }

    /// Replace the full funding transaction by its single spent output,
    /// shrinking the serialized form (QR export relies on this).
    pub fn convert_utxo_to_witness_utxo(&mut self) {
        if let Some(utxo) = self.utxo.take() {
            self.witness_utxo = utxo
                .outputs()
                .get(self.prevout.vout as usize)
                .cloned();
        }
    }

    /// Cross-field invariants, checked on assignment and after parsing.
    ///
    /// `strict_witness_utxo` enables the BIP-174 rule forbidding legacy
    /// signatures over inputs described only by a witness UTXO; the
    /// default keeps it off, accepting that a malicious PSBT could then
    /// overstate a legacy input's amount.
    pub fn validate_data(
        &self,
        for_signing: bool,
        strict_witness_utxo: bool,
    ) -> Result<(), Error> {
        if let Some(utxo) = &self.utxo {
            if utxo.txid() != Some(self.prevout.txid) {
                return Err(Error::InputConsistency(
                    "if a non-witness UTXO is provided, its hash must match \
                     the hash specified in the prevout",
                ));
            }
            let out_idx = self.prevout.vout as usize;
            let Some(spent) = utxo.outputs().get(out_idx) else {
                return Err(Error::InputConsistency(
                    "prevout index exceeds the non-witness UTXO's outputs",
                ));
            };
            if let Some(witness_utxo) = &self.witness_utxo {
                if spent != witness_utxo {
                    return Err(Error::InputConsistency(
                        "if both non-witness UTXO and witness UTXO are \
                         provided, they must be consistent",
                    ));
                }
            }
        }

        if for_signing
            && strict_witness_utxo
            && !self.is_segwit(false)
            && self.witness_utxo.is_some()
        {
            return Err(Error::InputConsistency(
                "if a witness UTXO is provided, no non-witness signature may \
                 be created",
            ));
        }

        if let (Some(redeem_script), Some(address)) = (&self.redeem_script, self.address()) {
            if address != Address::P2sh(hash160(redeem_script)) {
                return Err(Error::InputConsistency(
                    "if a redeemScript is provided, the scriptPubKey must be \
                     for that redeemScript",
                ));
            }
        }

        if let Some(witness_script) = &self.witness_script {
            if let Some(redeem_script) = &self.redeem_script {
                if *redeem_script != p2wsh_nested_script(witness_script) {
                    return Err(Error::InputConsistency(
                        "if a witnessScript is provided, the redeemScript \
                         must be for that witnessScript",
                    ));
                }
            } else if let Some(address) = self.address() {
                let p2wsh = Address::Witness {
                    version: 0,
                    program: sha256(witness_script).to_vec(),
                };
                if address != p2wsh {
                    return Err(Error::InputConsistency(
                        "if a witnessScript is provided, the scriptPubKey \
                         must be for that witnessScript",
                    ));
                }
            }
        }

        Ok(())
    }

    /// The locking script of the spent coin, from the most trusted
    /// available source.
    pub fn scriptpubkey(&self) -> Option<Vec<u8>> {
        if let Some(address) = &self.trusted_address {
            return Some(address.script());
        }
        if let Some(utxo) = &self.utxo {
            return utxo
                .outputs()
                .get(self.prevout.vout as usize)
                .map(|o| o.script_pubkey.clone());
        }
        self.witness_utxo
            .as_ref()
            .map(|o| o.script_pubkey.clone())
    }

    pub fn address(&self) -> Option<Address> {
        if let Some(address) = &self.trusted_address {
            return Some(address.clone());
        }
        Address::from_script(&self.scriptpubkey()?).ok()
    }

    /// The value of the spent coin, when any source knows it.
    pub fn value(&self) -> Option<RvnValue> {
        if let Some(value) = &self.trusted_value {
            return Some(value.clone());
        }
        if let Some(utxo) = &self.utxo {
            return utxo
                .outputs()
                .get(self.prevout.vout as usize)?
                .rvn_value()
                .ok();
        }
        self.witness_utxo.as_ref()?.rvn_value().ok()
    }

    /// Derive the script type from available scripts. Only the shapes the
    /// signing engine can satisfy without wallet help are assigned;
    /// multisig thresholds still come from the wallet.
    pub fn detect_script_type(&mut self) {
        let Some(scriptpubkey) = self.scriptpubkey() else {
            return;
        };
        let Some(outer) = script_type_of(&scriptpubkey) else {
            return;
        };
        let detected = match outer {
            ScriptType::P2sh => self
                .redeem_script
                .as_deref()
                .and_then(script_type_of)
                .and_then(|inner| ScriptType::nested(inner, ScriptType::P2sh)),
            ScriptType::P2wsh => self
                .witness_script
                .as_deref()
                .and_then(script_type_of)
                .and_then(|inner| ScriptType::nested(inner, ScriptType::P2wsh)),
            other => Some(other),
        };
        if let Some(detected) = detected {
            if detected.is_single_sig() {
                self.script_type = Some(detected);
            }
        }
    }

    /// Whether the spent coin is a native witness program. `None` means
    /// inconclusive.
    pub fn is_native_segwit(&self) -> Option<bool> {
        self.address().map(|address| address.is_segwit())
    }

    /// Whether the spent coin is p2sh-nested segwit. `None` means
    /// inconclusive.
    pub fn is_p2sh_segwit(&self) -> Option<bool> {
        let redeem_script = self.redeem_script.as_deref()?;
        let address = self.address()?;
        if address != Address::P2sh(hash160(redeem_script)) {
            return Some(false);
        }
        let Ok(decoded) = decode_script(redeem_script) else {
            return Some(false);
        };
        Some(witness_program(&decoded).is_some())
    }

    /// Whether satisfying this input involves a witness.
    ///
    /// With `guess_for_address`, an input known only by address falls
    /// back to the estimation guess.
    pub fn is_segwit(&self, guess_for_address: bool) -> bool {
        if self.to_txin().is_segwit() {
            return true;
        }
        let native = self.is_native_segwit();
        let nested = self.is_p2sh_segwit();
        if native == Some(true) || nested == Some(true) {
            return true;
        }
        if native == Some(false) && nested == Some(false) {
            return false;
        }
        if self.witness_script.is_some() {
            return true;
        }
        let script_type = match self.script_type {
            Some(t) => Some(t),
            None if guess_for_address => {
                Some(guess_txintype_from_address(self.address().as_ref()))
            }
            None => None,
        };
        script_type.is_some_and(|t| t.is_segwit())
    }

    /// Whether progress has been made towards completing this input.
    pub fn already_has_some_signatures(&self) -> bool {
        !self.part_sigs.is_empty() || self.script_sig.is_some() || self.witness.is_some()
    }

    /// The completion predicate: can a final script-sig and witness be
    /// produced from what this input holds?
    pub fn is_complete(&self) -> bool {
        if self.script_sig.is_some() && self.witness.is_some() {
            return true;
        }
        if self.is_coinbase_input() {
            return true;
        }
        if self.script_sig.is_some() && !self.is_segwit(false) {
            return true;
        }
        let sigs = self.part_sigs.len();
        match self.script_type {
            Some(t) if t.is_single_sig() => sigs >= 1,
            Some(ScriptType::P2sh | ScriptType::P2wsh | ScriptType::P2wshP2sh) => {
                sigs >= self.num_sig
            }
            _ => false,
        }
    }

    fn effective_script_type(&self, estimate: bool) -> Option<ScriptType> {
        match self.script_type {
            Some(t) => Some(t),
            None if estimate => Some(guess_txintype_from_address(self.address().as_ref())),
            None => None,
        }
    }

    /// Pubkeys and signatures as they appear in scripts, or placeholders
    /// when estimating.
    fn siglist(&self, estimate: bool) -> (Vec<Vec<u8>>, Vec<Vec<u8>>) {
        if self.is_coinbase_input() {
            return (vec![], vec![]);
        }
        if estimate {
            let pubkey_len = self.pubkeys.first().map_or(33, Vec::len);
            let num_pubkeys = self.pubkeys.len().max(1);
            let num_sig = self.num_sig.max(1);
            return (
                vec![vec![0u8; pubkey_len]; num_pubkeys],
                vec![vec![0u8; PLACEHOLDER_SIG_LEN]; num_sig],
            );
        }
        let sig_list: Vec<Vec<u8>> = self
            .pubkeys
            .iter()
            .map(|pk| self.part_sigs.get(pk).cloned().unwrap_or_default())
            .collect();
        let sig_list = if self.is_complete() {
            sig_list.into_iter().filter(|s| !s.is_empty()).collect()
        } else {
            sig_list
        };
        (self.pubkeys.clone(), sig_list)
    }

    /// Serialize this input's witness, estimating with placeholders when
    /// asked. Returns empty bytes for a coinbase input and the empty
    /// stack for non-segwit inputs of a segwit transaction.
    pub fn construct_witness(&self, estimate: bool) -> Result<Vec<u8>, Error> {
        if let Some(witness) = &self.witness {
            return Ok(witness.clone());
        }
        if self.is_coinbase_input() {
            return Ok(vec![]);
        }
        if !self.is_segwit(estimate) {
            return Ok(build_witness::<Vec<u8>>(&[]));
        }
        if estimate {
            if let Some(hint) = self.witness_sizehint {
                return Ok(vec![0u8; hint]);
            }
        }

        let script_type = self.effective_script_type(estimate);
        let (pubkeys, sigs) = self.siglist(estimate);
        let first_sig = sigs.first().cloned().unwrap_or_default();
        let first_pubkey = pubkeys.first().cloned().unwrap_or_default();

        match script_type {
            Some(ScriptType::P2wpkh | ScriptType::P2wpkhP2sh) => {
                Ok(build_witness(&[first_sig, first_pubkey]))
            }
            Some(ScriptType::P2wsh | ScriptType::P2wshP2sh) => {
                let witness_script = multisig_script(&pubkeys, self.num_sig.max(1))?;
                let mut items = vec![vec![]]; // CHECKMULTISIG dummy
                items.extend(sigs);
                items.push(witness_script);
                Ok(build_witness(&items))
            }
            Some(ScriptType::P2pk | ScriptType::P2pkh | ScriptType::P2sh) => {
                Ok(build_witness::<Vec<u8>>(&[]))
            }
            None => Err(Error::UnknownTxinType(None)),
        }
    }

    /// Build this input's script-sig from its signing metadata, or echo
    /// the final script when already set.
    pub fn construct_script_sig(&self, estimate: bool) -> Result<Vec<u8>, Error> {
        if let Some(script_sig) = &self.script_sig {
            return Ok(script_sig.clone());
        }
        if self.is_coinbase_input() {
            return Ok(vec![]);
        }

        if self.is_p2sh_segwit() == Some(true) {
            if let Some(redeem_script) = &self.redeem_script {
                return Ok(ScriptBuilder::new().data(redeem_script).into_script());
            }
        }
        if self.is_native_segwit() == Some(true) {
            return Ok(vec![]);
        }

        let script_type = self.effective_script_type(estimate);
        let (pubkeys, sigs) = self.siglist(estimate);
        let first_sig = sigs.first().cloned().unwrap_or_default();
        let first_pubkey = pubkeys.first().cloned().unwrap_or_default();

        match script_type {
            Some(ScriptType::P2pk) => Ok(ScriptBuilder::new().data(&first_sig).into_script()),
            Some(ScriptType::P2pkh) => Ok(ScriptBuilder::new()
                .data(&first_sig)
                .data(&first_pubkey)
                .into_script()),
            Some(ScriptType::P2sh) => {
                let redeem_script = multisig_script(&pubkeys, self.num_sig.max(1))?;
                let mut builder = ScriptBuilder::new().small_number(0);
                for sig in &sigs {
                    builder = builder.data(sig);
                }
                Ok(builder.data(&redeem_script).into_script())
            }
            Some(ScriptType::P2wpkh | ScriptType::P2wsh) => Ok(vec![]),
            Some(ScriptType::P2wpkhP2sh) => {
                let redeem_script =
                    corvus_script::builder::p2wpkh_nested_script(&first_pubkey);
                Ok(ScriptBuilder::new().data(&redeem_script).into_script())
            }
            Some(ScriptType::P2wshP2sh) => {
                let witness_script = match &self.witness_script {
                    Some(ws) => ws.clone(),
                    None if estimate => vec![],
                    None => multisig_script(&pubkeys, self.num_sig.max(1))?,
                };
                let redeem_script = p2wsh_nested_script(&witness_script);
                Ok(ScriptBuilder::new().data(&redeem_script).into_script())
            }
            None => Err(Error::UnknownTxinType(None)),
        }
    }

    /// Turn a complete input final: set script-sig and witness, then drop
    /// the metadata BIP-174 wants cleared. Incomplete inputs are left
    /// untouched.
    pub fn finalize(&mut self) -> Result<(), Error> {
        if self.script_sig.is_some() && self.witness.is_some() {
            self.clear_fields_when_finalized();
            return Ok(());
        }
        if !self.is_complete() {
            return Ok(());
        }
        self.script_sig = Some(self.construct_script_sig(false)?);
        self.witness = Some(self.construct_witness(false)?);
        self.clear_fields_when_finalized();
        Ok(())
    }

    // BIP-174: "All other data except the UTXO and unknown fields in the
    // input key-value map should be cleared from the PSBT"
    fn clear_fields_when_finalized(&mut self) {
        self.part_sigs.clear();
        self.bip32_paths.clear();
        self.redeem_script = None;
        self.witness_script = None;
    }

    /// Pull in everything `other` knows that we don't; scalars are
    /// last-write-wins. Tries to finalize afterwards.
    pub fn combine_with(&mut self, other: &PartialInput) -> Result<(), Error> {
        debug_assert_eq!(self.prevout, other.prevout);
        if other.script_sig.is_some() {
            self.script_sig = other.script_sig.clone();
        }
        if other.witness.is_some() {
            self.witness = other.witness.clone();
        }
        if other.witness_utxo.is_some() {
            self.witness_utxo = other.witness_utxo.clone();
        }
        if other.utxo.is_some() {
            self.utxo = other.utxo.clone();
        }
        self.part_sigs
            .extend(other.part_sigs.iter().map(|(k, v)| (k.clone(), v.clone())));
        if other.sighash.is_some() {
            self.sighash = other.sighash;
        }
        self.bip32_paths
            .extend(other.bip32_paths.iter().map(|(k, v)| (k.clone(), v.clone())));
        if other.redeem_script.is_some() {
            self.redeem_script = other.redeem_script.clone();
        }
        if other.witness_script.is_some() {
            self.witness_script = other.witness_script.clone();
        }
        self.unknown
            .extend(other.unknown.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.ensure_there_is_only_one_utxo();
        self.finalize()
    }
}
