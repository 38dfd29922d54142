use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};

use corvus_addresses::{Address, ChainParams};
use corvus_codec::Writer;
use corvus_crypto::hash::{sha256d, Hash};
use corvus_primitives::{Outpoint, RvnValue, Transaction};

use crate::bip32::{Bip32Node, KeySource};
use crate::input::PartialInput;
use crate::output::PartialOutput;
use crate::Error;

/// Construction options for [`PartialTransaction::from_io`].
#[derive(Debug, Clone, Copy)]
pub struct TxOptions<'a> {
    pub locktime: Option<u32>,
    pub version: Option<i32>,
    /// Apply the deterministic input/output ordering after construction.
    pub bip69_sort: bool,
    /// Suspends reordering and locktime mutation, for SIGHASH_SINGLE
    /// atomic swaps.
    pub for_swap: bool,
    /// Needed by the ordering overlay to recognize burn outputs.
    pub params: Option<&'a ChainParams>,
}

impl Default for TxOptions<'_> {
    fn default() -> Self {
        TxOptions {
            locktime: None,
            version: None,
            bip69_sort: true,
            for_swap: false,
            params: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct PartialCaches {
    network_ser: Option<Vec<u8>>,
    txid: Option<Hash<32>>,
}

/// A transaction in its signing rounds: inputs and outputs carry PSBT
/// metadata, the global section carries xpubs and unknown records.
///
/// Mutation funnels through the `*_mut` accessors, which invalidate the
/// serialized-form and txid caches.
#[derive(Debug, Clone)]
pub struct PartialTransaction {
    version: i32,
    locktime: u32,
    for_swap: bool,
    inputs: Vec<PartialInput>,
    outputs: Vec<PartialOutput>,

    /// Global xpub map: intermediate node -> key source.
    pub xpubs: BTreeMap<Bip32Node, KeySource>,
    /// Unrecognized global records, round-tripped verbatim.
    pub unknown: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Per-outpoint locking-script overrides consulted while building
    /// signature pre-images.
    pub prevout_overrides: HashMap<Outpoint, Vec<u8>>,

    cache: RefCell<PartialCaches>,
}

impl PartialEq for PartialTransaction {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.locktime == other.locktime
            && self.for_swap == other.for_swap
            && self.inputs == other.inputs
            && self.outputs == other.outputs
            && self.xpubs == other.xpubs
            && self.unknown == other.unknown
    }
}

impl Eq for PartialTransaction {}

impl Default for PartialTransaction {
    fn default() -> Self {
        PartialTransaction {
            version: Transaction::DEFAULT_VERSION,
            locktime: 0,
            for_swap: false,
            inputs: vec![],
            outputs: vec![],
            xpubs: BTreeMap::new(),
            unknown: BTreeMap::new(),
            prevout_overrides: HashMap::new(),
            cache: RefCell::default(),
        }
    }
}

impl PartialTransaction {
    /// Lift a concrete transaction into the partial model, optionally
    /// stripping input scripts so they get rebuilt from signing data.
    pub fn from_tx(tx: &Transaction, strip_scripts: bool) -> Self {
        let mut partial = PartialTransaction::default();
        partial.version = tx.version();
        partial.locktime = tx.locktime();
        partial.for_swap = tx.for_swap();
        partial.inputs = tx
            .inputs()
            .iter()
            .map(|txin| PartialInput::from_txin(txin, strip_scripts))
            .collect();
        partial.outputs = tx.outputs().iter().map(PartialOutput::from_txout).collect();
        partial
    }

    /// Build a transaction from in-memory inputs and outputs.
    pub fn from_io(
        inputs: Vec<PartialInput>,
        outputs: Vec<PartialOutput>,
        options: TxOptions<'_>,
    ) -> Self {
        let mut tx = PartialTransaction {
            inputs,
            outputs,
            ..Default::default()
        };
        if let Some(locktime) = options.locktime {
            tx.locktime = locktime;
        }
        if let Some(version) = options.version {
            tx.version = version;
        }
        tx.for_swap = options.for_swap;
        if options.bip69_sort {
            tx.bip69_sort(options.params);
        }
        tx
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn set_version(&mut self, version: i32) {
        self.version = version;
        self.invalidate_ser_cache();
    }

    pub fn locktime(&self) -> u32 {
        self.locktime
    }

    /// Ignored while the for-swap flag is set.
    pub fn set_locktime(&mut self, locktime: u32) {
        if self.for_swap {
            return;
        }
        self.locktime = locktime;
        self.invalidate_ser_cache();
    }

    pub fn for_swap(&self) -> bool {
        self.for_swap
    }

    pub fn set_for_swap(&mut self, for_swap: bool) {
        self.for_swap = for_swap;
    }

    pub fn inputs(&self) -> &[PartialInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[PartialOutput] {
        &self.outputs
    }

    pub fn inputs_mut(&mut self) -> &mut Vec<PartialInput> {
        self.invalidate_ser_cache();
        &mut self.inputs
    }

    pub fn outputs_mut(&mut self) -> &mut Vec<PartialOutput> {
        self.invalidate_ser_cache();
        &mut self.outputs
    }

    pub fn invalidate_ser_cache(&self) {
        let mut cache = self.cache.borrow_mut();
        cache.network_ser = None;
        cache.txid = None;
    }

    /// Append inputs, keeping the deterministic input ordering.
    pub fn add_inputs(&mut self, inputs: Vec<PartialInput>) {
        self.inputs.extend(inputs);
        self.sort_inputs_only();
        self.invalidate_ser_cache();
    }

    /// Append outputs, keeping the deterministic output ordering.
    pub fn add_outputs(&mut self, outputs: Vec<PartialOutput>, params: Option<&ChainParams>) {
        self.outputs.extend(outputs);
        self.sort_outputs_only(params);
        self.invalidate_ser_cache();
    }

    pub fn is_segwit(&self, guess_for_address: bool) -> bool {
        self.inputs
            .iter()
            .any(|txin| txin.is_segwit(guess_for_address))
    }

    pub fn is_complete(&self) -> bool {
        self.inputs.iter().all(PartialInput::is_complete)
    }

    /// `(signatures present, signatures required)` across all inputs.
    pub fn signature_count(&self) -> (usize, usize) {
        let mut have = 0;
        let mut required = 0;
        for txin in &self.inputs {
            if txin.is_coinbase_input() {
                continue;
            }
            have += txin.part_sigs.len();
            required += txin.num_sig;
        }
        (have, required)
    }

    /// Whether RBF is disabled.
    pub fn is_final(&self) -> bool {
        !self
            .inputs
            .iter()
            .any(|txin| txin.sequence < corvus_primitives::SEQUENCE_DEFAULT)
    }

    /// Toggle opt-in RBF on every input; under the for-swap flag, inputs
    /// committed with a SINGLE sighash keep their sequence.
    pub fn set_rbf(&mut self, rbf: bool) {
        let sequence = 0xffff_ffff - if rbf { 2 } else { 1 };
        for txin in &mut self.inputs {
            if self.for_swap
                && txin
                    .sighash
                    .is_some_and(|s| s.base == corvus_primitives::SighashBase::Single)
            {
                continue;
            }
            txin.sequence = sequence;
        }
        self.invalidate_ser_cache();
    }

    pub(crate) fn serialize_to_network_opts(
        &self,
        estimate: bool,
        include_sigs: bool,
        force_legacy: bool,
    ) -> Result<Vec<u8>, Error> {
        let mut w = Writer::new();
        w.write_i32(self.version);

        let use_segwit = include_sigs && !force_legacy && self.is_segwit(estimate);
        if use_segwit {
            w.write_u8(0x00);
            w.write_u8(0x01);
        }

        w.write_compact_size(self.inputs.len() as u64);
        for txin in &self.inputs {
            let script_sig = if include_sigs {
                txin.construct_script_sig(estimate)?
            } else {
                vec![]
            };
            txin.prevout.write(&mut w);
            w.write_var_bytes(&script_sig);
            w.write_u32(txin.sequence);
        }

        w.write_compact_size(self.outputs.len() as u64);
        for txout in &self.outputs {
            txout.to_txout().write(&mut w).map_err(Error::Primitives)?;
        }

        if use_segwit {
            for txin in &self.inputs {
                let witness = txin.construct_witness(estimate)?;
                w.write_bytes(&witness);
            }
        }

        w.write_u32(self.locktime);
        Ok(w.into_bytes())
    }

    /// Serialize as a network transaction. `include_sigs = false` yields
    /// the unsigned legacy form used for the PSBT global field and the
    /// txid pre-image.
    pub fn serialize_to_network(
        &self,
        include_sigs: bool,
        force_legacy: bool,
    ) -> Result<Vec<u8>, Error> {
        self.serialize_to_network_opts(false, include_sigs, force_legacy)
    }

    /// The cached full network serialization.
    pub fn network_bytes(&self) -> Result<Vec<u8>, Error> {
        if let Some(ser) = &self.cache.borrow().network_ser {
            return Ok(ser.clone());
        }
        let ser = self.serialize_to_network(true, false)?;
        self.cache.borrow_mut().network_ser = Some(ser.clone());
        Ok(ser)
    }

    /// Finalize every input that can be finalized; incomplete inputs are
    /// left as they are.
    pub fn finalize_psbt(&mut self) -> Result<(), Error> {
        for txin in &mut self.inputs {
            txin.finalize()?;
        }
        self.invalidate_ser_cache();
        Ok(())
    }

    /// PSBT bytes, or full network bytes once complete (unless
    /// `force_psbt`). Finalizes first.
    pub fn serialize_as_bytes(&mut self, force_psbt: bool) -> Result<Vec<u8>, Error> {
        self.finalize_psbt()?;
        if force_psbt || !self.is_complete() {
            crate::ser::serialize_psbt(self)
        } else {
            self.network_bytes()
        }
    }

    /// Text form: base64 PSBT while incomplete, raw hex of the network tx
    /// once complete. Finalizes first.
    pub fn serialize(&mut self) -> Result<String, Error> {
        self.finalize_psbt()?;
        if self.is_complete() {
            Ok(hex::encode(self.network_bytes()?))
        } else {
            Ok(self.to_base64()?)
        }
    }

    /// Base64 of the PSBT serialization (no finalization side effects).
    pub fn to_base64(&self) -> Result<String, Error> {
        use base64::Engine;
        let bytes = crate::ser::serialize_psbt(self)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    /// Base43 payload for QR codes: non-witness UTXOs are collapsed into
    /// witness UTXOs first, which shrinks the code considerably.
    pub fn to_qr_data(&self) -> Result<String, Error> {
        let mut tx = self.clone();
        tx.convert_all_utxos_to_witness_utxos();
        let bytes = tx.serialize_as_bytes(false)?;
        Ok(corvus_codec::base43::encode(&bytes))
    }

    /// Double-SHA256 of the legacy serialization. `None` until every
    /// input can produce its final script (or all inputs are segwit, in
    /// which case script-sigs don't depend on signatures).
    pub fn txid(&self) -> Option<Hash<32>> {
        if let Some(txid) = self.cache.borrow().txid {
            return Some(txid);
        }
        let all_segwit = self.inputs.iter().all(|txin| txin.is_segwit(false));
        if !all_segwit && !self.is_complete() {
            return None;
        }
        let ser = self.serialize_to_network_opts(false, true, true).ok()?;
        let txid = sha256d(&ser).reversed();
        self.cache.borrow_mut().txid = Some(txid);
        Some(txid)
    }

    pub fn wtxid(&self) -> Option<Hash<32>> {
        if !self.is_complete() {
            return None;
        }
        let ser = self.network_bytes().ok()?;
        Some(sha256d(&ser).reversed())
    }

    /// Convert to a concrete network transaction (scripts as currently
    /// constructible).
    pub fn to_tx(&self) -> Result<Transaction, Error> {
        let bytes = self.serialize_to_network(true, false)?;
        Ok(Transaction::from_wire(&bytes).map_err(Error::Primitives)?)
    }

    // ----- value arithmetic ------------------------------------------------

    /// Total value consumed by the inputs; errors when any input's value
    /// is unknown.
    pub fn input_value(&self) -> Result<RvnValue, Error> {
        self.inputs
            .iter()
            .map(|txin| txin.value().ok_or(Error::MissingInputAmount))
            .sum()
    }

    /// Total value produced by the outputs.
    pub fn output_value(&self) -> Result<RvnValue, Error> {
        let mut total = RvnValue::default();
        for txout in &self.outputs {
            total = total + txout.to_txout().rvn_value().map_err(Error::Primitives)?;
        }
        Ok(total)
    }

    /// Mining fee, when all input amounts are known and the transaction
    /// is balanced.
    pub fn fee(&self) -> Option<RvnValue> {
        let input = self.input_value().ok()?;
        let output = self.output_value().ok()?;
        input.checked_sub(&output)
    }

    // ----- size estimation -------------------------------------------------

    /// Total serialized size: exact once complete, placeholder-based
    /// before that.
    pub fn estimated_total_size(&self) -> Result<usize, Error> {
        if self.is_complete() {
            if let Some(ser) = &self.cache.borrow().network_ser {
                return Ok(ser.len());
            }
        }
        Ok(self
            .serialize_to_network_opts(!self.is_complete(), true, false)?
            .len())
    }

    pub fn estimated_witness_size(&self) -> Result<usize, Error> {
        let estimate = !self.is_complete();
        if !self.is_segwit(estimate) {
            return Ok(0);
        }
        let mut size = 2; // marker + flag
        for txin in &self.inputs {
            size += txin.construct_witness(estimate)?.len();
        }
        Ok(size)
    }

    pub fn estimated_base_size(&self) -> Result<usize, Error> {
        Ok(self.estimated_total_size()? - self.estimated_witness_size()?)
    }

    pub fn estimated_weight(&self) -> Result<usize, Error> {
        Ok(3 * self.estimated_base_size()? + self.estimated_total_size()?)
    }

    /// Estimated virtual size in vbytes (weight / 4, rounded up).
    pub fn estimated_size(&self) -> Result<usize, Error> {
        Ok(Transaction::vsize_from_weight(self.estimated_weight()?))
    }

    /// Estimated weight contribution of one input, in weight units.
    pub fn estimated_input_weight(
        txin: &PartialInput,
        is_segwit_tx: bool,
    ) -> Result<usize, Error> {
        let script_sig = txin.construct_script_sig(true)?;
        let mut w = Writer::new();
        txin.prevout.write(&mut w);
        w.write_var_bytes(&script_sig);
        w.write_u32(txin.sequence);
        let input_size = w.len();

        let witness_size = if txin.is_segwit(true) {
            txin.construct_witness(true)?.len()
        } else {
            usize::from(is_segwit_tx)
        };
        Ok(4 * input_size + witness_size)
    }

    /// Estimated serialized size of an output paying `address`, in bytes.
    pub fn estimated_output_size_for_address(address: &Address) -> usize {
        let script_len = address.script().len();
        let mut w = Writer::new();
        w.write_compact_size(script_len as u64);
        8 + w.len() + script_len
    }

    /// Same, with a transfer suffix for `asset` appended to the script.
    pub fn estimated_output_size_for_address_with_asset(
        address: &Address,
        asset: &str,
    ) -> usize {
        // marker, push opcode, magic, tag, name length, name, quantity,
        // drop
        Self::estimated_output_size_for_address(address) + 1 + 1 + 3 + 1 + 1 + asset.len() + 8 + 1
    }

    // ----- combine & join --------------------------------------------------

    /// Pull in all data `other` has that we don't (signatures, scripts,
    /// derivations). Both sides must describe the same unsigned tx.
    pub fn combine_with(&mut self, other: &PartialTransaction) -> Result<(), Error> {
        let ours = self.serialize_to_network(false, true)?;
        let theirs = other.serialize_to_network(false, true)?;
        if ours != theirs {
            return Err(Error::CombineMismatch);
        }
        self.xpubs
            .extend(other.xpubs.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.unknown
            .extend(other.unknown.iter().map(|(k, v)| (k.clone(), v.clone())));
        for (txin, other_txin) in self.inputs.iter_mut().zip(other.inputs.iter()) {
            txin.combine_with(other_txin)?;
        }
        for (txout, other_txout) in self.outputs.iter_mut().zip(other.outputs.iter()) {
            txout.combine_with(other_txout);
        }
        self.invalidate_ser_cache();
        Ok(())
    }

    /// Concatenate the inputs and outputs of `other` into this
    /// transaction. Spends must not overlap; all signatures are cleared
    /// since they no longer commit to the joined transaction.
    pub fn join_with(
        &mut self,
        other: &PartialTransaction,
        params: Option<&ChainParams>,
    ) -> Result<(), Error> {
        let mut prevouts = HashSet::new();
        for txin in self.inputs.iter().chain(other.inputs.iter()) {
            if !prevouts.insert(txin.prevout) {
                return Err(Error::DuplicatePrevout(txin.prevout));
            }
        }
        self.xpubs
            .extend(other.xpubs.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.unknown
            .extend(other.unknown.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.add_inputs(other.inputs.clone());
        self.add_outputs(other.outputs.clone(), params);
        self.remove_signatures();
        self.invalidate_ser_cache();
        Ok(())
    }

    /// Drop all signature material, returning every input to the
    /// unsigned state.
    pub fn remove_signatures(&mut self) {
        for txin in &mut self.inputs {
            txin.part_sigs.clear();
            txin.script_sig = None;
            txin.witness = None;
        }
        self.invalidate_ser_cache();
    }

    // ----- metadata housekeeping ------------------------------------------

    pub fn remove_xpubs_and_bip32_paths(&mut self) {
        self.xpubs.clear();
        for txin in &mut self.inputs {
            txin.bip32_paths.clear();
        }
        for txout in &mut self.outputs {
            txout.bip32_paths.clear();
        }
    }

    /// Strip everything sensitive before sharing for coinjoin.
    pub fn prepare_for_export_for_coinjoin(&mut self) {
        self.xpubs.clear();
        self.unknown.clear();
        for txin in &mut self.inputs {
            txin.bip32_paths.clear();
        }
        for txout in &mut self.outputs {
            txout.redeem_script = None;
            txout.witness_script = None;
            txout.bip32_paths.clear();
            txout.unknown.clear();
        }
    }

    /// Replace every non-witness UTXO with its witness-UTXO snapshot.
    /// Likely spec-invalid for legacy inputs, but much smaller (QR codes
    /// depend on it).
    pub fn convert_all_utxos_to_witness_utxos(&mut self) {
        for txin in &mut self.inputs {
            txin.convert_utxo_to_witness_utxo();
        }
        self.invalidate_ser_cache();
    }

    /// Determine the script type of inputs that don't have one yet by
    /// analyzing available scripts.
    pub fn update_input_script_types(&mut self) {
        for txin in &mut self.inputs {
            if txin.script_type.is_none() {
                txin.detect_script_type();
            }
        }
    }

    /// Output indices paying to `address` (exact script match; asset
    /// suffixed outputs don't match their bare address script).
    pub fn output_idxs_with_address(&self, address: &Address) -> Vec<usize> {
        let script = address.script();
        self.outputs
            .iter()
            .enumerate()
            .filter(|(_, o)| o.script_pubkey == script)
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(feature = "json")]
mod json {
    use super::*;
    use serde_json::{json, Value};

    impl PartialInput {
        pub fn to_json(&self) -> Value {
            json!({
                "prevout_hash": self.prevout.txid.to_string(),
                "prevout_n": self.prevout.vout,
                "coinbase": self.is_coinbase_output,
                "nsequence": self.sequence,
                "height": self.block_height,
                "value_sats": self.value().map(|v| v.to_string()),
                "address": self.address().map(|a| a.to_string()),
                "utxo": self.utxo().map(|u| u.serialize().ok().map(hex::encode)),
                "witness_utxo": self
                    .witness_utxo()
                    .map(|o| o.to_wire().ok().map(hex::encode)),
                "sighash": self.sighash.map(|s| s.to_byte()),
                "scriptSig": self.script_sig.as_ref().map(hex::encode),
                "witness": self.witness.as_ref().map(hex::encode),
                "redeem_script": self.redeem_script.as_ref().map(hex::encode),
                "witness_script": self.witness_script.as_ref().map(hex::encode),
                "part_sigs": self
                    .part_sigs
                    .iter()
                    .map(|(k, v)| (hex::encode(k), json!(hex::encode(v))))
                    .collect::<serde_json::Map<_, _>>(),
                "bip32_paths": self
                    .bip32_paths
                    .iter()
                    .map(|(k, v)| (hex::encode(k), json!(v.to_string())))
                    .collect::<serde_json::Map<_, _>>(),
                "unknown_psbt_fields": self
                    .unknown
                    .iter()
                    .map(|(k, v)| (hex::encode(k), json!(hex::encode(v))))
                    .collect::<serde_json::Map<_, _>>(),
            })
        }
    }

    impl PartialOutput {
        pub fn to_json(&self) -> Value {
            json!({
                "scriptpubkey": hex::encode(&self.script_pubkey),
                "address": self.address().map(|a| a.to_string()),
                "asset": self.asset,
                "value_sats": self.value.to_string(),
                "redeem_script": self.redeem_script.as_ref().map(hex::encode),
                "witness_script": self.witness_script.as_ref().map(hex::encode),
                "bip32_paths": self
                    .bip32_paths
                    .iter()
                    .map(|(k, v)| (hex::encode(k), json!(v.to_string())))
                    .collect::<serde_json::Map<_, _>>(),
                "unknown_psbt_fields": self
                    .unknown
                    .iter()
                    .map(|(k, v)| (hex::encode(k), json!(hex::encode(v))))
                    .collect::<serde_json::Map<_, _>>(),
            })
        }
    }

    impl PartialTransaction {
        pub fn to_json(&self) -> Value {
            json!({
                "version": self.version(),
                "locktime": self.locktime(),
                "swap": self.for_swap(),
                "inputs": self.inputs().iter().map(PartialInput::to_json).collect::<Vec<_>>(),
                "outputs": self.outputs().iter().map(PartialOutput::to_json).collect::<Vec<_>>(),
                "xpubs": self
                    .xpubs
                    .iter()
                    .map(|(k, v)| (k.to_xpub(), json!(v.to_string())))
                    .collect::<serde_json::Map<_, _>>(),
                "unknown_psbt_fields": self
                    .unknown
                    .iter()
                    .map(|(k, v)| (hex::encode(k), json!(hex::encode(v))))
                    .collect::<serde_json::Map<_, _>>(),
            })
        }
    }
}
