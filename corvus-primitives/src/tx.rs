use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use corvus_addresses::Address;
use corvus_codec::{Decodable, Encodable, Reader, Writer};
use corvus_crypto::hash::{sha256d, Hash};
use corvus_script::asset::{asset_in_script, with_transfer_suffix};
use corvus_script::builder::build_witness;
use corvus_script::{builder, instructions};

use crate::{Error, OutputValue, RvnValue, Sighash, MAX_MONEY, SEQUENCE_DEFAULT};

/// Reference to a specific output of a previous transaction.
///
/// The txid is kept in display byte order, the reverse of its wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Outpoint {
    pub txid: Hash<32>,
    pub vout: u32,
}

impl Outpoint {
    pub fn new(txid: Hash<32>, vout: u32) -> Self {
        Outpoint { txid, vout }
    }

    /// Whether this is the null reference used by coinbase inputs.
    pub fn is_coinbase(&self) -> bool {
        self.txid.is_zero()
    }

    pub fn write(&self, w: &mut Writer) {
        w.write_bytes(self.txid.reversed().as_ref());
        w.write_u32(self.vout);
    }

    pub fn read(r: &mut Reader<'_>) -> Result<Self, corvus_codec::Error> {
        let wire_txid: Hash<32> = Hash::new(r.read_array()?);
        let vout = r.read_u32()?;
        Ok(Outpoint {
            txid: wire_txid.reversed(),
            vout,
        })
    }

    pub fn to_wire(&self) -> Vec<u8> {
        Encodable::to_wire(self)
    }
}

impl Encodable for Outpoint {
    fn encode(&self, w: &mut Writer) {
        self.write(w);
    }
}

impl Decodable for Outpoint {
    fn decode(r: &mut Reader<'_>) -> Result<Self, corvus_codec::Error> {
        Self::read(r)
    }
}

impl fmt::Display for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

impl FromStr for Outpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (txid, vout) = s
            .split_once(':')
            .ok_or(Error::Codec(corvus_codec::Error::BadField("outpoint")))?;
        let txid: Hash<32> = txid
            .parse()
            .map_err(|_| Error::Codec(corvus_codec::Error::BadField("outpoint txid")))?;
        let vout: u32 = vout
            .parse()
            .map_err(|_| Error::Codec(corvus_codec::Error::BadField("outpoint index")))?;
        Ok(Outpoint { txid, vout })
    }
}

/// Best-effort sighash recovery from a script-sig: the last byte of its
/// first push, when that byte is a defined flag.
pub fn sighash_from_script_sig(script_sig: &[u8]) -> Option<Sighash> {
    let first = instructions(script_sig).next()?.ok()?;
    let byte = *first.push?.last()?;
    Sighash::from_byte(byte).ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    pub prevout: Outpoint,
    pub script_sig: Option<Vec<u8>>,
    pub sequence: u32,
    /// Serialized witness stack (item count + length-prefixed items).
    pub witness: Option<Vec<u8>>,
    /// Whether the coin being spent is an output of a coinbase tx.
    /// This matters for coin maturity.
    pub is_coinbase_output: bool,
    pub sighash: Option<Sighash>,
}

impl TxInput {
    pub fn new(prevout: Outpoint) -> Self {
        TxInput {
            prevout,
            script_sig: None,
            sequence: SEQUENCE_DEFAULT,
            witness: None,
            is_coinbase_output: false,
            sighash: None,
        }
    }

    /// Whether this is the input of a coinbase tx.
    pub fn is_coinbase_input(&self) -> bool {
        self.prevout.is_coinbase()
    }

    /// A present, non-empty witness proves the input is segwit; anything
    /// else proves nothing.
    pub fn is_segwit(&self) -> bool {
        !matches!(self.witness.as_deref(), None | Some([]) | Some([0x00]))
    }

    pub fn witness_elements(&self) -> Result<Vec<Vec<u8>>, corvus_script::Error> {
        match self.witness.as_deref() {
            None | Some([]) => Ok(vec![]),
            Some(witness) => builder::decode_witness(witness),
        }
    }

    fn write(&self, w: &mut Writer, script_sig: &[u8]) {
        self.prevout.write(w);
        w.write_var_bytes(script_sig);
        w.write_u32(self.sequence);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, Error> {
        let prevout = Outpoint::read(r)?;
        let script_sig = r.read_var_bytes()?.to_vec();
        let sequence = r.read_u32()?;
        let sighash = sighash_from_script_sig(&script_sig);
        Ok(TxInput {
            prevout,
            script_sig: Some(script_sig),
            sequence,
            witness: None,
            is_coinbase_output: false,
            sighash,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub script_pubkey: Vec<u8>,
    pub value: OutputValue,
    /// Asset carried by the script suffix; the wire value field is zero
    /// for these outputs and `value` holds the asset quantity instead.
    pub asset: Option<String>,
}

impl TxOutput {
    pub fn new(script_pubkey: Vec<u8>, value: impl Into<OutputValue>) -> Self {
        TxOutput {
            script_pubkey,
            value: value.into(),
            asset: None,
        }
    }

    /// Output paying `value` to `address`, wrapping the locking script in
    /// a transfer suffix when an asset name is given.
    pub fn from_address_and_value(
        address: &Address,
        value: OutputValue,
        asset: Option<&str>,
    ) -> Result<Self, Error> {
        let mut script = address.script();
        if let Some(name) = asset {
            let amount = value.sats().map_err(|_| Error::AssetWithoutAmount)?;
            script = with_transfer_suffix(&script, name, amount);
        }
        Ok(TxOutput {
            script_pubkey: script,
            value,
            asset: asset.map(str::to_string),
        })
    }

    pub fn address(&self) -> Option<Address> {
        Address::from_script(&self.script_pubkey).ok()
    }

    /// The output's value as a bundle: either RVN satoshis or an asset
    /// quantity.
    pub fn rvn_value(&self) -> Result<RvnValue, Error> {
        let sats = self.value.sats()?;
        Ok(match &self.asset {
            Some(name) => RvnValue::from_asset(name.clone(), sats),
            None => RvnValue::from_sats(sats),
        })
    }

    pub fn write(&self, w: &mut Writer) -> Result<(), Error> {
        if self.asset.is_some() {
            // asset quantity travels inside the script suffix
            w.write_u64(0);
        } else {
            w.write_u64(self.value.sats()?);
        }
        w.write_var_bytes(&self.script_pubkey);
        Ok(())
    }

    pub fn read(r: &mut Reader<'_>) -> Result<Self, Error> {
        let value = r.read_i64()?;
        if value < 0 {
            return Err(Error::NegativeValue);
        }
        if value > MAX_MONEY {
            return Err(Error::ValueOverflow);
        }
        let script_pubkey = r.read_var_bytes()?.to_vec();
        Ok(match asset_in_script(&script_pubkey) {
            Some((name, amount)) => TxOutput {
                script_pubkey,
                value: OutputValue::Sats(amount),
                asset: Some(name),
            },
            None => TxOutput {
                script_pubkey,
                value: OutputValue::Sats(value as u64),
                asset: None,
            },
        })
    }

    pub fn to_wire(&self) -> Result<Vec<u8>, Error> {
        let mut w = Writer::new();
        self.write(&mut w)?;
        Ok(w.into_bytes())
    }

    pub fn from_wire(bytes: &[u8]) -> Result<Self, Error> {
        let mut r = Reader::new(bytes);
        let out = Self::read(&mut r)?;
        r.expect_end()?;
        Ok(out)
    }
}

#[derive(Debug, Clone, Default)]
struct TxCaches {
    network_ser: Option<Vec<u8>>,
    txid: Option<Hash<32>>,
    outputs_by_script: Option<HashMap<Vec<u8>, BTreeSet<usize>>>,
    input_by_prevout: Option<HashMap<Outpoint, usize>>,
}

/// A concrete network transaction.
///
/// Mutation goes through the `*_mut` accessors, which drop the serialized
/// form and txid caches. The lookup maps built by
/// [`Transaction::output_idxs_with_script`] and
/// [`Transaction::input_idx_spending`] are *not* invalidated; callers must
/// not mutate after using them.
#[derive(Debug, Clone)]
pub struct Transaction {
    version: i32,
    locktime: u32,
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    for_swap: bool,
    cache: RefCell<TxCaches>,
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.locktime == other.locktime
            && self.inputs == other.inputs
            && self.outputs == other.outputs
            && self.for_swap == other.for_swap
    }
}

impl Eq for Transaction {}

impl Transaction {
    pub const DEFAULT_VERSION: i32 = 2;

    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Result<Self, Error> {
        if inputs.is_empty() {
            return Err(Error::NoInputs);
        }
        if outputs.is_empty() {
            return Err(Error::NoOutputs);
        }
        Ok(Transaction {
            version: Self::DEFAULT_VERSION,
            locktime: 0,
            inputs,
            outputs,
            for_swap: false,
            cache: RefCell::default(),
        })
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

    /// Ignored while the for-swap flag is set: a SIGHASH_SINGLE swap has
    /// already committed to its locktime.
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

    pub fn inputs(&self) -> &[TxInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TxOutput] {
        &self.outputs
    }

    pub fn inputs_mut(&mut self) -> &mut Vec<TxInput> {
        self.invalidate_ser_cache();
        &mut self.inputs
    }

    pub fn outputs_mut(&mut self) -> &mut Vec<TxOutput> {
        self.invalidate_ser_cache();
        &mut self.outputs
    }

    pub fn invalidate_ser_cache(&self) {
        let mut cache = self.cache.borrow_mut();
        cache.network_ser = None;
        cache.txid = None;
    }

    pub fn is_segwit(&self) -> bool {
        self.inputs.iter().any(TxInput::is_segwit)
    }

    /// Whether RBF is disabled.
    pub fn is_final(&self) -> bool {
        !self
            .inputs
            .iter()
            .any(|txin| txin.sequence < SEQUENCE_DEFAULT)
    }

    /// Concrete transactions carry whatever scripts they carry; they are
    /// always complete.
    pub fn is_complete(&self) -> bool {
        true
    }

    pub fn read(r: &mut Reader<'_>) -> Result<Self, Error> {
        let version = r.read_i32()?;
        let mut n_vin = r.read_compact_size()?;
        let is_segwit = n_vin == 0;
        if is_segwit {
            let marker = r.read_u8()?;
            if marker != 0x01 {
                return Err(Error::BadSegwitMarker(marker));
            }
            n_vin = r.read_compact_size()?;
        }
        if n_vin < 1 {
            return Err(Error::NoInputs);
        }

        let mut inputs = Vec::with_capacity(n_vin.min(1024) as usize);
        for _ in 0..n_vin {
            inputs.push(TxInput::read(r)?);
        }

        let n_vout = r.read_compact_size()?;
        if n_vout < 1 {
            return Err(Error::NoOutputs);
        }
        let mut outputs = Vec::with_capacity(n_vout.min(1024) as usize);
        for _ in 0..n_vout {
            outputs.push(TxOutput::read(r)?);
        }

        if is_segwit {
            for txin in &mut inputs {
                let n_items = r.read_compact_size()?;
                let mut items = Vec::with_capacity(n_items.min(1024) as usize);
                for _ in 0..n_items {
                    items.push(r.read_var_bytes()?.to_vec());
                }
                txin.witness = Some(build_witness(&items));
            }
        }

        let locktime = r.read_u32()?;

        Ok(Transaction {
            version,
            locktime,
            inputs,
            outputs,
            for_swap: false,
            cache: RefCell::default(),
        })
    }

    /// Parse a complete network transaction, rejecting trailing bytes.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, Error> {
        let mut r = Reader::new(bytes);
        let tx = Self::read(&mut r)?;
        r.expect_end()?;
        tx.cache.borrow_mut().network_ser = Some(bytes.to_vec());
        Ok(tx)
    }

    /// Serialize as relayed on the network.
    ///
    /// `include_sigs = false` blanks every script-sig and drops witnesses
    /// (the form the PSBT unsigned-tx field and the txid pre-image use);
    /// `force_legacy` keeps the scripts but uses the pre-segwit framing.
    pub fn serialize_to_network(
        &self,
        include_sigs: bool,
        force_legacy: bool,
    ) -> Result<Vec<u8>, Error> {
        let mut w = Writer::new();
        w.write_i32(self.version);

        let use_segwit = include_sigs && !force_legacy && self.is_segwit();
        if use_segwit {
            w.write_u8(0x00); // marker
            w.write_u8(0x01); // flag
        }

        w.write_compact_size(self.inputs.len() as u64);
        for txin in &self.inputs {
            let script_sig = if include_sigs {
                txin.script_sig.as_deref().unwrap_or(&[])
            } else {
                &[]
            };
            txin.write(&mut w, script_sig);
        }

        w.write_compact_size(self.outputs.len() as u64);
        for txout in &self.outputs {
            txout.write(&mut w)?;
        }

        if use_segwit {
            for txin in &self.inputs {
                match &txin.witness {
                    Some(witness) => w.write_bytes(witness),
                    None if txin.is_coinbase_input() => {}
                    None => w.write_u8(0x00), // empty stack
                }
            }
        }

        w.write_u32(self.locktime);
        Ok(w.into_bytes())
    }

    /// The cached full serialization (signatures and witnesses included).
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        if let Some(ser) = &self.cache.borrow().network_ser {
            return Ok(ser.clone());
        }
        let ser = self.serialize_to_network(true, false)?;
        self.cache.borrow_mut().network_ser = Some(ser.clone());
        Ok(ser)
    }

    /// Double-SHA256 of the legacy serialization, display byte order.
    pub fn txid(&self) -> Option<Hash<32>> {
        if let Some(txid) = self.cache.borrow().txid {
            return Some(txid);
        }
        let ser = self.serialize_to_network(true, true).ok()?;
        let txid = sha256d(&ser).reversed();
        self.cache.borrow_mut().txid = Some(txid);
        Some(txid)
    }

    /// Double-SHA256 of the full serialization; equals [`Self::txid`] for
    /// transactions without witnesses.
    pub fn wtxid(&self) -> Option<Hash<32>> {
        let ser = self.serialize().ok()?;
        Some(sha256d(&ser).reversed())
    }

    pub fn total_size(&self) -> Result<usize, Error> {
        Ok(self.serialize()?.len())
    }

    /// Bytes attributable to the witness segment, marker and flag
    /// included.
    pub fn witness_size(&self) -> Result<usize, Error> {
        if !self.is_segwit() {
            return Ok(0);
        }
        let mut size = 2;
        for txin in &self.inputs {
            size += match &txin.witness {
                Some(witness) => witness.len(),
                None if txin.is_coinbase_input() => 0,
                None => 1,
            };
        }
        Ok(size)
    }

    pub fn base_size(&self) -> Result<usize, Error> {
        Ok(self.total_size()? - self.witness_size()?)
    }

    pub fn weight(&self) -> Result<usize, Error> {
        Ok(3 * self.base_size()? + self.total_size()?)
    }

    /// Virtual size in vbytes: weight / 4, rounded up.
    pub fn vsize(&self) -> Result<usize, Error> {
        Ok(Self::vsize_from_weight(self.weight()?))
    }

    pub fn vsize_from_weight(weight: usize) -> usize {
        weight / 4 + usize::from(weight % 4 > 0)
    }

    /// Indices of outputs paying to `script`.
    ///
    /// The underlying map is built on first use and not refreshed; do not
    /// mutate the transaction afterwards.
    pub fn output_idxs_with_script(&self, script: &[u8]) -> BTreeSet<usize> {
        let mut cache = self.cache.borrow_mut();
        let map = cache.outputs_by_script.get_or_insert_with(|| {
            let mut map: HashMap<Vec<u8>, BTreeSet<usize>> = HashMap::new();
            for (idx, txout) in self.outputs.iter().enumerate() {
                map.entry(txout.script_pubkey.clone()).or_default().insert(idx);
            }
            map
        });
        map.get(script).cloned().unwrap_or_default()
    }

    pub fn output_idxs_with_address(&self, address: &Address) -> BTreeSet<usize> {
        self.output_idxs_with_script(&address.script())
    }

    /// Index of the input spending `prevout`, with the same staleness
    /// caveat as [`Self::output_idxs_with_script`].
    pub fn input_idx_spending(&self, prevout: &Outpoint) -> Option<usize> {
        let mut cache = self.cache.borrow_mut();
        let map = cache.input_by_prevout.get_or_insert_with(|| {
            self.inputs
                .iter()
                .enumerate()
                .map(|(idx, txin)| (txin.prevout, idx))
                .collect()
        });
        map.get(prevout).copied()
    }
}

#[cfg(feature = "json")]
mod json {
    use super::*;
    use serde_json::{json, Value};

    impl Outpoint {
        pub fn to_json(&self) -> Value {
            json!([self.txid.to_string(), self.vout])
        }
    }

    impl TxInput {
        pub fn to_json(&self) -> Value {
            let mut obj = json!({
                "prevout_hash": self.txid_json(),
                "prevout_n": self.prevout.vout,
                "coinbase": self.is_coinbase_output,
                "nsequence": self.sequence,
            });
            let map = obj.as_object_mut().expect("object");
            if let Some(script_sig) = &self.script_sig {
                map.insert("scriptSig".into(), json!(hex::encode(script_sig)));
            }
            if let Some(witness) = &self.witness {
                map.insert("witness".into(), json!(hex::encode(witness)));
            }
            obj
        }

        fn txid_json(&self) -> String {
            self.prevout.txid.to_string()
        }
    }

    impl TxOutput {
        pub fn to_json(&self) -> Value {
            json!({
                "scriptpubkey": hex::encode(&self.script_pubkey),
                "address": self.address().map(|a| a.to_string()),
                "asset": self.asset,
                "value_sats": self.value.to_string(),
            })
        }
    }

    impl Transaction {
        pub fn to_json(&self) -> Value {
            json!({
                "version": self.version(),
                "locktime": self.locktime(),
                "inputs": self.inputs().iter().map(TxInput::to_json).collect::<Vec<_>>(),
                "outputs": self.outputs().iter().map(TxOutput::to_json).collect::<Vec<_>>(),
                "swap": self.for_swap(),
            })
        }
    }
}
