//! The BIP-174 key-value serialization: `psbt\xff` magic, then one
//! key-value map per section (global, one per input, one per output),
//! each terminated by a zero-length key.

use corvus_codec::{Reader, Writer};
use corvus_primitives::{Sighash, Transaction, TxOutput};

use crate::bip32::{Bip32Node, KeySource};
use crate::input::PartialInput;
use crate::output::PartialOutput;
use crate::tx::PartialTransaction;
use crate::Error;

pub const PSBT_MAGIC: &[u8; 5] = b"psbt\xff";

mod global_type {
    pub const UNSIGNED_TX: u64 = 0x00;
    pub const XPUB: u64 = 0x01;
    pub const VERSION: u64 = 0xfb;
}

mod input_type {
    pub const NON_WITNESS_UTXO: u64 = 0;
    pub const WITNESS_UTXO: u64 = 1;
    pub const PARTIAL_SIG: u64 = 2;
    pub const SIGHASH_TYPE: u64 = 3;
    pub const REDEEM_SCRIPT: u64 = 4;
    pub const WITNESS_SCRIPT: u64 = 5;
    pub const BIP32_DERIVATION: u64 = 6;
    pub const FINAL_SCRIPTSIG: u64 = 7;
    pub const FINAL_SCRIPTWITNESS: u64 = 8;
}

mod output_type {
    pub const REDEEM_SCRIPT: u64 = 0;
    pub const WITNESS_SCRIPT: u64 = 1;
    pub const BIP32_DERIVATION: u64 = 2;
}

/// One record of a key-value map; `None` at the zero-length-key section
/// terminator.
fn read_kv(r: &mut Reader<'_>) -> Result<Option<(u64, Vec<u8>, Vec<u8>)>, Error> {
    let key_size = r.read_compact_size()?;
    if key_size == 0 {
        return Ok(None);
    }
    let full_key = r.read_bytes(key_size as usize)?;
    let mut key_reader = Reader::new(full_key);
    let key_type = key_reader.read_compact_size()?;
    let key = key_reader.read_bytes(key_reader.remaining())?.to_vec();
    let value = r.read_var_bytes()?.to_vec();
    Ok(Some((key_type, key, value)))
}

fn write_kv(w: &mut Writer, key_type: u64, key: &[u8], value: &[u8]) {
    let mut full_key = Writer::new();
    full_key.write_compact_size(key_type);
    full_key.write_bytes(key);
    w.write_var_bytes(full_key.as_bytes());
    w.write_var_bytes(value);
}

fn make_full_key(key_type: u64, key: &[u8]) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_compact_size(key_type);
    w.write_bytes(key);
    w.into_bytes()
}

fn split_full_key(full_key: &[u8]) -> Result<(u64, Vec<u8>), Error> {
    let mut r = Reader::new(full_key);
    let key_type = r.read_compact_size()?;
    let key = r.read_bytes(r.remaining())?.to_vec();
    Ok((key_type, key))
}

fn require_empty_key(key: &[u8], kind: &'static str) -> Result<(), Error> {
    if !key.is_empty() {
        return Err(Error::NonEmptyKey(kind));
    }
    Ok(())
}

fn require_pubkey_key(key: &[u8], kind: &'static str) -> Result<(), Error> {
    if key.len() != 33 && key.len() != 65 {
        return Err(Error::BadKeyLength {
            kind,
            len: key.len(),
        });
    }
    Ok(())
}

/// Parse a raw PSBT.
///
/// Two passes over the byte string: the first only locates the global
/// unsigned transaction, which fixes the number of input and output
/// sections; the second populates everything in order.
pub fn parse_psbt(raw: &[u8]) -> Result<PartialTransaction, Error> {
    if raw.len() < PSBT_MAGIC.len() || &raw[..PSBT_MAGIC.len()] != PSBT_MAGIC {
        return Err(Error::BadHeaderMagic);
    }
    let body = &raw[PSBT_MAGIC.len()..];

    // first pass
    let mut unsigned: Option<Transaction> = None;
    let mut r = Reader::new(body);
    while let Some((key_type, key, value)) = read_kv(&mut r)? {
        if key_type != global_type::UNSIGNED_TX {
            continue;
        }
        if unsigned.is_some() {
            return Err(Error::DuplicateKey("PSBT_GLOBAL_UNSIGNED_TX"));
        }
        require_empty_key(&key, "PSBT_GLOBAL_UNSIGNED_TX")?;
        let tx = Transaction::from_wire(&value).map_err(Error::Primitives)?;
        let has_scripts = tx.inputs().iter().any(|txin| {
            !txin.script_sig.as_deref().unwrap_or(&[]).is_empty() || txin.witness.is_some()
        });
        if has_scripts {
            return Err(Error::UnsignedTxHasScripts);
        }
        unsigned = Some(tx);
    }
    let unsigned = unsigned.ok_or(Error::MissingUnsignedTx)?;
    let mut tx = PartialTransaction::from_tx(&unsigned, true);

    // second pass
    let mut r = Reader::new(body);
    while let Some((key_type, key, value)) = read_kv(&mut r)? {
        match key_type {
            global_type::UNSIGNED_TX => {} // handled in the first pass
            global_type::XPUB => {
                let node = Bip32Node::from_bytes(&key)?;
                if tx.xpubs.contains_key(&node) {
                    return Err(Error::DuplicateKey("PSBT_GLOBAL_XPUB"));
                }
                let source = KeySource::from_bytes(&value)?;
                node.check_derivation(&source)?;
                tx.xpubs.insert(node, source);
            }
            global_type::VERSION => {
                if value.len() > 4 {
                    return Err(Error::BadValueLength {
                        kind: "PSBT_GLOBAL_VERSION",
                        len: value.len(),
                    });
                }
                let mut padded = [0u8; 8];
                padded[..value.len()].copy_from_slice(&value);
                let version = u64::from_le_bytes(padded);
                if version > 0 {
                    return Err(Error::UnsupportedVersion(version));
                }
                require_empty_key(&key, "PSBT_GLOBAL_VERSION")?;
            }
            other => {
                let full_key = make_full_key(other, &key);
                if tx.unknown.contains_key(&full_key) {
                    return Err(Error::DuplicateKey("unknown global type"));
                }
                tx.unknown.insert(full_key, value);
            }
        }
    }

    for idx in 0..tx.inputs().len() {
        parse_input_section(&mut r, &mut tx.inputs_mut()[idx])?;
    }
    for idx in 0..tx.outputs().len() {
        parse_output_section(&mut r, &mut tx.outputs_mut()[idx])?;
    }
    r.expect_end()?;

    for txin in tx.inputs() {
        txin.validate_data(false, false)?;
    }
    Ok(tx)
}

fn parse_input_section(r: &mut Reader<'_>, txin: &mut PartialInput) -> Result<(), Error> {
    while let Some((key_type, key, value)) = read_kv(r)? {
        match key_type {
            input_type::NON_WITNESS_UTXO => {
                if txin.utxo().is_some() {
                    return Err(Error::DuplicateKey("PSBT_IN_NON_WITNESS_UTXO"));
                }
                require_empty_key(&key, "PSBT_IN_NON_WITNESS_UTXO")?;
                let utxo = Transaction::from_wire(&value).map_err(Error::Primitives)?;
                txin.set_utxo(Some(utxo))?;
            }
            input_type::WITNESS_UTXO => {
                if txin.witness_utxo().is_some() {
                    return Err(Error::DuplicateKey("PSBT_IN_WITNESS_UTXO"));
                }
                require_empty_key(&key, "PSBT_IN_WITNESS_UTXO")?;
                let output = TxOutput::from_wire(&value).map_err(Error::Primitives)?;
                txin.set_witness_utxo(Some(output))?;
            }
            input_type::PARTIAL_SIG => {
                require_pubkey_key(&key, "PSBT_IN_PARTIAL_SIG")?;
                if txin.part_sigs.contains_key(&key) {
                    return Err(Error::DuplicateKey("PSBT_IN_PARTIAL_SIG"));
                }
                txin.part_sigs.insert(key, value);
            }
            input_type::SIGHASH_TYPE => {
                if txin.sighash.is_some() {
                    return Err(Error::DuplicateKey("PSBT_IN_SIGHASH_TYPE"));
                }
                require_empty_key(&key, "PSBT_IN_SIGHASH_TYPE")?;
                if value.len() != 4 {
                    return Err(Error::BadValueLength {
                        kind: "PSBT_IN_SIGHASH_TYPE",
                        len: value.len(),
                    });
                }
                let raw = u32::from_le_bytes(value[..4].try_into().expect("4 bytes"));
                txin.sighash = Some(Sighash::from_u32(raw).map_err(Error::Primitives)?);
            }
            input_type::REDEEM_SCRIPT => {
                if txin.redeem_script.is_some() {
                    return Err(Error::DuplicateKey("PSBT_IN_REDEEM_SCRIPT"));
                }
                require_empty_key(&key, "PSBT_IN_REDEEM_SCRIPT")?;
                txin.redeem_script = Some(value);
            }
            input_type::WITNESS_SCRIPT => {
                if txin.witness_script.is_some() {
                    return Err(Error::DuplicateKey("PSBT_IN_WITNESS_SCRIPT"));
                }
                require_empty_key(&key, "PSBT_IN_WITNESS_SCRIPT")?;
                txin.witness_script = Some(value);
            }
            input_type::BIP32_DERIVATION => {
                require_pubkey_key(&key, "PSBT_IN_BIP32_DERIVATION")?;
                if txin.bip32_paths.contains_key(&key) {
                    return Err(Error::DuplicateKey("PSBT_IN_BIP32_DERIVATION"));
                }
                txin.bip32_paths.insert(key, KeySource::from_bytes(&value)?);
            }
            input_type::FINAL_SCRIPTSIG => {
                if txin.script_sig.is_some() {
                    return Err(Error::DuplicateKey("PSBT_IN_FINAL_SCRIPTSIG"));
                }
                require_empty_key(&key, "PSBT_IN_FINAL_SCRIPTSIG")?;
                txin.script_sig = Some(value);
            }
            input_type::FINAL_SCRIPTWITNESS => {
                if txin.witness.is_some() {
                    return Err(Error::DuplicateKey("PSBT_IN_FINAL_SCRIPTWITNESS"));
                }
                require_empty_key(&key, "PSBT_IN_FINAL_SCRIPTWITNESS")?;
                txin.witness = Some(value);
            }
            other => {
                let full_key = make_full_key(other, &key);
                if txin.unknown.contains_key(&full_key) {
                    return Err(Error::DuplicateKey("unknown input type"));
                }
                txin.unknown.insert(full_key, value);
            }
        }
    }
    Ok(())
}

fn parse_output_section(r: &mut Reader<'_>, txout: &mut PartialOutput) -> Result<(), Error> {
    while let Some((key_type, key, value)) = read_kv(r)? {
        match key_type {
            output_type::REDEEM_SCRIPT => {
                if txout.redeem_script.is_some() {
                    return Err(Error::DuplicateKey("PSBT_OUT_REDEEM_SCRIPT"));
                }
                require_empty_key(&key, "PSBT_OUT_REDEEM_SCRIPT")?;
                txout.redeem_script = Some(value);
            }
            output_type::WITNESS_SCRIPT => {
                if txout.witness_script.is_some() {
                    return Err(Error::DuplicateKey("PSBT_OUT_WITNESS_SCRIPT"));
                }
                require_empty_key(&key, "PSBT_OUT_WITNESS_SCRIPT")?;
                txout.witness_script = Some(value);
            }
            output_type::BIP32_DERIVATION => {
                require_pubkey_key(&key, "PSBT_OUT_BIP32_DERIVATION")?;
                if txout.bip32_paths.contains_key(&key) {
                    return Err(Error::DuplicateKey("PSBT_OUT_BIP32_DERIVATION"));
                }
                txout
                    .bip32_paths
                    .insert(key, KeySource::from_bytes(&value)?);
            }
            other => {
                let full_key = make_full_key(other, &key);
                if txout.unknown.contains_key(&full_key) {
                    return Err(Error::DuplicateKey("unknown output type"));
                }
                txout.unknown.insert(full_key, value);
            }
        }
    }
    Ok(())
}

/// Deterministic PSBT serialization: known fields in a fixed order,
/// multi-entry maps sorted by key bytes.
pub fn serialize_psbt(tx: &PartialTransaction) -> Result<Vec<u8>, Error> {
    let mut w = Writer::new();
    w.write_bytes(PSBT_MAGIC);

    // global section
    let unsigned = tx.serialize_to_network(false, true)?;
    write_kv(&mut w, global_type::UNSIGNED_TX, &[], &unsigned);
    for (node, source) in &tx.xpubs {
        write_kv(&mut w, global_type::XPUB, &node.to_bytes(), &source.to_bytes());
    }
    for (full_key, value) in &tx.unknown {
        let (key_type, key) = split_full_key(full_key)?;
        write_kv(&mut w, key_type, &key, value);
    }
    w.write_u8(0x00); // section separator

    for txin in tx.inputs() {
        serialize_input_section(&mut w, txin)?;
        w.write_u8(0x00);
    }
    for txout in tx.outputs() {
        serialize_output_section(&mut w, txout)?;
        w.write_u8(0x00);
    }
    Ok(w.into_bytes())
}

fn serialize_input_section(w: &mut Writer, txin: &PartialInput) -> Result<(), Error> {
    if let Some(witness_utxo) = txin.witness_utxo() {
        let bytes = witness_utxo.to_wire().map_err(Error::Primitives)?;
        write_kv(w, input_type::WITNESS_UTXO, &[], &bytes);
    }
    if let Some(utxo) = txin.utxo() {
        let bytes = utxo.serialize().map_err(Error::Primitives)?;
        write_kv(w, input_type::NON_WITNESS_UTXO, &[], &bytes);
    }
    for (pubkey, sig) in &txin.part_sigs {
        write_kv(w, input_type::PARTIAL_SIG, pubkey, sig);
    }
    if let Some(sighash) = txin.sighash {
        write_kv(
            w,
            input_type::SIGHASH_TYPE,
            &[],
            &sighash.to_u32().to_le_bytes(),
        );
    }
    if let Some(redeem_script) = &txin.redeem_script {
        write_kv(w, input_type::REDEEM_SCRIPT, &[], redeem_script);
    }
    if let Some(witness_script) = &txin.witness_script {
        write_kv(w, input_type::WITNESS_SCRIPT, &[], witness_script);
    }
    for (pubkey, source) in &txin.bip32_paths {
        write_kv(w, input_type::BIP32_DERIVATION, pubkey, &source.to_bytes());
    }
    if let Some(script_sig) = &txin.script_sig {
        write_kv(w, input_type::FINAL_SCRIPTSIG, &[], script_sig);
    }
    if let Some(witness) = &txin.witness {
        write_kv(w, input_type::FINAL_SCRIPTWITNESS, &[], witness);
    }
    for (full_key, value) in &txin.unknown {
        let (key_type, key) = split_full_key(full_key)?;
        write_kv(w, key_type, &key, value);
    }
    Ok(())
}

fn serialize_output_section(w: &mut Writer, txout: &PartialOutput) -> Result<(), Error> {
    if let Some(redeem_script) = &txout.redeem_script {
        write_kv(w, output_type::REDEEM_SCRIPT, &[], redeem_script);
    }
    if let Some(witness_script) = &txout.witness_script {
        write_kv(w, output_type::WITNESS_SCRIPT, &[], witness_script);
    }
    for (pubkey, source) in &txout.bip32_paths {
        write_kv(w, output_type::BIP32_DERIVATION, pubkey, &source.to_bytes());
    }
    for (full_key, value) in &txout.unknown {
        let (key_type, key) = split_full_key(full_key)?;
        write_kv(w, key_type, &key, value);
    }
    Ok(())
}
