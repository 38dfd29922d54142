//! Signature pre-image construction, legacy and segwit v0.

use corvus_codec::Writer;
use corvus_crypto::hash::{sha256d, Hash};
use corvus_primitives::{Sighash, SighashBase};
use corvus_script::builder::{multisig_script, p2pk_script, p2pkh_script_for_pubkey};
use corvus_script::opcodes::OP_CODESEPARATOR;
use corvus_script::{instructions, ScriptType};

use crate::input::PartialInput;
use crate::tx::PartialTransaction;
use crate::Error;

/// The three digests shared by every input's segwit pre-image, computed
/// once per signing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bip143SharedFields {
    pub hash_prevouts: Hash<32>,
    pub hash_sequence: Hash<32>,
    pub hash_outputs: Hash<32>,
}

fn reject_code_separator(script: &[u8]) -> Result<(), Error> {
    for step in instructions(script) {
        let ins = step?;
        if ins.opcode == OP_CODESEPARATOR {
            return Err(Error::CodeSeparator);
        }
    }
    Ok(())
}

impl PartialTransaction {
    pub fn bip143_shared_fields(&self) -> Result<Bip143SharedFields, Error> {
        let mut prevouts = Writer::new();
        let mut sequences = Writer::new();
        let mut outputs = Writer::new();
        for txin in self.inputs() {
            txin.prevout.write(&mut prevouts);
            sequences.write_u32(txin.sequence);
        }
        for txout in self.outputs() {
            txout.to_txout().write(&mut outputs).map_err(Error::Primitives)?;
        }
        Ok(Bip143SharedFields {
            hash_prevouts: sha256d(prevouts.as_bytes()),
            hash_sequence: sha256d(sequences.as_bytes()),
            hash_outputs: sha256d(outputs.as_bytes()),
        })
    }

    /// The script an input's signature commits to.
    ///
    /// Witness script and (for legacy spends) redeem script take
    /// priority, both refused when they contain `OP_CODESEPARATOR`.
    /// Otherwise the standard locking script for the input's type is
    /// rebuilt from its pubkeys; asset-funded inputs get the transfer
    /// suffix for their value appended, and a per-outpoint override, when
    /// configured, replaces the computed script entirely.
    pub fn preimage_script(&self, txin: &PartialInput) -> Result<Vec<u8>, Error> {
        if let Some(witness_script) = &txin.witness_script {
            reject_code_separator(witness_script)?;
            return Ok(witness_script.clone());
        }
        if !txin.is_segwit(false) {
            if let Some(redeem_script) = &txin.redeem_script {
                reject_code_separator(redeem_script)?;
                return Ok(redeem_script.clone());
            }
        }

        let script = match txin.script_type {
            Some(ScriptType::P2sh | ScriptType::P2wsh | ScriptType::P2wshP2sh) => {
                multisig_script(&txin.pubkeys, txin.num_sig)?
            }
            Some(ScriptType::P2pkh | ScriptType::P2wpkh | ScriptType::P2wpkhP2sh) => {
                let pubkey = txin
                    .pubkeys
                    .first()
                    .ok_or(Error::UnknownTxinType(txin.script_type))?;
                p2pkh_script_for_pubkey(pubkey)
            }
            Some(ScriptType::P2pk) => {
                let pubkey = txin
                    .pubkeys
                    .first()
                    .ok_or(Error::UnknownTxinType(txin.script_type))?;
                p2pk_script(pubkey)
            }
            _ => return Err(Error::UnknownTxinType(txin.script_type)),
        };

        let script = match txin.value() {
            Some(value) if !value.assets.is_empty() => {
                let (name, amount) = value.assets.iter().next().expect("non-empty");
                corvus_script::asset::with_transfer_suffix(&script, name, *amount)
            }
            _ => script,
        };

        Ok(self
            .prevout_overrides
            .get(&txin.prevout)
            .cloned()
            .unwrap_or(script))
    }

    /// Serialize the pre-image for input `idx` under its effective
    /// sighash (defaulting to ALL).
    pub fn serialize_preimage(
        &self,
        idx: usize,
        shared: Option<&Bip143SharedFields>,
    ) -> Result<Vec<u8>, Error> {
        let txin = self
            .inputs()
            .get(idx)
            .ok_or(Error::InputIndexOutOfRange(idx))?;
        let sighash = txin.sighash.unwrap_or_default();
        let preimage_script = self.preimage_script(txin)?;
        log::debug!(
            "preimage script for input {}: {}",
            txin.prevout,
            hex::encode(&preimage_script),
        );

        let mut w = Writer::new();
        w.write_i32(self.version());

        if txin.is_segwit(false) {
            self.write_segwit_preimage(&mut w, idx, sighash, &preimage_script, shared)?;
        } else {
            self.write_legacy_preimage(&mut w, idx, sighash, &preimage_script)?;
        }

        w.write_u32(self.locktime());
        w.write_u32(sighash.to_u32());
        Ok(w.into_bytes())
    }

    /// Double-SHA256 of the pre-image: the digest handed to the signer.
    pub fn preimage_hash(
        &self,
        idx: usize,
        shared: Option<&Bip143SharedFields>,
    ) -> Result<Hash<32>, Error> {
        Ok(sha256d(&self.serialize_preimage(idx, shared)?))
    }

    fn write_segwit_preimage(
        &self,
        w: &mut Writer,
        idx: usize,
        sighash: Sighash,
        preimage_script: &[u8],
        shared: Option<&Bip143SharedFields>,
    ) -> Result<(), Error> {
        let computed;
        let shared = match shared {
            Some(shared) => shared,
            None => {
                computed = self.bip143_shared_fields()?;
                &computed
            }
        };
        let txin = &self.inputs()[idx];
        let zero = Hash::<32>::default();

        let hash_prevouts = if sighash.anyone_can_pay {
            zero
        } else {
            shared.hash_prevouts
        };
        let hash_sequence = if !sighash.anyone_can_pay
            && sighash.base != SighashBase::Single
            && sighash.base != SighashBase::None
        {
            shared.hash_sequence
        } else {
            zero
        };
        let hash_outputs = if sighash.base != SighashBase::Single
            && sighash.base != SighashBase::None
        {
            shared.hash_outputs
        } else if sighash.base == SighashBase::Single && idx < self.outputs().len() {
            let spent = self.outputs()[idx].to_txout();
            sha256d(&spent.to_wire().map_err(Error::Primitives)?)
        } else {
            zero
        };

        w.write_bytes(hash_prevouts.as_ref());
        w.write_bytes(hash_sequence.as_ref());
        txin.prevout.write(w);
        w.write_var_bytes(preimage_script);
        let amount = txin.value().ok_or(Error::MissingInputAmount)?.rvn;
        w.write_u64(amount);
        w.write_u32(txin.sequence);
        w.write_bytes(hash_outputs.as_ref());
        Ok(())
    }

    fn write_legacy_preimage(
        &self,
        w: &mut Writer,
        idx: usize,
        sighash: Sighash,
        preimage_script: &[u8],
    ) -> Result<(), Error> {
        let inputs = self.inputs();
        let mask_sequence =
            sighash.base == SighashBase::None || sighash.base == SighashBase::Single;

        if sighash.anyone_can_pay {
            let txin = &inputs[idx];
            w.write_compact_size(1);
            txin.prevout.write(w);
            w.write_var_bytes(preimage_script);
            w.write_u32(txin.sequence);
        } else {
            w.write_compact_size(inputs.len() as u64);
            for (k, txin) in inputs.iter().enumerate() {
                txin.prevout.write(w);
                if k == idx {
                    w.write_var_bytes(preimage_script);
                } else {
                    w.write_var_bytes(&[]);
                }
                let sequence = if mask_sequence && k != idx {
                    0
                } else {
                    txin.sequence
                };
                w.write_u32(sequence);
            }
        }

        match sighash.base {
            SighashBase::None => w.write_compact_size(0),
            SighashBase::Single => {
                if idx >= self.outputs().len() {
                    return Err(Error::SingleWithoutMatchingOutput(idx));
                }
                w.write_compact_size(idx as u64 + 1);
                for _ in 0..idx {
                    // blanked: maximal value, empty script
                    w.write_u64(u64::MAX);
                    w.write_var_bytes(&[]);
                }
                self.outputs()[idx]
                    .to_txout()
                    .write(w)
                    .map_err(Error::Primitives)?;
            }
            SighashBase::All => {
                w.write_compact_size(self.outputs().len() as u64);
                for txout in self.outputs() {
                    txout.to_txout().write(w).map_err(Error::Primitives)?;
                }
            }
        }
        Ok(())
    }
}
