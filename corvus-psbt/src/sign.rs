//! The signing engine: keypair-table signing and external-signature
//! import.

use std::collections::BTreeMap;

use corvus_crypto::sign::{EcdsaSigner, EcdsaVerifier};
use log::{debug, info};

use crate::preimage::Bip143SharedFields;
use crate::tx::PartialTransaction;
use crate::Error;

/// `pubkey -> (secret key bytes, is_compressed)`.
pub type Keypairs = BTreeMap<Vec<u8>, (Vec<u8>, bool)>;

#[derive(Debug, Clone, Copy, Default)]
pub struct SignOptions {
    /// Enforce the BIP-174 rule that an input described only by a
    /// witness UTXO must not receive a non-witness signature. Off by
    /// default: the relaxed behavior signs such inputs anyway, accepting
    /// that a malicious PSBT could overstate their amounts and burn the
    /// difference as fees.
    pub strict_witness_utxo: bool,
}

impl PartialTransaction {
    /// Sign every input for which a matching key is supplied; inputs
    /// without one are skipped.
    pub fn sign(
        &mut self,
        keypairs: &Keypairs,
        signer: &impl EcdsaSigner,
        options: &SignOptions,
    ) -> Result<(), Error> {
        let shared = self.bip143_shared_fields().ok();
        for idx in 0..self.inputs().len() {
            let pubkeys = self.inputs()[idx].pubkeys.clone();
            for pubkey in pubkeys {
                if self.inputs()[idx].is_complete() {
                    break;
                }
                let Some((secret, _compressed)) = keypairs.get(&pubkey) else {
                    continue;
                };
                info!("adding signature for {}", hex::encode(&pubkey));
                let sig = self.sign_txin(idx, secret, signer, shared.as_ref(), options)?;
                self.add_signature_to_txin(idx, pubkey.clone(), sig);
            }
        }
        debug!("is_complete {}", self.is_complete());
        self.invalidate_ser_cache();
        Ok(())
    }

    /// Produce one input's signature (sighash byte appended), without
    /// storing it.
    pub fn sign_txin(
        &self,
        idx: usize,
        secret: &[u8],
        signer: &impl EcdsaSigner,
        shared: Option<&Bip143SharedFields>,
        options: &SignOptions,
    ) -> Result<Vec<u8>, Error> {
        let txin = self
            .inputs()
            .get(idx)
            .ok_or(Error::InputIndexOutOfRange(idx))?;
        txin.validate_data(true, options.strict_witness_utxo)?;
        let sighash = txin.sighash.unwrap_or_default();
        let digest = self.preimage_hash(idx, shared)?;
        let mut sig = signer.sign(secret, &digest)?;
        sig.push(sighash.to_byte());
        Ok(sig)
    }

    /// Store a signature under its pubkey, clearing the final scripts so
    /// they get rebuilt.
    pub fn add_signature_to_txin(&mut self, idx: usize, pubkey: Vec<u8>, sig: Vec<u8>) {
        let txin = &mut self.inputs_mut()[idx];
        txin.part_sigs.insert(pubkey, sig);
        // force re-serialization
        txin.script_sig = None;
        txin.witness = None;
        self.invalidate_ser_cache();
    }

    /// Import signatures produced by an external signer, one per input
    /// in input order (hardware wallets hand them back like this). The
    /// signing pubkey is recovered from each signature and must be among
    /// the input's known pubkeys.
    pub fn update_signatures(
        &mut self,
        signatures: &[Vec<u8>],
        verifier: &impl EcdsaVerifier,
    ) -> Result<(), Error> {
        if self.is_complete() {
            return Ok(());
        }
        if signatures.len() != self.inputs().len() {
            return Err(Error::SignatureCountMismatch {
                expected: self.inputs().len(),
                got: signatures.len(),
            });
        }
        for idx in 0..self.inputs().len() {
            let sig = &signatures[idx];
            if sig.is_empty() {
                continue;
            }
            if self.inputs()[idx].part_sigs.values().any(|have| have == sig) {
                continue;
            }
            let digest = self.preimage_hash(idx, None)?;
            let der_sig = &sig[..sig.len() - 1];
            for recid in 0..4u8 {
                // the candidate point may not be on the curve for some
                // recid values
                let Some(pubkey) = verifier.recover(der_sig, recid, &digest) else {
                    continue;
                };
                if !self.inputs()[idx].pubkeys.contains(&pubkey) {
                    continue;
                }
                if !verifier.verify(&pubkey, der_sig, &digest) {
                    continue;
                }
                info!(
                    "adding sig: txin_idx={idx}, signing_pubkey={}",
                    hex::encode(&pubkey),
                );
                self.add_signature_to_txin(idx, pubkey, sig.clone());
                break;
            }
        }
        self.invalidate_ser_cache();
        Ok(())
    }
}
