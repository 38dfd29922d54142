//! PSBT codec and lifecycle tests: round trips, combine, join, finalize.

use std::collections::BTreeMap;

use corvus_codec::Writer;
use corvus_crypto::hash::{sha256, Hash};
use corvus_crypto::sign::{EcdsaSigner, SignError};
use corvus_primitives::{Outpoint, Transaction, TxInput, TxOutput};
use corvus_psbt::bip32::{Bip32Node, KeySource};
use corvus_psbt::{
    parse_psbt, serialize_psbt, tx_from_any_bytes, AnyTx, Error, PartialInput, PartialOutput,
    PartialTransaction, SignOptions, TxOptions,
};
use corvus_script::builder::{
    build_witness, multisig_script, p2pkh_script_for_pubkey, p2wsh_script,
};
use corvus_script::ScriptType;

struct StubSigner;

impl EcdsaSigner for StubSigner {
    fn sign(&self, secret: &[u8], digest: &Hash<32>) -> Result<Vec<u8>, SignError> {
        let r = sha256(&[secret, digest.as_ref()].concat());
        let s = sha256(r.as_ref());
        let mut sig = vec![0x30, 0x44, 0x02, 0x20];
        sig.extend_from_slice(r.as_ref());
        sig.extend_from_slice(&[0x02, 0x20]);
        sig.extend_from_slice(s.as_ref());
        Ok(sig)
    }
}

fn pubkey(tag: u8) -> Vec<u8> {
    let mut pk = vec![0x03; 33];
    pk[1] = tag;
    pk
}

fn simple_partial() -> PartialTransaction {
    let mut input = PartialInput::new(Outpoint::new(sha256(b"funding"), 0));
    input.script_type = Some(ScriptType::P2pkh);
    input.pubkeys = vec![pubkey(1)];
    input.trusted_value = Some(corvus_primitives::RvnValue::from_sats(100_000));
    let output = PartialOutput::new(p2pkh_script_for_pubkey(&pubkey(2)), 95_000u64);
    PartialTransaction::from_io(vec![input], vec![output], TxOptions::default())
}

/// 2-of-3 p2wsh setup: the witness script, the funding output and an
/// unsigned partial transaction spending it.
fn multisig_partial() -> (PartialTransaction, Vec<Vec<u8>>) {
    let pubkeys: Vec<Vec<u8>> = (1..=3).map(pubkey).collect();
    let witness_script = multisig_script(&pubkeys, 2).unwrap();
    let funding_script = p2wsh_script(&sha256(&witness_script));

    let mut input = PartialInput::new(Outpoint::new(sha256(b"multisig-funding"), 1));
    input.script_type = Some(ScriptType::P2wsh);
    input.num_sig = 2;
    input.pubkeys = pubkeys.clone();
    input.witness_script = Some(witness_script);
    input
        .set_witness_utxo(Some(TxOutput::new(funding_script, 1_000_000u64)))
        .unwrap();

    let output = PartialOutput::new(p2pkh_script_for_pubkey(&pubkey(9)), 990_000u64);
    let tx = PartialTransaction::from_io(vec![input], vec![output], TxOptions::default());
    (tx, pubkeys)
}

fn sign_with(tx: &PartialTransaction, pubkey: &[u8], secret: u8) -> PartialTransaction {
    let mut signed = tx.clone();
    let mut keypairs = BTreeMap::new();
    keypairs.insert(pubkey.to_vec(), (vec![secret; 32], true));
    signed
        .sign(&keypairs, &StubSigner, &SignOptions::default())
        .unwrap();
    signed
}

#[test]
fn psbt_round_trip_preserves_unknown_records() {
    let mut tx = simple_partial();
    // unknown global key type 0xaa with an empty key
    tx.unknown.insert(vec![0xaa], vec![0xde, 0xad, 0xbe, 0xef]);
    // unknown input record with key data
    tx.inputs_mut()[0]
        .unknown
        .insert(vec![0xfc, 0x01], vec![0x42]);
    tx.outputs_mut()[0]
        .unknown
        .insert(vec![0xf0], vec![0x00, 0x11]);

    let bytes = serialize_psbt(&tx).unwrap();
    let parsed = parse_psbt(&bytes).unwrap();

    assert_eq!(
        parsed.unknown.get(&vec![0xaa_u8]),
        Some(&vec![0xde, 0xad, 0xbe, 0xef]),
    );
    assert_eq!(parsed.inputs()[0].unknown.get(&vec![0xfc_u8, 0x01]), Some(&vec![0x42]));
    assert_eq!(
        parsed.outputs()[0].unknown.get(&vec![0xf0_u8]),
        Some(&vec![0x00, 0x11]),
    );

    // byte-identical re-serialization
    assert_eq!(serialize_psbt(&parsed).unwrap(), bytes);
}

#[test]
fn psbt_round_trip_preserves_signing_metadata() {
    let (tx, pubkeys) = multisig_partial();
    let signed = sign_with(&tx, &pubkeys[0], 0x41);

    let bytes = serialize_psbt(&signed).unwrap();
    let parsed = parse_psbt(&bytes).unwrap();

    assert_eq!(parsed.inputs()[0].part_sigs.len(), 1);
    assert_eq!(
        parsed.inputs()[0].witness_script,
        signed.inputs()[0].witness_script,
    );
    assert_eq!(
        parsed.inputs()[0].witness_utxo(),
        signed.inputs()[0].witness_utxo(),
    );
    assert_eq!(parsed.inputs()[0].sighash, None);
    assert_eq!(serialize_psbt(&parsed).unwrap(), bytes);
}

#[test]
fn global_xpubs_round_trip() {
    let mut tx = simple_partial();
    let node = Bip32Node {
        version: 0x0488b21e,
        depth: 1,
        parent_fingerprint: [0xde, 0xad, 0xbe, 0xef],
        child_number: 0x8000_0000,
        chain_code: [0x07; 32],
        pubkey: {
            let mut pk = [0x02; 33];
            pk[1] = 0x99;
            pk
        },
    };
    let source = KeySource {
        fingerprint: [1, 2, 3, 4],
        path: vec![0x8000_0000],
    };
    tx.xpubs.insert(node.clone(), source.clone());

    let bytes = serialize_psbt(&tx).unwrap();
    let parsed = parse_psbt(&bytes).unwrap();
    assert_eq!(parsed.xpubs.get(&node), Some(&source));
    assert_eq!(serialize_psbt(&parsed).unwrap(), bytes);
}

#[test]
fn multisig_two_rounds_combine_and_finalize() {
    let (tx, pubkeys) = multisig_partial();

    // two signers work from separate copies
    let round_one = sign_with(&tx, &pubkeys[0], 0x41);
    let round_two = sign_with(&tx, &pubkeys[2], 0x43);

    assert!(!round_one.is_complete());
    assert_eq!(round_one.signature_count(), (1, 2));

    let mut combined = round_one.clone();
    combined.combine_with(&round_two).unwrap();
    assert!(combined.is_complete());

    // combine finalized the input: scripts set, metadata cleared
    let input = &combined.inputs()[0];
    assert!(input.script_sig.is_some());
    assert!(input.witness.is_some());
    assert!(input.part_sigs.is_empty());
    assert!(input.witness_script.is_none());

    // the network transaction parses and re-serializes identically
    let mut combined = combined;
    let network = combined.serialize_as_bytes(false).unwrap();
    let reparsed = Transaction::from_wire(&network).unwrap();
    assert_eq!(reparsed.serialize().unwrap(), network);

    // witness: dummy, two signatures, witness script
    let witness = reparsed.inputs()[0].witness_elements().unwrap();
    assert_eq!(witness.len(), 4);
    assert!(witness[0].is_empty());
    assert_eq!(witness[3], multisig_script(&pubkeys, 2).unwrap());

    // signature count invariants: one missing signer leaves the tx
    // incomplete, a third signature is not required
    assert_eq!(sign_with(&tx, &pubkeys[1], 0x42).signature_count(), (1, 2));
}

#[test]
fn combine_is_idempotent_and_commutative() {
    let (tx, pubkeys) = multisig_partial();
    let a = sign_with(&tx, &pubkeys[0], 0x41);
    let b = sign_with(&tx, &pubkeys[1], 0x42);

    // identity on an incomplete PSBT
    let mut aa = a.clone();
    aa.combine_with(&a).unwrap();
    assert_eq!(
        serialize_psbt(&aa).unwrap(),
        serialize_psbt(&a).unwrap(),
    );

    // commutativity
    let mut ab = a.clone();
    ab.combine_with(&b).unwrap();
    let mut ba = b.clone();
    ba.combine_with(&a).unwrap();
    assert_eq!(
        serialize_psbt(&ab).unwrap(),
        serialize_psbt(&ba).unwrap(),
    );
}

#[test]
fn combine_rejects_different_transactions() {
    let (tx, _) = multisig_partial();
    let other = simple_partial();
    let mut combined = tx.clone();
    assert_eq!(
        combined.combine_with(&other).unwrap_err(),
        Error::CombineMismatch,
    );
}

#[test]
fn join_concatenates_and_clears_signatures() {
    let (tx, pubkeys) = multisig_partial();
    let signed = sign_with(&tx, &pubkeys[0], 0x41);
    let other = simple_partial();

    let mut joined = signed.clone();
    joined.join_with(&other, None).unwrap();

    assert_eq!(joined.inputs().len(), 2);
    assert_eq!(joined.outputs().len(), 2);
    // the prevout sets united
    let mut prevouts: Vec<Outpoint> = joined.inputs().iter().map(|i| i.prevout).collect();
    prevouts.sort();
    let mut expected: Vec<Outpoint> = signed
        .inputs()
        .iter()
        .chain(other.inputs())
        .map(|i| i.prevout)
        .collect();
    expected.sort();
    assert_eq!(prevouts, expected);
    // all signatures cleared
    assert!(joined.inputs().iter().all(|i| i.part_sigs.is_empty()));

    // overlapping spends cannot be joined
    let mut again = joined.clone();
    assert!(matches!(
        again.join_with(&other, None).unwrap_err(),
        Error::DuplicatePrevout(_),
    ));
}

#[test]
fn finalize_is_idempotent() {
    let (tx, pubkeys) = multisig_partial();
    let mut complete = sign_with(&tx, &pubkeys[0], 0x41);
    let second = sign_with(&tx, &pubkeys[1], 0x42);
    complete.combine_with(&second).unwrap();

    complete.finalize_psbt().unwrap();
    let once = serialize_psbt(&complete).unwrap();
    complete.finalize_psbt().unwrap();
    assert_eq!(serialize_psbt(&complete).unwrap(), once);

    // a finalized incomplete input stays untouched
    let mut incomplete = sign_with(&tx, &pubkeys[0], 0x41);
    incomplete.finalize_psbt().unwrap();
    assert!(!incomplete.is_complete());
    assert_eq!(incomplete.inputs()[0].part_sigs.len(), 1);
}

#[test]
fn auto_detection_distinguishes_psbt_and_network_tx() {
    let (tx, pubkeys) = multisig_partial();
    let psbt_bytes = serialize_psbt(&tx).unwrap();
    assert!(matches!(
        tx_from_any_bytes(&psbt_bytes).unwrap(),
        AnyTx::Partial(_),
    ));

    let mut complete = sign_with(&tx, &pubkeys[0], 0x41);
    let second = sign_with(&tx, &pubkeys[1], 0x42);
    complete.combine_with(&second).unwrap();
    let network_bytes = complete.serialize_as_bytes(false).unwrap();
    assert!(matches!(
        tx_from_any_bytes(&network_bytes).unwrap(),
        AnyTx::Network(_),
    ));

    // base64 text form round-trips through the auto-detection
    let text = tx.to_base64().unwrap();
    assert!(text.starts_with("cHNidP"));
    match corvus_psbt::tx_from_any(&text).unwrap() {
        AnyTx::Partial(parsed) => {
            assert_eq!(serialize_psbt(&parsed).unwrap(), psbt_bytes);
        }
        AnyTx::Network(_) => panic!("expected a PSBT"),
    }
}

#[test]
fn qr_data_collapses_utxos() {
    // an input carrying a full funding transaction
    let funding_output = TxOutput::new(p2pkh_script_for_pubkey(&pubkey(1)), 40_000u64);
    let mut coinbase = TxInput::new(Outpoint::new(Hash::default(), 0xffff_ffff));
    coinbase.script_sig = Some(vec![0x01, 0x02]);
    let funding = Transaction::new(vec![coinbase], vec![funding_output.clone()]).unwrap();

    let mut input = PartialInput::new(Outpoint::new(funding.txid().unwrap(), 0));
    input.script_type = Some(ScriptType::P2pkh);
    input.pubkeys = vec![pubkey(1)];
    input.set_utxo(Some(funding)).unwrap();

    let output = PartialOutput::new(p2pkh_script_for_pubkey(&pubkey(2)), 39_000u64);
    let tx = PartialTransaction::from_io(vec![input], vec![output], TxOptions::default());

    let qr = tx.to_qr_data().unwrap();
    let bytes = corvus_codec::base43::decode(&qr).unwrap();
    let parsed = match tx_from_any_bytes(&bytes).unwrap() {
        AnyTx::Partial(parsed) => parsed,
        AnyTx::Network(_) => panic!("expected a PSBT"),
    };
    // the full funding tx was collapsed into a witness UTXO
    assert!(parsed.inputs()[0].utxo().is_none());
    assert_eq!(parsed.inputs()[0].witness_utxo(), Some(&funding_output));
}

#[test]
fn mismatching_non_witness_utxo_fails_consistency() {
    // a funding tx that does NOT match the prevout txid below
    let unrelated = {
        let mut txin = TxInput::new(Outpoint::new(sha256(b"x"), 0));
        txin.script_sig = Some(vec![]);
        Transaction::new(
            vec![txin],
            vec![TxOutput::new(p2pkh_script_for_pubkey(&pubkey(5)), 1_000u64)],
        )
        .unwrap()
    };

    // direct assignment fails and leaves the input untouched
    let mut input = PartialInput::new(Outpoint::new(sha256(b"not-that-tx"), 0));
    let err = input.set_utxo(Some(unrelated.clone())).unwrap_err();
    assert!(matches!(err, Error::InputConsistency(_)));
    assert!(input.utxo().is_none());

    // ... and so does parsing a PSBT carrying the same mismatch
    let unsigned = {
        let mut txin = TxInput::new(Outpoint::new(sha256(b"not-that-tx"), 0));
        txin.script_sig = Some(vec![]);
        Transaction::new(
            vec![txin],
            vec![TxOutput::new(p2pkh_script_for_pubkey(&pubkey(6)), 900u64)],
        )
        .unwrap()
    };

    let mut w = Writer::new();
    w.write_bytes(b"psbt\xff");
    // global: unsigned tx, then terminator
    write_kv(&mut w, 0x00, &[], &unsigned.serialize_to_network(false, true).unwrap());
    w.write_u8(0x00);
    // input section: the mismatching non-witness utxo
    write_kv(&mut w, 0x00, &[], &unrelated.serialize().unwrap());
    w.write_u8(0x00);
    // output section: empty
    w.write_u8(0x00);

    assert!(matches!(
        parse_psbt(w.as_bytes()).unwrap_err(),
        Error::InputConsistency(_),
    ));
}

#[test]
fn malformed_psbt_framing_is_rejected() {
    let unsigned = {
        let mut txin = TxInput::new(Outpoint::new(sha256(b"a"), 0));
        txin.script_sig = Some(vec![]);
        Transaction::new(
            vec![txin],
            vec![TxOutput::new(p2pkh_script_for_pubkey(&pubkey(7)), 10u64)],
        )
        .unwrap()
    };
    let unsigned_bytes = unsigned.serialize_to_network(false, true).unwrap();

    // unsigned tx twice
    let mut w = Writer::new();
    w.write_bytes(b"psbt\xff");
    write_kv(&mut w, 0x00, &[], &unsigned_bytes);
    write_kv(&mut w, 0x00, &[], &unsigned_bytes);
    w.write_u8(0x00);
    w.write_u8(0x00);
    w.write_u8(0x00);
    assert_eq!(
        parse_psbt(w.as_bytes()).unwrap_err(),
        Error::DuplicateKey("PSBT_GLOBAL_UNSIGNED_TX"),
    );

    // version record with a non-zero version
    let mut w = Writer::new();
    w.write_bytes(b"psbt\xff");
    write_kv(&mut w, 0x00, &[], &unsigned_bytes);
    write_kv(&mut w, 0xfb, &[], &[0x01, 0x00, 0x00, 0x00]);
    w.write_u8(0x00);
    w.write_u8(0x00);
    w.write_u8(0x00);
    assert_eq!(
        parse_psbt(w.as_bytes()).unwrap_err(),
        Error::UnsupportedVersion(1),
    );

    // partial-sig record with an empty key
    let mut w = Writer::new();
    w.write_bytes(b"psbt\xff");
    write_kv(&mut w, 0x00, &[], &unsigned_bytes);
    w.write_u8(0x00);
    write_kv(&mut w, 0x02, &[], &[0x30, 0x44]);
    w.write_u8(0x00);
    w.write_u8(0x00);
    assert!(matches!(
        parse_psbt(w.as_bytes()).unwrap_err(),
        Error::BadKeyLength { .. },
    ));

    // trailing junk after the last section
    let mut w = Writer::new();
    w.write_bytes(b"psbt\xff");
    write_kv(&mut w, 0x00, &[], &unsigned_bytes);
    w.write_u8(0x00);
    w.write_u8(0x00);
    w.write_u8(0x00);
    w.write_u8(0x99);
    assert_eq!(
        parse_psbt(w.as_bytes()).unwrap_err(),
        Error::Codec(corvus_codec::Error::TrailingJunk),
    );

    // an unsigned tx that still carries scripts
    let mut signed_tx = unsigned;
    signed_tx.inputs_mut()[0].script_sig = Some(vec![0x51]);
    let mut w = Writer::new();
    w.write_bytes(b"psbt\xff");
    write_kv(&mut w, 0x00, &[], &signed_tx.serialize_to_network(true, true).unwrap());
    w.write_u8(0x00);
    w.write_u8(0x00);
    w.write_u8(0x00);
    assert_eq!(
        parse_psbt(w.as_bytes()).unwrap_err(),
        Error::UnsignedTxHasScripts,
    );
}

#[test]
fn remove_signatures_returns_to_unsigned() {
    let (tx, pubkeys) = multisig_partial();
    let mut signed = sign_with(&tx, &pubkeys[0], 0x41);
    signed.remove_signatures();
    assert_eq!(
        serialize_psbt(&signed).unwrap(),
        serialize_psbt(&tx).unwrap(),
    );
}

#[test]
fn rbf_toggle_rewrites_sequences() {
    let mut tx = simple_partial();
    assert!(tx.is_final());
    tx.set_rbf(true);
    assert!(!tx.is_final());
    assert!(tx.inputs().iter().all(|i| i.sequence == 0xffff_fffd));
    tx.set_rbf(false);
    assert!(tx.is_final());
}

#[test]
fn estimation_tracks_witness_inputs() {
    // unsigned single p2wpkh input, single p2pkh output
    let mut input = PartialInput::new(Outpoint::new(sha256(b"est"), 0));
    input.script_type = Some(ScriptType::P2wpkh);
    input.pubkeys = vec![pubkey(1)];
    input
        .set_witness_utxo(Some(TxOutput::new(
            corvus_script::builder::p2wpkh_script(&corvus_crypto::hash::hash160(&pubkey(1))),
            50_000u64,
        )))
        .unwrap();
    let output = PartialOutput::new(p2pkh_script_for_pubkey(&pubkey(2)), 49_000u64);
    let tx = PartialTransaction::from_io(vec![input], vec![output], TxOptions::default());

    let vsize = tx.estimated_size().unwrap();
    // 1-in/1-out p2wpkh spends weigh in around 110 vbytes with 72-byte
    // signature placeholders
    assert!((100..=125).contains(&vsize), "vsize {vsize}");
    assert!(tx.estimated_witness_size().unwrap() > 0);
    assert!(tx.estimated_base_size().unwrap() > 0);

    // the witness size hint wins over construction
    let mut hinted = tx.clone();
    hinted.inputs_mut()[0].witness_sizehint = Some(200);
    assert!(hinted.estimated_witness_size().unwrap() >= 200);
}

#[test]
fn fee_needs_every_input_amount() {
    let (tx, _) = multisig_partial();
    assert_eq!(
        tx.fee(),
        Some(corvus_primitives::RvnValue::from_sats(10_000)),
    );

    let mut missing = tx.clone();
    missing
        .inputs_mut()
        .push(PartialInput::new(Outpoint::new(sha256(b"mystery"), 2)));
    assert_eq!(missing.fee(), None);
    assert_eq!(
        missing.input_value().unwrap_err(),
        Error::MissingInputAmount,
    );
}

fn write_kv(w: &mut Writer, key_type: u8, key: &[u8], value: &[u8]) {
    let mut full_key = Vec::with_capacity(1 + key.len());
    full_key.push(key_type);
    full_key.extend_from_slice(key);
    w.write_var_bytes(&full_key);
    w.write_var_bytes(value);
}

#[test]
fn finalized_witness_survives_the_network_form() {
    let (tx, pubkeys) = multisig_partial();
    let mut complete = sign_with(&tx, &pubkeys[0], 0x41);
    let second = sign_with(&tx, &pubkeys[1], 0x42);
    complete.combine_with(&second).unwrap();
    let network = complete.serialize_as_bytes(false).unwrap();
    let parsed = Transaction::from_wire(&network).unwrap();
    assert!(parsed.is_segwit());
    assert_eq!(parsed.inputs()[0].witness, complete.inputs()[0].witness);
    // sanity: the witness field is a real stack, not the empty dummy
    assert_ne!(
        parsed.inputs()[0].witness,
        Some(build_witness::<Vec<u8>>(&[])),
    );
}
