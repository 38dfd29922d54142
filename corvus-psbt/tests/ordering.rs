//! Deterministic ordering tests: lexicographic sort plus the asset
//! overlay.

use corvus_addresses::{Address, ChainParams};
use corvus_crypto::hash::{hash160, sha256};
use corvus_primitives::{Outpoint, OutputValue};
use corvus_psbt::{PartialInput, PartialOutput, PartialTransaction, TxOptions};
use corvus_script::asset::with_transfer_suffix;
use corvus_script::builder::p2pkh_script;
use proptest::prelude::*;

fn input_at(tag: &[u8], vout: u32) -> PartialInput {
    PartialInput::new(Outpoint::new(sha256(tag), vout))
}

fn plain_output(tag: &[u8], value: u64) -> PartialOutput {
    PartialOutput::new(p2pkh_script(&hash160(tag)), value)
}

fn asset_output(tag: &[u8], name: &str, amount: u64) -> PartialOutput {
    let script = with_transfer_suffix(&p2pkh_script(&hash160(tag)), name, amount);
    let mut output = PartialOutput::new(script, OutputValue::Sats(amount));
    output.asset = Some(name.to_string());
    output
}

/// Mainnet parameters extended with a burn address whose key hash is
/// under test control.
fn test_params() -> ChainParams {
    let mut params = ChainParams::mainnet();
    let burn = Address::P2pkh(hash160(b"burn-target"))
        .encode(&params)
        .unwrap();
    params.burn_addresses.push(burn);
    params
}

/// An output paying the test burn address.
fn burn_output(value: u64) -> PartialOutput {
    PartialOutput::new(p2pkh_script(&hash160(b"burn-target")), value)
}

#[test]
fn inputs_and_outputs_sort_lexicographically() {
    let inputs = vec![
        input_at(b"c", 1),
        input_at(b"a", 5),
        input_at(b"a", 2),
        input_at(b"b", 0),
    ];
    let outputs = vec![
        plain_output(b"x", 900),
        plain_output(b"y", 100),
        plain_output(b"z", 100),
    ];

    let tx = PartialTransaction::from_io(inputs, outputs, TxOptions::default());

    let prevouts: Vec<Outpoint> = tx.inputs().iter().map(|i| i.prevout).collect();
    let mut sorted = prevouts.clone();
    sorted.sort_by_key(|p| (p.txid, p.vout));
    assert_eq!(prevouts, sorted);

    let keys: Vec<(OutputValue, Vec<u8>)> = tx
        .outputs()
        .iter()
        .map(|o| (o.value, o.script_pubkey.clone()))
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn for_swap_suppresses_sorting() {
    let inputs = vec![input_at(b"z", 9), input_at(b"a", 0)];
    let outputs = vec![plain_output(b"x", 900), plain_output(b"y", 100)];

    let tx = PartialTransaction::from_io(
        inputs.clone(),
        outputs.clone(),
        TxOptions {
            for_swap: true,
            ..Default::default()
        },
    );

    // untouched, in construction order
    assert_eq!(tx.inputs()[0].prevout, inputs[0].prevout);
    assert_eq!(tx.inputs()[1].prevout, inputs[1].prevout);
    assert_eq!(tx.outputs()[0].value, OutputValue::Sats(900));
}

#[test]
fn issuance_outputs_get_the_protocol_placement() {
    let params = test_params();

    // construction order scrambled on purpose; values force the plain
    // sort into a known order first
    let outputs = vec![
        asset_output(b"owner", "NEWCOIN!", 100_000_000),
        plain_output(b"change", 2),
        burn_output(1),
        asset_output(b"create", "NEWCOIN", 1_000),
    ];

    let tx = PartialTransaction::from_io(
        vec![input_at(b"in", 0)],
        outputs,
        TxOptions {
            params: Some(&params),
            ..Default::default()
        },
    );

    let assets: Vec<Option<&str>> = tx
        .outputs()
        .iter()
        .map(|o| o.asset.as_deref())
        .collect();
    // burn first, plain outputs, then owner token, then the creation
    assert_eq!(assets, vec![None, None, Some("NEWCOIN!"), Some("NEWCOIN")]);
    let burn_script = burn_output(1).script_pubkey;
    assert_eq!(tx.outputs()[0].script_pubkey, burn_script);
}

#[test]
fn sub_asset_issuance_places_parent_before_owner() {
    let params = test_params();

    let outputs = vec![
        burn_output(1),
        plain_output(b"change", 2),
        asset_output(b"parent", "PAR!", 100_000_000),
        asset_output(b"owner", "PAR/SUB!", 100_000_001),
        asset_output(b"create", "PAR/SUB", 100_000_002),
    ];

    let tx = PartialTransaction::from_io(
        vec![input_at(b"in", 0)],
        outputs,
        TxOptions {
            params: Some(&params),
            ..Default::default()
        },
    );

    let assets: Vec<Option<&str>> = tx
        .outputs()
        .iter()
        .map(|o| o.asset.as_deref())
        .collect();
    assert_eq!(
        assets,
        vec![None, None, Some("PAR!"), Some("PAR/SUB!"), Some("PAR/SUB")],
    );
}

#[test]
fn overlay_needs_both_burn_and_creation() {
    let params = test_params();

    // transfer-only: no burn output, overlay must not move anything
    let outputs = vec![
        asset_output(b"a", "SOMECOIN", 5),
        plain_output(b"b", 1),
        plain_output(b"c", 2),
    ];
    let tx = PartialTransaction::from_io(
        vec![input_at(b"in", 0)],
        outputs,
        TxOptions {
            params: Some(&params),
            ..Default::default()
        },
    );

    let keys: Vec<(OutputValue, Vec<u8>)> = tx
        .outputs()
        .iter()
        .map(|o| (o.value, o.script_pubkey.clone()))
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

proptest! {
    #[test]
    fn sorted_inputs_are_non_decreasing(
        seeds in proptest::collection::vec((any::<[u8; 8]>(), any::<u32>()), 1..12),
    ) {
        let inputs: Vec<PartialInput> = seeds
            .iter()
            .map(|(tag, vout)| input_at(tag, *vout))
            .collect();
        let outputs = vec![plain_output(b"out", 1_000)];
        let tx = PartialTransaction::from_io(inputs, outputs, TxOptions::default());

        let prevouts: Vec<Outpoint> = tx.inputs().iter().map(|i| i.prevout).collect();
        prop_assert!(prevouts
            .windows(2)
            .all(|w| (w[0].txid, w[0].vout) <= (w[1].txid, w[1].vout)));
    }

    #[test]
    fn sorted_outputs_are_non_decreasing(
        seeds in proptest::collection::vec((any::<[u8; 8]>(), 1u64..1_000_000), 1..12),
    ) {
        let outputs: Vec<PartialOutput> = seeds
            .iter()
            .map(|(tag, value)| plain_output(tag, *value))
            .collect();
        let tx = PartialTransaction::from_io(
            vec![input_at(b"in", 0)],
            outputs,
            TxOptions::default(),
        );

        let is_sorted = tx
            .outputs()
            .windows(2)
            .all(|w| (w[0].value, &w[0].script_pubkey) <= (w[1].value, &w[1].script_pubkey));
        prop_assert!(is_sorted);
    }
}
