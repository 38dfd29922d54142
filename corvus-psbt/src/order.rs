//! Deterministic input/output ordering: lexicographic (BIP-69) with the
//! chain's asset-placement overlay.

use std::collections::HashSet;

use corvus_addresses::ChainParams;
use corvus_script::asset::is_ownership_name;

use crate::output::PartialOutput;
use crate::tx::PartialTransaction;

impl PartialTransaction {
    /// Sort inputs by (prevout txid, index) and outputs by (value,
    /// script), both stable, then rearrange asset outputs as the
    /// protocol's issuance flow expects:
    /// `[burn] [others…] [parent owner?] [asset owner?] [asset create]`.
    ///
    /// No-op while the for-swap flag is set: a SIGHASH_SINGLE swap has
    /// committed to its positions.
    pub fn bip69_sort(&mut self, params: Option<&ChainParams>) {
        self.sort_inputs_only();
        self.sort_outputs_only(params);
    }

    pub(crate) fn sort_inputs_only(&mut self) {
        if self.for_swap() {
            return;
        }
        self.inputs_mut()
            .sort_by_key(|txin| (txin.prevout.txid, txin.prevout.vout));
        self.invalidate_ser_cache();
    }

    pub(crate) fn sort_outputs_only(&mut self, params: Option<&ChainParams>) {
        if self.for_swap() {
            return;
        }
        self.outputs_mut()
            .sort_by_key(|txout| (txout.value, txout.script_pubkey.clone()));
        if let Some(params) = params {
            self.asset_overlay(params);
        }
        self.invalidate_ser_cache();
    }

    /// Structural rearrangement over the already-sorted outputs. Only
    /// kicks in when both a burn output and an asset-creating output are
    /// present, i.e. for issuance-shaped transactions.
    fn asset_overlay(&mut self, params: &ChainParams) {
        let mut burn: Option<usize> = None;
        let mut parent_owner: Option<usize> = None;
        let mut asset_owner: Option<usize> = None;
        let mut asset_create: Option<usize> = None;

        let outputs = self.outputs();
        for (idx, txout) in outputs.iter().enumerate() {
            let rendered = txout
                .address()
                .and_then(|address| address.encode(params).ok());
            if rendered
                .as_deref()
                .is_some_and(|address| params.is_burn_address(address))
            {
                burn = Some(idx);
                continue;
            }
            let Some(name) = txout.asset.as_deref() else {
                continue;
            };
            if is_ownership_name(name) {
                let base = &name[..name.len() - 1];
                if let Some(create_idx) = asset_create {
                    if Some(base) == outputs[create_idx].asset.as_deref() {
                        // this is the owner of the asset being created;
                        // anything previously in that slot was the parent
                        let previous = asset_owner.replace(idx);
                        if parent_owner.is_none() {
                            parent_owner = previous;
                        }
                    } else {
                        parent_owner = Some(idx);
                    }
                } else if asset_owner.is_some() {
                    parent_owner = Some(idx);
                } else {
                    asset_owner = Some(idx);
                }
            } else {
                asset_create = Some(idx);
                let owner_mismatch = asset_owner.is_some_and(|owner_idx| {
                    outputs[owner_idx]
                        .asset
                        .as_deref()
                        .and_then(|owner| owner.strip_suffix('!'))
                        != Some(name)
                });
                if owner_mismatch {
                    std::mem::swap(&mut parent_owner, &mut asset_owner);
                }
            }
        }

        let (Some(burn_idx), Some(create_idx)) = (burn, asset_create) else {
            return;
        };

        let special: HashSet<usize> = [Some(burn_idx), parent_owner, asset_owner, Some(create_idx)]
            .into_iter()
            .flatten()
            .collect();

        let mut slots: Vec<Option<PartialOutput>> =
            self.outputs_mut().drain(..).map(Some).collect();
        let mut reordered = Vec::with_capacity(slots.len());
        reordered.push(slots[burn_idx].take().expect("burn output"));
        for (idx, slot) in slots.iter_mut().enumerate() {
            if !special.contains(&idx) {
                reordered.push(slot.take().expect("unplaced output"));
            }
        }
        if let Some(idx) = parent_owner {
            reordered.push(slots[idx].take().expect("parent owner output"));
        }
        if let Some(idx) = asset_owner {
            reordered.push(slots[idx].take().expect("asset owner output"));
        }
        reordered.push(slots[create_idx].take().expect("asset create output"));

        *self.outputs_mut() = reordered;
    }
}
