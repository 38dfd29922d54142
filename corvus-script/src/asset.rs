//! Inspection and construction of the asset suffix.
//!
//! The suffix lives at the tail of an otherwise standard locking script:
//! the `OP_RVN_ASSET` marker, then a single push whose payload is the
//! three-byte `rvn` magic followed by a typed body, then `OP_DROP`. The
//! body starts with a one-byte operation tag:
//!
//! | tag | operation | body after the name |
//! |-----|-----------|---------------------|
//! | `o` | ownership token | nothing |
//! | `q` | issuance  | quantity, divisions, reissuable flag, ipfs flag, optional 34-byte ipfs |
//! | `r` | reissuance | quantity, divisions + reissuable control bytes, optional 34-byte ipfs |
//! | `t` | transfer  | quantity |
//!
//! The name is length-prefixed ASCII. Ownership tokens carry no quantity
//! on the wire and are valued at a nominal `10^8`.

use corvus_codec::Reader;

use crate::builder::ScriptBuilder;
use crate::opcodes::{OP_DROP, OP_RVN_ASSET};
use crate::walker::instructions;
use crate::Error;

/// Three magic bytes opening every asset payload.
pub const ASSET_MAGIC: &[u8; 3] = b"rvn";

/// Nominal satoshi quantity assigned to ownership tokens.
pub const OWNERSHIP_UNIT: u64 = 100_000_000;

/// Suffix of an asset name marking the ownership token of that asset.
pub const OWNERSHIP_TAG: char = '!';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Ownership,
    Issuance,
    Reissuance,
    Transfer,
}

impl AssetKind {
    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'o' => Some(AssetKind::Ownership),
            b'q' => Some(AssetKind::Issuance),
            b'r' => Some(AssetKind::Reissuance),
            b't' => Some(AssetKind::Transfer),
            _ => None,
        }
    }
}

/// Fully parsed asset suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetData {
    pub kind: AssetKind,
    pub name: String,
    /// Satoshi quantity; nominal [`OWNERSHIP_UNIT`] for ownership tokens.
    pub amount: u64,
    pub divisions: Option<u8>,
    pub reissuable: Option<bool>,
    /// 34-byte associated-data hash, when present.
    pub ipfs: Option<Vec<u8>>,
}

/// The push payload following the first `OP_RVN_ASSET`, if it carries the
/// `rvn` magic; the returned slice starts after the magic.
fn suffix_body(script: &[u8]) -> Option<&[u8]> {
    let mut steps = instructions(script);
    for step in steps.by_ref() {
        match step {
            Ok(ins) if ins.opcode == OP_RVN_ASSET => break,
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
    let payload = steps.next()?.ok()?.push?;
    payload.strip_prefix(&ASSET_MAGIC[..])
}

fn read_name(r: &mut Reader<'_>) -> Result<String, Error> {
    let len = r.read_u8().map_err(|_| Error::BadAssetPortion)? as usize;
    let raw = r.read_bytes(len).map_err(|_| Error::BadAssetPortion)?;
    if !raw.is_ascii() {
        return Err(Error::BadAssetPortion);
    }
    Ok(String::from_utf8(raw.to_vec()).expect("ascii"))
}

impl AssetData {
    /// Parse the asset suffix of `script` against the full typed grammar.
    ///
    /// `Ok(None)` when the script carries no suffix; an error when a suffix
    /// is present but malformed or followed by trailing payload bytes.
    pub fn from_script(script: &[u8]) -> Result<Option<AssetData>, Error> {
        let body = match suffix_body(script) {
            Some(body) => body,
            None => return Ok(None),
        };

        let mut r = Reader::new(body);
        let tag = r.read_u8().map_err(|_| Error::BadAssetPortion)?;
        let kind = AssetKind::from_tag(tag).ok_or(Error::BadAssetPortion)?;
        let name = read_name(&mut r)?;

        let mut data = AssetData {
            kind,
            name,
            amount: OWNERSHIP_UNIT,
            divisions: None,
            reissuable: None,
            ipfs: None,
        };

        if kind != AssetKind::Ownership {
            data.amount = r.read_u64().map_err(|_| Error::BadAssetPortion)?;
        }
        match kind {
            AssetKind::Issuance => {
                data.divisions = Some(r.read_u8().map_err(|_| Error::BadAssetPortion)?);
                data.reissuable = Some(r.read_bool().map_err(|_| Error::BadAssetPortion)?);
                let has_ipfs = r.read_bool().map_err(|_| Error::BadAssetPortion)?;
                if has_ipfs {
                    data.ipfs = Some(
                        r.read_bytes(34)
                            .map_err(|_| Error::BadAssetPortion)?
                            .to_vec(),
                    );
                }
            }
            AssetKind::Reissuance => {
                data.divisions = Some(r.read_u8().map_err(|_| Error::BadAssetPortion)?);
                data.reissuable = Some(r.read_bool().map_err(|_| Error::BadAssetPortion)?);
                if r.can_read_more() {
                    data.ipfs = Some(
                        r.read_bytes(34)
                            .map_err(|_| Error::BadAssetPortion)?
                            .to_vec(),
                    );
                }
            }
            // transfers may carry an associated-data hash on chain, but it
            // is not part of the recognized grammar here; trailing bytes
            // keep the script non-standard
            AssetKind::Transfer | AssetKind::Ownership => {}
        }

        r.expect_end().map_err(|_| Error::BadAssetPortion)?;
        Ok(Some(data))
    }
}

/// Whether a script's asset portion fails the typed grammar (or is absent
/// altogether).
pub fn is_asset_script_non_standard(script: &[u8]) -> bool {
    !matches!(AssetData::from_script(script), Ok(Some(_)))
}

/// Quick name/quantity extraction, used while parsing outputs.
///
/// Tolerant of suffix bodies with extra fields or operation tags outside
/// the recognized grammar: only the tag, name and quantity are consulted,
/// and any non-ownership tag is treated as quantity-bearing.
pub fn asset_in_script(script: &[u8]) -> Option<(String, u64)> {
    let body = suffix_body(script)?;
    let mut r = Reader::new(body);
    let tag = r.read_u8().ok()?;
    let name = read_name(&mut r).ok()?;
    let amount = if tag == b'o' {
        OWNERSHIP_UNIT
    } else {
        r.read_u64().ok()?
    };
    Some((name, amount))
}

/// Append a transfer suffix for `name`/`amount` to a base locking script.
pub fn with_transfer_suffix(base_script: &[u8], name: &str, amount: u64) -> Vec<u8> {
    let mut payload = Vec::with_capacity(3 + 1 + 1 + name.len() + 8);
    payload.extend_from_slice(ASSET_MAGIC);
    payload.push(b't');
    payload.push(name.len() as u8);
    payload.extend_from_slice(name.as_bytes());
    payload.extend_from_slice(&amount.to_le_bytes());

    let mut script = base_script.to_vec();
    script.extend_from_slice(
        &ScriptBuilder::new()
            .op(OP_RVN_ASSET)
            .data(&payload)
            .op(OP_DROP)
            .into_script(),
    );
    script
}

/// Whether `name` follows the ownership-token naming convention.
pub fn is_ownership_name(name: &str) -> bool {
    name.ends_with(OWNERSHIP_TAG)
}
