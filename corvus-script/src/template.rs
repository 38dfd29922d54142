//! Structural matching of standard locking-script shapes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::opcodes::*;
use crate::walker::{decode_script, Instruction};

/// One slot of a script template.
#[derive(Clone, Copy)]
pub enum TemplateItem {
    /// Exactly this opcode.
    Op(u8),
    /// Any opcode satisfying the predicate.
    OpIf(fn(u8) -> bool),
    /// A push whose payload length satisfies the predicate.
    PushIf(fn(usize) -> bool),
}

use TemplateItem::{Op, OpIf, PushIf};

fn pubkey_len(len: usize) -> bool {
    len == 33 || len == 65
}

fn hash160_len(len: usize) -> bool {
    len == 20
}

fn sha256_len(len: usize) -> bool {
    len == 32
}

fn witness_v0_program_len(len: usize) -> bool {
    len == 20 || len == 32
}

fn witness_program_len(len: usize) -> bool {
    (2..=40).contains(&len)
}

fn witness_version_op(op: u8) -> bool {
    (OP_1..=OP_16).contains(&op)
}

pub const P2PK: [TemplateItem; 2] = [PushIf(pubkey_len), Op(OP_CHECKSIG)];
pub const P2PKH: [TemplateItem; 5] = [
    Op(OP_DUP),
    Op(OP_HASH160),
    PushIf(hash160_len),
    Op(OP_EQUALVERIFY),
    Op(OP_CHECKSIG),
];
pub const P2SH: [TemplateItem; 3] = [Op(OP_HASH160), PushIf(hash160_len), Op(OP_EQUAL)];
pub const P2WPKH: [TemplateItem; 2] = [Op(OP_0), PushIf(hash160_len)];
pub const P2WSH: [TemplateItem; 2] = [Op(OP_0), PushIf(sha256_len)];
pub const WITNESS_V0: [TemplateItem; 2] = [Op(OP_0), PushIf(witness_v0_program_len)];
pub const WITNESS_VN: [TemplateItem; 2] = [OpIf(witness_version_op), PushIf(witness_program_len)];

/// The decoded script up to (excluding) the first asset marker.
///
/// Standard-shape matching never looks at the asset suffix.
pub fn strip_asset_suffix<'a, 'b>(decoded: &'a [Instruction<'b>]) -> &'a [Instruction<'b>] {
    let end = decoded
        .iter()
        .position(|i| i.opcode == OP_RVN_ASSET)
        .unwrap_or(decoded.len());
    &decoded[..end]
}

/// Whether `decoded` (asset suffix ignored) matches `template`.
pub fn match_template(decoded: &[Instruction], template: &[TemplateItem]) -> bool {
    let decoded = strip_asset_suffix(decoded);
    if decoded.len() != template.len() {
        return false;
    }
    decoded.iter().zip(template).all(|(ins, item)| match *item {
        Op(op) => ins.opcode == op,
        OpIf(pred) => pred(ins.opcode),
        PushIf(pred) => ins.push_len().is_some_and(pred),
    })
}

/// Convenience wrapper decoding raw script bytes first.
///
/// A malformed script matches nothing.
pub fn match_script(script: &[u8], template: &[TemplateItem]) -> bool {
    match decode_script(script) {
        Ok(decoded) => match_template(&decoded, template),
        Err(_) => false,
    }
}

/// Extract `(witness_version, program)` from a decoded script of the
/// generic witness shape, v0 through v16.
pub fn witness_program<'a>(decoded: &[Instruction<'a>]) -> Option<(u8, &'a [u8])> {
    let decoded = strip_asset_suffix(decoded);
    if match_template(decoded, &WITNESS_V0) {
        return Some((0, decoded[1].push.unwrap()));
    }
    if match_template(decoded, &WITNESS_VN) {
        let version = decode_op_n(decoded[0].opcode)?;
        return Some((version, decoded[1].push.unwrap()));
    }
    None
}

/// The script classes the signing engine knows how to satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScriptType {
    P2pk,
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
    #[serde(rename = "p2wpkh-p2sh")]
    P2wpkhP2sh,
    #[serde(rename = "p2wsh-p2sh")]
    P2wshP2sh,
}

impl ScriptType {
    /// Whether satisfying this type involves a witness.
    pub fn is_segwit(&self) -> bool {
        matches!(
            self,
            ScriptType::P2wpkh | ScriptType::P2wsh | ScriptType::P2wpkhP2sh | ScriptType::P2wshP2sh
        )
    }

    /// Whether this type is a single-signature shape (as opposed to a
    /// threshold multisig inside p2sh/p2wsh).
    pub fn is_single_sig(&self) -> bool {
        matches!(
            self,
            ScriptType::P2pk | ScriptType::P2pkh | ScriptType::P2wpkh | ScriptType::P2wpkhP2sh
        )
    }

    /// The nested combination of an inner type behind p2sh / p2wsh.
    pub fn nested(inner: ScriptType, outer: ScriptType) -> Option<ScriptType> {
        match (inner, outer) {
            (ScriptType::P2wpkh, ScriptType::P2sh) => Some(ScriptType::P2wpkhP2sh),
            (ScriptType::P2wsh, ScriptType::P2sh) => Some(ScriptType::P2wshP2sh),
            _ => None,
        }
    }
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScriptType::P2pk => "p2pk",
            ScriptType::P2pkh => "p2pkh",
            ScriptType::P2sh => "p2sh",
            ScriptType::P2wpkh => "p2wpkh",
            ScriptType::P2wsh => "p2wsh",
            ScriptType::P2wpkhP2sh => "p2wpkh-p2sh",
            ScriptType::P2wshP2sh => "p2wsh-p2sh",
        };
        f.write_str(name)
    }
}

impl FromStr for ScriptType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "p2pk" => Ok(ScriptType::P2pk),
            "p2pkh" => Ok(ScriptType::P2pkh),
            "p2sh" => Ok(ScriptType::P2sh),
            "p2wpkh" => Ok(ScriptType::P2wpkh),
            "p2wsh" => Ok(ScriptType::P2wsh),
            "p2wpkh-p2sh" => Ok(ScriptType::P2wpkhP2sh),
            "p2wsh-p2sh" => Ok(ScriptType::P2wshP2sh),
            _ => Err(()),
        }
    }
}

/// Classify a locking script by shape, asset suffix ignored.
pub fn script_type_of(script: &[u8]) -> Option<ScriptType> {
    let decoded = decode_script(script).ok()?;
    if match_template(&decoded, &P2PKH) {
        return Some(ScriptType::P2pkh);
    }
    if match_template(&decoded, &P2SH) {
        return Some(ScriptType::P2sh);
    }
    if match_template(&decoded, &P2WPKH) {
        return Some(ScriptType::P2wpkh);
    }
    if match_template(&decoded, &P2WSH) {
        return Some(ScriptType::P2wsh);
    }
    if match_template(&decoded, &P2PK) {
        return Some(ScriptType::P2pk);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ScriptBuilder;

    const PUBKEY: &str = "025476c2e83188368da1ff3e292e7acafcdb3566bb0ad253f62fc70f07aeee6357";

    #[test]
    fn classifies_standard_shapes() {
        let p2pkh = hex::decode("76a9141d0f172a0ecb48aee1be1f2687d2963ae33f71a188ac").unwrap();
        assert_eq!(script_type_of(&p2pkh), Some(ScriptType::P2pkh));

        let p2sh = hex::decode("a9141d0f172a0ecb48aee1be1f2687d2963ae33f71a187").unwrap();
        assert_eq!(script_type_of(&p2sh), Some(ScriptType::P2sh));

        let p2wpkh = hex::decode("00141d0f172a0ecb48aee1be1f2687d2963ae33f71a1").unwrap();
        assert_eq!(script_type_of(&p2wpkh), Some(ScriptType::P2wpkh));

        let p2wsh =
            hex::decode("00200d8d00cdd4657ac84d82f0a56067634a7adfdf43da41cb534bcaa45060973d21")
                .unwrap();
        assert_eq!(script_type_of(&p2wsh), Some(ScriptType::P2wsh));

        let p2pk = ScriptBuilder::new()
            .data(&hex::decode(PUBKEY).unwrap())
            .op(OP_CHECKSIG)
            .into_script();
        assert_eq!(script_type_of(&p2pk), Some(ScriptType::P2pk));
    }

    #[test]
    fn asset_suffix_is_ignored_by_matching() {
        let mut script = hex::decode("76a9141d0f172a0ecb48aee1be1f2687d2963ae33f71a188ac").unwrap();
        let plain_type = script_type_of(&script);

        // append marker + a push + drop, the asset suffix framing
        script.push(OP_RVN_ASSET);
        script.extend_from_slice(&[0x03, 0xaa, 0xbb, 0xcc]);
        script.push(OP_DROP);

        assert_eq!(script_type_of(&script), plain_type);
    }

    #[test]
    fn witness_program_versions() {
        let v0 = hex::decode("00141d0f172a0ecb48aee1be1f2687d2963ae33f71a1").unwrap();
        let decoded = decode_script(&v0).unwrap();
        let (version, program) = witness_program(&decoded).unwrap();
        assert_eq!(version, 0);
        assert_eq!(program.len(), 20);

        // v1, 32-byte program
        let mut v1 = vec![op_n(1), 0x20];
        v1.extend_from_slice(&[0xee; 32]);
        let decoded = decode_script(&v1).unwrap();
        let (version, program) = witness_program(&decoded).unwrap();
        assert_eq!(version, 1);
        assert_eq!(program, &[0xee; 32][..]);

        // v1 with a 41-byte program is not a witness program
        let mut bad = vec![op_n(1), 0x29];
        bad.extend_from_slice(&[0xee; 41]);
        let decoded = decode_script(&bad).unwrap();
        assert!(witness_program(&decoded).is_none());
    }

    #[test]
    fn wrong_length_rejected() {
        // 21-byte hash in a p2pkh frame
        let script = hex::decode("76a9151d0f172a0ecb48aee1be1f2687d2963ae33f71a1ff88ac").unwrap();
        assert_eq!(script_type_of(&script), None);
    }
}
