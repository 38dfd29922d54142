//! Script and witness construction.

use corvus_codec::{Reader, Writer};
use corvus_crypto::hash::{hash160, sha256, Hash};

use crate::{opcodes::*, Error};

/// Incremental script assembly with minimal-push encoding.
#[derive(Debug, Clone, Default)]
pub struct ScriptBuilder {
    script: Vec<u8>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        ScriptBuilder::default()
    }

    pub fn op(mut self, opcode: u8) -> Self {
        self.script.push(opcode);
        self
    }

    /// Push `data` with the shortest possible push opcode.
    pub fn data(mut self, data: &[u8]) -> Self {
        match data.len() {
            0 => self.script.push(OP_0),
            len @ 1..=75 => {
                self.script.push(len as u8);
                self.script.extend_from_slice(data);
            }
            len @ 76..=0xff => {
                self.script.push(OP_PUSHDATA1);
                self.script.push(len as u8);
                self.script.extend_from_slice(data);
            }
            len @ 0x100..=0xffff => {
                self.script.push(OP_PUSHDATA2);
                self.script.extend_from_slice(&(len as u16).to_le_bytes());
                self.script.extend_from_slice(data);
            }
            len => {
                self.script.push(OP_PUSHDATA4);
                self.script.extend_from_slice(&(len as u32).to_le_bytes());
                self.script.extend_from_slice(data);
            }
        }
        self
    }

    /// Push a small non-negative number, `0..=16`, as its dedicated opcode.
    pub fn small_number(self, n: u8) -> Self {
        debug_assert!(n <= 16);
        if n == 0 {
            self.op(OP_0)
        } else {
            self.op(op_n(n))
        }
    }

    pub fn into_script(self) -> Vec<u8> {
        self.script
    }
}

pub fn p2pk_script(pubkey: &[u8]) -> Vec<u8> {
    ScriptBuilder::new()
        .data(pubkey)
        .op(OP_CHECKSIG)
        .into_script()
}

pub fn p2pkh_script(pubkey_hash: &Hash<20>) -> Vec<u8> {
    ScriptBuilder::new()
        .op(OP_DUP)
        .op(OP_HASH160)
        .data(pubkey_hash.as_ref())
        .op(OP_EQUALVERIFY)
        .op(OP_CHECKSIG)
        .into_script()
}

pub fn p2pkh_script_for_pubkey(pubkey: &[u8]) -> Vec<u8> {
    p2pkh_script(&hash160(pubkey))
}

pub fn p2sh_script(script_hash: &Hash<20>) -> Vec<u8> {
    ScriptBuilder::new()
        .op(OP_HASH160)
        .data(script_hash.as_ref())
        .op(OP_EQUAL)
        .into_script()
}

pub fn p2wpkh_script(pubkey_hash: &Hash<20>) -> Vec<u8> {
    ScriptBuilder::new()
        .small_number(0)
        .data(pubkey_hash.as_ref())
        .into_script()
}

pub fn p2wsh_script(script_hash: &Hash<32>) -> Vec<u8> {
    ScriptBuilder::new()
        .small_number(0)
        .data(script_hash.as_ref())
        .into_script()
}

/// The p2sh redeem script nesting a p2wpkh program.
pub fn p2wpkh_nested_script(pubkey: &[u8]) -> Vec<u8> {
    p2wpkh_script(&hash160(pubkey))
}

/// The p2sh redeem script nesting a p2wsh program.
pub fn p2wsh_nested_script(witness_script: &[u8]) -> Vec<u8> {
    p2wsh_script(&sha256(witness_script))
}

/// `m`-of-`n` CHECKMULTISIG locking script over the given public keys, in
/// the given order.
pub fn multisig_script(pubkeys: &[Vec<u8>], m: usize) -> Result<Vec<u8>, Error> {
    let n = pubkeys.len();
    if !(1..=n).contains(&m) || n > 15 {
        return Err(Error::BadMultisig { m, n });
    }
    let mut builder = ScriptBuilder::new().small_number(m as u8);
    for pubkey in pubkeys {
        builder = builder.data(pubkey);
    }
    Ok(builder
        .small_number(n as u8)
        .op(OP_CHECKMULTISIG)
        .into_script())
}

/// Serialize a witness stack: item count followed by length-prefixed items.
pub fn build_witness<T: AsRef<[u8]>>(items: &[T]) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_compact_size(items.len() as u64);
    for item in items {
        w.write_var_bytes(item.as_ref());
    }
    w.into_bytes()
}

/// Decode a serialized witness stack back into its items.
pub fn decode_witness(witness: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
    let mut r = Reader::new(witness);
    let count = r.read_compact_size().map_err(Error::BadWitness)?;
    let mut items = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        items.push(r.read_var_bytes().map_err(Error::BadWitness)?.to_vec());
    }
    r.expect_end().map_err(Error::BadWitness)?;
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{match_script, P2PKH, P2SH, P2WPKH, P2WSH};

    #[test]
    fn standard_scripts_match_their_templates() {
        let pubkey =
            hex::decode("025476c2e83188368da1ff3e292e7acafcdb3566bb0ad253f62fc70f07aeee6357")
                .unwrap();
        assert!(match_script(&p2pkh_script_for_pubkey(&pubkey), &P2PKH));
        assert!(match_script(&p2sh_script(&hash160(b"script")), &P2SH));
        assert!(match_script(&p2wpkh_script(&hash160(&pubkey)), &P2WPKH));
        assert!(match_script(&p2wsh_script(&sha256(b"script")), &P2WSH));
    }

    #[test]
    fn known_p2pkh_bytes() {
        let h: Hash<20> = "1d0f172a0ecb48aee1be1f2687d2963ae33f71a1".parse().unwrap();
        assert_eq!(
            hex::encode(p2pkh_script(&h)),
            "76a9141d0f172a0ecb48aee1be1f2687d2963ae33f71a188ac",
        );
    }

    #[test]
    fn pushdata_thresholds() {
        let s = ScriptBuilder::new().data(&[0xab; 75]).into_script();
        assert_eq!(s[0], 75);

        let s = ScriptBuilder::new().data(&[0xab; 76]).into_script();
        assert_eq!(s[0], OP_PUSHDATA1);
        assert_eq!(s[1], 76);

        let s = ScriptBuilder::new().data(&[0xab; 256]).into_script();
        assert_eq!(s[0], OP_PUSHDATA2);
        assert_eq!(&s[1..3], &[0x00, 0x01]);
    }

    #[test]
    fn multisig_bounds() {
        let keys: Vec<Vec<u8>> = (0..3).map(|i| vec![i; 33]).collect();
        let script = multisig_script(&keys, 2).unwrap();
        assert_eq!(script[0], op_n(2));
        assert_eq!(*script.last().unwrap(), OP_CHECKMULTISIG);
        assert_eq!(script[script.len() - 2], op_n(3));

        assert!(multisig_script(&keys, 0).is_err());
        assert!(multisig_script(&keys, 4).is_err());
        let too_many: Vec<Vec<u8>> = (0..16).map(|i| vec![i; 33]).collect();
        assert!(multisig_script(&too_many, 2).is_err());
    }

    #[test]
    fn witness_round_trip() {
        let items: Vec<Vec<u8>> = vec![vec![], vec![0x01, 0x02], vec![0xff; 73]];
        let witness = build_witness(&items);
        assert_eq!(decode_witness(&witness).unwrap(), items);
    }

    #[test]
    fn empty_witness_stack() {
        assert_eq!(build_witness::<Vec<u8>>(&[]), vec![0x00]);
        assert!(decode_witness(&[0x00]).unwrap().is_empty());
    }
}
