//! The opcode constants this workspace actually dispatches on.
//!
//! Values are the canonical Bitcoin assignments plus the Ravencoin asset
//! marker. Anything not named here is treated as an opaque single byte by
//! the walker.

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;

pub const OP_RETURN: u8 = 0x6a;
pub const OP_DROP: u8 = 0x75;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;

pub const OP_RIPEMD160: u8 = 0xa6;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CODESEPARATOR: u8 = 0xab;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKMULTISIG: u8 = 0xae;

/// Marker introducing the asset suffix of a locking script.
pub const OP_RVN_ASSET: u8 = 0xc0;

/// The `OP_N` opcode pushing `n` in `1..=16`, as used by multisig headers
/// and witness version bytes.
pub fn op_n(n: u8) -> u8 {
    debug_assert!((1..=16).contains(&n));
    OP_1 + n - 1
}

/// Inverse of [`op_n`]: `Some(n)` when `op` is `OP_1..=OP_16`.
pub fn decode_op_n(op: u8) -> Option<u8> {
    (OP_1..=OP_16).contains(&op).then(|| op - OP_1 + 1)
}
