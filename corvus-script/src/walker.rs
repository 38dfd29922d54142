//! Pull iteration over script opcodes.

use crate::{opcodes, Error};

/// One step of a script: the opcode and, for push opcodes, the pushed
/// payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction<'a> {
    pub opcode: u8,
    pub push: Option<&'a [u8]>,
}

impl<'a> Instruction<'a> {
    /// Length of the pushed payload, when this is a push.
    pub fn push_len(&self) -> Option<usize> {
        self.push.map(<[u8]>::len)
    }
}

/// Iterator state over a script byte string.
///
/// Yields one [`Instruction`] per opcode, decoding the `OP_PUSHDATA{1,2,4}`
/// length prefixes. A push whose payload (or length prefix) runs past the
/// end of the script yields `Err(Error::TruncatedPush)` and ends the
/// iteration.
#[derive(Debug, Clone)]
pub struct Instructions<'a> {
    script: &'a [u8],
    cursor: usize,
    poisoned: bool,
}

pub fn instructions(script: &[u8]) -> Instructions<'_> {
    Instructions {
        script,
        cursor: 0,
        poisoned: false,
    }
}

/// Collect a whole script into instructions, failing on a truncated push.
pub fn decode_script(script: &[u8]) -> Result<Vec<Instruction<'_>>, Error> {
    instructions(script).collect()
}

impl<'a> Instructions<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if self.script.len() - self.cursor < len {
            return Err(Error::TruncatedPush);
        }
        let out = &self.script[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(out)
    }

    fn next_instruction(&mut self) -> Result<Instruction<'a>, Error> {
        let opcode = self.script[self.cursor];
        self.cursor += 1;

        if opcode > opcodes::OP_PUSHDATA4 {
            return Ok(Instruction { opcode, push: None });
        }

        let push_len = match opcode {
            opcodes::OP_PUSHDATA1 => self.take(1)?[0] as usize,
            opcodes::OP_PUSHDATA2 => {
                let prefix = self.take(2)?;
                u16::from_le_bytes([prefix[0], prefix[1]]) as usize
            }
            opcodes::OP_PUSHDATA4 => {
                let prefix = self.take(4)?;
                u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize
            }
            direct => direct as usize,
        };

        let push = self.take(push_len)?;
        Ok(Instruction {
            opcode,
            push: Some(push),
        })
    }
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Result<Instruction<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.poisoned || self.cursor >= self.script.len() {
            return None;
        }
        let step = self.next_instruction();
        if step.is_err() {
            self.poisoned = true;
        }
        Some(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::*;

    #[test]
    fn walks_p2pkh() {
        let script = hex::decode("76a9141d0f172a0ecb48aee1be1f2687d2963ae33f71a188ac").unwrap();
        let decoded = decode_script(&script).unwrap();
        assert_eq!(decoded.len(), 5);
        assert_eq!(decoded[0].opcode, OP_DUP);
        assert_eq!(decoded[1].opcode, OP_HASH160);
        assert_eq!(decoded[2].push_len(), Some(20));
        assert_eq!(decoded[3].opcode, OP_EQUALVERIFY);
        assert_eq!(decoded[4].opcode, OP_CHECKSIG);
    }

    #[test]
    fn decodes_pushdata_prefixes() {
        // OP_PUSHDATA1 0x02 aabb / OP_PUSHDATA2 0x0300 ccddee
        let script = hex::decode("4c02aabb4d0300ccddee").unwrap();
        let decoded = decode_script(&script).unwrap();
        assert_eq!(decoded[0].push, Some(&[0xaa, 0xbb][..]));
        assert_eq!(decoded[1].push, Some(&[0xcc, 0xdd, 0xee][..]));
    }

    #[test]
    fn op_0_pushes_empty() {
        let decoded = decode_script(&[OP_0]).unwrap();
        assert_eq!(decoded[0].push, Some(&[][..]));
    }

    #[test]
    fn truncated_push_is_malformed() {
        // direct push of 5 bytes, only 2 present
        let err = decode_script(&[0x05, 0x01, 0x02]).unwrap_err();
        assert_eq!(err, Error::TruncatedPush);

        // OP_PUSHDATA2 with a truncated length prefix
        let err = decode_script(&[OP_PUSHDATA2, 0x01]).unwrap_err();
        assert_eq!(err, Error::TruncatedPush);
    }

    #[test]
    fn stops_after_malformed_step() {
        let mut iter = instructions(&[0x05, 0x01]);
        assert!(matches!(iter.next(), Some(Err(Error::TruncatedPush))));
        assert!(iter.next().is_none());
    }
}
