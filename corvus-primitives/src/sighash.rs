use crate::Error;

/// Base sighash mode, the low bits of the flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SighashBase {
    All = 0x01,
    None = 0x02,
    Single = 0x03,
}

/// Signature hash flag: a base mode plus the ANYONECANPAY bit.
///
/// One byte on the wire (appended to signatures), four little-endian bytes
/// inside a PSBT sighash record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sighash {
    pub base: SighashBase,
    pub anyone_can_pay: bool,
}

pub const ANYONECANPAY: u8 = 0x80;

impl Sighash {
    pub const ALL: Sighash = Sighash {
        base: SighashBase::All,
        anyone_can_pay: false,
    };

    pub const SINGLE_ANYONECANPAY: Sighash = Sighash {
        base: SighashBase::Single,
        anyone_can_pay: true,
    };

    pub fn new(base: SighashBase, anyone_can_pay: bool) -> Self {
        Sighash {
            base,
            anyone_can_pay,
        }
    }

    pub fn to_byte(self) -> u8 {
        let base = self.base as u8;
        if self.anyone_can_pay {
            base | ANYONECANPAY
        } else {
            base
        }
    }

    /// Strict decoding: only the seven defined flag values are accepted.
    pub fn from_byte(byte: u8) -> Result<Self, Error> {
        let base = match byte & !ANYONECANPAY {
            0x01 => SighashBase::All,
            0x02 => SighashBase::None,
            0x03 => SighashBase::Single,
            _ => return Err(Error::BadSighash(byte)),
        };
        Ok(Sighash {
            base,
            anyone_can_pay: byte & ANYONECANPAY != 0,
        })
    }

    pub fn to_u32(self) -> u32 {
        self.to_byte() as u32
    }

    pub fn from_u32(value: u32) -> Result<Self, Error> {
        if value > u8::MAX as u32 {
            return Err(Error::BadSighash(u8::MAX));
        }
        Self::from_byte(value as u8)
    }
}

impl Default for Sighash {
    fn default() -> Self {
        Sighash::ALL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0x01, SighashBase::All, false)]
    #[test_case(0x02, SighashBase::None, false)]
    #[test_case(0x03, SighashBase::Single, false)]
    #[test_case(0x81, SighashBase::All, true)]
    #[test_case(0x82, SighashBase::None, true)]
    #[test_case(0x83, SighashBase::Single, true)]
    fn round_trips(byte: u8, base: SighashBase, acp: bool) {
        let flag = Sighash::from_byte(byte).unwrap();
        assert_eq!(flag.base, base);
        assert_eq!(flag.anyone_can_pay, acp);
        assert_eq!(flag.to_byte(), byte);
        assert_eq!(Sighash::from_u32(flag.to_u32()).unwrap(), flag);
    }

    #[test_case(0x00)]
    #[test_case(0x04)]
    #[test_case(0x80)]
    #[test_case(0xff)]
    fn rejects_undefined(byte: u8) {
        assert!(Sighash::from_byte(byte).is_err());
    }
}
