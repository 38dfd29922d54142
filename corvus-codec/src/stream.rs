use crate::Error;

/// Cursor over a borrowed byte buffer.
///
/// Every read advances the cursor; reads past the end of the buffer fail
/// with [`Error::PastEnd`]. Integers are little-endian throughout, matching
/// the network serialization of the chain.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    input: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Reader { input, cursor: 0 }
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.input.len() - self.cursor
    }

    pub fn can_read_more(&self) -> bool {
        self.cursor < self.input.len()
    }

    /// Fails with [`Error::TrailingJunk`] unless the buffer is exhausted.
    pub fn expect_end(&self) -> Result<(), Error> {
        if self.can_read_more() {
            return Err(Error::TrailingJunk);
        }
        Ok(())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if self.remaining() < len {
            return Err(Error::PastEnd);
        }
        let out = &self.input[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(out)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let slice = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, Error> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, Error> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, Error> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, Error> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i16(&mut self) -> Result<i16, Error> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, Error> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, Error> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    /// Compact-size varint: `<253` inline, `253`+u16, `254`+u32, `255`+u64.
    pub fn read_compact_size(&mut self) -> Result<u64, Error> {
        match self.read_u8()? {
            253 => Ok(self.read_u16()? as u64),
            254 => Ok(self.read_u32()? as u64),
            255 => Ok(self.read_u64()?),
            n => Ok(n as u64),
        }
    }

    /// Compact-size length prefix followed by that many bytes.
    pub fn read_var_bytes(&mut self) -> Result<&'a [u8], Error> {
        let len = self.read_compact_size()?;
        if len > usize::MAX as u64 {
            return Err(Error::PastEnd);
        }
        self.read_bytes(len as usize)
    }
}

/// Growable byte buffer mirroring [`Reader`].
#[derive(Debug, Clone, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Writer::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.write_u8(v as u8);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub fn write_i16(&mut self, v: i16) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub fn write_compact_size(&mut self, size: u64) {
        match size {
            0..=252 => self.write_u8(size as u8),
            253..=0xffff => {
                self.write_u8(253);
                self.write_u16(size as u16);
            }
            0x1_0000..=0xffff_ffff => {
                self.write_u8(254);
                self.write_u32(size as u32);
            }
            _ => {
                self.write_u8(255);
                self.write_u64(size);
            }
        }
    }

    pub fn write_var_bytes(&mut self, bytes: &[u8]) {
        self.write_compact_size(bytes.len() as u64);
        self.write_bytes(bytes);
    }
}
