use crate::error::{Error, Result};
use crate::leb128;

/// Byte sink used by every encoder in the crate.
///
/// Implemented for plain vectors and for arena-backed vectors so encoded
/// output can live either on the heap or inside an [`Arena`](crate::Arena).
pub trait Output {
    fn write(&mut self, bytes: &[u8]);

    #[inline]
    fn push_byte(&mut self, byte: u8) {
        self.write(&[byte]);
    }
}

impl Output for Vec<u8> {
    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }

    #[inline]
    fn push_byte(&mut self, byte: u8) {
        self.push(byte);
    }
}

impl Output for bumpalo::collections::Vec<'_, u8> {
    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }

    #[inline]
    fn push_byte(&mut self, byte: u8) {
        self.push(byte);
    }
}

/// Reader over an input buffer.
///
/// All reads are bounds-checked; running past the end is reported as
/// [`Error::Truncated`] and leaves the cursor where the failed read began.
#[derive(Debug, Clone)]
pub struct Cursor<'input> {
    buffer: &'input [u8],
    offset: usize,
}

impl<'input> Cursor<'input> {
    #[must_use]
    pub fn new(buffer: &'input [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    /// Bytes consumed so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.offset
    }

    #[must_use]
    pub fn is_at_end(&self) -> bool {
        self.offset >= self.buffer.len()
    }

    /// The unread tail of the input.
    #[must_use]
    pub fn rest(&self) -> &'input [u8] {
        &self.buffer[self.offset..]
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        let byte = *self.buffer.get(self.offset).ok_or(Error::Truncated)?;
        self.offset += 1;
        Ok(byte)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'input [u8]> {
        let end = self.offset.checked_add(len).ok_or(Error::Overflow)?;
        let bytes = self.buffer.get(self.offset..end).ok_or(Error::Truncated)?;
        self.offset = end;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        let end = self.offset.checked_add(len).ok_or(Error::Overflow)?;
        if end > self.buffer.len() {
            return Err(Error::Truncated);
        }
        self.offset = end;
        Ok(())
    }

    /// Reads one ULEB128 group sequence and advances past it.
    pub fn read_uleb128(&mut self) -> Result<u64> {
        let (value, len) = leb128::uleb128_decode(self.rest())?;
        self.offset += len;
        Ok(value)
    }

    /// Reads one SLEB128 group sequence and advances past it.
    pub fn read_sleb128(&mut self) -> Result<i64> {
        let (value, len) = leb128::sleb128_decode(self.rest())?;
        self.offset += len;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_advance_in_order() {
        let mut c = Cursor::new(&[1, 2, 3, 4, 5]);
        assert_eq!(c.read_byte().unwrap(), 1);
        assert_eq!(c.read_bytes(3).unwrap(), &[2, 3, 4]);
        assert_eq!(c.position(), 4);
        assert_eq!(c.remaining(), 1);
        c.skip(1).unwrap();
        assert!(c.is_at_end());
    }

    #[test]
    fn truncated_reads_do_not_advance() {
        let mut c = Cursor::new(&[1, 2]);
        assert_eq!(c.read_bytes(3), Err(Error::Truncated));
        assert_eq!(c.position(), 0);
        assert_eq!(c.skip(5), Err(Error::Truncated));
        assert_eq!(c.read_bytes(2).unwrap(), &[1, 2]);
        assert_eq!(c.read_byte(), Err(Error::Truncated));
    }

    #[test]
    fn varints_on_cursor() {
        let mut c = Cursor::new(&[0xe5, 0x8e, 0x26, 0x7c]);
        assert_eq!(c.read_uleb128().unwrap(), 624485);
        assert_eq!(c.read_sleb128().unwrap(), -4);
        assert!(c.is_at_end());
    }
}
