use crate::error::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};

/// A cursor over an immutable byte slice with little-endian scalar reads.
///
/// Symmetric counterpart to [`WriteBuf`](super::writebuf::WriteBuf): where
/// `WriteBuf` grows a buffer outward (prepend/append), `ParseBuf` consumes
/// one inward, tracking how much of the slice is left unread.
#[derive(Debug)]
pub struct ParseBuf<'a> {
    buf: &'a [u8],
    current: usize,
    left: usize,
}

impl<'a> ParseBuf<'a> {
    pub fn new(buf: &'a [u8], len: usize) -> ParseBuf<'a> {
        ParseBuf {
            buf: &buf[..len],
            current: 0,
            left: len,
        }
    }

    pub fn left(&self) -> usize {
        self.left
    }

    pub fn as_slice(&self) -> &'a [u8] {
        &self.buf[self.current..]
    }

    fn need(&self, n: usize) -> Result<()> {
        if n > self.left {
            Err(Error::TruncatedPacket)
        } else {
            Ok(())
        }
    }

    fn advance(&mut self, n: usize) {
        self.current += n;
        self.left -= n;
    }

    pub fn le_u8(&mut self) -> Result<u8> {
        self.need(1)?;
        let v = self.buf[self.current];
        self.advance(1);
        Ok(v)
    }

    pub fn le_u16(&mut self) -> Result<u16> {
        self.need(2)?;
        let v = LittleEndian::read_u16(&self.buf[self.current..]);
        self.advance(2);
        Ok(v)
    }

    pub fn le_u32(&mut self) -> Result<u32> {
        self.need(4)?;
        let v = LittleEndian::read_u32(&self.buf[self.current..]);
        self.advance(4);
        Ok(v)
    }

    pub fn le_u64(&mut self) -> Result<u64> {
        self.need(8)?;
        let v = LittleEndian::read_u64(&self.buf[self.current..]);
        self.advance(8);
        Ok(v)
    }

    /// Consume and return a slice of `n` bytes, advancing past it.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        self.need(n)?;
        let s = &self.buf[self.current..self.current + n];
        self.advance(n);
        Ok(s)
    }

    /// Consume the remainder of the buffer, leaving nothing behind.
    pub fn take_rest(&mut self) -> &'a [u8] {
        let s = &self.buf[self.current..];
        self.current += self.left;
        self.left = 0;
        s
    }
}
