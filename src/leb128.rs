//! LEB128 variable-length integer codec.
//!
//! Unsigned values use the plain base-128 grouping; signed values use the
//! two's-complement convention where encoding stops once the remaining
//! value is `0` with a cleared sign bit or `-1` with a set sign bit.
//! Decoders reject inputs whose continuation never terminates
//! ([`Error::Truncated`]) and inputs carrying payload bits above bit 63
//! ([`Error::Overflow`]).

use crate::bytes::Output;
use crate::error::{Error, Result};

/// Writes `value` as ULEB128, returning the number of bytes produced.
pub fn uleb128_encode<O: Output + ?Sized>(mut value: u64, out: &mut O) -> usize {
    let mut written = 0;
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push_byte(byte);
        written += 1;
        if value == 0 {
            return written;
        }
    }
}

/// Writes `value` as SLEB128, returning the number of bytes produced.
pub fn sleb128_encode<O: Output + ?Sized>(mut value: i64, out: &mut O) -> usize {
    let mut written = 0;
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        out.push_byte(if done { byte } else { byte | 0x80 });
        written += 1;
        if done {
            return written;
        }
    }
}

/// Decodes a ULEB128 value, returning it with the number of bytes consumed.
pub fn uleb128_decode(input: &[u8]) -> Result<(u64, usize)> {
    let mut value = 0u64;
    let mut shift = 0u32;
    for (i, &byte) in input.iter().enumerate() {
        let group = u64::from(byte & 0x7f);
        // The tenth group only has room for bit 63.
        if shift == 63 && group > 1 {
            return Err(Error::Overflow);
        }
        if shift > 63 {
            return Err(Error::Overflow);
        }
        value |= group << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
    }
    Err(Error::Truncated)
}

/// Decodes an SLEB128 value, returning it with the number of bytes consumed.
pub fn sleb128_decode(input: &[u8]) -> Result<(i64, usize)> {
    let mut value = 0i64;
    let mut shift = 0u32;
    for (i, &byte) in input.iter().enumerate() {
        let group = i64::from(byte & 0x7f);
        if shift == 63 {
            // Terminal group: anything but an all-sign group discards
            // bits above bit 63.
            if byte & 0x80 != 0 || (group != 0 && group != 0x7f) {
                return Err(Error::Overflow);
            }
            if group == 0x7f {
                value |= i64::MIN;
            }
            return Ok((value, i + 1));
        }
        value |= group << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            if byte & 0x40 != 0 {
                value |= -1i64 << shift;
            }
            return Ok((value, i + 1));
        }
    }
    Err(Error::Truncated)
}
