//! LEB128 variable-length integer encoding, as used throughout the Wasm
//! binary format for indices, counts, and signed immediates.
//!
//! Mirrors the shape of the teacher's `isa`/`prepare` modules: small, total
//! functions with an explicit error rather than panics, so the binary codec
//! (`wasm_asyncify::binary`) can report a byte offset on failure.

use alloc::vec::Vec;
use core::fmt;

/// Error produced by a malformed LEB128 sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leb128Error {
    /// The buffer ended before the terminating byte (high bit clear) was read.
    UnexpectedEof,
    /// The value does not fit in the target integer width.
    Overflow,
}

impl fmt::Display for Leb128Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Leb128Error::UnexpectedEof => write!(f, "unexpected end of input while reading LEB128"),
            Leb128Error::Overflow => write!(f, "LEB128 value does not fit the target width"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Leb128Error {}

/// Reads an unsigned LEB128 value, returning the value and the number of
/// bytes consumed.
pub fn read_u64(bytes: &[u8]) -> Result<(u64, usize), Leb128Error> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    for (i, &byte) in bytes.iter().enumerate() {
        let low7 = (byte & 0x7f) as u64;
        if shift >= 64 || (shift == 63 && low7 > 1) {
            return Err(Leb128Error::Overflow);
        }
        result |= low7 << shift;
        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
        shift += 7;
    }
    Err(Leb128Error::UnexpectedEof)
}

pub fn read_u32(bytes: &[u8]) -> Result<(u32, usize), Leb128Error> {
    let (value, len) = read_u64(bytes)?;
    u32::try_from(value)
        .map(|v| (v, len))
        .map_err(|_| Leb128Error::Overflow)
}

/// Reads a signed LEB128 value. Terminates per the two-case rule in
/// `spec.md` §4.1: `(v == 0, sign bit clear)` or `(v == -1, sign bit set)`.
pub fn read_i64(bytes: &[u8]) -> Result<(i64, usize), Leb128Error> {
    let mut result: i64 = 0;
    let mut shift = 0u32;
    let mut byte;
    let mut i = 0;
    loop {
        byte = *bytes.get(i).ok_or(Leb128Error::UnexpectedEof)?;
        i += 1;
        if shift >= 64 {
            return Err(Leb128Error::Overflow);
        }
        result |= ((byte & 0x7f) as i64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            break;
        }
    }
    if shift < 64 && (byte & 0x40) != 0 {
        result |= -1i64 << shift;
    }
    Ok((result, i))
}

pub fn read_i32(bytes: &[u8]) -> Result<(i32, usize), Leb128Error> {
    let (value, len) = read_i64(bytes)?;
    i32::try_from(value)
        .map(|v| (v, len))
        .map_err(|_| Leb128Error::Overflow)
}

/// Reads a signed 33-bit LEB128 value (used for Wasm block types, which
/// distinguish a value-type short form from a type-section index by sign).
pub fn read_i33(bytes: &[u8]) -> Result<(i64, usize), Leb128Error> {
    let (value, len) = read_i64(bytes)?;
    if !(-(1i64 << 32)..(1i64 << 32)).contains(&value) {
        return Err(Leb128Error::Overflow);
    }
    Ok((value, len))
}

pub fn write_u64(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

pub fn write_u32(out: &mut Vec<u8>, value: u32) {
    write_u64(out, value as u64);
}

pub fn write_i64(out: &mut Vec<u8>, mut value: i64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let sign_bit_set = byte & 0x40 != 0;
        if (value == 0 && !sign_bit_set) || (value == -1 && sign_bit_set) {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

pub fn write_i32(out: &mut Vec<u8>, value: i32) {
    write_i64(out, value as i64);
}

pub fn write_i33(out: &mut Vec<u8>, value: i64) {
    write_i64(out, value);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip_u32(value: u32) {
        let mut buf = Vec::new();
        write_u32(&mut buf, value);
        let (decoded, len) = read_u32(&buf).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(len, buf.len());
    }

    fn round_trip_i32(value: i32) {
        let mut buf = Vec::new();
        write_i32(&mut buf, value);
        let (decoded, len) = read_i32(&buf).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(len, buf.len());
    }

    fn round_trip_i64(value: i64) {
        let mut buf = Vec::new();
        write_i64(&mut buf, value);
        let (decoded, len) = read_i64(&buf).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(len, buf.len());
    }

    #[test]
    fn u32_edge_cases() {
        for v in [0, 1, 127, 128, 16384, u32::MAX] {
            round_trip_u32(v);
        }
    }

    #[test]
    fn i32_edge_cases() {
        for v in [0, 1, -1, 63, -64, 64, -65, i32::MIN, i32::MAX] {
            round_trip_i32(v);
        }
    }

    #[test]
    fn i64_edge_cases() {
        for v in [0, 1, -1, i64::MIN, i64::MAX] {
            round_trip_i64(v);
        }
    }

    #[test]
    fn random_round_trip() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            round_trip_i32(rng.gen());
            round_trip_i64(rng.gen());
            round_trip_u32(rng.gen());
        }
    }

    #[test]
    fn truncated_input_is_eof() {
        assert_eq!(read_u32(&[0x80]), Err(Leb128Error::UnexpectedEof));
        assert_eq!(read_u32(&[]), Err(Leb128Error::UnexpectedEof));
    }
}
