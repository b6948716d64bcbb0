//! Natural-width little-endian encoding for values written into an asyncify
//! stack frame (`spec.md` §3 "Frame layout per instrumented function").
//!
//! Grounded on `wasmi_core::value::LittleEndianConvert`, trimmed to the
//! value shapes this rewriter ever stores to memory: the four numeric types
//! plus a 128-bit SIMD lane, each written with its natural alignment.

use crate::nan_preserving_float::{F32, F64};

/// A 128-bit SIMD value, stored and compared by raw bytes (never
/// interpreted numerically by this crate).
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct V128(pub [u8; 16]);

impl core::fmt::Debug for V128 {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "v128(")?;
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

/// Converts a value to and from its natural-width little-endian byte
/// representation, as used by `i32.store`/`i64.store`/`f32.store`/
/// `f64.store`/`v128.store` and their `*.load` counterparts.
pub trait LittleEndianConvert: Sized {
    /// Byte width of the natural (unaligned) representation.
    const WIDTH: usize;

    fn into_le_bytes(self, out: &mut [u8]);
    fn from_le_bytes(bytes: &[u8]) -> Self;
}

macro_rules! impl_int {
    ($ty:ty) => {
        impl LittleEndianConvert for $ty {
            const WIDTH: usize = core::mem::size_of::<$ty>();

            fn into_le_bytes(self, out: &mut [u8]) {
                out[..Self::WIDTH].copy_from_slice(&self.to_le_bytes());
            }

            fn from_le_bytes(bytes: &[u8]) -> Self {
                let mut buf = [0u8; core::mem::size_of::<$ty>()];
                buf.copy_from_slice(&bytes[..Self::WIDTH]);
                Self::from_le_bytes(buf)
            }
        }
    };
}

impl_int!(i32);
impl_int!(i64);
impl_int!(u32);
impl_int!(u64);

impl LittleEndianConvert for F32 {
    const WIDTH: usize = 4;

    fn into_le_bytes(self, out: &mut [u8]) {
        out[..4].copy_from_slice(&self.to_bits().to_le_bytes());
    }

    fn from_le_bytes(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&bytes[..4]);
        F32::from_bits(u32::from_le_bytes(buf))
    }
}

impl LittleEndianConvert for F64 {
    const WIDTH: usize = 8;

    fn into_le_bytes(self, out: &mut [u8]) {
        out[..8].copy_from_slice(&self.to_bits().to_le_bytes());
    }

    fn from_le_bytes(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes[..8]);
        F64::from_bits(u64::from_le_bytes(buf))
    }
}

impl LittleEndianConvert for V128 {
    const WIDTH: usize = 16;

    fn into_le_bytes(self, out: &mut [u8]) {
        out[..16].copy_from_slice(&self.0);
    }

    fn from_le_bytes(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 16];
        buf.copy_from_slice(&bytes[..16]);
        V128(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i64_round_trips() {
        let mut buf = [0u8; 8];
        12345678901234i64.into_le_bytes(&mut buf);
        assert_eq!(i64::from_le_bytes(&buf), 12345678901234i64);
    }

    #[test]
    fn f64_preserves_nan_bits() {
        let value = F64::from_bits(0xfff8_0000_0000_0001);
        let mut buf = [0u8; 8];
        value.into_le_bytes(&mut buf);
        assert_eq!(F64::from_le_bytes(&buf), value);
    }

    #[test]
    fn v128_round_trips() {
        let value = V128([0xab; 16]);
        let mut buf = [0u8; 16];
        value.into_le_bytes(&mut buf);
        assert_eq!(V128::from_le_bytes(&buf), value);
    }
}
