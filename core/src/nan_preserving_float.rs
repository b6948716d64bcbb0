//! Bit-exact `f32`/`f64` literal wrappers.
//!
//! Wasm float constants are encoded as raw IEEE-754 bit patterns and this
//! rewriter never computes on them; it only copies them from the decoded
//! instruction stream into the encoded one. A plain `f32`/`f64` would let
//! `NaN != NaN` and signalling/quiet NaN payloads collapse under comparison,
//! which would silently corrupt a const's bit pattern across a decode/encode
//! round-trip. Storing the bits directly and comparing by bits keeps the
//! round-trip bit-exact, which is what `spec.md` §4.1 requires.

use core::fmt;

macro_rules! float {
    ($(#[$docs:meta])* struct $for:ident($rep:ty as $is:ty);) => {
        $(#[$docs])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash)]
        pub struct $for($rep);

        impl $for {
            #[inline]
            pub const fn from_bits(bits: $rep) -> Self {
                $for(bits)
            }

            #[inline]
            pub const fn to_bits(self) -> $rep {
                self.0
            }

            #[inline]
            pub fn from_float(value: $is) -> Self {
                $for(value.to_bits())
            }

            #[inline]
            pub fn to_float(self) -> $is {
                <$is>::from_bits(self.0)
            }

            #[inline]
            pub fn is_nan(self) -> bool {
                self.to_float().is_nan()
            }
        }

        impl From<$is> for $for {
            #[inline]
            fn from(value: $is) -> Self {
                Self::from_float(value)
            }
        }

        impl From<$for> for $is {
            #[inline]
            fn from(value: $for) -> Self {
                value.to_float()
            }
        }

        impl fmt::Debug for $for {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }
    };
}

float! {
    /// A `f32` literal that preserves its exact bit pattern, NaN payload included.
    struct F32(u32 as f32);
}

float! {
    /// A `f64` literal that preserves its exact bit pattern, NaN payload included.
    struct F64(u64 as f64);
}

#[cfg(test)]
mod tests {
    use super::{F32, F64};

    #[test]
    fn preserves_nan_payload_f32() {
        let a = F32::from_bits(0x7fc0_1234);
        let b = F32::from_bits(0x7fc0_5678);
        assert_ne!(a, b);
        assert!(a.is_nan());
        assert_eq!(a.to_bits(), 0x7fc0_1234);
    }

    #[test]
    fn preserves_nan_payload_f64() {
        let a = F64::from_bits(0xfff8_0000_0000_0001);
        assert!(a.is_nan());
        assert_eq!(a.to_bits(), 0xfff8_0000_0000_0001);
    }

    #[test]
    fn round_trips_through_native_float() {
        let value = F32::from_float(-42.5);
        assert_eq!(value.to_float(), -42.5);
    }
}
