#![cfg_attr(not(feature = "std"), no_std)]

//! Core primitives shared by the `wasm_asyncify` rewriter: LEB128 varints,
//! bit-exact float literals, and natural-width little-endian conversions.
//!
//! Split out of the main crate the way the teacher splits `wasmi_core` out
//! of `wasmi`: these are primitives with no dependency on the module model
//! or the transformation pipeline, reusable by anything that touches the
//! Wasm binary format.

#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std as alloc;

pub mod leb128;
pub mod little_endian;
pub mod nan_preserving_float;

pub use leb128::Leb128Error;
pub use little_endian::{LittleEndianConvert, V128};
pub use nan_preserving_float::{F32, F64};
