//! The Wasm binary codec (`spec.md` §4.1, component C1): decodes a module
//! into a structural in-memory form and encodes it back, byte for byte on
//! anything the rewriter doesn't touch.

pub mod decode;
pub mod encode;
pub mod instr;
pub mod module;
pub mod types;

pub use decode::decode;
pub use encode::encode;
pub use instr::{Instruction, Operand};
pub use module::*;
pub use types::*;
