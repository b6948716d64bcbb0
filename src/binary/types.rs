//! Wasm value, reference, and block types.
//!
//! Grounded on the teacher's `types.rs` (`Signature`, `ValueType`), extended
//! with the reference-type and GC-reference-subtype cases `spec.md` §3
//! requires the decoder to preserve (even though it only treats them as
//! opaque, never live across an async call).

use alloc::vec::Vec;

/// A Wasm value type, as it can appear in a local, a global, or a function
/// signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
    V128,
    /// `funcref`, `externref`, or a GC-proposal reference subtype. All
    /// reference-typed values are treated uniformly: they may live in a
    /// local, but `spec.md` §3 forbids them being live on the operand stack
    /// across an async call site.
    Ref(RefType),
}

impl ValType {
    pub fn is_reference(self) -> bool {
        matches!(self, ValType::Ref(_))
    }

    /// Natural store/load width in bytes, for locals saved into an asyncify
    /// frame (`spec.md` §3 "Frame layout").
    pub fn frame_width(self) -> usize {
        match self {
            ValType::I32 | ValType::F32 => 4,
            ValType::I64 | ValType::F64 => 8,
            ValType::V128 => 16,
            // Reference-typed locals are never written into a frame (they
            // cannot be live across an async call); callers must not invoke
            // this for `Ref`.
            ValType::Ref(_) => 0,
        }
    }
}

/// A reference type. GC-proposal structured heap types are preserved as an
/// opaque type-index without being interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefType {
    Func,
    Extern,
    /// A GC-proposal heap type identified by a type-section index, carried
    /// through unchanged (`spec.md` §1 Non-goals: GC types are opaque).
    Concrete { type_index: u32, nullable: bool },
}

/// The `(params) -> (results)` shape of a function or block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FuncType {
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
}

impl FuncType {
    pub fn new(params: Vec<ValType>, results: Vec<ValType>) -> Self {
        FuncType { params, results }
    }
}

/// The type annotation on a `block`/`loop`/`if`, in its three encoded forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Void,
    Value(ValType),
    /// Index into the module's type section; resolved against it to get
    /// `(params, results)` (`spec.md` §4.4).
    TypeIndex(u32),
}

impl BlockType {
    /// Resolves this block type against the module's type section.
    pub fn resolve(self, types: &[FuncType]) -> Option<(Vec<ValType>, Vec<ValType>)> {
        match self {
            BlockType::Void => Some((Vec::new(), Vec::new())),
            BlockType::Value(v) => Some((Vec::new(), alloc::vec![v])),
            BlockType::TypeIndex(idx) => types
                .get(idx as usize)
                .map(|ty| (ty.params.clone(), ty.results.clone())),
        }
    }
}

/// A memory operand immediate: `(align_log2, offset, memory index)`.
///
/// The multi-memory proposal's "memory index follows" form is signalled by
/// the high bit of the encoded `align` byte (`spec.md` §4.1); `mem_idx` is
/// `0` unless that form is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemArg {
    pub align_log2: u32,
    pub offset: u64,
    pub mem_idx: u32,
}

/// A table/function limits pair as used by table and memory types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub min: u64,
    pub max: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryType {
    pub limits: Limits,
    pub memory64: bool,
    pub shared: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableType {
    pub element: RefType,
    pub limits: Limits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalType {
    pub content: ValType,
    pub mutable: bool,
}
