//! The decoded module: an ordered list of sections and the entities they
//! define, per `spec.md` §3's Data Model.
//!
//! Unlike the teacher's `module::ModuleRef` (a *runtime* handle into an
//! instantiated `parity_wasm::elements::Module`), this `Module` is purely a
//! decode target: a structural mirror of the binary, kept in a shape the
//! transformation pipeline (`crate::transform`, `crate::assemble`) can
//! rebuild byte-for-byte modulo the instrumentation it adds.

use alloc::string::String;
use alloc::vec::Vec;

use crate::binary::instr::Instruction;
use crate::binary::types::{FuncType, GlobalType, MemoryType, RefType, TableType, ValType};

/// A whole decoded Wasm module.
///
/// Sections are kept in the order they were encountered so that re-encoding
/// (for a module with no async-reachable functions, `spec.md` §7 "identity
/// transform") reproduces the input exactly, custom sections included.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub types: Vec<FuncType>,
    pub imports: Vec<Import>,
    /// Type indices of locally defined functions, in function-index order
    /// starting after all imported functions.
    pub functions: Vec<u32>,
    pub tables: Vec<TableType>,
    pub memories: Vec<MemoryType>,
    pub globals: Vec<Global>,
    pub exports: Vec<Export>,
    pub start: Option<u32>,
    pub elements: Vec<Element>,
    /// Present if the module carried a `DataCount` section; required to
    /// disambiguate `memory.init`/`data.drop` decoding in the presence of
    /// bulk-memory operations (`spec.md` §4.1).
    pub data_count: Option<u32>,
    pub code: Vec<Function>,
    pub data: Vec<Data>,
    /// Custom sections, retained verbatim with their original position
    /// relative to the standard sections so re-encoding can reproduce
    /// placement (`spec.md` §3 "Custom sections").
    pub custom: Vec<CustomSection>,
}

impl Module {
    /// Number of imported functions, i.e. the first local function's index.
    pub fn imported_function_count(&self) -> u32 {
        self.imports
            .iter()
            .filter(|i| matches!(i.desc, ImportDesc::Func(_)))
            .count() as u32
    }

    /// Total function count (imported + local), the space function indices
    /// range over.
    pub fn total_function_count(&self) -> u32 {
        self.imported_function_count() + self.functions.len() as u32
    }

    /// Resolves a function index to its type, across the imported/local
    /// boundary.
    pub fn function_type(&self, func_idx: u32) -> Option<&FuncType> {
        let imported = self.imported_function_count();
        if func_idx < imported {
            self.imports
                .iter()
                .filter_map(|i| match &i.desc {
                    ImportDesc::Func(type_idx) => Some(*type_idx),
                    _ => None,
                })
                .nth(func_idx as usize)
                .and_then(|type_idx| self.types.get(type_idx as usize))
        } else {
            let local_idx = (func_idx - imported) as usize;
            self.functions
                .get(local_idx)
                .and_then(|type_idx| self.types.get(*type_idx as usize))
        }
    }

    /// Number of imported globals, i.e. the first module-defined global's
    /// index.
    pub fn imported_global_count(&self) -> u32 {
        self.imports.iter().filter(|i| matches!(i.desc, ImportDesc::Global(_))).count() as u32
    }

    /// Resolves a global index to its declared content type, across the
    /// imported/local boundary (imported globals occupy the index space
    /// before module-defined ones).
    pub fn global_type(&self, global_idx: u32) -> Option<ValType> {
        let imported = self.imported_global_count();
        if global_idx < imported {
            self.imports
                .iter()
                .filter_map(|i| match &i.desc {
                    ImportDesc::Global(ty) => Some(*ty),
                    _ => None,
                })
                .nth(global_idx as usize)
                .map(|ty| ty.content)
        } else {
            let local_idx = (global_idx - imported) as usize;
            self.globals.get(local_idx).map(|g| g.ty.content)
        }
    }
}

#[derive(Debug, Clone)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub desc: ImportDesc,
}

#[derive(Debug, Clone, Copy)]
pub enum ImportDesc {
    Func(u32),
    Table(TableType),
    Memory(MemoryType),
    Global(GlobalType),
}

#[derive(Debug, Clone)]
pub struct Global {
    pub ty: GlobalType,
    pub init: ConstExpr,
}

/// A constant initializer expression: `spec.md` §3 only requires evaluating
/// these well enough to read/patch globals and element/data offsets, never
/// to execute general code, so this is a closed, non-recursive shape rather
/// than a full instruction sequence.
#[derive(Debug, Clone)]
pub enum ConstExpr {
    I32(i32),
    I64(i64),
    F32(wasm_asyncify_core::F32),
    F64(wasm_asyncify_core::F64),
    V128([u8; 16]),
    GlobalGet(u32),
    RefNull(RefType),
    RefFunc(u32),
}

#[derive(Debug, Clone)]
pub struct Export {
    pub name: String,
    pub desc: ExportDesc,
}

#[derive(Debug, Clone, Copy)]
pub enum ExportDesc {
    Func(u32),
    Table(u32),
    Memory(u32),
    Global(u32),
}

#[derive(Debug, Clone)]
pub struct Element {
    pub kind: ElementKind,
    pub ty: RefType,
    pub items: ElementItems,
}

#[derive(Debug, Clone)]
pub enum ElementKind {
    /// Active: initializes `table_index` at `offset` on instantiation.
    Active { table_index: u32, offset: ConstExpr },
    Passive,
    Declared,
}

#[derive(Debug, Clone)]
pub enum ElementItems {
    Funcs(Vec<u32>),
    Exprs(Vec<ConstExpr>),
}

#[derive(Debug, Clone)]
pub struct Data {
    pub kind: DataKind,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum DataKind {
    Active { mem_idx: u32, offset: ConstExpr },
    Passive,
}

#[derive(Debug, Clone)]
pub struct CustomSection {
    pub name: String,
    pub data: Vec<u8>,
}

/// A function body: declared locals (beyond its parameters) plus its flat
/// instruction stream.
#[derive(Debug, Clone)]
pub struct Function {
    /// Local declarations, run-length encoded as in the binary format
    /// (`(count, type)` groups), kept this way rather than expanded so
    /// re-encoding an untouched function reproduces the original bytes.
    pub locals: Vec<(u32, ValType)>,
    pub body: Vec<Instruction>,
}

impl Function {
    /// Expands the run-length encoded local groups into one `ValType` per
    /// local index, for code that indexes locals directly (`crate::cfir`,
    /// `crate::transform`).
    pub fn expand_locals(&self) -> Vec<ValType> {
        let mut out = Vec::new();
        for &(count, ty) in &self.locals {
            out.extend(core::iter::repeat(ty).take(count as usize));
        }
        out
    }
}
