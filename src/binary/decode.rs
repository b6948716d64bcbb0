//! Decodes a Wasm binary into a `crate::binary::module::Module`.
//!
//! Mirrors the teacher's `prepare` module in spirit (a single pass turning
//! external bytes into an in-memory structure, reporting position on
//! failure) but targets our own `Module` rather than
//! `parity_wasm::elements::Module`: `spec.md` §4.1 makes the binary codec
//! itself the deliverable, not a wrapped dependency.

use alloc::string::String;
use alloc::vec::Vec;

use wasm_asyncify_core::leb128;

use crate::binary::instr::{Instruction, Operand};
use crate::binary::module::*;
use crate::binary::types::*;
use crate::error::Error;

const MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6d];
const VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

/// Cursor over the input byte slice, tracking position for error reporting.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    fn malformed(&self, reason: &'static str) -> Error {
        Error::Malformed { offset: self.pos, reason }
    }

    fn byte(&mut self) -> Result<u8, Error> {
        let b = *self.bytes.get(self.pos).ok_or_else(|| self.malformed("unexpected end of input"))?;
        self.pos += 1;
        Ok(b)
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], Error> {
        let end = self.pos.checked_add(n).ok_or_else(|| self.malformed("length overflow"))?;
        let slice = self.bytes.get(self.pos..end).ok_or_else(|| self.malformed("unexpected end of input"))?;
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, Error> {
        let (v, len) = leb128::read_u32(self.remaining()).map_err(|_| self.malformed("bad u32 LEB128"))?;
        self.pos += len;
        Ok(v)
    }

    fn u64(&mut self) -> Result<u64, Error> {
        let (v, len) = leb128::read_u64(self.remaining()).map_err(|_| self.malformed("bad u64 LEB128"))?;
        self.pos += len;
        Ok(v)
    }

    fn i32(&mut self) -> Result<i32, Error> {
        let (v, len) = leb128::read_i32(self.remaining()).map_err(|_| self.malformed("bad i32 LEB128"))?;
        self.pos += len;
        Ok(v)
    }

    fn i64(&mut self) -> Result<i64, Error> {
        let (v, len) = leb128::read_i64(self.remaining()).map_err(|_| self.malformed("bad i64 LEB128"))?;
        self.pos += len;
        Ok(v)
    }

    fn i33(&mut self) -> Result<i64, Error> {
        let (v, len) = leb128::read_i33(self.remaining()).map_err(|_| self.malformed("bad blocktype LEB128"))?;
        self.pos += len;
        Ok(v)
    }

    fn f32_bits(&mut self) -> Result<wasm_asyncify_core::F32, Error> {
        let bytes = self.bytes(4)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        Ok(wasm_asyncify_core::F32::from_bits(u32::from_le_bytes(buf)))
    }

    fn f64_bits(&mut self) -> Result<wasm_asyncify_core::F64, Error> {
        let bytes = self.bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(wasm_asyncify_core::F64::from_bits(u64::from_le_bytes(buf)))
    }

    fn v128(&mut self) -> Result<[u8; 16], Error> {
        let bytes = self.bytes(16)?;
        let mut buf = [0u8; 16];
        buf.copy_from_slice(bytes);
        Ok(buf)
    }

    fn name(&mut self) -> Result<String, Error> {
        let len = self.u32()? as usize;
        let bytes = self.bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| self.malformed("name is not valid UTF-8"))
    }

    fn at_end(&self) -> bool {
        self.pos == self.bytes.len()
    }
}

pub fn decode(input: &[u8]) -> Result<Module, Error> {
    let mut r = Reader::new(input);
    if r.bytes(4)? != MAGIC {
        return Err(r.malformed("bad magic number"));
    }
    if r.bytes(4)? != VERSION {
        return Err(r.malformed("unsupported version"));
    }

    let mut module = Module::default();
    let mut last_std_section: u8 = 0;

    while !r.at_end() {
        let id = r.byte()?;
        let size = r.u32()? as usize;
        let section_bytes = r.bytes(size)?;
        let mut sr = Reader::new(section_bytes);

        if id == 0 {
            let name = sr.name()?;
            let data = sr.remaining().to_vec();
            module.custom.push(CustomSection { name, data });
            continue;
        }

        if id <= last_std_section {
            return Err(r.malformed("sections out of order"));
        }
        last_std_section = id;

        match id {
            1 => module.types = decode_type_section(&mut sr)?,
            2 => module.imports = decode_import_section(&mut sr)?,
            3 => module.functions = decode_function_section(&mut sr)?,
            4 => module.tables = decode_table_section(&mut sr)?,
            5 => module.memories = decode_memory_section(&mut sr)?,
            6 => module.globals = decode_global_section(&mut sr)?,
            7 => module.exports = decode_export_section(&mut sr)?,
            8 => module.start = Some(sr.u32()?),
            9 => module.elements = decode_element_section(&mut sr)?,
            12 => module.data_count = Some(sr.u32()?),
            10 => module.code = decode_code_section(&mut sr)?,
            11 => module.data = decode_data_section(&mut sr)?,
            _ => return Err(r.malformed("unknown section id")),
        }

        if !sr.at_end() {
            return Err(r.malformed("trailing bytes in section"));
        }
    }

    Ok(module)
}

fn decode_val_type(r: &mut Reader) -> Result<ValType, Error> {
    match r.byte()? {
        0x7f => Ok(ValType::I32),
        0x7e => Ok(ValType::I64),
        0x7d => Ok(ValType::F32),
        0x7c => Ok(ValType::F64),
        0x7b => Ok(ValType::V128),
        0x70 => Ok(ValType::Ref(RefType::Func)),
        0x6f => Ok(ValType::Ref(RefType::Extern)),
        0x64 => Ok(ValType::Ref(RefType::Concrete { type_index: r.u32()?, nullable: true })),
        0x63 => Ok(ValType::Ref(RefType::Concrete { type_index: r.u32()?, nullable: false })),
        _ => Err(r.malformed("bad value type")),
    }
}

fn decode_ref_type(r: &mut Reader) -> Result<RefType, Error> {
    match decode_val_type(r)? {
        ValType::Ref(rt) => Ok(rt),
        _ => Err(r.malformed("expected reference type")),
    }
}

fn decode_block_type(r: &mut Reader) -> Result<BlockType, Error> {
    let raw = r.i33()?;
    if raw == -0x40 {
        return Ok(BlockType::Void);
    }
    if raw >= 0 {
        return Ok(BlockType::TypeIndex(raw as u32));
    }
    let byte = (raw & 0x7f) as u8;
    let mut sub = Reader::new(&[byte]);
    Ok(BlockType::Value(decode_val_type(&mut sub)?))
}

fn decode_limits(r: &mut Reader) -> Result<Limits, Error> {
    let flags = r.byte()?;
    let min = r.u64()?;
    let max = if flags & 1 != 0 { Some(r.u64()?) } else { None };
    Ok(Limits { min, max })
}

fn decode_limits64(r: &mut Reader) -> Result<(Limits, bool, bool), Error> {
    let flags = r.byte()?;
    let memory64 = flags & 0x04 != 0;
    let shared = flags & 0x02 != 0;
    let has_max = flags & 0x01 != 0;
    let min = if memory64 { r.u64()? } else { r.u32()? as u64 };
    let max = if has_max {
        Some(if memory64 { r.u64()? } else { r.u32()? as u64 })
    } else {
        None
    };
    Ok((Limits { min, max }, memory64, shared))
}

fn decode_table_type(r: &mut Reader) -> Result<TableType, Error> {
    let element = decode_ref_type(r)?;
    let limits = decode_limits(r)?;
    Ok(TableType { element, limits })
}

fn decode_memory_type(r: &mut Reader) -> Result<MemoryType, Error> {
    let (limits, memory64, shared) = decode_limits64(r)?;
    Ok(MemoryType { limits, memory64, shared })
}

fn decode_global_type(r: &mut Reader) -> Result<GlobalType, Error> {
    let content = decode_val_type(r)?;
    let mutable = r.byte()? == 1;
    Ok(GlobalType { content, mutable })
}

fn decode_func_type(r: &mut Reader) -> Result<FuncType, Error> {
    if r.byte()? != 0x60 {
        return Err(r.malformed("expected function type tag"));
    }
    let param_count = r.u32()? as usize;
    let mut params = Vec::with_capacity(param_count);
    for _ in 0..param_count {
        params.push(decode_val_type(r)?);
    }
    let result_count = r.u32()? as usize;
    let mut results = Vec::with_capacity(result_count);
    for _ in 0..result_count {
        results.push(decode_val_type(r)?);
    }
    Ok(FuncType { params, results })
}

fn decode_const_expr(r: &mut Reader) -> Result<ConstExpr, Error> {
    let opcode = r.byte()?;
    let expr = match opcode {
        0x41 => ConstExpr::I32(r.i32()?),
        0x42 => ConstExpr::I64(r.i64()?),
        0x43 => ConstExpr::F32(r.f32_bits()?),
        0x44 => ConstExpr::F64(r.f64_bits()?),
        0x23 => ConstExpr::GlobalGet(r.u32()?),
        0xd0 => ConstExpr::RefNull(decode_ref_type(r)?),
        0xd2 => ConstExpr::RefFunc(r.u32()?),
        0xfd if peek_v128_const(r)? => ConstExpr::V128(r.v128()?),
        _ => return Err(r.malformed("unsupported constant expression opcode")),
    };
    if r.byte()? != 0x0b {
        return Err(r.malformed("constant expression missing end"));
    }
    Ok(expr)
}

fn peek_v128_const(r: &mut Reader) -> Result<bool, Error> {
    let sub = r.u32()?;
    Ok(sub == 12)
}

fn decode_type_section(r: &mut Reader) -> Result<Vec<FuncType>, Error> {
    let count = r.u32()? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(decode_func_type(r)?);
    }
    Ok(out)
}

fn decode_import_section(r: &mut Reader) -> Result<Vec<Import>, Error> {
    let count = r.u32()? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let module = r.name()?;
        let name = r.name()?;
        let desc = match r.byte()? {
            0x00 => ImportDesc::Func(r.u32()?),
            0x01 => ImportDesc::Table(decode_table_type(r)?),
            0x02 => ImportDesc::Memory(decode_memory_type(r)?),
            0x03 => ImportDesc::Global(decode_global_type(r)?),
            _ => return Err(r.malformed("bad import kind")),
        };
        out.push(Import { module, name, desc });
    }
    Ok(out)
}

fn decode_function_section(r: &mut Reader) -> Result<Vec<u32>, Error> {
    let count = r.u32()? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(r.u32()?);
    }
    Ok(out)
}

fn decode_table_section(r: &mut Reader) -> Result<Vec<TableType>, Error> {
    let count = r.u32()? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(decode_table_type(r)?);
    }
    Ok(out)
}

fn decode_memory_section(r: &mut Reader) -> Result<Vec<MemoryType>, Error> {
    let count = r.u32()? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(decode_memory_type(r)?);
    }
    Ok(out)
}

fn decode_global_section(r: &mut Reader) -> Result<Vec<Global>, Error> {
    let count = r.u32()? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let ty = decode_global_type(r)?;
        let init = decode_const_expr(r)?;
        out.push(Global { ty, init });
    }
    Ok(out)
}

fn decode_export_section(r: &mut Reader) -> Result<Vec<Export>, Error> {
    let count = r.u32()? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let name = r.name()?;
        let desc = match r.byte()? {
            0x00 => ExportDesc::Func(r.u32()?),
            0x01 => ExportDesc::Table(r.u32()?),
            0x02 => ExportDesc::Memory(r.u32()?),
            0x03 => ExportDesc::Global(r.u32()?),
            _ => return Err(r.malformed("bad export kind")),
        };
        out.push(Export { name, desc });
    }
    Ok(out)
}

fn decode_element_section(r: &mut Reader) -> Result<Vec<Element>, Error> {
    let count = r.u32()? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let flags = r.u32()?;
        let (kind, ty, items) = match flags {
            0 => {
                let offset = decode_const_expr(r)?;
                let items = decode_func_idx_vec(r)?;
                (ElementKind::Active { table_index: 0, offset }, RefType::Func, ElementItems::Funcs(items))
            }
            1 => {
                let _elem_kind = r.byte()?;
                let items = decode_func_idx_vec(r)?;
                (ElementKind::Passive, RefType::Func, ElementItems::Funcs(items))
            }
            2 => {
                let table_index = r.u32()?;
                let offset = decode_const_expr(r)?;
                let _elem_kind = r.byte()?;
                let items = decode_func_idx_vec(r)?;
                (ElementKind::Active { table_index, offset }, RefType::Func, ElementItems::Funcs(items))
            }
            3 => {
                let _elem_kind = r.byte()?;
                let items = decode_func_idx_vec(r)?;
                (ElementKind::Declared, RefType::Func, ElementItems::Funcs(items))
            }
            4 => {
                let offset = decode_const_expr(r)?;
                let items = decode_const_expr_vec(r)?;
                (ElementKind::Active { table_index: 0, offset }, RefType::Func, ElementItems::Exprs(items))
            }
            5 => {
                let ty = decode_ref_type(r)?;
                let items = decode_const_expr_vec(r)?;
                (ElementKind::Passive, ty, ElementItems::Exprs(items))
            }
            6 => {
                let table_index = r.u32()?;
                let offset = decode_const_expr(r)?;
                let ty = decode_ref_type(r)?;
                let items = decode_const_expr_vec(r)?;
                (ElementKind::Active { table_index, offset }, ty, ElementItems::Exprs(items))
            }
            7 => {
                let ty = decode_ref_type(r)?;
                let items = decode_const_expr_vec(r)?;
                (ElementKind::Declared, ty, ElementItems::Exprs(items))
            }
            _ => return Err(r.malformed("bad element segment flags")),
        };
        out.push(Element { kind, ty, items });
    }
    Ok(out)
}

fn decode_func_idx_vec(r: &mut Reader) -> Result<Vec<u32>, Error> {
    let count = r.u32()? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(r.u32()?);
    }
    Ok(out)
}

fn decode_const_expr_vec(r: &mut Reader) -> Result<Vec<ConstExpr>, Error> {
    let count = r.u32()? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(decode_const_expr(r)?);
    }
    Ok(out)
}

fn decode_data_section(r: &mut Reader) -> Result<Vec<Data>, Error> {
    let count = r.u32()? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let flags = r.u32()?;
        let kind = match flags {
            0 => DataKind::Active { mem_idx: 0, offset: decode_const_expr(r)? },
            1 => DataKind::Passive,
            2 => {
                let mem_idx = r.u32()?;
                DataKind::Active { mem_idx, offset: decode_const_expr(r)? }
            }
            _ => return Err(r.malformed("bad data segment flags")),
        };
        let len = r.u32()? as usize;
        let bytes = r.bytes(len)?.to_vec();
        out.push(Data { kind, bytes });
    }
    Ok(out)
}

fn decode_code_section(r: &mut Reader) -> Result<Vec<Function>, Error> {
    let count = r.u32()? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let body_size = r.u32()? as usize;
        let body_bytes = r.bytes(body_size)?;
        let mut br = Reader::new(body_bytes);

        let local_group_count = br.u32()? as usize;
        let mut locals = Vec::with_capacity(local_group_count);
        for _ in 0..local_group_count {
            let count = br.u32()?;
            let ty = decode_val_type(&mut br)?;
            locals.push((count, ty));
        }

        let body = decode_instructions(&mut br)?;
        if !br.at_end() {
            return Err(br.malformed("trailing bytes in function body"));
        }
        out.push(Function { locals, body });
    }
    Ok(out)
}

/// Decodes a flat instruction stream up to (and including) its matching
/// top-level `end`.
fn decode_instructions(r: &mut Reader) -> Result<Vec<Instruction>, Error> {
    let mut out = Vec::new();
    let mut depth: u32 = 0;
    loop {
        let opcode = r.byte()?;
        let instr = decode_one(r, opcode)?;
        match instr {
            Instruction::Block(_) | Instruction::Loop(_) | Instruction::If(_) => depth += 1,
            Instruction::End if depth == 0 => {
                out.push(instr);
                return Ok(out);
            }
            Instruction::End => depth -= 1,
            _ => {}
        }
        out.push(instr);
    }
}

fn decode_one(r: &mut Reader, opcode: u8) -> Result<Instruction, Error> {
    use Instruction as I;
    Ok(match opcode {
        0x00 => I::Unreachable,
        0x01 => I::Nop,
        0x02 => I::Block(decode_block_type(r)?),
        0x03 => I::Loop(decode_block_type(r)?),
        0x04 => I::If(decode_block_type(r)?),
        0x05 => I::Else,
        0x0b => I::End,
        0x0c => I::Br(r.u32()?),
        0x0d => I::BrIf(r.u32()?),
        0x0e => {
            let count = r.u32()? as usize;
            let mut labels = Vec::with_capacity(count);
            for _ in 0..count {
                labels.push(r.u32()?);
            }
            let default = r.u32()?;
            I::BrTable(labels, default)
        }
        0x0f => I::Return,
        0x10 => I::Call(r.u32()?),
        0x11 => {
            let type_index = r.u32()?;
            let table_index = r.u32()?;
            I::CallIndirect { type_index, table_index }
        }
        0x14 => I::CallRef { type_index: r.u32()? },
        0x12 => I::ReturnCall(r.u32()?),
        0x13 => {
            let type_index = r.u32()?;
            let table_index = r.u32()?;
            I::ReturnCallIndirect { type_index, table_index }
        }
        0x1a => I::Drop,
        0x1b => I::Select,
        0x1c => {
            let count = r.u32()? as usize;
            let mut types = Vec::with_capacity(count);
            for _ in 0..count {
                types.push(decode_val_type(r)?);
            }
            I::SelectTyped(types)
        }
        0x20 => I::LocalGet(r.u32()?),
        0x21 => I::LocalSet(r.u32()?),
        0x22 => I::LocalTee(r.u32()?),
        0x23 => I::GlobalGet(r.u32()?),
        0x24 => I::GlobalSet(r.u32()?),
        0x25 => I::TableGet(r.u32()?),
        0x26 => I::TableSet(r.u32()?),
        0xd0 => I::RefNull(decode_ref_type(r)?),
        0xd1 => I::RefIsNull,
        0xd2 => I::RefFunc(r.u32()?),
        0x28 => I::I32Load(decode_memarg(r)?),
        0x29 => I::I64Load(decode_memarg(r)?),
        0x2a => I::F32Load(decode_memarg(r)?),
        0x2b => I::F64Load(decode_memarg(r)?),
        0x2c => I::I32Load8S(decode_memarg(r)?),
        0x2d => I::I32Load8U(decode_memarg(r)?),
        0x2e => I::I32Load16S(decode_memarg(r)?),
        0x2f => I::I32Load16U(decode_memarg(r)?),
        0x30 => I::I64Load8S(decode_memarg(r)?),
        0x31 => I::I64Load8U(decode_memarg(r)?),
        0x32 => I::I64Load16S(decode_memarg(r)?),
        0x33 => I::I64Load16U(decode_memarg(r)?),
        0x34 => I::I64Load32S(decode_memarg(r)?),
        0x35 => I::I64Load32U(decode_memarg(r)?),
        0x36 => I::I32Store(decode_memarg(r)?),
        0x37 => I::I64Store(decode_memarg(r)?),
        0x38 => I::F32Store(decode_memarg(r)?),
        0x39 => I::F64Store(decode_memarg(r)?),
        0x3a => I::I32Store8(decode_memarg(r)?),
        0x3b => I::I32Store16(decode_memarg(r)?),
        0x3c => I::I64Store8(decode_memarg(r)?),
        0x3d => I::I64Store16(decode_memarg(r)?),
        0x3e => I::I64Store32(decode_memarg(r)?),
        0x3f => I::MemorySize(decode_mem_idx_byte(r)?),
        0x40 => I::MemoryGrow(decode_mem_idx_byte(r)?),
        0x41 => I::I32Const(r.i32()?),
        0x42 => I::I64Const(r.i64()?),
        0x43 => I::F32Const(r.f32_bits()?),
        0x44 => I::F64Const(r.f64_bits()?),
        0x45 => I::I32Eqz,
        0x46 => I::I32Eq,
        0x47 => I::I32Ne,
        0x48 => I::I32LtS,
        0x49 => I::I32LtU,
        0x4a => I::I32GtS,
        0x4b => I::I32GtU,
        0x4c => I::I32LeS,
        0x4d => I::I32LeU,
        0x4e => I::I32GeS,
        0x4f => I::I32GeU,
        0x50 => I::I64Eqz,
        0x51 => I::I64Eq,
        0x52 => I::I64Ne,
        0x53 => I::I64LtS,
        0x54 => I::I64LtU,
        0x55 => I::I64GtS,
        0x56 => I::I64GtU,
        0x57 => I::I64LeS,
        0x58 => I::I64LeU,
        0x59 => I::I64GeS,
        0x5a => I::I64GeU,
        0x5b => I::F32Eq,
        0x5c => I::F32Ne,
        0x5d => I::F32Lt,
        0x5e => I::F32Gt,
        0x5f => I::F32Le,
        0x60 => I::F32Ge,
        0x61 => I::F64Eq,
        0x62 => I::F64Ne,
        0x63 => I::F64Lt,
        0x64 => I::F64Gt,
        0x65 => I::F64Le,
        0x66 => I::F64Ge,
        0x67 => I::I32Clz,
        0x68 => I::I32Ctz,
        0x69 => I::I32Popcnt,
        0x6a => I::I32Add,
        0x6b => I::I32Sub,
        0x6c => I::I32Mul,
        0x6d => I::I32DivS,
        0x6e => I::I32DivU,
        0x6f => I::I32RemS,
        0x70 => I::I32RemU,
        0x71 => I::I32And,
        0x72 => I::I32Or,
        0x73 => I::I32Xor,
        0x74 => I::I32Shl,
        0x75 => I::I32ShrS,
        0x76 => I::I32ShrU,
        0x77 => I::I32Rotl,
        0x78 => I::I32Rotr,
        0x79 => I::I64Clz,
        0x7a => I::I64Ctz,
        0x7b => I::I64Popcnt,
        0x7c => I::I64Add,
        0x7d => I::I64Sub,
        0x7e => I::I64Mul,
        0x7f => I::I64DivS,
        0x80 => I::I64DivU,
        0x81 => I::I64RemS,
        0x82 => I::I64RemU,
        0x83 => I::I64And,
        0x84 => I::I64Or,
        0x85 => I::I64Xor,
        0x86 => I::I64Shl,
        0x87 => I::I64ShrS,
        0x88 => I::I64ShrU,
        0x89 => I::I64Rotl,
        0x8a => I::I64Rotr,
        0x8b => I::F32Abs,
        0x8c => I::F32Neg,
        0x8d => I::F32Ceil,
        0x8e => I::F32Floor,
        0x8f => I::F32Trunc,
        0x90 => I::F32Nearest,
        0x91 => I::F32Sqrt,
        0x92 => I::F32Add,
        0x93 => I::F32Sub,
        0x94 => I::F32Mul,
        0x95 => I::F32Div,
        0x96 => I::F32Min,
        0x97 => I::F32Max,
        0x98 => I::F32Copysign,
        0x99 => I::F64Abs,
        0x9a => I::F64Neg,
        0x9b => I::F64Ceil,
        0x9c => I::F64Floor,
        0x9d => I::F64Trunc,
        0x9e => I::F64Nearest,
        0x9f => I::F64Sqrt,
        0xa0 => I::F64Add,
        0xa1 => I::F64Sub,
        0xa2 => I::F64Mul,
        0xa3 => I::F64Div,
        0xa4 => I::F64Min,
        0xa5 => I::F64Max,
        0xa6 => I::F64Copysign,
        0xa7 => I::I32WrapI64,
        0xa8 => I::I32TruncSF32,
        0xa9 => I::I32TruncUF32,
        0xaa => I::I32TruncSF64,
        0xab => I::I32TruncUF64,
        0xac => I::I64ExtendSI32,
        0xad => I::I64ExtendUI32,
        0xae => I::I64TruncSF32,
        0xaf => I::I64TruncUF32,
        0xb0 => I::I64TruncSF64,
        0xb1 => I::I64TruncUF64,
        0xb2 => I::F32ConvertSI32,
        0xb3 => I::F32ConvertUI32,
        0xb4 => I::F32ConvertSI64,
        0xb5 => I::F32ConvertUI64,
        0xb6 => I::F32DemoteF64,
        0xb7 => I::F64ConvertSI32,
        0xb8 => I::F64ConvertUI32,
        0xb9 => I::F64ConvertSI64,
        0xba => I::F64ConvertUI64,
        0xbb => I::F64PromoteF32,
        0xbc => I::I32ReinterpretF32,
        0xbd => I::I64ReinterpretF64,
        0xbe => I::F32ReinterpretI32,
        0xbf => I::F64ReinterpretI64,
        0xc0 => I::I32Extend8S,
        0xc1 => I::I32Extend16S,
        0xc2 => I::I64Extend8S,
        0xc3 => I::I64Extend16S,
        0xc4 => I::I64Extend32S,
        0xfc => decode_misc(r)?,
        0xfd => decode_simd(r)?,
        0xfb => decode_gc(r)?,
        _ => return Err(r.malformed("unknown opcode")),
    })
}

fn decode_memarg(r: &mut Reader) -> Result<MemArg, Error> {
    let align_raw = r.u32()?;
    let has_mem_idx = align_raw & 0x40 != 0;
    let align_log2 = align_raw & 0x3f;
    let mem_idx = if has_mem_idx { r.u32()? } else { 0 };
    let offset = r.u64()?;
    Ok(MemArg { align_log2, offset, mem_idx })
}

fn decode_mem_idx_byte(r: &mut Reader) -> Result<u32, Error> {
    r.u32()
}

fn decode_misc(r: &mut Reader) -> Result<Instruction, Error> {
    use Instruction as I;
    let sub = r.u32()?;
    Ok(match sub {
        0 => I::I32TruncSatF32S,
        1 => I::I32TruncSatF32U,
        2 => I::I32TruncSatF64S,
        3 => I::I32TruncSatF64U,
        4 => I::I64TruncSatF32S,
        5 => I::I64TruncSatF32U,
        6 => I::I64TruncSatF64S,
        7 => I::I64TruncSatF64U,
        8 => {
            let data_index = r.u32()?;
            let mem_idx = decode_mem_idx_byte(r)?;
            I::MemoryInit { data_index, mem_idx }
        }
        9 => I::DataDrop(r.u32()?),
        10 => {
            let dst_mem = decode_mem_idx_byte(r)?;
            let src_mem = decode_mem_idx_byte(r)?;
            I::MemoryCopy { dst_mem, src_mem }
        }
        11 => I::MemoryFill(decode_mem_idx_byte(r)?),
        12 => {
            let elem_index = r.u32()?;
            let table_index = r.u32()?;
            I::TableInit { elem_index, table_index }
        }
        13 => I::ElemDrop(r.u32()?),
        14 => {
            let dst_table = r.u32()?;
            let src_table = r.u32()?;
            I::TableCopy { dst_table, src_table }
        }
        15 => I::TableGrow(r.u32()?),
        16 => I::TableSize(r.u32()?),
        17 => I::TableFill(r.u32()?),
        _ => I::GcMisc { sub_opcode: sub, operands: alloc::vec::Vec::new() },
    })
}

fn decode_simd(r: &mut Reader) -> Result<Instruction, Error> {
    use Instruction as I;
    let sub = r.u32()?;
    Ok(match sub {
        0 => I::V128Load(decode_memarg(r)?),
        11 => I::V128Store(decode_memarg(r)?),
        12 => I::V128Const(r.v128()?),
        0x52 => I::V128Bitselect,
        _ => I::SimdMisc { sub_opcode: sub, operands: decode_simd_operands(r, sub)? },
    })
}

/// Decodes the trailing operands for the SIMD sub-opcodes this rewriter
/// does not name individually, based on the opcode ranges Binaryen's
/// `wasm-binary-writer` documents for lane/memarg-shaped SIMD instructions.
fn decode_simd_operands(r: &mut Reader, sub: u32) -> Result<Vec<Operand>, Error> {
    let mut operands = Vec::new();
    // Load/store-lane forms carry a memarg plus a trailing lane index;
    // extract_lane/replace_lane carry a single lane index byte; shuffle
    // carries 16 raw lane-select bytes; the zero-extending loads carry a
    // memarg and nothing else. Everything else (binary, unary, comparison,
    // shift, splat) carries no immediate.
    match sub {
        84..=91 => {
            operands.push(Operand::Mem(decode_memarg(r)?));
            operands.push(Operand::Lane(r.byte()?));
        }
        1..=10 | 92 | 93 => operands.push(Operand::Mem(decode_memarg(r)?)),
        13 => operands.push(Operand::V128(r.v128()?)),
        21..=34 => operands.push(Operand::Lane(r.byte()?)),
        _ => {}
    }
    Ok(operands)
}

/// Decodes the trailing immediates for GC sub-opcodes, so the reader stays
/// in sync with the rest of the function body. Type/field/data/elem indices
/// decode as `Operand::U32`; a heap type immediate (`ref.test`/`ref.cast`/
/// `br_on_cast*`) is the same signed LEB shape as a block type, so it
/// decodes with `r.i33()` into an `Operand::I32`; `br_on_cast`'s leading
/// cast-flags byte reuses `Operand::Lane`, which already serializes as a
/// single raw byte.
fn decode_gc(r: &mut Reader) -> Result<Instruction, Error> {
    let sub = r.u32()?;
    let mut operands = Vec::new();
    match sub {
        0 | 1 | 6 | 7 | 11 | 12 | 13 | 14 | 16 => {
            operands.push(Operand::U32(r.u32()?));
        }
        2 | 3 | 4 | 5 | 9 | 10 | 17 | 18 | 19 => {
            operands.push(Operand::U32(r.u32()?));
            operands.push(Operand::U32(r.u32()?));
        }
        8 => {
            operands.push(Operand::U32(r.u32()?));
            operands.push(Operand::U32(r.u32()?));
        }
        15 | 26 | 27 | 28 | 29 | 30 => {}
        20 | 21 | 22 | 23 => {
            operands.push(Operand::I32(r.i33()? as i32));
        }
        24 | 25 => {
            operands.push(Operand::Lane(r.byte()?));
            operands.push(Operand::U32(r.u32()?));
            operands.push(Operand::I32(r.i33()? as i32));
            operands.push(Operand::I32(r.i33()? as i32));
        }
        _ => return Err(r.malformed("unknown gc sub-opcode")),
    }
    Ok(Instruction::GcMisc { sub_opcode: sub, operands })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_new_consumes_its_type_index_and_leaves_the_cursor_in_sync() {
        // sub-opcode 0 (struct.new), type_idx=5, followed by an unrelated
        // byte that must still decode correctly once the type index is
        // consumed.
        let bytes = [0x00, 0x05, 0x0b];
        let mut r = Reader::new(&bytes);
        let instr = decode_gc(&mut r).unwrap();
        assert!(matches!(instr, Instruction::GcMisc { sub_opcode: 0, ref operands } if operands == &[Operand::U32(5)]));
        assert_eq!(r.byte().unwrap(), 0x0b);
    }

    #[test]
    fn array_new_fixed_consumes_type_index_and_length() {
        let bytes = [0x08, 0x03, 0x07];
        let mut r = Reader::new(&bytes);
        let instr = decode_gc(&mut r).unwrap();
        assert!(matches!(instr, Instruction::GcMisc { sub_opcode: 8, ref operands } if operands == &[Operand::U32(3), Operand::U32(7)]));
    }

    #[test]
    fn array_len_consumes_no_immediate() {
        let bytes = [0x0f];
        let mut r = Reader::new(&bytes);
        let instr = decode_gc(&mut r).unwrap();
        assert!(matches!(instr, Instruction::GcMisc { sub_opcode: 15, ref operands } if operands.is_empty()));
    }

    #[test]
    fn ref_cast_consumes_a_heap_type_immediate() {
        // sub-opcode 22 (ref.cast), heap type `func` (0x70) as its s33 LEB128 form.
        let bytes = [0x16, 0x70];
        let mut r = Reader::new(&bytes);
        let instr = decode_gc(&mut r).unwrap();
        assert!(matches!(instr, Instruction::GcMisc { sub_opcode: 22, ref operands } if operands.len() == 1));
    }

    #[test]
    fn shuffle_consumes_sixteen_lane_bytes() {
        let lanes: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];
        let mut r = Reader::new(&lanes);
        let operands = decode_simd_operands(&mut r, 13).unwrap();
        assert_eq!(operands, alloc::vec![Operand::V128(lanes)]);
        assert_eq!(r.pos, 16);
    }

    #[test]
    fn v128_load32_zero_consumes_only_a_memarg() {
        // align=2, offset=0
        let bytes = [0x02, 0x00];
        let mut r = Reader::new(&bytes);
        let operands = decode_simd_operands(&mut r, 92).unwrap();
        assert_eq!(operands.len(), 1);
        assert!(matches!(operands[0], Operand::Mem(_)));
    }
}
