//! Per-opcode instruction handlers (C3, `spec.md` §4.3).
//!
//! Each handler performs the same two coupled tasks: pop the simulated
//! stack, emit code that reloads those values from their locals, perform
//! the real operation, and (if it produces a value) store the result into
//! a fresh temp local and push that onto the simulated stack. Control-flow
//! opcodes are never passed here; `crate::transform` consumes them
//! directly during structured descent (`spec.md` §4.3).

use alloc::vec::Vec;

use smallvec::SmallVec;

use crate::binary::instr::{Instruction, Operand};
use crate::binary::types::{RefType, ValType};
use crate::emit::Emitter;
use crate::error::Error;

/// Most opcodes pop 0–3 operands; inline storage avoids a heap allocation
/// per instruction on the hot path through `emit_nary`.
type Popped = SmallVec<[StackEntry; 4]>;

/// One entry of the simulated operand stack: a local index bound to a type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StackEntry {
    pub local: u32,
    pub ty: ValType,
}

/// Allocates temp locals, keeping a "pre-declared" prefix matching a
/// dry-run estimate and appending fresh slots on a type mismatch
/// (`spec.md` §4.3 "Temp-local allocation policy").
#[derive(Debug, Default)]
pub struct LocalAllocator {
    types: Vec<ValType>,
    next_free: usize,
}

impl LocalAllocator {
    pub fn new(predeclared: Vec<ValType>) -> Self {
        LocalAllocator { types: predeclared, next_free: 0 }
    }

    pub fn types(&self) -> &[ValType] {
        &self.types
    }

    /// Returns the index of a local of the given type, reusing the next
    /// pre-declared slot if it matches, else appending a fresh one.
    pub fn alloc(&mut self, ty: ValType) -> u32 {
        if self.next_free < self.types.len() && self.types[self.next_free] == ty {
            let idx = self.next_free;
            self.next_free += 1;
            return idx as u32;
        }
        let idx = self.types.len();
        self.types.push(ty);
        idx as u32
    }
}

/// Shared state the handler table operates on while walking one function.
pub struct RewriteCtx<'a> {
    pub emitter: &'a mut Emitter,
    pub stack: Vec<StackEntry>,
    pub locals: &'a mut LocalAllocator,
    /// A designated scratch local returned by `pop` on stack underflow, so
    /// the rewriter stays total across unreachable code regions
    /// (`spec.md` §3 "Simulated operand stack").
    pub fallback_local: u32,
    /// Declared type of every local (params first, then the function's own
    /// declared locals), indexed the same way `local.get`/`local.set` index
    /// them. Needed so `local.get`/`global.get` can materialize a temp of
    /// the variable's real type instead of guessing `i32`.
    pub local_types: &'a [ValType],
    /// Declared content type of every module global, across the
    /// imported/local index boundary (`Module::global_type`).
    pub global_types: &'a [ValType],
}

impl<'a> RewriteCtx<'a> {
    fn pop(&mut self) -> StackEntry {
        self.stack.pop().unwrap_or(StackEntry { local: self.fallback_local, ty: ValType::I32 })
    }

    fn push(&mut self, entry: StackEntry) {
        self.stack.push(entry);
    }

    /// Pops `n` entries, returning them in original (bottom-to-top) order.
    fn pop_n(&mut self, n: usize) -> Popped {
        let mut popped = Popped::with_capacity(n);
        for _ in 0..n {
            popped.push(self.pop());
        }
        popped.reverse();
        popped
    }

    fn reload(&mut self, entries: &[StackEntry]) {
        for e in entries {
            self.emitter.local_get(e.local);
        }
    }

    fn materialize(&mut self, ty: ValType) -> u32 {
        let local = self.locals.alloc(ty);
        self.emitter.local_set(local);
        local
    }
}

/// Handles one non-structural instruction: mutates `ctx`'s simulated stack
/// and emits the flattened replacement code.
pub fn handle(ctx: &mut RewriteCtx, instr: &Instruction) -> Result<(), Error> {
    use Instruction as I;
    match instr {
        I::Unreachable | I::Nop => {
            ctx.emitter.push(instr.clone());
        }
        I::Drop => {
            ctx.pop();
        }

        // --- variable instructions: spec.md §4.3 "Local / Global get-set-tee" ---
        I::LocalGet(idx) => {
            let ty = ctx.local_types.get(*idx as usize).copied().unwrap_or(ValType::I32);
            ctx.emitter.local_get(*idx);
            let local = ctx.materialize(ty);
            ctx.push(StackEntry { local, ty });
        }
        I::LocalSet(idx) => {
            let v = ctx.pop();
            ctx.emitter.local_get(v.local).local_set(*idx);
        }
        I::LocalTee(idx) => {
            let v = ctx.pop();
            ctx.emitter.local_get(v.local).local_set(*idx);
            ctx.push(StackEntry { local: *idx, ty: v.ty });
        }
        I::GlobalGet(idx) => {
            let ty = ctx.global_types.get(*idx as usize).copied().unwrap_or(ValType::I32);
            ctx.emitter.global_get(*idx);
            let local = ctx.materialize(ty);
            ctx.push(StackEntry { local, ty });
        }
        I::GlobalSet(idx) => {
            let v = ctx.pop();
            ctx.emitter.local_get(v.local).global_set(*idx);
        }

        // --- constants: arity 0, push ---
        I::I32Const(_) => emit_const(ctx, instr.clone(), ValType::I32),
        I::I64Const(_) => emit_const(ctx, instr.clone(), ValType::I64),
        I::F32Const(_) => emit_const(ctx, instr.clone(), ValType::F32),
        I::F64Const(_) => emit_const(ctx, instr.clone(), ValType::F64),
        I::V128Const(_) => emit_const(ctx, instr.clone(), ValType::V128),
        I::RefNull(rt) => emit_const(ctx, instr.clone(), ValType::Ref(*rt)),
        I::RefFunc(_) => emit_const(ctx, instr.clone(), ValType::Ref(RefType::Func)),

        // --- unary ---
        I::I32Eqz
        | I::I64Eqz
        | I::I32Clz
        | I::I32Ctz
        | I::I32Popcnt
        | I::I64Clz
        | I::I64Ctz
        | I::I64Popcnt
        | I::F32Abs
        | I::F32Neg
        | I::F32Ceil
        | I::F32Floor
        | I::F32Trunc
        | I::F32Nearest
        | I::F32Sqrt
        | I::F64Abs
        | I::F64Neg
        | I::F64Ceil
        | I::F64Floor
        | I::F64Trunc
        | I::F64Nearest
        | I::F64Sqrt
        | I::I32WrapI64
        | I::I32TruncSF32
        | I::I32TruncUF32
        | I::I32TruncSF64
        | I::I32TruncUF64
        | I::I64ExtendSI32
        | I::I64ExtendUI32
        | I::I64TruncSF32
        | I::I64TruncUF32
        | I::I64TruncSF64
        | I::I64TruncUF64
        | I::F32ConvertSI32
        | I::F32ConvertUI32
        | I::F32ConvertSI64
        | I::F32ConvertUI64
        | I::F32DemoteF64
        | I::F64ConvertSI32
        | I::F64ConvertUI32
        | I::F64ConvertSI64
        | I::F64ConvertUI64
        | I::F64PromoteF32
        | I::I32ReinterpretF32
        | I::I64ReinterpretF64
        | I::F32ReinterpretI32
        | I::F64ReinterpretI64
        | I::I32Extend8S
        | I::I32Extend16S
        | I::I64Extend8S
        | I::I64Extend16S
        | I::I64Extend32S
        | I::I32TruncSatF32S
        | I::I32TruncSatF32U
        | I::I32TruncSatF64S
        | I::I32TruncSatF64U
        | I::I64TruncSatF32S
        | I::I64TruncSatF32U
        | I::I64TruncSatF64S
        | I::I64TruncSatF64U
        | I::RefIsNull => {
            let push_ty = unary_result_type(instr);
            emit_nary(ctx, instr.clone(), 1, push_ty);
        }

        // --- binary arithmetic / comparison ---
        I::I32Eq
        | I::I32Ne
        | I::I32LtS
        | I::I32LtU
        | I::I32GtS
        | I::I32GtU
        | I::I32LeS
        | I::I32LeU
        | I::I32GeS
        | I::I32GeU
        | I::I64Eq
        | I::I64Ne
        | I::I64LtS
        | I::I64LtU
        | I::I64GtS
        | I::I64GtU
        | I::I64LeS
        | I::I64LeU
        | I::I64GeS
        | I::I64GeU
        | I::F32Eq
        | I::F32Ne
        | I::F32Lt
        | I::F32Gt
        | I::F32Le
        | I::F32Ge
        | I::F64Eq
        | I::F64Ne
        | I::F64Lt
        | I::F64Gt
        | I::F64Le
        | I::F64Ge => emit_nary(ctx, instr.clone(), 2, Some(ValType::I32)),

        I::I32Add
        | I::I32Sub
        | I::I32Mul
        | I::I32DivS
        | I::I32DivU
        | I::I32RemS
        | I::I32RemU
        | I::I32And
        | I::I32Or
        | I::I32Xor
        | I::I32Shl
        | I::I32ShrS
        | I::I32ShrU
        | I::I32Rotl
        | I::I32Rotr => emit_nary(ctx, instr.clone(), 2, Some(ValType::I32)),

        I::I64Add
        | I::I64Sub
        | I::I64Mul
        | I::I64DivS
        | I::I64DivU
        | I::I64RemS
        | I::I64RemU
        | I::I64And
        | I::I64Or
        | I::I64Xor
        | I::I64Shl
        | I::I64ShrS
        | I::I64ShrU
        | I::I64Rotl
        | I::I64Rotr => emit_nary(ctx, instr.clone(), 2, Some(ValType::I64)),

        I::F32Add | I::F32Sub | I::F32Mul | I::F32Div | I::F32Min | I::F32Max | I::F32Copysign => {
            emit_nary(ctx, instr.clone(), 2, Some(ValType::F32))
        }
        I::F64Add | I::F64Sub | I::F64Mul | I::F64Div | I::F64Min | I::F64Max | I::F64Copysign => {
            emit_nary(ctx, instr.clone(), 2, Some(ValType::F64))
        }

        // --- memory ---
        I::I32Load(_)
        | I::I32Load8S(_)
        | I::I32Load8U(_)
        | I::I32Load16S(_)
        | I::I32Load16U(_) => emit_nary(ctx, instr.clone(), 1, Some(ValType::I32)),
        I::I64Load(_)
        | I::I64Load8S(_)
        | I::I64Load8U(_)
        | I::I64Load16S(_)
        | I::I64Load16U(_)
        | I::I64Load32S(_)
        | I::I64Load32U(_) => emit_nary(ctx, instr.clone(), 1, Some(ValType::I64)),
        I::F32Load(_) => emit_nary(ctx, instr.clone(), 1, Some(ValType::F32)),
        I::F64Load(_) => emit_nary(ctx, instr.clone(), 1, Some(ValType::F64)),
        I::V128Load(_) => emit_nary(ctx, instr.clone(), 1, Some(ValType::V128)),

        I::I32Store(_) | I::I32Store8(_) | I::I32Store16(_) => emit_store(ctx, instr.clone()),
        I::I64Store(_) | I::I64Store8(_) | I::I64Store16(_) | I::I64Store32(_) => {
            emit_store(ctx, instr.clone())
        }
        I::F32Store(_) | I::F64Store(_) | I::V128Store(_) => emit_store(ctx, instr.clone()),

        I::MemorySize(_) => emit_nary(ctx, instr.clone(), 0, Some(ValType::I32)),
        I::MemoryGrow(_) => emit_nary(ctx, instr.clone(), 1, Some(ValType::I32)),
        I::MemoryCopy { .. } | I::MemoryFill(_) | I::MemoryInit { .. } => {
            emit_nary(ctx, instr.clone(), 3, None)
        }
        I::DataDrop(_) => emit_nary(ctx, instr.clone(), 0, None),

        // --- table ---
        I::TableGet(_) => emit_nary(ctx, instr.clone(), 1, Some(ValType::Ref(RefType::Func))),
        I::TableSet(_) => emit_nary(ctx, instr.clone(), 2, None),
        I::TableGrow(_) => emit_nary(ctx, instr.clone(), 2, Some(ValType::I32)),
        I::TableSize(_) => emit_nary(ctx, instr.clone(), 0, Some(ValType::I32)),
        I::TableFill(_) | I::TableCopy { .. } | I::TableInit { .. } => {
            emit_nary(ctx, instr.clone(), 3, None)
        }
        I::ElemDrop(_) => emit_nary(ctx, instr.clone(), 0, None),

        // --- parametric ---
        I::Select => {
            let popped = ctx.pop_n(3);
            let ty = popped[0].ty;
            ctx.reload(&popped);
            ctx.emitter.push(instr.clone());
            let local = ctx.materialize(ty);
            ctx.push(StackEntry { local, ty });
        }
        I::SelectTyped(types) => {
            let popped = ctx.pop_n(3);
            ctx.reload(&popped);
            ctx.emitter.push(instr.clone());
            let ty = types.first().copied().unwrap_or(ValType::I32);
            let local = ctx.materialize(ty);
            ctx.push(StackEntry { local, ty });
        }

        // --- SIMD named ops ---
        I::V128Bitselect => emit_nary(ctx, instr.clone(), 3, Some(ValType::V128)),

        // --- generic prefixed fallbacks: best-effort arity from operand shape ---
        I::SimdMisc { operands, .. } => emit_generic_prefixed(ctx, instr.clone(), operands, Some(ValType::V128)),
        I::GcMisc { operands, .. } => emit_generic_prefixed(ctx, instr.clone(), operands, None),

        other => {
            debug_assert!(!other.is_structural(), "control flow must not reach the handler table");
            return Err(Error::UnsupportedFeature {
                reason: alloc::format!("no handler registered for {other:?}"),
            });
        }
    }
    Ok(())
}

fn emit_const(ctx: &mut RewriteCtx, instr: Instruction, ty: ValType) {
    ctx.emitter.push(instr);
    let local = ctx.materialize(ty);
    ctx.push(StackEntry { local, ty });
}

fn emit_nary(ctx: &mut RewriteCtx, instr: Instruction, arity: usize, push: Option<ValType>) {
    let popped = ctx.pop_n(arity);
    ctx.reload(&popped);
    ctx.emitter.push(instr);
    if let Some(ty) = push {
        let local = ctx.materialize(ty);
        ctx.push(StackEntry { local, ty });
    }
}

fn emit_store(ctx: &mut RewriteCtx, instr: Instruction) {
    let value = ctx.pop();
    let addr = ctx.pop();
    ctx.reload(&[addr, value]);
    ctx.emitter.push(instr);
}

fn emit_generic_prefixed(ctx: &mut RewriteCtx, instr: Instruction, operands: &[Operand], push: Option<ValType>) {
    // Conservative default arity for opcodes this rewriter doesn't name
    // individually: one operand in, matching the common unary/splat shape.
    // `spec.md` §9 "Open questions" notes the stack-effect table is only
    // pinned down for the opcodes §8 lists by name; this is the fallback
    // for everything else.
    let arity = if operands.iter().any(|o| matches!(o, Operand::Mem(_))) { 1 } else { 1 };
    emit_nary(ctx, instr, arity, push)
}

fn unary_result_type(instr: &Instruction) -> Option<ValType> {
    use Instruction as I;
    Some(match instr {
        I::I32Eqz | I::I64Eqz | I::RefIsNull => ValType::I32,
        I::I32Clz | I::I32Ctz | I::I32Popcnt | I::I32WrapI64 | I::I32TruncSF32 | I::I32TruncUF32
        | I::I32TruncSF64 | I::I32TruncUF64 | I::I32ReinterpretF32 | I::I32Extend8S | I::I32Extend16S
        | I::I32TruncSatF32S | I::I32TruncSatF32U | I::I32TruncSatF64S | I::I32TruncSatF64U => ValType::I32,
        I::I64Clz | I::I64Ctz | I::I64Popcnt | I::I64ExtendSI32 | I::I64ExtendUI32 | I::I64TruncSF32
        | I::I64TruncUF32 | I::I64TruncSF64 | I::I64TruncUF64 | I::I64ReinterpretF64 | I::I64Extend8S
        | I::I64Extend16S | I::I64Extend32S | I::I64TruncSatF32S | I::I64TruncSatF32U
        | I::I64TruncSatF64S | I::I64TruncSatF64U => ValType::I64,
        I::F32Abs | I::F32Neg | I::F32Ceil | I::F32Floor | I::F32Trunc | I::F32Nearest | I::F32Sqrt
        | I::F32ConvertSI32 | I::F32ConvertUI32 | I::F32ConvertSI64 | I::F32ConvertUI64 | I::F32DemoteF64
        | I::F32ReinterpretI32 => ValType::F32,
        I::F64Abs | I::F64Neg | I::F64Ceil | I::F64Floor | I::F64Trunc | I::F64Nearest | I::F64Sqrt
        | I::F64ConvertSI32 | I::F64ConvertUI32 | I::F64ConvertSI64 | I::F64ConvertUI64 | I::F64PromoteF32
        | I::F64ReinterpretI64 => ValType::F64,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::types::MemArg;

    fn ctx_with<'a>(emitter: &'a mut Emitter, locals: &'a mut LocalAllocator) -> RewriteCtx<'a> {
        RewriteCtx { emitter, stack: Vec::new(), locals, fallback_local: 0, local_types: &[], global_types: &[] }
    }

    fn ctx_with_types<'a>(
        emitter: &'a mut Emitter,
        locals: &'a mut LocalAllocator,
        local_types: &'a [ValType],
        global_types: &'a [ValType],
    ) -> RewriteCtx<'a> {
        RewriteCtx { emitter, stack: Vec::new(), locals, fallback_local: 0, local_types, global_types }
    }

    #[test]
    fn i32_add_pops_two_pushes_one() {
        let mut emitter = Emitter::new();
        let mut locals = LocalAllocator::new(Vec::new());
        let mut ctx = ctx_with(&mut emitter, &mut locals);
        ctx.push(StackEntry { local: 1, ty: ValType::I32 });
        ctx.push(StackEntry { local: 2, ty: ValType::I32 });
        handle(&mut ctx, &Instruction::I32Add).unwrap();
        assert_eq!(ctx.stack.len(), 1);
        assert_eq!(ctx.stack[0].ty, ValType::I32);
    }

    #[test]
    fn i64_eqz_pops_one_pushes_i32() {
        let mut emitter = Emitter::new();
        let mut locals = LocalAllocator::new(Vec::new());
        let mut ctx = ctx_with(&mut emitter, &mut locals);
        ctx.push(StackEntry { local: 1, ty: ValType::I64 });
        handle(&mut ctx, &Instruction::I64Eqz).unwrap();
        assert_eq!(ctx.stack.len(), 1);
        assert_eq!(ctx.stack[0].ty, ValType::I32);
    }

    #[test]
    fn select_pushes_type_of_value_operands() {
        let mut emitter = Emitter::new();
        let mut locals = LocalAllocator::new(Vec::new());
        let mut ctx = ctx_with(&mut emitter, &mut locals);
        ctx.push(StackEntry { local: 1, ty: ValType::F64 });
        ctx.push(StackEntry { local: 2, ty: ValType::F64 });
        ctx.push(StackEntry { local: 3, ty: ValType::I32 });
        handle(&mut ctx, &Instruction::Select).unwrap();
        assert_eq!(ctx.stack.len(), 1);
        assert_eq!(ctx.stack[0].ty, ValType::F64);
    }

    #[test]
    fn memory_copy_pops_three_pushes_zero() {
        let mut emitter = Emitter::new();
        let mut locals = LocalAllocator::new(Vec::new());
        let mut ctx = ctx_with(&mut emitter, &mut locals);
        for _ in 0..3 {
            ctx.push(StackEntry { local: 1, ty: ValType::I32 });
        }
        handle(&mut ctx, &Instruction::MemoryCopy { dst_mem: 0, src_mem: 0 }).unwrap();
        assert!(ctx.stack.is_empty());
    }

    #[test]
    fn table_grow_pops_two_pushes_i32() {
        let mut emitter = Emitter::new();
        let mut locals = LocalAllocator::new(Vec::new());
        let mut ctx = ctx_with(&mut emitter, &mut locals);
        ctx.push(StackEntry { local: 1, ty: ValType::Ref(RefType::Func) });
        ctx.push(StackEntry { local: 2, ty: ValType::I32 });
        handle(&mut ctx, &Instruction::TableGrow(0)).unwrap();
        assert_eq!(ctx.stack.len(), 1);
        assert_eq!(ctx.stack[0].ty, ValType::I32);
    }

    #[test]
    fn v128_load_pops_one_pushes_v128() {
        let mut emitter = Emitter::new();
        let mut locals = LocalAllocator::new(Vec::new());
        let mut ctx = ctx_with(&mut emitter, &mut locals);
        ctx.push(StackEntry { local: 1, ty: ValType::I32 });
        handle(&mut ctx, &Instruction::V128Load(MemArg { align_log2: 4, offset: 0, mem_idx: 0 })).unwrap();
        assert_eq!(ctx.stack.len(), 1);
        assert_eq!(ctx.stack[0].ty, ValType::V128);
    }

    #[test]
    fn v128_bitselect_pops_three_pushes_v128() {
        let mut emitter = Emitter::new();
        let mut locals = LocalAllocator::new(Vec::new());
        let mut ctx = ctx_with(&mut emitter, &mut locals);
        for _ in 0..3 {
            ctx.push(StackEntry { local: 1, ty: ValType::V128 });
        }
        handle(&mut ctx, &Instruction::V128Bitselect).unwrap();
        assert_eq!(ctx.stack.len(), 1);
        assert_eq!(ctx.stack[0].ty, ValType::V128);
    }

    #[test]
    fn drop_emits_nothing_and_pops() {
        let mut emitter = Emitter::new();
        let mut locals = LocalAllocator::new(Vec::new());
        let mut ctx = ctx_with(&mut emitter, &mut locals);
        ctx.push(StackEntry { local: 1, ty: ValType::I32 });
        handle(&mut ctx, &Instruction::Drop).unwrap();
        assert!(ctx.stack.is_empty());
        assert!(ctx.emitter.instructions().is_empty());
    }

    #[test]
    fn local_get_materializes_a_temp_of_the_locals_real_type() {
        let mut emitter = Emitter::new();
        let mut locals = LocalAllocator::new(Vec::new());
        let local_types = [ValType::I32, ValType::F64];
        let mut ctx = ctx_with_types(&mut emitter, &mut locals, &local_types, &[]);
        handle(&mut ctx, &Instruction::LocalGet(1)).unwrap();
        assert_eq!(ctx.stack.len(), 1);
        assert_eq!(ctx.stack[0].ty, ValType::F64);
        assert_eq!(ctx.locals.types(), &[ValType::F64]);
    }

    #[test]
    fn global_get_materializes_a_temp_of_the_globals_real_type() {
        let mut emitter = Emitter::new();
        let mut locals = LocalAllocator::new(Vec::new());
        let global_types = [ValType::I64];
        let mut ctx = ctx_with_types(&mut emitter, &mut locals, &[], &global_types);
        handle(&mut ctx, &Instruction::GlobalGet(0)).unwrap();
        assert_eq!(ctx.stack.len(), 1);
        assert_eq!(ctx.stack[0].ty, ValType::I64);
        assert_eq!(ctx.locals.types(), &[ValType::I64]);
    }

    #[test]
    fn allocator_reuses_predeclared_prefix_then_appends() {
        let mut alloc = LocalAllocator::new(alloc::vec![ValType::I32, ValType::F64]);
        assert_eq!(alloc.alloc(ValType::I32), 0);
        // type mismatch against predeclared slot 1 (F64) forces a fresh local
        assert_eq!(alloc.alloc(ValType::I32), 2);
        assert_eq!(alloc.types().len(), 3);
    }
}
