//! Function transformer (C7, `spec.md` §4.7): the per-function orchestrator
//! that parses, linearizes, flattens, and wraps a body with the asyncify
//! save/restore scaffolding.

use alloc::vec::Vec;

use log::{debug, trace};
use smallvec::SmallVec;

use crate::binary::instr::Instruction;
use crate::binary::module::{Function, Module};
use crate::binary::types::{BlockType, FuncType, MemArg, ValType};
use crate::callgraph::AsyncSet;
use crate::cfir;
use crate::emit::Emitter;
use crate::error::Error;
use crate::handlers::{self, LocalAllocator, RewriteCtx, StackEntry};
use crate::linearize::{flatten, Linearizer};
use wasm_asyncify_core::{F32, F64};

/// The two globals the assembler synthesizes (§4.8), carried by index so
/// the transformer doesn't need to know whether they're locally defined or
/// imported.
#[derive(Debug, Clone, Copy)]
pub struct AsyncifyGlobals {
    pub state: u32,
    pub data: u32,
}

const NORMAL: i32 = 0;
const UNWINDING: i32 = 1;
const REWINDING: i32 = 2;

/// Rewrites every instrumented function in `module` in place.
pub fn transform_module(
    module: &mut Module,
    async_set: &AsyncSet,
    globals: AsyncifyGlobals,
) -> Result<(), Error> {
    let imported = module.imported_function_count();
    let types = module.types.clone();
    let func_type_indices = module.functions.clone();
    let total_functions = module.total_function_count();
    // Resolved once up front so `call_signature` can look up a direct
    // call's callee arity/result without threading the whole module
    // through the per-function rewrite.
    let func_types: Vec<Option<FuncType>> =
        (0..total_functions).map(|idx| module.function_type(idx).cloned()).collect();
    // Likewise for globals, so `local.get`/`global.get` can materialize a
    // temp of the variable's real declared type instead of guessing `i32`.
    let total_globals = module.imported_global_count() + module.globals.len() as u32;
    let global_types: Vec<ValType> =
        (0..total_globals).map(|idx| module.global_type(idx).unwrap_or(ValType::I32)).collect();
    for (local_idx, func) in module.code.iter_mut().enumerate() {
        let func_idx = imported + local_idx as u32;
        if !async_set.is_instrumented(func_idx) {
            continue;
        }
        debug!("instrumenting function {func_idx}");
        let type_idx = func_type_indices[local_idx];
        let func_type = types.get(type_idx as usize).cloned().ok_or_else(|| Error::Malformed {
            offset: local_idx,
            reason: "function type index out of range",
        })?;
        *func =
            transform_function(func, &func_type, &types, &func_types, &global_types, async_set, globals)?;
    }
    Ok(())
}

fn transform_function(
    func: &Function,
    func_type: &FuncType,
    types: &[FuncType],
    func_types: &[Option<FuncType>],
    global_types: &[ValType],
    async_set: &AsyncSet,
    globals: AsyncifyGlobals,
) -> Result<Function, Error> {
    let is_async_call = |instr: &Instruction| match instr {
        Instruction::Call(idx) => async_set.is_instrumented(*idx),
        Instruction::CallIndirect { .. } | Instruction::CallRef { .. } => {
            async_set.is_instrumented(u32::MAX)
        }
        _ => false,
    };

    let original_locals = func.expand_locals();
    let all_locals: Vec<ValType> =
        func_type.params.iter().copied().chain(original_locals.iter().copied()).collect();
    // Fixed snapshot of every locally-addressable local's declared type,
    // captured before the allocator appends any rewriter-internal temps;
    // `local.get`/`local.set`/`local.tee` only ever index into this prefix.
    let local_types = all_locals.clone();

    let tree = cfir::parse(&func.body, types)?;

    let mut allocator = LocalAllocator::new(all_locals);
    let call_idx_local = allocator.alloc(ValType::I32);
    let fallback_local = allocator.alloc(ValType::I32);

    let linearized = {
        let mut lin = Linearizer::new(&mut allocator, &is_async_call);
        lin.run(tree)
    };
    let flat = flatten(&linearized);
    trace!("linearized body has {} instructions", flat.len());

    let mut emitter = Emitter::new();
    let mut ctx = RewriteCtx {
        emitter: &mut emitter,
        stack: Vec::new(),
        locals: &mut allocator,
        fallback_local,
        local_types: &local_types,
        global_types,
    };

    let mut call_site = 0u32;
    walk_and_emit(
        &flat,
        &mut ctx,
        types,
        func_types,
        &func_type.results,
        globals,
        call_idx_local,
        &mut call_site,
        &is_async_call,
    )?;
    // Falling off the end of the (implicit) top-level sequence is the
    // function's other exit edge alongside an explicit `return`, so reload
    // its declared results the same way before the save/restore epilogue
    // and the real closing `end` are appended.
    reload_results(&mut ctx, &func_type.results);

    let body_instrs = emitter.into_instructions();
    let all_locals = allocator.types().to_vec();
    let wrapped = wrap_with_save_restore(body_instrs, &all_locals, call_idx_local, globals);

    let new_params_count = func_type.params.len();
    let new_declared = all_locals[new_params_count..].to_vec();
    let grouped = group_locals(&new_declared);

    Ok(Function { locals: grouped, body: wrapped })
}

/// Walks a flattened (linearized) instruction stream, dispatching
/// structural opcodes straight through and everything else to the handler
/// table, wrapping each async call site per `spec.md` §4.7 step 4.
///
/// `instrs` is the function's top-level sequence with its terminating `end`
/// already consumed by `cfir::parse` (`flatten` never re-emits one for the
/// outer `Seq`; only nested `Block`/`If` nodes get an explicit `end`, via
/// their own node). So there are two function-level exit edges needing a
/// reload of the function's declared results from their locals, same as any
/// other handler boundary: an explicit `return` mid-body, and falling off
/// the end of this loop, which is handled by the caller appending its own
/// reload once `walk_and_emit` returns.
fn walk_and_emit(
    instrs: &[Instruction],
    ctx: &mut RewriteCtx,
    types: &[FuncType],
    func_types: &[Option<FuncType>],
    result_types: &[ValType],
    globals: AsyncifyGlobals,
    call_idx_local: u32,
    call_site: &mut u32,
    is_async_call: &impl Fn(&Instruction) -> bool,
) -> Result<(), Error> {
    for instr in instrs {
        if instr.is_structural() {
            if instr.is_call() {
                if is_async_call(instr) {
                    emit_async_call(
                        ctx,
                        instr.clone(),
                        types,
                        func_types,
                        result_types,
                        globals,
                        call_idx_local,
                        call_site,
                    )?;
                } else {
                    emit_plain_call(ctx, instr.clone(), types, func_types)?;
                }
            } else if matches!(instr, Instruction::ReturnCall(_) | Instruction::ReturnCallIndirect { .. }) {
                // A tail call never returns control to this frame, so there is
                // no result to stash into a local; only its arguments need
                // reloading from their locals.
                let (arity, _) = call_signature(instr, types, func_types);
                let args = pop_n_from_stack(ctx, arity);
                for a in &args {
                    ctx.emitter.local_get(a.local);
                }
                ctx.emitter.push(instr.clone());
            } else if matches!(instr, Instruction::Return) {
                reload_results(ctx, result_types);
                ctx.emitter.push(instr.clone());
            } else {
                ctx.emitter.push(instr.clone());
            }
            continue;
        }
        handlers::handle(ctx, instr)?;
    }
    Ok(())
}

/// Pops `result_types.len()` entries off the simulated stack and reloads
/// them onto the real stack, in their original left-to-right order, ahead
/// of a `return` or the function's closing `end`.
fn reload_results(ctx: &mut RewriteCtx, result_types: &[ValType]) {
    let values = pop_n_from_stack(ctx, result_types.len());
    for v in &values {
        ctx.emitter.local_get(v.local);
    }
}

/// Pushes the zero/default value for each of `result_types`, for the
/// unwinding bubble-out path (`spec.md` §4.7 step 4): "functions with
/// return values must materialize a dummy default value ... it is never
/// observed by the host because `state != Normal` is checked before use."
fn emit_default_results(emitter: &mut Emitter, result_types: &[ValType]) {
    for &ty in result_types {
        match ty {
            ValType::I32 => {
                emitter.i32_const(0);
            }
            ValType::I64 => {
                emitter.push(Instruction::I64Const(0));
            }
            ValType::F32 => {
                emitter.push(Instruction::F32Const(F32::from(0.0f32)));
            }
            ValType::F64 => {
                emitter.push(Instruction::F64Const(F64::from(0.0f64)));
            }
            ValType::V128 => {
                emitter.push(Instruction::V128Const([0u8; 16]));
            }
            ValType::Ref(rt) => {
                emitter.push(Instruction::RefNull(rt));
            }
        }
    }
}

/// A `call`/`call_indirect`/`call_ref` not classified as an async call
/// site still crosses the same "no real stack value between instructions"
/// contract every other handler follows (`spec.md` §4.3): its arguments are
/// reloaded from their locals immediately before the call, and its result
/// (if any) is stashed into a fresh local and pushed onto the simulated
/// stack, same as any other handler-table entry.
fn emit_plain_call(
    ctx: &mut RewriteCtx,
    instr: Instruction,
    types: &[FuncType],
    func_types: &[Option<FuncType>],
) -> Result<(), Error> {
    let (arity, result_ty) = call_signature(&instr, types, func_types);
    let args = pop_n_from_stack(ctx, arity);
    for a in &args {
        ctx.emitter.local_get(a.local);
    }
    ctx.emitter.push(instr);
    if let Some(ty) = result_ty {
        let local = ctx.locals.alloc(ty);
        ctx.emitter.local_set(local);
        ctx.stack.push(StackEntry { local, ty });
    }
    Ok(())
}

/// Emits the inline replacement for a single async call site (`spec.md`
/// §4.7): `if state == Normal || (state == Rewinding && call_idx == K)`.
fn emit_async_call(
    ctx: &mut RewriteCtx,
    instr: Instruction,
    types: &[FuncType],
    func_types: &[Option<FuncType>],
    result_types: &[ValType],
    globals: AsyncifyGlobals,
    call_idx_local: u32,
    call_site: &mut u32,
) -> Result<(), Error> {
    let k = *call_site;
    *call_site += 1;

    let (arity, result_ty) = call_signature(&instr, types, func_types);
    let args = pop_n_from_stack(ctx, arity);

    ctx.emitter.global_get(globals.state).i32_const(NORMAL).push(Instruction::I32Eq);
    ctx.emitter.global_get(globals.state).i32_const(REWINDING).push(Instruction::I32Eq);
    ctx.emitter.local_get(call_idx_local).i32_const(k as i32).push(Instruction::I32Eq);
    ctx.emitter.push(Instruction::I32And);
    ctx.emitter.push(Instruction::I32Or);
    ctx.emitter.if_(BlockType::Void);

    for a in &args {
        ctx.emitter.local_get(a.local);
    }
    ctx.emitter.push(instr);

    // Past the call: if the callee just started unwinding, propagate by
    // returning immediately: the epilogue below saves this function's
    // own frame on the way out. Otherwise we just resumed past this site,
    // so flip back to Normal before falling through to the rest of the body.
    ctx.emitter.global_get(globals.state).i32_const(UNWINDING).push(Instruction::I32Eq);
    ctx.emitter.if_(BlockType::Void);
    // This frame's own results are never observed by the host once
    // `state != Normal`, but the `return` still needs something on the
    // stack of the right arity/type to encode validly.
    emit_default_results(&mut ctx.emitter, result_types);
    ctx.emitter.push(Instruction::Return);
    ctx.emitter.end();

    ctx.emitter.i32_const(NORMAL).global_set(globals.state);

    if let Some(ty) = result_ty {
        let local = ctx.locals.alloc(ty);
        ctx.emitter.local_set(local);
        ctx.emitter.end();
        ctx.stack.push(StackEntry { local, ty });
    } else {
        ctx.emitter.end();
    }

    Ok(())
}

fn pop_n_from_stack(ctx: &mut RewriteCtx, n: usize) -> SmallVec<[StackEntry; 4]> {
    let mut popped = SmallVec::with_capacity(n);
    for _ in 0..n {
        popped.push(ctx.stack.pop().unwrap_or(StackEntry { local: ctx.fallback_local, ty: ValType::I32 }));
    }
    popped.reverse();
    popped
}

/// Resolves a call instruction's `(arity, result type)` against the
/// module's type table. `call_indirect`/`call_ref` carry their callee type
/// index directly in the instruction; a direct `call`'s callee function
/// index is resolved through `func_types` (built once in
/// `transform_module` from `Module::function_type`, across the
/// imported/local boundary).
fn call_signature(
    instr: &Instruction,
    types: &[FuncType],
    func_types: &[Option<FuncType>],
) -> (usize, Option<ValType>) {
    let ty = match instr {
        Instruction::Call(func_idx) | Instruction::ReturnCall(func_idx) => {
            func_types.get(*func_idx as usize).and_then(|t| t.as_ref())
        }
        Instruction::CallIndirect { type_index, .. }
        | Instruction::ReturnCallIndirect { type_index, .. } => types.get(*type_index as usize),
        Instruction::CallRef { type_index } => types.get(*type_index as usize),
        _ => None,
    };
    let extra_operand = matches!(
        instr,
        Instruction::CallIndirect { .. } | Instruction::CallRef { .. } | Instruction::ReturnCallIndirect { .. }
    );
    match ty {
        Some(ft) => (ft.params.len() + usize::from(extra_operand), ft.results.first().copied()),
        None => (usize::from(extra_operand), None),
    }
}

/// Wraps the rewritten body with the prelude (rewind restore) and epilogue
/// (unwind save) described in `spec.md` §4.7. Frame layout: call-site index
/// first, then every local by natural width.
fn wrap_with_save_restore(
    body: Vec<Instruction>,
    all_locals: &[ValType],
    call_idx_local: u32,
    globals: AsyncifyGlobals,
) -> Vec<Instruction> {
    let mut out = Vec::new();
    let frame_size = frame_size(all_locals);

    out.push(Instruction::GlobalGet(globals.state));
    out.push(Instruction::I32Const(REWINDING));
    out.push(Instruction::I32Eq);
    out.push(Instruction::If(BlockType::Void));
    emit_decr_stack_ptr(&mut out, globals.data, frame_size as i32);
    emit_restore_call_idx(&mut out, globals.data, call_idx_local);
    emit_restore_locals(&mut out, all_locals, globals.data);
    out.push(Instruction::End);

    out.extend(body);

    out.push(Instruction::GlobalGet(globals.state));
    out.push(Instruction::I32Const(UNWINDING));
    out.push(Instruction::I32Eq);
    out.push(Instruction::If(BlockType::Void));
    emit_save_call_idx(&mut out, globals.data, call_idx_local);
    emit_save_locals(&mut out, all_locals, globals.data);
    emit_incr_stack_ptr(&mut out, globals.data, frame_size as i32);
    out.push(Instruction::End);

    out
}

/// Reference-typed locals are never written into a saved frame (`spec.md`
/// §1 Non-goals: "does not rewrite reference-typed operand-stack values
/// across async calls"; a reference local is only permitted when it isn't
/// an async-propagated temp), so they take no space in the frame at all,
/// rather than a bogus fixed-width slot that would round-trip through
/// `i32.load`/`i32.store` on a value that isn't an `i32`.
fn frame_size(locals: &[ValType]) -> usize {
    4 + locals.iter().map(|t| aligned_width(*t)).sum::<usize>()
}

fn aligned_width(ty: ValType) -> usize {
    match ty {
        ValType::I32 | ValType::F32 => 4,
        ValType::I64 | ValType::F64 => 8,
        ValType::V128 => 16,
        ValType::Ref(_) => 0,
    }
}

fn emit_decr_stack_ptr(out: &mut Vec<Instruction>, data_global: u32, delta: i32) {
    let ptr = MemArg { align_log2: 2, offset: 0, mem_idx: 0 };
    out.push(Instruction::GlobalGet(data_global));
    out.push(Instruction::GlobalGet(data_global));
    out.push(Instruction::I32Load(ptr));
    out.push(Instruction::I32Const(delta));
    out.push(Instruction::I32Sub);
    out.push(Instruction::I32Store(ptr));
}

fn emit_incr_stack_ptr(out: &mut Vec<Instruction>, data_global: u32, delta: i32) {
    let ptr = MemArg { align_log2: 2, offset: 0, mem_idx: 0 };
    out.push(Instruction::GlobalGet(data_global));
    out.push(Instruction::GlobalGet(data_global));
    out.push(Instruction::I32Load(ptr));
    out.push(Instruction::I32Const(delta));
    out.push(Instruction::I32Add);
    out.push(Instruction::I32Store(ptr));
}

fn emit_restore_call_idx(out: &mut Vec<Instruction>, data_global: u32, call_idx_local: u32) {
    out.push(Instruction::GlobalGet(data_global));
    out.push(Instruction::I32Load(MemArg { align_log2: 2, offset: 0, mem_idx: 0 }));
    out.push(Instruction::I32Load(MemArg { align_log2: 2, offset: 0, mem_idx: 0 }));
    out.push(Instruction::LocalSet(call_idx_local));
}

fn emit_save_call_idx(out: &mut Vec<Instruction>, data_global: u32, call_idx_local: u32) {
    out.push(Instruction::GlobalGet(data_global));
    out.push(Instruction::I32Load(MemArg { align_log2: 2, offset: 0, mem_idx: 0 }));
    out.push(Instruction::LocalGet(call_idx_local));
    out.push(Instruction::I32Store(MemArg { align_log2: 2, offset: 0, mem_idx: 0 }));
}

fn emit_restore_locals(out: &mut Vec<Instruction>, locals: &[ValType], data_global: u32) {
    let mut offset = 4u64;
    for (idx, ty) in locals.iter().enumerate() {
        // Never saved, so never restored either; see `frame_size`.
        if ty.is_reference() {
            continue;
        }
        out.push(Instruction::GlobalGet(data_global));
        out.push(Instruction::I32Load(MemArg { align_log2: 2, offset: 0, mem_idx: 0 }));
        let memarg = MemArg { align_log2: align_log2(*ty), offset, mem_idx: 0 };
        out.push(load_op(*ty, memarg));
        out.push(Instruction::LocalSet(idx as u32));
        offset += aligned_width(*ty) as u64;
    }
}

fn emit_save_locals(out: &mut Vec<Instruction>, locals: &[ValType], data_global: u32) {
    let mut offset = 4u64;
    for (idx, ty) in locals.iter().enumerate() {
        if ty.is_reference() {
            continue;
        }
        out.push(Instruction::GlobalGet(data_global));
        out.push(Instruction::I32Load(MemArg { align_log2: 2, offset: 0, mem_idx: 0 }));
        out.push(Instruction::LocalGet(idx as u32));
        let memarg = MemArg { align_log2: align_log2(*ty), offset, mem_idx: 0 };
        out.push(store_op(*ty, memarg));
        offset += aligned_width(*ty) as u64;
    }
}

fn align_log2(ty: ValType) -> u32 {
    match ty {
        ValType::I32 | ValType::F32 => 2,
        ValType::I64 | ValType::F64 => 3,
        ValType::V128 => 4,
        ValType::Ref(_) => 2,
    }
}

fn load_op(ty: ValType, m: MemArg) -> Instruction {
    match ty {
        ValType::I32 => Instruction::I32Load(m),
        ValType::I64 => Instruction::I64Load(m),
        ValType::F32 => Instruction::F32Load(m),
        ValType::F64 => Instruction::F64Load(m),
        ValType::V128 => Instruction::V128Load(m),
        ValType::Ref(_) => Instruction::I32Load(m),
    }
}

fn store_op(ty: ValType, m: MemArg) -> Instruction {
    match ty {
        ValType::I32 => Instruction::I32Store(m),
        ValType::I64 => Instruction::I64Store(m),
        ValType::F32 => Instruction::F32Store(m),
        ValType::F64 => Instruction::F64Store(m),
        ValType::V128 => Instruction::V128Store(m),
        ValType::Ref(_) => Instruction::I32Store(m),
    }
}

/// Groups an expanded local-type vector back into run-length `(count,
/// type)` pairs for the Code section's encoding.
fn group_locals(locals: &[ValType]) -> Vec<(u32, ValType)> {
    let mut grouped: Vec<(u32, ValType)> = Vec::new();
    for &ty in locals {
        match grouped.last_mut() {
            Some((count, last_ty)) if *last_ty == ty => *count += 1,
            _ => grouped.push((1u32, ty)),
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_accounts_for_call_index_and_all_locals() {
        let locals = alloc::vec![ValType::I32, ValType::I64, ValType::F32, ValType::F64];
        assert_eq!(frame_size(&locals), 4 + 4 + 8 + 4 + 8);
    }

    #[test]
    fn frame_size_gives_reference_typed_locals_no_frame_space() {
        let locals = alloc::vec![ValType::I32, ValType::Ref(crate::binary::types::RefType::Func)];
        assert_eq!(frame_size(&locals), 4 + 4);
    }

    #[test]
    fn save_restore_skip_reference_typed_locals() {
        let locals = alloc::vec![ValType::Ref(crate::binary::types::RefType::Func), ValType::I32];
        let mut saved = Vec::new();
        emit_save_locals(&mut saved, &locals, 0);
        assert!(!saved.iter().any(|i| matches!(i, Instruction::LocalGet(0))));
        assert!(saved.iter().any(|i| matches!(i, Instruction::LocalGet(1))));

        let mut restored = Vec::new();
        emit_restore_locals(&mut restored, &locals, 0);
        assert!(!restored.iter().any(|i| matches!(i, Instruction::LocalSet(0))));
        assert!(restored.iter().any(|i| matches!(i, Instruction::LocalSet(1))));
    }

    #[test]
    fn group_locals_run_length_encodes() {
        let locals = alloc::vec![ValType::I32, ValType::I32, ValType::F64];
        let grouped = group_locals(&locals);
        assert_eq!(grouped, alloc::vec![(2, ValType::I32), (1, ValType::F64)]);
    }

    #[test]
    fn call_indirect_signature_resolves_against_type_table() {
        let types =
            alloc::vec![FuncType { params: alloc::vec![ValType::I32], results: alloc::vec![ValType::I64] }];
        let instr = Instruction::CallIndirect { type_index: 0, table_index: 0 };
        let (arity, result) = call_signature(&instr, &types, &[]);
        assert_eq!(arity, 2); // the param plus the table-index operand
        assert_eq!(result, Some(ValType::I64));
    }

    #[test]
    fn direct_call_signature_resolves_against_func_types() {
        let func_types = alloc::vec![Some(FuncType {
            params: alloc::vec![ValType::I32, ValType::I64, ValType::F32, ValType::F64],
            results: alloc::vec![ValType::I32],
        })];
        let instr = Instruction::Call(0);
        let (arity, result) = call_signature(&instr, &[], &func_types);
        assert_eq!(arity, 4);
        assert_eq!(result, Some(ValType::I32));
    }
}
