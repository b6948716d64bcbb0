//! Fluent byte-level instruction emitter (C2, `spec.md` §4.2).
//!
//! A thin wrapper over `Vec<Instruction>` (rather than raw bytes, encoding
//! to bytes is `crate::binary::encode`'s job) with the six composite
//! helpers the transform leans on constantly. Poolable: `reset` clears the
//! buffer without releasing its allocation, the way the teacher's
//! `isa::Instructions` is reused across function compilations in
//! `prepare::compile`.

use alloc::vec::Vec;

use crate::binary::instr::Instruction;
use crate::binary::types::{BlockType, MemArg};

#[derive(Debug, Default)]
pub struct Emitter {
    buf: Vec<Instruction>,
}

impl Emitter {
    pub fn new() -> Self {
        Emitter::default()
    }

    pub fn reset(&mut self) {
        self.buf.clear();
    }

    pub fn into_instructions(self) -> Vec<Instruction> {
        self.buf
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.buf
    }

    pub fn push(&mut self, instr: Instruction) -> &mut Self {
        self.buf.push(instr);
        self
    }

    pub fn extend(&mut self, instrs: impl IntoIterator<Item = Instruction>) -> &mut Self {
        self.buf.extend(instrs);
        self
    }

    // --- plain passthroughs used pervasively enough to spell out ---

    pub fn local_get(&mut self, idx: u32) -> &mut Self {
        self.push(Instruction::LocalGet(idx))
    }

    pub fn local_set(&mut self, idx: u32) -> &mut Self {
        self.push(Instruction::LocalSet(idx))
    }

    pub fn global_get(&mut self, idx: u32) -> &mut Self {
        self.push(Instruction::GlobalGet(idx))
    }

    pub fn global_set(&mut self, idx: u32) -> &mut Self {
        self.push(Instruction::GlobalSet(idx))
    }

    pub fn i32_const(&mut self, v: i32) -> &mut Self {
        self.push(Instruction::I32Const(v))
    }

    pub fn block(&mut self, bt: BlockType) -> &mut Self {
        self.push(Instruction::Block(bt))
    }

    pub fn loop_(&mut self, bt: BlockType) -> &mut Self {
        self.push(Instruction::Loop(bt))
    }

    pub fn if_(&mut self, bt: BlockType) -> &mut Self {
        self.push(Instruction::If(bt))
    }

    pub fn else_(&mut self) -> &mut Self {
        self.push(Instruction::Else)
    }

    pub fn end(&mut self) -> &mut Self {
        self.push(Instruction::End)
    }

    // --- composite helpers (`spec.md` §4.2) ---

    /// `global.get state; i32.const expected; i32.eq`
    pub fn state_check(&mut self, state_global: u32, expected: i32) -> &mut Self {
        self.global_get(state_global).i32_const(expected).push(Instruction::I32Eq)
    }

    /// `state_check ∘ if`
    pub fn if_state(&mut self, state_global: u32, expected: i32, bt: BlockType) -> &mut Self {
        self.state_check(state_global, expected).if_(bt)
    }

    /// `global.get data; i32.load offset=0`
    pub fn load_stack_ptr(&mut self, data_global: u32) -> &mut Self {
        self.global_get(data_global).push(Instruction::I32Load(MemArg {
            align_log2: 2,
            offset: 0,
            mem_idx: 0,
        }))
    }

    /// `global.get data; local.get val; i32.store offset=0`
    pub fn store_stack_ptr(&mut self, data_global: u32, val_local: u32) -> &mut Self {
        self.global_get(data_global)
            .local_get(val_local)
            .push(Instruction::I32Store(MemArg { align_log2: 2, offset: 0, mem_idx: 0 }))
    }

    /// Loads `stack_ptr`, adds `delta`, stores it back, via a scratch
    /// local since there is no in-place memory add opcode.
    pub fn incr_stack_ptr(&mut self, data_global: u32, delta: i32, scratch_local: u32) -> &mut Self {
        self.load_stack_ptr(data_global)
            .i32_const(delta)
            .push(Instruction::I32Add)
            .local_set(scratch_local)
            .store_stack_ptr(data_global, scratch_local)
    }

    pub fn decr_stack_ptr(&mut self, data_global: u32, delta: i32, scratch_local: u32) -> &mut Self {
        self.load_stack_ptr(data_global)
            .i32_const(delta)
            .push(Instruction::I32Sub)
            .local_set(scratch_local)
            .store_stack_ptr(data_global, scratch_local)
    }

    pub fn emit_v128_const(&mut self, bytes: [u8; 16]) -> &mut Self {
        self.push(Instruction::V128Const(bytes))
    }
}
