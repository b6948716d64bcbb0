//! Linearizer (C5, `spec.md` §4.5): rewrites result-/param-bearing
//! `block`/`loop`/`if` nodes that contain an async call into void-typed
//! form with explicit locals, so no real value is ever live on the operand
//! stack across a suspension point.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::binary::instr::Instruction;
use crate::binary::types::{BlockType, ValType};
use crate::cfir::{BlockKind, Node};
use crate::handlers::LocalAllocator;

/// Allocates the param/result/condition locals a linearized construct
/// needs, and renumbers branch targets it lifts. Shared across the whole
/// linearization pass for one function so temp locals aren't reused across
/// sibling constructs in a way that could alias a live value.
pub struct Linearizer<'a> {
    locals: &'a mut LocalAllocator,
    is_async_call: &'a dyn Fn(&Instruction) -> bool,
}

impl<'a> Linearizer<'a> {
    pub fn new(locals: &'a mut LocalAllocator, is_async_call: &'a dyn Fn(&Instruction) -> bool) -> Self {
        Linearizer { locals, is_async_call }
    }

    pub fn run(&mut self, node: Node) -> Node {
        self.linearize(node, 0)
    }

    fn contains_async(&self, node: &Node) -> bool {
        node.contains_async(self.is_async_call)
    }

    fn linearize(&mut self, node: Node, depth: u32) -> Node {
        match node {
            Node::Seq(children) => {
                Node::Seq(children.into_iter().map(|c| self.linearize(c, depth)).collect())
            }
            Node::Block { kind, params, results, body } => {
                self.linearize_block(kind, params, results, *body, depth)
            }
            Node::If { params, results, then, else_ } => {
                self.linearize_if(params, results, *then, else_.map(|b| *b), depth)
            }
            Node::Instr(instr) => Node::Instr(instr),
        }
    }

    fn linearize_block(
        &mut self,
        kind: BlockKind,
        params: Vec<ValType>,
        results: Vec<ValType>,
        body: Node,
        depth: u32,
    ) -> Node {
        if params.is_empty() && results.is_empty() {
            let body = self.linearize(body, depth + 1);
            return Node::Block { kind, params, results, body: Box::new(body) };
        }

        // Construct carries params and/or results: lift them into locals
        // (`spec.md` §4.5 second bullet). Applied whether or not the body
        // contains an async call, since every non-structural instruction is
        // flattened through a local (`spec.md` §4.3), so a value-bearing
        // block would otherwise expect real operand-stack values at its
        // `end` that were never reloaded from wherever flattening put them.
        let param_locals: Vec<u32> = params.iter().map(|&t| self.locals.alloc(t)).collect();
        let result_locals: Vec<u32> = results.iter().map(|&t| self.locals.alloc(t)).collect();

        let mut pre = Vec::new();
        for &local in param_locals.iter().rev() {
            pre.push(Node::Instr(Instruction::LocalSet(local)));
        }

        let mut entry = Vec::new();
        for &local in &param_locals {
            entry.push(Node::Instr(Instruction::LocalGet(local)));
        }

        let body = self.linearize_branch_targets(body, &result_locals);
        let body = self.linearize(body, depth + 1);

        let mut post = Vec::new();
        for &local in result_locals.iter().rev() {
            post.push(Node::Instr(Instruction::LocalSet(local)));
        }

        let mut inner_children = entry;
        inner_children.push(body);
        inner_children.extend(post);

        let void_block = Node::Block {
            kind,
            params: Vec::new(),
            results: Vec::new(),
            body: Box::new(Node::Seq(inner_children)),
        };

        let mut reload = Vec::new();
        for &local in &result_locals {
            reload.push(Node::Instr(Instruction::LocalGet(local)));
        }

        let mut out = pre;
        out.push(void_block);
        out.extend(reload);
        Node::Seq(out)
    }

    /// Rewrites every `br`/`br_if`/`br_table` inside `body` that targets the
    /// construct now flattened to void, so it moves `result_locals` out
    /// before branching (`spec.md` §4.5 "Within the body..."). `body` is the
    /// immediate content of the lifted block, so a branch targeting that
    /// block directly carries label 0 there; the label only grows as
    /// `rewrite_branches` descends into further nested blocks/ifs inside
    /// `body`, since labels are relative to their own position, not to the
    /// lifted block's absolute nesting depth.
    fn linearize_branch_targets(&mut self, body: Node, result_locals: &[u32]) -> Node {
        self.rewrite_branches(body, 0, result_locals)
    }

    fn rewrite_branches(&mut self, node: Node, depth: u32, result_locals: &[u32]) -> Node {
        match node {
            Node::Seq(children) => Node::Seq(
                children
                    .into_iter()
                    .map(|c| self.rewrite_branches(c, depth, result_locals))
                    .collect(),
            ),
            Node::Block { kind, params, results, body } => Node::Block {
                kind,
                params,
                results,
                body: Box::new(self.rewrite_branches(*body, depth + 1, result_locals)),
            },
            Node::If { params, results, then, else_ } => Node::If {
                params,
                results,
                then: Box::new(self.rewrite_branches(*then, depth + 1, result_locals)),
                else_: else_.map(|e| Box::new(self.rewrite_branches(*e, depth + 1, result_locals))),
            },
            Node::Instr(Instruction::Br(label)) if label == depth => {
                let mut out = Vec::new();
                for &local in result_locals.iter().rev() {
                    out.push(Node::Instr(Instruction::LocalSet(local)));
                }
                out.push(Node::Instr(Instruction::Br(label)));
                Node::Seq(out)
            }
            Node::Instr(Instruction::BrIf(label)) if label == depth => {
                let cond = self.locals.alloc(ValType::I32);
                let mut out = alloc::vec![Node::Instr(Instruction::LocalSet(cond))];
                for &local in result_locals.iter().rev() {
                    out.push(Node::Instr(Instruction::LocalSet(local)));
                }
                out.push(Node::Instr(Instruction::LocalGet(cond)));
                out.push(Node::Instr(Instruction::BrIf(label)));
                for &local in result_locals {
                    out.push(Node::Instr(Instruction::LocalGet(local)));
                }
                Node::Seq(out)
            }
            Node::Instr(Instruction::BrTable(labels, default)) if labels.contains(&depth) || default == depth => {
                let idx = self.locals.alloc(ValType::I32);
                let mut out = alloc::vec![Node::Instr(Instruction::LocalSet(idx))];
                for &local in result_locals.iter().rev() {
                    out.push(Node::Instr(Instruction::LocalSet(local)));
                }
                out.push(Node::Instr(Instruction::LocalGet(idx)));
                out.push(Node::Instr(Instruction::BrTable(labels, default)));
                Node::Seq(out)
            }
            other => other,
        }
    }

    fn linearize_if(
        &mut self,
        params: Vec<ValType>,
        results: Vec<ValType>,
        then: Node,
        else_: Option<Node>,
        depth: u32,
    ) -> Node {
        let then_async = self.contains_async(&then);
        let else_async = else_.as_ref().map(|e| self.contains_async(e)).unwrap_or(false);

        if !then_async && !else_async {
            if params.is_empty() && results.is_empty() {
                let then = self.linearize(then, depth + 1);
                let else_ = else_.map(|e| self.linearize(e, depth + 1));
                return Node::If { params, results, then: Box::new(then), else_: else_.map(Box::new) };
            }
            // Neither branch suspends, but the construct still carries
            // params/results that need lifting into locals for the same
            // reason `linearize_block` always lifts them, no rewind
            // dispatch needed here, just a plain conditional over the
            // (already-flattened) real condition value.
            return self.lift_if_without_async(params, results, then, else_, depth);
        }

        // `spec.md` §4.5 "If with async": three sequential void ifs.
        const STATE_GLOBAL: u32 = 0;
        const REWINDING: i32 = 2;

        let cond_local = self.locals.alloc(ValType::I32);
        let param_locals: Vec<u32> = params.iter().map(|&t| self.locals.alloc(t)).collect();
        let result_locals: Vec<u32> = results.iter().map(|&t| self.locals.alloc(t)).collect();

        let mut out = Vec::new();

        // 1. condition-save guard
        out.push(rewinding_guard(STATE_GLOBAL, REWINDING, 1, alloc::vec![cond_local]));
        // 2. param-save guard
        if !param_locals.is_empty() {
            out.push(rewinding_guard(STATE_GLOBAL, REWINDING, param_locals.len(), {
                let mut v = param_locals.clone();
                v.reverse();
                v
            }));
        }

        let then_pred = entry_predicate(STATE_GLOBAL, REWINDING, then_async, else_async, cond_local, true);
        let else_pred = else_.is_some().then(|| {
            entry_predicate(STATE_GLOBAL, REWINDING, then_async, else_async, cond_local, false)
        });

        let reload_params = |locals: &[u32]| {
            locals.iter().map(|&l| Node::Instr(Instruction::LocalGet(l))).collect::<Vec<_>>()
        };
        let store_results = |locals: &[u32]| {
            locals.iter().rev().map(|&l| Node::Instr(Instruction::LocalSet(l))).collect::<Vec<_>>()
        };

        // 3. then-dispatch
        let mut then_body = reload_params(&param_locals);
        then_body.push(self.linearize(then, depth + 1));
        then_body.extend(store_results(&result_locals));
        out.push(Node::Seq(then_pred));
        out.push(Node::If {
            params: Vec::new(),
            results: Vec::new(),
            then: Box::new(Node::Seq(then_body)),
            else_: None,
        });

        // 4. else-dispatch
        if let Some(else_node) = else_ {
            let mut else_body = reload_params(&param_locals);
            else_body.push(self.linearize(else_node, depth + 1));
            else_body.extend(store_results(&result_locals));
            out.push(Node::Seq(else_pred.unwrap()));
            out.push(Node::If {
                params: Vec::new(),
                results: Vec::new(),
                then: Box::new(Node::Seq(else_body)),
                else_: None,
            });
        }

        // 5. reload results
        for &local in &result_locals {
            out.push(Node::Instr(Instruction::LocalGet(local)));
        }

        Node::Seq(out)
    }

    /// Lifts a param/result-bearing `if` whose branches contain no async
    /// call into a single void-typed `if` plus explicit locals: save
    /// condition and params, re-enter whichever branch with its params
    /// reloaded, store its results, reload them after. No `else` in the
    /// source means validity already requires `params == results`, so the
    /// synthesized implicit else just passes params straight through.
    fn lift_if_without_async(
        &mut self,
        params: Vec<ValType>,
        results: Vec<ValType>,
        then: Node,
        else_: Option<Node>,
        depth: u32,
    ) -> Node {
        let cond_local = self.locals.alloc(ValType::I32);
        let param_locals: Vec<u32> = params.iter().map(|&t| self.locals.alloc(t)).collect();
        let result_locals: Vec<u32> = results.iter().map(|&t| self.locals.alloc(t)).collect();

        let mut pre = alloc::vec![Node::Instr(Instruction::LocalSet(cond_local))];
        for &local in param_locals.iter().rev() {
            pre.push(Node::Instr(Instruction::LocalSet(local)));
        }

        let reload_params = |locals: &[u32]| {
            locals.iter().map(|&l| Node::Instr(Instruction::LocalGet(l))).collect::<Vec<_>>()
        };
        let store_results = |locals: &[u32]| {
            locals.iter().rev().map(|&l| Node::Instr(Instruction::LocalSet(l))).collect::<Vec<_>>()
        };

        let mut then_body = reload_params(&param_locals);
        then_body.push(self.linearize(then, depth + 1));
        then_body.extend(store_results(&result_locals));

        let else_body = match else_ {
            Some(node) => {
                let mut body = reload_params(&param_locals);
                body.push(self.linearize(node, depth + 1));
                body.extend(store_results(&result_locals));
                body
            }
            None => {
                let mut body = reload_params(&param_locals);
                body.extend(store_results(&result_locals));
                body
            }
        };

        let mut out = pre;
        out.push(Node::Instr(Instruction::LocalGet(cond_local)));
        out.push(Node::If {
            params: Vec::new(),
            results: Vec::new(),
            then: Box::new(Node::Seq(then_body)),
            else_: Some(Box::new(Node::Seq(else_body))),
        });
        for &local in &result_locals {
            out.push(Node::Instr(Instruction::LocalGet(local)));
        }
        Node::Seq(out)
    }
}

/// `if (rewinding) { drop × n } else { local.set each }`, used by both the
/// condition-save and param-save guards.
fn rewinding_guard(state_global: u32, rewinding: i32, drop_count: usize, set_locals: Vec<u32>) -> Node {
    let mut then_body = Vec::with_capacity(drop_count);
    for _ in 0..drop_count {
        then_body.push(Node::Instr(Instruction::Drop));
    }
    let else_body: Vec<Node> = set_locals.into_iter().map(|l| Node::Instr(Instruction::LocalSet(l))).collect();
    Node::Seq(alloc::vec![
        Node::Instr(Instruction::GlobalGet(state_global)),
        Node::Instr(Instruction::I32Const(rewinding)),
        Node::Instr(Instruction::I32Eq),
        Node::If {
            params: Vec::new(),
            results: Vec::new(),
            then: Box::new(Node::Seq(then_body)),
            else_: Some(Box::new(Node::Seq(else_body))),
        },
    ])
}

/// Builds the sequence of instructions that pushes the `i32` entry
/// predicate for a dispatch arm onto the stack, per `spec.md` §4.5's table:
/// both-async uses the plain condition; single-branch-async mixes in a
/// `rewinding` check.
fn entry_predicate(
    state_global: u32,
    rewinding: i32,
    then_async: bool,
    else_async: bool,
    cond_local: u32,
    for_then: bool,
) -> Vec<Node> {
    let cond = || Node::Instr(Instruction::LocalGet(cond_local));
    let not_cond = || alloc::vec![cond(), Node::Instr(Instruction::I32Eqz)];
    let is_rewinding = || {
        alloc::vec![
            Node::Instr(Instruction::GlobalGet(state_global)),
            Node::Instr(Instruction::I32Const(rewinding)),
            Node::Instr(Instruction::I32Eq),
        ]
    };
    let not_rewinding = || {
        let mut v = is_rewinding();
        v.push(Node::Instr(Instruction::I32Eqz));
        v
    };
    let and = |mut a: Vec<Node>, b: Vec<Node>| {
        a.extend(b);
        a.push(Node::Instr(Instruction::I32And));
        a
    };

    match (then_async, else_async, for_then) {
        (true, true, true) => alloc::vec![cond()],
        (true, true, false) => not_cond(),
        (true, false, true) => {
            // rewinding ∨ cond, expressed without i32.or per `spec.md`
            // §8's "zero i32.or" law: `i32.eqz(i32.eqz(rewinding) & i32.eqz(cond))`
            let inner = and(not_rewinding(), not_cond());
            let mut v = inner;
            v.push(Node::Instr(Instruction::I32Eqz));
            v
        }
        (true, false, false) => and(not_rewinding(), not_cond()),
        (false, true, true) => and(not_rewinding(), cond_vec(cond_local)),
        (false, true, false) => {
            let inner = and(not_rewinding(), {
                let mut v = cond_vec(cond_local);
                v.push(Node::Instr(Instruction::I32Eqz));
                v
            });
            let mut v = inner;
            v.push(Node::Instr(Instruction::I32Eqz));
            v
        }
        (false, false, _) => alloc::vec![Node::Instr(Instruction::I32Const(1))],
    }
}

fn cond_vec(cond_local: u32) -> Vec<Node> {
    alloc::vec![Node::Instr(Instruction::LocalGet(cond_local))]
}

/// Flattens a linearized `Node` tree back into an instruction stream
/// (reversing `crate::cfir::parse`), inserting explicit `end`s.
pub fn flatten(node: &Node) -> Vec<Instruction> {
    let mut out = Vec::new();
    flatten_into(node, &mut out);
    out
}

fn flatten_into(node: &Node, out: &mut Vec<Instruction>) {
    match node {
        Node::Seq(children) => {
            for c in children {
                flatten_into(c, out);
            }
        }
        Node::Block { kind, params, results, body } => {
            let bt = block_type_of(params, results);
            out.push(match kind {
                BlockKind::Block => Instruction::Block(bt),
                BlockKind::Loop => Instruction::Loop(bt),
            });
            flatten_into(body, out);
            out.push(Instruction::End);
        }
        Node::If { params, results, then, else_ } => {
            let bt = block_type_of(params, results);
            out.push(Instruction::If(bt));
            flatten_into(then, out);
            if let Some(e) = else_ {
                out.push(Instruction::Else);
                flatten_into(e, out);
            }
            out.push(Instruction::End);
        }
        Node::Instr(instr) => out.push(instr.clone()),
    }
}

/// Every `Block`/`If` node the `Linearizer` produces carries empty
/// `params`/`results`: any construct that had either is rewritten into
/// this void form plus explicit locals (`spec.md` §4.5), whether or not it
/// contained an async call. The `(0, 1)` case is kept as a defensive
/// passthrough for a `Node` built directly (e.g. in tests) without going
/// through the `Linearizer` first.
fn block_type_of(params: &[ValType], results: &[ValType]) -> BlockType {
    match (params.len(), results.len()) {
        (0, 0) => BlockType::Void,
        (0, 1) => BlockType::Value(results[0]),
        _ => BlockType::Void,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::types::ValType;

    fn no_async(_: &Instruction) -> bool {
        false
    }

    fn is_call_3(i: &Instruction) -> bool {
        matches!(i, Instruction::Call(3))
    }

    #[test]
    fn void_block_without_async_is_identity() {
        let mut locals = LocalAllocator::new(Vec::new());
        let f = no_async;
        let mut lin = Linearizer::new(&mut locals, &f);
        let body = Node::Seq(alloc::vec![Node::Instr(Instruction::Nop)]);
        let node = Node::Block { kind: BlockKind::Block, params: Vec::new(), results: Vec::new(), body: Box::new(body) };
        let out = lin.run(node.clone());
        match out {
            Node::Block { body, .. } => match body.as_ref() {
                Node::Seq(c) => assert_eq!(c.len(), 1),
                _ => panic!(),
            },
            _ => panic!(),
        }
    }

    #[test]
    fn result_block_with_async_is_rewritten_to_void_plus_locals() {
        let mut locals = LocalAllocator::new(Vec::new());
        let f = is_call_3;
        let mut lin = Linearizer::new(&mut locals, &f);
        let body = Node::Seq(alloc::vec![Node::Instr(Instruction::Call(3)), Node::Instr(Instruction::I32Const(1))]);
        let node = Node::Block {
            kind: BlockKind::Block,
            params: Vec::new(),
            results: alloc::vec![ValType::I32],
            body: Box::new(body),
        };
        let out = lin.run(node);
        // top level is now a Seq ending in a reload of the result local.
        match out {
            Node::Seq(children) => {
                assert!(matches!(children.last().unwrap(), Node::Instr(Instruction::LocalGet(_))));
                let void_block = children.iter().find(|c| matches!(c, Node::Block { .. })).unwrap();
                if let Node::Block { params, results, .. } = void_block {
                    assert!(params.is_empty());
                    assert!(results.is_empty());
                }
            }
            _ => panic!("expected Seq"),
        }
    }

    #[test]
    fn result_block_without_async_is_still_lifted_to_void_plus_locals() {
        // A block with a result but no async inside must still be lifted:
        // its inner content is itself flattened through locals (every
        // instruction elsewhere goes through the same treatment), so the
        // block can't rely on a real value sitting on the stack at its own
        // `end` unless it's reloaded explicitly.
        let mut locals = LocalAllocator::new(Vec::new());
        let f = no_async;
        let mut lin = Linearizer::new(&mut locals, &f);
        let body = Node::Seq(alloc::vec![Node::Instr(Instruction::I32Const(1))]);
        let node = Node::Block {
            kind: BlockKind::Block,
            params: Vec::new(),
            results: alloc::vec![ValType::I32],
            body: Box::new(body),
        };
        let out = lin.run(node);
        match out {
            Node::Seq(children) => {
                assert!(matches!(children.last().unwrap(), Node::Instr(Instruction::LocalGet(_))));
                let void_block = children.iter().find(|c| matches!(c, Node::Block { .. })).unwrap();
                if let Node::Block { params, results, .. } = void_block {
                    assert!(params.is_empty());
                    assert!(results.is_empty());
                }
            }
            _ => panic!("expected Seq"),
        }
    }

    #[test]
    fn result_if_without_async_lifts_to_single_void_if() {
        let mut locals = LocalAllocator::new(Vec::new());
        let f = no_async;
        let mut lin = Linearizer::new(&mut locals, &f);
        let then = Node::Seq(alloc::vec![Node::Instr(Instruction::I32Const(1))]);
        let else_ = Node::Seq(alloc::vec![Node::Instr(Instruction::I32Const(2))]);
        let node = Node::If {
            params: Vec::new(),
            results: alloc::vec![ValType::I32],
            then: Box::new(then),
            else_: Some(Box::new(else_)),
        };
        let out = lin.run(node);
        let flat = flatten(&out);
        let if_count = flat.iter().filter(|i| matches!(i, Instruction::If(_))).count();
        assert_eq!(if_count, 1);
        assert!(matches!(flat.last().unwrap(), Instruction::LocalGet(_)));
    }

    #[test]
    fn if_with_async_in_one_branch_has_three_if_headers() {
        let mut locals = LocalAllocator::new(Vec::new());
        let f = is_call_3;
        let mut lin = Linearizer::new(&mut locals, &f);
        let then = Node::Seq(alloc::vec![Node::Instr(Instruction::Call(3))]);
        let else_ = Node::Seq(alloc::vec![Node::Instr(Instruction::Nop)]);
        let node = Node::If { params: Vec::new(), results: Vec::new(), then: Box::new(then), else_: Some(Box::new(else_)) };
        let out = lin.run(node);
        let flat = flatten(&out);
        let if_count = flat.iter().filter(|i| matches!(i, Instruction::If(_))).count();
        assert_eq!(if_count, 3);
    }

    #[test]
    fn if_with_async_in_both_branches_has_no_i32_or() {
        let mut locals = LocalAllocator::new(Vec::new());
        let f = is_call_3;
        let mut lin = Linearizer::new(&mut locals, &f);
        let then = Node::Seq(alloc::vec![Node::Instr(Instruction::Call(3))]);
        let else_ = Node::Seq(alloc::vec![Node::Instr(Instruction::Call(3))]);
        let node = Node::If { params: Vec::new(), results: Vec::new(), then: Box::new(then), else_: Some(Box::new(else_)) };
        let out = lin.run(node);
        let flat = flatten(&out);
        assert!(!flat.iter().any(|i| matches!(i, Instruction::I32Or)));
        let if_count = flat.iter().filter(|i| matches!(i, Instruction::If(_))).count();
        assert_eq!(if_count, 3);
    }

    #[test]
    fn direct_branch_out_of_a_lifted_block_stores_its_result_first() {
        // `br 0` from directly inside the lifted block's own body targets
        // that block, so it must carry label 0, not `depth + 1`.
        let mut locals = LocalAllocator::new(Vec::new());
        let f = is_call_3;
        let mut lin = Linearizer::new(&mut locals, &f);
        let body = Node::Seq(alloc::vec![
            Node::Instr(Instruction::Call(3)),
            Node::Instr(Instruction::I32Const(1)),
            Node::Instr(Instruction::Br(0)),
        ]);
        let node = Node::Block {
            kind: BlockKind::Block,
            params: Vec::new(),
            results: alloc::vec![ValType::I32],
            body: Box::new(body),
        };
        let out = lin.run(node);
        let flat = flatten(&out);
        let br_pos = flat.iter().position(|i| matches!(i, Instruction::Br(_))).unwrap();
        assert!(
            matches!(flat[br_pos - 1], Instruction::LocalSet(_)),
            "expected the result local to be stored right before the branch, got {:?}",
            flat[br_pos - 1]
        );
    }

    #[test]
    fn branch_out_of_a_nested_block_uses_the_label_relative_to_its_own_position() {
        // One extra level of nesting between the branch and the lifted
        // block it targets bumps the label to 1, not `depth + target_depth`.
        let mut locals = LocalAllocator::new(Vec::new());
        let f = is_call_3;
        let mut lin = Linearizer::new(&mut locals, &f);
        let inner = Node::Block {
            kind: BlockKind::Block,
            params: Vec::new(),
            results: Vec::new(),
            body: Box::new(Node::Instr(Instruction::Br(1))),
        };
        let body = Node::Seq(alloc::vec![Node::Instr(Instruction::Call(3)), inner]);
        let node = Node::Block {
            kind: BlockKind::Block,
            params: Vec::new(),
            results: alloc::vec![ValType::I32],
            body: Box::new(body),
        };
        let out = lin.run(node);
        let flat = flatten(&out);
        let br_pos = flat.iter().position(|i| matches!(i, Instruction::Br(1))).unwrap();
        assert!(
            matches!(flat[br_pos - 1], Instruction::LocalSet(_)),
            "expected the result local to be stored right before the branch, got {:?}",
            flat[br_pos - 1]
        );
    }
}
