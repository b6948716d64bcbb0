//! Control-flow IR (C4, `spec.md` §4.4): lifts a flat instruction stream
//! into a tree of `Seq | Block | If | Instr` nodes.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::binary::instr::Instruction;
use crate::binary::types::{BlockType, FuncType, ValType};
use crate::error::Error;

/// The kind of structured construct a `Node::Block` lifts (`block` or
/// `loop`; they share a shape, differing only in where a branch to depth
/// 0 inside them re-enters: the top for `loop`, past the end for `block`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Block,
    Loop,
}

#[derive(Debug, Clone)]
pub enum Node {
    Seq(Vec<Node>),
    Block { kind: BlockKind, params: Vec<ValType>, results: Vec<ValType>, body: Box<Node> },
    If { params: Vec<ValType>, results: Vec<ValType>, then: Box<Node>, else_: Option<Box<Node>> },
    Instr(Instruction),
}

impl Node {
    /// True if any instruction in this subtree is a call to a function in
    /// `async_set` (by function index) or an indirect call treated as
    /// async. Callers pass a predicate rather than the `AsyncSet` directly
    /// so `cfir` stays independent of `crate::callgraph`.
    pub fn contains_async(&self, is_async_call: &impl Fn(&Instruction) -> bool) -> bool {
        match self {
            Node::Seq(children) => children.iter().any(|c| c.contains_async(is_async_call)),
            Node::Block { body, .. } => body.contains_async(is_async_call),
            Node::If { then, else_, .. } => {
                then.contains_async(is_async_call)
                    || else_.as_ref().map(|e| e.contains_async(is_async_call)).unwrap_or(false)
            }
            Node::Instr(instr) => is_async_call(instr),
        }
    }
}

/// Parses a flat instruction stream (as decoded by `crate::binary::decode`,
/// including its terminating top-level `end`) into a `Node` tree.
pub fn parse(body: &[Instruction], types: &[FuncType]) -> Result<Node, Error> {
    let mut cursor = Cursor { body, pos: 0, types };
    let node = cursor.parse_seq_until_end()?;
    Ok(node)
}

struct Cursor<'a> {
    body: &'a [Instruction],
    pos: usize,
    types: &'a [FuncType],
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<&'a Instruction> {
        self.body.get(self.pos)
    }

    fn bump(&mut self) -> Option<&'a Instruction> {
        let instr = self.body.get(self.pos);
        self.pos += 1;
        instr
    }

    fn resolve(&self, bt: BlockType) -> Result<(Vec<ValType>, Vec<ValType>), Error> {
        bt.resolve(self.types).ok_or_else(|| Error::Malformed {
            offset: self.pos,
            reason: "block type index out of range",
        })
    }

    /// Parses a sequence up to (and consuming) the matching `end`, or to
    /// (and consuming) an `else` if `stop_at_else` is set.
    fn parse_seq(&mut self, stop_at_else: bool) -> Result<Node, Error> {
        let mut children = Vec::new();
        loop {
            match self.peek() {
                None => {
                    return Err(Error::Malformed { offset: self.pos, reason: "missing end" })
                }
                Some(Instruction::End) => {
                    self.bump();
                    return Ok(Node::Seq(children));
                }
                Some(Instruction::Else) if stop_at_else => {
                    self.bump();
                    return Ok(Node::Seq(children));
                }
                Some(Instruction::Block(bt)) => {
                    let bt = *bt;
                    self.bump();
                    let (params, results) = self.resolve(bt)?;
                    let body = self.parse_seq(false)?;
                    children.push(Node::Block { kind: BlockKind::Block, params, results, body: Box::new(body) });
                }
                Some(Instruction::Loop(bt)) => {
                    let bt = *bt;
                    self.bump();
                    let (params, results) = self.resolve(bt)?;
                    let body = self.parse_seq(false)?;
                    children.push(Node::Block { kind: BlockKind::Loop, params, results, body: Box::new(body) });
                }
                Some(Instruction::If(bt)) => {
                    let bt = *bt;
                    self.bump();
                    let (params, results) = self.resolve(bt)?;
                    let (then, else_) = self.parse_if_arms()?;
                    children.push(Node::If { params, results, then: Box::new(then), else_ });
                }
                Some(_) => {
                    let instr = self.bump().unwrap().clone();
                    children.push(Node::Instr(instr));
                }
            }
        }
    }

    /// Parses the `then` arm, and the `else` arm if one follows, up to the
    /// `if`'s matching `end`.
    fn parse_if_arms(&mut self) -> Result<(Node, Option<Box<Node>>), Error> {
        let then = self.parse_seq(true)?;
        let saw_else = matches!(self.body.get(self.pos - 1), Some(Instruction::Else));
        if saw_else {
            let else_body = self.parse_seq(false)?;
            Ok((then, Some(Box::new(else_body))))
        } else {
            Ok((then, None))
        }
    }

    fn parse_seq_until_end(&mut self) -> Result<Node, Error> {
        self.parse_seq(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::types::BlockType;

    #[test]
    fn flat_sequence_has_no_nesting() {
        let body = alloc::vec![
            Instruction::I32Const(1),
            Instruction::I32Const(2),
            Instruction::I32Add,
            Instruction::End,
        ];
        let node = parse(&body, &[]).unwrap();
        match node {
            Node::Seq(children) => assert_eq!(children.len(), 3),
            _ => panic!("expected Seq"),
        }
    }

    #[test]
    fn block_lifts_into_nested_node() {
        let body = alloc::vec![
            Instruction::Block(BlockType::Void),
            Instruction::Nop,
            Instruction::End,
            Instruction::End,
        ];
        let node = parse(&body, &[]).unwrap();
        match node {
            Node::Seq(children) => {
                assert_eq!(children.len(), 1);
                match &children[0] {
                    Node::Block { kind: BlockKind::Block, body, .. } => match body.as_ref() {
                        Node::Seq(inner) => assert_eq!(inner.len(), 1),
                        _ => panic!("expected Seq"),
                    },
                    _ => panic!("expected Block"),
                }
            }
            _ => panic!("expected Seq"),
        }
    }

    #[test]
    fn if_without_else() {
        let body = alloc::vec![
            Instruction::I32Const(1),
            Instruction::If(BlockType::Void),
            Instruction::Nop,
            Instruction::End,
            Instruction::End,
        ];
        let node = parse(&body, &[]).unwrap();
        match node {
            Node::Seq(children) => {
                assert_eq!(children.len(), 2);
                match &children[1] {
                    Node::If { else_, .. } => assert!(else_.is_none()),
                    _ => panic!("expected If"),
                }
            }
            _ => panic!("expected Seq"),
        }
    }

    #[test]
    fn if_with_else() {
        let body = alloc::vec![
            Instruction::I32Const(1),
            Instruction::If(BlockType::Void),
            Instruction::Nop,
            Instruction::Else,
            Instruction::Nop,
            Instruction::End,
            Instruction::End,
        ];
        let node = parse(&body, &[]).unwrap();
        match node {
            Node::Seq(children) => match &children[1] {
                Node::If { else_, .. } => assert!(else_.is_some()),
                _ => panic!("expected If"),
            },
            _ => panic!("expected Seq"),
        }
    }

    #[test]
    fn detects_async_call_via_predicate() {
        let body = alloc::vec![Instruction::Call(3), Instruction::End];
        let node = parse(&body, &[]).unwrap();
        assert!(node.contains_async(&|i| matches!(i, Instruction::Call(3))));
        assert!(!node.contains_async(&|i| matches!(i, Instruction::Call(99))));
    }
}
