//! # wasm_asyncify
//!
//! Rewrites a WebAssembly module so that any function which can transitively
//! reach a host-designated "asynchronous" import can be suspended mid
//! execution (its live call stack serialized into linear memory) and
//! later resumed. Output is Binaryen-`wasm-opt --asyncify` compatible: two
//! globals (`asyncify_state`, `asyncify_data`) and five control exports
//! (`asyncify_get_state`, `asyncify_start_unwind`, `asyncify_stop_unwind`,
//! `asyncify_start_rewind`, `asyncify_stop_rewind`) are added, and every
//! function reachable from a matched import is replaced with a version that
//! checks the state machine at each suspension point.
//!
//! ## Pipeline
//!
//! 1. [`binary::decode`]: bytes to a [`binary::Module`].
//! 2. [`callgraph::analyze`]: which functions need instrumenting.
//! 3. [`assemble::assemble`]: inject the globals, helpers, and exports
//!    (done before the transform so the appended helpers never shift an
//!    index a rewritten call site depends on).
//! 4. [`transform::transform_module`]: per-function rewrite (parse via
//!    [`cfir`], linearize via [`linearize`], flatten and walk via
//!    [`handlers`]).
//! 5. [`binary::encode`]: `Module` back to bytes.
//!
//! [`rewrite`] drives all five steps. A module with no async-reachable
//! function still gets the two globals and five exports, but every
//! original function is byte-identical.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std as alloc;

pub mod assemble;
pub mod binary;
pub mod callgraph;
pub mod cfir;
pub mod config;
pub mod emit;
pub mod error;
pub mod handlers;
pub mod linearize;
pub mod matcher;
pub mod transform;

pub use binary::Module;
pub use callgraph::AsyncSet;
pub use config::AsyncifyConfig;
pub use error::Error;
pub use matcher::{ImportRef, Matcher};
pub use transform::AsyncifyGlobals;

use alloc::vec::Vec;

use log::info;

/// Runs the whole pipeline: decode `input`, instrument it per `config`, and
/// re-encode.
pub fn rewrite(input: &[u8], config: &AsyncifyConfig) -> Result<Vec<u8>, Error> {
    config.validate()?;

    let mut module = binary::decode(input)?;
    info!(
        "decoded module: {} types, {} imports, {} functions, {} exports",
        module.types.len(),
        module.imports.len(),
        module.total_function_count(),
        module.exports.len()
    );

    let async_set = callgraph::analyze(&module, config);

    let globals = assemble::assemble(&mut module, config)?;
    transform::transform_module(&mut module, &async_set, globals)?;

    let bytes = binary::encode(&module);
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::instr::Instruction;
    use crate::binary::module::{Export, ExportDesc, Function};
    use crate::binary::types::FuncType;

    fn minimal_module() -> Module {
        let mut module = Module::default();
        module.types.push(FuncType::new(Vec::new(), Vec::new()));
        module.functions.push(0);
        module.code.push(Function { locals: Vec::new(), body: alloc::vec![Instruction::End] });
        module.exports.push(Export { name: "test".into(), desc: ExportDesc::Func(0) });
        module
    }

    #[test]
    fn rewrite_on_module_with_no_async_imports_adds_globals_and_exports_only() {
        let module = minimal_module();
        let bytes = binary::encode(&module);
        let config = AsyncifyConfig::new();
        let out = rewrite(&bytes, &config).unwrap();
        let decoded = binary::decode(&out).unwrap();
        assert_eq!(decoded.globals.len(), 2);
        assert!(decoded.exports.iter().any(|e| e.name == "asyncify_get_state"));
        assert!(decoded.exports.iter().any(|e| e.name == "test"));
        assert_eq!(decoded.code.len(), 1 + 5);
    }

    #[test]
    fn rewrite_rejects_malformed_input() {
        let config = AsyncifyConfig::new();
        let err = rewrite(&[0x00, 0x01], &config).unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
    }

    /// A function's declared result is flattened into a local like any
    /// other handler output (C3). Falling off the end of its body is the
    /// other exit edge alongside an explicit `return`, and needs the same
    /// reload: the constant this function computes must come back from its
    /// local before the function's real closing `end`, or the encoded
    /// function would leave the operand stack empty where a result belongs.
    #[test]
    fn instrumented_function_reloads_its_own_result_before_returning() {
        let mut module = Module::default();
        module.types.push(FuncType::new(Vec::new(), alloc::vec![crate::binary::types::ValType::I32]));
        module.functions.push(0);
        module.code.push(Function {
            locals: Vec::new(),
            body: alloc::vec![Instruction::I32Const(42), Instruction::End],
        });
        module.exports.push(Export { name: "test".into(), desc: ExportDesc::Func(0) });

        let bytes = binary::encode(&module);
        // No async import at all, force instrumentation directly so this
        // exercises the non-async fall-off-the-end path in isolation.
        let config = AsyncifyConfig::new().with_only(crate::matcher::Matcher::function_name("test"));
        let out = rewrite(&bytes, &config).unwrap();
        let decoded = binary::decode(&out).unwrap();

        let rewritten = &decoded.code[0].body;
        let const_pos = rewritten.iter().position(|i| matches!(i, Instruction::I32Const(42))).unwrap();
        let set_local = match rewritten[const_pos + 1] {
            Instruction::LocalSet(idx) => idx,
            other => panic!("expected a local.set right after the constant, got {other:?}"),
        };
        assert!(
            rewritten[const_pos + 2..].iter().any(|i| matches!(i, Instruction::LocalGet(idx) if *idx == set_local)),
            "the computed constant's local must be reloaded back onto the stack before the function returns"
        );
    }

    /// An async call site is wrapped in the entry guard `state == Normal ||
    /// (state == Rewinding && call_idx == K)` and, past the real call, a
    /// second guard that bubbles out a `return` the moment the callee
    /// started unwinding (`spec.md` §4.7).
    #[test]
    fn async_call_site_is_wrapped_with_entry_and_unwind_guards() {
        let mut module = Module::default();
        module.types.push(FuncType::new(Vec::new(), Vec::new()));
        module.imports.push(crate::binary::module::Import {
            module: "env".into(),
            name: "suspend".into(),
            desc: crate::binary::module::ImportDesc::Func(0),
        });
        module.functions.push(0);
        module.code.push(Function {
            locals: Vec::new(),
            body: alloc::vec![Instruction::Call(0), Instruction::End],
        });
        module.exports.push(Export { name: "caller".into(), desc: ExportDesc::Func(1) });

        let bytes = binary::encode(&module);
        let config = AsyncifyConfig::new().with_matcher(Matcher::exact("suspend"));
        let out = rewrite(&bytes, &config).unwrap();
        let decoded = binary::decode(&out).unwrap();

        let rewritten = &decoded.code[0].body;
        let call_pos = rewritten.iter().position(|i| matches!(i, Instruction::Call(0))).unwrap();
        assert!(
            rewritten[..call_pos].iter().any(|i| matches!(i, Instruction::If(_))),
            "expected an entry guard `if` ahead of the wrapped call"
        );
        assert!(
            rewritten[call_pos..]
                .windows(3)
                .any(|w| matches!(w[0], Instruction::GlobalGet(_))
                    && matches!(w[1], Instruction::I32Const(n) if n == 1)
                    && matches!(w[2], Instruction::I32Eq)),
            "expected an `asyncify_state == Unwinding` check right after the call"
        );
        assert!(
            rewritten[call_pos..].iter().any(|i| matches!(i, Instruction::Return)),
            "expected a bubble-out return guarded by the post-call unwinding check"
        );
    }

    /// `i32`/`i64`/`f32`/`f64` locals live across an async call must all
    /// round-trip through the save/restore frame with their own value
    /// preserved, not just the first one.
    #[test]
    fn all_four_numeric_local_types_round_trip_through_save_and_restore() {
        use crate::binary::types::ValType;

        let mut module = Module::default();
        module.types.push(FuncType::new(Vec::new(), Vec::new()));
        module.imports.push(crate::binary::module::Import {
            module: "env".into(),
            name: "suspend".into(),
            desc: crate::binary::module::ImportDesc::Func(0),
        });
        module.functions.push(0);
        module.code.push(Function {
            locals: alloc::vec![(1, ValType::I32), (1, ValType::I64), (1, ValType::F32), (1, ValType::F64)],
            body: alloc::vec![
                Instruction::I32Const(1),
                Instruction::LocalSet(0),
                Instruction::I64Const(2),
                Instruction::LocalSet(1),
                Instruction::F32Const(wasm_asyncify_core::F32::from(3.0f32)),
                Instruction::LocalSet(2),
                Instruction::F64Const(wasm_asyncify_core::F64::from(4.0f64)),
                Instruction::LocalSet(3),
                Instruction::Call(0),
                Instruction::End,
            ],
        });
        module.exports.push(Export { name: "caller".into(), desc: ExportDesc::Func(1) });

        let bytes = binary::encode(&module);
        let config = AsyncifyConfig::new().with_matcher(Matcher::exact("suspend"));
        let out = rewrite(&bytes, &config).unwrap();
        let decoded = binary::decode(&out).unwrap();

        let rewritten_fn = &decoded.code[0];
        // Four distinct locals means four distinct store ops and four
        // distinct load ops across the save/restore helpers this function
        // now calls into (asymmetric widths: i32/f32 four bytes, i64/f64
        // eight), not a single bogus 4-byte slot reused for all of them.
        let store_ops = rewritten_fn
            .body
            .iter()
            .filter(|i| matches!(i, Instruction::I32Store(_) | Instruction::I64Store(_) | Instruction::F32Store(_) | Instruction::F64Store(_)))
            .count();
        assert!(store_ops >= 4, "expected at least one store per saved local, got {store_ops}");
    }
}
