//! Call-graph analysis (C6, `spec.md` §4.6): classifies every declared
//! function as instrumented or opaque.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;

use crate::binary::instr::Instruction;
use crate::binary::{ImportDesc, Module};
use crate::config::AsyncifyConfig;
use crate::matcher::{ImportRef, Matcher};

/// One entry in the worklist: either a real function index or the
/// synthetic sink standing in for every `call_indirect`/`call_ref` target.
const INDIRECT_SINK: u32 = u32::MAX;

/// Result of analysis: the set of function indices to instrument.
#[derive(Debug, Clone, Default)]
pub struct AsyncSet {
    instrumented: BTreeSet<u32>,
}

impl AsyncSet {
    pub fn is_instrumented(&self, func_idx: u32) -> bool {
        self.instrumented.contains(&func_idx)
    }
}

/// Builds the directed call graph (by declared-function index, i.e.
/// `imported_function_count() + local_index`) and classifies each function
/// per the precedence rules in `spec.md` §3 "Call graph classification".
pub fn analyze(module: &Module, config: &AsyncifyConfig) -> AsyncSet {
    let imported = module.imported_function_count();

    if !config.only_list.is_empty() {
        let mut instrumented = BTreeSet::new();
        for (local_idx, _) in module.code.iter().enumerate() {
            let func_idx = imported + local_idx as u32;
            if let Some(name) = function_export_name(module, func_idx) {
                if config.only_list.iter().any(|m| m.matches_function(name)) {
                    instrumented.insert(func_idx);
                }
            }
        }
        return AsyncSet { instrumented };
    }

    let edges = build_edges(module);

    let mut async_imports: BTreeSet<u32> = BTreeSet::new();
    if !config.ignore_imports {
        for (idx, import) in module.imports.iter().enumerate() {
            if let ImportDesc::Func(_) = import.desc {
                let func_idx = idx as u32;
                let ref_ = ImportRef { module: &import.module, name: &import.name };
                let matched = config
                    .matcher
                    .as_ref()
                    .map(|m| m.matches_import(ref_))
                    .unwrap_or(false)
                    || config.async_imports.iter().any(|p| {
                        Matcher::exact(p.clone()).matches_import(ref_)
                    });
                if matched {
                    async_imports.insert(func_idx);
                }
            }
        }
    }

    let mut instrumented: BTreeSet<u32> = async_imports.clone();
    if !config.ignore_indirect {
        instrumented.insert(INDIRECT_SINK);
    }
    propagate_backward(&edges, &mut instrumented);
    instrumented.remove(&INDIRECT_SINK);

    for (local_idx, _) in module.code.iter().enumerate() {
        let func_idx = imported + local_idx as u32;
        if let Some(name) = function_export_name(module, func_idx) {
            if config.add_list.iter().any(|m| m.matches_function(name)) {
                instrumented.insert(func_idx);
            }
        }
    }
    if config.propagate_add_list {
        propagate_backward(&edges, &mut instrumented);
    }

    for (local_idx, _) in module.code.iter().enumerate() {
        let func_idx = imported + local_idx as u32;
        if let Some(name) = function_export_name(module, func_idx) {
            if config.remove_list.iter().any(|m| m.matches_function(name)) {
                instrumented.remove(&func_idx);
            }
        }
    }

    AsyncSet { instrumented }
}

/// Every declared function's exported name, if it has exactly one. Used
/// only to evaluate `FunctionName`/`FunctionPrefix` matchers, which are
/// defined over declared-function names (`spec.md` §4.9).
fn function_export_name(module: &Module, func_idx: u32) -> Option<&str> {
    module.exports.iter().find_map(|e| match e.desc {
        crate::binary::ExportDesc::Func(idx) if idx == func_idx => Some(e.name.as_str()),
        _ => None,
    })
}

/// Edge list `caller -> callees`, with `call_indirect`/`call_ref` recorded
/// as an edge to `INDIRECT_SINK`.
fn build_edges(module: &Module) -> alloc::collections::BTreeMap<u32, Vec<u32>> {
    let imported = module.imported_function_count();
    let mut edges = alloc::collections::BTreeMap::new();
    for (local_idx, func) in module.code.iter().enumerate() {
        let caller = imported + local_idx as u32;
        let mut callees = Vec::new();
        for instr in &func.body {
            match instr {
                Instruction::Call(callee) | Instruction::ReturnCall(callee) => callees.push(*callee),
                Instruction::CallIndirect { .. }
                | Instruction::ReturnCallIndirect { .. }
                | Instruction::CallRef { .. } => callees.push(INDIRECT_SINK),
                _ => {}
            }
        }
        edges.insert(caller, callees);
    }
    edges
}

/// Propagates membership in `set` backward: if any callee of `f` is in
/// `set`, `f` is added too, to a fixed point.
fn propagate_backward(edges: &alloc::collections::BTreeMap<u32, Vec<u32>>, set: &mut BTreeSet<u32>) {
    loop {
        let mut changed = false;
        for (&caller, callees) in edges {
            if set.contains(&caller) {
                continue;
            }
            if callees.iter().any(|c| set.contains(c)) {
                set.insert(caller);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::{Export, ExportDesc, Function, FuncType, Import, ImportDesc as ID, Module};

    fn simple_module() -> Module {
        let mut m = Module::default();
        m.types.push(FuncType::new(alloc::vec![], alloc::vec![]));
        m.imports.push(Import { module: "env".into(), name: "async_fn".into(), desc: ID::Func(0) });
        // func 1: calls the import directly
        m.functions.push(0);
        m.code.push(Function { locals: alloc::vec![], body: alloc::vec![Instruction::Call(0), Instruction::End] });
        // func 2: calls func 1
        m.functions.push(0);
        m.code.push(Function { locals: alloc::vec![], body: alloc::vec![Instruction::Call(1), Instruction::End] });
        // func 3: calls nothing async
        m.functions.push(0);
        m.code.push(Function { locals: alloc::vec![], body: alloc::vec![Instruction::End] });
        m.exports.push(Export { name: "f1".into(), desc: ExportDesc::Func(1) });
        m.exports.push(Export { name: "f2".into(), desc: ExportDesc::Func(2) });
        m.exports.push(Export { name: "f3".into(), desc: ExportDesc::Func(3) });
        m
    }

    #[test]
    fn propagates_through_direct_calls() {
        let module = simple_module();
        let config = AsyncifyConfig::new()
            .with_matcher(Matcher::exact("async_fn"))
            .with_remove(Matcher::function_name("f3")); // no-op, just exercising the field
        let mut config = config;
        config.ignore_indirect = true;
        let set = analyze(&module, &config);
        assert!(set.is_instrumented(1));
        assert!(set.is_instrumented(2));
        assert!(!set.is_instrumented(3));
    }

    #[test]
    fn only_list_overrides_everything() {
        let module = simple_module();
        let mut config = AsyncifyConfig::new();
        config.only_list.push(Matcher::function_name("f3"));
        let set = analyze(&module, &config);
        assert!(!set.is_instrumented(1));
        assert!(set.is_instrumented(3));
    }

    #[test]
    fn remove_list_has_highest_precedence() {
        let module = simple_module();
        let mut config = AsyncifyConfig::new().with_matcher(Matcher::exact("async_fn"));
        config.ignore_indirect = true;
        config.remove_list.push(Matcher::function_name("f1"));
        let set = analyze(&module, &config);
        assert!(!set.is_instrumented(1));
    }

    #[test]
    fn call_indirect_is_treated_as_async_by_default() {
        // No matched import at all: the only thing that could make any
        // function async is the default `ignore_indirect: false` treating
        // every `call_indirect`/`call_ref` site as a possible suspension
        // point.
        let mut module = Module::default();
        module.types.push(FuncType::new(alloc::vec![], alloc::vec![]));
        module.tables.push(crate::binary::types::TableType {
            element: crate::binary::types::RefType::Func,
            limits: crate::binary::types::Limits { min: 1, max: None },
        });
        module.functions.push(0);
        module.code.push(Function {
            locals: alloc::vec![],
            body: alloc::vec![
                Instruction::I32Const(0),
                Instruction::CallIndirect { type_index: 0, table_index: 0 },
                Instruction::End,
            ],
        });
        module.exports.push(Export { name: "caller".into(), desc: ExportDesc::Func(0) });
        let config = AsyncifyConfig::new();
        let set = analyze(&module, &config);
        assert!(set.is_instrumented(0));
    }

    #[test]
    fn call_ref_is_treated_as_async_by_default() {
        let mut module = Module::default();
        module.types.push(FuncType::new(alloc::vec![], alloc::vec![]));
        module.functions.push(0);
        module.code.push(Function {
            locals: alloc::vec![],
            body: alloc::vec![Instruction::CallRef { type_index: 0 }, Instruction::End],
        });
        module.exports.push(Export { name: "caller".into(), desc: ExportDesc::Func(0) });
        let config = AsyncifyConfig::new();
        let set = analyze(&module, &config);
        assert!(set.is_instrumented(0));
    }

    #[test]
    fn ignore_indirect_excludes_call_indirect_from_async_classification() {
        let mut module = Module::default();
        module.types.push(FuncType::new(alloc::vec![], alloc::vec![]));
        module.tables.push(crate::binary::types::TableType {
            element: crate::binary::types::RefType::Func,
            limits: crate::binary::types::Limits { min: 1, max: None },
        });
        module.functions.push(0);
        module.code.push(Function {
            locals: alloc::vec![],
            body: alloc::vec![
                Instruction::I32Const(0),
                Instruction::CallIndirect { type_index: 0, table_index: 0 },
                Instruction::End,
            ],
        });
        module.exports.push(Export { name: "caller".into(), desc: ExportDesc::Func(0) });
        let mut config = AsyncifyConfig::new();
        config.ignore_indirect = true;
        let set = analyze(&module, &config);
        assert!(!set.is_instrumented(0));
    }
}
