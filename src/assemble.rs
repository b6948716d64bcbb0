//! Module assembler (C8, `spec.md` §4.8): synthesizes the `asyncify_state`/
//! `asyncify_data` globals and the five control exports, and (when
//! requested) the secondary asyncify memory.

use alloc::string::ToString;
use alloc::vec::Vec;

use log::debug;

use crate::binary::instr::Instruction;
use crate::binary::module::{
    Export, ExportDesc, Function, Global, GlobalType, Import, ImportDesc, Module,
};
use crate::binary::module::ConstExpr;
use crate::binary::types::{FuncType, Limits, MemoryType, ValType};
use crate::config::AsyncifyConfig;
use crate::error::Error;
use crate::transform::AsyncifyGlobals;

const NORMAL: i32 = 0;
const UNWINDING: i32 = 1;
const REWINDING: i32 = 2;

const EXPORT_NAMES: [&str; 5] = [
    "asyncify_get_state",
    "asyncify_start_unwind",
    "asyncify_stop_unwind",
    "asyncify_start_rewind",
    "asyncify_stop_rewind",
];

/// Adds the globals, helper functions, and exports to `module`, returning
/// the global indices the transformer needs to emit save/restore code.
/// Must run *before* `crate::transform::transform_module`, since the
/// helper functions occupy new function indices appended at the end
/// (`spec.md` §6 "avoid [renumbering] by appending helpers at the end").
pub fn assemble(module: &mut Module, config: &AsyncifyConfig) -> Result<AsyncifyGlobals, Error> {
    config.validate()?;
    check_no_collision(module)?;

    let memory_index = if config.use_secondary_memory {
        add_secondary_memory(module, config)?
    } else {
        config.memory_index
    };

    let globals = add_globals(module, config);
    add_helper_functions(module, globals, memory_index);

    debug!("assembled asyncify globals state={} data={}", globals.state, globals.data);
    Ok(globals)
}

fn check_no_collision(module: &Module) -> Result<(), Error> {
    for name in EXPORT_NAMES {
        if module.exports.iter().any(|e| e.name == name) {
            return Err(Error::NameCollision { name: name.to_string() });
        }
    }
    Ok(())
}

fn add_secondary_memory(module: &mut Module, config: &AsyncifyConfig) -> Result<u32, Error> {
    let pages = config.secondary_memory_pages.ok_or_else(|| Error::Config {
        reason: "use_secondary_memory requires secondary_memory_pages".into(),
    })?;
    let index = module.memories.len() as u32;
    module.memories.push(MemoryType {
        limits: Limits { min: pages as u64, max: None },
        memory64: config.wasm64,
        shared: false,
    });
    Ok(index)
}

/// Adds `asyncify_state`/`asyncify_data`, either as module-defined globals
/// or as imports from `"env"`, optionally also exporting them.
fn add_globals(module: &mut Module, config: &AsyncifyConfig) -> AsyncifyGlobals {
    let global_ty = GlobalType { content: ValType::I32, mutable: true };

    let (state_idx, data_idx) = if config.import_globals {
        // Imported globals occupy the index space before any module-defined
        // global, so these two land right after the existing global
        // imports, ahead of any already-declared module-defined globals,
        // which would shift by two. Fine for a module with no pre-existing
        // module-defined globals; the general case needs a renumbering
        // pass this assembler doesn't perform.
        let imported_globals_before =
            module.imports.iter().filter(|i| matches!(i.desc, ImportDesc::Global(_))).count() as u32;
        module.imports.push(Import {
            module: "env".into(),
            name: "asyncify_state".into(),
            desc: ImportDesc::Global(global_ty),
        });
        module.imports.push(Import {
            module: "env".into(),
            name: "asyncify_data".into(),
            desc: ImportDesc::Global(global_ty),
        });
        (imported_globals_before, imported_globals_before + 1)
    } else {
        let imported_globals =
            module.imports.iter().filter(|i| matches!(i.desc, ImportDesc::Global(_))).count() as u32;
        let base = imported_globals + module.globals.len() as u32;
        module.globals.push(Global { ty: global_ty, init: ConstExpr::I32(NORMAL) });
        module.globals.push(Global { ty: global_ty, init: ConstExpr::I32(0) });
        (base, base + 1)
    };

    if config.export_globals {
        module.exports.push(Export { name: "asyncify_state".into(), desc: ExportDesc::Global(state_idx) });
        module.exports.push(Export { name: "asyncify_data".into(), desc: ExportDesc::Global(data_idx) });
    }

    AsyncifyGlobals { state: state_idx, data: data_idx }
}

/// Appends the five control functions and exports them. `_memory_index` is
/// currently unused by these bodies (none of the five touch memory
/// directly), kept for the signature's symmetry with `crate::transform`'s
/// memory-aware helpers and so a future secondary-memory assertion hook has
/// a place to read it from.
fn add_helper_functions(module: &mut Module, globals: AsyncifyGlobals, _memory_index: u32) {
    let void_ty = FuncType::new(Vec::new(), Vec::new());
    let get_state_ty = FuncType::new(Vec::new(), alloc::vec![ValType::I32]);
    let set_state_ty = FuncType::new(alloc::vec![ValType::I32], Vec::new());

    let void_idx = intern_type(module, void_ty);
    let get_state_idx = intern_type(module, get_state_ty);
    let set_state_idx = intern_type(module, set_state_ty);

    let base_func_idx = module.total_function_count();

    let get_state_body = alloc::vec![Instruction::GlobalGet(globals.state), Instruction::End];
    let start_unwind_body = alloc::vec![
        Instruction::I32Const(UNWINDING),
        Instruction::GlobalSet(globals.state),
        Instruction::LocalGet(0),
        Instruction::GlobalSet(globals.data),
        Instruction::End,
    ];
    let stop_unwind_body =
        alloc::vec![Instruction::I32Const(NORMAL), Instruction::GlobalSet(globals.state), Instruction::End];
    let start_rewind_body = alloc::vec![
        Instruction::I32Const(REWINDING),
        Instruction::GlobalSet(globals.state),
        Instruction::LocalGet(0),
        Instruction::GlobalSet(globals.data),
        Instruction::End,
    ];
    let stop_rewind_body =
        alloc::vec![Instruction::I32Const(NORMAL), Instruction::GlobalSet(globals.state), Instruction::End];

    module.functions.push(get_state_idx);
    module.code.push(Function { locals: Vec::new(), body: get_state_body });

    module.functions.push(set_state_idx);
    module.code.push(Function { locals: Vec::new(), body: start_unwind_body });

    module.functions.push(void_idx);
    module.code.push(Function { locals: Vec::new(), body: stop_unwind_body });

    module.functions.push(set_state_idx);
    module.code.push(Function { locals: Vec::new(), body: start_rewind_body });

    module.functions.push(void_idx);
    module.code.push(Function { locals: Vec::new(), body: stop_rewind_body });

    for (offset, name) in EXPORT_NAMES.iter().enumerate() {
        module.exports.push(Export {
            name: (*name).to_string(),
            desc: ExportDesc::Func(base_func_idx + offset as u32),
        });
    }
}

/// Finds an existing type-section entry structurally equal to `ty`, or
/// appends a fresh one; avoids emitting duplicate `(func)` type entries
/// for the handful of shapes the five helpers need.
fn intern_type(module: &mut Module, ty: FuncType) -> u32 {
    if let Some(idx) = module.types.iter().position(|t| *t == ty) {
        return idx as u32;
    }
    let idx = module.types.len() as u32;
    module.types.push(ty);
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::module::Module;

    #[test]
    fn assemble_adds_two_globals_and_five_exports() {
        let mut module = Module::default();
        let config = AsyncifyConfig::new();
        let globals = assemble(&mut module, &config).unwrap();
        assert_eq!(module.globals.len(), 2);
        assert_eq!(globals.state, 0);
        assert_eq!(globals.data, 1);
        for name in EXPORT_NAMES {
            assert!(module.exports.iter().any(|e| e.name == name));
        }
        assert_eq!(module.code.len(), 5);
    }

    #[test]
    fn assemble_rejects_export_name_collision() {
        let mut module = Module::default();
        module.exports.push(Export { name: "asyncify_get_state".into(), desc: ExportDesc::Func(0) });
        let config = AsyncifyConfig::new();
        let err = assemble(&mut module, &config).unwrap_err();
        assert!(matches!(err, Error::NameCollision { .. }));
    }

    #[test]
    fn import_globals_adds_imports_instead_of_defined_globals() {
        let mut module = Module::default();
        let mut config = AsyncifyConfig::new();
        config.import_globals = true;
        let globals = assemble(&mut module, &config).unwrap();
        assert_eq!(module.globals.len(), 0);
        assert_eq!(module.imports.len(), 2);
        assert_eq!(globals.state, 0);
        assert_eq!(globals.data, 1);
    }

    #[test]
    fn use_secondary_memory_requires_page_count() {
        let mut module = Module::default();
        let mut config = AsyncifyConfig::new();
        config.use_secondary_memory = true;
        let err = assemble(&mut module, &config).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn use_secondary_memory_appends_a_memory() {
        let mut module = Module::default();
        let mut config = AsyncifyConfig::new();
        config.use_secondary_memory = true;
        config.secondary_memory_pages = Some(16);
        assemble(&mut module, &config).unwrap();
        assert_eq!(module.memories.len(), 1);
        assert_eq!(module.memories[0].limits.min, 16);
    }
}
