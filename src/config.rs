//! `AsyncifyConfig`: the full option surface from `spec.md` §6, as a
//! builder, the way the teacher's consumers configure `wasmi::ModuleConfig`-
//! shaped structs: plain public fields plus `with_*`-style setters rather
//! than a string-keyed map, so unknown options are a compile error rather
//! than a runtime one.

use alloc::string::String;
use alloc::vec::Vec;

use crate::matcher::Matcher;

/// Full configuration for one rewrite pass.
#[derive(Debug, Clone, Default)]
pub struct AsyncifyConfig {
    /// Selects async imports. `None` means no import is async by pattern
    /// (only `add_list` can then make anything instrumented).
    pub matcher: Option<Matcher>,
    /// Convenience import list, merged with `matcher` by disjunction.
    pub async_imports: Vec<String>,
    /// Restricts instrumentation to exactly this set of declared functions,
    /// overriding call-graph analysis entirely.
    pub only_list: Vec<Matcher>,
    /// Functions forced to instrumented regardless of reachability.
    pub add_list: Vec<Matcher>,
    /// Functions forced to untouched; highest precedence.
    pub remove_list: Vec<Matcher>,
    /// When set, `add_list` also propagates backward through the call graph.
    pub propagate_add_list: bool,
    /// Ignore `matcher`/`async_imports` entirely (useful with `only_list`).
    pub ignore_imports: bool,
    /// Treat `call_indirect`/`call_ref` as non-async edges.
    pub ignore_indirect: bool,
    /// Which memory holds the asyncify buffer, when not using a secondary one.
    pub memory_index: u32,
    /// Introduce a dedicated second memory for the asyncify buffer.
    pub use_secondary_memory: bool,
    /// Minimum page count for the secondary memory, required when
    /// `use_secondary_memory` is set.
    pub secondary_memory_pages: Option<u32>,
    /// Insert runtime state-transition assertions into the five helpers.
    pub asserts: bool,
    /// Import `asyncify_state`/`asyncify_data` from `"env"` instead of
    /// defining them locally.
    pub import_globals: bool,
    /// Export `asyncify_state`/`asyncify_data`.
    pub export_globals: bool,
    /// Use `i64` offsets/pointers (memory64 proposal).
    pub wasm64: bool,
}

impl AsyncifyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matcher = Some(matcher);
        self
    }

    pub fn with_async_import(mut self, pattern: impl Into<String>) -> Self {
        self.async_imports.push(pattern.into());
        self
    }

    pub fn with_only(mut self, matcher: Matcher) -> Self {
        self.only_list.push(matcher);
        self
    }

    pub fn with_add(mut self, matcher: Matcher) -> Self {
        self.add_list.push(matcher);
        self
    }

    pub fn with_remove(mut self, matcher: Matcher) -> Self {
        self.remove_list.push(matcher);
        self
    }

    /// Validates flag combinations that are only knowable once every field
    /// is set (`spec.md` §7 `ConfigError`: "missing secondary memory page
    /// count").
    pub fn validate(&self) -> Result<(), crate::error::Error> {
        if self.use_secondary_memory && self.secondary_memory_pages.is_none() {
            return Err(crate::error::Error::Config {
                reason: "use_secondary_memory requires secondary_memory_pages".into(),
            });
        }
        Ok(())
    }
}
