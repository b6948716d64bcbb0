//! Import/function pattern matchers (C9, `spec.md` §4.9): the small pattern
//! languages used to pick out async imports and to build `OnlyList`/
//! `AddList`/`RemoveList` entries.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::error::Error;

/// One subject an import or function name can be matched against.
#[derive(Debug, Clone, Copy)]
pub struct ImportRef<'a> {
    pub module: &'a str,
    pub name: &'a str,
}

#[derive(Debug, Clone)]
pub enum Matcher {
    /// `name`, `module.name`, or `module#name`: equality only.
    Exact(String),
    /// The `Exact` forms plus `module.*` and `*`.
    Wildcard(String),
    /// WIT-style `iface@version#func`; `@version` may be a concrete version,
    /// a prefix like `@1.*`, or omitted from the pattern to match any
    /// version.
    Wit(String),
    /// Matches a declared function's exact name.
    FunctionName(String),
    /// Matches a declared function name by prefix.
    FunctionPrefix(String),
    /// Disjunction over children.
    Composite(Vec<Matcher>),
}

impl Matcher {
    pub fn exact(pattern: impl Into<String>) -> Self {
        Matcher::Exact(pattern.into())
    }

    pub fn wildcard(pattern: impl Into<String>) -> Result<Self, Error> {
        let pattern = pattern.into();
        validate_wildcard(&pattern)?;
        Ok(Matcher::Wildcard(pattern))
    }

    pub fn wit(pattern: impl Into<String>) -> Result<Self, Error> {
        let pattern = pattern.into();
        validate_wit(&pattern)?;
        Ok(Matcher::Wit(pattern))
    }

    pub fn function_name(name: impl Into<String>) -> Self {
        Matcher::FunctionName(name.into())
    }

    pub fn function_prefix(prefix: impl Into<String>) -> Self {
        Matcher::FunctionPrefix(prefix.into())
    }

    pub fn any_of(matchers: Vec<Matcher>) -> Self {
        Matcher::Composite(matchers)
    }

    /// Whether this matcher selects the given import.
    pub fn matches_import(&self, import: ImportRef) -> bool {
        match self {
            Matcher::Exact(pattern) => exact_forms(import).iter().any(|f| f == pattern),
            Matcher::Wildcard(pattern) => match_wildcard(pattern, import),
            Matcher::Wit(pattern) => match_wit(pattern, import),
            Matcher::FunctionName(_) | Matcher::FunctionPrefix(_) => false,
            Matcher::Composite(children) => children.iter().any(|m| m.matches_import(import)),
        }
    }

    /// Whether this matcher selects the given declared-function name.
    pub fn matches_function(&self, name: &str) -> bool {
        match self {
            Matcher::FunctionName(pattern) => pattern == name,
            Matcher::FunctionPrefix(prefix) => name.starts_with(prefix.as_str()),
            Matcher::Composite(children) => children.iter().any(|m| m.matches_function(name)),
            Matcher::Exact(_) | Matcher::Wildcard(_) | Matcher::Wit(_) => false,
        }
    }
}

fn exact_forms(import: ImportRef) -> [String; 3] {
    [
        import.name.to_string(),
        alloc::format!("{}.{}", import.module, import.name),
        alloc::format!("{}#{}", import.module, import.name),
    ]
}

fn validate_wildcard(pattern: &str) -> Result<(), Error> {
    if pattern.matches('*').count() > 1 {
        return Err(Error::Matcher {
            pattern: pattern.to_string(),
            reason: "at most one `*` is supported".into(),
        });
    }
    Ok(())
}

fn match_wildcard(pattern: &str, import: ImportRef) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(module_prefix) = pattern.strip_suffix(".*") {
        return import.module == module_prefix;
    }
    exact_forms(import).iter().any(|f| f == pattern)
}

/// `namespace:package/interface@version#function`, simplified per
/// `spec.md` §4.9/GLOSSARY to the `iface@version#func` shape this rewriter
/// actually needs to match against plain two-part Wasm imports.
fn validate_wit(pattern: &str) -> Result<(), Error> {
    if !pattern.contains('#') {
        return Err(Error::Matcher {
            pattern: pattern.to_string(),
            reason: "WIT pattern must contain `#function`".into(),
        });
    }
    Ok(())
}

fn match_wit(pattern: &str, import: ImportRef) -> bool {
    let (iface_pattern, func_pattern) = match pattern.split_once('#') {
        Some(parts) => parts,
        None => return false,
    };
    if func_pattern != import.name {
        return false;
    }
    let (module_iface, module_version) = split_version(import.module);
    let (pattern_iface, pattern_version) = split_version(iface_pattern);
    if pattern_iface != module_iface {
        return false;
    }
    match pattern_version {
        None => true,
        Some(v) if v.ends_with(".*") => {
            let prefix = &v[..v.len() - 1];
            module_version.map(|mv| mv.starts_with(prefix)).unwrap_or(false)
        }
        Some(v) => module_version == Some(v),
    }
}

fn split_version(s: &str) -> (&str, Option<&str>) {
    match s.split_once('@') {
        Some((iface, version)) => (iface, Some(version)),
        None => (s, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn import<'a>(module: &'a str, name: &'a str) -> ImportRef<'a> {
        ImportRef { module, name }
    }

    #[test]
    fn exact_matches_all_three_forms() {
        let m = Matcher::exact("env.async");
        assert!(m.matches_import(import("env", "async")));
        assert!(!m.matches_import(import("env", "other")));
        assert!(Matcher::exact("async").matches_import(import("env", "async")));
        assert!(Matcher::exact("env#async").matches_import(import("env", "async")));
    }

    #[test]
    fn wildcard_module_star() {
        let m = Matcher::wildcard("env.*").unwrap();
        assert!(m.matches_import(import("env", "anything")));
        assert!(!m.matches_import(import("other", "anything")));
    }

    #[test]
    fn wildcard_global_star() {
        let m = Matcher::wildcard("*").unwrap();
        assert!(m.matches_import(import("anything", "anything")));
    }

    #[test]
    fn wit_version_prefix() {
        let m = Matcher::wit("iface@1.*#func").unwrap();
        assert!(m.matches_import(import("iface@1.2.0", "func")));
        assert!(!m.matches_import(import("iface@2.0.0", "func")));
    }

    #[test]
    fn wit_no_version_in_pattern_matches_any() {
        let m = Matcher::wit("iface#func").unwrap();
        assert!(m.matches_import(import("iface@1.2.0", "func")));
        assert!(m.matches_import(import("iface", "func")));
    }

    #[test]
    fn function_prefix_matches_declared_names() {
        let m = Matcher::function_prefix("handle_");
        assert!(m.matches_function("handle_event"));
        assert!(!m.matches_function("other"));
        assert!(!m.matches_import(import("env", "handle_event")));
    }

    #[test]
    fn composite_is_disjunction() {
        let m = Matcher::any_of(alloc::vec![Matcher::exact("a"), Matcher::exact("b")]);
        assert!(m.matches_import(import("env", "a")));
        assert!(m.matches_import(import("env", "b")));
        assert!(!m.matches_import(import("env", "c")));
    }
}
