//! Error taxonomy for the rewriter, in the teacher's manual-`Display` style
//! (`examples/wasmi-labs-wasmi/src/lib.rs`'s `Error` enum) rather than a
//! derive-macro crate: one variant per failure category, each carrying just
//! enough context to point a caller at the offending byte or name.

use alloc::string::String;
use core::fmt;

/// Everything that can go wrong while decoding, analyzing, or rewriting a
/// module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The input is not a well-formed Wasm binary.
    Malformed { offset: usize, reason: &'static str },
    /// The input uses a feature this rewriter does not support instrumenting.
    UnsupportedFeature { reason: String },
    /// A name the rewriter would synthesize (export, global) already exists
    /// in the module.
    NameCollision { name: String },
    /// The supplied `AsyncifyConfig` is internally inconsistent.
    Config { reason: String },
    /// An import-matcher pattern (`crate::matcher`) could not be parsed.
    Matcher { pattern: String, reason: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Malformed { offset, reason } => {
                write!(f, "malformed module at byte {offset}: {reason}")
            }
            Error::UnsupportedFeature { reason } => write!(f, "unsupported feature: {reason}"),
            Error::NameCollision { name } => {
                write!(f, "name `{name}` collides with a synthesized export")
            }
            Error::Config { reason } => write!(f, "invalid configuration: {reason}"),
            Error::Matcher { pattern, reason } => {
                write!(f, "invalid import pattern `{pattern}`: {reason}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
