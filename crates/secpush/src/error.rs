//! Typed error kinds that the driver matches on to pick an exit code.
//!
//! Everything still travels as `anyhow::Error` at the call boundary — these
//! enums exist so `lib.rs::run` can tell a config problem from a partial
//! failure without string-matching a message.

use std::fmt;

/// Load-time failure. Always terminal — nothing downstream of the loader runs.
#[derive(Debug)]
pub enum LoadError {
    UnknownSourceType { source: String, kind: String },
    UnknownSinkType { sink: String, kind: String },
    UndeclaredSource { sink: String, referenced: String },
    DuplicateSourceName { name: String },
    InvalidSsmType { sink: String, value: String },
    InvalidTier { sink: String, value: String },
    NonPositiveRateLimit { sink: String, value: f64 },
    NonPositiveConcurrency { sink: String, value: i64 },
    UnresolvedTemplate { variable: String, file: String },
    BadMergeShape { path: String, detail: String },
    Other(String),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::UnknownSourceType { source, kind } => {
                write!(f, "source '{source}' has unknown type '{kind}'")
            }
            LoadError::UnknownSinkType { sink, kind } => {
                write!(f, "sink '{sink}' has unknown type '{kind}'")
            }
            LoadError::UndeclaredSource { sink, referenced } => write!(
                f,
                "sink '{sink}' references undeclared source '{referenced}'"
            ),
            LoadError::DuplicateSourceName { name } => {
                write!(f, "duplicate source name '{name}'")
            }
            LoadError::InvalidSsmType { sink, value } => write!(
                f,
                "sink '{sink}' has invalid ssm type '{value}' (expected SecureString or String)"
            ),
            LoadError::InvalidTier { sink, value } => {
                write!(f, "sink '{sink}' has invalid tier '{value}'")
            }
            LoadError::NonPositiveRateLimit { sink, value } => write!(
                f,
                "sink '{sink}' has non-positive rate_limit_rps: {value}"
            ),
            LoadError::NonPositiveConcurrency { sink, value } => {
                write!(f, "sink '{sink}' has non-positive concurrency: {value}")
            }
            LoadError::UnresolvedTemplate { variable, file } => write!(
                f,
                "unresolved template variable '{{{{{variable}}}}}' in '{file}'"
            ),
            LoadError::BadMergeShape { path, detail } => {
                write!(f, "cannot merge at '{path}': {detail}")
            }
            LoadError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for LoadError {}

/// Why a single item failed to dispatch to a single sink. Recorded against
/// the item; the run continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Exists,
    TooLarge,
    Aws(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Exists => write!(f, "exists (overwrite disabled)"),
            FailureReason::TooLarge => write!(f, "value too large"),
            FailureReason::Aws(msg) => write!(f, "aws error: {msg}"),
        }
    }
}
