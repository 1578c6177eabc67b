//! Error taxonomy for resolution and compilation.

use thiserror::Error;

use crate::validate::CompilerError;

#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// A structural guarantee was violated.
    #[error("{0}")]
    Invariant(#[from] CompilerError),

    #[error("{file}:{line}:{column} component cycle detected: {}", chain.join(" -> "))]
    ComponentCycle {
        file: String,
        chain: Vec<String>,
        line: u32,
        column: u32,
    },

    #[error("{file}:{line}:{column} <{component}> requires prop `{prop}` but the caller did not pass it")]
    MissingProp {
        file: String,
        component: String,
        prop: String,
        line: u32,
        column: u32,
    },

    /// Script or expression text the parser rejected.
    #[error("{file}: failed to parse {what}: {message}")]
    Syntax {
        file: String,
        what: String,
        message: String,
    },

    #[error("malformed input: {0}")]
    Malformed(String),

    #[error("{path}: {message}")]
    Io { path: String, message: String },

    #[error("bridge failure: {0}")]
    Bridge(String),
}

impl ResolveError {
    pub fn syntax(file: &str, what: impl Into<String>, message: impl Into<String>) -> Self {
        ResolveError::Syntax {
            file: file.to_string(),
            what: what.into(),
            message: message.into(),
        }
    }

    /// Invariant code when this is a catalogued violation.
    pub fn code(&self) -> Option<&str> {
        match self {
            ResolveError::Invariant(e) => Some(e.code.as_str()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ResolveError {
    fn from(err: serde_json::Error) -> Self {
        ResolveError::Malformed(err.to_string())
    }
}

#[cfg(feature = "napi")]
impl From<ResolveError> for napi::Error {
    fn from(err: ResolveError) -> Self {
        napi::Error::from_reason(err.to_string())
    }
}

pub type Result<T, E = ResolveError> = std::result::Result<T, E>;
