use thiserror::Error;

use crate::value::ValueType;

/// Errors raised while turning text into values, expression trees and graphs.
/// Compilation is all-or-nothing: any of these leaves the previous graph in place.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("a {type_name} value cannot be constructed from {actual} parameters (expected 1 or {expected})")]
    ParameterCount {
        type_name: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("type mismatch in `{function}`: argument {argument} expected {expected}, found {found}")]
    TypeMismatch {
        function: String,
        argument: usize,
        expected: String,
        found: ValueType,
    },
    #[error("`{function}` takes {expected} arguments but {actual} were given")]
    ArgumentCount {
        function: String,
        expected: usize,
        actual: usize,
    },
    #[error("unresolved variable `{0}`")]
    UnresolvedVariable(String),
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("unknown node `{0}`")]
    UnknownNode(String),
    #[error("unknown material `{0}`")]
    UnknownMaterial(String),
    #[error("unknown option `{option}` for node `{node}`")]
    UnknownOption { node: String, option: String },
    #[error("{msg} at {line}:{col}")]
    Parse { msg: String, line: usize, col: usize },
}

impl CompileError {
    pub(crate) fn parse(msg: impl Into<String>, line: usize, col: usize) -> Self {
        Self::Parse {
            msg: msg.into(),
            line,
            col,
        }
    }
    pub(crate) fn mismatch(
        function: &str,
        argument: usize,
        expected: impl Into<String>,
        found: ValueType,
    ) -> Self {
        Self::TypeMismatch {
            function: function.to_string(),
            argument,
            expected: expected.into(),
            found,
        }
    }
}

/// Faults that abort a sample pass.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("compute resource unavailable: {0}")]
    ResourceUnavailable(String),
    #[error("no scene graph has been compiled")]
    NoGraph,
    #[error("pass has {actual} pixels but the film has {expected}")]
    PassSize { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
