use thiserror::Error;

use crate::Value;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("type mismatch: expected {expected}, got {got:?}")]
    TypeMismatch { expected: &'static str, got: Value },

    #[error("expired resource: {value:?}")]
    ExpiredResource { value: Value },

    #[error("stack underflow: needed {needed} values, depth is {depth}")]
    StackUnderflow { needed: usize, depth: usize },

    #[error("stack overflow: limit is {limit}")]
    StackOverflow { limit: usize },

    #[error("unknown primitive `{name}`")]
    UnknownPrimitive { name: String },
}

impl RuntimeError {
    pub fn type_mismatch(expected: &'static str, got: Value) -> Self {
        RuntimeError::TypeMismatch { expected, got }
    }
}
