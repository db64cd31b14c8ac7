use thiserror::Error;

/// Errors raised by observable objects and value conversions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    #[error("field `{key}` is computed and cannot be written")]
    ReadOnly { key: String },

    #[error("computed field `{key}` would shadow a stored field")]
    Shadowed { key: String },

    #[error("an observable cannot be stored inside itself (field `{key}`)")]
    SelfReference { key: String },

    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

impl ReactiveError {
    #[must_use]
    pub fn mismatch(expected: &'static str, found: &'static str) -> Self {
        Self::TypeMismatch { expected, found }
    }
}
