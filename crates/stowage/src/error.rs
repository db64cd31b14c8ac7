use stowage_core::ReactiveError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Reactive(#[from] ReactiveError),

    #[error("field `{key}`: {source}")]
    Field {
        key: String,
        #[source]
        source: ReactiveError,
    },

    #[error("unknown action: {name}")]
    UnknownAction { name: String },

    #[error("unknown field: {key}")]
    UnknownField { key: String },

    #[error("derived property `{key}` collides with a declared state field")]
    DerivedShadowsState { key: String },

    #[error("`{key}` is a reserved store field")]
    ReservedField { key: String },

    #[error("`{key}` holds a nested store and cannot be overwritten")]
    NestedStore { key: String },

    #[error("{message}")]
    Action { message: String },
}

impl StoreError {
    /// Ad-hoc failure raised from an action handler.
    #[must_use]
    pub fn action(message: impl Into<String>) -> Self {
        Self::Action {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn unknown_field(key: impl Into<String>) -> Self {
        Self::UnknownField { key: key.into() }
    }
}
