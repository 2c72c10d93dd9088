//! Error types for the adapter layer.

use knn_engine::{DataLayout, EngineError};
use thiserror::Error;

/// Space grammar and registry failures.
#[derive(Debug, Error)]
pub enum SpaceError {
    #[error("Expected a maximum of 1 colon in space name, got '{0}'")]
    TooManyColons(String),

    #[error("Expected parameterized space to have format name:param=value, got '{0}'")]
    MalformedParameter(String),

    #[error("Could not parse '{value}' in space '{raw}' as a finite number")]
    InvalidValue { raw: String, value: String },

    #[error(
        "'{base}' is not a parameterized space; parameterized spaces are: {}",
        valid.join(", ")
    )]
    NotParameterized { base: String, valid: Vec<&'static str> },

    #[error("Expected parameter '{expected}' with space '{base}', got '{got}'")]
    WrongParameter {
        base: String,
        expected: &'static str,
        got: String,
    },

    #[error("Space '{base}' requires parameter '{expected}', e.g. '{base}:{expected}=2'")]
    MissingParameter { base: String, expected: &'static str },

    #[error("'{name}' is not a valid space. Choose from: {}", valid.join(", "))]
    UnknownSpace { name: String, valid: Vec<&'static str> },

    #[error("'{space}' is not a valid space for {layout} data. Choose from: {}", valid.join(", "))]
    InvalidForLayout {
        space: String,
        layout: DataLayout,
        valid: Vec<&'static str>,
    },
}

/// Errors surfaced by [`IndexAdapter`](crate::IndexAdapter).
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Configuration(#[from] SpaceError),

    #[error("Unknown method '{name}', expected one of: {}", valid.join(", "))]
    UnknownMethod { name: String, valid: Vec<&'static str> },

    #[error("'{key}' is not a query parameter of {method}; accepted: [{}]", accepted.join(", "))]
    InvalidParameter {
        method: &'static str,
        key: String,
        accepted: Vec<&'static str>,
    },

    #[error("Query data does not match the fitted {layout} index: {source}")]
    IncompatibleState {
        layout: DataLayout,
        #[source]
        source: SpaceError,
    },

    #[error("This index is not fitted yet; call fit or pass query data")]
    NotFitted,

    #[error("No data layout is known for this index; pass one to load")]
    MissingLayout,

    #[error("{0} needs the source data, which this adapter does not hold")]
    MissingData(&'static str),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Neighbors search did not converge: query {row} returned {got} results, expected {expected}")]
    Convergence { row: usize, expected: usize, got: usize },

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

impl AdapterError {
    /// Malformed or unknown space, unknown method. Never worth retrying.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AdapterError::Configuration(_)
                | AdapterError::UnknownMethod { .. }
                | AdapterError::Engine(
                    EngineError::UnknownMethod { .. }
                        | EngineError::UnknownSpace(_)
                        | EngineError::UnsupportedSpace { .. }
                )
        )
    }
}

pub type Result<T> = std::result::Result<T, AdapterError>;
