//! Error types shared across the crate.

use thiserror::Error;

use crate::value::ValueType;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad failure categories, useful when callers only care which class of
/// problem occurred rather than the exact variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid configuration detected before any state was mutated.
    Configuration,
    /// An operation was invoked outside its valid lifecycle state.
    State,
    /// A live model call (step/get/set/reset) failed mid-run.
    Runtime,
    /// A recorder or other file-based collaborator failed.
    Io,
}

/// Errors produced by the co-simulation core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("a model instance named '{0}' has already been added")]
    DuplicateInstance(String),

    #[error("unable to resolve model uri '{0}'")]
    UnresolvedModel(String),

    #[error("connection endpoint '{0}' references an undeclared instance")]
    UndeclaredInstance(String),

    #[error("sink '{0}' is already driven by another connection")]
    DuplicateSink(String),

    #[error("no variable named '{0}'")]
    UnknownVariable(String),

    #[error("variable '{identifier}' is of type {actual}, not {expected}")]
    TypeMismatch {
        identifier: String,
        expected: ValueType,
        actual: ValueType,
    },

    #[error("no parameter set named '{0}'")]
    UnknownParameterSet(String),

    #[error("a listener named '{0}' is already registered")]
    DuplicateListener(String),

    #[error("step size must be positive and finite, was {0}")]
    InvalidStepSize(f64),

    #[error("start time must be non-negative and finite, was {0}")]
    InvalidStartTime(f64),

    #[error("scenario action time must be non-negative and finite, was {0}")]
    InvalidActionTime(f64),

    #[error("decimation factor must be >= 1")]
    InvalidDecimationFactor,

    #[error("malformed identifier '{0}': a '::' separator must be present")]
    MalformedIdentifier(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("model instance '{instance}' failed during {operation}: {message}")]
    ModelFailure {
        instance: String,
        operation: &'static str,
        message: String,
    },

    #[error("model instance '{0}' does not support reset")]
    ResetUnsupported(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Maps this error onto its broad category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DuplicateInstance(_)
            | Error::UnresolvedModel(_)
            | Error::UndeclaredInstance(_)
            | Error::DuplicateSink(_)
            | Error::UnknownVariable(_)
            | Error::TypeMismatch { .. }
            | Error::UnknownParameterSet(_)
            | Error::DuplicateListener(_)
            | Error::InvalidStepSize(_)
            | Error::InvalidStartTime(_)
            | Error::InvalidActionTime(_)
            | Error::InvalidDecimationFactor
            | Error::MalformedIdentifier(_)
            | Error::InvalidConfig(_) => ErrorKind::Configuration,
            Error::InvalidState { .. } => ErrorKind::State,
            Error::ModelFailure { .. } | Error::ResetUnsupported(_) => ErrorKind::Runtime,
            Error::Io(_) => ErrorKind::Io,
        }
    }
}
