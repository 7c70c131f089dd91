use thiserror::Error;

/// Error taxonomy for the loan servicing core.
///
/// `Validation` covers malformed or missing input and is raised by the pure
/// layers (schedule generation, ledger math, value objects). `Conflict` and
/// `Forbidden` are only ever raised by the confirmation workflow, which owns
/// all state-machine and role preconditions. Downstream notification failures
/// are never errors; they surface as warnings on an otherwise successful
/// outcome.
#[derive(Error, Debug)]
pub enum LendingError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LendingError>;
