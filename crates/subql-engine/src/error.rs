//! Engine errors

use subql_sql::{BindError, ParseError};
use subql_substrait::SubstraitError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ExecutionError {
    #[error("Catalog Error: Table with name {0} does not exist!")]
    TableNotFound(String),

    #[error("Catalog Error: Table with name {0} already exists!")]
    TableExists(String),

    #[error("Binder Error: Table {table} does not have a column named {column}")]
    ColumnNotFound { table: String, column: String },

    #[error("Constraint Error: {0}")]
    ConstraintViolation(String),

    #[error("Conversion Error: {0}")]
    InvalidCast(String),

    #[error("Out of Range Error: {0}")]
    Overflow(String),

    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("Query timeout after {0} ms")]
    Timeout(u64),

    #[error("Arrow error: {0}")]
    Arrow(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<arrow::error::ArrowError> for ExecutionError {
    fn from(e: arrow::error::ArrowError) -> Self {
        ExecutionError::Arrow(e.to_string())
    }
}

/// Any failure of a [`crate::Connection`] call.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Parser Error: {0}")]
    Parse(#[from] ParseError),

    #[error("Binder Error: {0}")]
    Bind(#[from] BindError),

    #[error(transparent)]
    Substrait(#[from] SubstraitError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl Error {
    /// Stable label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Parse(_) => "parse",
            Error::Bind(_) => "bind",
            Error::Substrait(e) => e.kind(),
            Error::Execution(_) => "execution",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
