//! Error taxonomy shared by the plan producer and consumer

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SubstraitError {
    /// An operator, expression or option with no mapping in the target.
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// The plan handed to the producer is not fully bound.
    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    /// A table or column named by the plan is absent from the catalog.
    #[error("Catalog Error: {0}")]
    UnresolvedCatalogReference(String),

    /// A declared type or arity differs from the one re-derived on consumption.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Undecodable input or a structurally invalid plan.
    #[error("Malformed plan: {0}")]
    MalformedPlan(String),
}

impl SubstraitError {
    /// Stable label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SubstraitError::UnsupportedOperator(_) => "unsupported_operator",
            SubstraitError::UnresolvedReference(_) => "unresolved_reference",
            SubstraitError::UnresolvedCatalogReference(_) => "unresolved_catalog_reference",
            SubstraitError::SchemaMismatch(_) => "schema_mismatch",
            SubstraitError::MalformedPlan(_) => "malformed_plan",
        }
    }
}

pub type Result<T> = std::result::Result<T, SubstraitError>;
