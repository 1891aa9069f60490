//! subql logical plan IR
//!
//! Bound relational operators and scalar expressions shared by the SQL
//! binder, the Substrait producer/consumer and the executor. All types are
//! deterministically serializable so a plan can be fingerprinted.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

mod catalog;
mod expr;
mod plan;
mod types;
mod value;

pub use catalog::*;
pub use expr::*;
pub use plan::*;
pub use types::*;
pub use value::*;

/// A plan together with the user-facing names of its output columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub root: LogicalPlan,
    pub names: Vec<String>,
}

impl QueryPlan {
    pub fn new(root: LogicalPlan, names: Vec<String>) -> Self {
        Self { root, names }
    }

    /// Output schema with the root names applied.
    pub fn schema(&self) -> Schema {
        let mut schema = self.root.schema();
        for (field, name) in schema.fields.iter_mut().zip(&self.names) {
            field.name = name.clone();
        }
        schema
    }

    /// Calculate fingerprint (SHA-256) of the canonical JSON form
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
