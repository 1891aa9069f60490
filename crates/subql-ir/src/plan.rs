//! Logical plan operators

use crate::expr::{AggregateExpr, Expr, SortKey};
use crate::types::{DataType, Field, Schema};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Semi,
    Anti,
    Cross,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetOp {
    Union,
    Intersect,
    Except,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOp {
    CreateTableAs,
    Insert,
    Delete,
}

/// Name of the single column produced by write operators.
pub const WRITE_COUNT_COLUMN: &str = "Count";

/// Relational operator tree. Every node owns its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum LogicalPlan {
    /// Read of a catalog table. `fields` are resolved by name when executed.
    Scan {
        table: String,
        fields: Vec<Field>,
    },
    Values {
        fields: Vec<Field>,
        rows: Vec<Vec<Expr>>,
    },
    Filter {
        input: Box<LogicalPlan>,
        predicate: Expr,
    },
    Project {
        input: Box<LogicalPlan>,
        exprs: Vec<Expr>,
    },
    /// Output is the group-by keys followed by the aggregates.
    Aggregate {
        input: Box<LogicalPlan>,
        group_by: Vec<Expr>,
        aggregates: Vec<AggregateExpr>,
    },
    Join {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        kind: JoinKind,
        condition: Option<Expr>,
    },
    Sort {
        input: Box<LogicalPlan>,
        keys: Vec<SortKey>,
    },
    Limit {
        input: Box<LogicalPlan>,
        offset: u64,
        fetch: Option<u64>,
    },
    SetOperation {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        op: SetOp,
        all: bool,
    },
    Write {
        op: WriteOp,
        table: String,
        fields: Vec<Field>,
        input: Box<LogicalPlan>,
    },
}

impl LogicalPlan {
    /// Output schema of this operator.
    ///
    /// Column names of computed expressions are positional; the final
    /// user-facing names live on [`crate::QueryPlan`].
    pub fn schema(&self) -> Schema {
        match self {
            LogicalPlan::Scan { fields, .. } | LogicalPlan::Values { fields, .. } => {
                Schema::new(fields.clone())
            }
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::Sort { input, .. }
            | LogicalPlan::Limit { input, .. } => input.schema(),
            LogicalPlan::Project { input, exprs } => {
                let input_schema = input.schema();
                let fields = exprs
                    .iter()
                    .enumerate()
                    .map(|(i, e)| derived_field(&input_schema, e, format!("expr{}", i)))
                    .collect();
                Schema::new(fields)
            }
            LogicalPlan::Aggregate { input, group_by, aggregates } => {
                let input_schema = input.schema();
                let mut fields: Vec<Field> = group_by
                    .iter()
                    .enumerate()
                    .map(|(i, e)| derived_field(&input_schema, e, format!("group{}", i)))
                    .collect();
                fields.extend(
                    aggregates
                        .iter()
                        .map(|a| Field::new(a.function.clone(), a.return_type, true)),
                );
                Schema::new(fields)
            }
            LogicalPlan::Join { left, right, kind, .. } => {
                let mut fields = left.schema().fields;
                if !matches!(kind, JoinKind::Semi | JoinKind::Anti) {
                    fields.extend(right.schema().fields);
                }
                Schema::new(fields)
            }
            LogicalPlan::SetOperation { left, .. } => left.schema(),
            LogicalPlan::Write { .. } => Schema::new(vec![Field::new(
                WRITE_COUNT_COLUMN,
                DataType::Int64,
                false,
            )]),
        }
    }

    pub fn children(&self) -> Vec<&LogicalPlan> {
        match self {
            LogicalPlan::Scan { .. } | LogicalPlan::Values { .. } => vec![],
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::Project { input, .. }
            | LogicalPlan::Aggregate { input, .. }
            | LogicalPlan::Sort { input, .. }
            | LogicalPlan::Limit { input, .. }
            | LogicalPlan::Write { input, .. } => vec![input],
            LogicalPlan::Join { left, right, .. } | LogicalPlan::SetOperation { left, right, .. } => {
                vec![left, right]
            }
        }
    }

    /// Short operator name for logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            LogicalPlan::Scan { .. } => "Scan",
            LogicalPlan::Values { .. } => "Values",
            LogicalPlan::Filter { .. } => "Filter",
            LogicalPlan::Project { .. } => "Project",
            LogicalPlan::Aggregate { .. } => "Aggregate",
            LogicalPlan::Join { .. } => "Join",
            LogicalPlan::Sort { .. } => "Sort",
            LogicalPlan::Limit { .. } => "Limit",
            LogicalPlan::SetOperation { .. } => "SetOperation",
            LogicalPlan::Write { .. } => "Write",
        }
    }
}

fn derived_field(input: &Schema, expr: &Expr, fallback: String) -> Field {
    match expr {
        Expr::Column { index, data_type } => {
            let source = input.fields.get(*index);
            Field::new(
                source.map(|f| f.name.clone()).unwrap_or(fallback),
                *data_type,
                source.map(|f| f.nullable).unwrap_or(true),
            )
        }
        other => Field::new(fallback, other.data_type(), true),
    }
}
