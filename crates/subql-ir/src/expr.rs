//! Bound scalar expressions

use crate::types::DataType;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Bound scalar expression. Column references are positional against the
/// output schema of the operator's input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Column {
        index: usize,
        data_type: DataType,
    },
    Literal {
        value: Value,
        data_type: DataType,
    },
    Function {
        name: String,
        args: Vec<Expr>,
        return_type: DataType,
    },
    /// Branches are tried in order; the first true condition wins.
    Case {
        branches: Vec<CaseBranch>,
        else_result: Box<Expr>,
        return_type: DataType,
    },
    Cast {
        expr: Box<Expr>,
        data_type: DataType,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseBranch {
    pub condition: Expr,
    pub result: Expr,
}

impl Expr {
    pub fn column(index: usize, data_type: DataType) -> Self {
        Expr::Column { index, data_type }
    }

    /// Literal typed by the value itself.
    pub fn literal(value: Value) -> Self {
        let data_type = value.data_type();
        Expr::Literal { value, data_type }
    }

    pub fn typed_literal(value: Value, data_type: DataType) -> Self {
        Expr::Literal { value, data_type }
    }

    pub fn null(data_type: DataType) -> Self {
        Expr::Literal {
            value: Value::Null,
            data_type,
        }
    }

    pub fn function(name: impl Into<String>, args: Vec<Expr>, return_type: DataType) -> Self {
        Expr::Function {
            name: name.into(),
            args,
            return_type,
        }
    }

    pub fn cast(expr: Expr, data_type: DataType) -> Self {
        Expr::Cast {
            expr: Box::new(expr),
            data_type,
        }
    }

    /// Wrap in a cast unless the expression already has the target type.
    pub fn cast_to(self, data_type: DataType) -> Self {
        if self.data_type() == data_type {
            self
        } else {
            Expr::cast(self, data_type)
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Expr::Column { data_type, .. } => *data_type,
            Expr::Literal { data_type, .. } => *data_type,
            Expr::Function { return_type, .. } => *return_type,
            Expr::Case { return_type, .. } => *return_type,
            Expr::Cast { data_type, .. } => *data_type,
            Expr::InList { .. } => DataType::Boolean,
        }
    }

    /// True when the expression reads no input columns.
    pub fn is_constant(&self) -> bool {
        match self {
            Expr::Column { .. } => false,
            Expr::Literal { .. } => true,
            Expr::Function { args, .. } => args.iter().all(Expr::is_constant),
            Expr::Case { branches, else_result, .. } => {
                branches
                    .iter()
                    .all(|b| b.condition.is_constant() && b.result.is_constant())
                    && else_result.is_constant()
            }
            Expr::Cast { expr, .. } => expr.is_constant(),
            Expr::InList { expr, list } => expr.is_constant() && list.iter().all(Expr::is_constant),
        }
    }

    /// Shift every column reference by `offset`, used when an expression
    /// bound against the right side of a join moves into the joined schema.
    pub fn shift_columns(self, offset: usize) -> Self {
        match self {
            Expr::Column { index, data_type } => Expr::Column {
                index: index + offset,
                data_type,
            },
            Expr::Literal { .. } => self,
            Expr::Function { name, args, return_type } => Expr::Function {
                name,
                args: args.into_iter().map(|a| a.shift_columns(offset)).collect(),
                return_type,
            },
            Expr::Case { branches, else_result, return_type } => Expr::Case {
                branches: branches
                    .into_iter()
                    .map(|b| CaseBranch {
                        condition: b.condition.shift_columns(offset),
                        result: b.result.shift_columns(offset),
                    })
                    .collect(),
                else_result: Box::new(else_result.shift_columns(offset)),
                return_type,
            },
            Expr::Cast { expr, data_type } => Expr::Cast {
                expr: Box::new(expr.shift_columns(offset)),
                data_type,
            },
            Expr::InList { expr, list } => Expr::InList {
                expr: Box::new(expr.shift_columns(offset)),
                list: list.into_iter().map(|e| e.shift_columns(offset)).collect(),
            },
        }
    }
}

/// An aggregate call inside an Aggregate operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateExpr {
    pub function: String,
    pub args: Vec<Expr>,
    pub distinct: bool,
    pub return_type: DataType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub expr: Expr,
    pub ascending: bool,
    pub nulls_first: bool,
}
