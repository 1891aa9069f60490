//! AST types for the SQL dialect
//!
//! Minimal representation closely following the pest grammar.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Query(Query),
    CreateTable {
        name: String,
        columns: Vec<ColumnSpec>,
        if_not_exists: bool,
    },
    CreateTableAs {
        name: String,
        query: Query,
    },
    Insert {
        table: String,
        columns: Option<Vec<String>>,
        source: Query,
    },
    Delete {
        table: String,
        selection: Option<Expr>,
    },
    DropTable {
        name: String,
        if_exists: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub type_name: TypeName,
    pub not_null: bool,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeName {
    pub name: String,
    pub params: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub body: QueryBody,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryBody {
    Select(Box<Select>),
    Values(Vec<Vec<Expr>>),
    Nested(Box<Query>),
    SetOperation {
        op: SetOperator,
        all: bool,
        left: Box<QueryBody>,
        right: Box<QueryBody>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetOperator {
    Union,
    Intersect,
    Except,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Select {
    pub distinct: bool,
    pub items: Vec<SelectItem>,
    pub from: Vec<TableRef>,
    pub selection: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectItem {
    Wildcard,
    QualifiedWildcard(String),
    Expr(Expr),
    Aliased { expr: Expr, alias: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRef {
    pub factor: TableFactor,
    pub joins: Vec<Join>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TableFactor {
    Table { name: String, alias: Option<TableAlias> },
    Derived { subquery: Box<Query>, alias: Option<TableAlias> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableAlias {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub join_type: JoinType,
    pub factor: TableFactor,
    pub on: Option<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub expr: Expr,
    pub desc: bool,
    pub nulls_first: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal),
    Column(ColumnRef),
    BinaryOp { op: BinOp, left: Box<Expr>, right: Box<Expr> },
    UnaryOp { op: UnOp, expr: Box<Expr> },
    FuncCall(FuncCall),
    Case {
        operand: Option<Box<Expr>>,
        branches: Vec<(Expr, Expr)>,
        else_result: Option<Box<Expr>>,
    },
    Cast { expr: Box<Expr>, type_name: TypeName },
    IsNull { expr: Box<Expr>, negated: bool },
    Between { expr: Box<Expr>, low: Box<Expr>, high: Box<Expr>, negated: bool },
    InList { expr: Box<Expr>, list: Vec<Expr>, negated: bool },
    Like { expr: Box<Expr>, pattern: Box<Expr>, negated: bool },
    Nested(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncCall {
    pub name: String,
    pub args: Vec<Expr>,
    pub distinct: bool,
    /// `count(*)`
    pub star: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    /// Numeric text as written, typed by the binder
    Number(String),
    String(String),
    Date(String),
    Timestamp(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add, Sub, Mul, Div, Mod,
    Eq, Ne, Lt, Le, Gt, Ge,
    And, Or,
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "=",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "AND",
            BinOp::Or => "OR",
            BinOp::Concat => "||",
        }
    }
}

impl Expr {
    /// True if the expression contains a call for which `is_aggregate` holds.
    pub fn contains_call(&self, is_aggregate: &dyn Fn(&str) -> bool) -> bool {
        match self {
            Expr::Literal(_) | Expr::Column(_) => false,
            Expr::FuncCall(call) => {
                is_aggregate(&call.name) || call.args.iter().any(|a| a.contains_call(is_aggregate))
            }
            Expr::BinaryOp { left, right, .. } => {
                left.contains_call(is_aggregate) || right.contains_call(is_aggregate)
            }
            Expr::UnaryOp { expr, .. }
            | Expr::Cast { expr, .. }
            | Expr::IsNull { expr, .. }
            | Expr::Nested(expr) => expr.contains_call(is_aggregate),
            Expr::Case { operand, branches, else_result } => {
                operand.as_ref().map_or(false, |o| o.contains_call(is_aggregate))
                    || branches
                        .iter()
                        .any(|(c, r)| c.contains_call(is_aggregate) || r.contains_call(is_aggregate))
                    || else_result.as_ref().map_or(false, |e| e.contains_call(is_aggregate))
            }
            Expr::Between { expr, low, high, .. } => {
                expr.contains_call(is_aggregate)
                    || low.contains_call(is_aggregate)
                    || high.contains_call(is_aggregate)
            }
            Expr::InList { expr, list, .. } => {
                expr.contains_call(is_aggregate) || list.iter().any(|e| e.contains_call(is_aggregate))
            }
            Expr::Like { expr, pattern, .. } => {
                expr.contains_call(is_aggregate) || pattern.contains_call(is_aggregate)
            }
        }
    }
}

/// Renders expressions the way result columns are named when no alias is given.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(lit) => match lit {
                Literal::Null => write!(f, "NULL"),
                Literal::Bool(b) => write!(f, "{}", b),
                Literal::Number(n) => write!(f, "{}", n),
                Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
                Literal::Date(s) => write!(f, "DATE '{}'", s),
                Literal::Timestamp(s) => write!(f, "TIMESTAMP '{}'", s),
            },
            Expr::Column(col) => write!(f, "{}", col.column),
            Expr::BinaryOp { op, left, right } => write!(f, "({} {} {})", left, op.symbol(), right),
            Expr::UnaryOp { op: UnOp::Neg, expr } => write!(f, "-{}", expr),
            Expr::UnaryOp { op: UnOp::Not, expr } => write!(f, "(NOT {})", expr),
            Expr::FuncCall(call) => {
                if call.star {
                    return write!(f, "count_star()");
                }
                write!(f, "{}(", call.name)?;
                if call.distinct {
                    write!(f, "DISTINCT ")?;
                }
                for (i, arg) in call.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Case { operand, branches, else_result } => {
                write!(f, "CASE")?;
                if let Some(operand) = operand {
                    write!(f, " {}", operand)?;
                }
                for (cond, result) in branches {
                    write!(f, " WHEN {} THEN {}", cond, result)?;
                }
                if let Some(e) = else_result {
                    write!(f, " ELSE {}", e)?;
                }
                write!(f, " END")
            }
            Expr::Cast { expr, type_name } => write!(f, "CAST({} AS {})", expr, type_name.name.to_uppercase()),
            Expr::IsNull { expr, negated } => {
                write!(f, "({} IS {}NULL)", expr, if *negated { "NOT " } else { "" })
            }
            Expr::Between { expr, low, high, negated } => write!(
                f,
                "({} {}BETWEEN {} AND {})",
                expr,
                if *negated { "NOT " } else { "" },
                low,
                high
            ),
            Expr::InList { expr, list, negated } => {
                write!(f, "({} {}IN (", expr, if *negated { "NOT " } else { "" })?;
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "))")
            }
            Expr::Like { expr, pattern, negated } => {
                write!(f, "({} {}LIKE {})", expr, if *negated { "NOT " } else { "" }, pattern)
            }
            Expr::Nested(inner) => write!(f, "{}", inner),
        }
    }
}
