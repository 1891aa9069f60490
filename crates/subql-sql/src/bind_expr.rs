//! Expression binding: AST expressions to typed IR expressions

use subql_ir::{
    parse_date, parse_timestamp, AggregateExpr, CaseBranch, DataType, Expr, Value,
    MAX_DECIMAL_PRECISION,
};
use subql_registry::FunctionRegistry;

use crate::ast::{self, BinOp, Literal, TypeName, UnOp};
use crate::binder::BindError;
use crate::scope::Scope;

/// Group keys and aggregate calls collected while binding an aggregate query.
#[derive(Debug, Default)]
pub(crate) struct AggregateState {
    pub groups: Vec<Expr>,
    pub aggregates: Vec<AggregateExpr>,
}

impl AggregateState {
    fn group_column(&self, expr: &Expr) -> Option<Expr> {
        self.groups
            .iter()
            .position(|g| g == expr)
            .map(|i| Expr::column(i, expr.data_type()))
    }

    fn add_aggregate(&mut self, aggregate: AggregateExpr) -> Expr {
        let return_type = aggregate.return_type;
        let index = match self.aggregates.iter().position(|a| *a == aggregate) {
            Some(index) => index,
            None => {
                self.aggregates.push(aggregate);
                self.aggregates.len() - 1
            }
        };
        Expr::column(self.groups.len() + index, return_type)
    }
}

pub(crate) struct ExprBinder<'a> {
    scope: &'a Scope,
    registry: &'static FunctionRegistry,
    aggregate: Option<&'a mut AggregateState>,
}

impl<'a> ExprBinder<'a> {
    pub fn new(scope: &'a Scope, registry: &'static FunctionRegistry) -> Self {
        Self {
            scope,
            registry,
            aggregate: None,
        }
    }

    /// Binder for the select list and HAVING of an aggregate query. Bound
    /// expressions reference the Aggregate output: group keys then aggregates.
    pub fn with_aggregates(
        scope: &'a Scope,
        registry: &'static FunctionRegistry,
        state: &'a mut AggregateState,
    ) -> Self {
        Self {
            scope,
            registry,
            aggregate: Some(state),
        }
    }

    fn plain(&self) -> ExprBinder<'a> {
        ExprBinder::new(self.scope, self.registry)
    }

    pub fn bind(&mut self, expr: &ast::Expr) -> Result<Expr, BindError> {
        if self.aggregate.is_some() {
            let registry = self.registry;
            if let ast::Expr::FuncCall(call) = expr {
                if registry.is_aggregate(&call.name) {
                    return self.bind_aggregate_call(call);
                }
            }
            if !expr.contains_call(&|name: &str| registry.is_aggregate(name)) {
                let bound = self.plain().bind(expr)?;
                if let Some(column) = self.aggregate.as_deref().and_then(|s| s.group_column(&bound)) {
                    return Ok(column);
                }
                if bound.is_constant() {
                    return Ok(bound);
                }
            }
        }
        self.bind_inner(expr)
    }

    /// Bind an expression that must produce a boolean.
    pub fn bind_predicate(&mut self, expr: &ast::Expr) -> Result<Expr, BindError> {
        let bound = self.bind(expr)?;
        require_boolean(bound)
    }

    /// Reference a scope column by position, as expanded from `*`.
    pub fn bind_column_index(&mut self, index: usize) -> Result<Expr, BindError> {
        let column = self
            .scope
            .columns
            .get(index)
            .ok_or_else(|| BindError::ColumnNotFound(format!("#{}", index)))?;
        let expr = Expr::column(index, column.data_type);
        match self.aggregate.as_deref() {
            None => Ok(expr),
            Some(state) => state.group_column(&expr).ok_or_else(|| not_grouped(&column.name)),
        }
    }

    fn bind_inner(&mut self, expr: &ast::Expr) -> Result<Expr, BindError> {
        match expr {
            ast::Expr::Nested(inner) => self.bind(inner),
            ast::Expr::Literal(literal) => bind_literal(literal),
            ast::Expr::Column(col) => {
                if self.aggregate.is_some() {
                    return Err(not_grouped(&col.column));
                }
                let (index, data_type) = self.scope.resolve(col.table.as_deref(), &col.column)?;
                Ok(Expr::column(index, data_type))
            }
            ast::Expr::UnaryOp { op: UnOp::Neg, expr } => match expr.as_ref() {
                ast::Expr::Literal(Literal::Number(text)) => bind_number(&format!("-{}", text)),
                other => {
                    let operand = self.bind(other)?;
                    self.call("negate", vec![operand])
                }
            },
            ast::Expr::UnaryOp { op: UnOp::Not, expr } => {
                let operand = self.bind(expr)?;
                self.call("not", vec![operand])
            }
            ast::Expr::BinaryOp { op, left, right } => self.bind_binary(*op, left, right),
            ast::Expr::FuncCall(call) => self.bind_scalar_call(call),
            ast::Expr::Case {
                operand,
                branches,
                else_result,
            } => self.bind_case(operand.as_deref(), branches, else_result.as_deref()),
            ast::Expr::Cast { expr, type_name } => {
                let data_type = resolve_type(type_name)?;
                let operand = self.bind(expr)?;
                Ok(match operand {
                    Expr::Literal { value: Value::Null, .. } => Expr::null(data_type),
                    other => Expr::cast(other, data_type),
                })
            }
            ast::Expr::IsNull { expr, negated } => {
                let operand = self.bind(expr)?;
                let name = if *negated { "is_not_null" } else { "is_null" };
                self.call(name, vec![operand])
            }
            ast::Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let args = vec![self.bind(expr)?, self.bind(low)?, self.bind(high)?];
                let args = coerce_all(args)?;
                let between = self.call("between", args)?;
                self.negate_if(between, *negated)
            }
            ast::Expr::InList { expr, list, negated } => {
                let mut args = vec![self.bind(expr)?];
                for item in list {
                    args.push(self.bind(item)?);
                }
                let mut args = coerce_all(args)?;
                let operand = args.remove(0);
                let in_list = Expr::InList {
                    expr: Box::new(operand),
                    list: args,
                };
                self.negate_if(in_list, *negated)
            }
            ast::Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                let args = vec![self.bind(expr)?, self.bind(pattern)?];
                let like = self.call("like", args)?;
                self.negate_if(like, *negated)
            }
        }
    }

    fn bind_binary(&mut self, op: BinOp, left: &ast::Expr, right: &ast::Expr) -> Result<Expr, BindError> {
        let left = self.bind(left)?;
        let right = self.bind(right)?;

        match op {
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let (left, right) = coerce_pair(left, right)?;
                self.call(function_name(op), vec![left, right])
            }
            BinOp::Concat => self.call(
                "concat",
                vec![coerce(left, DataType::Varchar), coerce(right, DataType::Varchar)],
            ),
            _ => self.call(function_name(op), vec![left, right]),
        }
    }

    fn bind_scalar_call(&mut self, call: &ast::FuncCall) -> Result<Expr, BindError> {
        let name = call.name.to_lowercase();
        if self.registry.is_aggregate(&name) {
            return Err(BindError::Aggregate(format!(
                "aggregate function {} is not allowed here",
                name
            )));
        }
        if call.star || call.distinct {
            return Err(BindError::Unsupported(format!(
                "{} is not an aggregate function",
                name
            )));
        }

        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            args.push(self.bind(arg)?);
        }
        if name == "coalesce" {
            args = coerce_all(args)?;
        }
        self.call(&name, args)
    }

    fn bind_aggregate_call(&mut self, call: &ast::FuncCall) -> Result<Expr, BindError> {
        let name = match (call.name.to_lowercase(), call.star) {
            (name, true) if name == "count" => "count_star".to_string(),
            (name, true) => {
                return Err(BindError::Unsupported(format!("{}(*) is not supported", name)));
            }
            (name, false) => name,
        };

        let mut plain = self.plain();
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            args.push(resolve_null(plain.bind(arg)?));
        }
        let arg_types: Vec<DataType> = args.iter().map(Expr::data_type).collect();
        let return_type = self.registry.resolve(&name, &arg_types)?;

        let aggregate = AggregateExpr {
            function: name,
            args,
            distinct: call.distinct,
            return_type,
        };
        let state = self
            .aggregate
            .as_deref_mut()
            .ok_or_else(|| BindError::Aggregate("aggregate outside of an aggregate query".to_string()))?;
        Ok(state.add_aggregate(aggregate))
    }

    fn bind_case(
        &mut self,
        operand: Option<&ast::Expr>,
        branches: &[(ast::Expr, ast::Expr)],
        else_result: Option<&ast::Expr>,
    ) -> Result<Expr, BindError> {
        let operand = operand.map(|o| self.bind(o)).transpose()?;

        let mut conditions = Vec::with_capacity(branches.len());
        let mut results = Vec::with_capacity(branches.len());
        for (condition, result) in branches {
            let condition = match &operand {
                Some(operand) => {
                    let value = self.bind(condition)?;
                    let (left, right) = coerce_pair(operand.clone(), value)?;
                    self.call("equal", vec![left, right])?
                }
                None => self.bind_predicate(condition)?,
            };
            conditions.push(condition);
            results.push(self.bind(result)?);
        }
        let else_result = else_result.map(|e| self.bind(e)).transpose()?;

        let return_type = results
            .iter()
            .chain(else_result.iter())
            .try_fold(DataType::Null, |acc, e| {
                acc.common_supertype(&e.data_type()).ok_or_else(|| {
                    BindError::TypeMismatch(format!(
                        "CASE results of type {} and {} are incompatible",
                        acc,
                        e.data_type()
                    ))
                })
            })?;
        let return_type = if return_type == DataType::Null {
            DataType::Int32
        } else {
            return_type
        };

        let branches = conditions
            .into_iter()
            .zip(results)
            .map(|(condition, result)| CaseBranch {
                condition,
                result: coerce(result, return_type),
            })
            .collect();
        let else_result = coerce(else_result.unwrap_or(Expr::null(return_type)), return_type);

        Ok(Expr::Case {
            branches,
            else_result: Box::new(else_result),
            return_type,
        })
    }

    fn negate_if(&self, expr: Expr, negated: bool) -> Result<Expr, BindError> {
        if negated {
            self.call("not", vec![expr])
        } else {
            Ok(expr)
        }
    }

    /// Build a scalar function call, typing untyped NULL arguments first.
    fn call(&self, name: &str, args: Vec<Expr>) -> Result<Expr, BindError> {
        let fallback = args
            .iter()
            .map(Expr::data_type)
            .find(|t| *t != DataType::Null)
            .unwrap_or(match name {
                "and" | "or" | "not" => DataType::Boolean,
                "concat" | "like" | "lower" | "upper" | "length" | "substr" => DataType::Varchar,
                _ => DataType::Int32,
            });
        let args: Vec<Expr> = args
            .into_iter()
            .map(|arg| match arg {
                Expr::Literal { value: Value::Null, data_type: DataType::Null } => Expr::null(fallback),
                other => other,
            })
            .collect();

        let arg_types: Vec<DataType> = args.iter().map(Expr::data_type).collect();
        let return_type = self.registry.resolve(name, &arg_types)?;
        Ok(Expr::function(name, args, return_type))
    }
}

fn function_name(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "add",
        BinOp::Sub => "subtract",
        BinOp::Mul => "multiply",
        BinOp::Div => "divide",
        BinOp::Mod => "mod",
        BinOp::Eq => "equal",
        BinOp::Ne => "not_equal",
        BinOp::Lt => "lt",
        BinOp::Le => "lte",
        BinOp::Gt => "gt",
        BinOp::Ge => "gte",
        BinOp::And => "and",
        BinOp::Or => "or",
        BinOp::Concat => "concat",
    }
}

fn not_grouped(column: &str) -> BindError {
    BindError::Aggregate(format!(
        "column \"{}\" must appear in the GROUP BY clause or be used in an aggregate function",
        column
    ))
}

fn require_boolean(expr: Expr) -> Result<Expr, BindError> {
    match expr.data_type() {
        DataType::Boolean => Ok(expr),
        DataType::Null => Ok(coerce(expr, DataType::Boolean)),
        other => Err(BindError::TypeMismatch(format!(
            "expected a BOOLEAN condition, found {}",
            other
        ))),
    }
}

fn is_string_literal(expr: &Expr) -> bool {
    matches!(expr, Expr::Literal { data_type: DataType::Varchar, .. })
}

/// Convert `expr` to `data_type`; untyped NULLs become typed NULL literals.
pub(crate) fn coerce(expr: Expr, data_type: DataType) -> Expr {
    if data_type == DataType::Null {
        return expr;
    }
    match expr {
        Expr::Literal { value: Value::Null, .. } => Expr::null(data_type),
        other => other.cast_to(data_type),
    }
}

/// Give an untyped NULL expression a concrete type.
pub(crate) fn resolve_null(expr: Expr) -> Expr {
    if expr.data_type() == DataType::Null {
        coerce(expr, DataType::Int32)
    } else {
        expr
    }
}

/// Bring two comparison operands to a common type. A string literal
/// compared against a typed value is read as that type.
fn coerce_pair(left: Expr, right: Expr) -> Result<(Expr, Expr), BindError> {
    let (lt, rt) = (left.data_type(), right.data_type());
    if lt == rt {
        return Ok((left, right));
    }
    if is_string_literal(&right) && lt != DataType::Null {
        return Ok((left, Expr::cast(right, lt)));
    }
    if is_string_literal(&left) && rt != DataType::Null {
        return Ok((Expr::cast(left, rt), right));
    }
    let target = lt
        .common_supertype(&rt)
        .ok_or_else(|| BindError::TypeMismatch(format!("cannot compare {} with {}", lt, rt)))?;
    Ok((coerce(left, target), coerce(right, target)))
}

/// Coerce every expression to the common supertype of all of them.
pub(crate) fn coerce_all(exprs: Vec<Expr>) -> Result<Vec<Expr>, BindError> {
    let target = common_type(exprs.iter().map(Expr::data_type))?;
    Ok(exprs.into_iter().map(|e| coerce(e, target)).collect())
}

pub(crate) fn common_type(types: impl IntoIterator<Item = DataType>) -> Result<DataType, BindError> {
    types.into_iter().try_fold(DataType::Null, |acc, t| {
        acc.common_supertype(&t)
            .ok_or_else(|| BindError::TypeMismatch(format!("no common type for {} and {}", acc, t)))
    })
}

fn bind_literal(literal: &Literal) -> Result<Expr, BindError> {
    match literal {
        Literal::Null => Ok(Expr::null(DataType::Null)),
        Literal::Bool(b) => Ok(Expr::literal(Value::Boolean(*b))),
        Literal::Number(text) => bind_number(text),
        Literal::String(s) => Ok(Expr::literal(Value::Varchar(s.clone()))),
        Literal::Date(text) => parse_date(text)
            .map(|days| Expr::literal(Value::Date(days)))
            .ok_or_else(|| BindError::InvalidLiteral(format!("DATE '{}'", text))),
        Literal::Timestamp(text) => parse_timestamp(text)
            .map(|micros| Expr::literal(Value::Timestamp(micros)))
            .ok_or_else(|| BindError::InvalidLiteral(format!("TIMESTAMP '{}'", text))),
    }
}

/// Type a numeric literal: INTEGER, then BIGINT, then DECIMAL, with
/// exponent forms and oversized decimals falling back to DOUBLE.
pub(crate) fn bind_number(text: &str) -> Result<Expr, BindError> {
    let invalid = || BindError::InvalidLiteral(text.to_string());
    let as_double = || -> Result<Expr, BindError> {
        text.parse::<f64>()
            .map(|v| Expr::literal(Value::Float64(v)))
            .map_err(|_| invalid())
    };

    if text.contains(['e', 'E']) {
        return as_double();
    }

    let negative = text.starts_with('-');
    let unsigned = text.trim_start_matches('-');
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let int_digits = int_part.trim_start_matches('0');

    if !unsigned.contains('.') {
        if let Ok(v) = text.parse::<i32>() {
            return Ok(Expr::literal(Value::Int32(v)));
        }
        if let Ok(v) = text.parse::<i64>() {
            return Ok(Expr::literal(Value::Int64(v)));
        }
    }

    let scale = frac_part.len();
    let precision = (int_digits.len() + scale).max(1);
    if precision > MAX_DECIMAL_PRECISION as usize {
        return as_double();
    }
    let digits = format!("{}{}", int_part, frac_part);
    let magnitude: i128 = if digits.is_empty() {
        0
    } else {
        digits.parse().map_err(|_| invalid())?
    };
    let value = if negative { -magnitude } else { magnitude };

    Ok(Expr::typed_literal(
        Value::Decimal {
            value,
            scale: scale as u8,
        },
        DataType::Decimal {
            precision: precision as u8,
            scale: scale as u8,
        },
    ))
}

/// Map a SQL type name to a data type.
pub(crate) fn resolve_type(type_name: &TypeName) -> Result<DataType, BindError> {
    let data_type = match type_name.name.as_str() {
        "boolean" | "bool" => DataType::Boolean,
        "tinyint" | "int1" => DataType::Int8,
        "smallint" | "int2" => DataType::Int16,
        "integer" | "int" | "int4" => DataType::Int32,
        "bigint" | "int8" | "long" => DataType::Int64,
        "real" | "float" | "float4" => DataType::Float32,
        "double" | "float8" => DataType::Float64,
        "decimal" | "numeric" => {
            let (precision, scale) = match type_name.params.as_slice() {
                [] => (18, 3),
                [p] => (*p, 0),
                [p, s, ..] => (*p, *s),
            };
            if precision == 0 || precision > MAX_DECIMAL_PRECISION as u32 || scale > precision {
                return Err(BindError::UnknownType(format!(
                    "DECIMAL({},{})",
                    precision, scale
                )));
            }
            DataType::Decimal {
                precision: precision as u8,
                scale: scale as u8,
            }
        }
        "varchar" | "text" | "string" | "char" | "bpchar" => DataType::Varchar,
        "blob" | "bytea" | "binary" | "varbinary" => DataType::Blob,
        "date" => DataType::Date,
        "timestamp" | "datetime" => DataType::Timestamp,
        other => return Err(BindError::UnknownType(other.to_string())),
    };
    Ok(data_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_one;
    use crate::ast::{Query, QueryBody, SelectItem, Statement};
    use subql_ir::Field;

    fn select_expr(sql: &str) -> ast::Expr {
        let Statement::Query(Query { body: QueryBody::Select(select), .. }) =
            parse_one(&format!("SELECT {}", sql)).unwrap()
        else {
            panic!("expected select");
        };
        match &select.items[0] {
            SelectItem::Expr(e) | SelectItem::Aliased { expr: e, .. } => e.clone(),
            other => panic!("unexpected item {:?}", other),
        }
    }

    fn employees() -> Scope {
        Scope::from_fields(
            Some("employees"),
            &[
                Field::new("name", DataType::Varchar, true),
                Field::new("salary", DataType::Decimal { precision: 10, scale: 2 }, true),
                Field::new("department_id", DataType::Int32, true),
            ],
        )
    }

    fn bind(sql: &str) -> Result<Expr, BindError> {
        let scope = employees();
        ExprBinder::new(&scope, FunctionRegistry::builtin()).bind(&select_expr(sql))
    }

    #[test]
    fn test_number_literal_types() {
        assert_eq!(bind_number("42").unwrap().data_type(), DataType::Int32);
        assert_eq!(bind_number("3000000000").unwrap().data_type(), DataType::Int64);
        assert_eq!(
            bind_number("85000.50").unwrap().data_type(),
            DataType::Decimal { precision: 7, scale: 2 }
        );
        assert_eq!(bind_number("1e3").unwrap().data_type(), DataType::Float64);
        assert_eq!(
            bind_number("-0.5").unwrap(),
            Expr::typed_literal(
                Value::Decimal { value: -5, scale: 1 },
                DataType::Decimal { precision: 1, scale: 1 }
            )
        );
    }

    #[test]
    fn test_comparison_coerces_to_supertype() {
        let expr = bind("salary > 100000").unwrap();
        let Expr::Function { name, args, return_type } = expr else {
            panic!("expected function");
        };
        assert_eq!(name, "gt");
        assert_eq!(return_type, DataType::Boolean);
        assert_eq!(args[0].data_type(), args[1].data_type());
    }

    #[test]
    fn test_multiply_decimal_by_integer() {
        let expr = bind("salary * 2000").unwrap();
        assert_eq!(expr.data_type(), DataType::Decimal { precision: 20, scale: 2 });
    }

    #[test]
    fn test_case_result_type_and_else() {
        let expr = bind("CASE WHEN salary > 100000 THEN 'HIGH' END").unwrap();
        let Expr::Case { branches, else_result, return_type } = expr else {
            panic!("expected case");
        };
        assert_eq!(return_type, DataType::Varchar);
        assert_eq!(branches.len(), 1);
        assert_eq!(*else_result, Expr::null(DataType::Varchar));
    }

    #[test]
    fn test_unknown_column_and_function() {
        assert!(matches!(bind("bonus + 1"), Err(BindError::ColumnNotFound(_))));
        assert!(matches!(bind("frobnicate(salary)"), Err(BindError::Function(_))));
        assert!(matches!(bind("sum(salary)"), Err(BindError::Aggregate(_))));
    }

    #[test]
    fn test_aggregate_binding_references_groups() {
        let scope = employees();
        let mut state = AggregateState::default();
        state.groups.push(Expr::column(2, DataType::Int32));

        let mut binder = ExprBinder::with_aggregates(&scope, FunctionRegistry::builtin(), &mut state);
        let key = binder.bind(&select_expr("department_id")).unwrap();
        let total = binder.bind(&select_expr("sum(salary)")).unwrap();
        let count = binder.bind(&select_expr("count(*)")).unwrap();
        let err = binder.bind(&select_expr("name")).unwrap_err();

        assert_eq!(key, Expr::column(0, DataType::Int32));
        assert_eq!(total, Expr::column(1, DataType::Decimal { precision: 38, scale: 2 }));
        assert_eq!(count, Expr::column(2, DataType::Int64));
        assert!(matches!(err, BindError::Aggregate(_)));
        assert_eq!(state.aggregates[1].function, "count_star");
    }
}
