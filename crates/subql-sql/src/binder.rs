//! Binder: resolves a parsed statement against a catalog into a typed plan

use subql_ir::{
    Catalog, ColumnDef, DataType, Expr, Field, JoinKind, LogicalPlan, QueryPlan, SetOp, SortKey,
    TableSchema, Value, WriteOp, WRITE_COUNT_COLUMN,
};
use subql_registry::{FunctionRegistry, RegistryError};
use thiserror::Error;
use tracing::debug;

use crate::ast::{
    self, ColumnRef, JoinType, Literal, OrderItem, Query, QueryBody, Select, SelectItem,
    SetOperator, Statement, TableAlias, TableFactor, TableRef,
};
use crate::bind_expr::{coerce, common_type, resolve_null, resolve_type, AggregateState, ExprBinder};
use crate::scope::Scope;

#[derive(Debug, Error, PartialEq)]
pub enum BindError {
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableExists(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Ambiguous column reference: {0}")]
    AmbiguousColumn(String),

    #[error("Duplicate column name: {0}")]
    DuplicateColumn(String),

    #[error("Expected {expected} columns, found {actual}")]
    ColumnCountMismatch { expected: usize, actual: usize },

    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error(transparent)]
    Function(#[from] RegistryError),

    #[error("Invalid literal: {0}")]
    InvalidLiteral(String),

    #[error("Aggregate error: {0}")]
    Aggregate(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// A statement after name resolution.
///
/// Queries and DML (CTAS, INSERT, DELETE) become plans; catalog-only DDL
/// stays a command because it has no relational form.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundStatement {
    Query(QueryPlan),
    CreateTable {
        schema: TableSchema,
        if_not_exists: bool,
    },
    DropTable {
        name: String,
        if_exists: bool,
    },
}

/// A select-list entry: a `*` expansion or an expression.
#[derive(Clone, Copy)]
enum Target<'q> {
    Column(usize),
    Expr(&'q ast::Expr),
}

pub struct Binder<'a> {
    catalog: &'a dyn Catalog,
    registry: &'static FunctionRegistry,
}

impl<'a> Binder<'a> {
    pub fn new(catalog: &'a dyn Catalog) -> Self {
        Self::with_registry(catalog, FunctionRegistry::builtin())
    }

    pub fn with_registry(catalog: &'a dyn Catalog, registry: &'static FunctionRegistry) -> Self {
        Self { catalog, registry }
    }

    pub fn bind_statement(&self, statement: &Statement) -> Result<BoundStatement, BindError> {
        let bound = match statement {
            Statement::Query(query) => BoundStatement::Query(self.bind_query(query)?),
            Statement::CreateTable {
                name,
                columns,
                if_not_exists,
            } => {
                if !if_not_exists && self.catalog.get_table_schema(name).is_some() {
                    return Err(BindError::TableExists(name.clone()));
                }
                let mut defs: Vec<ColumnDef> = Vec::with_capacity(columns.len());
                for spec in columns {
                    if defs.iter().any(|d| d.name.eq_ignore_ascii_case(&spec.name)) {
                        return Err(BindError::DuplicateColumn(spec.name.clone()));
                    }
                    defs.push(ColumnDef {
                        name: spec.name.clone(),
                        data_type: resolve_type(&spec.type_name)?,
                        nullable: !spec.not_null,
                        primary_key: spec.primary_key,
                    });
                }
                BoundStatement::CreateTable {
                    schema: TableSchema::new(name.clone(), defs),
                    if_not_exists: *if_not_exists,
                }
            }
            Statement::CreateTableAs { name, query } => {
                if self.catalog.get_table_schema(name).is_some() {
                    return Err(BindError::TableExists(name.clone()));
                }
                let plan = self.bind_query(query)?;
                let fields = plan.schema().fields;
                for (i, field) in fields.iter().enumerate() {
                    if fields[..i].iter().any(|f| f.name.eq_ignore_ascii_case(&field.name)) {
                        return Err(BindError::DuplicateColumn(field.name.clone()));
                    }
                }
                write(WriteOp::CreateTableAs, name.clone(), fields, plan.root)
            }
            Statement::Insert {
                table,
                columns,
                source,
            } => self.bind_insert(table, columns.as_deref(), source)?,
            Statement::Delete { table, selection } => {
                let schema = self.table(table)?;
                let fields = schema.fields();
                let scope = Scope::from_fields(Some(schema.name.as_str()), &fields);
                let mut input = LogicalPlan::Scan {
                    table: schema.name.clone(),
                    fields: fields.clone(),
                };
                if let Some(selection) = selection {
                    input = LogicalPlan::Filter {
                        input: Box::new(input),
                        predicate: ExprBinder::new(&scope, self.registry).bind_predicate(selection)?,
                    };
                }
                write(WriteOp::Delete, schema.name, fields, input)
            }
            Statement::DropTable { name, if_exists } => BoundStatement::DropTable {
                name: name.clone(),
                if_exists: *if_exists,
            },
        };

        debug!(statement = statement_kind(statement), "Bound statement");
        Ok(bound)
    }

    pub fn bind_query(&self, query: &Query) -> Result<QueryPlan, BindError> {
        let (plan, names) = match &query.body {
            QueryBody::Select(select) => self.bind_select(select, &query.order_by)?,
            body => {
                let (plan, names) = self.bind_body(body)?;
                self.order_output(plan, names, &query.order_by)?
            }
        };

        // Plans carry row counts as i64; a larger LIMIT keeps every row.
        let fetch = query.limit.filter(|n| i64::try_from(*n).is_ok());
        if let Some(offset) = query.offset.filter(|n| i64::try_from(*n).is_err()) {
            return Err(BindError::InvalidLiteral(format!("OFFSET {} out of range", offset)));
        }
        let plan = if fetch.is_some() || query.offset.is_some() {
            LogicalPlan::Limit {
                input: Box::new(plan),
                offset: query.offset.unwrap_or(0),
                fetch,
            }
        } else {
            plan
        };

        Ok(QueryPlan::new(plan, names))
    }

    fn table(&self, name: &str) -> Result<TableSchema, BindError> {
        self.catalog
            .get_table_schema(name)
            .ok_or_else(|| BindError::TableNotFound(name.to_string()))
    }

    fn bind_body(&self, body: &QueryBody) -> Result<(LogicalPlan, Vec<String>), BindError> {
        match body {
            QueryBody::Select(select) => self.bind_select(select, &[]),
            QueryBody::Values(rows) => self.bind_values(rows),
            QueryBody::Nested(query) => {
                let plan = self.bind_query(query)?;
                Ok((plan.root, plan.names))
            }
            QueryBody::SetOperation { op, all, left, right } => {
                let (left, names) = self.bind_body(left)?;
                let (right, _) = self.bind_body(right)?;

                let (left_types, right_types) = (left.schema().types(), right.schema().types());
                if left_types.len() != right_types.len() {
                    return Err(BindError::ColumnCountMismatch {
                        expected: left_types.len(),
                        actual: right_types.len(),
                    });
                }
                let targets = left_types
                    .iter()
                    .zip(&right_types)
                    .map(|(l, r)| common_type([*l, *r]).map(non_null))
                    .collect::<Result<Vec<_>, _>>()?;

                let op = match op {
                    SetOperator::Union => SetOp::Union,
                    SetOperator::Intersect => SetOp::Intersect,
                    SetOperator::Except => SetOp::Except,
                };
                Ok((
                    LogicalPlan::SetOperation {
                        left: Box::new(conform(left, &targets)),
                        right: Box::new(conform(right, &targets)),
                        op,
                        all: *all,
                    },
                    names,
                ))
            }
        }
    }

    fn bind_values(&self, rows: &[Vec<ast::Expr>]) -> Result<(LogicalPlan, Vec<String>), BindError> {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        let scope = Scope::empty();
        let mut binder = ExprBinder::new(&scope, self.registry);

        let mut bound_rows = Vec::with_capacity(rows.len());
        for row in rows {
            if row.len() != width {
                return Err(BindError::ColumnCountMismatch {
                    expected: width,
                    actual: row.len(),
                });
            }
            let mut bound = Vec::with_capacity(width);
            for expr in row {
                let expr = binder.bind(expr)?;
                if !expr.is_constant() {
                    return Err(BindError::Unsupported("VALUES entries must be constant".to_string()));
                }
                bound.push(expr);
            }
            bound_rows.push(bound);
        }

        let mut fields = Vec::with_capacity(width);
        for column in 0..width {
            let data_type = non_null(common_type(bound_rows.iter().map(|r| r[column].data_type()))?);
            let nullable = bound_rows
                .iter()
                .any(|r| matches!(r[column], Expr::Literal { value: Value::Null, .. }));
            fields.push(Field::new(format!("col{}", column), data_type, nullable));
        }
        let rows = bound_rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(&fields)
                    .map(|(expr, field)| coerce(expr, field.data_type))
                    .collect()
            })
            .collect();

        let names = fields.iter().map(|f| f.name.clone()).collect();
        Ok((LogicalPlan::Values { fields, rows }, names))
    }

    fn bind_select(
        &self,
        select: &Select,
        order_by: &[OrderItem],
    ) -> Result<(LogicalPlan, Vec<String>), BindError> {
        let (mut input, scope) = self.bind_from(&select.from)?;
        if let Some(selection) = &select.selection {
            input = LogicalPlan::Filter {
                input: Box::new(input),
                predicate: ExprBinder::new(&scope, self.registry).bind_predicate(selection)?,
            };
        }

        let items = expand_items(&select.items, &scope)?;
        let names: Vec<String> = items.iter().map(|(_, name)| name.clone()).collect();

        let registry = self.registry;
        let is_aggregate = |name: &str| registry.is_aggregate(name);
        let aggregate_mode = !select.group_by.is_empty()
            || select.having.is_some()
            || items.iter().any(|(target, _)| {
                matches!(target, Target::Expr(e) if e.contains_call(&is_aggregate))
            });

        let (plan, exprs, keys) = if aggregate_mode {
            let mut state = AggregateState::default();
            for group in &select.group_by {
                let bound = match group_target(group, &items, &scope) {
                    Target::Column(index) => ExprBinder::new(&scope, registry).bind_column_index(index)?,
                    Target::Expr(expr) => ExprBinder::new(&scope, registry).bind(expr)?,
                };
                if !state.groups.contains(&bound) {
                    state.groups.push(bound);
                }
            }

            let mut binder = ExprBinder::with_aggregates(&scope, registry, &mut state);
            let mut exprs = bind_targets(&mut binder, &items)?;
            let having = select
                .having
                .as_ref()
                .map(|h| binder.bind_predicate(h))
                .transpose()?;
            let keys = order_keys(order_by, &names, &mut exprs, &mut |e| binder.bind(e))?;

            let mut plan = LogicalPlan::Aggregate {
                input: Box::new(input),
                group_by: state.groups,
                aggregates: state.aggregates,
            };
            if let Some(predicate) = having {
                plan = LogicalPlan::Filter {
                    input: Box::new(plan),
                    predicate,
                };
            }
            (plan, exprs, keys)
        } else {
            let mut binder = ExprBinder::new(&scope, registry);
            let mut exprs = bind_targets(&mut binder, &items)?;
            let keys = order_keys(order_by, &names, &mut exprs, &mut |e| binder.bind(e))?;
            (input, exprs, keys)
        };

        let plan = finish_projection(plan, exprs, names.len(), keys, select.distinct)?;
        Ok((plan, names))
    }

    /// ORDER BY over the output of a VALUES or set operation body.
    fn order_output(
        &self,
        plan: LogicalPlan,
        names: Vec<String>,
        order_by: &[OrderItem],
    ) -> Result<(LogicalPlan, Vec<String>), BindError> {
        if order_by.is_empty() {
            return Ok((plan, names));
        }

        let mut fields = plan.schema().fields;
        for (field, name) in fields.iter_mut().zip(&names) {
            field.name = name.clone();
        }
        let scope = Scope::from_fields(None, &fields);
        let mut exprs: Vec<Expr> = fields
            .iter()
            .enumerate()
            .map(|(i, f)| Expr::column(i, f.data_type))
            .collect();

        let mut binder = ExprBinder::new(&scope, self.registry);
        let keys = order_keys(order_by, &names, &mut exprs, &mut |e| binder.bind(e))?;

        let plan = if exprs.len() == fields.len() {
            LogicalPlan::Sort {
                input: Box::new(plan),
                keys,
            }
        } else {
            finish_projection(plan, exprs, fields.len(), keys, false)?
        };
        Ok((plan, names))
    }

    fn bind_from(&self, from: &[TableRef]) -> Result<(LogicalPlan, Scope), BindError> {
        let mut combined: Option<(LogicalPlan, Scope)> = None;
        for table_ref in from {
            let (plan, scope) = self.bind_table_ref(table_ref)?;
            combined = Some(match combined {
                None => (plan, scope),
                Some((left, left_scope)) => (
                    LogicalPlan::Join {
                        left: Box::new(left),
                        right: Box::new(plan),
                        kind: JoinKind::Cross,
                        condition: None,
                    },
                    left_scope.join(scope),
                ),
            });
        }

        // SELECT without FROM reads a single empty row
        Ok(combined.unwrap_or_else(|| {
            (
                LogicalPlan::Values {
                    fields: vec![Field::new("dummy", DataType::Int32, false)],
                    rows: vec![vec![Expr::literal(Value::Int32(0))]],
                },
                Scope::empty(),
            )
        }))
    }

    fn bind_table_ref(&self, table_ref: &TableRef) -> Result<(LogicalPlan, Scope), BindError> {
        let (mut plan, mut scope) = self.bind_table_factor(&table_ref.factor)?;

        for join in &table_ref.joins {
            let (right, right_scope) = self.bind_table_factor(&join.factor)?;
            scope = scope.join(right_scope);

            let kind = match join.join_type {
                JoinType::Inner => JoinKind::Inner,
                JoinType::Left => JoinKind::Left,
                JoinType::Right => JoinKind::Right,
                JoinType::Full => JoinKind::Full,
                JoinType::Cross => JoinKind::Cross,
            };
            let condition = join
                .on
                .as_ref()
                .map(|on| ExprBinder::new(&scope, self.registry).bind_predicate(on))
                .transpose()?;
            match (kind, &condition) {
                (JoinKind::Cross, Some(_)) => {
                    return Err(BindError::Unsupported("CROSS JOIN cannot have an ON clause".to_string()));
                }
                (JoinKind::Cross, None) => {}
                (_, None) => {
                    return Err(BindError::Unsupported("JOIN requires an ON clause".to_string()));
                }
                _ => {}
            }

            plan = LogicalPlan::Join {
                left: Box::new(plan),
                right: Box::new(right),
                kind,
                condition,
            };
        }

        Ok((plan, scope))
    }

    fn bind_table_factor(&self, factor: &TableFactor) -> Result<(LogicalPlan, Scope), BindError> {
        match factor {
            TableFactor::Table { name, alias } => {
                let schema = self.table(name)?;
                let fields = schema.fields();
                let qualifier = alias.as_ref().map(|a| a.name.as_str()).unwrap_or(name.as_str());
                let scope = apply_alias(Scope::from_fields(Some(qualifier), &fields), alias.as_ref())?;
                Ok((
                    LogicalPlan::Scan {
                        table: schema.name,
                        fields,
                    },
                    scope,
                ))
            }
            TableFactor::Derived { subquery, alias } => {
                let plan = self.bind_query(subquery)?;
                let qualifier = alias.as_ref().map(|a| a.name.as_str());
                let scope = apply_alias(Scope::from_schema(qualifier, &plan.schema()), alias.as_ref())?;
                Ok((plan.root, scope))
            }
        }
    }

    fn bind_insert(
        &self,
        table: &str,
        columns: Option<&[String]>,
        source: &Query,
    ) -> Result<BoundStatement, BindError> {
        let schema = self.table(table)?;
        let source = self.bind_query(source)?;
        let source_types = source.root.schema().types();

        let targets: Vec<usize> = match columns {
            Some(columns) => {
                let mut targets = Vec::with_capacity(columns.len());
                for column in columns {
                    let index = schema
                        .column_index(column)
                        .ok_or_else(|| BindError::ColumnNotFound(format!("{}.{}", schema.name, column)))?;
                    if targets.contains(&index) {
                        return Err(BindError::DuplicateColumn(column.clone()));
                    }
                    targets.push(index);
                }
                targets
            }
            None => (0..schema.columns.len()).collect(),
        };
        if targets.len() != source_types.len() {
            return Err(BindError::ColumnCountMismatch {
                expected: targets.len(),
                actual: source_types.len(),
            });
        }

        let mut exprs = Vec::with_capacity(schema.columns.len());
        for (i, column) in schema.columns.iter().enumerate() {
            let expr = match targets.iter().position(|t| *t == i) {
                Some(source_index) => {
                    let source_type = source_types[source_index];
                    let compatible = source_type == DataType::Varchar
                        || source_type.common_supertype(&column.data_type).is_some();
                    if !compatible {
                        return Err(BindError::TypeMismatch(format!(
                            "cannot insert {} into column {} of type {}",
                            source_type, column.name, column.data_type
                        )));
                    }
                    coerce(Expr::column(source_index, source_type), column.data_type)
                }
                None => Expr::null(column.data_type),
            };
            exprs.push(expr);
        }

        let identity = exprs
            .iter()
            .enumerate()
            .all(|(i, e)| matches!(e, Expr::Column { index, .. } if *index == i));
        let input = if identity {
            source.root
        } else {
            LogicalPlan::Project {
                input: Box::new(source.root),
                exprs,
            }
        };

        Ok(write(WriteOp::Insert, schema.name.clone(), schema.fields(), input))
    }
}

fn write(op: WriteOp, table: String, fields: Vec<Field>, input: LogicalPlan) -> BoundStatement {
    BoundStatement::Query(QueryPlan::new(
        LogicalPlan::Write {
            op,
            table,
            fields,
            input: Box::new(input),
        },
        vec![WRITE_COUNT_COLUMN.to_string()],
    ))
}

fn statement_kind(statement: &Statement) -> &'static str {
    match statement {
        Statement::Query(_) => "query",
        Statement::CreateTable { .. } => "create_table",
        Statement::CreateTableAs { .. } => "create_table_as",
        Statement::Insert { .. } => "insert",
        Statement::Delete { .. } => "delete",
        Statement::DropTable { .. } => "drop_table",
    }
}

fn non_null(data_type: DataType) -> DataType {
    if data_type == DataType::Null {
        DataType::Int32
    } else {
        data_type
    }
}

/// Project `plan` so its columns have the `targets` types.
fn conform(plan: LogicalPlan, targets: &[DataType]) -> LogicalPlan {
    let types = plan.schema().types();
    if types == targets {
        return plan;
    }
    let exprs = types
        .iter()
        .zip(targets)
        .enumerate()
        .map(|(i, (source, target))| coerce(Expr::column(i, *source), *target))
        .collect();
    LogicalPlan::Project {
        input: Box::new(plan),
        exprs,
    }
}

fn apply_alias(mut scope: Scope, alias: Option<&TableAlias>) -> Result<Scope, BindError> {
    let Some(alias) = alias else {
        return Ok(scope);
    };
    if alias.columns.len() > scope.len() {
        return Err(BindError::ColumnCountMismatch {
            expected: scope.len(),
            actual: alias.columns.len(),
        });
    }
    for (column, name) in scope.columns.iter_mut().zip(&alias.columns) {
        column.name = name.clone();
    }
    Ok(scope)
}

fn expand_items<'q>(items: &'q [SelectItem], scope: &Scope) -> Result<Vec<(Target<'q>, String)>, BindError> {
    let mut expanded = Vec::new();
    for item in items {
        match item {
            SelectItem::Wildcard => {
                if scope.is_empty() {
                    return Err(BindError::Unsupported("SELECT * with no tables specified".to_string()));
                }
                expanded.extend(
                    scope
                        .columns
                        .iter()
                        .enumerate()
                        .map(|(i, c)| (Target::Column(i), c.name.clone())),
                );
            }
            SelectItem::QualifiedWildcard(qualifier) => {
                let indices = scope.qualified_indices(qualifier);
                if indices.is_empty() {
                    return Err(BindError::TableNotFound(qualifier.clone()));
                }
                expanded.extend(
                    indices
                        .into_iter()
                        .map(|i| (Target::Column(i), scope.columns[i].name.clone())),
                );
            }
            SelectItem::Expr(expr) => expanded.push((Target::Expr(expr), expr.to_string())),
            SelectItem::Aliased { expr, alias } => expanded.push((Target::Expr(expr), alias.clone())),
        }
    }
    Ok(expanded)
}

fn bind_targets(binder: &mut ExprBinder<'_>, items: &[(Target<'_>, String)]) -> Result<Vec<Expr>, BindError> {
    items
        .iter()
        .map(|(target, _)| {
            let expr = match target {
                Target::Column(index) => binder.bind_column_index(*index)?,
                Target::Expr(expr) => binder.bind(expr)?,
            };
            Ok(resolve_null(expr))
        })
        .collect()
}

/// GROUP BY entries may name a select-list position or output alias.
fn group_target<'q>(group: &'q ast::Expr, items: &[(Target<'q>, String)], scope: &Scope) -> Target<'q> {
    match group {
        ast::Expr::Literal(Literal::Number(n)) => match n.parse::<usize>() {
            Ok(position) if position >= 1 && position <= items.len() => items[position - 1].0,
            _ => Target::Expr(group),
        },
        ast::Expr::Column(ColumnRef { table: None, column }) if scope.resolve(None, column).is_err() => items
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(column))
            .map(|(target, _)| *target)
            .unwrap_or(Target::Expr(group)),
        _ => Target::Expr(group),
    }
}

/// Resolve ORDER BY items to output columns. Keys that are not in the
/// select list are appended to `exprs` as hidden columns.
fn order_keys(
    order_by: &[OrderItem],
    names: &[String],
    exprs: &mut Vec<Expr>,
    bind: &mut dyn FnMut(&ast::Expr) -> Result<Expr, BindError>,
) -> Result<Vec<SortKey>, BindError> {
    let mut keys = Vec::with_capacity(order_by.len());
    for item in order_by {
        let position = match &item.expr {
            ast::Expr::Literal(Literal::Number(n)) if n.parse::<usize>().is_ok() => {
                let position = n.parse::<usize>().unwrap_or(0);
                if position == 0 || position > names.len() {
                    return Err(BindError::Unsupported(format!(
                        "ORDER BY term out of range - should be between 1 and {}",
                        names.len()
                    )));
                }
                position - 1
            }
            ast::Expr::Column(ColumnRef { table: None, column })
                if names.iter().any(|n| n.eq_ignore_ascii_case(column)) =>
            {
                names
                    .iter()
                    .position(|n| n.eq_ignore_ascii_case(column))
                    .unwrap_or(0)
            }
            expr => {
                let bound = bind(expr)?;
                match exprs.iter().position(|e| *e == bound) {
                    Some(position) => position,
                    None => {
                        exprs.push(bound);
                        exprs.len() - 1
                    }
                }
            }
        };

        keys.push(SortKey {
            expr: Expr::column(position, exprs[position].data_type()),
            ascending: !item.desc,
            nulls_first: item.nulls_first.unwrap_or(false),
        });
    }
    Ok(keys)
}

/// Project, deduplicate, sort and drop hidden sort columns.
fn finish_projection(
    input: LogicalPlan,
    exprs: Vec<Expr>,
    visible: usize,
    keys: Vec<SortKey>,
    distinct: bool,
) -> Result<LogicalPlan, BindError> {
    let hidden = exprs.len() > visible;
    if distinct && hidden {
        return Err(BindError::Unsupported(
            "for SELECT DISTINCT, ORDER BY expressions must appear in select list".to_string(),
        ));
    }

    let mut plan = LogicalPlan::Project {
        input: Box::new(input),
        exprs,
    };
    if distinct {
        let group_by = plan
            .schema()
            .types()
            .into_iter()
            .enumerate()
            .map(|(i, t)| Expr::column(i, t))
            .collect();
        plan = LogicalPlan::Aggregate {
            input: Box::new(plan),
            group_by,
            aggregates: vec![],
        };
    }
    if !keys.is_empty() {
        plan = LogicalPlan::Sort {
            input: Box::new(plan),
            keys,
        };
    }
    if hidden {
        let exprs = plan
            .schema()
            .types()
            .into_iter()
            .take(visible)
            .enumerate()
            .map(|(i, t)| Expr::column(i, t))
            .collect();
        plan = LogicalPlan::Project {
            input: Box::new(plan),
            exprs,
        };
    }
    Ok(plan)
}
