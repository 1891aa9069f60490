//! Substrait plan → logical plan
//!
//! Tables and columns are looked up by name in the consuming catalog, never
//! by position, so a plan produced against one database runs against any
//! other database holding tables with the same names and column types.

use crate::error::{Result, SubstraitError};
use crate::literal::from_literal;
use crate::manifest::FunctionTable;
use crate::types::{fields_from_named_struct, from_substrait_type};
use substrait::proto::expression::field_reference::{ReferenceType, RootType};
use substrait::proto::expression::{reference_segment, FieldReference, RexType};
use substrait::proto::join_rel::JoinType;
use substrait::proto::rel_common::EmitKind;
use substrait::proto::sort_field::SortDirection;
use substrait::proto::{
    aggregate_function, aggregate_rel, fetch_rel, function_argument, plan_rel, read_rel, rel,
    set_rel, sort_field, write_rel, AggregateRel, Expression, FetchRel, FunctionArgument, JoinRel,
    NamedStruct, Plan, ReadRel, Rel, RelCommon, SetRel, SortRel, Type, WriteRel,
};
use subql_ir::{
    AggregateExpr, CaseBranch, Catalog, DataType, Expr, Field, JoinKind, LogicalPlan, QueryPlan,
    Schema, SetOp, SortKey, Value, WriteOp,
};
use subql_registry::FunctionRegistry;
use tracing::debug;

fn malformed(message: impl Into<String>) -> SubstraitError {
    SubstraitError::MalformedPlan(message.into())
}

fn unsupported(message: impl Into<String>) -> SubstraitError {
    SubstraitError::UnsupportedOperator(message.into())
}

fn mismatch(message: impl Into<String>) -> SubstraitError {
    SubstraitError::SchemaMismatch(message.into())
}

fn required<'t, T>(value: Option<&'t T>, what: &str) -> Result<&'t T> {
    value.ok_or_else(|| malformed(format!("{} is missing", what)))
}

pub struct PlanConsumer<'a> {
    catalog: &'a dyn Catalog,
    registry: &'a FunctionRegistry,
    functions: FunctionTable,
}

impl<'a> PlanConsumer<'a> {
    pub fn new(catalog: &'a dyn Catalog, registry: &'a FunctionRegistry) -> Self {
        Self {
            catalog,
            registry,
            functions: FunctionTable::default(),
        }
    }

    /// Rebuild an executable plan from a Substrait plan.
    #[allow(deprecated)]
    pub fn consume(mut self, plan: &Plan) -> Result<QueryPlan> {
        self.functions = FunctionTable::from_extensions(&plan.extension_uris, &plan.extensions)?;

        let plan_rel = match plan.relations.as_slice() {
            [] => return Err(malformed("plan does not contain a root relation")),
            [single] => single,
            more => {
                return Err(malformed(format!(
                    "plan contains {} relations, expected one",
                    more.len()
                )))
            }
        };

        let query = match &plan_rel.rel_type {
            Some(plan_rel::RelType::Root(root)) => {
                let logical = self.rel(required(root.input.as_ref(), "root input")?)?;
                let width = logical.schema().len();
                if root.names.len() != width {
                    return Err(mismatch(format!(
                        "root names {} columns but the plan produces {}",
                        root.names.len(),
                        width
                    )));
                }
                QueryPlan::new(logical, root.names.clone())
            }
            Some(plan_rel::RelType::Rel(rel)) => {
                let logical = self.rel(rel)?;
                let names = logical.schema().names();
                QueryPlan::new(logical, names)
            }
            None => return Err(malformed("plan relation has no type")),
        };

        debug!(
            root = query.root.name(),
            functions = self.functions.len(),
            "Consumed Substrait plan"
        );
        Ok(query)
    }

    fn input(&self, input: Option<&Box<Rel>>, what: &str) -> Result<LogicalPlan> {
        self.rel(required(input, what)?)
    }

    fn rel(&self, rel: &Rel) -> Result<LogicalPlan> {
        let Some(rel_type) = &rel.rel_type else {
            return Err(malformed("relation has no type"));
        };
        match rel_type {
            rel::RelType::Read(read) => self.read(read),
            rel::RelType::Filter(filter) => {
                let input = self.input(filter.input.as_ref(), "filter input")?;
                let predicate = self.predicate(
                    required(filter.condition.as_ref(), "filter condition")?,
                    &input.schema(),
                )?;
                let plan = LogicalPlan::Filter {
                    input: Box::new(input),
                    predicate,
                };
                apply_emit(plan, filter.common.as_ref())
            }
            rel::RelType::Project(project) => {
                let input = self.input(project.input.as_ref(), "project input")?;
                let schema = input.schema();
                let mut exprs: Vec<Expr> = schema
                    .fields
                    .iter()
                    .enumerate()
                    .map(|(i, f)| Expr::column(i, f.data_type))
                    .collect();
                for e in &project.expressions {
                    exprs.push(self.expr(e, &schema)?);
                }
                if let Some(mapping) = emit_mapping(project.common.as_ref()) {
                    exprs = mapping
                        .iter()
                        .map(|i| {
                            usize::try_from(*i)
                                .ok()
                                .and_then(|i| exprs.get(i).cloned())
                                .ok_or_else(|| malformed(format!("emit index {} out of range", i)))
                        })
                        .collect::<Result<_>>()?;
                }
                Ok(LogicalPlan::Project {
                    input: Box::new(input),
                    exprs,
                })
            }
            rel::RelType::Aggregate(aggregate) => self.aggregate(aggregate),
            rel::RelType::Join(join) => self.join(join),
            rel::RelType::Cross(cross) => {
                let plan = LogicalPlan::Join {
                    left: Box::new(self.input(cross.left.as_ref(), "cross left")?),
                    right: Box::new(self.input(cross.right.as_ref(), "cross right")?),
                    kind: JoinKind::Cross,
                    condition: None,
                };
                apply_emit(plan, cross.common.as_ref())
            }
            rel::RelType::Sort(sort) => self.sort(sort),
            rel::RelType::Fetch(fetch) => self.fetch(fetch),
            rel::RelType::Set(set) => self.set(set),
            rel::RelType::Write(write) => self.write(write),
            rel::RelType::ExtensionSingle(_)
            | rel::RelType::ExtensionMulti(_)
            | rel::RelType::ExtensionLeaf(_) => Err(unsupported("extension relation")),
            rel::RelType::Reference(_) => Err(unsupported("reference relation")),
            rel::RelType::Ddl(_) => Err(unsupported("DDL relation")),
            rel::RelType::HashJoin(_) | rel::RelType::MergeJoin(_) => {
                Err(unsupported("physical join relation"))
            }
            _ => Err(unsupported("relation type")),
        }
    }

    fn read(&self, read: &ReadRel) -> Result<LogicalPlan> {
        let base_schema = required(read.base_schema.as_ref(), "read base schema")?;
        let mut plan = match &read.read_type {
            Some(read_rel::ReadType::NamedTable(table)) => self.scan(&table.names, base_schema)?,
            Some(read_rel::ReadType::VirtualTable(table)) => self.values(table, base_schema)?,
            Some(_) => return Err(unsupported("read type other than named or virtual table")),
            None => return Err(malformed("read relation has no read type")),
        };

        if let Some(filter) = &read.filter {
            let predicate = self.predicate(filter, &plan.schema())?;
            plan = LogicalPlan::Filter {
                input: Box::new(plan),
                predicate,
            };
        }

        if let Some(select) = read.projection.as_ref().and_then(|p| p.select.as_ref()) {
            let schema = plan.schema();
            let exprs = select
                .struct_items
                .iter()
                .map(|item| {
                    usize::try_from(item.field)
                        .ok()
                        .and_then(|i| schema.fields.get(i).map(|f| Expr::column(i, f.data_type)))
                        .ok_or_else(|| malformed(format!("projection field {} out of range", item.field)))
                })
                .collect::<Result<Vec<_>>>()?;
            plan = LogicalPlan::Project {
                input: Box::new(plan),
                exprs,
            };
        }

        apply_emit(plan, read.common.as_ref())
    }

    fn scan(&self, names: &[String], base_schema: &NamedStruct) -> Result<LogicalPlan> {
        let name = names
            .last()
            .ok_or_else(|| malformed("named table without a name"))?;
        let table = self.catalog.get_table_schema(name).ok_or_else(|| {
            SubstraitError::UnresolvedCatalogReference(format!(
                "Table with name {} does not exist!",
                name
            ))
        })?;

        let mut fields = Vec::new();
        for wire in fields_from_named_struct(base_schema)? {
            let index = table.column_index(&wire.name).ok_or_else(|| {
                SubstraitError::UnresolvedCatalogReference(format!(
                    "Table {} does not have a column named {}",
                    table.name, wire.name
                ))
            })?;
            let column = &table.columns[index];
            if column.data_type != wire.data_type {
                return Err(mismatch(format!(
                    "column {}.{} is {} in the catalog but {} in the plan",
                    table.name, column.name, column.data_type, wire.data_type
                )));
            }
            fields.push(Field::new(column.name.clone(), wire.data_type, wire.nullable));
        }

        Ok(LogicalPlan::Scan {
            table: table.name,
            fields,
        })
    }

    fn values(&self, table: &read_rel::VirtualTable, base_schema: &NamedStruct) -> Result<LogicalPlan> {
        let fields = fields_from_named_struct(base_schema)?;
        let empty = Schema::new(vec![]);

        let mut rows = Vec::new();
        for row in literal_rows(table)? {
            rows.push(row);
        }
        for row in &table.expressions {
            rows.push(
                row.fields
                    .iter()
                    .map(|e| self.expr(e, &empty))
                    .collect::<Result<Vec<_>>>()?,
            );
        }

        for row in &rows {
            if row.len() != fields.len() {
                return Err(mismatch(format!(
                    "virtual table row has {} values, schema declares {}",
                    row.len(),
                    fields.len()
                )));
            }
            for (expr, field) in row.iter().zip(&fields) {
                if expr.data_type() != field.data_type {
                    return Err(mismatch(format!(
                        "virtual table value of type {} in column '{}' of type {}",
                        expr.data_type(),
                        field.name,
                        field.data_type
                    )));
                }
            }
        }

        Ok(LogicalPlan::Values { fields, rows })
    }

    fn aggregate(&self, aggregate: &AggregateRel) -> Result<LogicalPlan> {
        let input = self.input(aggregate.input.as_ref(), "aggregate input")?;
        let schema = input.schema();

        let group_by = match aggregate.groupings.as_slice() {
            [] => vec![],
            [grouping] if !aggregate.grouping_expressions.is_empty()
                || !grouping.expression_references.is_empty() =>
            {
                grouping
                    .expression_references
                    .iter()
                    .map(|r| {
                        let e = aggregate.grouping_expressions.get(*r as usize).ok_or_else(|| {
                            malformed(format!("grouping expression reference {} out of range", r))
                        })?;
                        self.expr(e, &schema)
                    })
                    .collect::<Result<Vec<_>>>()?
            }
            [grouping] => deprecated_grouping(grouping)
                .iter()
                .map(|e| self.expr(e, &schema))
                .collect::<Result<Vec<_>>>()?,
            _ => return Err(unsupported("multiple grouping sets")),
        };

        let aggregates = aggregate
            .measures
            .iter()
            .map(|m| self.measure(m, &schema))
            .collect::<Result<Vec<_>>>()?;

        let plan = LogicalPlan::Aggregate {
            input: Box::new(input),
            group_by,
            aggregates,
        };
        apply_emit(plan, aggregate.common.as_ref())
    }

    fn measure(&self, measure: &aggregate_rel::Measure, schema: &Schema) -> Result<AggregateExpr> {
        if measure.filter.is_some() {
            return Err(unsupported("aggregate FILTER clause"));
        }
        let function = required(measure.measure.as_ref(), "measure function")?;
        if !function.sorts.is_empty() {
            return Err(unsupported("ordered aggregate"));
        }

        let args = self.arguments(&function.arguments, schema)?;
        let base = self.functions.base_name(function.function_reference)?;
        let name = self
            .registry
            .internal_name(base, args.len())
            .filter(|n| self.registry.is_aggregate(n))
            .ok_or_else(|| unsupported(format!("aggregate function '{}'", base)))?;
        let return_type = self.check_function(name, &args, function.output_type.as_ref())?;

        Ok(AggregateExpr {
            function: name.to_string(),
            args,
            distinct: function.invocation
                == aggregate_function::AggregationInvocation::Distinct as i32,
            return_type,
        })
    }

    fn join(&self, join: &JoinRel) -> Result<LogicalPlan> {
        let left = self.input(join.left.as_ref(), "join left")?;
        let right = self.input(join.right.as_ref(), "join right")?;
        let kind = match JoinType::try_from(join.r#type) {
            Ok(JoinType::Inner) => JoinKind::Inner,
            Ok(JoinType::Outer) => JoinKind::Full,
            Ok(JoinType::Left) => JoinKind::Left,
            Ok(JoinType::Right) => JoinKind::Right,
            Ok(JoinType::LeftSemi) => JoinKind::Semi,
            Ok(JoinType::LeftAnti) => JoinKind::Anti,
            Ok(other) => return Err(unsupported(format!("join type {}", other.as_str_name()))),
            Err(_) => return Err(malformed(format!("unknown join type {}", join.r#type))),
        };

        let mut fields = left.schema().fields;
        fields.extend(right.schema().fields);
        let joined = Schema::new(fields);
        let condition = match &join.expression {
            Some(e) => Some(self.predicate(e, &joined)?),
            None => None,
        };

        let mut plan = LogicalPlan::Join {
            left: Box::new(left),
            right: Box::new(right),
            kind,
            condition,
        };
        if let Some(post) = &join.post_join_filter {
            let predicate = self.predicate(post, &plan.schema())?;
            plan = LogicalPlan::Filter {
                input: Box::new(plan),
                predicate,
            };
        }
        apply_emit(plan, join.common.as_ref())
    }

    fn sort(&self, sort: &SortRel) -> Result<LogicalPlan> {
        let input = self.input(sort.input.as_ref(), "sort input")?;
        let schema = input.schema();

        let mut keys = Vec::with_capacity(sort.sorts.len());
        for field in &sort.sorts {
            let expr = self.expr(required(field.expr.as_ref(), "sort expression")?, &schema)?;
            let (ascending, nulls_first) = match field.sort_kind {
                Some(sort_field::SortKind::Direction(direction)) => match SortDirection::try_from(direction) {
                    Ok(SortDirection::AscNullsFirst) => (true, true),
                    Ok(SortDirection::AscNullsLast) | Ok(SortDirection::Unspecified) => (true, false),
                    Ok(SortDirection::DescNullsFirst) => (false, true),
                    Ok(SortDirection::DescNullsLast) => (false, false),
                    Ok(other) => return Err(unsupported(format!("sort direction {}", other.as_str_name()))),
                    Err(_) => return Err(malformed(format!("unknown sort direction {}", direction))),
                },
                None => (true, false),
                Some(sort_field::SortKind::ComparisonFunctionReference(_)) => {
                    return Err(unsupported("sort by comparison function"))
                }
            };
            keys.push(SortKey {
                expr,
                ascending,
                nulls_first,
            });
        }

        let plan = LogicalPlan::Sort {
            input: Box::new(input),
            keys,
        };
        apply_emit(plan, sort.common.as_ref())
    }

    #[allow(deprecated)]
    fn fetch(&self, fetch: &FetchRel) -> Result<LogicalPlan> {
        let input = self.input(fetch.input.as_ref(), "fetch input")?;

        let offset = match &fetch.offset_mode {
            None => 0,
            Some(fetch_rel::OffsetMode::Offset(n)) => non_negative(*n, "offset")?,
            Some(fetch_rel::OffsetMode::OffsetExpr(e)) => match self.row_count(e)? {
                Some(n) => n,
                None => 0,
            },
        };
        let count = match &fetch.count_mode {
            None => None,
            Some(fetch_rel::CountMode::Count(-1)) => None,
            Some(fetch_rel::CountMode::Count(n)) => Some(non_negative(*n, "count")?),
            Some(fetch_rel::CountMode::CountExpr(e)) => self.row_count(e)?,
        };

        let plan = LogicalPlan::Limit {
            input: Box::new(input),
            offset,
            fetch: count,
        };
        apply_emit(plan, fetch.common.as_ref())
    }

    /// Constant row count of a fetch expression; a NULL literal means no limit.
    fn row_count(&self, expr: &Expression) -> Result<Option<u64>> {
        match self.expr(expr, &Schema::new(vec![]))? {
            Expr::Literal { value: Value::Null, .. } => Ok(None),
            Expr::Literal { value, .. } => {
                let n = value
                    .as_i64()
                    .ok_or_else(|| mismatch(format!("fetch bound {:?} is not an integer", value)))?;
                non_negative(n, "fetch bound").map(Some)
            }
            _ => Err(unsupported("non-literal fetch bound")),
        }
    }

    fn set(&self, set: &SetRel) -> Result<LogicalPlan> {
        if set.inputs.len() < 2 {
            return Err(malformed(format!(
                "set operation with {} inputs",
                set.inputs.len()
            )));
        }
        let (op, all) = match set_rel::SetOp::try_from(set.op) {
            Ok(set_rel::SetOp::UnionAll) => (SetOp::Union, true),
            Ok(set_rel::SetOp::UnionDistinct) => (SetOp::Union, false),
            Ok(set_rel::SetOp::MinusPrimary) => (SetOp::Except, false),
            Ok(set_rel::SetOp::IntersectionPrimary) if set.inputs.len() == 2 => {
                (SetOp::Intersect, false)
            }
            Ok(other) => return Err(unsupported(format!("set operation {:?}", other))),
            Err(_) => return Err(unsupported(format!("set operation {}", set.op))),
        };

        let mut inputs = set.inputs.iter().map(|r| self.rel(r));
        let mut plan = match inputs.next() {
            Some(first) => first?,
            None => return Err(malformed("set operation without inputs")),
        };
        let types = plan.schema().types();
        for next in inputs {
            let next = next?;
            let next_types = next.schema().types();
            if next_types.len() != types.len() {
                return Err(mismatch(format!(
                    "set operation inputs have {} and {} columns",
                    types.len(),
                    next_types.len()
                )));
            }
            if next_types != types {
                return Err(mismatch(format!(
                    "set operation inputs differ in type: {:?} vs {:?}",
                    types, next_types
                )));
            }
            plan = LogicalPlan::SetOperation {
                left: Box::new(plan),
                right: Box::new(next),
                op,
                all,
            };
        }
        apply_emit(plan, set.common.as_ref())
    }

    fn write(&self, write: &WriteRel) -> Result<LogicalPlan> {
        let table = match &write.write_type {
            Some(write_rel::WriteType::NamedTable(named)) => named
                .names
                .last()
                .cloned()
                .ok_or_else(|| malformed("write target without a name"))?,
            Some(_) => return Err(unsupported("write to an extension table")),
            None => return Err(malformed("write relation has no target")),
        };
        let fields = fields_from_named_struct(required(write.table_schema.as_ref(), "write table schema")?)?;
        let op = match write_rel::WriteOp::try_from(write.op) {
            Ok(write_rel::WriteOp::Insert) => WriteOp::Insert,
            Ok(write_rel::WriteOp::Delete) => WriteOp::Delete,
            Ok(write_rel::WriteOp::Ctas) => WriteOp::CreateTableAs,
            Ok(other) => return Err(unsupported(format!("write operation {:?}", other))),
            Err(_) => return Err(malformed(format!("unknown write operation {}", write.op))),
        };

        let input = self.input(write.input.as_ref(), "write input")?;
        let input_types = input.schema().types();
        let types: Vec<DataType> = fields.iter().map(|f| f.data_type).collect();
        if input_types != types {
            return Err(mismatch(format!(
                "write into {} declares {:?}, input produces {:?}",
                table, types, input_types
            )));
        }

        let (table, fields) = match op {
            WriteOp::CreateTableAs => (table, fields),
            WriteOp::Insert | WriteOp::Delete => self.resolve_write_target(&table, fields)?,
        };

        Ok(LogicalPlan::Write {
            op,
            table,
            fields,
            input: Box::new(input),
        })
    }

    /// Match the declared write columns to the catalog table by name.
    fn resolve_write_target(&self, name: &str, fields: Vec<Field>) -> Result<(String, Vec<Field>)> {
        let table = self.catalog.get_table_schema(name).ok_or_else(|| {
            SubstraitError::UnresolvedCatalogReference(format!(
                "Table with name {} does not exist!",
                name
            ))
        })?;
        let mut resolved = Vec::with_capacity(fields.len());
        for field in fields {
            let index = table.column_index(&field.name).ok_or_else(|| {
                SubstraitError::UnresolvedCatalogReference(format!(
                    "Table {} does not have a column named {}",
                    table.name, field.name
                ))
            })?;
            let column = &table.columns[index];
            if column.data_type != field.data_type {
                return Err(mismatch(format!(
                    "column {}.{} is {} in the catalog but {} in the plan",
                    table.name, column.name, column.data_type, field.data_type
                )));
            }
            resolved.push(Field::new(column.name.clone(), column.data_type, column.nullable));
        }
        Ok((table.name, resolved))
    }

    fn predicate(&self, expr: &Expression, schema: &Schema) -> Result<Expr> {
        let predicate = self.expr(expr, schema)?;
        match predicate.data_type() {
            DataType::Boolean => Ok(predicate),
            other => Err(mismatch(format!("predicate has type {}", other))),
        }
    }

    fn arguments(&self, arguments: &[FunctionArgument], schema: &Schema) -> Result<Vec<Expr>> {
        arguments
            .iter()
            .map(|a| match &a.arg_type {
                Some(function_argument::ArgType::Value(e)) => self.expr(e, schema),
                Some(_) => Err(unsupported("non-value function argument")),
                None => Err(malformed("function argument has no value")),
            })
            .collect()
    }

    /// Re-derive a function's return type and compare it with the declared one.
    fn check_function(&self, name: &str, args: &[Expr], declared: Option<&Type>) -> Result<DataType> {
        let types: Vec<DataType> = args.iter().map(Expr::data_type).collect();
        let resolved = self
            .registry
            .resolve(name, &types)
            .map_err(|e| mismatch(e.to_string()))?;
        if let Some(declared) = declared {
            let (declared, _) = from_substrait_type(declared)?;
            if declared != resolved {
                return Err(mismatch(format!(
                    "function {} returns {}, plan declares {}",
                    name, resolved, declared
                )));
            }
        }
        Ok(resolved)
    }

    fn expr(&self, expr: &Expression, schema: &Schema) -> Result<Expr> {
        let Some(rex_type) = &expr.rex_type else {
            return Err(malformed("expression has no type"));
        };
        match rex_type {
            RexType::Literal(literal) => {
                let (value, data_type) = from_literal(literal)?;
                Ok(Expr::typed_literal(value, data_type))
            }
            RexType::Selection(reference) => {
                let index = field_index(reference)?;
                let field = schema.fields.get(index).ok_or_else(|| {
                    malformed(format!(
                        "field reference {} out of range for input of {} columns",
                        index,
                        schema.len()
                    ))
                })?;
                Ok(Expr::column(index, field.data_type))
            }
            RexType::ScalarFunction(function) => {
                let args = self.arguments(&function.arguments, schema)?;
                let base = self.functions.base_name(function.function_reference)?;
                let name = self
                    .registry
                    .internal_name(base, args.len())
                    .ok_or_else(|| unsupported(format!("function '{}'", base)))?;
                if self.registry.is_aggregate(name) {
                    return Err(unsupported(format!(
                        "aggregate function '{}' in a scalar expression",
                        base
                    )));
                }
                let return_type = self.check_function(name, &args, function.output_type.as_ref())?;
                Ok(Expr::function(name, args, return_type))
            }
            RexType::IfThen(if_then) => {
                let mut branches = Vec::with_capacity(if_then.ifs.len());
                for clause in &if_then.ifs {
                    let condition = self.predicate(required(clause.r#if.as_ref(), "IF condition")?, schema)?;
                    let result = self.expr(required(clause.then.as_ref(), "THEN result")?, schema)?;
                    branches.push(CaseBranch { condition, result });
                }
                let return_type = branches
                    .first()
                    .map(|b| b.result.data_type())
                    .ok_or_else(|| malformed("IF-THEN without clauses"))?;
                if let Some(branch) = branches.iter().find(|b| b.result.data_type() != return_type) {
                    return Err(mismatch(format!(
                        "IF-THEN results differ: {} vs {}",
                        return_type,
                        branch.result.data_type()
                    )));
                }
                let else_result = match &if_then.r#else {
                    Some(e) => self.expr(e, schema)?,
                    None => Expr::null(return_type),
                };
                if else_result.data_type() != return_type {
                    return Err(mismatch(format!(
                        "ELSE result is {}, branches are {}",
                        else_result.data_type(),
                        return_type
                    )));
                }
                Ok(Expr::Case {
                    branches,
                    else_result: Box::new(else_result),
                    return_type,
                })
            }
            RexType::Cast(cast) => {
                let (data_type, _) = from_substrait_type(required(cast.r#type.as_ref(), "cast type")?)?;
                let input = self.expr(required(cast.input.as_ref(), "cast input")?, schema)?;
                Ok(Expr::cast(input, data_type))
            }
            RexType::SingularOrList(list) => {
                let value = self.expr(required(list.value.as_ref(), "IN value")?, schema)?;
                let options = list
                    .options
                    .iter()
                    .map(|o| self.expr(o, schema))
                    .collect::<Result<Vec<_>>>()?;
                let value_type = value.data_type();
                if let Some(option) = options
                    .iter()
                    .find(|o| value_type.common_supertype(&o.data_type()).is_none())
                {
                    return Err(mismatch(format!(
                        "IN list option is {}, value is {}",
                        option.data_type(),
                        value_type
                    )));
                }
                Ok(Expr::InList {
                    expr: Box::new(value),
                    list: options,
                })
            }
            RexType::WindowFunction(_) => Err(unsupported("window function")),
            RexType::Subquery(_) => Err(unsupported("subquery")),
            RexType::SwitchExpression(_) => Err(unsupported("switch expression")),
            RexType::MultiOrList(_) => Err(unsupported("multi-column IN list")),
            RexType::Nested(_) => Err(unsupported("nested expression")),
            _ => Err(unsupported("expression type")),
        }
    }
}

/// Output column selection of a relation, if it declares one.
fn emit_mapping(common: Option<&RelCommon>) -> Option<&[i32]> {
    match common.and_then(|c| c.emit_kind.as_ref()) {
        Some(EmitKind::Emit(emit)) => Some(emit.output_mapping.as_slice()),
        _ => None,
    }
}

fn apply_emit(plan: LogicalPlan, common: Option<&RelCommon>) -> Result<LogicalPlan> {
    let Some(mapping) = emit_mapping(common) else {
        return Ok(plan);
    };
    let schema = plan.schema();
    let exprs = mapping
        .iter()
        .map(|i| {
            usize::try_from(*i)
                .ok()
                .and_then(|i| schema.fields.get(i).map(|f| Expr::column(i, f.data_type)))
                .ok_or_else(|| malformed(format!("emit index {} out of range", i)))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(LogicalPlan::Project {
        input: Box::new(plan),
        exprs,
    })
}

fn field_index(reference: &FieldReference) -> Result<usize> {
    match &reference.root_type {
        None | Some(RootType::RootReference(_)) => {}
        Some(RootType::OuterReference(_)) => return Err(unsupported("outer reference")),
        Some(_) => return Err(unsupported("field reference rooted in an expression")),
    }
    let Some(ReferenceType::DirectReference(segment)) = &reference.reference_type else {
        return match &reference.reference_type {
            None => Err(malformed("field reference has no target")),
            Some(_) => Err(unsupported("masked field reference")),
        };
    };
    match &segment.reference_type {
        Some(reference_segment::ReferenceType::StructField(field)) => {
            if field.child.is_some() {
                return Err(unsupported("nested field reference"));
            }
            usize::try_from(field.field)
                .map_err(|_| malformed(format!("negative field reference {}", field.field)))
        }
        Some(_) => Err(unsupported("map or list element reference")),
        None => Err(malformed("reference segment has no target")),
    }
}

#[allow(deprecated)]
fn deprecated_grouping(grouping: &aggregate_rel::Grouping) -> &[Expression] {
    &grouping.grouping_expressions
}

/// Rows of a virtual table given as literal structs.
#[allow(deprecated)]
fn literal_rows(table: &read_rel::VirtualTable) -> Result<Vec<Vec<Expr>>> {
    table
        .values
        .iter()
        .map(|row| {
            row.fields
                .iter()
                .map(|literal| {
                    let (value, data_type) = from_literal(literal)?;
                    Ok(Expr::typed_literal(value, data_type))
                })
                .collect()
        })
        .collect()
}

fn non_negative(n: i64, what: &str) -> Result<u64> {
    u64::try_from(n).map_err(|_| malformed(format!("negative {} {}", what, n)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::{field_reference, PlanProducer};
    use substrait::proto::{PlanRel, RelRoot};
    use subql_ir::{ColumnDef, MemoryCatalog, TableSchema};

    fn catalog() -> MemoryCatalog {
        MemoryCatalog::new().with_table(TableSchema::new(
            "employees",
            vec![
                ColumnDef::new("employee_id", DataType::Int32).primary_key(),
                ColumnDef::new("name", DataType::Varchar),
                ColumnDef::new("salary", DataType::Decimal { precision: 10, scale: 2 }),
            ],
        ))
    }

    fn scan(columns: &[(&str, DataType)]) -> LogicalPlan {
        LogicalPlan::Scan {
            table: "employees".to_string(),
            fields: columns
                .iter()
                .map(|(n, t)| Field::new(*n, *t, true))
                .collect(),
        }
    }

    fn round_trip(root: LogicalPlan, catalog: &dyn Catalog) -> Result<QueryPlan> {
        let names = root.schema().names();
        let plan = PlanProducer::new(FunctionRegistry::builtin()).produce(&QueryPlan::new(root, names))?;
        PlanConsumer::new(catalog, FunctionRegistry::builtin()).consume(&plan)
    }

    fn root_plan(rel: Rel, names: &[&str]) -> Plan {
        Plan {
            relations: vec![PlanRel {
                rel_type: Some(plan_rel::RelType::Root(RelRoot {
                    input: Some(rel),
                    names: names.iter().map(|n| n.to_string()).collect(),
                })),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_scan_resolves_columns_by_name() {
        // Subset in a different order than the catalog
        let plan = round_trip(
            scan(&[("salary", DataType::Decimal { precision: 10, scale: 2 }), ("employee_id", DataType::Int32)]),
            &catalog(),
        )
        .unwrap();

        let LogicalPlan::Scan { table, fields } = &plan.root else {
            panic!("expected scan");
        };
        assert_eq!(table, "employees");
        assert_eq!(fields[0].name, "salary");
        assert_eq!(fields[1].name, "employee_id");
        assert_eq!(plan.names, vec!["salary", "employee_id"]);
    }

    #[test]
    fn test_missing_table_and_column() {
        let empty = MemoryCatalog::new();
        assert!(matches!(
            round_trip(scan(&[("employee_id", DataType::Int32)]), &empty),
            Err(SubstraitError::UnresolvedCatalogReference(_))
        ));
        assert!(matches!(
            round_trip(scan(&[("bonus", DataType::Int32)]), &catalog()),
            Err(SubstraitError::UnresolvedCatalogReference(_))
        ));
    }

    #[test]
    fn test_column_type_conflict_is_schema_mismatch() {
        assert!(matches!(
            round_trip(scan(&[("name", DataType::Int64)]), &catalog()),
            Err(SubstraitError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_empty_plan_is_malformed() {
        let result = PlanConsumer::new(&catalog(), FunctionRegistry::builtin()).consume(&Plan::default());
        assert_eq!(
            result,
            Err(SubstraitError::MalformedPlan(
                "plan does not contain a root relation".to_string()
            ))
        );
    }

    #[test]
    fn test_out_of_range_field_is_malformed() {
        let read = Rel {
            rel_type: Some(rel::RelType::Read(Box::new(ReadRel {
                base_schema: Some(crate::types::named_struct(&[Field::new("employee_id", DataType::Int32, false)])),
                read_type: Some(read_rel::ReadType::NamedTable(read_rel::NamedTable {
                    names: vec!["employees".to_string()],
                    ..Default::default()
                })),
                ..Default::default()
            }))),
        };
        let project = Rel {
            rel_type: Some(rel::RelType::Project(Box::new(substrait::proto::ProjectRel {
                input: Some(Box::new(read)),
                expressions: vec![field_reference(4)],
                ..Default::default()
            }))),
        };
        let result = PlanConsumer::new(&catalog(), FunctionRegistry::builtin())
            .consume(&root_plan(project, &["employee_id", "x"]));
        assert!(matches!(result, Err(SubstraitError::MalformedPlan(_))));
    }

    #[test]
    fn test_project_without_emit_appends_columns() {
        let read = Rel {
            rel_type: Some(rel::RelType::Read(Box::new(ReadRel {
                base_schema: Some(crate::types::named_struct(&[Field::new("employee_id", DataType::Int32, false)])),
                read_type: Some(read_rel::ReadType::NamedTable(read_rel::NamedTable {
                    names: vec!["employees".to_string()],
                    ..Default::default()
                })),
                ..Default::default()
            }))),
        };
        let project = Rel {
            rel_type: Some(rel::RelType::Project(Box::new(substrait::proto::ProjectRel {
                input: Some(Box::new(read)),
                expressions: vec![field_reference(0)],
                ..Default::default()
            }))),
        };
        let plan = PlanConsumer::new(&catalog(), FunctionRegistry::builtin())
            .consume(&root_plan(project, &["a", "b"]))
            .unwrap();
        assert_eq!(plan.schema().names(), vec!["a", "b"]);

        let LogicalPlan::Project { exprs, .. } = &plan.root else {
            panic!("expected project");
        };
        assert_eq!(exprs.len(), 2);
    }

    #[test]
    fn test_undeclared_anchor_is_malformed() {
        let salary = DataType::Decimal { precision: 10, scale: 2 };
        let root = LogicalPlan::Filter {
            input: Box::new(scan(&[("salary", salary)])),
            predicate: Expr::function("is_null", vec![Expr::column(0, salary)], DataType::Boolean),
        };
        let mut plan = PlanProducer::new(FunctionRegistry::builtin())
            .produce(&QueryPlan::new(root, vec!["salary".to_string()]))
            .unwrap();
        plan.extensions.clear();

        let result = PlanConsumer::new(&catalog(), FunctionRegistry::builtin()).consume(&plan);
        assert!(matches!(result, Err(SubstraitError::MalformedPlan(_))));
    }

    #[test]
    fn test_root_names_arity_is_schema_mismatch() {
        let mut plan = PlanProducer::new(FunctionRegistry::builtin())
            .produce(&QueryPlan::new(
                scan(&[("employee_id", DataType::Int32)]),
                vec!["employee_id".to_string()],
            ))
            .unwrap();
        if let Some(plan_rel::RelType::Root(root)) = &mut plan.relations[0].rel_type {
            root.names.push("extra".to_string());
        }

        let result = PlanConsumer::new(&catalog(), FunctionRegistry::builtin()).consume(&plan);
        assert!(matches!(result, Err(SubstraitError::SchemaMismatch(_))));
    }

    fn join(kind: JoinKind) -> LogicalPlan {
        LogicalPlan::Join {
            left: Box::new(scan(&[("employee_id", DataType::Int32)])),
            right: Box::new(scan(&[("name", DataType::Varchar)])),
            kind,
            condition: None,
        }
    }

    #[test]
    fn test_join_kinds_and_sort_directions_survive() {
        for kind in [
            JoinKind::Inner,
            JoinKind::Left,
            JoinKind::Right,
            JoinKind::Full,
            JoinKind::Semi,
            JoinKind::Anti,
        ] {
            let plan = round_trip(join(kind), &catalog()).unwrap();
            let LogicalPlan::Join { kind: consumed, .. } = plan.root else {
                panic!("expected join");
            };
            assert_eq!(consumed, kind);
        }

        let keys: Vec<SortKey> = [(true, true), (true, false), (false, true), (false, false)]
            .into_iter()
            .map(|(ascending, nulls_first)| SortKey {
                expr: Expr::column(0, DataType::Int32),
                ascending,
                nulls_first,
            })
            .collect();
        let sort = LogicalPlan::Sort {
            input: Box::new(scan(&[("employee_id", DataType::Int32)])),
            keys: keys.clone(),
        };
        let plan = round_trip(sort, &catalog()).unwrap();
        let LogicalPlan::Sort { keys: consumed, .. } = plan.root else {
            panic!("expected sort");
        };
        assert_eq!(consumed, keys);
    }

    #[test]
    fn test_unknown_join_type_is_malformed() {
        let names = join(JoinKind::Left).schema().names();
        let mut plan = PlanProducer::new(FunctionRegistry::builtin())
            .produce(&QueryPlan::new(join(JoinKind::Left), names))
            .unwrap();
        let Some(plan_rel::RelType::Root(root)) = &mut plan.relations[0].rel_type else {
            panic!("expected root");
        };
        let Some(rel::RelType::Join(join_rel)) = root.input.as_mut().and_then(|r| r.rel_type.as_mut())
        else {
            panic!("expected join");
        };
        join_rel.r#type = 99;

        let result = PlanConsumer::new(&catalog(), FunctionRegistry::builtin()).consume(&plan);
        assert!(matches!(result, Err(SubstraitError::MalformedPlan(_))));
    }
}
