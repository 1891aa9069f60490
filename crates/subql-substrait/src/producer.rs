//! Logical plan → Substrait plan
//!
//! The producer re-validates every reference in the bound plan against the
//! schema it is evaluated over, so a plan that leaves here is consumable by
//! any engine that knows the referenced tables.

use crate::error::{Result, SubstraitError};
use crate::literal::to_literal;
use crate::manifest::FunctionManifest;
use crate::types::{named_struct, to_substrait_type};
use substrait::proto::expression::field_reference::{ReferenceType, RootReference, RootType};
use substrait::proto::expression::literal::LiteralType;
use substrait::proto::expression::reference_segment::{self, StructField};
use substrait::proto::expression::{self, if_then, FieldReference, ReferenceSegment, RexType};
use substrait::proto::join_rel::JoinType;
use substrait::proto::rel_common::{Emit, EmitKind};
use substrait::proto::sort_field::SortDirection;
use substrait::proto::{
    aggregate_function, aggregate_rel, fetch_rel, function_argument, plan_rel, read_rel, rel,
    set_rel, sort_field, write_rel, AggregateFunction, AggregateRel, AggregationPhase, CrossRel,
    Expression, FetchRel, FilterRel, FunctionArgument, JoinRel, NamedObjectWrite, Plan, PlanRel,
    ProjectRel, ReadRel, Rel, RelCommon, RelRoot, SetRel, SortField, SortRel, Version, WriteRel,
};
use subql_ir::{
    AggregateExpr, DataType, Expr, JoinKind, LogicalPlan, QueryPlan, Schema, SetOp, SortKey,
    Value, WriteOp,
};
use subql_registry::{compound_name, FunctionRegistry};
use tracing::debug;

pub const PRODUCER_NAME: &str = "subql";

fn unresolved(message: impl Into<String>) -> SubstraitError {
    SubstraitError::UnresolvedReference(message.into())
}

pub struct PlanProducer<'a> {
    registry: &'a FunctionRegistry,
    manifest: FunctionManifest,
}

impl<'a> PlanProducer<'a> {
    pub fn new(registry: &'a FunctionRegistry) -> Self {
        Self {
            registry,
            manifest: FunctionManifest::new(),
        }
    }

    /// Translate a bound plan into a Substrait plan with a single root relation.
    #[allow(deprecated)]
    pub fn produce(mut self, query: &QueryPlan) -> Result<Plan> {
        let schema = query.root.schema();
        if query.names.len() != schema.len() {
            return Err(unresolved(format!(
                "plan produces {} columns but names {} of them",
                schema.len(),
                query.names.len()
            )));
        }

        let input = self.rel(&query.root)?;
        debug!(
            root = query.root.name(),
            functions = self.manifest.len(),
            "Produced Substrait relation tree"
        );

        let plan_rel = PlanRel {
            rel_type: Some(plan_rel::RelType::Root(RelRoot {
                input: Some(input),
                names: query.names.clone(),
            })),
        };

        let (extension_uris, extensions) = self.manifest.into_parts();
        Ok(Plan {
            version: Some(Version {
                major_number: 0,
                minor_number: 53,
                patch_number: 0,
                producer: PRODUCER_NAME.to_string(),
                ..Default::default()
            }),
            extension_uris,
            extensions,
            relations: vec![plan_rel],
            ..Default::default()
        })
    }

    fn rel(&mut self, plan: &LogicalPlan) -> Result<Rel> {
        let rel_type = match plan {
            LogicalPlan::Scan { table, fields } => rel::RelType::Read(Box::new(ReadRel {
                base_schema: Some(named_struct(fields)),
                read_type: Some(read_rel::ReadType::NamedTable(read_rel::NamedTable {
                    names: vec![table.clone()],
                    ..Default::default()
                })),
                ..Default::default()
            })),
            LogicalPlan::Values { fields, rows } => {
                let empty = Schema::new(vec![]);
                let mut expressions = Vec::with_capacity(rows.len());
                for row in rows {
                    if row.len() != fields.len() {
                        return Err(unresolved(format!(
                            "VALUES row has {} entries, expected {}",
                            row.len(),
                            fields.len()
                        )));
                    }
                    let mut values = Vec::with_capacity(row.len());
                    for (expr, field) in row.iter().zip(fields) {
                        if expr.data_type() != field.data_type {
                            return Err(unresolved(format!(
                                "VALUES entry of type {} in column '{}' of type {}",
                                expr.data_type(),
                                field.name,
                                field.data_type
                            )));
                        }
                        values.push(self.expr(expr, &empty)?);
                    }
                    expressions.push(expression::nested::Struct { fields: values });
                }
                rel::RelType::Read(Box::new(ReadRel {
                    base_schema: Some(named_struct(fields)),
                    read_type: Some(read_rel::ReadType::VirtualTable(read_rel::VirtualTable {
                        expressions,
                        ..Default::default()
                    })),
                    ..Default::default()
                }))
            }
            LogicalPlan::Filter { input, predicate } => {
                let schema = input.schema();
                if predicate.data_type() != DataType::Boolean {
                    return Err(unresolved(format!(
                        "filter predicate has type {}",
                        predicate.data_type()
                    )));
                }
                let condition = self.expr(predicate, &schema)?;
                rel::RelType::Filter(Box::new(FilterRel {
                    input: Some(Box::new(self.rel(input)?)),
                    condition: Some(Box::new(condition)),
                    ..Default::default()
                }))
            }
            LogicalPlan::Project { input, exprs } => {
                let schema = input.schema();
                let expressions = self.exprs(exprs, &schema)?;
                // ProjectRel appends its expressions to the input columns; emit only the new ones.
                let width = schema.len() as i32;
                let output_mapping = (width..width + expressions.len() as i32).collect();
                rel::RelType::Project(Box::new(ProjectRel {
                    common: Some(RelCommon {
                        emit_kind: Some(EmitKind::Emit(Emit { output_mapping })),
                        ..Default::default()
                    }),
                    input: Some(Box::new(self.rel(input)?)),
                    expressions,
                    ..Default::default()
                }))
            }
            LogicalPlan::Aggregate {
                input,
                group_by,
                aggregates,
            } => {
                let schema = input.schema();
                let grouping_expressions = self.exprs(group_by, &schema)?;
                let measures = aggregates
                    .iter()
                    .map(|a| self.measure(a, &schema))
                    .collect::<Result<Vec<_>>>()?;
                rel::RelType::Aggregate(Box::new(AggregateRel {
                    input: Some(Box::new(self.rel(input)?)),
                    groupings: vec![aggregate_rel::Grouping {
                        expression_references: (0..grouping_expressions.len() as u32).collect(),
                        ..Default::default()
                    }],
                    grouping_expressions,
                    measures,
                    ..Default::default()
                }))
            }
            LogicalPlan::Join {
                left,
                right,
                kind,
                condition,
            } => return self.join(left, right, *kind, condition.as_ref()),
            LogicalPlan::Sort { input, keys } => {
                let schema = input.schema();
                let sorts = keys
                    .iter()
                    .map(|k| self.sort_field(k, &schema))
                    .collect::<Result<Vec<_>>>()?;
                rel::RelType::Sort(Box::new(SortRel {
                    input: Some(Box::new(self.rel(input)?)),
                    sorts,
                    ..Default::default()
                }))
            }
            LogicalPlan::Limit {
                input,
                offset,
                fetch,
            } => {
                let offset_mode = if *offset > 0 {
                    Some(fetch_rel::OffsetMode::OffsetExpr(i64_literal(*offset)?.into()))
                } else {
                    None
                };
                // Counts past i64::MAX are unbounded.
                let count_mode = match fetch.filter(|n| i64::try_from(*n).is_ok()) {
                    Some(n) => Some(fetch_rel::CountMode::CountExpr(i64_literal(n)?.into())),
                    None => None,
                };
                rel::RelType::Fetch(Box::new(FetchRel {
                    input: Some(Box::new(self.rel(input)?)),
                    offset_mode,
                    count_mode,
                    ..Default::default()
                }))
            }
            LogicalPlan::SetOperation { left, right, op, all } => {
                let (l, r) = (left.schema(), right.schema());
                if l.types() != r.types() {
                    return Err(unresolved(format!(
                        "set operation inputs differ: {:?} vs {:?}",
                        l.types(),
                        r.types()
                    )));
                }
                let op = match (op, all) {
                    (SetOp::Union, true) => set_rel::SetOp::UnionAll,
                    (SetOp::Union, false) => set_rel::SetOp::UnionDistinct,
                    (SetOp::Except, false) => set_rel::SetOp::MinusPrimary,
                    (SetOp::Intersect, false) => set_rel::SetOp::IntersectionPrimary,
                    (SetOp::Except, true) => {
                        return Err(SubstraitError::UnsupportedOperator("EXCEPT ALL".to_string()))
                    }
                    (SetOp::Intersect, true) => {
                        return Err(SubstraitError::UnsupportedOperator(
                            "INTERSECT ALL".to_string(),
                        ))
                    }
                };
                rel::RelType::Set(
                    SetRel {
                        inputs: vec![self.rel(left)?, self.rel(right)?],
                        op: op as i32,
                        ..Default::default()
                    }
                    .into(),
                )
            }
            LogicalPlan::Write {
                op,
                table,
                fields,
                input,
            } => {
                let types: Vec<DataType> = fields.iter().map(|f| f.data_type).collect();
                if input.schema().types() != types {
                    return Err(unresolved(format!(
                        "write into '{}' expects {:?}, input produces {:?}",
                        table,
                        types,
                        input.schema().types()
                    )));
                }
                let op = match op {
                    WriteOp::CreateTableAs => write_rel::WriteOp::Ctas,
                    WriteOp::Insert => write_rel::WriteOp::Insert,
                    WriteOp::Delete => write_rel::WriteOp::Delete,
                };
                rel::RelType::Write(Box::new(WriteRel {
                    table_schema: Some(named_struct(fields)),
                    op: op as i32,
                    input: Some(Box::new(self.rel(input)?)),
                    write_type: Some(write_rel::WriteType::NamedTable(NamedObjectWrite {
                        names: vec![table.clone()],
                        ..Default::default()
                    })),
                    ..Default::default()
                }))
            }
        };
        Ok(Rel {
            rel_type: Some(rel_type),
        })
    }

    fn join(
        &mut self,
        left: &LogicalPlan,
        right: &LogicalPlan,
        kind: JoinKind,
        condition: Option<&Expr>,
    ) -> Result<Rel> {
        let mut fields = left.schema().fields;
        fields.extend(right.schema().fields);
        let joined = Schema::new(fields);

        let expression = match condition {
            Some(c) if c.data_type() != DataType::Boolean => {
                return Err(unresolved(format!("join condition has type {}", c.data_type())))
            }
            Some(c) => Some(self.expr(c, &joined)?),
            None => None,
        };

        let join_type = match kind {
            JoinKind::Cross => {
                let cross = Rel {
                    rel_type: Some(rel::RelType::Cross(Box::new(CrossRel {
                        left: Some(Box::new(self.rel(left)?)),
                        right: Some(Box::new(self.rel(right)?)),
                        ..Default::default()
                    }))),
                };
                return Ok(match expression {
                    Some(condition) => Rel {
                        rel_type: Some(rel::RelType::Filter(Box::new(FilterRel {
                            input: Some(Box::new(cross)),
                            condition: Some(Box::new(condition)),
                            ..Default::default()
                        }))),
                    },
                    None => cross,
                });
            }
            JoinKind::Inner => JoinType::Inner,
            JoinKind::Left => JoinType::Left,
            JoinKind::Right => JoinType::Right,
            JoinKind::Full => JoinType::Outer,
            JoinKind::Semi => JoinType::LeftSemi,
            JoinKind::Anti => JoinType::LeftAnti,
        };

        let expression = expression.unwrap_or_else(|| literal_expression(LiteralType::Boolean(true)));
        Ok(Rel {
            rel_type: Some(rel::RelType::Join(Box::new(JoinRel {
                left: Some(Box::new(self.rel(left)?)),
                right: Some(Box::new(self.rel(right)?)),
                expression: Some(Box::new(expression)),
                r#type: join_type as i32,
                ..Default::default()
            }))),
        })
    }

    fn measure(&mut self, aggregate: &AggregateExpr, schema: &Schema) -> Result<aggregate_rel::Measure> {
        if !self.registry.is_aggregate(&aggregate.function) {
            return Err(unresolved(format!(
                "'{}' is not an aggregate function",
                aggregate.function
            )));
        }
        let types: Vec<DataType> = aggregate.args.iter().map(Expr::data_type).collect();
        self.check_return_type(&aggregate.function, &types, aggregate.return_type)?;

        let name = compound_name(self.registry.substrait_name(&aggregate.function), &types);
        let uri = self.registry.extension_uri(&aggregate.function, &types);
        let function_reference = self.manifest.anchor(&name, &uri);
        let arguments = self.arguments(&aggregate.args, schema)?;
        let invocation = if aggregate.distinct {
            aggregate_function::AggregationInvocation::Distinct
        } else {
            aggregate_function::AggregationInvocation::All
        };

        Ok(aggregate_rel::Measure {
            measure: Some(AggregateFunction {
                function_reference,
                arguments,
                output_type: Some(to_substrait_type(&aggregate.return_type, true)),
                phase: AggregationPhase::InitialToResult as i32,
                invocation: invocation as i32,
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn sort_field(&mut self, key: &SortKey, schema: &Schema) -> Result<SortField> {
        let direction = match (key.ascending, key.nulls_first) {
            (true, true) => SortDirection::AscNullsFirst,
            (true, false) => SortDirection::AscNullsLast,
            (false, true) => SortDirection::DescNullsFirst,
            (false, false) => SortDirection::DescNullsLast,
        };
        Ok(SortField {
            expr: Some(self.expr(&key.expr, schema)?),
            sort_kind: Some(sort_field::SortKind::Direction(direction as i32)),
        })
    }

    fn check_return_type(&self, function: &str, types: &[DataType], declared: DataType) -> Result<()> {
        let resolved = self
            .registry
            .resolve(function, types)
            .map_err(|e| unresolved(e.to_string()))?;
        if resolved != declared {
            return Err(unresolved(format!(
                "function {} returns {}, plan declares {}",
                function, resolved, declared
            )));
        }
        Ok(())
    }

    fn exprs(&mut self, exprs: &[Expr], schema: &Schema) -> Result<Vec<Expression>> {
        exprs.iter().map(|e| self.expr(e, schema)).collect()
    }

    fn arguments(&mut self, args: &[Expr], schema: &Schema) -> Result<Vec<FunctionArgument>> {
        args.iter()
            .map(|a| {
                Ok(FunctionArgument {
                    arg_type: Some(function_argument::ArgType::Value(self.expr(a, schema)?)),
                })
            })
            .collect()
    }

    fn expr(&mut self, expr: &Expr, schema: &Schema) -> Result<Expression> {
        let rex_type = match expr {
            Expr::Column { index, data_type } => {
                let field = schema.fields.get(*index).ok_or_else(|| {
                    unresolved(format!(
                        "column #{} out of range for input of {} columns",
                        index,
                        schema.len()
                    ))
                })?;
                if field.data_type != *data_type {
                    return Err(unresolved(format!(
                        "column '{}' has type {}, reference expects {}",
                        field.name, field.data_type, data_type
                    )));
                }
                return Ok(field_reference(*index));
            }
            Expr::Literal { value, data_type } => RexType::Literal(to_literal(value, data_type)?),
            Expr::Function {
                name,
                args,
                return_type,
            } => {
                if self.registry.lookup(name).is_none() {
                    return Err(unresolved(format!("function '{}' is not registered", name)));
                }
                if self.registry.is_aggregate(name) {
                    return Err(unresolved(format!(
                        "aggregate '{}' outside of an aggregation",
                        name
                    )));
                }
                let types: Vec<DataType> = args.iter().map(Expr::data_type).collect();
                self.check_return_type(name, &types, *return_type)?;

                let anchor = self.manifest.anchor(
                    &compound_name(self.registry.substrait_name(name), &types),
                    &self.registry.extension_uri(name, &types),
                );
                RexType::ScalarFunction(expression::ScalarFunction {
                    function_reference: anchor,
                    arguments: self.arguments(args, schema)?,
                    output_type: Some(to_substrait_type(return_type, true)),
                    ..Default::default()
                })
            }
            Expr::Case {
                branches,
                else_result,
                return_type,
            } => {
                let mut ifs = Vec::with_capacity(branches.len());
                for branch in branches {
                    if branch.condition.data_type() != DataType::Boolean {
                        return Err(unresolved(format!(
                            "CASE condition has type {}",
                            branch.condition.data_type()
                        )));
                    }
                    if branch.result.data_type() != *return_type {
                        return Err(unresolved(format!(
                            "CASE branch of type {} in CASE of type {}",
                            branch.result.data_type(),
                            return_type
                        )));
                    }
                    ifs.push(if_then::IfClause {
                        r#if: Some(self.expr(&branch.condition, schema)?.into()),
                        then: Some(self.expr(&branch.result, schema)?.into()),
                    });
                }
                if else_result.data_type() != *return_type {
                    return Err(unresolved(format!(
                        "CASE ELSE of type {} in CASE of type {}",
                        else_result.data_type(),
                        return_type
                    )));
                }
                RexType::IfThen(
                    expression::IfThen {
                        ifs,
                        r#else: Some(self.expr(else_result, schema)?.into()),
                    }
                    .into(),
                )
            }
            Expr::Cast { expr, data_type } => RexType::Cast(
                expression::Cast {
                    r#type: Some(to_substrait_type(data_type, true)),
                    input: Some(self.expr(expr, schema)?.into()),
                    failure_behavior: expression::cast::FailureBehavior::ThrowException as i32,
                    ..Default::default()
                }
                .into(),
            ),
            Expr::InList { expr, list } => {
                let value_type = expr.data_type();
                if let Some(option) = list
                    .iter()
                    .find(|o| value_type.common_supertype(&o.data_type()).is_none())
                {
                    return Err(unresolved(format!(
                        "IN list entry of type {} compared with {}",
                        option.data_type(),
                        value_type
                    )));
                }
                RexType::SingularOrList(
                    expression::SingularOrList {
                        value: Some(self.expr(expr, schema)?.into()),
                        options: self.exprs(list, schema)?,
                    }
                    .into(),
                )
            }
        };
        Ok(Expression {
            rex_type: Some(rex_type),
        })
    }
}

/// Direct reference to a field of the input record.
pub(crate) fn field_reference(index: usize) -> Expression {
    let field_ref = FieldReference {
        reference_type: Some(ReferenceType::DirectReference(ReferenceSegment {
            reference_type: Some(reference_segment::ReferenceType::StructField(Box::new(
                StructField {
                    field: index as i32,
                    child: None,
                },
            ))),
        })),
        root_type: Some(RootType::RootReference(RootReference {})),
    };
    Expression {
        rex_type: Some(RexType::Selection(Box::new(field_ref))),
    }
}

fn literal_expression(literal_type: LiteralType) -> Expression {
    Expression {
        rex_type: Some(RexType::Literal(expression::Literal {
            literal_type: Some(literal_type),
            ..Default::default()
        })),
    }
}

fn i64_literal(n: u64) -> Result<Expression> {
    let n = i64::try_from(n).map_err(|_| {
        SubstraitError::UnsupportedOperator(format!("row offset {} does not fit a 64-bit literal", n))
    })?;
    let literal = to_literal(&Value::Int64(n), &DataType::Int64)?;
    Ok(Expression {
        rex_type: Some(RexType::Literal(literal)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use subql_ir::{CaseBranch, Field};

    fn employees() -> LogicalPlan {
        LogicalPlan::Scan {
            table: "employees".to_string(),
            fields: vec![
                Field::new("employee_id", DataType::Int32, false),
                Field::new("salary", DataType::Decimal { precision: 10, scale: 2 }, true),
            ],
        }
    }

    fn produce(root: LogicalPlan, names: &[&str]) -> Result<Plan> {
        let names = names.iter().map(|n| n.to_string()).collect();
        PlanProducer::new(FunctionRegistry::builtin()).produce(&QueryPlan::new(root, names))
    }

    fn root_rel(plan: &Plan) -> &Rel {
        let Some(plan_rel::RelType::Root(root)) = &plan.relations[0].rel_type else {
            panic!("expected root relation");
        };
        root.input.as_ref().unwrap()
    }

    #[test]
    fn test_scan_produces_named_table() {
        let plan = produce(employees(), &["employee_id", "salary"]).unwrap();

        assert_eq!(plan.relations.len(), 1);
        assert_eq!(plan.version.as_ref().unwrap().producer, "subql");
        let Some(rel::RelType::Read(read)) = &root_rel(&plan).rel_type else {
            panic!("expected read relation");
        };
        let Some(read_rel::ReadType::NamedTable(table)) = &read.read_type else {
            panic!("expected named table");
        };
        assert_eq!(table.names, vec!["employees"]);
        assert_eq!(read.base_schema.as_ref().unwrap().names, vec!["employee_id", "salary"]);
    }

    #[test]
    fn test_limit_uses_count_expression() {
        let plan = produce(
            LogicalPlan::Limit {
                input: Box::new(employees()),
                offset: 0,
                fetch: Some(5),
            },
            &["employee_id", "salary"],
        )
        .unwrap();

        let Some(rel::RelType::Fetch(fetch)) = &root_rel(&plan).rel_type else {
            panic!("expected fetch relation");
        };
        assert!(fetch.offset_mode.is_none());
        assert!(matches!(fetch.count_mode, Some(fetch_rel::CountMode::CountExpr(_))));
    }

    #[test]
    fn test_limit_beyond_i64() {
        let plan = produce(
            LogicalPlan::Limit {
                input: Box::new(employees()),
                offset: 0,
                fetch: Some(u64::MAX),
            },
            &["employee_id", "salary"],
        )
        .unwrap();
        let Some(rel::RelType::Fetch(fetch)) = &root_rel(&plan).rel_type else {
            panic!("expected fetch relation");
        };
        assert!(fetch.count_mode.is_none());

        let result = produce(
            LogicalPlan::Limit {
                input: Box::new(employees()),
                offset: u64::MAX,
                fetch: None,
            },
            &["employee_id", "salary"],
        );
        assert!(matches!(result, Err(SubstraitError::UnsupportedOperator(_))));
    }

    #[test]
    fn test_project_declares_functions_and_emits_new_columns() {
        let salary = DataType::Decimal { precision: 10, scale: 2 };
        let high = Expr::function(
            "gt",
            vec![
                Expr::column(1, salary),
                Expr::typed_literal(Value::Decimal { value: 8_000_000, scale: 2 }, salary),
            ],
            DataType::Boolean,
        );
        let category = Expr::Case {
            branches: vec![CaseBranch {
                condition: high,
                result: Expr::literal(Value::Varchar("HIGH".into())),
            }],
            else_result: Box::new(Expr::literal(Value::Varchar("Low".into()))),
            return_type: DataType::Varchar,
        };
        let plan = produce(
            LogicalPlan::Project {
                input: Box::new(employees()),
                exprs: vec![Expr::column(0, DataType::Int32), category],
            },
            &["employee_id", "category"],
        )
        .unwrap();

        assert_eq!(plan.extensions.len(), 1);
        let Some(rel::RelType::Project(project)) = &root_rel(&plan).rel_type else {
            panic!("expected project relation");
        };
        let Some(EmitKind::Emit(emit)) = project.common.as_ref().and_then(|c| c.emit_kind.as_ref())
        else {
            panic!("expected emit");
        };
        assert_eq!(emit.output_mapping, vec![2, 3]);
        assert!(matches!(
            project.expressions[1].rex_type,
            Some(RexType::IfThen(_))
        ));
    }

    #[test]
    fn test_column_type_mismatch_is_unresolved() {
        let result = produce(
            LogicalPlan::Project {
                input: Box::new(employees()),
                exprs: vec![Expr::column(0, DataType::Varchar)],
            },
            &["employee_id"],
        );
        assert!(matches!(result, Err(SubstraitError::UnresolvedReference(_))));

        let result = produce(
            LogicalPlan::Project {
                input: Box::new(employees()),
                exprs: vec![Expr::column(7, DataType::Int32)],
            },
            &["x"],
        );
        assert!(matches!(result, Err(SubstraitError::UnresolvedReference(_))));
    }

    #[test]
    fn test_unknown_function_is_unresolved() {
        let result = produce(
            LogicalPlan::Project {
                input: Box::new(employees()),
                exprs: vec![Expr::function(
                    "frobnicate",
                    vec![Expr::column(0, DataType::Int32)],
                    DataType::Int32,
                )],
            },
            &["x"],
        );
        assert!(matches!(result, Err(SubstraitError::UnresolvedReference(_))));
    }

    #[test]
    fn test_names_must_cover_output() {
        let result = produce(employees(), &["employee_id"]);
        assert!(matches!(result, Err(SubstraitError::UnresolvedReference(_))));
    }

    #[test]
    fn test_except_all_is_unsupported() {
        let result = produce(
            LogicalPlan::SetOperation {
                left: Box::new(employees()),
                right: Box::new(employees()),
                op: SetOp::Except,
                all: true,
            },
            &["employee_id", "salary"],
        );
        assert!(matches!(result, Err(SubstraitError::UnsupportedOperator(_))));
    }

    #[test]
    fn test_json_and_binary_encodings() {
        use prost::Message;

        let plan = produce(employees(), &["employee_id", "salary"]).unwrap();
        let bytes = plan.encode_to_vec();
        assert!(!bytes.is_empty());
        assert_eq!(Plan::decode(bytes.as_slice()).unwrap(), plan);

        let json = serde_json::to_string_pretty(&plan).unwrap();
        assert!(json.contains("employees"));
    }
}
