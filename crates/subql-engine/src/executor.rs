//! Materializing executor for logical plans

use crate::error::ExecutionError;
use crate::eval::{cast_value, eval, truthy};
use crate::storage::Database;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use subql_ir::{
    AggregateExpr, ColumnDef, DataType, Expr, Field, JoinKind, LogicalPlan, SetOp, SortKey,
    TableSchema, Value, WriteOp,
};
use tracing::{debug, trace};

type Result<T> = std::result::Result<T, ExecutionError>;
type Row = Vec<Value>;

/// Limits applied to a single statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionBudget {
    pub max_time_ms: Option<u64>,
    pub max_rows: Option<u64>,
}

impl ExecutionBudget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_max_rows(mut self, max_rows: u64) -> Self {
        self.max_rows = Some(max_rows);
        self
    }

    pub fn with_max_time_ms(mut self, max_time_ms: u64) -> Self {
        self.max_time_ms = Some(max_time_ms);
        self
    }
}

pub struct Executor<'a> {
    db: &'a Database,
    budget: &'a ExecutionBudget,
    started: Instant,
}

impl<'a> Executor<'a> {
    pub fn new(db: &'a Database, budget: &'a ExecutionBudget) -> Self {
        Self {
            db,
            budget,
            started: Instant::now(),
        }
    }

    /// Run `plan` to completion and return its rows.
    pub fn execute(&self, plan: &LogicalPlan) -> Result<Vec<Row>> {
        let rows = self.run(plan)?;
        if let Some(max_rows) = self.budget.max_rows {
            if rows.len() as u64 > max_rows {
                return Err(ExecutionError::BudgetExceeded(format!(
                    "Max rows ({}) exceeded",
                    max_rows
                )));
            }
        }
        debug!(
            operator = plan.name(),
            rows = rows.len(),
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Executed plan"
        );
        Ok(rows)
    }

    fn check_deadline(&self) -> Result<()> {
        match self.budget.max_time_ms {
            Some(limit) if self.started.elapsed().as_millis() as u64 > limit => {
                Err(ExecutionError::Timeout(limit))
            }
            _ => Ok(()),
        }
    }

    fn run(&self, plan: &LogicalPlan) -> Result<Vec<Row>> {
        self.check_deadline()?;
        trace!(operator = plan.name(), "Running operator");

        match plan {
            LogicalPlan::Scan { table, fields } => {
                let names: Vec<String> = fields.iter().map(|f| f.name.clone()).collect();
                self.db.scan(table, &names)
            }
            LogicalPlan::Values { rows, .. } => rows
                .iter()
                .map(|row| row.iter().map(|e| eval(e, &[])).collect::<Result<Row>>())
                .collect(),
            LogicalPlan::Filter { input, predicate } => {
                let mut out = Vec::new();
                for row in self.run(input)? {
                    if truthy(&eval(predicate, &row)?) == Some(true) {
                        out.push(row);
                    }
                }
                Ok(out)
            }
            LogicalPlan::Project { input, exprs } => self
                .run(input)?
                .iter()
                .map(|row| exprs.iter().map(|e| eval(e, row)).collect::<Result<Row>>())
                .collect(),
            LogicalPlan::Aggregate {
                input,
                group_by,
                aggregates,
            } => aggregate(self.run(input)?, group_by, aggregates),
            LogicalPlan::Join {
                left,
                right,
                kind,
                condition,
            } => {
                let left_width = left.schema().len();
                let right_width = right.schema().len();
                let left_rows = self.run(left)?;
                let right_rows = self.run(right)?;
                self.join(left_rows, right_rows, left_width, right_width, *kind, condition.as_ref())
            }
            LogicalPlan::Sort { input, keys } => sort(self.run(input)?, keys),
            LogicalPlan::Limit {
                input,
                offset,
                fetch,
            } => {
                let rows = self.run(input)?.into_iter().skip(*offset as usize);
                Ok(match fetch {
                    Some(n) => rows.take(*n as usize).collect(),
                    None => rows.collect(),
                })
            }
            LogicalPlan::SetOperation {
                left,
                right,
                op,
                all,
            } => Ok(set_operation(self.run(left)?, self.run(right)?, *op, *all)),
            LogicalPlan::Write {
                op,
                table,
                fields,
                input,
            } => {
                let rows = self.run(input)?;
                let count = self.write(*op, table, fields, rows)?;
                Ok(vec![vec![Value::Int64(count as i64)]])
            }
        }
    }

    fn join(
        &self,
        left: Vec<Row>,
        right: Vec<Row>,
        left_width: usize,
        right_width: usize,
        kind: JoinKind,
        condition: Option<&Expr>,
    ) -> Result<Vec<Row>> {
        let mut out = Vec::new();
        let mut right_matched = vec![false; right.len()];

        for l in &left {
            self.check_deadline()?;
            let mut matched = false;
            for (j, r) in right.iter().enumerate() {
                let combined: Row = l.iter().chain(r).cloned().collect();
                let hit = match condition {
                    Some(c) => truthy(&eval(c, &combined)?) == Some(true),
                    None => true,
                };
                if !hit {
                    continue;
                }
                matched = true;
                right_matched[j] = true;
                match kind {
                    JoinKind::Semi | JoinKind::Anti => break,
                    _ => out.push(combined),
                }
            }

            match kind {
                JoinKind::Semi if matched => out.push(l.clone()),
                JoinKind::Anti if !matched => out.push(l.clone()),
                JoinKind::Left | JoinKind::Full if !matched => {
                    let mut row = l.clone();
                    row.extend(std::iter::repeat(Value::Null).take(right_width));
                    out.push(row);
                }
                _ => {}
            }
        }

        if matches!(kind, JoinKind::Right | JoinKind::Full) {
            for (r, _) in right.iter().zip(&right_matched).filter(|(_, m)| !**m) {
                let mut row = vec![Value::Null; left_width];
                row.extend(r.iter().cloned());
                out.push(row);
            }
        }
        Ok(out)
    }

    fn write(&self, op: WriteOp, table: &str, fields: &[Field], rows: Vec<Row>) -> Result<usize> {
        let columns: Vec<String> = fields.iter().map(|f| f.name.clone()).collect();
        let count = match op {
            WriteOp::CreateTableAs => {
                let schema = TableSchema::new(
                    table,
                    fields
                        .iter()
                        .map(|f| ColumnDef::new(f.name.clone(), stored_type(f.data_type)))
                        .collect(),
                );
                let types: Vec<DataType> = schema.columns.iter().map(|c| c.data_type).collect();
                let rows = rows
                    .into_iter()
                    .map(|row| {
                        row.iter()
                            .zip(&types)
                            .map(|(v, t)| cast_value(v, *t))
                            .collect::<Result<Row>>()
                    })
                    .collect::<Result<Vec<_>>>()?;
                self.db.create_table_as(schema, rows)?
            }
            WriteOp::Insert => self.db.insert(table, &columns, rows)?,
            WriteOp::Delete => self.db.delete(table, &columns, &rows)?,
        };
        debug!(table, op = ?op, rows = count, "Applied write");
        Ok(count)
    }
}

/// Column type a created table stores for an output type.
fn stored_type(data_type: DataType) -> DataType {
    match data_type {
        DataType::Null => DataType::Int32,
        other => other,
    }
}

fn compare_keys(a: &[Value], b: &[Value], keys: &[SortKey]) -> Ordering {
    for ((x, y), key) in a.iter().zip(b).zip(keys) {
        let ordering = match (x.is_null(), y.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if key.nulls_first => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, true) if key.nulls_first => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let o = x.sql_cmp(y).unwrap_or(Ordering::Equal);
                if key.ascending {
                    o
                } else {
                    o.reverse()
                }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn sort(rows: Vec<Row>, keys: &[SortKey]) -> Result<Vec<Row>> {
    let mut keyed = rows
        .into_iter()
        .map(|row| {
            let k = keys.iter().map(|k| eval(&k.expr, &row)).collect::<Result<Row>>()?;
            Ok((k, row))
        })
        .collect::<Result<Vec<_>>>()?;
    // stable, so ties keep input order
    keyed.sort_by(|(a, _), (b, _)| compare_keys(a, b, keys));
    Ok(keyed.into_iter().map(|(_, row)| row).collect())
}

fn set_operation(left: Vec<Row>, right: Vec<Row>, op: SetOp, all: bool) -> Vec<Row> {
    let mut out = match (op, all) {
        (SetOp::Union, _) => left.into_iter().chain(right).collect(),
        (SetOp::Intersect, _) | (SetOp::Except, _) => {
            let mut counts: HashMap<Row, usize> = HashMap::new();
            for row in right {
                *counts.entry(row).or_default() += 1;
            }
            let keep_found = op == SetOp::Intersect;
            left.into_iter()
                .filter(|row| {
                    let found = match counts.get_mut(row) {
                        Some(n) if *n > 0 => {
                            if all {
                                *n -= 1;
                            }
                            true
                        }
                        _ => false,
                    };
                    found == keep_found
                })
                .collect::<Vec<_>>()
        }
    };
    if !all {
        let mut seen = HashSet::new();
        out.retain(|row| seen.insert(row.clone()));
    }
    out
}

enum State {
    Count(i64),
    SumInt(Option<i64>),
    SumDecimal(Option<i128>, u8),
    SumFloat(Option<f64>),
    Avg { sum: f64, count: i64 },
    Min(Option<Value>),
    Max(Option<Value>),
    First(Option<Value>),
}

struct Accumulator<'e> {
    expr: &'e AggregateExpr,
    seen: HashSet<Row>,
    state: State,
}

impl<'e> Accumulator<'e> {
    fn new(expr: &'e AggregateExpr) -> Result<Self> {
        let state = match (expr.function.as_str(), expr.return_type) {
            ("count" | "count_star", _) => State::Count(0),
            ("sum", DataType::Decimal { scale, .. }) => State::SumDecimal(None, scale),
            ("sum", t) if t.is_integer() => State::SumInt(None),
            ("sum", _) => State::SumFloat(None),
            ("avg", _) => State::Avg { sum: 0.0, count: 0 },
            ("min", _) => State::Min(None),
            ("max", _) => State::Max(None),
            ("first", _) => State::First(None),
            (other, _) => {
                return Err(ExecutionError::Internal(format!("unknown aggregate {}", other)))
            }
        };
        Ok(Self {
            expr,
            seen: HashSet::new(),
            state,
        })
    }

    fn update(&mut self, row: &[Value]) -> Result<()> {
        let expr = self.expr;
        let args = expr
            .args
            .iter()
            .map(|a| eval(a, row))
            .collect::<Result<Row>>()?;
        if args.iter().any(Value::is_null) {
            return Ok(());
        }
        if expr.distinct && !self.seen.insert(args.clone()) {
            return Ok(());
        }
        let overflow = || ExecutionError::Overflow(format!("{} overflowed", expr.function));

        match (&mut self.state, args.first()) {
            (State::Count(n), _) => *n += 1,
            (State::SumInt(sum), Some(v)) => {
                let x = v.as_i64().ok_or_else(overflow)?;
                *sum = Some(sum.unwrap_or(0).checked_add(x).ok_or_else(overflow)?);
            }
            (State::SumDecimal(sum, scale), Some(v)) => {
                let x = v.as_scaled(*scale).ok_or_else(overflow)?;
                *sum = Some(sum.unwrap_or(0).checked_add(x).ok_or_else(overflow)?);
            }
            (State::SumFloat(sum), Some(v)) => {
                *sum = Some(sum.unwrap_or(0.0) + v.as_f64().unwrap_or(0.0));
            }
            (State::Avg { sum, count }, Some(v)) => {
                *sum += v.as_f64().unwrap_or(0.0);
                *count += 1;
            }
            (State::Min(current), Some(v)) => {
                if current.as_ref().map_or(true, |c| v.sql_cmp(c) == Some(Ordering::Less)) {
                    *current = Some(v.clone());
                }
            }
            (State::Max(current), Some(v)) => {
                if current.as_ref().map_or(true, |c| v.sql_cmp(c) == Some(Ordering::Greater)) {
                    *current = Some(v.clone());
                }
            }
            (State::First(current), Some(v)) => {
                if current.is_none() {
                    *current = Some(v.clone());
                }
            }
            (_, None) => {}
        }
        Ok(())
    }

    fn finish(self) -> Value {
        match self.state {
            State::Count(n) => Value::Int64(n),
            State::SumInt(sum) => sum.map_or(Value::Null, Value::Int64),
            State::SumDecimal(sum, scale) => {
                sum.map_or(Value::Null, |value| Value::Decimal { value, scale })
            }
            State::SumFloat(sum) => sum.map_or(Value::Null, Value::Float64),
            State::Avg { count: 0, .. } => Value::Null,
            State::Avg { sum, count } => Value::Float64(sum / count as f64),
            State::Min(v) | State::Max(v) | State::First(v) => v.unwrap_or(Value::Null),
        }
    }
}

fn new_group(aggregates: &[AggregateExpr], key: Row) -> Result<(Row, Vec<Accumulator<'_>>)> {
    let accumulators = aggregates.iter().map(Accumulator::new).collect::<Result<_>>()?;
    Ok((key, accumulators))
}

/// Hash aggregation; groups come out in order of first appearance.
fn aggregate(rows: Vec<Row>, group_by: &[Expr], aggregates: &[AggregateExpr]) -> Result<Vec<Row>> {
    let mut index: HashMap<Row, usize> = HashMap::new();
    let mut groups: Vec<(Row, Vec<Accumulator>)> = Vec::new();

    for row in &rows {
        let key = group_by.iter().map(|e| eval(e, row)).collect::<Result<Row>>()?;
        let slot = match index.get(&key) {
            Some(slot) => *slot,
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(new_group(aggregates, key)?);
                groups.len() - 1
            }
        };
        for accumulator in &mut groups[slot].1 {
            accumulator.update(row)?;
        }
    }

    if groups.is_empty() && group_by.is_empty() {
        groups.push(new_group(aggregates, Vec::new())?);
    }

    Ok(groups
        .into_iter()
        .map(|(mut key, accumulators)| {
            key.extend(accumulators.into_iter().map(Accumulator::finish));
            key
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(rows: Vec<Vec<Value>>) -> LogicalPlan {
        let fields = rows[0]
            .iter()
            .enumerate()
            .map(|(i, v)| Field::new(format!("col{}", i), v.data_type(), true))
            .collect();
        LogicalPlan::Values {
            fields,
            rows: rows
                .into_iter()
                .map(|r| r.into_iter().map(Expr::literal).collect())
                .collect(),
        }
    }

    fn run(plan: &LogicalPlan) -> Vec<Row> {
        let db = Database::new();
        let budget = ExecutionBudget::unlimited();
        Executor::new(&db, &budget).execute(plan).unwrap()
    }

    fn int(v: i32) -> Value {
        Value::Int32(v)
    }

    #[test]
    fn test_sort_nulls_and_stability() {
        let input = values(vec![
            vec![int(2), Value::Varchar("a".into())],
            vec![Value::Null, Value::Varchar("b".into())],
            vec![int(1), Value::Varchar("c".into())],
            vec![int(2), Value::Varchar("d".into())],
        ]);
        let plan = LogicalPlan::Sort {
            input: Box::new(input),
            keys: vec![SortKey {
                expr: Expr::column(0, DataType::Int32),
                ascending: true,
                nulls_first: false,
            }],
        };
        let labels: Vec<Value> = run(&plan).into_iter().map(|r| r[1].clone()).collect();
        assert_eq!(
            labels,
            ["c", "a", "d", "b"].iter().map(|s| Value::Varchar(s.to_string())).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_left_and_anti_joins() {
        let left = values(vec![vec![int(1)], vec![int(2)], vec![int(3)]]);
        let right = values(vec![vec![int(2)], vec![int(3)], vec![int(3)]]);
        let condition = Expr::function(
            "equal",
            vec![Expr::column(0, DataType::Int32), Expr::column(1, DataType::Int32)],
            DataType::Boolean,
        );

        let join = |kind| LogicalPlan::Join {
            left: Box::new(left.clone()),
            right: Box::new(right.clone()),
            kind,
            condition: Some(condition.clone()),
        };

        let rows = run(&join(JoinKind::Left));
        assert_eq!(
            rows,
            vec![
                vec![int(1), Value::Null],
                vec![int(2), int(2)],
                vec![int(3), int(3)],
                vec![int(3), int(3)],
            ]
        );
        assert_eq!(run(&join(JoinKind::Anti)), vec![vec![int(1)]]);
        assert_eq!(run(&join(JoinKind::Semi)), vec![vec![int(2)], vec![int(3)]]);
    }

    #[test]
    fn test_global_aggregate_over_empty_input() {
        let input = LogicalPlan::Filter {
            input: Box::new(values(vec![vec![int(1)]])),
            predicate: Expr::literal(Value::Boolean(false)),
        };
        let plan = LogicalPlan::Aggregate {
            input: Box::new(input),
            group_by: vec![],
            aggregates: vec![
                AggregateExpr {
                    function: "count_star".into(),
                    args: vec![],
                    distinct: false,
                    return_type: DataType::Int64,
                },
                AggregateExpr {
                    function: "sum".into(),
                    args: vec![Expr::column(0, DataType::Int32)],
                    distinct: false,
                    return_type: DataType::Int64,
                },
            ],
        };
        assert_eq!(run(&plan), vec![vec![Value::Int64(0), Value::Null]]);
    }

    #[test]
    fn test_grouped_distinct_count() {
        let input = values(vec![
            vec![int(1), int(10)],
            vec![int(2), int(20)],
            vec![int(1), int(10)],
            vec![int(1), int(30)],
        ]);
        let plan = LogicalPlan::Aggregate {
            input: Box::new(input),
            group_by: vec![Expr::column(0, DataType::Int32)],
            aggregates: vec![AggregateExpr {
                function: "count".into(),
                args: vec![Expr::column(1, DataType::Int32)],
                distinct: true,
                return_type: DataType::Int64,
            }],
        };
        assert_eq!(
            run(&plan),
            vec![vec![int(1), Value::Int64(2)], vec![int(2), Value::Int64(1)]]
        );
    }

    #[test]
    fn test_set_operations() {
        let a = vec![vec![int(1)], vec![int(2)], vec![int(2)], vec![int(3)]];
        let b = vec![vec![int(2)], vec![int(4)]];
        assert_eq!(
            set_operation(a.clone(), b.clone(), SetOp::Union, false),
            vec![vec![int(1)], vec![int(2)], vec![int(3)], vec![int(4)]]
        );
        assert_eq!(set_operation(a.clone(), b.clone(), SetOp::Union, true).len(), 6);
        assert_eq!(set_operation(a.clone(), b.clone(), SetOp::Intersect, false), vec![vec![int(2)]]);
        assert_eq!(
            set_operation(a, b, SetOp::Except, false),
            vec![vec![int(1)], vec![int(3)]]
        );
    }

    #[test]
    fn test_row_budget() {
        let db = Database::new();
        let budget = ExecutionBudget::unlimited().with_max_rows(1);
        let result = Executor::new(&db, &budget).execute(&values(vec![vec![int(1)], vec![int(2)]]));
        assert!(matches!(result, Err(ExecutionError::BudgetExceeded(_))));
    }
}
