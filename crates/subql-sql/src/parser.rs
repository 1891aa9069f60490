//! Pest-based parser for the SQL dialect

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use thiserror::Error;

use crate::ast::*;

#[derive(Parser)]
#[grammar = "sql.pest"]
pub struct SqlParser;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Pest error: {0}")]
    Pest(#[from] pest::error::Error<Rule>),
}

/// Parse a script of `;`-separated statements.
pub fn parse(source: &str) -> Result<Vec<Statement>, ParseError> {
    let mut pairs = SqlParser::parse(Rule::script, source)?;
    let script = pairs
        .next()
        .ok_or_else(|| ParseError::Syntax("Empty input".to_string()))?;

    let mut statements = Vec::new();
    for pair in script.into_inner() {
        match pair.as_rule() {
            Rule::EOI => {}
            _ => statements.push(parse_statement(pair)?),
        }
    }
    Ok(statements)
}

/// Parse source text that must contain exactly one statement.
pub fn parse_one(source: &str) -> Result<Statement, ParseError> {
    let mut statements = parse(source)?;
    match statements.len() {
        1 => Ok(statements.remove(0)),
        0 => Err(ParseError::Syntax("No statement found".to_string())),
        n => Err(ParseError::Syntax(format!("Expected a single statement, found {}", n))),
    }
}

fn is_ident(rule: Rule) -> bool {
    matches!(rule, Rule::bare_ident | Rule::quoted_ident)
}

fn ident_text(pair: &Pair<Rule>) -> String {
    let text = pair.as_str();
    match pair.as_rule() {
        Rule::quoted_ident => text[1..text.len() - 1].to_string(),
        _ => text.to_string(),
    }
}

fn find<'i>(pair: &Pair<'i, Rule>, rule: Rule) -> Option<Pair<'i, Rule>> {
    pair.clone().into_inner().find(|p| p.as_rule() == rule)
}

fn has(pair: &Pair<Rule>, rule: Rule) -> bool {
    find(pair, rule).is_some()
}

fn required<'i>(pair: &Pair<'i, Rule>, rule: Rule) -> Result<Pair<'i, Rule>, ParseError> {
    find(pair, rule).ok_or_else(|| {
        ParseError::Syntax(format!("Expected {:?} in {:?}", rule, pair.as_rule()))
    })
}

fn idents(pair: &Pair<Rule>) -> Vec<String> {
    pair.clone()
        .into_inner()
        .filter(|p| is_ident(p.as_rule()))
        .map(|p| ident_text(&p))
        .collect()
}

fn first_ident(pair: &Pair<Rule>) -> Result<String, ParseError> {
    idents(pair)
        .into_iter()
        .next()
        .ok_or_else(|| ParseError::Syntax(format!("Missing identifier in {:?}", pair.as_rule())))
}

fn parse_u64(pair: &Pair<Rule>) -> Result<u64, ParseError> {
    pair.as_str()
        .parse()
        .map_err(|_| ParseError::Syntax(format!("Invalid integer: {}", pair.as_str())))
}

fn parse_statement(pair: Pair<Rule>) -> Result<Statement, ParseError> {
    match pair.as_rule() {
        Rule::query => Ok(Statement::Query(parse_query(pair)?)),
        Rule::create_table_as => Ok(Statement::CreateTableAs {
            name: first_ident(&pair)?,
            query: parse_query(required(&pair, Rule::query)?)?,
        }),
        Rule::create_table => parse_create_table(pair),
        Rule::insert_stmt => Ok(Statement::Insert {
            table: first_ident(&pair)?,
            columns: find(&pair, Rule::insert_columns)
                .and_then(|cols| find(&cols, Rule::ident_list))
                .map(|list| idents(&list)),
            source: parse_query(required(&pair, Rule::query)?)?,
        }),
        Rule::delete_stmt => Ok(Statement::Delete {
            table: first_ident(&pair)?,
            selection: find(&pair, Rule::where_clause)
                .map(|w| parse_expr(required(&w, Rule::expr)?))
                .transpose()?,
        }),
        Rule::drop_table => Ok(Statement::DropTable {
            name: first_ident(&pair)?,
            if_exists: has(&pair, Rule::if_exists),
        }),
        other => Err(ParseError::Syntax(format!("Unknown statement: {:?}", other))),
    }
}

fn parse_create_table(pair: Pair<Rule>) -> Result<Statement, ParseError> {
    let name = first_ident(&pair)?;
    let if_not_exists = has(&pair, Rule::if_not_exists);

    let mut columns = Vec::new();
    let mut primary_key = Vec::new();
    for element in pair.into_inner() {
        match element.as_rule() {
            Rule::column_def => columns.push(parse_column_def(element)?),
            Rule::table_primary_key => {
                let list = required(&element, Rule::ident_list)?;
                primary_key.extend(idents(&list));
            }
            _ => {}
        }
    }

    for key in &primary_key {
        let column = columns
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(key))
            .ok_or_else(|| ParseError::Syntax(format!("Primary key column {} is not defined", key)))?;
        column.primary_key = true;
        column.not_null = true;
    }

    Ok(Statement::CreateTable {
        name,
        columns,
        if_not_exists,
    })
}

fn parse_column_def(pair: Pair<Rule>) -> Result<ColumnSpec, ParseError> {
    let name = first_ident(&pair)?;
    let type_name = parse_type_name(required(&pair, Rule::type_name)?)?;
    let primary_key = has(&pair, Rule::primary_key);
    Ok(ColumnSpec {
        name,
        type_name,
        not_null: primary_key || has(&pair, Rule::not_null),
        primary_key,
    })
}

fn parse_type_name(pair: Pair<Rule>) -> Result<TypeName, ParseError> {
    let mut name = String::new();
    let mut params = Vec::new();
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::type_word => name = part.as_str().to_lowercase(),
            Rule::integer => params.push(
                part.as_str()
                    .parse()
                    .map_err(|_| ParseError::Syntax(format!("Invalid type parameter: {}", part.as_str())))?,
            ),
            _ => {}
        }
    }
    Ok(TypeName { name, params })
}

fn parse_query(pair: Pair<Rule>) -> Result<Query, ParseError> {
    let mut body = None;
    let mut order_by = Vec::new();
    let mut limit = None;
    let mut offset = None;

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::query_body => body = Some(parse_query_body(part)?),
            Rule::order_by => {
                order_by = part
                    .into_inner()
                    .filter(|p| p.as_rule() == Rule::order_item)
                    .map(parse_order_item)
                    .collect::<Result<_, _>>()?;
            }
            Rule::limit_clause => {
                let numbers: Vec<_> = part
                    .into_inner()
                    .filter(|p| p.as_rule() == Rule::integer)
                    .collect();
                if let Some(n) = numbers.first() {
                    limit = Some(parse_u64(n)?);
                }
                if let Some(n) = numbers.get(1) {
                    offset = Some(parse_u64(n)?);
                }
            }
            _ => {}
        }
    }

    Ok(Query {
        body: body.ok_or_else(|| ParseError::Syntax("Missing query body".to_string()))?,
        order_by,
        limit,
        offset,
    })
}

fn parse_query_body(pair: Pair<Rule>) -> Result<QueryBody, ParseError> {
    let mut inner = pair.into_inner();
    let first = inner
        .next()
        .ok_or_else(|| ParseError::Syntax("Empty query".to_string()))?;
    let mut body = parse_query_term(first)?;

    while let Some(op_pair) = inner.next() {
        let op = if has(&op_pair, Rule::UNION) {
            SetOperator::Union
        } else if has(&op_pair, Rule::INTERSECT) {
            SetOperator::Intersect
        } else {
            SetOperator::Except
        };
        let all = has(&op_pair, Rule::ALL);
        let right = inner
            .next()
            .ok_or_else(|| ParseError::Syntax("Missing right side of set operation".to_string()))?;

        body = QueryBody::SetOperation {
            op,
            all,
            left: Box::new(body),
            right: Box::new(parse_query_term(right)?),
        };
    }

    Ok(body)
}

fn parse_query_term(pair: Pair<Rule>) -> Result<QueryBody, ParseError> {
    match pair.as_rule() {
        Rule::select_core => Ok(QueryBody::Select(Box::new(parse_select(pair)?))),
        Rule::values_clause => {
            let rows = pair
                .into_inner()
                .filter(|p| p.as_rule() == Rule::row)
                .map(|row| row.into_inner().map(parse_expr).collect::<Result<Vec<_>, _>>())
                .collect::<Result<Vec<_>, _>>()?;
            Ok(QueryBody::Values(rows))
        }
        Rule::nested_query => Ok(QueryBody::Nested(Box::new(parse_query(required(
            &pair,
            Rule::query,
        )?)?))),
        other => Err(ParseError::Syntax(format!("Invalid query term: {:?}", other))),
    }
}

fn parse_select(pair: Pair<Rule>) -> Result<Select, ParseError> {
    let mut select = Select {
        distinct: false,
        items: Vec::new(),
        from: Vec::new(),
        selection: None,
        group_by: Vec::new(),
        having: None,
    };

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::DISTINCT => select.distinct = true,
            Rule::select_list => {
                select.items = part
                    .into_inner()
                    .map(parse_select_item)
                    .collect::<Result<_, _>>()?;
            }
            Rule::from_clause => {
                select.from = part
                    .into_inner()
                    .filter(|p| p.as_rule() == Rule::table_ref)
                    .map(parse_table_ref)
                    .collect::<Result<_, _>>()?;
            }
            Rule::where_clause => select.selection = Some(parse_expr(required(&part, Rule::expr)?)?),
            Rule::group_by => {
                select.group_by = part
                    .into_inner()
                    .filter(|p| p.as_rule() == Rule::expr)
                    .map(parse_expr)
                    .collect::<Result<_, _>>()?;
            }
            Rule::having => select.having = Some(parse_expr(required(&part, Rule::expr)?)?),
            _ => {}
        }
    }

    Ok(select)
}

fn parse_select_item(pair: Pair<Rule>) -> Result<SelectItem, ParseError> {
    let mut inner = pair.into_inner();
    let first = inner
        .next()
        .ok_or_else(|| ParseError::Syntax("Empty select item".to_string()))?;

    match first.as_rule() {
        Rule::star => Ok(SelectItem::Wildcard),
        Rule::qualified_star => Ok(SelectItem::QualifiedWildcard(first_ident(&first)?)),
        Rule::expr => {
            let expr = parse_expr(first)?;
            match inner.find(|p| is_ident(p.as_rule())) {
                Some(alias) => Ok(SelectItem::Aliased {
                    expr,
                    alias: ident_text(&alias),
                }),
                None => Ok(SelectItem::Expr(expr)),
            }
        }
        _ => Err(ParseError::Syntax("Invalid select item".to_string())),
    }
}

fn parse_table_ref(pair: Pair<Rule>) -> Result<TableRef, ParseError> {
    let mut factor = None;
    let mut joins = Vec::new();
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::table_factor => factor = Some(parse_table_factor(part)?),
            Rule::join_clause => joins.push(parse_join(part)?),
            _ => {}
        }
    }
    Ok(TableRef {
        factor: factor.ok_or_else(|| ParseError::Syntax("Missing table".to_string()))?,
        joins,
    })
}

fn parse_join(pair: Pair<Rule>) -> Result<Join, ParseError> {
    let join_type = match find(&pair, Rule::join_kind) {
        Some(kind) if has(&kind, Rule::LEFT) => JoinType::Left,
        Some(kind) if has(&kind, Rule::RIGHT) => JoinType::Right,
        Some(kind) if has(&kind, Rule::FULL) => JoinType::Full,
        Some(kind) if has(&kind, Rule::CROSS) => JoinType::Cross,
        _ => JoinType::Inner,
    };
    Ok(Join {
        join_type,
        factor: parse_table_factor(required(&pair, Rule::table_factor)?)?,
        on: find(&pair, Rule::expr).map(parse_expr).transpose()?,
    })
}

fn parse_table_factor(pair: Pair<Rule>) -> Result<TableFactor, ParseError> {
    let alias = find(&pair, Rule::table_alias)
        .map(|a| -> Result<TableAlias, ParseError> {
            Ok(TableAlias {
                name: first_ident(&a)?,
                columns: find(&a, Rule::ident_list).map(|l| idents(&l)).unwrap_or_default(),
            })
        })
        .transpose()?;

    if let Some(nested) = find(&pair, Rule::nested_query) {
        return Ok(TableFactor::Derived {
            subquery: Box::new(parse_query(required(&nested, Rule::query)?)?),
            alias,
        });
    }
    Ok(TableFactor::Table {
        name: first_ident(&pair)?,
        alias,
    })
}

fn parse_order_item(pair: Pair<Rule>) -> Result<OrderItem, ParseError> {
    let nulls_first = if has(&pair, Rule::NULLS) {
        Some(has(&pair, Rule::FIRST))
    } else {
        None
    };
    Ok(OrderItem {
        expr: parse_expr(required(&pair, Rule::expr)?)?,
        desc: has(&pair, Rule::DESC),
        nulls_first,
    })
}

fn fold_binary(
    pair: Pair<Rule>,
    op_for: impl Fn(&Pair<Rule>) -> Option<BinOp>,
    fixed: Option<BinOp>,
) -> Result<Expr, ParseError> {
    let mut left: Option<Expr> = None;
    let mut pending = fixed;

    for part in pair.into_inner() {
        if let Some(op) = op_for(&part) {
            pending = Some(op);
            continue;
        }
        if matches!(part.as_rule(), Rule::OR | Rule::AND) {
            continue;
        }
        let right = parse_expr(part)?;
        left = Some(match left {
            None => right,
            Some(l) => {
                let op = pending
                    .ok_or_else(|| ParseError::Syntax("Missing operator".to_string()))?;
                Expr::BinaryOp {
                    op,
                    left: Box::new(l),
                    right: Box::new(right),
                }
            }
        });
    }

    left.ok_or_else(|| ParseError::Syntax("Empty expression".to_string()))
}

fn parse_expr(pair: Pair<Rule>) -> Result<Expr, ParseError> {
    match pair.as_rule() {
        Rule::expr | Rule::paren_expr => {
            let inner = pair
                .into_inner()
                .next()
                .ok_or_else(|| ParseError::Syntax("Empty expression".to_string()))?;
            let expr = parse_expr(inner)?;
            Ok(expr)
        }
        Rule::or_expr => fold_binary(pair, |_| None, Some(BinOp::Or)),
        Rule::and_expr => fold_binary(pair, |_| None, Some(BinOp::And)),
        Rule::concat_expr => fold_binary(pair, |_| None, Some(BinOp::Concat)),
        Rule::additive => fold_binary(
            pair,
            |p| match (p.as_rule(), p.as_str()) {
                (Rule::add_op, "+") => Some(BinOp::Add),
                (Rule::add_op, _) => Some(BinOp::Sub),
                _ => None,
            },
            None,
        ),
        Rule::multiplicative => fold_binary(
            pair,
            |p| match (p.as_rule(), p.as_str()) {
                (Rule::mul_op, "*") => Some(BinOp::Mul),
                (Rule::mul_op, "/") => Some(BinOp::Div),
                (Rule::mul_op, _) => Some(BinOp::Mod),
                _ => None,
            },
            None,
        ),
        Rule::not_expr => {
            let mut negations = 0;
            let mut expr = None;
            for part in pair.into_inner() {
                match part.as_rule() {
                    Rule::not_op => negations += 1,
                    _ => expr = Some(parse_expr(part)?),
                }
            }
            let mut expr = expr.ok_or_else(|| ParseError::Syntax("Missing operand of NOT".to_string()))?;
            for _ in 0..negations {
                expr = Expr::UnaryOp {
                    op: UnOp::Not,
                    expr: Box::new(expr),
                };
            }
            Ok(expr)
        }
        Rule::predicate => parse_predicate(pair),
        Rule::unary => {
            let mut negations = 0;
            let mut expr = None;
            for part in pair.into_inner() {
                match part.as_rule() {
                    Rule::neg_op => negations += 1,
                    _ => expr = Some(parse_expr(part)?),
                }
            }
            let mut expr = expr.ok_or_else(|| ParseError::Syntax("Missing operand of -".to_string()))?;
            for _ in 0..negations {
                expr = Expr::UnaryOp {
                    op: UnOp::Neg,
                    expr: Box::new(expr),
                };
            }
            Ok(expr)
        }
        Rule::postfix => {
            let mut inner = pair.into_inner();
            let primary = inner
                .next()
                .ok_or_else(|| ParseError::Syntax("Empty expression".to_string()))?;
            let mut expr = parse_expr(primary)?;
            for type_pair in inner {
                expr = Expr::Cast {
                    expr: Box::new(expr),
                    type_name: parse_type_name(type_pair)?,
                };
            }
            Ok(expr)
        }
        Rule::number => Ok(Expr::Literal(Literal::Number(pair.as_str().to_string()))),
        Rule::string => Ok(Expr::Literal(Literal::String(unquote(pair.as_str())))),
        Rule::boolean => Ok(Expr::Literal(Literal::Bool(has(&pair, Rule::TRUE)))),
        Rule::null_lit => Ok(Expr::Literal(Literal::Null)),
        Rule::typed_literal => {
            let text = unquote(required(&pair, Rule::string)?.as_str());
            if has(&pair, Rule::DATE) {
                Ok(Expr::Literal(Literal::Date(text)))
            } else {
                Ok(Expr::Literal(Literal::Timestamp(text)))
            }
        }
        Rule::case_expr => parse_case(pair),
        Rule::cast_expr => Ok(Expr::Cast {
            expr: Box::new(parse_expr(required(&pair, Rule::expr)?)?),
            type_name: parse_type_name(required(&pair, Rule::type_name)?)?,
        }),
        Rule::function_call => parse_func_call(pair),
        Rule::column_ref => parse_col_ref(pair),
        other => Err(ParseError::Syntax(format!("Cannot parse expr: {:?}", other))),
    }
}

fn parse_predicate(pair: Pair<Rule>) -> Result<Expr, ParseError> {
    let mut inner = pair.into_inner();
    let left = parse_expr(
        inner
            .next()
            .ok_or_else(|| ParseError::Syntax("Empty predicate".to_string()))?,
    )?;
    let Some(tail) = inner.next() else {
        return Ok(left);
    };

    let negated = has(&tail, Rule::NOT);
    let operands: Vec<Pair<Rule>> = tail
        .clone()
        .into_inner()
        .filter(|p| matches!(p.as_rule(), Rule::concat_expr | Rule::expr))
        .collect();
    let operand = |i: usize| -> Result<Box<Expr>, ParseError> {
        let pair = operands
            .get(i)
            .cloned()
            .ok_or_else(|| ParseError::Syntax("Missing operand".to_string()))?;
        Ok(Box::new(parse_expr(pair)?))
    };
    let left = Box::new(left);

    match tail.as_rule() {
        Rule::comparison => {
            let op = match required(&tail, Rule::comp_op)?.as_str() {
                "=" | "==" => BinOp::Eq,
                "<>" | "!=" => BinOp::Ne,
                "<" => BinOp::Lt,
                "<=" => BinOp::Le,
                ">" => BinOp::Gt,
                _ => BinOp::Ge,
            };
            Ok(Expr::BinaryOp {
                op,
                left,
                right: operand(0)?,
            })
        }
        Rule::is_null_test => Ok(Expr::IsNull { expr: left, negated }),
        Rule::between_test => Ok(Expr::Between {
            expr: left,
            low: operand(0)?,
            high: operand(1)?,
            negated,
        }),
        Rule::in_test => Ok(Expr::InList {
            expr: left,
            list: operands
                .iter()
                .cloned()
                .map(parse_expr)
                .collect::<Result<_, _>>()?,
            negated,
        }),
        Rule::like_test => Ok(Expr::Like {
            expr: left,
            pattern: operand(0)?,
            negated,
        }),
        other => Err(ParseError::Syntax(format!("Unknown predicate: {:?}", other))),
    }
}

fn parse_case(pair: Pair<Rule>) -> Result<Expr, ParseError> {
    let mut operand = None;
    let mut branches = Vec::new();
    let mut else_result = None;

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::case_operand => {
                operand = Some(Box::new(parse_expr(required(&part, Rule::expr)?)?));
            }
            Rule::when_clause => {
                let exprs: Vec<_> = part
                    .into_inner()
                    .filter(|p| p.as_rule() == Rule::expr)
                    .collect();
                let [condition, result] = <[Pair<Rule>; 2]>::try_from(exprs)
                    .map_err(|_| ParseError::Syntax("Malformed WHEN clause".to_string()))?;
                branches.push((parse_expr(condition)?, parse_expr(result)?));
            }
            Rule::else_clause => {
                else_result = Some(Box::new(parse_expr(required(&part, Rule::expr)?)?));
            }
            _ => {}
        }
    }

    Ok(Expr::Case {
        operand,
        branches,
        else_result,
    })
}

fn parse_col_ref(pair: Pair<Rule>) -> Result<Expr, ParseError> {
    let parts = idents(&pair);

    let (table, column) = match parts.as_slice() {
        [column] => (None, column.clone()),
        [table, column] => (Some(table.clone()), column.clone()),
        _ => return Err(ParseError::Syntax(format!("Invalid column reference: {}", pair.as_str()))),
    };

    Ok(Expr::Column(ColumnRef { table, column }))
}

fn parse_func_call(pair: Pair<Rule>) -> Result<Expr, ParseError> {
    let name = first_ident(&pair)?.to_lowercase();
    let star = has(&pair, Rule::star);
    let distinct = has(&pair, Rule::DISTINCT);

    let args = pair
        .into_inner()
        .filter(|p| p.as_rule() == Rule::expr)
        .map(parse_expr)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Expr::FuncCall(FuncCall {
        name,
        args,
        distinct,
        star,
    }))
}

fn unquote(text: &str) -> String {
    text[1..text.len() - 1].replace("''", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_query() {
        let stmt = parse_one("SELECT * FROM integers LIMIT 5").unwrap();
        let Statement::Query(query) = stmt else {
            panic!("expected query");
        };
        assert_eq!(query.limit, Some(5));
        let QueryBody::Select(select) = query.body else {
            panic!("expected select");
        };
        assert_eq!(select.items, vec![SelectItem::Wildcard]);
        assert_eq!(select.from.len(), 1);
    }

    #[test]
    fn test_parse_case_when_precedence() {
        let stmt = parse_one(
            "SELECT name, CASE WHEN salary > 100000 THEN 'HIGH' \
             WHEN salary BETWEEN 60000 AND 100000 THEN 'Medium' ELSE 'Low' END AS category \
             FROM employees",
        )
        .unwrap();
        let Statement::Query(Query { body: QueryBody::Select(select), .. }) = stmt else {
            panic!("expected select");
        };
        let SelectItem::Aliased { expr: Expr::Case { branches, else_result, .. }, alias } = &select.items[1] else {
            panic!("expected aliased CASE");
        };
        assert_eq!(alias, "category");
        assert_eq!(branches.len(), 2);
        assert!(matches!(branches[1].0, Expr::Between { negated: false, .. }));
        assert!(else_result.is_some());
    }

    #[test]
    fn test_parse_join_and_union() {
        let stmt = parse_one(
            "SELECT e.name, d.name AS department_name FROM employees e \
             JOIN departments d ON e.department_id = d.department_id",
        )
        .unwrap();
        let Statement::Query(Query { body: QueryBody::Select(select), .. }) = stmt else {
            panic!("expected select");
        };
        assert_eq!(select.from[0].joins.len(), 1);
        assert_eq!(select.from[0].joins[0].join_type, JoinType::Inner);

        let stmt = parse_one(
            "SELECT name, salary FROM employees UNION ALL \
             SELECT name, hourly_rate * 2000 FROM part_time_employees ORDER BY salary DESC",
        )
        .unwrap();
        let Statement::Query(query) = stmt else {
            panic!("expected query");
        };
        assert!(matches!(query.body, QueryBody::SetOperation { op: SetOperator::Union, all: true, .. }));
        assert!(query.order_by[0].desc);
    }

    #[test]
    fn test_parse_ddl_and_dml() {
        let statements = parse(
            "CREATE TABLE employees (employee_id INTEGER PRIMARY KEY, name VARCHAR(100), salary DECIMAL(10,2));
             INSERT INTO employees VALUES (1, 'John Doe', 120000);
             CREATE TABLE rich AS SELECT * FROM employees WHERE salary > 80000;
             DELETE FROM employees WHERE employee_id = 1;
             DROP TABLE IF EXISTS rich;",
        )
        .unwrap();
        assert_eq!(statements.len(), 5);

        let Statement::CreateTable { columns, .. } = &statements[0] else {
            panic!("expected create table");
        };
        assert!(columns[0].primary_key);
        assert_eq!(columns[2].type_name.params, vec![10, 2]);
        assert!(matches!(statements[1], Statement::Insert { columns: None, .. }));
        assert!(matches!(statements[2], Statement::CreateTableAs { .. }));
        assert!(matches!(statements[3], Statement::Delete { selection: Some(_), .. }));
        assert!(matches!(statements[4], Statement::DropTable { if_exists: true, .. }));
    }

    #[test]
    fn test_parse_drop_table() {
        let stmt = parse_one("Drop Table integers").unwrap();
        let Statement::DropTable { name, if_exists } = stmt else {
            panic!("expected drop table");
        };
        assert_eq!(name, "integers");
        assert!(!if_exists);

        assert!(parse_one("SELECT dropped FROM t").is_ok());
    }

    #[test]
    fn test_parse_operator_precedence() {
        let stmt = parse_one("SELECT 1 + 2 * 3").unwrap();
        let Statement::Query(Query { body: QueryBody::Select(select), .. }) = stmt else {
            panic!("expected select");
        };
        let SelectItem::Expr(expr) = &select.items[0] else {
            panic!("expected expression");
        };
        assert_eq!(expr.to_string(), "(1 + (2 * 3))");
    }

    #[test]
    fn test_keywords_are_not_aliases() {
        assert!(parse_one("SELECT * FROM t WHERE x = 1 ORDER BY x").is_ok());
        assert!(parse_one("SELECT FROM WHERE").is_err());
    }
}
