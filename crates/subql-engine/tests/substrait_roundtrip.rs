//! SQL to Substrait and back, executed against in-memory databases

use subql_engine::{Connection, DataType, Error, QueryResult, SubstraitError, Value};
use subql_ir::{Expr, Field, LogicalPlan, QueryPlan};
use subql_registry::FunctionRegistry;
use subql_substrait::{produce, PlanEncoding};

fn setup(con: &Connection) {
    con.execute(
        "CREATE TABLE integers (i INTEGER);
         INSERT INTO integers VALUES (0), (1), (2), (3), (4), (5), (6), (7), (8), (9), (NULL);
         CREATE TABLE employees (
             employee_id INTEGER PRIMARY KEY,
             name VARCHAR,
             department_id INTEGER,
             salary DECIMAL(10, 2)
         );
         INSERT INTO employees VALUES
             (1, 'John Doe', 1, 120000),
             (2, 'Jane Smith', 2, 80000),
             (3, 'Alice Johnson', 1, 50000),
             (4, 'Bob Brown', 3, 95000),
             (5, 'Charlie Black', 2, 60000);
         CREATE TABLE departments (department_id INTEGER PRIMARY KEY, department_name VARCHAR);
         INSERT INTO departments VALUES (1, 'HR'), (2, 'Engineering'), (3, 'Finance');
         CREATE TABLE part_time_employees (id INTEGER, name VARCHAR, hourly_rate DECIMAL(10, 2));
         INSERT INTO part_time_employees VALUES (6, 'Eve', 45.50), (7, 'Frank', 30.00), (8, 'Grace', 55.00);",
    )
    .unwrap();
}

fn connection() -> Connection {
    let con = Connection::open_in_memory();
    setup(&con);
    con
}

fn plan_bytes(con: &Connection, sql: &str) -> Vec<u8> {
    let result = con.get_substrait(sql).unwrap();
    assert_eq!(result.columns(), ["Plan Blob"]);
    assert_eq!(result.types(), [DataType::Blob]);
    match &result.rows()[0][0] {
        Value::Blob(bytes) => bytes.clone(),
        other => panic!("expected a blob, got {:?}", other),
    }
}

fn plan_json(con: &Connection, sql: &str) -> String {
    let result = con.get_substrait_json(sql).unwrap();
    assert_eq!(result.columns(), ["Json"]);
    match &result.rows()[0][0] {
        Value::Varchar(text) => text.clone(),
        other => panic!("expected text, got {:?}", other),
    }
}

/// Run `sql` directly and through both encodings; all three must agree.
fn roundtrip(con: &Connection, sql: &str) -> QueryResult {
    let direct = con.execute(sql).unwrap();
    let binary = con.from_substrait(&plan_bytes(con, sql)).unwrap();
    let json = con.from_substrait_json(&plan_json(con, sql)).unwrap();

    for result in [&binary, &json] {
        assert_eq!(result.columns(), direct.columns(), "{}", sql);
        assert_eq!(result.types(), direct.types(), "{}", sql);
        assert_eq!(result.rows(), direct.rows(), "{}", sql);
    }
    binary
}

fn varchar(s: &str) -> Value {
    Value::Varchar(s.to_string())
}

fn money(units: i128) -> Value {
    Value::Decimal {
        value: units * 100,
        scale: 2,
    }
}

#[test]
fn test_limit_through_binary_plan() {
    let con = connection();
    let bytes = plan_bytes(&con, "SELECT * FROM integers LIMIT 5");
    let mut result = con.from_substrait(&bytes).unwrap();

    let expected: Vec<Vec<Value>> = (0..5).map(|i| vec![Value::Int32(i)]).collect();
    assert_eq!(result.fetchall(), expected);
    assert_eq!(result.columns(), ["i"]);
}

#[test]
fn test_limit_beyond_i64_returns_all_rows() {
    let con = connection();
    let result = roundtrip(&con, "SELECT * FROM integers LIMIT 18446744073709551615");
    assert_eq!(result.row_count(), 11);

    let result = roundtrip(&con, "SELECT * FROM integers LIMIT 18446744073709551615 OFFSET 8");
    assert_eq!(result.rows(), [[Value::Int32(8)], [Value::Int32(9)], [Value::Null]]);
}

#[test]
fn test_values_through_json_plan() {
    let con = connection();
    let sql = "VALUES (1), (2), (3), (4), (5), (6), (7), (8), (9), (10)";
    let result = con.from_substrait_json(&plan_json(&con, sql)).unwrap();

    assert_eq!(result.columns(), ["col0"]);
    assert_eq!(result.types(), [DataType::Int32]);
    assert_eq!(
        result.column("col0").unwrap(),
        (1..=10).map(Value::Int32).collect::<Vec<_>>()
    );
}

#[test]
fn test_case_categories() {
    let con = connection();
    let result = roundtrip(
        &con,
        "SELECT name, CASE WHEN salary > 100000 THEN 'HIGH' \
                           WHEN salary >= 60000 THEN 'Medium' \
                           ELSE 'Low' END AS category \
         FROM employees",
    );
    assert_eq!(
        result.column("category").unwrap(),
        ["HIGH", "Medium", "Low", "Medium", "Medium"].map(varchar).to_vec()
    );
}

#[test]
fn test_join_department_names() {
    let con = connection();
    let result = roundtrip(
        &con,
        "SELECT e.name, d.department_name FROM employees e \
         JOIN departments d ON e.department_id = d.department_id",
    );
    let pairs: Vec<Vec<Value>> = [
        ("John Doe", "HR"),
        ("Jane Smith", "Engineering"),
        ("Alice Johnson", "HR"),
        ("Bob Brown", "Finance"),
        ("Charlie Black", "Engineering"),
    ]
    .iter()
    .map(|(n, d)| vec![varchar(n), varchar(d)])
    .collect();
    assert_eq!(result.rows(), pairs.as_slice());
}

#[test]
fn test_union_all_keeps_global_order() {
    let con = connection();
    let result = roundtrip(
        &con,
        "SELECT name, salary FROM employees \
         UNION ALL \
         SELECT name, hourly_rate * 2000 FROM part_time_employees \
         ORDER BY salary",
    );

    assert_eq!(result.types()[1], DataType::Decimal { precision: 20, scale: 2 });
    assert_eq!(
        result.column("name").unwrap(),
        ["Alice Johnson", "Charlie Black", "Frank", "Jane Smith", "Eve", "Bob Brown", "Grace", "John Doe"]
            .map(varchar)
            .to_vec()
    );
    assert_eq!(
        result.column("salary").unwrap(),
        [50000, 60000, 60000, 80000, 91000, 95000, 110000, 120000].map(money).to_vec()
    );
}

#[test]
fn test_ctas_variants() {
    let cases = [
        ("t_values", "VALUES (1, 'a'), (2, 'b')"),
        ("t_project", "SELECT name, salary * 2 AS doubled FROM employees"),
        ("t_filter", "SELECT * FROM integers WHERE i % 2 = 0"),
        (
            "t_case",
            "SELECT name, CASE WHEN department_id = 1 THEN 'one' ELSE 'other' END AS d FROM employees",
        ),
        ("t_order", "SELECT name FROM employees ORDER BY salary DESC"),
        ("t_subquery", "SELECT x FROM (SELECT i + 1 AS x FROM integers) AS s WHERE x > 5"),
        (
            "t_group",
            "SELECT department_id, count(*) AS n FROM employees GROUP BY department_id ORDER BY department_id",
        ),
        (
            "t_join",
            "SELECT e.name, d.department_name FROM employees e JOIN departments d \
             ON e.department_id = d.department_id",
        ),
        (
            "t_union",
            "SELECT name FROM employees UNION ALL SELECT name FROM part_time_employees ORDER BY name",
        ),
    ];

    let con = connection();
    for (table, query) in cases {
        let expected = con.execute(query).unwrap();
        let bytes = plan_bytes(&con, &format!("CREATE TABLE {} AS {}", table, query));
        let written = con.from_substrait(&bytes).unwrap();

        assert_eq!(written.columns(), ["Count"], "{}", table);
        assert_eq!(
            written.rows()[0][0],
            Value::Int64(expected.row_count() as i64),
            "{}",
            table
        );

        let stored = con.execute(&format!("SELECT * FROM {}", table)).unwrap();
        assert_eq!(stored.columns(), expected.columns(), "{}", table);
        assert_eq!(stored.rows(), expected.rows(), "{}", table);
    }
}

#[test]
fn test_insert_and_delete_through_write_rel() {
    let con = connection();

    let inserted = con
        .from_substrait(&plan_bytes(&con, "INSERT INTO integers VALUES (10), (11)"))
        .unwrap();
    assert_eq!(inserted.rows(), [vec![Value::Int64(2)]]);

    let deleted = con
        .from_substrait_json(&plan_json(&con, "DELETE FROM integers WHERE i > 5"))
        .unwrap();
    assert_eq!(deleted.rows(), [vec![Value::Int64(6)]]);

    let remaining = con.execute("SELECT count(*), count(i) FROM integers").unwrap();
    assert_eq!(remaining.rows(), [vec![Value::Int64(7), Value::Int64(6)]]);
}

#[test]
fn test_plan_runs_on_database_with_different_column_order() {
    let source = connection();
    let target = Connection::open_in_memory();
    target
        .execute(
            "CREATE TABLE employees (
                 salary DECIMAL(10, 2),
                 name VARCHAR,
                 department_id INTEGER,
                 employee_id INTEGER PRIMARY KEY
             );
             INSERT INTO employees (employee_id, name, department_id, salary) VALUES
                 (1, 'John Doe', 1, 120000),
                 (2, 'Jane Smith', 2, 80000)",
        )
        .unwrap();

    let sql = "SELECT employee_id, name, salary FROM employees WHERE department_id = 2";
    let result = target.from_substrait(&plan_bytes(&source, sql)).unwrap();
    assert_eq!(result.columns(), ["employee_id", "name", "salary"]);
    assert_eq!(
        result.rows(),
        [vec![Value::Int32(2), varchar("Jane Smith"), money(80000)]]
    );
    assert_eq!(result.rows(), target.execute(sql).unwrap().rows());
}

#[test]
fn test_unknown_table_in_get_substrait() {
    let con = connection();
    let err = con.get_substrait("SELECT * FROM missing").unwrap_err();
    assert!(
        matches!(err, Error::Substrait(SubstraitError::UnresolvedCatalogReference(_))),
        "{:?}",
        err
    );
    assert_eq!(err.kind(), "unresolved_catalog_reference");
}

#[test]
fn test_statements_without_plan_form() {
    let con = connection();
    for sql in [
        "CREATE TABLE t (a INTEGER)",
        "DROP TABLE integers",
        "SELECT i FROM integers EXCEPT ALL SELECT i FROM integers",
    ] {
        let err = con.get_substrait(sql).unwrap_err();
        assert!(
            matches!(err, Error::Substrait(SubstraitError::UnsupportedOperator(_))),
            "{}: {:?}",
            sql,
            err
        );
    }
    assert!(con.database().row_count("integers").is_some());
}

#[test]
fn test_invalid_and_empty_plans() {
    let con = connection();

    let err = con.from_substrait(b"not a plan").unwrap_err();
    assert!(matches!(err, Error::Substrait(SubstraitError::MalformedPlan(_))), "{:?}", err);

    let err = con.from_substrait_json("{\"relations\": [").unwrap_err();
    assert!(matches!(err, Error::Substrait(SubstraitError::MalformedPlan(_))), "{:?}", err);

    let err = con.from_substrait(&[]).unwrap_err();
    assert!(matches!(err, Error::Substrait(SubstraitError::MalformedPlan(_))), "{:?}", err);
}

#[test]
fn test_consumer_rejects_changed_schema() {
    let source = connection();
    let target = Connection::open_in_memory();
    target
        .execute("CREATE TABLE employees (employee_id INTEGER, name VARCHAR, department_id INTEGER, salary VARCHAR)")
        .unwrap();

    let bytes = plan_bytes(&source, "SELECT name, salary FROM employees");
    let err = target.from_substrait(&bytes).unwrap_err();
    assert!(matches!(err, Error::Substrait(SubstraitError::SchemaMismatch(_))), "{:?}", err);

    let err = target
        .from_substrait(&plan_bytes(&source, "SELECT department_name FROM departments"))
        .unwrap_err();
    assert!(
        matches!(err, Error::Substrait(SubstraitError::UnresolvedCatalogReference(_))),
        "{:?}",
        err
    );
}

#[test]
fn test_unbound_plan_is_rejected_by_producer() {
    let values = LogicalPlan::Values {
        fields: vec![Field::new("col0", DataType::Int32, false)],
        rows: vec![vec![Expr::literal(Value::Int32(1))]],
    };
    let plan = QueryPlan::new(
        LogicalPlan::Project {
            input: Box::new(values),
            exprs: vec![Expr::column(3, DataType::Int32)],
        },
        vec!["x".to_string()],
    );

    let result = produce(&plan, PlanEncoding::Binary, FunctionRegistry::builtin());
    assert!(matches!(result, Err(SubstraitError::UnresolvedReference(_))));
}

#[test]
fn test_concurrent_plan_interchange_on_shared_database() {
    let con = connection();
    let sql = "SELECT e.name, d.department_name FROM employees e \
               JOIN departments d ON e.department_id = d.department_id ORDER BY e.employee_id";
    let expected = con.execute(sql).unwrap().into_rows();

    let results: Vec<(Vec<Vec<Value>>, Vec<Vec<Value>>)> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let worker = Connection::connect(con.database());
                scope.spawn(move || {
                    let mut binary = Vec::new();
                    let mut json = Vec::new();
                    for _ in 0..10 {
                        binary = worker.from_substrait(&plan_bytes(&worker, sql)).unwrap().into_rows();
                        json = worker
                            .from_substrait_json(&plan_json(&worker, sql))
                            .unwrap()
                            .into_rows();
                    }
                    (binary, json)
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    assert_eq!(results.len(), 8);
    for (binary, json) in results {
        assert_eq!(binary, expected);
        assert_eq!(json, expected);
    }
}
