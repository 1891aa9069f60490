//! Connection facade: SQL execution and Substrait plan interchange

use crate::error::{Error, Result};
use crate::executor::{ExecutionBudget, Executor};
use crate::result::QueryResult;
use crate::storage::Database;
use std::time::Instant;
use subql_ir::{DataType, Field, QueryPlan, Schema, Value};
use subql_registry::FunctionRegistry;
use subql_sql::{parse, parse_one, BindError, Binder, BoundStatement, Statement};
use subql_substrait::{
    decode_binary, decode_json, produce, Plan, PlanConsumer, PlanEncoding, SerializedPlan,
    SubstraitError,
};
use tracing::{debug, info, warn};

/// Column returned by [`Connection::get_substrait`].
pub const PLAN_BLOB_COLUMN: &str = "Plan Blob";
/// Column returned by [`Connection::get_substrait_json`].
pub const PLAN_JSON_COLUMN: &str = "Json";

/// A handle onto a [`Database`]. Cheap to create; connections opened on the
/// same database see each other's tables.
#[derive(Debug, Clone)]
pub struct Connection {
    db: Database,
    registry: &'static FunctionRegistry,
    budget: ExecutionBudget,
}

impl Connection {
    pub fn open_in_memory() -> Self {
        Self::connect(&Database::new())
    }

    pub fn connect(db: &Database) -> Self {
        Self {
            db: db.clone(),
            registry: FunctionRegistry::builtin(),
            budget: ExecutionBudget::unlimited(),
        }
    }

    pub fn with_budget(mut self, budget: ExecutionBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Run every statement in `sql` and return the result of the last one.
    pub fn execute(&self, sql: &str) -> Result<QueryResult> {
        let statements = parse(sql)?;
        let mut last = QueryResult::empty();
        for statement in &statements {
            last = self.execute_statement(statement)?;
        }
        Ok(last)
    }

    fn execute_statement(&self, statement: &Statement) -> Result<QueryResult> {
        match Binder::with_registry(&self.db, self.registry).bind_statement(statement)? {
            BoundStatement::Query(plan) => self.run_plan(&plan),
            BoundStatement::CreateTable {
                schema,
                if_not_exists,
            } => {
                let name = schema.name.clone();
                if self.db.create_table(schema, if_not_exists)? {
                    info!(table = %name, "Table created");
                }
                Ok(QueryResult::empty())
            }
            BoundStatement::DropTable { name, if_exists } => {
                if self.db.drop_table(&name, if_exists)? {
                    info!(table = %name, "Table dropped");
                }
                Ok(QueryResult::empty())
            }
        }
    }

    /// Execute an already bound plan.
    pub fn run_plan(&self, plan: &QueryPlan) -> Result<QueryResult> {
        let rows = Executor::new(&self.db, &self.budget).execute(&plan.root)?;
        Ok(QueryResult::new(plan.schema(), rows))
    }

    /// Bind a single statement that has a plan form.
    pub fn plan(&self, sql: &str) -> Result<QueryPlan> {
        let statement = parse_one(sql)?;
        match Binder::with_registry(&self.db, self.registry).bind_statement(&statement) {
            Ok(BoundStatement::Query(plan)) => Ok(plan),
            Ok(BoundStatement::CreateTable { schema, .. }) => Err(SubstraitError::UnsupportedOperator(
                format!("CREATE TABLE {} has no plan representation", schema.name),
            )
            .into()),
            Ok(BoundStatement::DropTable { name, .. }) => Err(SubstraitError::UnsupportedOperator(
                format!("DROP TABLE {} has no plan representation", name),
            )
            .into()),
            Err(BindError::TableNotFound(name)) => Err(SubstraitError::UnresolvedCatalogReference(
                format!("Table with name {} does not exist!", name),
            )
            .into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Serialize the plan of `sql` without running it.
    pub fn produce_plan(&self, sql: &str, encoding: PlanEncoding) -> Result<SerializedPlan> {
        let plan = self.plan(sql)?;
        let serialized = produce(&plan, encoding, self.registry)?;
        debug!(%encoding, bytes = serialized.len(), fingerprint = %plan.fingerprint(), "Produced plan");
        Ok(serialized)
    }

    /// Binary Substrait plan of `sql` as a one-row `Plan Blob` result.
    pub fn get_substrait(&self, sql: &str) -> Result<QueryResult> {
        let value = match self.produce_plan(sql, PlanEncoding::Binary)? {
            SerializedPlan::Binary(bytes) => Value::Blob(bytes),
            SerializedPlan::Json(text) => Value::Blob(text.into_bytes()),
        };
        Ok(single_value(PLAN_BLOB_COLUMN, DataType::Blob, value))
    }

    /// JSON Substrait plan of `sql` as a one-row `Json` result.
    pub fn get_substrait_json(&self, sql: &str) -> Result<QueryResult> {
        let value = match self.produce_plan(sql, PlanEncoding::Json)? {
            SerializedPlan::Json(text) => Value::Varchar(text),
            SerializedPlan::Binary(bytes) => Value::Varchar(String::from_utf8_lossy(&bytes).into_owned()),
        };
        Ok(single_value(PLAN_JSON_COLUMN, DataType::Varchar, value))
    }

    pub fn from_substrait(&self, bytes: &[u8]) -> Result<QueryResult> {
        let plan = decode_binary(bytes).map_err(|e| {
            warn!(error = %e, "Rejected binary plan");
            Error::from(e)
        })?;
        self.execute_substrait(&plan)
    }

    pub fn from_substrait_json(&self, json: &str) -> Result<QueryResult> {
        let plan = decode_json(json).map_err(|e| {
            warn!(error = %e, "Rejected JSON plan");
            Error::from(e)
        })?;
        self.execute_substrait(&plan)
    }

    /// Re-resolve a decoded plan against this database and run it.
    pub fn execute_substrait(&self, plan: &Plan) -> Result<QueryResult> {
        let start = Instant::now();
        let query = PlanConsumer::new(&self.db, self.registry)
            .consume(plan)
            .map_err(|e| {
                warn!(kind = e.kind(), error = %e, "Plan consumption failed");
                Error::from(e)
            })?;
        let result = self.run_plan(&query)?;
        info!(
            rows = result.row_count(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Executed Substrait plan"
        );
        Ok(result)
    }
}

fn single_value(column: &str, data_type: DataType, value: Value) -> QueryResult {
    QueryResult::new(
        Schema::new(vec![Field::new(column, data_type, false)]),
        vec![vec![value]],
    )
}
