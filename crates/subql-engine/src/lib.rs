//! In-memory SQL engine with Substrait plan import and export
//!
//! ```no_run
//! use subql_engine::Connection;
//!
//! let con = Connection::open_in_memory();
//! con.execute("CREATE TABLE integers (i INTEGER)").unwrap();
//! let plan = con.get_substrait("SELECT * FROM integers").unwrap();
//! ```

pub mod connection;
pub mod error;
pub mod eval;
pub mod executor;
pub mod result;
pub mod storage;

pub use connection::{Connection, PLAN_BLOB_COLUMN, PLAN_JSON_COLUMN};
pub use error::{Error, ExecutionError, Result};
pub use executor::ExecutionBudget;
pub use result::{JsonResult, QueryResult};
pub use storage::Database;

pub use subql_ir::{Catalog, DataType, Value};
pub use subql_substrait::{PlanEncoding, SerializedPlan, SubstraitError};
