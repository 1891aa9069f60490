//! In-memory row store and catalog

use crate::error::ExecutionError;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use subql_ir::{Catalog, TableSchema, Value};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Table {
    pub schema: TableSchema,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    /// Storage positions of `columns`, matched by name.
    fn positions(&self, columns: &[String]) -> Result<Vec<usize>, ExecutionError> {
        columns
            .iter()
            .map(|c| {
                self.schema
                    .column_index(c)
                    .ok_or_else(|| ExecutionError::ColumnNotFound {
                        table: self.schema.name.clone(),
                        column: c.clone(),
                    })
            })
            .collect()
    }

    fn primary_key(&self) -> Vec<usize> {
        self.schema
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.primary_key)
            .map(|(i, _)| i)
            .collect()
    }

    /// Check NOT NULL and primary key constraints for rows about to be appended.
    fn check_constraints(&self, new_rows: &[Vec<Value>]) -> Result<(), ExecutionError> {
        for row in new_rows {
            for (column, value) in self.schema.columns.iter().zip(row) {
                if !column.nullable && value.is_null() {
                    return Err(ExecutionError::ConstraintViolation(format!(
                        "NOT NULL constraint failed: {}.{}",
                        self.schema.name, column.name
                    )));
                }
            }
        }

        let key = self.primary_key();
        if key.is_empty() {
            return Ok(());
        }
        let key_of = |row: &Vec<Value>| -> Vec<Value> { key.iter().map(|i| row[*i].clone()).collect() };
        let mut seen: HashSet<Vec<Value>> = self.rows.iter().map(key_of).collect();
        for row in new_rows {
            let k = key_of(row);
            if !seen.insert(k.clone()) {
                let rendered: Vec<String> = key
                    .iter()
                    .zip(&k)
                    .map(|(i, v)| format!("{}: {}", self.schema.columns[*i].name, v))
                    .collect();
                return Err(ExecutionError::ConstraintViolation(format!(
                    "Duplicate key \"{}\" violates primary key constraint",
                    rendered.join(", ")
                )));
            }
        }
        Ok(())
    }
}

/// Tables shared by every connection opened on the database.
#[derive(Debug, Clone, Default)]
pub struct Database {
    tables: Arc<RwLock<HashMap<String, Table>>>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    // Mutations are validated before they touch the map, so a poisoned lock is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Table>> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Table>> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns false when the table exists and `if_not_exists` is set.
    pub fn create_table(&self, schema: TableSchema, if_not_exists: bool) -> Result<bool, ExecutionError> {
        let mut tables = self.write();
        let key = schema.name.to_lowercase();
        if tables.contains_key(&key) {
            return if if_not_exists {
                Ok(false)
            } else {
                Err(ExecutionError::TableExists(schema.name))
            };
        }
        debug!(table = %schema.name, columns = schema.columns.len(), "Created table");
        tables.insert(key, Table::new(schema));
        Ok(true)
    }

    /// Returns false when the table is missing and `if_exists` is set.
    pub fn drop_table(&self, name: &str, if_exists: bool) -> Result<bool, ExecutionError> {
        match self.write().remove(&name.to_lowercase()) {
            Some(_) => Ok(true),
            None if if_exists => Ok(false),
            None => Err(ExecutionError::TableNotFound(name.to_string())),
        }
    }

    /// Read `columns` of every row, in storage order.
    pub fn scan(&self, table: &str, columns: &[String]) -> Result<Vec<Vec<Value>>, ExecutionError> {
        let tables = self.read();
        let table = tables
            .get(&table.to_lowercase())
            .ok_or_else(|| ExecutionError::TableNotFound(table.to_string()))?;
        let positions = table.positions(columns)?;
        Ok(table
            .rows
            .iter()
            .map(|row| positions.iter().map(|p| row[*p].clone()).collect())
            .collect())
    }

    /// Append rows whose values are given for `columns`; other columns are NULL.
    pub fn insert(&self, table: &str, columns: &[String], rows: Vec<Vec<Value>>) -> Result<usize, ExecutionError> {
        let mut tables = self.write();
        let table = tables
            .get_mut(&table.to_lowercase())
            .ok_or_else(|| ExecutionError::TableNotFound(table.to_string()))?;
        let positions = table.positions(columns)?;
        let width = table.schema.columns.len();

        let full_rows: Vec<Vec<Value>> = rows
            .into_iter()
            .map(|row| {
                let mut full = vec![Value::Null; width];
                for (value, p) in row.into_iter().zip(&positions) {
                    full[*p] = value;
                }
                full
            })
            .collect();
        table.check_constraints(&full_rows)?;

        let count = full_rows.len();
        table.rows.extend(full_rows);
        Ok(count)
    }

    /// Create a table and fill it in one step.
    pub fn create_table_as(&self, schema: TableSchema, rows: Vec<Vec<Value>>) -> Result<usize, ExecutionError> {
        let mut tables = self.write();
        let key = schema.name.to_lowercase();
        if tables.contains_key(&key) {
            return Err(ExecutionError::TableExists(schema.name));
        }
        let mut table = Table::new(schema);
        table.check_constraints(&rows)?;
        let count = rows.len();
        table.rows = rows;
        tables.insert(key, table);
        Ok(count)
    }

    /// Remove one stored row per entry of `rows`, matching on `columns`.
    pub fn delete(&self, table: &str, columns: &[String], rows: &[Vec<Value>]) -> Result<usize, ExecutionError> {
        let mut tables = self.write();
        let table = tables
            .get_mut(&table.to_lowercase())
            .ok_or_else(|| ExecutionError::TableNotFound(table.to_string()))?;
        let positions = table.positions(columns)?;

        let mut pending: HashMap<&[Value], usize> = HashMap::new();
        for row in rows {
            *pending.entry(row.as_slice()).or_default() += 1;
        }

        let mut deleted = 0;
        table.rows.retain(|stored| {
            let projected: Vec<Value> = positions.iter().map(|p| stored[*p].clone()).collect();
            match pending.get_mut(projected.as_slice()) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    deleted += 1;
                    false
                }
                _ => true,
            }
        });
        Ok(deleted)
    }

    pub fn row_count(&self, table: &str) -> Option<usize> {
        self.read().get(&table.to_lowercase()).map(|t| t.rows.len())
    }
}

impl Catalog for Database {
    fn get_table_schema(&self, name: &str) -> Option<TableSchema> {
        self.read().get(&name.to_lowercase()).map(|t| t.schema.clone())
    }

    fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().values().map(|t| t.schema.name.clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subql_ir::{ColumnDef, DataType};

    fn database() -> Database {
        let db = Database::new();
        db.create_table(
            TableSchema::new(
                "employees",
                vec![
                    ColumnDef::new("employee_id", DataType::Int32).primary_key(),
                    ColumnDef::new("name", DataType::Varchar),
                ],
            ),
            false,
        )
        .unwrap();
        db
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_insert_and_scan_by_name() {
        let db = database();
        let inserted = db
            .insert(
                "employees",
                &cols(&["name", "employee_id"]),
                vec![vec![Value::Varchar("Alice".into()), Value::Int32(1)]],
            )
            .unwrap();
        assert_eq!(inserted, 1);

        let rows = db.scan("EMPLOYEES", &cols(&["name", "employee_id"])).unwrap();
        assert_eq!(rows, vec![vec![Value::Varchar("Alice".into()), Value::Int32(1)]]);
    }

    #[test]
    fn test_constraints_are_atomic() {
        let db = database();
        let result = db.insert(
            "employees",
            &cols(&["employee_id"]),
            vec![vec![Value::Int32(1)], vec![Value::Int32(1)]],
        );
        assert!(matches!(result, Err(ExecutionError::ConstraintViolation(_))));
        assert_eq!(db.row_count("employees"), Some(0));

        let result = db.insert("employees", &cols(&["name"]), vec![vec![Value::Varchar("x".into())]]);
        assert!(matches!(result, Err(ExecutionError::ConstraintViolation(_))));
    }

    #[test]
    fn test_delete_removes_matching_rows_once() {
        let db = database();
        db.insert(
            "employees",
            &cols(&["employee_id", "name"]),
            vec![
                vec![Value::Int32(1), Value::Varchar("a".into())],
                vec![Value::Int32(2), Value::Varchar("b".into())],
            ],
        )
        .unwrap();

        let deleted = db
            .delete("employees", &cols(&["employee_id", "name"]), &[vec![Value::Int32(2), Value::Varchar("b".into())]])
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(db.row_count("employees"), Some(1));
    }

    #[test]
    fn test_create_and_drop() {
        let db = database();
        assert!(!db
            .create_table(TableSchema::new("Employees", vec![]), true)
            .unwrap());
        assert_eq!(
            db.create_table(TableSchema::new("employees", vec![]), false),
            Err(ExecutionError::TableExists("employees".to_string()))
        );
        assert!(db.drop_table("employees", false).unwrap());
        assert!(!db.drop_table("employees", true).unwrap());
        assert!(db.table_names().is_empty());
    }
}
