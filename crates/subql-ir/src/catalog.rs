//! Catalog abstraction used to resolve table and column names

use crate::types::{DataType, Field, Schema};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            primary_key: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.nullable = false;
        self.primary_key = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Case-insensitive column lookup.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn fields(&self) -> Vec<Field> {
        self.columns
            .iter()
            .map(|c| Field::new(c.name.clone(), c.data_type, c.nullable))
            .collect()
    }

    pub fn schema(&self) -> Schema {
        Schema::new(self.fields())
    }
}

/// Read-only view of the tables known to an engine.
///
/// Implementations must allow concurrent readers.
pub trait Catalog: Send + Sync {
    /// Look up a table by name, case-insensitively.
    fn get_table_schema(&self, name: &str) -> Option<TableSchema>;

    fn table_names(&self) -> Vec<String>;
}

/// In-memory catalog for planning without storage.
#[derive(Debug, Default, Clone)]
pub struct MemoryCatalog {
    tables: HashMap<String, TableSchema>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, schema: TableSchema) {
        self.tables.insert(schema.name.to_lowercase(), schema);
    }

    pub fn with_table(mut self, schema: TableSchema) -> Self {
        self.add_table(schema);
        self
    }
}

impl Catalog for MemoryCatalog {
    fn get_table_schema(&self, name: &str) -> Option<TableSchema> {
        self.tables.get(&name.to_lowercase()).cloned()
    }

    fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.values().map(|t| t.name.clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        let catalog = MemoryCatalog::new().with_table(TableSchema::new(
            "Employees",
            vec![ColumnDef::new("employee_id", DataType::Int32).primary_key()],
        ));

        let table = catalog.get_table_schema("employees").unwrap();
        assert_eq!(table.name, "Employees");
        assert_eq!(table.column_index("EMPLOYEE_ID"), Some(0));
        assert!(!table.columns[0].nullable);
        assert!(catalog.get_table_schema("departments").is_none());
    }
}
