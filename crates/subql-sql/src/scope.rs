//! Name resolution scope for a FROM clause

use subql_ir::{DataType, Field, Schema};

use crate::binder::BindError;

#[derive(Debug, Clone, PartialEq)]
pub struct ScopeColumn {
    pub qualifier: Option<String>,
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

/// Columns visible to expressions, positionally aligned with the input schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    pub columns: Vec<ScopeColumn>,
}

impl Scope {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_fields(qualifier: Option<&str>, fields: &[Field]) -> Self {
        Self {
            columns: fields
                .iter()
                .map(|f| ScopeColumn {
                    qualifier: qualifier.map(str::to_string),
                    name: f.name.clone(),
                    data_type: f.data_type,
                    nullable: f.nullable,
                })
                .collect(),
        }
    }

    pub fn from_schema(qualifier: Option<&str>, schema: &Schema) -> Self {
        Self::from_fields(qualifier, &schema.fields)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Concatenate two scopes, as produced by a join.
    pub fn join(mut self, other: Scope) -> Self {
        self.columns.extend(other.columns);
        self
    }

    /// Resolve a possibly qualified column name to its position.
    pub fn resolve(&self, table: Option<&str>, column: &str) -> Result<(usize, DataType), BindError> {
        let mut matches = self.columns.iter().enumerate().filter(|(_, c)| {
            c.name.eq_ignore_ascii_case(column)
                && match table {
                    Some(t) => c.qualifier.as_deref().is_some_and(|q| q.eq_ignore_ascii_case(t)),
                    None => true,
                }
        });

        let display = match table {
            Some(t) => format!("{}.{}", t, column),
            None => column.to_string(),
        };
        let (index, col) = matches
            .next()
            .ok_or_else(|| BindError::ColumnNotFound(display.clone()))?;
        if matches.next().is_some() {
            return Err(BindError::AmbiguousColumn(display));
        }
        Ok((index, col.data_type))
    }

    /// Positions of the columns that belong to `qualifier`.
    pub fn qualified_indices(&self, qualifier: &str) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                c.qualifier
                    .as_deref()
                    .is_some_and(|q| q.eq_ignore_ascii_case(qualifier))
            })
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn employees() -> Scope {
        Scope::from_fields(
            Some("e"),
            &[
                Field::new("employee_id", DataType::Int32, false),
                Field::new("department_id", DataType::Int32, true),
            ],
        )
    }

    fn departments() -> Scope {
        Scope::from_fields(
            Some("d"),
            &[
                Field::new("department_id", DataType::Int32, false),
                Field::new("name", DataType::Varchar, true),
            ],
        )
    }

    #[test]
    fn test_resolve_qualified_and_ambiguous() {
        let scope = employees().join(departments());

        assert_eq!(scope.resolve(Some("d"), "department_id").unwrap().0, 2);
        assert_eq!(scope.resolve(None, "NAME").unwrap(), (3, DataType::Varchar));
        assert!(matches!(
            scope.resolve(None, "department_id"),
            Err(BindError::AmbiguousColumn(_))
        ));
        assert!(matches!(scope.resolve(Some("x"), "name"), Err(BindError::ColumnNotFound(_))));
    }

    #[test]
    fn test_qualified_indices() {
        let scope = employees().join(departments());
        assert_eq!(scope.qualified_indices("D"), vec![2, 3]);
        assert!(scope.qualified_indices("z").is_empty());
    }
}
