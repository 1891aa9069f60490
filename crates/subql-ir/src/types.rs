//! Type system for the logical plan

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum precision of a DECIMAL column.
pub const MAX_DECIMAL_PRECISION: u8 = 38;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal { precision: u8, scale: u8 },
    Varchar,
    Blob,
    /// Days since 1970-01-01
    Date,
    /// Microseconds since 1970-01-01 00:00:00
    Timestamp,
    /// Type of an untyped NULL literal
    Null,
}

impl DataType {
    pub fn is_integer(&self) -> bool {
        matches!(self, DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    pub fn is_decimal(&self) -> bool {
        matches!(self, DataType::Decimal { .. })
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float() || self.is_decimal()
    }

    /// Decimal digits needed to hold any value of an integer type.
    pub fn integer_digits(&self) -> Option<u8> {
        match self {
            DataType::Int8 => Some(3),
            DataType::Int16 => Some(5),
            DataType::Int32 => Some(10),
            DataType::Int64 => Some(19),
            _ => None,
        }
    }

    /// The DECIMAL type an integer type widens to, or the type itself when already decimal.
    pub fn as_decimal(&self) -> Option<DataType> {
        match self {
            DataType::Decimal { .. } => Some(*self),
            other => other
                .integer_digits()
                .map(|precision| DataType::Decimal { precision, scale: 0 }),
        }
    }

    /// Rank on the integer ladder, used to pick the wider of two integer types.
    fn integer_rank(&self) -> u8 {
        match self {
            DataType::Int8 => 1,
            DataType::Int16 => 2,
            DataType::Int32 => 3,
            DataType::Int64 => 4,
            _ => 0,
        }
    }

    /// Smallest type both operands can be converted to without losing range.
    ///
    /// Returns `None` when the two types belong to incompatible families.
    pub fn common_supertype(&self, other: &DataType) -> Option<DataType> {
        use DataType::*;

        if self == other {
            return Some(*self);
        }
        match (self, other) {
            (Null, t) | (t, Null) => Some(*t),
            (a, b) if a.is_integer() && b.is_integer() => {
                Some(if a.integer_rank() >= b.integer_rank() { *a } else { *b })
            }
            (a, b) if a.is_float() || b.is_float() => {
                if !(a.is_numeric() && b.is_numeric()) {
                    return None;
                }
                if *a == Float32 && (*b == Float32 || b.is_integer() && b.integer_rank() <= 2) {
                    Some(Float32)
                } else if *b == Float32 && a.is_integer() && a.integer_rank() <= 2 {
                    Some(Float32)
                } else {
                    Some(Float64)
                }
            }
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let (Some(Decimal { precision: p1, scale: s1 }), Some(Decimal { precision: p2, scale: s2 })) =
                    (a.as_decimal(), b.as_decimal())
                else {
                    return None;
                };
                let scale = s1.max(s2);
                let integral = (p1 - s1).max(p2 - s2);
                Some(Decimal {
                    precision: (integral + scale).min(MAX_DECIMAL_PRECISION),
                    scale,
                })
            }
            (Date, Timestamp) | (Timestamp, Date) => Some(Timestamp),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Int8 => write!(f, "TINYINT"),
            DataType::Int16 => write!(f, "SMALLINT"),
            DataType::Int32 => write!(f, "INTEGER"),
            DataType::Int64 => write!(f, "BIGINT"),
            DataType::Float32 => write!(f, "FLOAT"),
            DataType::Float64 => write!(f, "DOUBLE"),
            DataType::Decimal { precision, scale } => write!(f, "DECIMAL({},{})", precision, scale),
            DataType::Varchar => write!(f, "VARCHAR"),
            DataType::Blob => write!(f, "BLOB"),
            DataType::Date => write!(f, "DATE"),
            DataType::Timestamp => write!(f, "TIMESTAMP"),
            DataType::Null => write!(f, "NULL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Case-insensitive lookup, returning the position of the field.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn find_field(&self, name: &str) -> Option<&Field> {
        self.index_of(name).map(|i| &self.fields[i])
    }

    pub fn types(&self) -> Vec<DataType> {
        self.fields.iter().map(|f| f.data_type).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_supertype() {
        assert_eq!(DataType::Int32.common_supertype(&DataType::Int64), Some(DataType::Int64));
        assert_eq!(DataType::Int8.common_supertype(&DataType::Null), Some(DataType::Int8));
    }

    #[test]
    fn test_decimal_supertype() {
        let salary = DataType::Decimal { precision: 10, scale: 2 };
        assert_eq!(
            salary.common_supertype(&DataType::Int32),
            Some(DataType::Decimal { precision: 12, scale: 2 })
        );
        assert_eq!(salary.common_supertype(&DataType::Float64), Some(DataType::Float64));
    }

    #[test]
    fn test_incompatible_families() {
        assert_eq!(DataType::Varchar.common_supertype(&DataType::Int32), None);
        assert_eq!(DataType::Boolean.common_supertype(&DataType::Date), None);
    }
}
