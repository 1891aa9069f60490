//! Mapping between scalar values and Substrait literals

use crate::error::{Result, SubstraitError};
use crate::types::{decimal_type, from_substrait_type, to_substrait_type};
use substrait::proto::expression::literal::{self, LiteralType};
use substrait::proto::expression::Literal;
use subql_ir::{DataType, Value};

/// Encode `value` as a literal of `data_type`.
///
/// Fails with `UnresolvedReference` when the value cannot be represented in
/// the declared type, which means the plan was not fully bound.
pub fn to_literal(value: &Value, data_type: &DataType) -> Result<Literal> {
    if value.is_null() {
        return Ok(Literal {
            nullable: true,
            literal_type: Some(LiteralType::Null(to_substrait_type(data_type, true))),
            ..Default::default()
        });
    }

    let mismatch = || {
        SubstraitError::UnresolvedReference(format!(
            "literal {:?} does not fit declared type {}",
            value, data_type
        ))
    };
    let int = |min: i64, max: i64| -> Result<i64> {
        value
            .as_i64()
            .filter(|v| (min..=max).contains(v))
            .ok_or_else(mismatch)
    };

    let literal_type = match (data_type, value) {
        (DataType::Boolean, Value::Boolean(b)) => LiteralType::Boolean(*b),
        (DataType::Int8, _) => LiteralType::I8(int(i8::MIN as i64, i8::MAX as i64)? as i32),
        (DataType::Int16, _) => LiteralType::I16(int(i16::MIN as i64, i16::MAX as i64)? as i32),
        (DataType::Int32, _) => LiteralType::I32(int(i32::MIN as i64, i32::MAX as i64)? as i32),
        (DataType::Int64, _) => LiteralType::I64(int(i64::MIN, i64::MAX)?),
        (DataType::Float32, v) if v.data_type().is_numeric() => {
            LiteralType::Fp32(v.as_f64().ok_or_else(mismatch)? as f32)
        }
        (DataType::Float64, v) if v.data_type().is_numeric() => {
            LiteralType::Fp64(v.as_f64().ok_or_else(mismatch)?)
        }
        (DataType::Decimal { precision, scale }, v) if !v.data_type().is_float() => {
            let scaled = v.as_scaled(*scale).ok_or_else(mismatch)?;
            LiteralType::Decimal(literal::Decimal {
                value: scaled.to_le_bytes().to_vec(),
                precision: *precision as i32,
                scale: *scale as i32,
            })
        }
        (DataType::Varchar, Value::Varchar(s)) => LiteralType::String(s.clone()),
        (DataType::Blob, Value::Blob(b)) => LiteralType::Binary(b.clone()),
        (DataType::Date, Value::Date(d)) => LiteralType::Date(*d),
        (DataType::Timestamp, Value::Timestamp(t)) => {
            LiteralType::PrecisionTimestamp(literal::PrecisionTimestamp {
                precision: 6,
                value: *t,
            })
        }
        (DataType::Timestamp, Value::Date(d)) => {
            LiteralType::PrecisionTimestamp(literal::PrecisionTimestamp {
                precision: 6,
                value: *d as i64 * subql_ir::MICROS_PER_DAY,
            })
        }
        _ => return Err(mismatch()),
    };

    Ok(Literal {
        nullable: false,
        literal_type: Some(literal_type),
        ..Default::default()
    })
}

/// Decode a literal into a value and its type.
pub fn from_literal(literal: &Literal) -> Result<(Value, DataType)> {
    let Some(literal_type) = &literal.literal_type else {
        return Err(SubstraitError::MalformedPlan("literal without a value".to_string()));
    };
    let decoded = match literal_type {
        LiteralType::Boolean(b) => (Value::Boolean(*b), DataType::Boolean),
        LiteralType::I8(v) => (Value::Int8(narrow(*v, "i8")?), DataType::Int8),
        LiteralType::I16(v) => (Value::Int16(narrow(*v, "i16")?), DataType::Int16),
        LiteralType::I32(v) => (Value::Int32(*v), DataType::Int32),
        LiteralType::I64(v) => (Value::Int64(*v), DataType::Int64),
        LiteralType::Fp32(v) => (Value::Float32(*v), DataType::Float32),
        LiteralType::Fp64(v) => (Value::Float64(*v), DataType::Float64),
        LiteralType::String(s) => (Value::Varchar(s.clone()), DataType::Varchar),
        LiteralType::FixedChar(s) => (Value::Varchar(s.clone()), DataType::Varchar),
        LiteralType::VarChar(v) => (Value::Varchar(v.value.clone()), DataType::Varchar),
        LiteralType::Binary(b) => (Value::Blob(b.clone()), DataType::Blob),
        LiteralType::Date(d) => (Value::Date(*d), DataType::Date),
        LiteralType::Decimal(d) => {
            let bytes: [u8; 16] = d.value.as_slice().try_into().map_err(|_| {
                SubstraitError::MalformedPlan(format!(
                    "decimal literal has {} bytes, expected 16",
                    d.value.len()
                ))
            })?;
            let data_type = decimal_type(d.precision, d.scale)?;
            (
                Value::Decimal {
                    value: i128::from_le_bytes(bytes),
                    scale: d.scale as u8,
                },
                data_type,
            )
        }
        LiteralType::PrecisionTimestamp(t) => {
            (Value::Timestamp(to_micros(t.value, t.precision)?), DataType::Timestamp)
        }
        LiteralType::Null(ty) => {
            let (data_type, _) = from_substrait_type(ty)?;
            (Value::Null, data_type)
        }
        _ => {
            return Err(SubstraitError::UnsupportedOperator(
                "literal kind has no logical equivalent".to_string(),
            ))
        }
    };
    Ok(decoded)
}

fn narrow<T: TryFrom<i32>>(value: i32, ty: &str) -> Result<T> {
    T::try_from(value)
        .map_err(|_| SubstraitError::MalformedPlan(format!("{} literal out of range: {}", ty, value)))
}

/// Rescale a timestamp of `precision` fractional digits to microseconds.
fn to_micros(value: i64, precision: i32) -> Result<i64> {
    let micros = match precision {
        0 => value.checked_mul(1_000_000),
        3 => value.checked_mul(1_000),
        6 => Some(value),
        9 => Some(value / 1_000),
        p => {
            return Err(SubstraitError::UnsupportedOperator(format!(
                "timestamp precision {}",
                p
            )))
        }
    };
    micros.ok_or_else(|| SubstraitError::MalformedPlan("timestamp literal out of range".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_literal_bytes() {
        let salary = DataType::Decimal { precision: 10, scale: 2 };
        let literal = to_literal(&Value::Decimal { value: 8_000_000, scale: 2 }, &salary).unwrap();

        let Some(LiteralType::Decimal(d)) = &literal.literal_type else {
            panic!("expected decimal literal");
        };
        assert_eq!(d.value.len(), 16);
        assert_eq!(d.value[..4], 8_000_000i32.to_le_bytes());

        let (value, data_type) = from_literal(&literal).unwrap();
        assert_eq!(data_type, salary);
        assert_eq!(value.as_scaled(2), Some(8_000_000));
    }

    #[test]
    fn test_integer_widens_into_declared_type() {
        let literal = to_literal(&Value::Int32(80_000), &DataType::Decimal { precision: 12, scale: 2 })
            .unwrap();
        let (value, _) = from_literal(&literal).unwrap();
        assert_eq!(value.as_scaled(2), Some(8_000_000));

        let literal = to_literal(&Value::Int32(5), &DataType::Int64).unwrap();
        assert_eq!(literal.literal_type, Some(LiteralType::I64(5)));
    }

    #[test]
    fn test_value_outside_type_is_unresolved() {
        assert!(matches!(
            to_literal(&Value::Int32(300), &DataType::Int8),
            Err(SubstraitError::UnresolvedReference(_))
        ));
        assert!(matches!(
            to_literal(&Value::Varchar("x".into()), &DataType::Int32),
            Err(SubstraitError::UnresolvedReference(_))
        ));
    }

    #[test]
    fn test_typed_null() {
        let literal = to_literal(&Value::Null, &DataType::Varchar).unwrap();
        assert!(literal.nullable);
        let (value, data_type) = from_literal(&literal).unwrap();
        assert!(value.is_null());
        assert_eq!(data_type, DataType::Varchar);
    }

    #[test]
    fn test_short_decimal_is_malformed() {
        let literal = Literal {
            literal_type: Some(LiteralType::Decimal(literal::Decimal {
                value: vec![1, 2, 3],
                precision: 10,
                scale: 2,
            })),
            ..Default::default()
        };
        assert!(matches!(from_literal(&literal), Err(SubstraitError::MalformedPlan(_))));
    }
}
