//! Mapping between logical types and Substrait types

use crate::error::{Result, SubstraitError};
use substrait::proto::r#type::{self, Kind, Nullability};
use substrait::proto::{NamedStruct, Type};
use subql_ir::{DataType, Field};

fn nullability(nullable: bool) -> i32 {
    if nullable {
        Nullability::Nullable as i32
    } else {
        Nullability::Required as i32
    }
}

/// Substrait type for a logical type.
///
/// Untyped NULL has no Substrait counterpart and travels as a nullable INTEGER.
pub fn to_substrait_type(data_type: &DataType, nullable: bool) -> Type {
    let n = nullability(nullable);
    let kind = match data_type {
        DataType::Boolean => Kind::Bool(r#type::Boolean {
            nullability: n,
            ..Default::default()
        }),
        DataType::Int8 => Kind::I8(r#type::I8 {
            nullability: n,
            ..Default::default()
        }),
        DataType::Int16 => Kind::I16(r#type::I16 {
            nullability: n,
            ..Default::default()
        }),
        DataType::Int32 => Kind::I32(r#type::I32 {
            nullability: n,
            ..Default::default()
        }),
        DataType::Null => Kind::I32(r#type::I32 {
            nullability: Nullability::Nullable as i32,
            ..Default::default()
        }),
        DataType::Int64 => Kind::I64(r#type::I64 {
            nullability: n,
            ..Default::default()
        }),
        DataType::Float32 => Kind::Fp32(r#type::Fp32 {
            nullability: n,
            ..Default::default()
        }),
        DataType::Float64 => Kind::Fp64(r#type::Fp64 {
            nullability: n,
            ..Default::default()
        }),
        DataType::Decimal { precision, scale } => Kind::Decimal(r#type::Decimal {
            precision: *precision as i32,
            scale: *scale as i32,
            nullability: n,
            ..Default::default()
        }),
        DataType::Varchar => Kind::String(r#type::String {
            nullability: n,
            ..Default::default()
        }),
        DataType::Blob => Kind::Binary(r#type::Binary {
            nullability: n,
            ..Default::default()
        }),
        DataType::Date => Kind::Date(r#type::Date {
            nullability: n,
            ..Default::default()
        }),
        DataType::Timestamp => Kind::PrecisionTimestamp(r#type::PrecisionTimestamp {
            precision: 6,
            nullability: n,
            ..Default::default()
        }),
    };
    Type { kind: Some(kind) }
}

/// Logical type and nullability for a Substrait type.
pub fn from_substrait_type(ty: &Type) -> Result<(DataType, bool)> {
    let Some(kind) = &ty.kind else {
        return Err(SubstraitError::MalformedPlan("type without a kind".to_string()));
    };
    let (data_type, n) = match kind {
        Kind::Bool(t) => (DataType::Boolean, t.nullability),
        Kind::I8(t) => (DataType::Int8, t.nullability),
        Kind::I16(t) => (DataType::Int16, t.nullability),
        Kind::I32(t) => (DataType::Int32, t.nullability),
        Kind::I64(t) => (DataType::Int64, t.nullability),
        Kind::Fp32(t) => (DataType::Float32, t.nullability),
        Kind::Fp64(t) => (DataType::Float64, t.nullability),
        Kind::Decimal(t) => (decimal_type(t.precision, t.scale)?, t.nullability),
        Kind::String(t) => (DataType::Varchar, t.nullability),
        Kind::Varchar(t) => (DataType::Varchar, t.nullability),
        Kind::FixedChar(t) => (DataType::Varchar, t.nullability),
        Kind::Binary(t) => (DataType::Blob, t.nullability),
        Kind::Date(t) => (DataType::Date, t.nullability),
        Kind::PrecisionTimestamp(t) => (DataType::Timestamp, t.nullability),
        _ => {
            return Err(SubstraitError::UnsupportedOperator(
                "type has no logical equivalent".to_string(),
            ))
        }
    };
    Ok((data_type, n != Nullability::Required as i32))
}

pub(crate) fn decimal_type(precision: i32, scale: i32) -> Result<DataType> {
    let max = subql_ir::MAX_DECIMAL_PRECISION as i32;
    if !(1..=max).contains(&precision) || scale < 0 || scale > precision {
        return Err(SubstraitError::MalformedPlan(format!(
            "invalid decimal type DECIMAL({},{})",
            precision, scale
        )));
    }
    Ok(DataType::Decimal {
        precision: precision as u8,
        scale: scale as u8,
    })
}

pub fn named_struct(fields: &[Field]) -> NamedStruct {
    NamedStruct {
        names: fields.iter().map(|f| f.name.clone()).collect(),
        r#struct: Some(r#type::Struct {
            types: fields
                .iter()
                .map(|f| to_substrait_type(&f.data_type, f.nullable))
                .collect(),
            nullability: Nullability::Required as i32,
            ..Default::default()
        }),
    }
}

pub fn fields_from_named_struct(schema: &NamedStruct) -> Result<Vec<Field>> {
    let types = schema.r#struct.as_ref().map(|s| s.types.as_slice()).unwrap_or(&[]);
    if types.len() != schema.names.len() {
        return Err(SubstraitError::MalformedPlan(format!(
            "schema declares {} names for {} types",
            schema.names.len(),
            types.len()
        )));
    }
    schema
        .names
        .iter()
        .zip(types)
        .map(|(name, ty)| {
            let (data_type, nullable) = from_substrait_type(ty)?;
            Ok(Field::new(name.clone(), data_type, nullable))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mapping_keeps_nullability() {
        let salary = DataType::Decimal { precision: 10, scale: 2 };
        let ty = to_substrait_type(&salary, false);
        assert!(matches!(ty.kind, Some(Kind::Decimal(ref d)) if d.precision == 10 && d.scale == 2));
        assert_eq!(from_substrait_type(&ty).unwrap(), (salary, false));

        let ty = to_substrait_type(&DataType::Timestamp, true);
        assert_eq!(from_substrait_type(&ty).unwrap(), (DataType::Timestamp, true));
    }

    #[test]
    fn test_untyped_null_travels_as_integer() {
        let ty = to_substrait_type(&DataType::Null, false);
        assert_eq!(from_substrait_type(&ty).unwrap(), (DataType::Int32, true));
    }

    #[test]
    fn test_missing_kind_is_malformed() {
        let ty = Type { kind: None };
        assert!(matches!(from_substrait_type(&ty), Err(SubstraitError::MalformedPlan(_))));
    }

    #[test]
    fn test_named_struct_arity() {
        let fields = vec![
            Field::new("employee_id", DataType::Int32, false),
            Field::new("name", DataType::Varchar, true),
        ];
        let mut schema = named_struct(&fields);
        assert_eq!(fields_from_named_struct(&schema).unwrap(), fields);

        schema.names.pop();
        assert!(matches!(
            fields_from_named_struct(&schema),
            Err(SubstraitError::MalformedPlan(_))
        ));
    }
}
