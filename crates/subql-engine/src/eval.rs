//! Scalar expression evaluation

use crate::error::ExecutionError;
use std::cmp::Ordering;
use subql_ir::{
    parse_date, parse_timestamp, pow10, DataType, Expr, Value, MICROS_PER_DAY,
};

type Result<T> = std::result::Result<T, ExecutionError>;

/// Evaluate `expr` against one input row.
pub fn eval(expr: &Expr, row: &[Value]) -> Result<Value> {
    match expr {
        Expr::Column { index, .. } => row.get(*index).cloned().ok_or_else(|| {
            ExecutionError::Internal(format!(
                "column #{} out of range for row of {} values",
                index,
                row.len()
            ))
        }),
        Expr::Literal { value, .. } => Ok(value.clone()),
        Expr::Function {
            name,
            args,
            return_type,
        } => {
            if name == "coalesce" {
                for arg in args {
                    let value = eval(arg, row)?;
                    if !value.is_null() {
                        return cast_value(&value, *return_type);
                    }
                }
                return Ok(Value::Null);
            }
            let values = args
                .iter()
                .map(|a| eval(a, row))
                .collect::<Result<Vec<_>>>()?;
            call(name, &values, *return_type)
        }
        Expr::Case {
            branches,
            else_result,
            ..
        } => {
            for branch in branches {
                if truthy(&eval(&branch.condition, row)?) == Some(true) {
                    return eval(&branch.result, row);
                }
            }
            eval(else_result, row)
        }
        Expr::Cast { expr, data_type } => cast_value(&eval(expr, row)?, *data_type),
        Expr::InList { expr, list } => {
            let value = eval(expr, row)?;
            if value.is_null() {
                return Ok(Value::Null);
            }
            let mut saw_null = false;
            for option in list {
                let option = eval(option, row)?;
                match value.sql_cmp(&option) {
                    Some(Ordering::Equal) => return Ok(Value::Boolean(true)),
                    None if option.is_null() => saw_null = true,
                    _ => {}
                }
            }
            Ok(if saw_null { Value::Null } else { Value::Boolean(false) })
        }
    }
}

/// Three-valued truth of a boolean value; NULL is `None`.
pub fn truthy(value: &Value) -> Option<bool> {
    value.as_bool()
}

fn call(name: &str, args: &[Value], return_type: DataType) -> Result<Value> {
    let arg = |i: usize| -> Result<&Value> {
        args.get(i).ok_or_else(|| {
            ExecutionError::Internal(format!("{} called with {} arguments", name, args.len()))
        })
    };

    match name {
        "equal" | "not_equal" | "lt" | "lte" | "gt" | "gte" => {
            let Some(ordering) = compare(arg(0)?, arg(1)?)? else {
                return Ok(Value::Null);
            };
            let result = match name {
                "equal" => ordering == Ordering::Equal,
                "not_equal" => ordering != Ordering::Equal,
                "lt" => ordering == Ordering::Less,
                "lte" => ordering != Ordering::Greater,
                "gt" => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Value::Boolean(result))
        }
        "is_distinct_from" | "is_not_distinct_from" => {
            let (a, b) = (arg(0)?, arg(1)?);
            let same = match (a.is_null(), b.is_null()) {
                (true, true) => true,
                (false, false) => compare(a, b)? == Some(Ordering::Equal),
                _ => false,
            };
            Ok(Value::Boolean(same == (name == "is_not_distinct_from")))
        }
        "between" => {
            let value = arg(0)?;
            let low = compare(value, arg(1)?)?.map(|o| o != Ordering::Less);
            let high = compare(value, arg(2)?)?.map(|o| o != Ordering::Greater);
            Ok(and3([low, high]))
        }
        "and" => Ok(and3(args.iter().map(truthy))),
        "or" => {
            let mut saw_null = false;
            for value in args {
                match truthy(value) {
                    Some(true) => return Ok(Value::Boolean(true)),
                    None => saw_null = true,
                    Some(false) => {}
                }
            }
            Ok(if saw_null { Value::Null } else { Value::Boolean(false) })
        }
        "not" => Ok(truthy(arg(0)?).map_or(Value::Null, |b| Value::Boolean(!b))),
        "is_null" => Ok(Value::Boolean(arg(0)?.is_null())),
        "is_not_null" => Ok(Value::Boolean(!arg(0)?.is_null())),
        "like" => match (arg(0)?, arg(1)?) {
            (Value::Varchar(text), Value::Varchar(pattern)) => Ok(Value::Boolean(like(text, pattern))),
            _ => Ok(Value::Null),
        },
        "add" | "subtract" | "multiply" | "divide" | "mod" => {
            arithmetic(name, arg(0)?, arg(1)?, return_type)
        }
        "negate" => negate(arg(0)?),
        "abs" => match arg(0)? {
            v if v.sql_cmp(&Value::Int32(0)) == Some(Ordering::Less) => negate(v),
            v => Ok(v.clone()),
        },
        "round" => {
            let digits = match args.get(1) {
                Some(Value::Null) => return Ok(Value::Null),
                Some(d) => d.as_i64().unwrap_or(0),
                None => 0,
            };
            round(arg(0)?, digits)
        }
        "concat" => {
            let mut out = String::new();
            for value in args.iter().filter(|v| !v.is_null()) {
                out.push_str(&value.to_string());
            }
            Ok(Value::Varchar(out))
        }
        "lower" | "upper" => match arg(0)? {
            Value::Varchar(s) if name == "lower" => Ok(Value::Varchar(s.to_lowercase())),
            Value::Varchar(s) => Ok(Value::Varchar(s.to_uppercase())),
            _ => Ok(Value::Null),
        },
        "length" => match arg(0)? {
            Value::Varchar(s) => Ok(Value::Int64(s.chars().count() as i64)),
            _ => Ok(Value::Null),
        },
        "substr" => {
            let Value::Varchar(s) = arg(0)? else {
                return Ok(Value::Null);
            };
            let Some(start) = arg(1)?.as_i64() else {
                return Ok(Value::Null);
            };
            let length = match args.get(2) {
                Some(v) => match v.as_i64() {
                    Some(n) => Some(n.max(0)),
                    None => return Ok(Value::Null),
                },
                None => None,
            };
            // 1-based start; positions before the first character consume length
            let (skip, length) = if start >= 1 {
                (start - 1, length)
            } else {
                (0, length.map(|n| (n + start - 1).max(0)))
            };
            let chars = s.chars().skip(skip as usize);
            let out: String = match length {
                Some(n) => chars.take(n as usize).collect(),
                None => chars.collect(),
            };
            Ok(Value::Varchar(out))
        }
        other => Err(ExecutionError::Internal(format!(
            "function {} cannot be evaluated as a scalar",
            other
        ))),
    }
}

/// SQL comparison with NULL propagation.
pub fn compare(a: &Value, b: &Value) -> Result<Option<Ordering>> {
    if a.is_null() || b.is_null() {
        return Ok(None);
    }
    a.sql_cmp(b)
        .map(Some)
        .ok_or_else(|| ExecutionError::InvalidCast(format!("cannot compare {} with {}", a, b)))
}

fn and3(values: impl IntoIterator<Item = Option<bool>>) -> Value {
    let mut saw_null = false;
    for value in values {
        match value {
            Some(false) => return Value::Boolean(false),
            None => saw_null = true,
            Some(true) => {}
        }
    }
    if saw_null {
        Value::Null
    } else {
        Value::Boolean(true)
    }
}

/// `%` matches any run of characters, `_` exactly one.
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((bp, bt)) = backtrack {
            p = bp + 1;
            t = bt + 1;
            backtrack = Some((bp, bt + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '%')
}

/// Scaled integer and scale of an exact numeric value.
fn exact_parts(value: &Value) -> Option<(i128, u8)> {
    match value {
        Value::Decimal { value, scale } => Some((*value, *scale)),
        other => other.as_i64().map(|v| (v as i128, 0)),
    }
}

fn overflow(op: &str, a: &Value, b: &Value) -> ExecutionError {
    ExecutionError::Overflow(format!("overflow in {} of {} and {}", op, a, b))
}

fn arithmetic(op: &str, a: &Value, b: &Value, return_type: DataType) -> Result<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }

    match return_type {
        DataType::Float32 | DataType::Float64 => {
            let (x, y) = match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => (x, y),
                _ => return Err(ExecutionError::InvalidCast(format!("{} of {} and {}", op, a, b))),
            };
            let result = match op {
                "add" => x + y,
                "subtract" => x - y,
                "multiply" => x * y,
                "divide" | "mod" if y == 0.0 => return Ok(Value::Null),
                "divide" => x / y,
                _ => x % y,
            };
            Ok(if return_type == DataType::Float32 {
                Value::Float32(result as f32)
            } else {
                Value::Float64(result)
            })
        }
        DataType::Decimal { precision, scale } => {
            let (Some((x, sx)), Some((y, sy))) = (exact_parts(a), exact_parts(b)) else {
                return Err(ExecutionError::InvalidCast(format!("{} of {} and {}", op, a, b)));
            };
            let at_scale = |v: i128, s: u8| Value::Decimal { value: v, scale: s }.as_scaled(scale);
            let result = match op {
                "multiply" => {
                    let product = x.checked_mul(y).ok_or_else(|| overflow(op, a, b))?;
                    Value::Decimal { value: product, scale: sx + sy }.as_scaled(scale)
                }
                _ => {
                    let (x, y) = match (at_scale(x, sx), at_scale(y, sy)) {
                        (Some(x), Some(y)) => (x, y),
                        _ => return Err(overflow(op, a, b)),
                    };
                    match op {
                        "add" => x.checked_add(y),
                        "subtract" => x.checked_sub(y),
                        "mod" if y == 0 => return Ok(Value::Null),
                        _ => x.checked_rem(y),
                    }
                }
            }
            .ok_or_else(|| overflow(op, a, b))?;
            decimal(result, precision, scale)
        }
        t if t.is_integer() => {
            let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) else {
                return Err(ExecutionError::InvalidCast(format!("{} of {} and {}", op, a, b)));
            };
            let result = match op {
                "add" => x.checked_add(y),
                "subtract" => x.checked_sub(y),
                "multiply" => x.checked_mul(y),
                "mod" | "divide" if y == 0 => return Ok(Value::Null),
                "mod" => x.checked_rem(y),
                _ => x.checked_div(y),
            }
            .ok_or_else(|| overflow(op, a, b))?;
            narrow(result, t)
        }
        other => Err(ExecutionError::Internal(format!("{} returning {}", op, other))),
    }
}

fn decimal(value: i128, precision: u8, scale: u8) -> Result<Value> {
    match pow10(precision) {
        Some(limit) if value.abs() >= limit => Err(ExecutionError::Overflow(format!(
            "{} does not fit DECIMAL({},{})",
            Value::Decimal { value, scale },
            precision,
            scale
        ))),
        _ => Ok(Value::Decimal { value, scale }),
    }
}

/// Fit an i64 into an integer type.
fn narrow(value: i64, data_type: DataType) -> Result<Value> {
    let out_of_range = || ExecutionError::Overflow(format!("{} is out of range for {}", value, data_type));
    Ok(match data_type {
        DataType::Int8 => Value::Int8(i8::try_from(value).map_err(|_| out_of_range())?),
        DataType::Int16 => Value::Int16(i16::try_from(value).map_err(|_| out_of_range())?),
        DataType::Int32 => Value::Int32(i32::try_from(value).map_err(|_| out_of_range())?),
        _ => Value::Int64(value),
    })
}

fn negate(value: &Value) -> Result<Value> {
    let overflow = || ExecutionError::Overflow(format!("cannot negate {}", value));
    Ok(match value {
        Value::Null => Value::Null,
        Value::Int8(v) => Value::Int8(v.checked_neg().ok_or_else(overflow)?),
        Value::Int16(v) => Value::Int16(v.checked_neg().ok_or_else(overflow)?),
        Value::Int32(v) => Value::Int32(v.checked_neg().ok_or_else(overflow)?),
        Value::Int64(v) => Value::Int64(v.checked_neg().ok_or_else(overflow)?),
        Value::Float32(v) => Value::Float32(-v),
        Value::Float64(v) => Value::Float64(-v),
        Value::Decimal { value, scale } => Value::Decimal {
            value: -value,
            scale: *scale,
        },
        other => return Err(ExecutionError::InvalidCast(format!("cannot negate {}", other))),
    })
}

fn round(value: &Value, digits: i64) -> Result<Value> {
    Ok(match value {
        Value::Float32(v) => {
            let factor = 10f64.powi(digits as i32);
            Value::Float32(((*v as f64 * factor).round() / factor) as f32)
        }
        Value::Float64(v) => {
            let factor = 10f64.powi(digits as i32);
            Value::Float64((v * factor).round() / factor)
        }
        Value::Decimal { value: v, scale } if digits >= 0 && (digits as u8) < *scale => {
            let kept = Value::Decimal { value: *v, scale: *scale }
                .as_scaled(digits as u8)
                .and_then(|r| Value::Decimal { value: r, scale: digits as u8 }.as_scaled(*scale))
                .ok_or_else(|| ExecutionError::Overflow(format!("cannot round {}", value)))?;
            Value::Decimal {
                value: kept,
                scale: *scale,
            }
        }
        other => other.clone(),
    })
}

/// Parse decimal text into a scaled integer, rounding half away from zero.
fn parse_scaled(text: &str, scale: u8) -> Option<i128> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    if (int_part.is_empty() && frac_part.is_empty())
        || !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit())
    {
        return None;
    }
    let scale = scale as usize;
    let mut frac: String = frac_part.chars().take(scale).collect();
    while frac.len() < scale {
        frac.push('0');
    }
    let combined = format!("{}{}", int_part, frac);
    let mut value: i128 = if combined.is_empty() { 0 } else { combined.parse().ok()? };
    if frac_part.chars().nth(scale).is_some_and(|c| c >= '5') {
        value = value.checked_add(1)?;
    }
    Some(if negative { -value } else { value })
}

/// Convert a value to `target`, failing when the value does not fit.
pub fn cast_value(value: &Value, target: DataType) -> Result<Value> {
    if value.is_null() || value.data_type() == target || target == DataType::Null {
        return Ok(value.clone());
    }
    let invalid = || {
        ExecutionError::InvalidCast(format!(
            "Could not convert {} of type {} to {}",
            value,
            value.data_type(),
            target
        ))
    };

    match target {
        DataType::Boolean => match value {
            Value::Varchar(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" | "yes" | "y" => Ok(Value::Boolean(true)),
                "false" | "f" | "0" | "no" | "n" => Ok(Value::Boolean(false)),
                _ => Err(invalid()),
            },
            v => v.as_i64().map(|i| Value::Boolean(i != 0)).ok_or_else(invalid),
        },
        t if t.is_integer() => {
            let integer = match value {
                Value::Boolean(b) => *b as i64,
                Value::Float32(_) | Value::Float64(_) => {
                    let f = value.as_f64().ok_or_else(invalid)?.round();
                    if !f.is_finite() || f < i64::MIN as f64 || f > i64::MAX as f64 {
                        return Err(invalid());
                    }
                    f as i64
                }
                Value::Decimal { .. } => value
                    .as_scaled(0)
                    .and_then(|v| i64::try_from(v).ok())
                    .ok_or_else(invalid)?,
                Value::Varchar(s) => match s.trim().parse::<i64>() {
                    Ok(v) => v,
                    Err(_) => parse_scaled(s, 0)
                        .and_then(|v| i64::try_from(v).ok())
                        .ok_or_else(invalid)?,
                },
                v => v.as_i64().ok_or_else(invalid)?,
            };
            narrow(integer, t).map_err(|_| invalid())
        }
        DataType::Float32 | DataType::Float64 => {
            let f = match value {
                Value::Varchar(s) => s.trim().parse::<f64>().map_err(|_| invalid())?,
                Value::Boolean(b) => *b as i64 as f64,
                v => v.as_f64().ok_or_else(invalid)?,
            };
            Ok(if target == DataType::Float32 {
                Value::Float32(f as f32)
            } else {
                Value::Float64(f)
            })
        }
        DataType::Decimal { precision, scale } => {
            let scaled = match value {
                Value::Float32(_) | Value::Float64(_) => {
                    let factor = pow10(scale).ok_or_else(invalid)? as f64;
                    let f = (value.as_f64().ok_or_else(invalid)? * factor).round();
                    if !f.is_finite() || f.abs() >= 1e38 {
                        return Err(invalid());
                    }
                    f as i128
                }
                Value::Varchar(s) => parse_scaled(s, scale).ok_or_else(invalid)?,
                v => v.as_scaled(scale).ok_or_else(invalid)?,
            };
            decimal(scaled, precision, scale).map_err(|_| invalid())
        }
        DataType::Varchar => Ok(Value::Varchar(value.to_string())),
        DataType::Blob => match value {
            Value::Varchar(s) => Ok(Value::Blob(s.as_bytes().to_vec())),
            _ => Err(invalid()),
        },
        DataType::Date => match value {
            Value::Timestamp(t) => i32::try_from(t.div_euclid(MICROS_PER_DAY))
                .map(Value::Date)
                .map_err(|_| invalid()),
            Value::Varchar(s) => parse_date(s).map(Value::Date).ok_or_else(invalid),
            _ => Err(invalid()),
        },
        DataType::Timestamp => match value {
            Value::Date(d) => Ok(Value::Timestamp(*d as i64 * MICROS_PER_DAY)),
            Value::Varchar(s) => parse_timestamp(s).map(Value::Timestamp).ok_or_else(invalid),
            _ => Err(invalid()),
        },
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(value: i128, scale: u8) -> Value {
        Value::Decimal { value, scale }
    }

    #[test]
    fn test_three_valued_logic() {
        assert_eq!(call("and", &[Value::Boolean(true), Value::Null], DataType::Boolean).unwrap(), Value::Null);
        assert_eq!(
            call("and", &[Value::Boolean(false), Value::Null], DataType::Boolean).unwrap(),
            Value::Boolean(false)
        );
        assert_eq!(
            call("or", &[Value::Null, Value::Boolean(true)], DataType::Boolean).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(call("not", &[Value::Null], DataType::Boolean).unwrap(), Value::Null);
        assert_eq!(
            call("equal", &[Value::Int32(1), Value::Null], DataType::Boolean).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_decimal_arithmetic_keeps_scale() {
        let salary = DataType::Decimal { precision: 20, scale: 2 };
        // 45.50 * 2000
        assert_eq!(
            arithmetic("multiply", &dec(4550, 2), &Value::Int32(2000), salary).unwrap(),
            dec(9_100_000, 2)
        );
        assert_eq!(
            arithmetic("add", &dec(150, 2), &Value::Int32(1), DataType::Decimal { precision: 12, scale: 2 })
                .unwrap(),
            dec(250, 2)
        );
        assert_eq!(
            arithmetic("divide", &Value::Int32(7), &Value::Int32(2), DataType::Float64).unwrap(),
            Value::Float64(3.5)
        );
        assert_eq!(
            arithmetic("divide", &Value::Int32(7), &Value::Int32(0), DataType::Float64).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_integer_overflow() {
        assert!(matches!(
            arithmetic("add", &Value::Int32(i32::MAX), &Value::Int32(1), DataType::Int32),
            Err(ExecutionError::Overflow(_))
        ));
    }

    #[test]
    fn test_like_patterns() {
        assert!(like("Alice", "A%"));
        assert!(like("Alice", "%li%"));
        assert!(like("Bob", "B_b"));
        assert!(!like("Bob", "B_"));
        assert!(like("", "%"));
        assert!(like("abcabd", "%abd"));
    }

    #[test]
    fn test_casts() {
        assert_eq!(
            cast_value(&Value::Varchar("12.345".into()), DataType::Decimal { precision: 10, scale: 2 })
                .unwrap(),
            dec(1235, 2)
        );
        assert_eq!(cast_value(&Value::Float64(2.5), DataType::Int32).unwrap(), Value::Int32(3));
        assert_eq!(cast_value(&dec(-1250, 2), DataType::Int64).unwrap(), Value::Int64(-13));
        assert_eq!(cast_value(&Value::Int32(7), DataType::Varchar).unwrap(), Value::Varchar("7".into()));
        assert_eq!(
            cast_value(&Value::Varchar("2024-02-29".into()), DataType::Date).unwrap(),
            Value::Date(19782)
        );
        assert!(matches!(
            cast_value(&Value::Varchar("abc".into()), DataType::Int32),
            Err(ExecutionError::InvalidCast(_))
        ));
        assert!(matches!(
            cast_value(&Value::Int32(300), DataType::Int8),
            Err(ExecutionError::InvalidCast(_))
        ));
    }

    #[test]
    fn test_substring_and_length() {
        let text = Value::Varchar("substrait".into());
        assert_eq!(
            call("substr", &[text.clone(), Value::Int32(1), Value::Int32(3)], DataType::Varchar).unwrap(),
            Value::Varchar("sub".into())
        );
        assert_eq!(
            call("substr", &[text.clone(), Value::Int32(4)], DataType::Varchar).unwrap(),
            Value::Varchar("strait".into())
        );
        assert_eq!(call("length", &[text], DataType::Int64).unwrap(), Value::Int64(9));
    }

    #[test]
    fn test_in_list_with_null() {
        let expr = Expr::InList {
            expr: Box::new(Expr::column(0, DataType::Int32)),
            list: vec![Expr::literal(Value::Int32(1)), Expr::null(DataType::Int32)],
        };
        assert_eq!(eval(&expr, &[Value::Int32(1)]).unwrap(), Value::Boolean(true));
        assert_eq!(eval(&expr, &[Value::Int32(2)]).unwrap(), Value::Null);
    }
}
