//! Function registry
//!
//! Holds the scalar and aggregate functions the engine understands, infers
//! their return types, and maps internal names to the names used in
//! Substrait extension declarations.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use subql_ir::{DataType, MAX_DECIMAL_PRECISION};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error("Function {func} expects {expected} arguments, got {actual}")]
    WrongArity {
        func: String,
        expected: String,
        actual: usize,
    },

    #[error("Type mismatch for function {func}: no overload accepts {actual:?}")]
    TypeMismatch { func: String, actual: Vec<DataType> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionKind {
    Scalar,
    Aggregate,
}

/// How a function derives its return type from its argument types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnRule {
    /// Two comparable arguments, boolean result
    Comparison,
    /// Boolean arguments, boolean result
    Logical,
    /// Any argument, boolean result
    NullTest,
    /// Three comparable arguments, boolean result
    Between,
    /// Two strings, boolean result
    Pattern,
    Add,
    Multiply,
    Divide,
    Modulus,
    /// Numeric argument, same type back
    SameNumeric,
    /// Any arguments, string result
    Concat,
    /// String in, string out
    StringUnary,
    StringLength,
    Substring,
    /// Common supertype of all arguments
    Coalesce,
    Count,
    Sum,
    Average,
    /// Aggregate returning its argument type
    SameAsArgument,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub name: String,
    /// Name used in Substrait extension declarations
    pub substrait_name: String,
    pub kind: FunctionKind,
    pub min_args: usize,
    /// `None` means variadic
    pub max_args: Option<usize>,
    pub rule: ReturnRule,
}

#[derive(Debug)]
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionSignature>,
    /// Substrait name → internal names sharing it
    by_substrait: HashMap<String, Vec<String>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            functions: HashMap::new(),
            by_substrait: HashMap::new(),
        };
        registry.register_builtins();
        registry
    }

    /// Shared registry with the builtin functions.
    pub fn builtin() -> &'static FunctionRegistry {
        static REGISTRY: OnceLock<FunctionRegistry> = OnceLock::new();
        REGISTRY.get_or_init(FunctionRegistry::new)
    }

    fn register_builtins(&mut self) {
        use FunctionKind::{Aggregate, Scalar};
        use ReturnRule::*;

        let builtins: &[(&str, &str, FunctionKind, usize, Option<usize>, ReturnRule)] = &[
            ("equal", "equal", Scalar, 2, Some(2), Comparison),
            ("not_equal", "not_equal", Scalar, 2, Some(2), Comparison),
            ("lt", "lt", Scalar, 2, Some(2), Comparison),
            ("lte", "lte", Scalar, 2, Some(2), Comparison),
            ("gt", "gt", Scalar, 2, Some(2), Comparison),
            ("gte", "gte", Scalar, 2, Some(2), Comparison),
            ("is_not_distinct_from", "is_not_distinct_from", Scalar, 2, Some(2), Comparison),
            ("is_distinct_from", "is_distinct_from", Scalar, 2, Some(2), Comparison),
            ("between", "between", Scalar, 3, Some(3), Between),
            ("and", "and", Scalar, 2, None, Logical),
            ("or", "or", Scalar, 2, None, Logical),
            ("not", "not", Scalar, 1, Some(1), Logical),
            ("is_null", "is_null", Scalar, 1, Some(1), NullTest),
            ("is_not_null", "is_not_null", Scalar, 1, Some(1), NullTest),
            ("like", "like", Scalar, 2, Some(2), Pattern),
            ("add", "add", Scalar, 2, Some(2), Add),
            ("subtract", "subtract", Scalar, 2, Some(2), Add),
            ("multiply", "multiply", Scalar, 2, Some(2), Multiply),
            ("divide", "divide", Scalar, 2, Some(2), Divide),
            ("mod", "modulus", Scalar, 2, Some(2), Modulus),
            ("negate", "negate", Scalar, 1, Some(1), SameNumeric),
            ("abs", "abs", Scalar, 1, Some(1), SameNumeric),
            ("round", "round", Scalar, 1, Some(2), SameNumeric),
            ("concat", "concat", Scalar, 1, None, Concat),
            ("lower", "lower", Scalar, 1, Some(1), StringUnary),
            ("upper", "upper", Scalar, 1, Some(1), StringUnary),
            ("length", "char_length", Scalar, 1, Some(1), StringLength),
            ("substr", "substring", Scalar, 2, Some(3), Substring),
            ("coalesce", "coalesce", Scalar, 1, None, Coalesce),
            ("count", "count", Aggregate, 1, Some(1), Count),
            ("count_star", "count", Aggregate, 0, Some(0), Count),
            ("sum", "sum", Aggregate, 1, Some(1), Sum),
            ("avg", "avg", Aggregate, 1, Some(1), Average),
            ("min", "min", Aggregate, 1, Some(1), SameAsArgument),
            ("max", "max", Aggregate, 1, Some(1), SameAsArgument),
            ("first", "any_value", Aggregate, 1, Some(1), SameAsArgument),
        ];

        for (name, substrait_name, kind, min_args, max_args, rule) in builtins {
            self.register(FunctionSignature {
                name: name.to_string(),
                substrait_name: substrait_name.to_string(),
                kind: *kind,
                min_args: *min_args,
                max_args: *max_args,
                rule: *rule,
            });
        }
    }

    pub fn register(&mut self, sig: FunctionSignature) {
        self.by_substrait
            .entry(sig.substrait_name.clone())
            .or_default()
            .push(sig.name.clone());
        self.functions.insert(sig.name.clone(), sig);
    }

    pub fn lookup(&self, name: &str) -> Option<&FunctionSignature> {
        self.functions.get(&name.to_lowercase())
    }

    pub fn is_aggregate(&self, name: &str) -> bool {
        self.lookup(name)
            .map(|sig| sig.kind == FunctionKind::Aggregate)
            .unwrap_or(false)
    }

    /// Infer the return type of `name` applied to `arg_types`.
    pub fn resolve(&self, name: &str, arg_types: &[DataType]) -> Result<DataType, RegistryError> {
        let sig = self
            .lookup(name)
            .ok_or_else(|| RegistryError::FunctionNotFound(name.to_string()))?;

        let arity_ok = arg_types.len() >= sig.min_args
            && sig.max_args.map_or(true, |max| arg_types.len() <= max);
        if !arity_ok {
            let expected = match sig.max_args {
                Some(max) if max == sig.min_args => max.to_string(),
                Some(max) => format!("{} to {}", sig.min_args, max),
                None => format!("at least {}", sig.min_args),
            };
            return Err(RegistryError::WrongArity {
                func: sig.name.clone(),
                expected,
                actual: arg_types.len(),
            });
        }

        infer(sig.rule, arg_types).ok_or_else(|| RegistryError::TypeMismatch {
            func: sig.name.clone(),
            actual: arg_types.to_vec(),
        })
    }

    /// Substrait name for an internal function name.
    pub fn substrait_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.lookup(name)
            .map(|sig| sig.substrait_name.as_str())
            .unwrap_or(name)
    }

    /// URI of the standard extension file declaring the Substrait form of
    /// `name` applied to `arg_types`.
    pub fn extension_uri(&self, name: &str, arg_types: &[DataType]) -> String {
        let decimal = arg_types.iter().any(|t| matches!(t, DataType::Decimal { .. }));
        let file = match self.substrait_name(name) {
            "equal" | "not_equal" | "lt" | "lte" | "gt" | "gte" | "is_distinct_from"
            | "is_not_distinct_from" | "between" | "is_null" | "is_not_null" | "coalesce" => {
                "functions_comparison.yaml"
            }
            "and" | "or" | "not" => "functions_boolean.yaml",
            "like" | "concat" | "lower" | "upper" | "char_length" | "substring" => "functions_string.yaml",
            "round" if decimal => "functions_rounding_decimal.yaml",
            "round" => "functions_rounding.yaml",
            "count" | "any_value" => "functions_aggregate_generic.yaml",
            "add" | "subtract" | "multiply" | "divide" | "modulus" | "abs" | "sum" | "avg" | "min"
            | "max"
                if decimal =>
            {
                "functions_arithmetic_decimal.yaml"
            }
            _ => "functions_arithmetic.yaml",
        };
        format!("{}{}", EXTENSION_URI_PREFIX, file)
    }

    /// Internal name for a Substrait function name, disambiguated by arity
    /// (`count` with no arguments is `count_star`).
    pub fn internal_name(&self, substrait_name: &str, arg_count: usize) -> Option<&str> {
        let candidates = self.by_substrait.get(&substrait_name.to_lowercase())?;
        candidates
            .iter()
            .filter_map(|n| self.functions.get(n))
            .find(|sig| {
                arg_count >= sig.min_args && sig.max_args.map_or(true, |max| arg_count <= max)
            })
            .map(|sig| sig.name.as_str())
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Location of the standard Substrait function extension files.
pub const EXTENSION_URI_PREFIX: &str = "https://github.com/substrait-io/substrait/blob/main/extensions/";

/// Short type names used in compound Substrait function names (`add:i32_i32`).
pub fn type_signature_name(data_type: &DataType) -> &'static str {
    match data_type {
        DataType::Boolean => "bool",
        DataType::Int8 => "i8",
        DataType::Int16 => "i16",
        DataType::Int32 => "i32",
        DataType::Int64 => "i64",
        DataType::Float32 => "fp32",
        DataType::Float64 => "fp64",
        DataType::Decimal { .. } => "dec",
        DataType::Varchar => "str",
        DataType::Blob => "vbin",
        DataType::Date => "date",
        DataType::Timestamp => "pts",
        DataType::Null => "any",
    }
}

/// Compound Substrait function name, `name:arg1_arg2`.
pub fn compound_name(substrait_name: &str, arg_types: &[DataType]) -> String {
    if arg_types.is_empty() {
        return substrait_name.to_string();
    }
    let sig: Vec<&str> = arg_types.iter().map(type_signature_name).collect();
    format!("{}:{}", substrait_name, sig.join("_"))
}

fn comparable(a: &DataType, b: &DataType) -> bool {
    a.common_supertype(b).is_some()
}

fn is_string(t: &DataType) -> bool {
    matches!(t, DataType::Varchar | DataType::Null)
}

fn is_numeric_or_null(t: &DataType) -> bool {
    t.is_numeric() || *t == DataType::Null
}

fn decimal(precision: u8, scale: u8) -> Option<DataType> {
    let scale = scale.min(MAX_DECIMAL_PRECISION);
    let precision = precision.clamp(scale.max(1), MAX_DECIMAL_PRECISION);
    Some(DataType::Decimal { precision, scale })
}

/// Result type of a binary numeric operator.
fn arithmetic(rule: ReturnRule, a: &DataType, b: &DataType) -> Option<DataType> {
    use DataType::*;

    if !(is_numeric_or_null(a) && is_numeric_or_null(b)) {
        return None;
    }
    if rule == ReturnRule::Divide {
        return Some(Float64);
    }
    let (a, b) = match (a, b) {
        (Null, Null) => (&Int32, &Int32),
        (Null, t) | (t, Null) => (t, t),
        pair => pair,
    };
    if a.is_float() || b.is_float() {
        return a.common_supertype(b);
    }
    if a.is_integer() && b.is_integer() {
        return a.common_supertype(b);
    }
    let (Decimal { precision: p1, scale: s1 }, Decimal { precision: p2, scale: s2 }) =
        (a.as_decimal()?, b.as_decimal()?)
    else {
        return None;
    };
    match rule {
        ReturnRule::Multiply => decimal(p1.saturating_add(p2), s1 + s2),
        ReturnRule::Add => {
            let scale = s1.max(s2);
            decimal((p1 - s1).max(p2 - s2) + scale + 1, scale)
        }
        _ => {
            let scale = s1.max(s2);
            decimal((p1 - s1).max(p2 - s2) + scale, scale)
        }
    }
}

fn infer(rule: ReturnRule, args: &[DataType]) -> Option<DataType> {
    use DataType::*;

    match rule {
        ReturnRule::Comparison => comparable(&args[0], &args[1]).then_some(Boolean),
        ReturnRule::Between => {
            (comparable(&args[0], &args[1]) && comparable(&args[0], &args[2])).then_some(Boolean)
        }
        ReturnRule::Logical => args
            .iter()
            .all(|t| matches!(t, Boolean | Null))
            .then_some(Boolean),
        ReturnRule::NullTest => Some(Boolean),
        ReturnRule::Pattern => args.iter().all(is_string).then_some(Boolean),
        ReturnRule::Add | ReturnRule::Multiply | ReturnRule::Divide | ReturnRule::Modulus => {
            arithmetic(rule, &args[0], &args[1])
        }
        ReturnRule::SameNumeric => {
            let valid_digits = args.get(1).map_or(true, |t| t.is_integer() || *t == Null);
            (is_numeric_or_null(&args[0]) && valid_digits).then_some(args[0])
        }
        ReturnRule::Concat => Some(Varchar),
        ReturnRule::StringUnary => is_string(&args[0]).then_some(Varchar),
        ReturnRule::StringLength => is_string(&args[0]).then_some(Int64),
        ReturnRule::Substring => (is_string(&args[0])
            && args[1..].iter().all(|t| t.is_integer() || *t == Null))
        .then_some(Varchar),
        ReturnRule::Coalesce => args
            .iter()
            .try_fold(Null, |acc, t| acc.common_supertype(t)),
        ReturnRule::Count => Some(Int64),
        ReturnRule::Sum => match args[0] {
            t if t.is_integer() => Some(Int64),
            Decimal { scale, .. } => Some(Decimal { precision: MAX_DECIMAL_PRECISION, scale }),
            t if t.is_float() => Some(Float64),
            Null => Some(Int64),
            _ => None,
        },
        ReturnRule::Average => is_numeric_or_null(&args[0]).then_some(Float64),
        ReturnRule::SameAsArgument => Some(args[0]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let registry = FunctionRegistry::builtin();

        let sig = registry.lookup("equal").unwrap();
        assert_eq!(sig.kind, FunctionKind::Scalar);
        assert_eq!(
            registry.resolve("equal", &[DataType::Int32, DataType::Int32]),
            Ok(DataType::Boolean)
        );
    }

    #[test]
    fn test_extension_uris() {
        let registry = FunctionRegistry::builtin();
        let money = DataType::Decimal { precision: 10, scale: 2 };

        assert!(registry
            .extension_uri("gt", &[DataType::Int32, DataType::Int32])
            .ends_with("/functions_comparison.yaml"));
        assert!(registry
            .extension_uri("mod", &[DataType::Int32, DataType::Int32])
            .ends_with("/functions_arithmetic.yaml"));
        assert!(registry
            .extension_uri("multiply", &[money, DataType::Int32])
            .ends_with("/functions_arithmetic_decimal.yaml"));
        assert!(registry
            .extension_uri("length", &[DataType::Varchar])
            .ends_with("/functions_string.yaml"));
        assert_eq!(
            registry.extension_uri("count_star", &[]),
            format!("{}functions_aggregate_generic.yaml", EXTENSION_URI_PREFIX)
        );
    }

    #[test]
    fn test_aggregate_lookup() {
        let registry = FunctionRegistry::builtin();

        assert!(registry.is_aggregate("sum"));
        assert_eq!(registry.resolve("count_star", &[]), Ok(DataType::Int64));
        assert_eq!(
            registry.resolve("sum", &[DataType::Decimal { precision: 10, scale: 2 }]),
            Ok(DataType::Decimal { precision: 38, scale: 2 })
        );
    }

    #[test]
    fn test_decimal_multiply() {
        let registry = FunctionRegistry::builtin();
        let rate = DataType::Decimal { precision: 10, scale: 2 };
        let factor = DataType::Decimal { precision: 10, scale: 0 };

        assert_eq!(
            registry.resolve("multiply", &[rate, factor]),
            Ok(DataType::Decimal { precision: 20, scale: 2 })
        );
        assert_eq!(registry.resolve("divide", &[rate, factor]), Ok(DataType::Float64));
    }

    #[test]
    fn test_substrait_name_remap() {
        let registry = FunctionRegistry::builtin();

        assert_eq!(registry.substrait_name("mod"), "modulus");
        assert_eq!(registry.substrait_name("count_star"), "count");
        assert_eq!(registry.internal_name("count", 0), Some("count_star"));
        assert_eq!(registry.internal_name("count", 1), Some("count"));
        assert_eq!(registry.internal_name("char_length", 1), Some("length"));
        assert_eq!(registry.internal_name("no_such_function", 1), None);
    }

    #[test]
    fn test_arity_and_type_errors() {
        let registry = FunctionRegistry::builtin();

        assert!(matches!(
            registry.resolve("not", &[DataType::Boolean, DataType::Boolean]),
            Err(RegistryError::WrongArity { .. })
        ));
        assert!(matches!(
            registry.resolve("add", &[DataType::Varchar, DataType::Int32]),
            Err(RegistryError::TypeMismatch { .. })
        ));
        assert!(matches!(
            registry.resolve("mask", &[DataType::Varchar]),
            Err(RegistryError::FunctionNotFound(_))
        ));
    }

    #[test]
    fn test_compound_name() {
        assert_eq!(compound_name("add", &[DataType::Int32, DataType::Int32]), "add:i32_i32");
        assert_eq!(compound_name("count", &[]), "count");
    }
}
