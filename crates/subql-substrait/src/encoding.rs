//! Wire formats: protobuf binary and protobuf JSON

use crate::consumer::PlanConsumer;
use crate::error::{Result, SubstraitError};
use crate::producer::PlanProducer;
use prost::Message;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use substrait::proto::Plan;
use subql_ir::{Catalog, QueryPlan};
use subql_registry::FunctionRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanEncoding {
    #[default]
    Binary,
    Json,
}

impl fmt::Display for PlanEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanEncoding::Binary => write!(f, "binary"),
            PlanEncoding::Json => write!(f, "json"),
        }
    }
}

impl FromStr for PlanEncoding {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binary" | "protobuf" | "proto" => Ok(PlanEncoding::Binary),
            "json" => Ok(PlanEncoding::Json),
            other => Err(format!("unknown plan encoding: {}", other)),
        }
    }
}

/// A plan in one of the two wire formats.
#[derive(Debug, Clone, PartialEq)]
pub enum SerializedPlan {
    Binary(Vec<u8>),
    Json(String),
}

impl SerializedPlan {
    pub fn encoding(&self) -> PlanEncoding {
        match self {
            SerializedPlan::Binary(_) => PlanEncoding::Binary,
            SerializedPlan::Json(_) => PlanEncoding::Json,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SerializedPlan::Binary(bytes) => bytes.len(),
            SerializedPlan::Json(text) => text.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn decode(&self) -> Result<Plan> {
        match self {
            SerializedPlan::Binary(bytes) => decode_binary(bytes),
            SerializedPlan::Json(text) => decode_json(text),
        }
    }
}

pub fn encode(plan: &Plan, encoding: PlanEncoding) -> Result<SerializedPlan> {
    match encoding {
        PlanEncoding::Binary => Ok(SerializedPlan::Binary(plan.encode_to_vec())),
        PlanEncoding::Json => serde_json::to_string(plan)
            .map(SerializedPlan::Json)
            .map_err(|e| SubstraitError::MalformedPlan(format!("failed to serialize plan: {}", e))),
    }
}

pub fn decode_binary(bytes: &[u8]) -> Result<Plan> {
    Plan::decode(bytes)
        .map_err(|e| SubstraitError::MalformedPlan(format!("invalid protobuf plan: {}", e)))
}

pub fn decode_json(text: &str) -> Result<Plan> {
    serde_json::from_str(text)
        .map_err(|e| SubstraitError::MalformedPlan(format!("invalid JSON plan: {}", e)))
}

/// Produce and serialize a bound plan.
pub fn produce(query: &QueryPlan, encoding: PlanEncoding, registry: &FunctionRegistry) -> Result<SerializedPlan> {
    let plan = PlanProducer::new(registry).produce(query)?;
    encode(&plan, encoding)
}

/// Decode and consume a serialized plan against `catalog`.
///
/// Both wire formats decode to the same message and share one consumption path.
pub fn consume(
    serialized: &SerializedPlan,
    catalog: &dyn Catalog,
    registry: &FunctionRegistry,
) -> Result<QueryPlan> {
    let plan = serialized.decode()?;
    PlanConsumer::new(catalog, registry).consume(&plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_names() {
        assert_eq!("JSON".parse::<PlanEncoding>().unwrap(), PlanEncoding::Json);
        assert_eq!("protobuf".parse::<PlanEncoding>().unwrap(), PlanEncoding::Binary);
        assert!("yaml".parse::<PlanEncoding>().is_err());
        assert_eq!(PlanEncoding::default().to_string(), "binary");
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            decode_binary(&[0xff, 0xff, 0xff]),
            Err(SubstraitError::MalformedPlan(_))
        ));
        assert!(matches!(
            decode_json("{not json"),
            Err(SubstraitError::MalformedPlan(_))
        ));
    }

    #[test]
    fn test_empty_json_object_decodes_to_empty_plan() {
        let plan = decode_json("{}").unwrap();
        assert!(plan.relations.is_empty());
    }
}
