//! Substrait interchange for subql plans
//!
//! [`PlanProducer`] turns a bound logical plan into a Substrait plan;
//! [`PlanConsumer`] rebuilds a logical plan from one, resolving tables by
//! name against the consuming catalog.

pub mod consumer;
pub mod encoding;
pub mod error;
pub mod literal;
pub mod manifest;
pub mod producer;
pub mod types;

pub use consumer::PlanConsumer;
pub use encoding::{consume, decode_binary, decode_json, encode, produce, PlanEncoding, SerializedPlan};
pub use error::{Result, SubstraitError};
pub use producer::PlanProducer;

pub use substrait::proto::Plan;
