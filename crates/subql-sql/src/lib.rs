//! subql SQL front end - pest grammar, AST and binder

pub mod ast;
mod bind_expr;
pub mod binder;
mod parser;
pub mod scope;

pub use ast::Statement;
pub use binder::{BindError, Binder, BoundStatement};
pub use parser::{parse, parse_one, ParseError};
