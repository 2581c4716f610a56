//! Turns validated application calls into SQL and typed rows.
//!
//! [`validator`] normalizes raw JSON arguments against a schema,
//! [`sql_query_builder`] turns the normalized shapes into a [`sql_fragment::Fragment`],
//! [`planner`] drives nested writes across several statements when one
//! isn't enough, and [`result_parser`] turns driver rows back into typed
//! values. [`facade::QueryEngine`] is the one entry point that ties all of
//! this together.

mod connector;
mod error;
mod facade;
mod planner;
mod result_parser;
mod validator;

pub use connector::{Connector, ExecuteResult, Row, Transaction};
pub use error::{QueryError, QueryResult};
pub use facade::{BuiltStatement, EngineResult, Operation, QueryEngine};
pub use result_parser::ParsedValue;
