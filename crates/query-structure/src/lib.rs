//! In-memory description of a schema's models, scalar fields, and
//! relations — the shared vocabulary the validator, builders, planner, and
//! result parser all hydrate once against a [`ModelRegistry`] and never
//! re-derive.

mod error;
mod field;
mod fk;
mod junction;
mod model;
mod registry;
mod relation;
mod relation_info;
mod scalar;

pub use error::SchemaError;
pub use field::Field;
pub use fk::FkDirection;
pub use junction::JunctionInfo;
pub use model::Model;
pub use registry::ModelRegistry;
pub use relation::{Relation, RelationKind};
pub use relation_info::RelationInfo;
pub use scalar::{AutoGenerate, DefaultValue, ScalarType};
