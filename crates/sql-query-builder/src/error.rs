use thiserror::Error;

/// Failures discovered while composing fragments: an unsupported dialect
/// feature, or a schema inconsistency surfaced lazily while descending
/// into a relation. Distinct from `query_core::QueryError::InvalidInput`,
/// which is about bad *user* input — these are compiler/schema bugs.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Schema(#[from] query_structure::SchemaError),

    #[error(transparent)]
    Dialect(#[from] sql_dialect::DialectError),

    #[error("compile error: {0}")]
    Compile(String),
}

pub type BuildResult<T> = Result<T, BuildError>;
