use thiserror::Error;

/// The top-level error surface the facade returns (§7). Each variant
/// carries enough context for a caller to act without re-deriving it from
/// the underlying cause.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid input for `{operation}` on `{model}` at `{path}`: {message}")]
    InvalidInput { operation: String, model: String, path: String, message: String },

    #[error(transparent)]
    CompileError(sql_query_builder::BuildError),

    #[error("feature not supported by `{dialect}`: {feature}")]
    FeatureNotSupported { dialect: String, feature: String },

    #[error("nested write failed at [{model}.{relation}]: {source}")]
    NestedWriteError { model: String, relation: String, #[source] source: Box<QueryError> },

    #[error("connector error: {0}")]
    ConnectorError(String),
}

pub type QueryResult<T> = Result<T, QueryError>;

impl From<sql_query_builder::BuildError> for QueryError {
    fn from(err: sql_query_builder::BuildError) -> Self {
        match err {
            sql_query_builder::BuildError::Dialect(sql_dialect::DialectError::FeatureNotSupported { dialect, feature }) => {
                QueryError::FeatureNotSupported { dialect: dialect.to_owned(), feature: feature.to_owned() }
            }
            other => QueryError::CompileError(other),
        }
    }
}

