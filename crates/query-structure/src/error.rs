use thiserror::Error;

/// Schema/relation inconsistencies discovered while hydrating or walking
/// the model graph. These indicate a programmer or schema-hydration bug,
/// never bad user input — see `InvalidInput` in `query-core` for that.
#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("model `{model}` has no unique identifying key (id, compound id, or unique field set)")]
    MissingUniqueKey { model: String },

    #[error("relation `{model}.{relation}` has mismatched fields/references lengths ({fields} vs {references})")]
    FieldsReferencesLengthMismatch { model: String, relation: String, fields: usize, references: usize },

    #[error("model `{model}` has no relation named `{relation}`")]
    UnknownRelation { model: String, relation: String },

    #[error("model `{model}` has no scalar field named `{field}`")]
    UnknownField { model: String, field: String },

    #[error("model `{model}` is not registered")]
    UnknownModel { model: String },

    #[error("relation `{model}.{relation}` points to the target's PK side but no relation on `{target}` points back to `{model}`")]
    MissingInverseRelation { model: String, relation: String, target: String },

    #[error("many-to-many relation `{model}.{relation}` cannot be correlated directly; it must go through the junction table")]
    ManyToManyDirectCorrelation { model: String, relation: String },
}
