use std::sync::Arc;

use crate::error::SchemaError;
use crate::model::Model;
use crate::registry::ModelRegistry;
use crate::relation::{Relation, RelationKind};

/// Everything a builder needs about one relation lookup, resolved once
/// against the registry: the target model, cardinality, and — for
/// `ManyToOne`/`OneToOne`/`OneToMany` — the column pairs tying parent to
/// child, discovered by scanning the target's relations when the current
/// model doesn't carry `fields` directly (§3.5).
#[derive(Debug, Clone)]
pub struct RelationInfo {
    pub name: String,
    pub kind: RelationKind,
    pub target_model: Arc<Model>,
    pub is_optional: bool,
    /// True when the *current* model's scalars carry the foreign key.
    pub holds_fk: bool,
    /// Parallel to `target_fields`: `self_fields[i]` corresponds to
    /// `target_fields[i]`. Empty for `ManyToMany`, which has no direct
    /// column correlation — see [`crate::junction`].
    pub self_fields: Vec<String>,
    pub target_fields: Vec<String>,
}

impl RelationInfo {
    pub fn is_to_many(&self) -> bool {
        matches!(self.kind, RelationKind::OneToMany | RelationKind::ManyToMany)
    }

    pub fn is_to_one(&self) -> bool {
        !self.is_to_many()
    }

    pub fn resolve(registry: &ModelRegistry, model: &Model, relation_name: &str) -> Result<RelationInfo, SchemaError> {
        let relation = model.relation_named(relation_name).ok_or_else(|| SchemaError::UnknownRelation {
            model: model.name.clone(),
            relation: relation_name.to_owned(),
        })?;
        let target_model = registry.resolve(&relation.target)?;

        match relation.kind {
            RelationKind::ManyToMany => Ok(RelationInfo {
                name: relation.name.clone(),
                kind: relation.kind,
                target_model,
                is_optional: true,
                holds_fk: false,
                self_fields: Vec::new(),
                target_fields: Vec::new(),
            }),
            RelationKind::ManyToOne => {
                let (fields, references) = require_fk(model, relation)?;
                Ok(RelationInfo {
                    name: relation.name.clone(),
                    kind: relation.kind,
                    target_model,
                    is_optional: relation.optional,
                    holds_fk: true,
                    self_fields: fields,
                    target_fields: references,
                })
            }
            RelationKind::OneToOne => {
                if let Some(fields) = &relation.fields {
                    let references = relation.references.clone().unwrap_or_default();
                    Ok(RelationInfo {
                        name: relation.name.clone(),
                        kind: relation.kind,
                        target_model,
                        is_optional: relation.optional,
                        holds_fk: true,
                        self_fields: fields.clone(),
                        target_fields: references,
                    })
                } else {
                    let inverse = find_inverse(&target_model, &model.name, relation_name)?;
                    Ok(RelationInfo {
                        name: relation.name.clone(),
                        kind: relation.kind,
                        target_model,
                        is_optional: relation.optional,
                        holds_fk: false,
                        self_fields: inverse.references.clone().unwrap_or_default(),
                        target_fields: inverse.fields.clone().unwrap_or_default(),
                    })
                }
            }
            RelationKind::OneToMany => {
                let inverse = find_inverse(&target_model, &model.name, relation_name)?;
                Ok(RelationInfo {
                    name: relation.name.clone(),
                    kind: relation.kind,
                    target_model,
                    is_optional: true,
                    holds_fk: false,
                    self_fields: inverse.references.clone().unwrap_or_default(),
                    target_fields: inverse.fields.clone().unwrap_or_default(),
                })
            }
        }
    }
}

fn require_fk(model: &Model, relation: &Relation) -> Result<(Vec<String>, Vec<String>), SchemaError> {
    match (&relation.fields, &relation.references) {
        (Some(f), Some(r)) => Ok((f.clone(), r.clone())),
        _ => Err(SchemaError::MissingInverseRelation {
            model: model.name.clone(),
            relation: relation.name.clone(),
            target: relation.target.clone(),
        }),
    }
}

/// Scans the target model's relations for one pointing back at `model_name`
/// that actually carries `fields` (the FK-holding side), per §3.5.
fn find_inverse<'a>(target_model: &'a Model, model_name: &str, relation_name: &str) -> Result<&'a Relation, SchemaError> {
    target_model
        .relations
        .values()
        .find(|r| r.target == model_name && r.fields.is_some())
        .ok_or_else(|| SchemaError::MissingInverseRelation {
            model: target_model.name.clone(),
            relation: relation_name.to_owned(),
            target: model_name.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::model::Model;
    use crate::registry::ModelRegistry;
    use crate::scalar::ScalarType;

    fn schema() -> ModelRegistry {
        let author = Model::new("Author")
            .mapped_to("authors")
            .field(Field::new("id", ScalarType::String).id())
            .relation(Relation::new("posts", RelationKind::OneToMany, "Post"));

        let post = Model::new("Post")
            .mapped_to("posts")
            .field(Field::new("id", ScalarType::String).id())
            .field(Field::new("authorId", ScalarType::String))
            .relation(
                Relation::new("author", RelationKind::ManyToOne, "Author")
                    .with_fk(vec!["authorId".into()], vec!["id".into()]),
            );

        ModelRegistry::new([author, post]).unwrap()
    }

    #[test]
    fn many_to_one_holds_fk_directly() {
        let registry = schema();
        let post = registry.resolve("Post").unwrap();
        let info = RelationInfo::resolve(&registry, &post, "author").unwrap();
        assert!(info.holds_fk);
        assert_eq!(info.self_fields, vec!["authorId".to_string()]);
        assert_eq!(info.target_fields, vec!["id".to_string()]);
    }

    #[test]
    fn one_to_many_discovers_inverse() {
        let registry = schema();
        let author = registry.resolve("Author").unwrap();
        let info = RelationInfo::resolve(&registry, &author, "posts").unwrap();
        assert!(!info.holds_fk);
        assert_eq!(info.self_fields, vec!["id".to_string()]);
        assert_eq!(info.target_fields, vec!["authorId".to_string()]);
        assert!(info.is_to_many());
    }

    #[test]
    fn missing_inverse_relation_is_an_error() {
        let lonely = Model::new("Lonely")
            .field(Field::new("id", ScalarType::String).id())
            .relation(Relation::new("others", RelationKind::OneToMany, "Other"));
        let other = Model::new("Other").field(Field::new("id", ScalarType::String).id());
        let registry = ModelRegistry::new([lonely, other]).unwrap();
        let lonely = registry.resolve("Lonely").unwrap();
        let err = RelationInfo::resolve(&registry, &lonely, "others").unwrap_err();
        assert!(matches!(err, SchemaError::MissingInverseRelation { .. }));
    }
}
