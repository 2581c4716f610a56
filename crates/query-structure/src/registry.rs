use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::SchemaError;
use crate::model::Model;
use crate::relation::RelationKind;

/// A read-only arena of [`Model`]s, built once and then safely shared
/// across however many operations compile concurrently. Resolving a
/// relation's target model is a registry lookup by name — this is how the
/// cyclic model graph is represented without owned pointers or `Rc` cycles.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    by_name: IndexMap<String, Arc<Model>>,
    by_table_name: IndexMap<String, Arc<Model>>,
}

impl ModelRegistry {
    /// Hydrates the registry and validates the schema invariants from
    /// §3.2: every model has a unique key, every relation's `fields`/
    /// `references` line up in length, and FK-holding sides are internally
    /// consistent. Building the registry is the only place these checks
    /// run — builders and the planner trust the registry afterwards.
    pub fn new(models: impl IntoIterator<Item = Model>) -> Result<Self, SchemaError> {
        let mut by_name = IndexMap::new();
        let mut by_table_name = IndexMap::new();

        for model in models {
            if !model.has_unique_key() {
                return Err(SchemaError::MissingUniqueKey { model: model.name.clone() });
            }
            for relation in model.relations.values() {
                if let (Some(fields), Some(references)) = (&relation.fields, &relation.references) {
                    if fields.len() != references.len() {
                        return Err(SchemaError::FieldsReferencesLengthMismatch {
                            model: model.name.clone(),
                            relation: relation.name.clone(),
                            fields: fields.len(),
                            references: references.len(),
                        });
                    }
                }
                if relation.kind == RelationKind::ManyToMany && (relation.fields.is_some() || relation.references.is_some()) {
                    return Err(SchemaError::ManyToManyDirectCorrelation {
                        model: model.name.clone(),
                        relation: relation.name.clone(),
                    });
                }
            }
            let arc = Arc::new(model);
            by_table_name.insert(arc.table_name().to_owned(), arc.clone());
            by_name.insert(arc.name.clone(), arc);
        }

        Ok(ModelRegistry { by_name, by_table_name })
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<Model>, SchemaError> {
        self.by_name.get(name).cloned().ok_or_else(|| SchemaError::UnknownModel { model: name.to_owned() })
    }

    pub fn by_table_name(&self, table: &str) -> Option<Arc<Model>> {
        self.by_table_name.get(table).cloned()
    }

    pub fn models(&self) -> impl Iterator<Item = &Arc<Model>> {
        self.by_name.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::relation::Relation;
    use crate::scalar::ScalarType;

    fn author() -> Model {
        Model::new("Author").mapped_to("authors").field(Field::new("id", ScalarType::String).id())
    }

    #[test]
    fn rejects_model_without_unique_key() {
        let bad = Model::new("NoKey").field(Field::new("name", ScalarType::String));
        let err = ModelRegistry::new([bad]).unwrap_err();
        assert_eq!(err, SchemaError::MissingUniqueKey { model: "NoKey".into() });
    }

    #[test]
    fn rejects_mismatched_fields_references() {
        let bad = author().relation(
            Relation::new("post", crate::relation::RelationKind::ManyToOne, "Post")
                .with_fk(vec!["postId".into()], vec!["id".into(), "slug".into()]),
        );
        let err = ModelRegistry::new([bad]).unwrap_err();
        assert!(matches!(err, SchemaError::FieldsReferencesLengthMismatch { .. }));
    }

    #[test]
    fn rejects_many_to_many_with_direct_fields() {
        let bad = author().relation(
            Relation::new("tags", crate::relation::RelationKind::ManyToMany, "Tag")
                .with_fk(vec!["id".into()], vec!["id".into()]),
        );
        let err = ModelRegistry::new([bad]).unwrap_err();
        assert!(matches!(err, SchemaError::ManyToManyDirectCorrelation { .. }));
    }

    #[test]
    fn resolves_by_name_and_table_name() {
        let registry = ModelRegistry::new([author()]).unwrap();
        assert_eq!(registry.resolve("Author").unwrap().table_name(), "authors");
        assert_eq!(registry.by_table_name("authors").unwrap().name, "Author");
    }
}
