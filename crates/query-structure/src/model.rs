use indexmap::IndexMap;

use crate::field::Field;
use crate::relation::Relation;

/// In-memory description of one table: scalars, relations, uniques,
/// naming. Built once per schema, then shared read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub name: String,
    pub db_name: Option<String>,
    pub scalars: IndexMap<String, Field>,
    pub relations: IndexMap<String, Relation>,
    pub compound_id: Option<Vec<String>>,
    pub compound_uniques: Vec<Vec<String>>,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Model {
            name: name.into(),
            db_name: None,
            scalars: IndexMap::new(),
            relations: IndexMap::new(),
            compound_id: None,
            compound_uniques: Vec::new(),
        }
    }

    pub fn mapped_to(mut self, table: impl Into<String>) -> Self {
        self.db_name = Some(table.into());
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.scalars.insert(field.name.clone(), field);
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.insert(relation.name.clone(), relation);
        self
    }

    pub fn compound_id(mut self, fields: Vec<String>) -> Self {
        self.compound_id = Some(fields);
        self
    }

    pub fn compound_unique(mut self, fields: Vec<String>) -> Self {
        self.compound_uniques.push(fields);
        self
    }

    /// The table name: the `.map()` override if present, the model's own
    /// name otherwise.
    pub fn table_name(&self) -> &str {
        self.db_name.as_deref().unwrap_or(&self.name)
    }

    pub fn scalar(&self, name: &str) -> Option<&Field> {
        self.scalars.get(name)
    }

    pub fn relation_named(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    pub fn id_fields(&self) -> Vec<String> {
        if let Some(compound) = &self.compound_id {
            return compound.clone();
        }
        self.scalars.values().filter(|f| f.is_id).map(|f| f.name.clone()).collect()
    }

    /// Every field-set that can uniquely identify a row: the id, declared
    /// single-field uniques, and compound uniques. Used by `where-unique`
    /// validation in the builder layer.
    pub fn unique_field_sets(&self) -> Vec<Vec<String>> {
        let mut sets = Vec::new();
        let id = self.id_fields();
        if !id.is_empty() {
            sets.push(id);
        }
        for field in self.scalars.values() {
            if field.is_unique {
                sets.push(vec![field.name.clone()]);
            }
        }
        sets.extend(self.compound_uniques.iter().cloned());
        sets
    }

    pub fn has_unique_key(&self) -> bool {
        !self.unique_field_sets().is_empty()
    }
}
