#![cfg(test)]

use std::sync::Arc;

use query_structure::{Field, Model, ModelRegistry, Relation, RelationKind, ScalarType};
use sql_dialect::{Dialect, PostgresDialect};

use crate::context::QueryContext;

pub fn schema() -> ModelRegistry {
    let author = Model::new("Author")
        .mapped_to("authors")
        .field(Field::new("id", ScalarType::String).id())
        .field(Field::new("name", ScalarType::String))
        .field(Field::new("email", ScalarType::String).unique())
        .relation(Relation::new("posts", RelationKind::OneToMany, "Post"));

    let post = Model::new("Post")
        .mapped_to("posts")
        .field(Field::new("id", ScalarType::String).id())
        .field(Field::new("title", ScalarType::String))
        .field(Field::new("published", ScalarType::Boolean))
        .field(Field::new("authorId", ScalarType::String).nullable())
        .relation(
            Relation::new("author", RelationKind::ManyToOne, "Author")
                .with_fk(vec!["authorId".into()], vec!["id".into()])
                .optional(),
        )
        .relation(Relation::new("tags", RelationKind::ManyToMany, "Tag"));

    let tag = Model::new("Tag")
        .mapped_to("tags")
        .field(Field::new("id", ScalarType::String).id())
        .field(Field::new("name", ScalarType::String).unique())
        .relation(Relation::new("posts", RelationKind::ManyToMany, "Post"));

    ModelRegistry::new([author, post, tag]).unwrap()
}

pub fn post_context() -> QueryContext {
    let registry = Arc::new(schema());
    let model = registry.resolve("Post").unwrap();
    QueryContext::new_root(Arc::new(PostgresDialect) as Arc<dyn Dialect>, registry, model)
}

pub fn author_context() -> QueryContext {
    let registry = Arc::new(schema());
    let model = registry.resolve("Author").unwrap();
    QueryContext::new_root(Arc::new(PostgresDialect) as Arc<dyn Dialect>, registry, model)
}
