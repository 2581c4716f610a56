use crate::model::Model;
use crate::relation::Relation;

/// Resolved many-to-many join parts (§4.7): the junction table name and
/// the column on it pointing at each side's primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct JunctionInfo {
    pub table_name: String,
    pub source_column: String,
    pub target_column: String,
    pub source_pk: String,
    pub target_pk: String,
}

impl JunctionInfo {
    /// `source` is the model the relation is declared on, `target` is
    /// `relation.target`'s model.
    pub fn resolve(source: &Model, target: &Model, relation: &Relation) -> JunctionInfo {
        let table_name = relation
            .junction_table_override
            .clone()
            .unwrap_or_else(|| default_junction_table_name(&source.name, &target.name));

        let (source_column, target_column) = match &relation.junction_field_overrides {
            Some((s, t)) => (s.clone(), t.clone()),
            None => default_junction_columns(&source.name, &target.name),
        };

        JunctionInfo {
            table_name,
            source_column,
            target_column,
            source_pk: single_pk(source),
            target_pk: single_pk(target),
        }
    }
}

/// `_<Lower>To<Upper>` using the alphabetically-lower model name first —
/// the implicit junction-table naming convention assumed whenever a schema
/// doesn't override it with `@@map`.
fn default_junction_table_name(a: &str, b: &str) -> String {
    if a <= b {
        format!("_{}To{}", a, b)
    } else {
        format!("_{}To{}", b, a)
    }
}

/// The implicit junction columns are always named `A`/`B`, where `A` points
/// at whichever model name sorts first alphabetically.
fn default_junction_columns(source: &str, target: &str) -> (String, String) {
    if source <= target {
        ("A".to_string(), "B".to_string())
    } else {
        ("B".to_string(), "A".to_string())
    }
}

fn single_pk(model: &Model) -> String {
    model.id_fields().into_iter().next().unwrap_or_else(|| "id".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::relation::RelationKind;
    use crate::scalar::ScalarType;

    #[test]
    fn orders_junction_table_name_alphabetically() {
        let post = Model::new("Post").field(Field::new("id", ScalarType::String).id());
        let tag = Model::new("Tag").field(Field::new("id", ScalarType::String).id());
        let relation = Relation::new("tags", RelationKind::ManyToMany, "Tag");

        let info = JunctionInfo::resolve(&post, &tag, &relation);
        assert_eq!(info.table_name, "_PostToTag");
        assert_eq!(info.source_column, "A");
        assert_eq!(info.target_column, "B");

        let relation_rev = Relation::new("posts", RelationKind::ManyToMany, "Post");
        let info_rev = JunctionInfo::resolve(&tag, &post, &relation_rev);
        assert_eq!(info_rev.table_name, "_PostToTag");
        assert_eq!(info_rev.source_column, "B");
        assert_eq!(info_rev.target_column, "A");
    }

    #[test]
    fn honors_explicit_overrides() {
        let post = Model::new("Post").field(Field::new("id", ScalarType::String).id());
        let tag = Model::new("Tag").field(Field::new("id", ScalarType::String).id());
        let relation = Relation::new("tags", RelationKind::ManyToMany, "Tag")
            .junction_table("PostTags")
            .junction_fields("postId", "tagId");

        let info = JunctionInfo::resolve(&post, &tag, &relation);
        assert_eq!(info.table_name, "PostTags");
        assert_eq!(info.source_column, "postId");
        assert_eq!(info.target_column, "tagId");
    }
}
