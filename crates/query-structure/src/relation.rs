/// The four relation cardinalities the compiler has to special-case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
}

/// A named relation field on a [`crate::Model`].
///
/// `target` is a model *name*, not a pointer — the model graph is cyclic by
/// design (a `Post` points at `Author`, which points back at `Post`), so
/// resolution happens lazily through the [`crate::ModelRegistry`] rather
/// than through owned references — a string key into a read-only arena
/// instead of an owned pointer or a closure.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub name: String,
    pub kind: RelationKind,
    pub target: String,
    /// FK columns on *this* model, only set on the FK-holding side of a
    /// `ManyToOne`/`OneToOne`.
    pub fields: Option<Vec<String>>,
    /// The scalar fields on the target model the `fields` above point to.
    pub references: Option<Vec<String>>,
    pub optional: bool,
    pub junction_table_override: Option<String>,
    pub junction_field_overrides: Option<(String, String)>,
}

impl Relation {
    pub fn new(name: impl Into<String>, kind: RelationKind, target: impl Into<String>) -> Self {
        Relation {
            name: name.into(),
            kind,
            target: target.into(),
            fields: None,
            references: None,
            optional: false,
            junction_table_override: None,
            junction_field_overrides: None,
        }
    }

    pub fn with_fk(mut self, fields: Vec<String>, references: Vec<String>) -> Self {
        self.fields = Some(fields);
        self.references = Some(references);
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn junction_table(mut self, name: impl Into<String>) -> Self {
        self.junction_table_override = Some(name.into());
        self
    }

    pub fn junction_fields(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.junction_field_overrides = Some((source.into(), target.into()));
        self
    }

    pub fn is_to_many(&self) -> bool {
        matches!(self.kind, RelationKind::OneToMany | RelationKind::ManyToMany)
    }

    pub fn is_to_one(&self) -> bool {
        !self.is_to_many()
    }

    /// True when *this* model's scalars carry the foreign key, as declared
    /// directly on the relation (before inverse-relation discovery).
    pub fn holds_fk_directly(&self) -> bool {
        matches!(self.kind, RelationKind::ManyToOne) && self.fields.is_some()
            || matches!(self.kind, RelationKind::OneToOne) && self.fields.is_some()
    }
}
