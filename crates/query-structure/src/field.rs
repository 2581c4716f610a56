use crate::scalar::{AutoGenerate, DefaultValue, ScalarType};

/// A single scalar column on a [`crate::Model`].
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub r#type: ScalarType,
    pub nullable: bool,
    pub array: bool,
    pub is_id: bool,
    pub is_unique: bool,
    pub default: Option<DefaultValue>,
    pub auto_generate: Option<AutoGenerate>,
    pub column_name: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, r#type: ScalarType) -> Self {
        Field {
            name: name.into(),
            r#type,
            nullable: false,
            array: false,
            is_id: false,
            is_unique: false,
            default: None,
            auto_generate: None,
            column_name: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn array(mut self) -> Self {
        self.array = true;
        self
    }

    pub fn id(mut self) -> Self {
        self.is_id = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    pub fn auto_generate(mut self, gen: AutoGenerate) -> Self {
        self.auto_generate = Some(gen);
        self
    }

    pub fn default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn mapped_to(mut self, column: impl Into<String>) -> Self {
        self.column_name = Some(column.into());
        self
    }

    /// The actual column name: the `.map()` override if present, the
    /// field's own name otherwise.
    pub fn column_name(&self) -> &str {
        self.column_name.as_deref().unwrap_or(&self.name)
    }
}
