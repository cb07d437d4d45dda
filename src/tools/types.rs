//! Typed argument schemas derived from provider JSON Schema.

use std::fmt;

use serde::Serialize;

/// The value type of one argument field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArgumentType {
    String,
    Integer,
    /// JSON `number`: integers and floats both accepted.
    Float,
    Boolean,
    List {
        items: Box<ArgumentType>,
        nullable_items: bool,
    },
    /// `schema` is `None` for objects declared without `properties`; those are opaque.
    Object { schema: Option<Box<ArgumentSchema>> },
    /// Anything goes, including `null`.
    Untyped,
}

impl ArgumentType {
    pub fn list_of(items: ArgumentType) -> Self {
        Self::List {
            items: Box::new(items),
            nullable_items: false,
        }
    }

    pub fn object(schema: ArgumentSchema) -> Self {
        Self::Object {
            schema: Some(Box::new(schema)),
        }
    }

    pub fn opaque_object() -> Self {
        Self::Object { schema: None }
    }
}

impl fmt::Display for ArgumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "number",
            Self::Boolean => "boolean",
            Self::List { .. } => "array",
            Self::Object { .. } => "object",
            Self::Untyped => "any",
        };
        f.write_str(label)
    }
}

/// One named field of an [`ArgumentSchema`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArgumentField {
    pub name: String,
    pub ty: ArgumentType,
    pub required: bool,
    /// `null` is an accepted value.
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Explicit default from the schema. Always `None` for required fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl ArgumentField {
    pub fn required(name: impl Into<String>, ty: ArgumentType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
            nullable: false,
            description: None,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, ty: ArgumentType) -> Self {
        Self {
            required: false,
            ..Self::required(name, ty)
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        if !self.required {
            self.default = Some(default);
        }
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Closed record of named fields: keys outside `fields` are rejected.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ArgumentSchema {
    pub fields: Vec<ArgumentField>,
}

impl ArgumentSchema {
    pub fn new(fields: Vec<ArgumentField>) -> Self {
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&ArgumentField> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &ArgumentField> {
        self.fields.iter().filter(|field| field.required)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
