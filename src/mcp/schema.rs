//! Provider-side descriptors and call results.

use serde::{Deserialize, Serialize};

/// A capability as advertised by a provider's `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

impl CapabilityDescriptor {
    pub fn new(name: impl Into<String>, input_schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One block of a provider's reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBlock {
    Text(String),
    /// Anything that is not plain text (image, audio, resource...), kept by type tag only.
    Other { kind: String },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn other(kind: impl Into<String>) -> Self {
        Self::Other { kind: kind.into() }
    }
}

/// Result of a `tools/call` before it is rendered for the agent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallOutcome {
    pub content: Vec<ContentBlock>,
    pub is_error: bool,
}

impl CallOutcome {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            is_error: true,
        }
    }

    /// Text blocks verbatim, other blocks as `[kind]`, joined by newlines.
    pub fn render(&self) -> String {
        self.content
            .iter()
            .map(|block| match block {
                ContentBlock::Text(text) => text.clone(),
                ContentBlock::Other { kind } => format!("[{kind}]"),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Builder for constructing MCP-compatible JSON schemas.
pub struct SchemaBuilder {
    properties: serde_json::Map<String, serde_json::Value>,
    required: Vec<String>,
    description: Option<String>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            properties: serde_json::Map::new(),
            required: Vec::new(),
            description: None,
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn property(
        mut self,
        name: impl Into<String>,
        schema: serde_json::Value,
        required: bool,
    ) -> Self {
        let name = name.into();
        self.properties.insert(name.clone(), schema);
        if required {
            self.required.push(name);
        }
        self
    }

    pub fn build(self) -> serde_json::Value {
        let mut schema = serde_json::json!({
            "type": "object",
            "properties": self.properties,
        });
        if !self.required.is_empty() {
            schema["required"] = serde_json::json!(self.required);
        }
        if let Some(desc) = self.description {
            schema["description"] = serde_json::Value::String(desc);
        }
        schema
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}
