//! JSON Schema to [`ArgumentSchema`] translation.
//!
//! Translation is total: constructs outside the supported subset become
//! [`ArgumentType::Untyped`] instead of failing.

use std::collections::HashSet;

use serde_json::Value;

use super::types::{ArgumentField, ArgumentSchema, ArgumentType};

/// Nested objects deeper than this are left untyped.
pub const MAX_SCHEMA_DEPTH: usize = 32;

pub fn translate_schema(schema: &Value) -> ArgumentSchema {
    translate_object(schema, 0)
}

fn translate_object(schema: &Value, depth: usize) -> ArgumentSchema {
    let properties = schema.get("properties").and_then(Value::as_object);
    let required: HashSet<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut fields: Vec<ArgumentField> = properties
        .into_iter()
        .flatten()
        .map(|(name, property)| translate_field(name, property, required.contains(name.as_str()), depth))
        .collect();

    // Required names with no declared property still must be supplied.
    let mut missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|name| properties.map_or(true, |props| !props.contains_key(*name)))
        .collect();
    missing.sort_unstable();
    fields.extend(
        missing
            .into_iter()
            .map(|name| ArgumentField::required(name, ArgumentType::Untyped)),
    );

    ArgumentSchema::new(fields)
}

fn translate_field(name: &str, property: &Value, required: bool, depth: usize) -> ArgumentField {
    let (ty, nullable) = translate_type(property, depth);
    ArgumentField {
        name: name.to_owned(),
        ty,
        required,
        nullable,
        description: property
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_owned),
        default: if required {
            None
        } else {
            property.get("default").cloned()
        },
    }
}

/// Returns the field type and whether `null` is accepted.
fn translate_type(property: &Value, depth: usize) -> (ArgumentType, bool) {
    if depth >= MAX_SCHEMA_DEPTH {
        return (ArgumentType::Untyped, true);
    }

    let declared: Vec<&str> = match property.get("type") {
        Some(Value::String(name)) => vec![name.as_str()],
        Some(Value::Array(names)) => names.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    let nullable = declared.contains(&"null");
    let concrete: Vec<&str> = declared.into_iter().filter(|name| *name != "null").collect();

    let ty = match concrete.as_slice() {
        [single] => named_type(single, property, depth),
        [] if property.get("type").is_none() => infer_type(property, depth),
        _ => ArgumentType::Untyped,
    };
    (ty, nullable)
}

fn named_type(name: &str, property: &Value, depth: usize) -> ArgumentType {
    match name {
        "string" => ArgumentType::String,
        "integer" => ArgumentType::Integer,
        "number" => ArgumentType::Float,
        "boolean" => ArgumentType::Boolean,
        "array" => list_type(property, depth),
        "object" => object_type(property, depth),
        _ => ArgumentType::Untyped,
    }
}

fn infer_type(property: &Value, depth: usize) -> ArgumentType {
    if property.get("properties").is_some_and(Value::is_object) {
        object_type(property, depth)
    } else if property.get("items").is_some() {
        list_type(property, depth)
    } else {
        ArgumentType::Untyped
    }
}

fn list_type(property: &Value, depth: usize) -> ArgumentType {
    let (items, nullable_items) = match property.get("items") {
        Some(items) if items.is_object() => translate_type(items, depth + 1),
        _ => (ArgumentType::Untyped, true),
    };
    ArgumentType::List {
        items: Box::new(items),
        nullable_items,
    }
}

fn object_type(property: &Value, depth: usize) -> ArgumentType {
    if property.get("properties").is_some_and(Value::is_object) {
        ArgumentType::object(translate_object(property, depth + 1))
    } else {
        ArgumentType::opaque_object()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn maps_scalar_types_and_requiredness() {
        let schema = translate_schema(&json!({
            "type": "object",
            "properties": {
                "city": { "type": "string", "description": "City name" },
                "days": { "type": "integer", "default": 3 },
                "ratio": { "type": "number" },
                "metric": { "type": "boolean" }
            },
            "required": ["city"]
        }));

        let city = schema.field("city").unwrap();
        assert_eq!(city.ty, ArgumentType::String);
        assert!(city.required);
        assert_eq!(city.description.as_deref(), Some("City name"));

        let days = schema.field("days").unwrap();
        assert_eq!(days.ty, ArgumentType::Integer);
        assert!(!days.required);
        assert_eq!(days.default, Some(json!(3)));

        assert_eq!(schema.field("ratio").unwrap().ty, ArgumentType::Float);
        assert_eq!(schema.field("metric").unwrap().ty, ArgumentType::Boolean);
        assert_eq!(schema.field("metric").unwrap().default, None);
    }

    #[test]
    fn required_field_never_carries_default() {
        let schema = translate_schema(&json!({
            "properties": { "q": { "type": "string", "default": "x" } },
            "required": ["q"]
        }));
        assert_eq!(schema.field("q").unwrap().default, None);
    }

    #[test]
    fn unknown_and_union_types_are_untyped() {
        let schema = translate_schema(&json!({
            "properties": {
                "weird": { "type": "date-time" },
                "either": { "type": ["string", "integer"] },
                "choice": { "anyOf": [{ "type": "string" }, { "type": "integer" }] },
                "bare": {}
            }
        }));
        for name in ["weird", "either", "choice", "bare"] {
            assert_eq!(schema.field(name).unwrap().ty, ArgumentType::Untyped, "{name}");
        }
    }

    #[test]
    fn null_in_type_array_makes_field_nullable() {
        let schema = translate_schema(&json!({
            "properties": { "note": { "type": ["string", "null"] } }
        }));
        let note = schema.field("note").unwrap();
        assert_eq!(note.ty, ArgumentType::String);
        assert!(note.nullable);
    }

    #[test]
    fn nested_objects_and_lists_translate_recursively() {
        let schema = translate_schema(&json!({
            "properties": {
                "filter": {
                    "type": "object",
                    "properties": { "tag": { "type": "string" } },
                    "required": ["tag"]
                },
                "meta": { "type": "object" },
                "ids": { "type": "array", "items": { "type": "integer" } },
                "anything": { "type": "array" }
            }
        }));

        let ArgumentType::Object { schema: Some(inner) } = &schema.field("filter").unwrap().ty else {
            panic!("filter should be a closed object");
        };
        assert!(inner.field("tag").unwrap().required);

        assert_eq!(schema.field("meta").unwrap().ty, ArgumentType::opaque_object());
        assert_eq!(
            schema.field("ids").unwrap().ty,
            ArgumentType::list_of(ArgumentType::Integer)
        );
        assert_eq!(
            schema.field("anything").unwrap().ty,
            ArgumentType::List {
                items: Box::new(ArgumentType::Untyped),
                nullable_items: true
            }
        );
    }

    #[test]
    fn required_name_without_property_becomes_untyped_required_field() {
        let schema = translate_schema(&json!({ "type": "object", "required": ["token"] }));
        let token = schema.field("token").unwrap();
        assert!(token.required);
        assert_eq!(token.ty, ArgumentType::Untyped);
    }

    #[test]
    fn empty_or_missing_schema_translates_to_no_fields() {
        assert!(translate_schema(&json!({})).is_empty());
        assert!(translate_schema(&json!(null)).is_empty());
        assert!(translate_schema(&json!({ "type": "object", "properties": {} })).is_empty());
    }

    #[test]
    fn deeply_nested_schema_is_cut_off_as_untyped() {
        let mut schema = json!({ "type": "string" });
        for _ in 0..(MAX_SCHEMA_DEPTH + 4) {
            schema = json!({ "type": "object", "properties": { "child": schema } });
        }
        let translated = translate_schema(&schema);

        let mut current = translated.field("child").unwrap().ty.clone();
        let mut levels = 0;
        while let ArgumentType::Object { schema: Some(inner) } = current {
            current = inner.field("child").unwrap().ty.clone();
            levels += 1;
        }
        assert_eq!(current, ArgumentType::Untyped);
        assert_eq!(levels, MAX_SCHEMA_DEPTH);
    }
}
