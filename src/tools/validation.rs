//! Validate capability arguments against an [`ArgumentSchema`] before dispatch.

use serde_json::{Map, Value};

use super::types::{ArgumentSchema, ArgumentType};
use crate::error::ValidationIssue;

pub type JsonObject = Map<String, Value>;

/// Normalize a raw argument payload into a JSON object.
///
/// `null` and blank strings become an empty object; a string is parsed as JSON.
pub fn coerce_arguments(raw: Value) -> Result<JsonObject, ValidationIssue> {
    match raw {
        Value::Null => Ok(JsonObject::new()),
        Value::Object(map) => Ok(map),
        Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(JsonObject::new());
            }
            let parsed: Value =
                serde_json::from_str(trimmed).map_err(|e| ValidationIssue::MalformedJson {
                    message: e.to_string(),
                })?;
            match parsed {
                Value::Object(map) => Ok(map),
                other => Err(ValidationIssue::NotAnObject {
                    actual: json_type_name(&other),
                }),
            }
        }
        other => Err(ValidationIssue::NotAnObject {
            actual: json_type_name(&other),
        }),
    }
}

/// Validate arguments and return the object to send to the provider.
///
/// Every violation is collected, not just the first. Omitted optional fields
/// with an explicit schema default get that default; other omitted optional
/// fields stay absent.
pub fn validate_arguments(
    schema: &ArgumentSchema,
    raw: Value,
) -> Result<JsonObject, Vec<ValidationIssue>> {
    let mut arguments = coerce_arguments(raw).map_err(|issue| vec![issue])?;
    let mut issues = Vec::new();
    check_object(schema, &mut arguments, "", &mut issues);
    if issues.is_empty() {
        Ok(arguments)
    } else {
        Err(issues)
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}.{name}")
    }
}

fn check_object(
    schema: &ArgumentSchema,
    object: &mut JsonObject,
    prefix: &str,
    issues: &mut Vec<ValidationIssue>,
) {
    for key in object.keys() {
        if schema.field(key).is_none() {
            issues.push(ValidationIssue::UnknownField {
                path: join_path(prefix, key),
            });
        }
    }

    for field in &schema.fields {
        let path = join_path(prefix, &field.name);
        match object.get_mut(&field.name) {
            Some(value) => check_value(&field.ty, field.nullable, value, &path, issues),
            None if field.required => issues.push(ValidationIssue::MissingRequired { path }),
            None => {
                if let Some(default) = &field.default {
                    object.insert(field.name.clone(), default.clone());
                }
            }
        }
    }
}

fn check_value(
    ty: &ArgumentType,
    nullable: bool,
    value: &mut Value,
    path: &str,
    issues: &mut Vec<ValidationIssue>,
) {
    if value.is_null() {
        if !nullable && *ty != ArgumentType::Untyped {
            issues.push(mismatch(ty, value, path));
        }
        return;
    }

    match ty {
        ArgumentType::Untyped => {}
        ArgumentType::String if value.is_string() => {}
        ArgumentType::Integer if value.is_i64() || value.is_u64() => {}
        ArgumentType::Float if value.is_number() => {}
        ArgumentType::Boolean if value.is_boolean() => {}
        ArgumentType::List {
            items,
            nullable_items,
        } if value.is_array() => {
            if let Some(elements) = value.as_array_mut() {
                for (index, element) in elements.iter_mut().enumerate() {
                    let element_path = format!("{path}[{index}]");
                    check_value(items, *nullable_items, element, &element_path, issues);
                }
            }
        }
        ArgumentType::Object { schema } if value.is_object() => {
            if let (Some(schema), Some(object)) = (schema, value.as_object_mut()) {
                check_object(schema, object, path, issues);
            }
        }
        _ => issues.push(mismatch(ty, value, path)),
    }
}

fn mismatch(ty: &ArgumentType, value: &Value, path: &str) -> ValidationIssue {
    ValidationIssue::TypeMismatch {
        path: path.to_owned(),
        expected: ty.to_string(),
        actual: json_type_name(value),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
