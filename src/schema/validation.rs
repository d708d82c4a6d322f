use serde_json::Value;

use super::error::SchemaError;
use super::schema::{Schema, SchemaKind};

/// 校验 `value` 是否符合 `schema`，返回第一个不符合的位置
pub fn validate(schema: &Schema, value: &Value) -> Result<(), SchemaError> {
    let mut path = Vec::new();
    validate_value(schema, value, &mut path)
}

/// Same as [`validate`], with `path` as the location of `value` in its parent.
pub fn validate_value(
    schema: &Schema,
    value: &Value,
    path: &mut Vec<String>,
) -> Result<(), SchemaError> {
    if value.is_null() && schema.nullable {
        return Ok(());
    }
    let fail = |path: &[String], message: String| SchemaError::Validation {
        message,
        path: path.to_vec(),
    };

    let expected = match &schema.kind {
        SchemaKind::Any => return Ok(()),
        SchemaKind::Null => value.is_null().then_some(()).ok_or("null"),
        SchemaKind::Boolean => value.is_boolean().then_some(()).ok_or("boolean"),
        SchemaKind::Integer => (value.is_i64() || value.is_u64()).then_some(()).ok_or("integer"),
        SchemaKind::Number => value.is_number().then_some(()).ok_or("number"),
        SchemaKind::String => value.is_string().then_some(()).ok_or("string"),
        SchemaKind::Enum { values } => {
            let Some(text) = value.as_str() else {
                return Err(fail(path, "expected string".to_string()));
            };
            if !values.iter().any(|allowed| allowed == text) {
                return Err(fail(
                    path,
                    format!("`{text}` is not one of {}", values.join(", ")),
                ));
            }
            Ok(())
        }
        SchemaKind::Array { items } => {
            let Some(elements) = value.as_array() else {
                return Err(fail(path, "expected array".to_string()));
            };
            for (index, element) in elements.iter().enumerate() {
                path.push(index.to_string());
                validate_value(items, element, path)?;
                path.pop();
            }
            Ok(())
        }
        SchemaKind::Object {
            properties,
            required,
            additional_properties,
        } => {
            let Some(object) = value.as_object() else {
                return Err(fail(path, "expected object".to_string()));
            };
            if let Some(missing) = required.iter().find(|key| !object.contains_key(*key)) {
                path.push(missing.clone());
                return Err(fail(path, "required field is missing".to_string()));
            }
            for (key, field) in object {
                path.push(key.clone());
                match properties.get(key) {
                    Some(field_schema) => validate_value(field_schema, field, path)?,
                    None if !additional_properties => {
                        return Err(fail(path, "field is not declared".to_string()))
                    }
                    None => {}
                }
                path.pop();
            }
            Ok(())
        }
    };
    expected.map_err(|kind| fail(path, format!("expected {kind}")))
}
