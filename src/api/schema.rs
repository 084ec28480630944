//! Structured Output Schemas
//!
//! Builds the strict JSON Schema subset the API accepts for structured
//! output, and validates returned payloads against it.

use serde_json::{json, Map, Value};

use crate::api::request::TextFormat;
use crate::error::{Error, Result};

/// A named JSON schema for structured output
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    name: String,
    schema: Value,
    strict: bool,
}

impl Schema {
    /// Build an object schema from a mapping of field name to type tag
    ///
    /// Tags are `"string"`, `"integer"`, `"number"`, `"boolean"` and
    /// `"array"` (an array of strings). A one-element array such as
    /// `["integer"]` is a typed array, and a nested object is a nested
    /// schema. Every field is required and no other keys are allowed.
    ///
    /// ```
    /// use openai_responses::Schema;
    /// use serde_json::json;
    ///
    /// let schema = Schema::object("person", &json!({
    ///     "name": "string",
    ///     "tags": "array",
    ///     "address": {"city": "string", "zip": "integer"}
    /// })).unwrap();
    /// assert_eq!(schema.json_schema()["properties"]["address"]["type"], "object");
    ///
    /// assert!(Schema::object("bad", &json!({"when": "date"})).is_err());
    /// ```
    pub fn object(name: impl Into<String>, fields: &Value) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::Schema("schema name must not be empty".to_string()));
        }
        if !fields.is_object() {
            return Err(Error::Schema(format!(
                "$: expected an object mapping field names to types, got {}",
                type_name(fields)
            )));
        }

        Ok(Self {
            name,
            schema: build_node(fields, "$")?,
            strict: true,
        })
    }

    /// Wrap a hand-written JSON schema
    pub fn from_json_schema(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
            strict: true,
        }
    }

    /// Allow the model to deviate from the schema
    pub fn non_strict(mut self) -> Self {
        self.strict = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn json_schema(&self) -> &Value {
        &self.schema
    }

    /// The `text.format` value for a request
    pub fn text_format(&self) -> TextFormat {
        TextFormat::JsonSchema {
            name: self.name.clone(),
            schema: self.schema.clone(),
            description: None,
            strict: self.strict,
        }
    }

    /// Check a payload against this schema
    ///
    /// Fails with the path of the first offending value, e.g. `$.tags[2]`.
    pub fn validate(&self, value: &Value) -> Result<()> {
        validate_node(&self.schema, value, "$")
    }
}

fn build_node(shape: &Value, path: &str) -> Result<Value> {
    match shape {
        Value::String(tag) => scalar(tag, path),
        Value::Object(fields) => {
            let mut properties = Map::new();
            for (field, field_shape) in fields {
                properties.insert(field.clone(), build_node(field_shape, &format!("{path}.{field}"))?);
            }
            let required: Vec<Value> = fields.keys().cloned().map(Value::String).collect();
            Ok(json!({
                "type": "object",
                "properties": properties,
                "required": required,
                "additionalProperties": false
            }))
        }
        Value::Array(items) if items.len() == 1 => Ok(json!({
            "type": "array",
            "items": build_node(&items[0], &format!("{path}[]"))?
        })),
        Value::Array(_) => Err(Error::Schema(format!(
            "{path}: typed arrays take exactly one item type"
        ))),
        other => Err(Error::Schema(format!("{path}: unsupported type tag {other}"))),
    }
}

fn scalar(tag: &str, path: &str) -> Result<Value> {
    match tag {
        "string" | "integer" | "number" | "boolean" => Ok(json!({ "type": tag })),
        "array" => Ok(json!({"type": "array", "items": {"type": "string"}})),
        other => Err(Error::Schema(format!(
            "{path}: unsupported type tag '{other}' (expected string, integer, number, boolean, array, [type] or an object)"
        ))),
    }
}

fn mismatch(path: &str, message: impl Into<String>) -> Error {
    Error::SchemaMismatch {
        path: path.to_string(),
        message: message.into(),
    }
}

fn validate_node(schema: &Value, value: &Value, path: &str) -> Result<()> {
    let Some(expected) = schema.get("type") else {
        // Schemas without a type (anyOf, $ref, ...) are accepted as-is
        return Ok(());
    };

    // "type" may be a list, e.g. ["string", "null"]
    let allowed: Vec<&str> = match expected {
        Value::String(t) => vec![t.as_str()],
        Value::Array(ts) => ts.iter().filter_map(Value::as_str).collect(),
        _ => return Ok(()),
    };
    if !allowed.iter().any(|t| type_matches(t, value)) {
        return Err(mismatch(
            path,
            format!("expected {}, found {}", allowed.join(" or "), type_name(value)),
        ));
    }

    match value {
        Value::Object(obj) => {
            let properties = schema.get("properties").and_then(Value::as_object);

            if let Some(required) = schema.get("required").and_then(Value::as_array) {
                for key in required.iter().filter_map(Value::as_str) {
                    if !obj.contains_key(key) {
                        return Err(mismatch(&format!("{path}.{key}"), "missing required field"));
                    }
                }
            }

            let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));
            for (key, child) in obj {
                match properties.and_then(|p| p.get(key)) {
                    Some(child_schema) => validate_node(child_schema, child, &format!("{path}.{key}"))?,
                    None if closed => {
                        return Err(mismatch(&format!("{path}.{key}"), "unexpected field"))
                    }
                    None => {}
                }
            }
            Ok(())
        }
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    validate_node(item_schema, item, &format!("{path}[{i}]"))?;
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => {
            value.is_i64()
                || value.is_u64()
                || value.as_f64().map_or(false, |f| f.fract() == 0.0)
        }
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
