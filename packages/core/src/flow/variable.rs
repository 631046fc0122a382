use flowboard_types::{Value, create_id, json, sync::Mutex};
use highway::HighwayHash;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::pin::ValueType;
use crate::utils::hash::digest_hasher;

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone)]
pub struct Variable {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub default_value: Option<Vec<u8>>,
    pub data_type: VariableType,
    pub value_type: ValueType,
    /// Surfaced in app configuration.
    pub exposed: bool,
    /// Value hidden in UIs and scrubbed from logs and intercom events.
    pub secret: bool,
    pub editable: bool,
    /// Value is never stored in the board; callers supply it per execution.
    #[serde(default)]
    pub runtime_configured: bool,
    pub hash: Option<u64>,
    pub schema: Option<String>,

    #[serde(skip)]
    pub value: Arc<Mutex<Value>>,
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.category == other.category
            && self.description == other.description
            && self.default_value == other.default_value
            && self.data_type == other.data_type
            && self.value_type == other.value_type
            && self.exposed == other.exposed
            && self.secret == other.secret
            && self.editable == other.editable
            && self.runtime_configured == other.runtime_configured
            && self.schema == other.schema
        // Intentionally excluding self.value comparison
    }
}

impl Eq for Variable {}

impl Variable {
    pub fn new(name: &str, data_type: VariableType, value_type: ValueType) -> Self {
        Self {
            id: create_id(),
            name: name.to_string(),
            category: None,
            description: None,
            default_value: None,
            data_type,
            value_type,
            exposed: false,
            secret: false,
            editable: true,
            runtime_configured: false,
            value: Arc::new(Mutex::new(Value::Null)),
            hash: None,
            schema: None,
        }
    }

    pub fn duplicate(&self) -> Self {
        Self {
            id: create_id(),
            name: self.name.clone(),
            category: self.category.clone(),
            description: self.description.clone(),
            default_value: self.default_value.clone(),
            data_type: self.data_type.clone(),
            value_type: self.value_type.clone(),
            exposed: self.exposed,
            secret: self.secret,
            editable: self.editable,
            runtime_configured: self.runtime_configured,
            value: Arc::new(Mutex::new(Value::Null)),
            hash: None,
            schema: self.schema.clone(),
        }
    }

    pub fn set_editable(&mut self, editable: bool) -> &mut Self {
        self.editable = editable;
        self
    }

    pub fn set_exposed(&mut self, exposed: bool) -> &mut Self {
        self.exposed = exposed;
        self
    }

    pub fn set_secret(&mut self, secret: bool) -> &mut Self {
        self.secret = secret;
        self
    }

    pub fn set_runtime_configured(&mut self, runtime_configured: bool) -> &mut Self {
        self.runtime_configured = runtime_configured;
        self
    }

    pub fn set_category(&mut self, category: String) -> &mut Self {
        self.category = Some(category);
        self
    }

    pub fn set_description(&mut self, description: String) -> &mut Self {
        self.description = Some(description);
        self
    }

    pub fn set_default_value(&mut self, default_value: Value) -> &mut Self {
        self.default_value = json::to_vec(&default_value).ok();
        self
    }

    pub fn set_schema(&mut self, schema: Option<String>) -> &mut Self {
        self.schema = schema;
        self
    }

    pub fn get_value(&self) -> Arc<Mutex<Value>> {
        self.value.clone()
    }

    pub fn hash(&mut self) {
        let mut hasher = digest_hasher();

        hasher.append(self.id.as_bytes());
        hasher.append(self.name.as_bytes());

        if let Some(category) = &self.category {
            hasher.append(category.as_bytes());
        }

        if let Some(description) = &self.description {
            hasher.append(description.as_bytes());
        }

        // Secret values never leak into the digest
        if !self.secret {
            if let Some(default_value) = &self.default_value {
                hasher.append(default_value);
            }
        }

        if let Some(schema) = &self.schema {
            hasher.append(schema.as_bytes());
        }

        hasher.append(format!("{:?}", self.data_type).as_bytes());
        hasher.append(format!("{:?}", self.value_type).as_bytes());
        hasher.append(&[self.exposed as u8]);
        hasher.append(&[self.secret as u8]);
        hasher.append(&[self.editable as u8]);
        hasher.append(&[self.runtime_configured as u8]);

        self.hash = Some(hasher.finalize64());
    }

    /// Infer and set schema from example JSON or keep an existing schema.
    /// Returns the normalized schema string on success.
    pub fn infer_schema_from_json(&mut self, raw: &str) -> flowboard_types::Result<String> {
        let schema = infer_schema_from_json(raw)?;
        self.schema = Some(schema.clone());
        Ok(schema)
    }
}

/// Check if a JSON value looks like a JSON Schema
fn looks_like_schema(value: &Value) -> bool {
    const SCHEMA_KEYWORDS: &[&str] = &[
        "type",
        "properties",
        "items",
        "$schema",
        "$ref",
        "allOf",
        "anyOf",
        "oneOf",
        "not",
        "required",
        "additionalProperties",
        "patternProperties",
        "enum",
        "const",
        "minimum",
        "maximum",
        "minLength",
        "maxLength",
        "pattern",
        "format",
        "definitions",
        "$defs",
    ];

    value
        .as_object()
        .map(|obj| SCHEMA_KEYWORDS.iter().any(|kw| obj.contains_key(*kw)))
        .unwrap_or(false)
}

/// Infer a JSON Schema from example JSON or pass through an existing schema.
/// Only infers from objects/arrays - primitive values are rejected to avoid
/// accidentally treating hash references as example data.
pub fn infer_schema_from_json(raw: &str) -> flowboard_types::Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(flowboard_types::anyhow!("Schema input cannot be empty"));
    }

    let user_json = json::from_str::<Value>(trimmed).map_err(|e| {
        flowboard_types::anyhow!(
            "Schema must be valid JSON (either a JSON Schema or an example JSON). Parse error: {e}"
        )
    })?;

    let inferred = if looks_like_schema(&user_json) {
        user_json
    } else {
        if !user_json.is_object() && !user_json.is_array() {
            return Err(flowboard_types::anyhow!(
                "Schema must be a JSON Schema object or example JSON object/array, not a primitive value"
            ));
        }
        let schema = schemars::schema_for_value!(&user_json);
        json::to_value(&schema)?
    };

    json::to_string_pretty(&inferred)
        .map_err(|e| flowboard_types::anyhow!("Failed to serialize schema: {e}"))
}

#[derive(PartialEq, Eq, Serialize, Deserialize, JsonSchema, Debug, Clone, Hash)]
pub enum VariableType {
    Execution,
    String,
    Integer,
    Float,
    Boolean,
    Date,
    PathBuf,
    Generic,
    Struct,
    Byte,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_default_excluded_from_digest() {
        let mut open = Variable::new("token", VariableType::String, ValueType::Normal);
        open.set_default_value(serde_json::json!("value-a"));
        open.hash();
        let open_a = open.hash;
        open.set_default_value(serde_json::json!("value-b"));
        open.hash();
        assert_ne!(open_a, open.hash);

        let mut secret = Variable::new("token", VariableType::String, ValueType::Normal);
        secret.set_secret(true);
        secret.id = "fixed".to_string();
        secret.set_default_value(serde_json::json!("value-a"));
        secret.hash();
        let secret_a = secret.hash;
        secret.set_default_value(serde_json::json!("value-b"));
        secret.hash();
        assert_eq!(secret_a, secret.hash);
    }

    #[test]
    fn schema_inference_rejects_primitives() {
        assert!(infer_schema_from_json("42").is_err());
        assert!(infer_schema_from_json(r#"{"x": 1}"#).is_ok());
    }

    #[test]
    fn existing_schema_passes_through() {
        let schema = r#"{"type":"object","properties":{"x":{"type":"number"}}}"#;
        let normalized = infer_schema_from_json(schema).unwrap();
        let value: Value = json::from_str(&normalized).unwrap();
        assert_eq!(value["type"], "object");
    }
}
