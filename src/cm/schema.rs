//! Parameter schemas for calculation modules.
//!
//! Each CM ships a JSON Schema document describing its parameter object
//! (types, bounds, enums, defaults, required fields). The document is exposed
//! bit-exact through the API so the frontend can render submission forms; a
//! compiled validator checks every submission before a task is created.

use jsonschema::error::ValidationErrorKind;
use jsonschema::Validator;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::Violation;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema document is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("schema document does not compile: {0}")]
    Compile(String),
}

/// A CM parameter schema: the verbatim document plus its compiled validator.
pub struct ParameterSchema {
    document: Value,
    validator: Validator,
}

impl ParameterSchema {
    /// Parse and compile a schema document.
    pub fn compile(raw: &str) -> Result<Self, SchemaError> {
        let document: Value = serde_json::from_str(raw)?;
        let validator =
            jsonschema::validator_for(&document).map_err(|e| SchemaError::Compile(e.to_string()))?;
        Ok(Self {
            document,
            validator,
        })
    }

    /// The schema document exactly as shipped.
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Validate a submitted parameter object.
    ///
    /// Returns every violation, each naming the offending field: the property
    /// name for missing required fields, the instance path otherwise.
    pub fn validate(&self, params: &Value) -> Result<(), Vec<Violation>> {
        let violations: Vec<Violation> = self
            .validator
            .iter_errors(params)
            .map(|err| {
                let field = match &err.kind {
                    ValidationErrorKind::Required { property } => property
                        .as_str()
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| property.to_string()),
                    _ => {
                        let pointer = err.instance_path.to_string();
                        let trimmed = pointer.trim_start_matches('/');
                        if trimmed.is_empty() {
                            "parameters".to_string()
                        } else {
                            trimmed.replace('/', ".")
                        }
                    }
                };
                Violation::new(field, err.to_string())
            })
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    /// Build the parameter object holding every property's declared default.
    pub fn defaults(&self) -> Value {
        let mut params = Map::new();
        if let Some(properties) = self.document.get("properties").and_then(Value::as_object) {
            for (name, property) in properties {
                if let Some(default) = property.get("default") {
                    params.insert(name.clone(), default.clone());
                }
            }
        }
        Value::Object(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_schema() -> ParameterSchema {
        ParameterSchema::compile(
            r#"{
                "type": "object",
                "properties": {
                    "building type": {
                        "type": "string",
                        "enum": ["SFH", "MFH"],
                        "default": "SFH"
                    },
                    "number of stories": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": 8,
                        "default": 1
                    }
                },
                "required": ["building type", "number of stories"],
                "additionalProperties": false
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_valid_params_pass() {
        let schema = test_schema();
        let params = json!({"building type": "MFH", "number of stories": 3});
        assert!(schema.validate(&params).is_ok());
    }

    #[test]
    fn test_enum_violation_names_the_field() {
        let schema = test_schema();
        let params = json!({"building type": "XYZ", "number of stories": 1});
        let violations = schema.validate(&params).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "building type");
        assert!(violations[0].message.contains("XYZ"));
    }

    #[test]
    fn test_missing_required_names_the_property() {
        let schema = test_schema();
        let params = json!({"building type": "SFH"});
        let violations = schema.validate(&params).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "number of stories");
    }

    #[test]
    fn test_all_violations_reported() {
        let schema = test_schema();
        let params = json!({"building type": "XYZ", "number of stories": 99});
        let violations = schema.validate(&params).unwrap_err();
        let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
        assert!(fields.contains(&"building type"));
        assert!(fields.contains(&"number of stories"));
    }

    #[test]
    fn test_non_object_params_rejected() {
        let schema = test_schema();
        let violations = schema.validate(&json!([1, 2, 3])).unwrap_err();
        assert_eq!(violations[0].field, "parameters");
    }

    #[test]
    fn test_defaults_collects_declared_defaults() {
        let schema = test_schema();
        let defaults = schema.defaults();
        assert_eq!(defaults["building type"], "SFH");
        assert_eq!(defaults["number of stories"], 1);
        assert!(schema.validate(&defaults).is_ok());
    }

    #[test]
    fn test_invalid_schema_document_rejected() {
        assert!(matches!(
            ParameterSchema::compile("not json"),
            Err(SchemaError::Parse(_))
        ));
    }
}
