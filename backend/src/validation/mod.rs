//! JSON Schema validation for preset interchange documents.
//!
//! The interchange schema is embedded at compile time from
//! `schemas/preset-interchange.json` and checked with JSON Schema Draft 7.
//! It only pins the document's shape (an array of preset objects with
//! correctly typed fields); every field may be absent and is defaulted when
//! the entries are deserialized.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use tabflow::validation::validate_preset_document;
//!
//! assert!(validate_preset_document(&json!([{ "name": "Orders" }])).is_ok());
//! assert!(validate_preset_document(&json!({ "name": "Orders" })).is_err());
//! ```

use serde_json::Value;

const PRESET_INTERCHANGE_SCHEMA: &str = include_str!("../../schemas/preset-interchange.json");

/// Validate a JSON value against a JSON schema.
///
/// Returns every validation error message when `data` does not conform.
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema)
        .map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

fn preset_schema() -> Result<Value, Vec<String>> {
    serde_json::from_str(PRESET_INTERCHANGE_SCHEMA)
        .map_err(|e| vec![format!("Invalid embedded schema: {}", e)])
}

/// Validate a preset interchange document (array of presets).
pub fn validate_preset_document(data: &Value) -> Result<(), Vec<String>> {
    validate(&preset_schema()?, data)
}

/// Quick check against the interchange schema.
pub fn is_valid_preset_document(data: &Value) -> bool {
    preset_schema().is_ok_and(|schema| is_valid(&schema, data))
}
