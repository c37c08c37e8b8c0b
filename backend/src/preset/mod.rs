//! Preset interchange: a JSON array of presets.
//!
//! Import is all-or-nothing. The document must pass the interchange schema
//! and every entry must deserialize; only then is the list returned, so a
//! failed import never touches the caller's saved presets. Missing fields
//! take their defaults (fresh ids included).

use serde_json::Value;

use crate::error::{PresetError, PresetResult};
use crate::models::Preset;
use crate::validation::validate_preset_document;

/// Serialize presets as a pretty-printed interchange document.
pub fn export_presets(presets: &[Preset]) -> PresetResult<String> {
    Ok(serde_json::to_string_pretty(presets)?)
}

/// Parse and validate an interchange document.
pub fn import_presets(document: &str) -> PresetResult<Vec<Preset>> {
    let value: Value = serde_json::from_str(document)?;
    validate_preset_document(&value).map_err(|errors| PresetError::SchemaError { errors })?;

    let Value::Array(entries) = value else {
        return Err(PresetError::SchemaError {
            errors: vec!["expected an array of presets".to_string()],
        });
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            serde_json::from_value::<Preset>(entry).map_err(|e| PresetError::InvalidEntry {
                index,
                message: e.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Filter, FilterOperator, HeaderSelector, TransformKind, Transformation};

    #[test]
    fn test_round_trip() {
        let mut preset = Preset::new("Orders");
        preset.header_row = None;
        preset.selected_columns = vec![0, 2];
        preset.filters.push(Filter::new("Region", FilterOperator::Contains, "eu"));
        preset.transformations.push(Transformation::custom("Total", "Price * Qty"));

        let text = export_presets(&[preset.clone()]).unwrap();
        let back = import_presets(&text).unwrap();
        assert_eq!(back, vec![preset]);
    }

    #[test]
    fn test_fills_defaults() {
        let presets = import_presets(r#"[{ "name": "Bare" }, { "transformations": [{ "type": "concat" }] }]"#).unwrap();

        assert_eq!(presets.len(), 2);
        assert_eq!(presets[0].header(), HeaderSelector::Row(0));
        assert!(presets[0].filters.is_empty());
        assert!(!presets[0].include_source_file_column);
        assert_ne!(presets[0].id, presets[1].id);

        let step = &presets[1].transformations[0];
        assert_eq!(step.kind, TransformKind::Concat);
        assert!(step.new_column_name.is_empty());
        assert!(!step.id.is_empty());
    }

    #[test]
    fn test_rejects_invalid_documents() {
        assert!(matches!(import_presets("not json"), Err(PresetError::JsonError(_))));
        assert!(matches!(import_presets(r#"{"name":"x"}"#), Err(PresetError::SchemaError { .. })));
        assert!(matches!(
            import_presets(r#"[{"filters":[{"column":"a","operator":"between"}]}]"#),
            Err(PresetError::SchemaError { .. })
        ));
    }
}
