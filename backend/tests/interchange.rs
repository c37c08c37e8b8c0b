//! Preset interchange, persistence and export.

use tabflow::{
    export_csv, export_presets, import_presets, run_pipeline, ColumnMapping, Filter, FilterOperator, HeaderSelector,
    PipelineInput, Preset, RawSource, Store, TemplateMapping, TransformKind, Transformation,
};
use tempfile::tempdir;

fn configured_preset() -> Preset {
    let mut preset = Preset::new("Orders");
    preset.header_row = Some(1);
    preset.include_source_file_column = true;
    preset.filters.push(Filter::new("Region", FilterOperator::Contains, "eu"));
    preset.filters.push(Filter::new("Amount", FilterOperator::LessThan, "100").case_sensitive());
    preset.transformations.push(Transformation::arithmetic(TransformKind::Divide, "Half", "Amount", "Two"));
    preset.transformations.push(Transformation::custom("Label", "Region + \":\" + Amount"));
    preset.template_mapping = TemplateMapping::default().with("Out", ColumnMapping::Column { name: "Label".into() });
    preset
}

fn sources() -> Vec<RawSource> {
    vec![RawSource::from_strs(
        "orders.csv",
        &[
            &["exported 2024-05-01", "", ""],
            &["Region", "Amount", "Two"],
            &["EU-West", "40", "2"],
            &["US", "50", "2"],
            &["eu-north", "500", "2"],
        ],
    )]
}

#[test]
fn round_trip_is_behaviorally_equivalent() {
    let preset = configured_preset();
    let document = export_presets(&[preset.clone()]).unwrap();
    let imported = import_presets(&document).unwrap().remove(0);

    assert_eq!(imported, preset);

    let a = run_pipeline(&PipelineInput::new(&sources(), &preset)).unwrap();
    let b = run_pipeline(&PipelineInput::new(&sources(), &imported)).unwrap();
    assert_eq!(a.processed, b.processed);
    assert_eq!(a.processed.len(), 1);
}

#[test]
fn absent_optional_fields_are_defaulted() {
    let document = r#"[{
        "name": "Sparse",
        "filters": [{ "column": "Region" }],
        "transformations": [{ "type": "xlookup", "newColumnName": "Rate" }]
    }]"#;
    let preset = import_presets(document).unwrap().remove(0);

    assert!(!preset.id.is_empty());
    assert_eq!(preset.header(), HeaderSelector::Row(0));
    assert!(preset.selected_columns.is_empty());
    assert_eq!(preset.filters[0].operator, FilterOperator::Equals);
    assert!(!preset.filters[0].case_sensitive);
    assert!(preset.transformations[0].lookup_target_id.is_none());
    assert!(preset.template_mapping.columns.is_empty());
}

#[test]
fn failed_import_leaves_store_untouched() {
    let dir = tempdir().unwrap();
    let mut store = Store::open(dir.path());
    store.presets.save(configured_preset()).unwrap();

    let broken = r#"[{ "name": "ok" }, { "filters": 3 }]"#;
    assert!(import_presets(broken).is_err());
    assert_eq!(Store::open(dir.path()).presets.list().len(), 1);
}

#[test]
fn processed_rows_export_as_csv() {
    let preset = configured_preset();
    let output = run_pipeline(&PipelineInput::new(&sources(), &preset)).unwrap();

    let mut buffer = Vec::new();
    export_csv(&output.processed, &mut buffer).unwrap();
    let text = String::from_utf8(buffer).unwrap();

    assert_eq!(text, "Source File,Region,Amount,Two,Half,Label\norders.csv,EU-West,40,2,20,EU-West:40\n");
}
