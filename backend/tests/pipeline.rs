//! End-to-end behavior of the pipeline stages.

use tabflow::{
    apply_filters, apply_transformations, audit_lookup, map_to_template, run_pipeline, AuxiliaryDataset, Cell,
    ColumnMapping, Filter, FilterOperator, PipelineInput, Preset, RawSource, Row, TemplateColumn, TemplateMapping,
    TemplateSchema, TransformKind, Transformation, MAIN_TABLE_ID,
};

fn people() -> Vec<Row> {
    vec![
        Row::new().with("First", "Ada").with("Last", "Lovelace").with("Price", "10").with("Qty", "3"),
        Row::new().with("First", "Alan").with("Last", "Turing").with("Price", "2.5").with("Qty", "4"),
        Row::new().with("First", "Grace").with("Last", "Hopper").with("Price", "x").with("Qty", "1"),
    ]
}

#[test]
fn two_sources_filter_and_add() {
    let sources = vec![
        RawSource::from_strs("first.csv", &[&["Name", "Amount"], &["A", "10"], &["B", "20"]]),
        RawSource::from_strs("second.csv", &[&["Name", "Amount"], &["C", "5"]]),
    ];
    let mut preset = Preset::new("end-to-end");
    preset.selected_columns = vec![0, 1];
    preset.filters.push(Filter::new("Amount", FilterOperator::GreaterThan, "8"));
    preset.transformations.push(Transformation::arithmetic(TransformKind::Add, "Total", "Amount", "Amount"));

    let output = run_pipeline(&PipelineInput::new(&sources, &preset)).unwrap();

    assert_eq!(output.configured.len(), 3);
    assert_eq!(output.processed.len(), 2);
    assert_eq!(output.processed[0].get("Name"), Some(&Cell::text("A")));
    assert_eq!(output.processed[0].get("Total"), Some(&Cell::Number(20.0)));
    assert_eq!(output.processed[1].get("Name"), Some(&Cell::text("B")));
    assert_eq!(output.processed[1].get("Total"), Some(&Cell::Number(40.0)));
    assert!(output.diagnostics.is_clean());
}

#[test]
fn swapping_independent_steps_keeps_values() {
    let concat = Transformation::concat("Full", &["First", "Last"]);
    let product = Transformation::arithmetic(TransformKind::Multiply, "Total", "Price", "Qty");

    let forward = apply_transformations(&people(), &[concat.clone(), product.clone()], &[]);
    let backward = apply_transformations(&people(), &[product, concat], &[]);

    for (a, b) in forward.rows.iter().zip(&backward.rows) {
        for name in ["Full", "Total", "First", "Price"] {
            assert_eq!(format!("{:?}", a.get(name)), format!("{:?}", b.get(name)), "column {}", name);
        }
    }
    assert_eq!(forward.diagnostics, backward.diagnostics);
}

#[test]
fn self_reference_reads_absent_field() {
    let ts = vec![
        Transformation::concat("Tag", &["First", "Tag"]),
        Transformation::xlookup("Echo", "Echo", MAIN_TABLE_ID, "First", "Last"),
        Transformation::custom("Score", "Score + 1"),
    ];
    let out = apply_transformations(&people(), &ts, &[]);

    assert_eq!(out.rows[0].get("Tag"), Some(&Cell::text("Ada")));
    assert_eq!(out.rows[0].get("Echo"), Some(&Cell::text("Not found: \"\"")));
    // Undefined reference in a formula is a per-row fault, not a panic.
    assert_eq!(out.rows[0].get("Score"), Some(&Cell::text("Error")));
    assert_eq!(out.diagnostics.formula_errors, 3);
}

#[test]
fn equals_filter_does_not_coerce() {
    let rows = vec![
        Row::new().with("v", Cell::Number(5.0)),
        Row::new().with("v", "5"),
    ];
    let kept = apply_filters(&rows, &[Filter::new("v", FilterOperator::Equals, "5")]);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].get("v"), Some(&Cell::text("5")));
}

#[test]
fn exact_match_beats_earlier_fuzzy_match() {
    let target = AuxiliaryDataset::new(
        "codes",
        "Codes",
        vec![
            Row::new().with("Code", " abc ").with("Label", "trimmed"),
            Row::new().with("Code", "ABC").with("Label", "case"),
            Row::new().with("Code", "abc").with("Label", "exact"),
        ],
    );
    let rows = vec![
        Row::new().with("Key", "abc"),
        Row::new().with("Key", "Abc "),
    ];
    let ts = vec![Transformation::xlookup("Label", "Key", "codes", "Code", "Label")];
    let out = apply_transformations(&rows, &ts, &[target]);

    assert_eq!(out.rows[0].get("Label"), Some(&Cell::text("exact")));
    // Trimmed `Abc` has no exact or trimmed match; the first case-insensitive one wins.
    assert_eq!(out.rows[1].get("Label"), Some(&Cell::text("trimmed")));
}

#[test]
fn audit_count_matches_replayed_misses() {
    let rates = AuxiliaryDataset::new(
        "rates",
        "Rates",
        vec![Row::new().with("Code", "Ada-10").with("Rate", "1")],
    );
    let ts = vec![
        Transformation::custom("Key", "First + \"-\" + Price"),
        Transformation::xlookup("Rate", "Key", "rates", "Code", "Rate").with_id("lk"),
    ];

    let report = audit_lookup(&people(), &ts, 1, std::slice::from_ref(&rates)).unwrap();
    let again = audit_lookup(&people(), &ts, 1, std::slice::from_ref(&rates)).unwrap();
    assert_eq!(report, again);

    let executed = apply_transformations(&people(), &ts, &[rates]);
    let mut missed: Vec<String> = executed
        .diagnostics
        .lookup_misses
        .iter()
        .map(|m| m.miss.key.clone())
        .collect();
    missed.sort();
    missed.dedup();

    assert_eq!(report.missing_count(), missed.len());
    assert_eq!(report.missing_count(), 2);
    assert_eq!(report.checked_keys, 3);
}

#[test]
fn formula_product_and_error_counter() {
    let rows = vec![Row::new().with("Price", "10").with("Quantity", "3")];
    let ok = apply_transformations(&rows, &[Transformation::custom("Total", "Price * Quantity")], &[]);
    assert_eq!(ok.rows[0].get("Total"), Some(&Cell::Number(30.0)));
    assert_eq!(ok.rows[0].get("Total").map(Cell::to_string), Some("30".to_string()));
    assert_eq!(ok.diagnostics.formula_errors, 0);

    let bad = apply_transformations(&rows, &[Transformation::custom("Total", "Price * Discount")], &[]);
    assert_eq!(bad.rows[0].get("Total"), Some(&Cell::text("Error")));
    assert_eq!(bad.diagnostics.formula_errors, 1);
}

#[test]
fn template_constant_always_wins() {
    let schema = TemplateSchema {
        id: "invoice".into(),
        name: "Invoice".into(),
        columns: vec![TemplateColumn::new("Name"), TemplateColumn::with_constant("Currency", "USD")],
        last_modified: None,
    };
    let mappings = [
        ColumnMapping::Unset,
        ColumnMapping::Constant { value: "EUR".into() },
        ColumnMapping::Column { name: "First".into() },
    ];

    for mapping in mappings {
        let mapping = TemplateMapping::default()
            .with("Name", ColumnMapping::Column { name: "First".into() })
            .with("Currency", mapping);
        let out = map_to_template(&people(), &schema, &mapping);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|r| r.get("Currency") == Some(&Cell::text("USD"))));
        assert_eq!(out[1].get("Name"), Some(&Cell::text("Alan")));
    }
}

#[test]
fn main_lookup_sees_pre_transform_rows() {
    let rows = vec![
        Row::new().with("Id", "1").with("Parent", "2"),
        Row::new().with("Id", "2").with("Parent", ""),
    ];
    let ts = vec![
        Transformation::concat("Label", &["Id", "Id"]),
        Transformation::xlookup("ParentLabel", "Parent", MAIN_TABLE_ID, "Id", "Label"),
    ];
    let out = apply_transformations(&rows, &ts, &[]);
    // The main table is frozen before `Label` exists, so the return column is null.
    assert_eq!(out.rows[0].get("ParentLabel"), Some(&Cell::Null));
}
