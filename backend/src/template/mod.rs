//! Template mapping: project processed records onto a fixed output schema.
//!
//! For each output row and template column, the first applicable rule wins:
//!
//! | # | Rule | Value |
//! |---|------|-------|
//! | 1 | Template column carries a fixed constant | the constant, mapping ignored |
//! | 2 | Mapping is a literal constant | the literal, on every row |
//! | 3 | Mapping references a processed column | the row's value, or `""` if absent |
//! | 4 | Unset | `""` |
//!
//! The output has exactly one row per processed row and exactly the
//! template's columns, in template order.

use crate::models::{Cell, ColumnMapping, Dataset, Row, TemplateColumn, TemplateMapping, TemplateSchema};

/// Value of one template column for one processed row.
pub fn resolve_column(column: &TemplateColumn, mapping: &ColumnMapping, row: &Row) -> Cell {
    if let Some(constant) = &column.constant {
        return Cell::text(constant.as_str());
    }
    match mapping {
        ColumnMapping::Constant { value } => Cell::text(value.as_str()),
        ColumnMapping::Column { name } => row.get(name).cloned().unwrap_or_else(Cell::empty),
        ColumnMapping::Unset => Cell::empty(),
    }
}

/// Map every processed row onto `schema`.
pub fn map_to_template(rows: &[Row], schema: &TemplateSchema, mapping: &TemplateMapping) -> Dataset {
    rows.iter()
        .map(|row| {
            schema
                .columns
                .iter()
                .map(|column| {
                    let value = resolve_column(column, mapping.get(&column.name), row);
                    (column.name.as_str(), value)
                })
                .collect::<Row>()
        })
        .collect()
}

/// Template columns that are neither fixed nor mapped.
pub fn unmapped_columns<'a>(schema: &'a TemplateSchema, mapping: &TemplateMapping) -> Vec<&'a str> {
    schema
        .columns
        .iter()
        .filter(|c| c.constant.is_none() && matches!(mapping.get(&c.name), ColumnMapping::Unset))
        .map(|c| c.name.as_str())
        .collect()
}

/// Build a template from a row matrix.
///
/// The first row names the columns; an optional second row gives fixed
/// constants, blank cells meaning "no constant".
pub fn template_from_matrix(id: &str, name: &str, rows: &[Vec<String>]) -> TemplateSchema {
    let names = rows.first().cloned().unwrap_or_default();
    let constants = rows.get(1);

    let columns = names
        .iter()
        .enumerate()
        .filter(|(_, n)| !n.trim().is_empty())
        .map(|(i, n)| TemplateColumn {
            name: n.trim().to_string(),
            constant: constants
                .and_then(|c| c.get(i))
                .filter(|v| !v.trim().is_empty())
                .cloned(),
        })
        .collect();

    TemplateSchema {
        id: id.to_string(),
        name: name.to_string(),
        columns,
        last_modified: Some(chrono::Utc::now().to_rfc3339()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> TemplateSchema {
        TemplateSchema {
            id: "t".into(),
            name: "Invoice".into(),
            columns: vec![
                TemplateColumn::new("Customer"),
                TemplateColumn::with_constant("Currency", "USD"),
                TemplateColumn::new("Channel"),
                TemplateColumn::new("Notes"),
                TemplateColumn::new("Total"),
            ],
            last_modified: None,
        }
    }

    fn mapping() -> TemplateMapping {
        TemplateMapping::default()
            .with("Customer", ColumnMapping::Column { name: "Name".into() })
            .with("Currency", ColumnMapping::Constant { value: "EUR".into() })
            .with("Channel", ColumnMapping::Constant { value: "web".into() })
            .with("Total", ColumnMapping::Column { name: "Missing".into() })
    }

    #[test]
    fn test_precedence_rules() {
        let rows = vec![Row::new().with("Name", "Ada").with("Extra", "x")];
        let out = map_to_template(&rows, &schema(), &mapping());

        assert_eq!(out.len(), 1);
        let row = &out[0];
        assert_eq!(
            row.keys().collect::<Vec<_>>(),
            vec!["Customer", "Currency", "Channel", "Notes", "Total"]
        );
        assert_eq!(row.get("Customer"), Some(&Cell::text("Ada")));
        assert_eq!(row.get("Currency"), Some(&Cell::text("USD")));
        assert_eq!(row.get("Channel"), Some(&Cell::text("web")));
        assert_eq!(row.get("Notes"), Some(&Cell::text("")));
        assert_eq!(row.get("Total"), Some(&Cell::text("")));
        assert!(!row.contains("Extra"));
    }

    #[test]
    fn test_referenced_value_copied_verbatim() {
        let rows = vec![Row::new().with("Name", Cell::Number(12.5))];
        let out = map_to_template(&rows, &schema(), &mapping());
        assert_eq!(out[0].get("Customer"), Some(&Cell::Number(12.5)));
    }

    #[test]
    fn test_cardinality_matches_input() {
        let rows = vec![Row::new(); 4];
        assert_eq!(map_to_template(&rows, &schema(), &mapping()).len(), 4);
        assert!(map_to_template(&[], &schema(), &mapping()).is_empty());
    }

    #[test]
    fn test_unmapped_columns() {
        assert_eq!(unmapped_columns(&schema(), &mapping()), vec!["Notes"]);
    }

    #[test]
    fn test_template_from_matrix() {
        let rows = vec![
            vec!["Name".to_string(), "Currency".to_string(), " ".to_string()],
            vec!["".to_string(), "USD".to_string()],
        ];
        let schema = template_from_matrix("t1", "Orders", &rows);
        assert_eq!(schema.columns.len(), 2);
        assert_eq!(schema.columns[0].constant, None);
        assert_eq!(schema.columns[1].constant.as_deref(), Some("USD"));
    }
}
