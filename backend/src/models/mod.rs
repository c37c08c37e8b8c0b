//! Domain models for the tabflow pipeline.
//!
//! This module contains the data structures shared by every pipeline stage:
//!
//! - [`Cell`] - A scalar field value (text, number or null)
//! - [`Row`] - An ordered record of named cells
//! - [`Filter`] / [`FilterOperator`] - Row predicates
//! - [`Transformation`] / [`TransformKind`] - Derived-column steps
//! - [`AuxiliaryDataset`] - Independently maintained lookup tables
//! - [`TemplateSchema`] / [`TemplateColumn`] / [`ColumnMapping`] - Output schema
//! - [`Preset`] - A saved pipeline configuration

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Name of the field carrying the originating source when enabled.
pub const SOURCE_FIELD: &str = "Source File";

/// Lookup target id designating the filtered main table.
pub const MAIN_TABLE_ID: &str = "main";

/// Fresh random identifier for configuration entries.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// =============================================================================
// Cell
// =============================================================================

/// A scalar field value.
///
/// Equality is strict: `Number(5.0)` never equals `Text("5")`, and `NaN`
/// never equals itself.
///
/// In JSON, non-finite numbers are written as the strings `"NaN"`,
/// `"Infinity"` and `"-Infinity"`, and those exact strings read back as
/// numbers.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Null,
    Text(String),
    Number(f64),
}

impl Cell {
    /// Empty text cell.
    pub fn empty() -> Self {
        Cell::Text(String::new())
    }

    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    /// Numeric coercion used by arithmetic and comparisons.
    ///
    /// Anything that does not read as a number becomes `NaN`.
    pub fn as_number(&self) -> f64 {
        self.numeric().unwrap_or(f64::NAN)
    }

    /// The numeric reading of this cell, when it has one.
    pub fn numeric(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            Cell::Text(s) => parse_number(s),
            Cell::Null => None,
        }
    }

    /// True for null and whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Strict decimal parsing: optional sign, digits, fraction and exponent.
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let allowed = s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '+' | '-' | 'e' | 'E'));
    if !allowed || !s.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse::<f64>().ok()
}

/// Literal text form of a number (`30`, `0.5`, `NaN`, `Infinity`).
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        n.to_string()
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Text(s) => f.write_str(s),
            Cell::Number(n) => f.write_str(&format_number(*n)),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<&Value> for Cell {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Cell::Null,
            Value::String(s) => Cell::Text(s.clone()),
            Value::Number(n) => Cell::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::Bool(b) => Cell::Text(b.to_string()),
            other => Cell::Text(other.to_string()),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Null => serializer.serialize_unit(),
            Cell::Text(s) => serializer.serialize_str(s),
            Cell::Number(n) if !n.is_finite() => serializer.serialize_str(&format_number(*n)),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => {
                serializer.serialize_i64(*n as i64)
            }
            Cell::Number(n) => serializer.serialize_f64(*n),
        }
    }
}

impl<'de> Deserialize<'de> for Cell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value.as_str() {
            Some("NaN") => Cell::Number(f64::NAN),
            Some("Infinity") => Cell::Number(f64::INFINITY),
            Some("-Infinity") => Cell::Number(f64::NEG_INFINITY),
            _ => Cell::from(&value),
        })
    }
}

// =============================================================================
// Row
// =============================================================================

/// An ordered record of named cells.
///
/// A field that was never set is absent, which is distinct from a field
/// holding [`Cell::Null`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: Vec<(String, Cell)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Cell> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Set a field, overwriting in place when it already exists.
    pub fn set(&mut self, name: impl Into<String>, value: Cell) {
        let name = name.into();
        match self.fields.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Builder form of [`Row::set`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Cell>) -> Self {
        self.set(name, value.into());
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Cell)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, Cell)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.set(k, v);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct RowVisitor;

impl<'de> Visitor<'de> for RowVisitor {
    type Value = Row;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object of field values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Row, A::Error> {
        let mut row = Row::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<String, Cell>()? {
            row.set(key, value);
        }
        Ok(row)
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RowVisitor)
    }
}

/// An ordered sequence of rows, rebuilt on every run.
pub type Dataset = Vec<Row>;

/// Field names across `rows` in first-seen order.
pub fn column_names(rows: &[Row]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !names.iter().any(|n| n == key) {
                names.push(key.to_string());
            }
        }
    }
    names
}

// =============================================================================
// Filters
// =============================================================================

/// Comparison applied by a [`Filter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    #[default]
    Equals,
    Contains,
    GreaterThan,
    LessThan,
}

/// A single column predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default)]
    pub column: String,
    #[serde(default)]
    pub operator: FilterOperator,
    #[serde(default = "Cell::empty")]
    pub value: Cell,
    #[serde(default)]
    pub case_sensitive: bool,
}

impl Filter {
    pub fn new(column: &str, operator: FilterOperator, value: impl Into<Cell>) -> Self {
        Self {
            id: new_id(),
            column: column.to_string(),
            operator,
            value: value.into(),
            case_sensitive: false,
        }
    }

    pub fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }
}

// =============================================================================
// Transformations
// =============================================================================

/// Kind of derived-column step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformKind {
    Multiply,
    Add,
    Subtract,
    Divide,
    Concat,
    Xlookup,
    Custom,
}

/// One ordered pipeline step writing `new_column_name` on every row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transformation {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransformKind,
    #[serde(default)]
    pub new_column_name: String,
    #[serde(default)]
    pub source_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_column: Option<String>,
}

impl Transformation {
    fn base(kind: TransformKind, new_column: &str, sources: &[&str]) -> Self {
        Self {
            id: new_id(),
            kind,
            new_column_name: new_column.to_string(),
            source_columns: sources.iter().map(|s| s.to_string()).collect(),
            formula: None,
            lookup_target_id: None,
            lookup_column: None,
            return_column: None,
        }
    }

    /// Binary arithmetic step (`multiply`, `add`, `subtract`, `divide`).
    pub fn arithmetic(kind: TransformKind, new_column: &str, left: &str, right: &str) -> Self {
        Self::base(kind, new_column, &[left, right])
    }

    pub fn concat(new_column: &str, sources: &[&str]) -> Self {
        Self::base(TransformKind::Concat, new_column, sources)
    }

    pub fn xlookup(
        new_column: &str,
        key_column: &str,
        target_id: &str,
        lookup_column: &str,
        return_column: &str,
    ) -> Self {
        let mut t = Self::base(TransformKind::Xlookup, new_column, &[key_column]);
        t.lookup_target_id = Some(target_id.to_string());
        t.lookup_column = Some(lookup_column.to_string());
        t.return_column = Some(return_column.to_string());
        t
    }

    pub fn custom(new_column: &str, formula: &str) -> Self {
        let mut t = Self::base(TransformKind::Custom, new_column, &[]);
        t.formula = Some(formula.to_string());
        t
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }
}

// =============================================================================
// Auxiliary datasets
// =============================================================================

/// An independently uploaded dataset usable as a lookup target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuxiliaryDataset {
    #[serde(default = "new_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub rows: Vec<Row>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

impl AuxiliaryDataset {
    /// Build a dataset from rows, deriving the column list from them.
    pub fn new(id: &str, name: &str, rows: Vec<Row>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            columns: column_names(&rows),
            rows,
            last_modified: Some(chrono::Utc::now().to_rfc3339()),
        }
    }
}

// =============================================================================
// Templates
// =============================================================================

/// One column of a target template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateColumn {
    pub name: String,
    /// Fixed value carried by the template file itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant: Option<String>,
}

impl TemplateColumn {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            constant: None,
        }
    }

    pub fn with_constant(name: &str, constant: &str) -> Self {
        Self {
            name: name.to_string(),
            constant: Some(constant.to_string()),
        }
    }
}

/// A fixed output schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSchema {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub columns: Vec<TemplateColumn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

/// How one template column is filled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ColumnMapping {
    #[default]
    Unset,
    /// Same literal value on every row.
    Constant { value: String },
    /// Copy a processed column.
    Column { name: String },
}

/// Column mappings for the active template, keyed by template column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnMapping>,
}

impl TemplateMapping {
    pub fn get(&self, column: &str) -> &ColumnMapping {
        static UNSET: ColumnMapping = ColumnMapping::Unset;
        self.columns.get(column).unwrap_or(&UNSET)
    }

    pub fn with(mut self, column: &str, mapping: ColumnMapping) -> Self {
        self.columns.insert(column.to_string(), mapping);
        self
    }
}

// =============================================================================
// Preset
// =============================================================================

/// Which row of each source supplies the field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderSelector {
    /// Zero-based row index holding the header.
    Row(usize),
    /// Synthetic `Column 1..N` names; every row is data.
    Placeholder,
}

fn default_header_row() -> Option<usize> {
    Some(0)
}

/// A saved, named pipeline configuration.
///
/// `headerRow: null` selects placeholder headers; an absent `headerRow`
/// defaults to the first row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_header_row")]
    pub header_row: Option<usize>,
    #[serde(default)]
    pub selected_columns: Vec<usize>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub transformations: Vec<Transformation>,
    #[serde(default)]
    pub include_source_file_column: bool,
    #[serde(default)]
    pub template_mapping: TemplateMapping,
}

impl Preset {
    pub fn new(name: &str) -> Self {
        Self {
            id: new_id(),
            name: name.to_string(),
            header_row: default_header_row(),
            selected_columns: Vec::new(),
            filters: Vec::new(),
            transformations: Vec::new(),
            include_source_file_column: false,
            template_mapping: TemplateMapping::default(),
        }
    }

    pub fn header(&self) -> HeaderSelector {
        match self.header_row {
            Some(index) => HeaderSelector::Row(index),
            None => HeaderSelector::Placeholder,
        }
    }
}

impl Default for Preset {
    fn default() -> Self {
        Self::new("Untitled")
    }
}
