//! Transformation module.
//!
//! This module derives new columns from filtered records:
//! - Engine: ordered fold of transformation steps over each row
//! - Lookup: XLOOKUP resolution against the main table or an auxiliary dataset
//! - Formula: sandboxed evaluation of custom expressions
//! - Pipeline: the full assemble → filter → transform → template run

pub mod engine;
pub mod formula;
pub mod lookup;
pub mod pipeline;

pub use engine::{apply_transformations, RunDiagnostics, TransformOutput, FORMULA_ERROR_VALUE};
pub use lookup::{find_match, is_sentinel, sentinel, LookupMiss, LookupTables, MissReason};
pub use pipeline::*;
