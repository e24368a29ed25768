//! Deterministic synthesis of variable names from GRIB1 metadata.
//!
//! Names are pure functions of the parameter-table lookup and the
//! variable's identity fields. Collisions within a group are resolved
//! by the schema projector, not here.

use std::fmt::Write;

use crate::index::VariableMeta;
use crate::tables::Grib1ParamTables;

/// Canonicalize a parameter description into a name token: ASCII
/// letters, digits and `_` only, whitespace runs collapsed to one `_`,
/// punctuation dropped, and a letter prefixed when the first character
/// would be a digit.
pub fn name_from_description(description: &str) -> String {
    let mut name = String::with_capacity(description.len());
    let mut pending_sep = false;

    for ch in description.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !name.is_empty() {
                name.push('_');
            }
            pending_sep = false;
            name.push(ch);
        } else if ch.is_ascii_whitespace() {
            pending_sep = true;
        }
        // everything else (punctuation, non-ASCII) is dropped
    }

    if name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        name.insert(0, 'N');
    }
    name
}

/// Synthesize the short variable name.
///
/// Base token from the parameter description, or
/// `VAR<center>-<subcenter>-<version>-<number>` when the parameter is
/// unknown; then a level-type suffix and a statistic suffix.
pub fn make_variable_name(
    tables: &dyn Grib1ParamTables,
    center: i32,
    subcenter: i32,
    meta: &VariableMeta,
) -> String {
    let mut name = match tables.parameter(center, subcenter, meta.table_version, meta.parameter) {
        Some(param) => name_from_description(&param.description),
        None => format!(
            "VAR{}-{}-{}-{}",
            center, subcenter, meta.table_version, meta.parameter
        ),
    };

    if meta.level_type >= 0 {
        // satellite data has no level
        let _ = write!(name, "_{}", tables.level_short_name(meta.level_type));
    }

    if meta.intv_type >= 0 {
        if let Some(stat) = tables.stat_type(meta.intv_type) {
            let _ = write!(name, "_{}", stat.abbrev());
        }
    }

    name
}

/// Synthesize the human-readable long name.
pub fn make_variable_long_name(
    tables: &dyn Grib1ParamTables,
    center: i32,
    subcenter: i32,
    meta: &VariableMeta,
) -> String {
    let mut name = String::new();

    if meta.is_probability() {
        name.push_str("Probability ");
    }

    match tables.parameter(center, subcenter, meta.table_version, meta.parameter) {
        Some(param) => name.push_str(&param.description),
        None => {
            let _ = write!(
                name,
                "Unknown Parameter {}-{}-{}-{}",
                center, subcenter, meta.table_version, meta.parameter
            );
        }
    }

    if meta.intv_type >= 0 {
        if let Some(stat) = tables.stat_type(meta.intv_type) {
            let _ = write!(name, " ({})", stat);
        }
    }

    if meta.level_type >= 0 {
        let _ = write!(name, " @ {}", tables.level_short_name(meta.level_type));
        if meta.is_layer {
            name.push_str(" layer");
        }
    }

    name
}

/// The variable's units: the parameter unit, or empty when unknown.
pub fn make_variable_units(
    tables: &dyn Grib1ParamTables,
    center: i32,
    subcenter: i32,
    meta: &VariableMeta,
) -> String {
    tables
        .parameter(center, subcenter, meta.table_version, meta.parameter)
        .map(|param| param.unit)
        .unwrap_or_default()
}
