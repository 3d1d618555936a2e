//! Type mapping from MySQL column types to PostgreSQL.
//!
//! The source catalog reports types with their width, precision and
//! attributes inline (`varchar(255)`, `int(11) unsigned`, `decimal(10,2)`),
//! so matching is done on the lower-cased base name by substring, first match
//! wins. The order of the rules below matters: `varchar` must be tried before
//! `char`, and `datetime` before `date`.

use crate::core::TypeMapping;

/// Map a MySQL column type to a PostgreSQL column type.
///
/// Never fails. Types without a rule map to `TEXT` and the returned mapping
/// is marked lossy.
pub fn map_type(source_type: &str) -> TypeMapping {
    let lower = source_type.trim().to_lowercase();
    let base = base_type(&lower);

    if is_integer(base) {
        return TypeMapping::lossless("INTEGER");
    }
    if base.contains("varchar") {
        return TypeMapping::lossless(format!("VARCHAR{}", width_suffix(&lower)));
    }
    if base.contains("char") {
        return TypeMapping::lossless(format!("CHAR{}", width_suffix(&lower)));
    }
    if base.contains("text") {
        return TypeMapping::lossless("TEXT");
    }
    if base.contains("datetime") || base.contains("timestamp") {
        return TypeMapping::lossless("TIMESTAMP");
    }
    if base.contains("date") {
        return TypeMapping::lossless("DATE");
    }
    if base.contains("decimal") {
        return TypeMapping::lossless(decimal_passthrough(&lower));
    }
    if base.contains("float") {
        return TypeMapping::lossless("REAL");
    }
    if base.contains("double") {
        return TypeMapping::lossless("DOUBLE PRECISION");
    }
    if base.contains("blob") || base.contains("binary") {
        return TypeMapping::lossless("BYTEA");
    }

    TypeMapping::lossy(
        "TEXT",
        format!("no PostgreSQL mapping for '{}', stored as TEXT", source_type),
    )
}

/// Type name without width arguments or trailing attributes.
fn base_type(lower: &str) -> &str {
    let end = lower
        .find(|c: char| c == '(' || c.is_whitespace())
        .unwrap_or(lower.len());
    &lower[..end]
}

fn is_integer(base: &str) -> bool {
    matches!(
        base,
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint"
    )
}

/// The parenthesised argument list, e.g. `(255)`, or empty.
fn width_suffix(lower: &str) -> &str {
    match (lower.find('('), lower.find(')')) {
        (Some(open), Some(close)) if close > open => &lower[open..=close],
        _ => "",
    }
}

/// `decimal(10,2) unsigned zerofill` -> `DECIMAL(10,2)`.
fn decimal_passthrough(lower: &str) -> String {
    lower
        .split_whitespace()
        .filter(|part| *part != "unsigned" && *part != "zerofill")
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}
