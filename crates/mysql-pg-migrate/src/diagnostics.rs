//! Non-fatal findings collected while a table is described and migrated.
//!
//! Warnings never stop a run. They are returned next to results so callers
//! can report them, and each one is logged once when it is recorded.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// A typed warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A source type had no mapping and was created as TEXT.
    UnmappedType {
        table: String,
        column: String,
        source_type: String,
    },
    /// The primary key spans more than one column.
    CompositePrimaryKey { table: String, columns: Vec<String> },
    /// No PRIMARY KEY constraint was emitted for the created table.
    PrimaryKeyOmitted { table: String, columns: Vec<String> },
    /// The table is read with LIMIT/OFFSET instead of keyset pagination.
    OffsetPagination { table: String },
    /// Offset pagination without any deterministic row order.
    UnorderedOffsetScan { table: String },
    /// A source index that has no plain PostgreSQL equivalent was skipped.
    UnsupportedIndex {
        table: String,
        index: String,
        reason: String,
    },
    /// The target index name was cut to fit PostgreSQL's identifier limit.
    IndexNameShortened {
        table: String,
        index: String,
        target_name: String,
    },
}

impl Diagnostic {
    /// Table the warning belongs to.
    pub fn table(&self) -> &str {
        match self {
            Diagnostic::UnmappedType { table, .. }
            | Diagnostic::CompositePrimaryKey { table, .. }
            | Diagnostic::PrimaryKeyOmitted { table, .. }
            | Diagnostic::OffsetPagination { table }
            | Diagnostic::UnorderedOffsetScan { table }
            | Diagnostic::UnsupportedIndex { table, .. }
            | Diagnostic::IndexNameShortened { table, .. } => table,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnmappedType {
                table,
                column,
                source_type,
            } => write!(
                f,
                "{}.{}: no mapping for source type '{}', using TEXT",
                table, column, source_type
            ),
            Diagnostic::CompositePrimaryKey { table, columns } => write!(
                f,
                "{}: composite primary key ({}), keyset pagination unavailable",
                table,
                columns.join(", ")
            ),
            Diagnostic::PrimaryKeyOmitted { table, columns } => write!(
                f,
                "{}: PRIMARY KEY ({}) not created on target",
                table,
                columns.join(", ")
            ),
            Diagnostic::OffsetPagination { table } => {
                write!(f, "{}: falling back to LIMIT/OFFSET pagination", table)
            }
            Diagnostic::UnorderedOffsetScan { table } => write!(
                f,
                "{}: no primary key or NOT NULL unique index, offset chunks are unordered",
                table
            ),
            Diagnostic::UnsupportedIndex {
                table,
                index,
                reason,
            } => write!(f, "{}: index {} skipped ({})", table, index, reason),
            Diagnostic::IndexNameShortened {
                table,
                index,
                target_name,
            } => write!(
                f,
                "{}: index {} created as {} to fit the 63 byte identifier limit",
                table, index, target_name
            ),
        }
    }
}

/// Ordered collection of diagnostics for one table or one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record and log a warning.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        warn!(table = diagnostic.table(), "{}", diagnostic);
        self.0.push(diagnostic);
    }

    /// Append diagnostics that were already logged.
    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.0
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
