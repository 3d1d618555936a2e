//! Table, column and index metadata.
//!
//! Two layers live here. The catalog records ([`CatalogColumn`],
//! [`CatalogIndexEntry`]) are the raw, named-field rows a source driver reads
//! out of its information schema. The descriptors ([`TableDescriptor`] and
//! friends) are what the inspector assembles from them and what the DDL
//! synthesizer and transfer engine consume.

use serde::{Deserialize, Serialize};

/// One row of column metadata as reported by the source catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogColumn {
    pub name: String,
    /// Full type text, e.g. `varchar(255)` or `int unsigned`.
    pub column_type: String,
    pub is_nullable: bool,
    pub ordinal_position: u32,
    pub is_primary: bool,
}

/// One row of index metadata: a single column of a single index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogIndexEntry {
    pub index_name: String,
    pub non_unique: bool,
    /// `None` for functional key parts.
    pub column_name: Option<String>,
    /// 1-based position of the column within the index key.
    pub seq_in_index: u32,
    /// `BTREE`, `HASH`, `FULLTEXT`, `SPATIAL`.
    pub index_type: String,
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name, unique within the table.
    pub name: String,

    /// Raw source type string.
    pub source_type: String,

    /// Whether the column accepts NULL.
    pub nullable: bool,

    /// Position in the row tuple (1-based).
    pub ordinal_position: u32,
}

/// Secondary index metadata. The primary key is never represented here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,

    /// Key columns in index order.
    pub columns: Vec<String>,

    pub unique: bool,
}

/// Everything the engine needs to know about one source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Table name.
    pub name: String,

    /// Columns in source ordinal order.
    pub columns: Vec<ColumnDescriptor>,

    /// Secondary indexes, ordered by name.
    pub indexes: Vec<IndexDescriptor>,

    /// The key column when the primary key has exactly one column.
    pub primary_key_column: Option<String>,

    /// Every primary key column, in PRIMARY index key order (falling back to
    /// ordinal order when the catalog has no PRIMARY index rows). Empty
    /// without a key.
    pub primary_key_columns: Vec<String>,
}

impl TableDescriptor {
    /// Column names in row tuple order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Position of a column in the row tuple.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// True when the primary key spans more than one column.
    pub fn has_composite_pk(&self) -> bool {
        self.primary_key_columns.len() > 1
    }

    /// Columns that give offset pagination a deterministic order.
    ///
    /// Prefers a composite primary key, then the first unique index whose
    /// columns are all NOT NULL. Returns an empty list when neither exists.
    pub fn offset_order_columns(&self) -> Vec<String> {
        if !self.primary_key_columns.is_empty() {
            return self.primary_key_columns.clone();
        }

        self.indexes
            .iter()
            .filter(|idx| idx.unique && !idx.columns.is_empty())
            .find(|idx| {
                idx.columns
                    .iter()
                    .all(|c| self.column(c).map(|col| !col.nullable).unwrap_or(false))
            })
            .map(|idx| idx.columns.clone())
            .unwrap_or_default()
    }
}
