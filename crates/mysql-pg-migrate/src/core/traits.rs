//! Handle traits at the seam between the migration core and the drivers.
//!
//! - [`SourceReader`]: catalog introspection and chunked reads on the source
//! - [`TargetWriter`]: catalog listing, DDL, transactions and chunk writes on
//!   the target
//!
//! Both handles wrap a single long-lived connection and are driven strictly
//! in sequence, so every method takes `&mut self`.

use async_trait::async_trait;

use crate::error::Result;

use super::schema::{CatalogColumn, CatalogIndexEntry, ColumnDescriptor};
use super::value::{Row, SqlValue};

/// How the next chunk is located.
#[derive(Debug, Clone, PartialEq)]
pub enum Page {
    /// `WHERE key > after ORDER BY key LIMIT n`. `after` is `None` for the
    /// first chunk.
    Keyset {
        key_column: String,
        after: Option<SqlValue>,
    },
    /// `ORDER BY order_by LIMIT n OFFSET offset`. An empty `order_by` reads
    /// in whatever order the source returns.
    Offset { order_by: Vec<String>, offset: u64 },
}

/// A request for one chunk of rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRequest {
    pub table: String,
    /// Columns to project, in row tuple order.
    pub columns: Vec<ColumnDescriptor>,
    pub limit: usize,
    pub page: Page,
}

/// Read schema and data from the source database.
#[async_trait]
pub trait SourceReader: Send {
    /// Base table names in discovery order.
    async fn list_tables(&mut self) -> Result<Vec<String>>;

    /// Column catalog rows for a table, ordered by ordinal position.
    ///
    /// An empty result means the table does not exist.
    async fn column_catalog(&mut self, table: &str) -> Result<Vec<CatalogColumn>>;

    /// Index catalog rows for a table, primary key included.
    async fn index_catalog(&mut self, table: &str) -> Result<Vec<CatalogIndexEntry>>;

    /// Exact row count.
    async fn row_count(&mut self, table: &str) -> Result<u64>;

    /// Fetch one chunk. Returns an empty vector when the table is exhausted.
    async fn read_chunk(&mut self, request: &ChunkRequest) -> Result<Vec<Row>>;

    /// Round-trip a trivial query.
    async fn ping(&mut self) -> Result<()>;

    /// Database type identifier (e.g. "mysql").
    fn db_type(&self) -> &str;

    /// Close the connection. Further calls fail.
    async fn close(&mut self) -> Result<()>;
}

/// Write schema and data to the target database.
#[async_trait]
pub trait TargetWriter: Send {
    /// Schema tables are created in.
    fn schema(&self) -> &str;

    /// Base table names in the target schema.
    async fn list_tables(&mut self) -> Result<Vec<String>>;

    /// Open a transaction.
    async fn begin(&mut self) -> Result<()>;

    /// Execute a statement that returns no rows.
    async fn execute(&mut self, sql: &str) -> Result<()>;

    /// Write a sanitized chunk as a single batched statement.
    ///
    /// Returns the number of rows written.
    async fn write_chunk(&mut self, table: &str, columns: &[String], rows: &[Row])
        -> Result<u64>;

    /// Commit the open transaction.
    async fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction. A no-op without one.
    async fn rollback(&mut self) -> Result<()>;

    /// Exact row count of a target table, `None` when the table does not exist.
    async fn row_count(&mut self, table: &str) -> Result<Option<u64>>;

    /// Round-trip a trivial query.
    async fn ping(&mut self) -> Result<()>;

    /// Database type identifier (e.g. "postgres").
    fn db_type(&self) -> &str;

    /// Close the connection. Further calls fail.
    async fn close(&mut self) -> Result<()>;
}

/// Result of mapping a type from source to target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMapping {
    /// Target type string (e.g. "VARCHAR(255)", "INTEGER").
    pub target_type: String,
    /// Whether the target type was a fallback rather than a real match.
    pub is_lossy: bool,
    /// Warning message for lossy mappings.
    pub warning: Option<String>,
}

impl TypeMapping {
    /// Create a lossless type mapping.
    pub fn lossless(target_type: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            is_lossy: false,
            warning: None,
        }
    }

    /// Create a lossy type mapping with a warning.
    pub fn lossy(target_type: impl Into<String>, warning: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            is_lossy: true,
            warning: Some(warning.into()),
        }
    }
}
