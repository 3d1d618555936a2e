//! Core abstractions shared by the migration engine and the drivers.
//!
//! - [`schema`]: catalog records and table/column/index descriptors
//! - [`value`]: decoded row values and NUL sanitization
//! - [`traits`]: the source and target handle traits
//! - [`identifier`]: identifier validation and quoting
//!
//! The engine modules (`inspect`, `ddl`, `plan`, `transfer`) only depend on
//! these types; concrete database access lives under `drivers`.

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{
    CatalogColumn, CatalogIndexEntry, ColumnDescriptor, IndexDescriptor, TableDescriptor,
};
pub use traits::{ChunkRequest, Page, SourceReader, TargetWriter, TypeMapping};
pub use value::{Row, SqlValue};
