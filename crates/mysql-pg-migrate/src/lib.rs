//! # mysql-pg-migrate
//!
//! One-shot MySQL/MariaDB to PostgreSQL migration library.
//!
//! Tables are copied one at a time over a single connection per database:
//!
//! - **Type mapping** from MySQL column types to PostgreSQL types
//! - **Schema inspection** of columns, primary keys and secondary indexes
//! - **DDL synthesis** of `CREATE TABLE` and `CREATE INDEX` statements
//! - **Planning** of a per-table action (create, recreate, truncate, load)
//! - **Chunked transfer** with keyset pagination on single-column keys and
//!   ordered offset pagination otherwise, loaded with PostgreSQL COPY
//! - **One transaction per table**: a failure rolls back only that table
//!
//! ## Example
//!
//! ```rust,no_run
//! use mysql_pg_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> mysql_pg_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let mut orchestrator = Orchestrator::connect(&config).await?;
//!     let plan = orchestrator.plan().await?;
//!     let result = orchestrator.run(&plan).await.into_result()?;
//!     println!("Migrated {} rows", result.rows_transferred);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod ddl;
pub mod diagnostics;
pub mod drivers;
pub mod error;
pub mod inspect;
pub mod orchestrator;
pub mod plan;
pub mod transfer;
pub mod typemap;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, SourceConfig, TargetConfig};
pub use crate::core::{SourceReader, SqlValue, TableDescriptor, TargetWriter};
pub use diagnostics::{Diagnostic, Diagnostics};
pub use drivers::{MysqlReader, PostgresWriter};
pub use error::{MigrateError, Result};
pub use orchestrator::{
    HealthCheckResult, MigrationOutcome, MigrationResult, Orchestrator, RowCountCheck,
};
pub use plan::{MigrationOptions, MigrationPlan, PlannedTable, TableAction};
pub use transfer::{ProgressUpdate, TableReport, TableStatus, TransferEngine};
