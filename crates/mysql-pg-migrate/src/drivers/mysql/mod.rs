//! MySQL/MariaDB source driver.
//!
//! - `dialect`: catalog queries, chunk queries and column projections
//! - [`MysqlReader`]: the [`SourceReader`](crate::core::SourceReader) over a
//!   single connection
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+

mod dialect;
mod reader;

pub use reader::MysqlReader;
