//! Database driver implementations.
//!
//! - [`mysql`]: the MySQL/MariaDB [`SourceReader`](crate::core::SourceReader)
//! - [`postgres`]: the PostgreSQL [`TargetWriter`](crate::core::TargetWriter)
//! - [`common`]: shared utilities (TLS)
//!
//! The migration core never names a driver type: it is generic over the two
//! handle traits, and only [`Orchestrator::connect`](crate::Orchestrator::connect)
//! picks these concrete implementations.

pub mod common;
pub mod mysql;
pub mod postgres;

pub use common::TlsBuilder;
pub use mysql::MysqlReader;
pub use postgres::PostgresWriter;
