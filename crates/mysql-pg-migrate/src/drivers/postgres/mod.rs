//! PostgreSQL target driver.

mod writer;

pub use writer::PostgresWriter;
