//! Identifier validation and quoting.
//!
//! Table, column and index names cannot be bound as statement parameters, so
//! every name that ends up in generated SQL passes through this module. Names
//! are validated first (no empty names, no NUL bytes, bounded length) and then
//! quoted in the dialect of the database that will parse them.

use crate::error::{MigrateError, Result};

/// Longest identifier accepted from either catalog.
///
/// MySQL allows 64 characters, PostgreSQL 63 bytes. The limit here is looser
/// so that multibyte MySQL names are not rejected before the target truncates
/// or rejects them itself.
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Reject identifiers that cannot be quoted safely.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "Identifier contains a null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier, doubling embedded double quotes.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a MySQL identifier, doubling embedded backticks.
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// `"schema"."table"` for PostgreSQL.
pub fn qualify_pg(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_pg(schema)?, quote_pg(table)?))
}

/// Quote a list of PostgreSQL column names as `"a", "b"`.
pub fn quote_pg_list<S: AsRef<str>>(names: &[S]) -> Result<String> {
    let quoted = names
        .iter()
        .map(|n| quote_pg(n.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    Ok(quoted.join(", "))
}
