//! PostgreSQL DDL generation from source table descriptors.

use sha2::{Digest, Sha256};

use crate::core::identifier::{qualify_pg, quote_pg, quote_pg_list};
use crate::core::TableDescriptor;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::Result;
use crate::typemap::map_type;

/// PostgreSQL truncates identifiers beyond this many bytes.
pub const MAX_IDENTIFIER_BYTES: usize = 63;

/// Hex digits of the `(table, index)` digest appended to index names.
const INDEX_NAME_HASH_HEX: usize = 8;

/// `CREATE TABLE` for a descriptor, plus the warnings raised while mapping it.
#[derive(Debug, Clone)]
pub struct CreateTable {
    pub sql: String,
    pub diagnostics: Diagnostics,
}

/// Build the `CREATE TABLE` statement.
///
/// Columns keep source order. The single primary key column gets an inline
/// `PRIMARY KEY`; a composite key gets no constraint and a warning.
pub fn synthesize_create_table(schema: &str, table: &TableDescriptor) -> Result<CreateTable> {
    let mut diagnostics = Diagnostics::new();
    let mut column_defs = Vec::with_capacity(table.columns.len());

    for col in &table.columns {
        let mapping = map_type(&col.source_type);
        if mapping.is_lossy {
            diagnostics.push(Diagnostic::UnmappedType {
                table: table.name.clone(),
                column: col.name.clone(),
                source_type: col.source_type.clone(),
            });
        }

        let mut def = format!(
            "{} {} {}",
            quote_pg(&col.name)?,
            mapping.target_type,
            if col.nullable { "NULL" } else { "NOT NULL" }
        );
        if table.primary_key_column.as_deref() == Some(col.name.as_str()) {
            def.push_str(" PRIMARY KEY");
        }
        column_defs.push(def);
    }

    if table.has_composite_pk() {
        diagnostics.push(Diagnostic::PrimaryKeyOmitted {
            table: table.name.clone(),
            columns: table.primary_key_columns.clone(),
        });
    }

    let sql = format!(
        "CREATE TABLE {} (\n    {}\n)",
        qualify_pg(schema, &table.name)?,
        column_defs.join(",\n    ")
    );

    Ok(CreateTable { sql, diagnostics })
}

/// `CREATE INDEX` statements for a descriptor, plus naming warnings.
#[derive(Debug, Clone)]
pub struct CreateIndexes {
    pub statements: Vec<String>,
    pub diagnostics: Diagnostics,
}

/// One `CREATE [UNIQUE] INDEX IF NOT EXISTS` per secondary index.
///
/// Running the result twice against the same table is not an error.
pub fn synthesize_indexes(schema: &str, table: &TableDescriptor) -> Result<CreateIndexes> {
    let qualified = qualify_pg(schema, &table.name)?;
    let mut diagnostics = Diagnostics::new();
    let mut statements = Vec::with_capacity(table.indexes.len());

    for idx in &table.indexes {
        let name = target_index_name(&table.name, &idx.name);
        if name.shortened {
            diagnostics.push(Diagnostic::IndexNameShortened {
                table: table.name.clone(),
                index: idx.name.clone(),
                target_name: name.name.clone(),
            });
        }
        statements.push(format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
            if idx.unique { "UNIQUE " } else { "" },
            quote_pg(&name.name)?,
            qualified,
            quote_pg_list(&idx.columns)?
        ));
    }

    Ok(CreateIndexes {
        statements,
        diagnostics,
    })
}

/// A generated PostgreSQL index name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetIndexName {
    pub name: String,
    /// The readable `<table>_<index>` part was cut to fit the length limit.
    pub shortened: bool,
}

/// Index name for the target schema.
///
/// PostgreSQL index names are unique per schema, MySQL's only per table, so
/// the name is `<table>_<index>_<digest>` where the digest covers the exact
/// `(table, index)` pair. The readable part is cut on a character boundary
/// so the whole name never exceeds [`MAX_IDENTIFIER_BYTES`] and the server
/// never truncates it.
pub fn target_index_name(table: &str, index: &str) -> TargetIndexName {
    let mut hasher = Sha256::new();
    hasher.update(table.as_bytes());
    hasher.update([0u8]);
    hasher.update(index.as_bytes());
    let digest = hex::encode(&hasher.finalize()[..INDEX_NAME_HASH_HEX / 2]);

    let readable = format!("{}_{}", table, index);
    let budget = MAX_IDENTIFIER_BYTES - INDEX_NAME_HASH_HEX - 1;
    let prefix = truncate_on_char_boundary(&readable, budget);

    TargetIndexName {
        name: format!("{}_{}", prefix, digest),
        shortened: prefix.len() < readable.len(),
    }
}

fn truncate_on_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// `DROP TABLE IF EXISTS ... CASCADE`.
pub fn drop_table(schema: &str, table: &str) -> Result<String> {
    Ok(format!("DROP TABLE IF EXISTS {} CASCADE", qualify_pg(schema, table)?))
}

/// `TRUNCATE TABLE ... RESTART IDENTITY CASCADE`.
pub fn truncate_table(schema: &str, table: &str) -> Result<String> {
    Ok(format!(
        "TRUNCATE TABLE {} RESTART IDENTITY CASCADE",
        qualify_pg(schema, table)?
    ))
}
