//! Schema inspection: table listing and per-table descriptors.
//!
//! The drivers only return raw catalog rows. Turning them into a
//! [`TableDescriptor`] (grouping index rows, ordering key columns, spotting
//! composite keys) is done here so the same rules apply to every source.

use std::collections::BTreeMap;

use tracing::debug;

use crate::core::{
    CatalogColumn, CatalogIndexEntry, ColumnDescriptor, IndexDescriptor, SourceReader,
    TableDescriptor, TargetWriter,
};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{MigrateError, Result};

/// Index name MySQL reserves for the primary key.
pub const PRIMARY_INDEX: &str = "PRIMARY";

/// A described table and the warnings produced while describing it.
#[derive(Debug, Clone)]
pub struct Inspection {
    pub table: TableDescriptor,
    pub diagnostics: Diagnostics,
}

/// Source table names in discovery order.
pub async fn list_source_tables<S: SourceReader + ?Sized>(source: &mut S) -> Result<Vec<String>> {
    source
        .list_tables()
        .await
        .map_err(|e| MigrateError::schema("*", format!("listing source tables: {}", e)))
}

/// Target table names in the target schema.
pub async fn list_target_tables<T: TargetWriter + ?Sized>(target: &mut T) -> Result<Vec<String>> {
    let schema = target.schema().to_string();
    target.list_tables().await.map_err(|e| {
        MigrateError::schema("*", format!("listing tables in target schema {}: {}", schema, e))
    })
}

/// Describe one source table.
///
/// Fails with a schema error if a catalog query fails or the table no longer
/// exists.
pub async fn describe_table<S: SourceReader + ?Sized>(
    source: &mut S,
    name: &str,
) -> Result<Inspection> {
    let columns = source
        .column_catalog(name)
        .await
        .map_err(|e| MigrateError::schema(name, format!("reading column catalog: {}", e)))?;
    let indexes = source
        .index_catalog(name)
        .await
        .map_err(|e| MigrateError::schema(name, format!("reading index catalog: {}", e)))?;

    debug!(
        "Catalog for {}: {} column rows, {} index rows",
        name,
        columns.len(),
        indexes.len()
    );

    build_descriptor(name, columns, indexes)
}

/// Assemble a descriptor from raw catalog rows.
pub fn build_descriptor(
    name: &str,
    mut columns: Vec<CatalogColumn>,
    index_rows: Vec<CatalogIndexEntry>,
) -> Result<Inspection> {
    if columns.is_empty() {
        return Err(MigrateError::schema(
            name,
            "table not found in source catalog",
        ));
    }

    let mut diagnostics = Diagnostics::new();
    columns.sort_by_key(|c| c.ordinal_position);

    let mut grouped: BTreeMap<String, Vec<CatalogIndexEntry>> = BTreeMap::new();
    for row in index_rows {
        grouped.entry(row.index_name.clone()).or_default().push(row);
    }
    for rows in grouped.values_mut() {
        rows.sort_by_key(|r| r.seq_in_index);
    }

    let primary_key_columns = primary_key_columns(&columns, grouped.remove(PRIMARY_INDEX));

    let mut indexes = Vec::with_capacity(grouped.len());
    for (index_name, rows) in grouped {
        match index_from_rows(&index_name, &rows) {
            Ok(index) => indexes.push(index),
            Err(reason) => diagnostics.push(Diagnostic::UnsupportedIndex {
                table: name.to_string(),
                index: index_name,
                reason,
            }),
        }
    }

    let primary_key_column = match primary_key_columns.len() {
        1 => Some(primary_key_columns[0].clone()),
        0 => None,
        _ => {
            diagnostics.push(Diagnostic::CompositePrimaryKey {
                table: name.to_string(),
                columns: primary_key_columns.clone(),
            });
            None
        }
    };

    let columns = columns
        .into_iter()
        .map(|c| ColumnDescriptor {
            name: c.name,
            source_type: c.column_type,
            nullable: c.is_nullable,
            ordinal_position: c.ordinal_position,
        })
        .collect();

    Ok(Inspection {
        table: TableDescriptor {
            name: name.to_string(),
            columns,
            indexes,
            primary_key_column,
            primary_key_columns,
        },
        diagnostics,
    })
}

/// Key columns in key order. The PRIMARY index rows give the order; the
/// column flags are used when the index rows are missing.
fn primary_key_columns(
    columns: &[CatalogColumn],
    primary_rows: Option<Vec<CatalogIndexEntry>>,
) -> Vec<String> {
    let from_index: Vec<String> = primary_rows
        .unwrap_or_default()
        .into_iter()
        .filter_map(|r| r.column_name)
        .collect();
    if !from_index.is_empty() {
        return from_index;
    }

    columns
        .iter()
        .filter(|c| c.is_primary)
        .map(|c| c.name.clone())
        .collect()
}

fn index_from_rows(
    name: &str,
    rows: &[CatalogIndexEntry],
) -> std::result::Result<IndexDescriptor, String> {
    let index_type = rows
        .first()
        .map(|r| r.index_type.to_uppercase())
        .unwrap_or_default();
    if index_type == "FULLTEXT" || index_type == "SPATIAL" {
        return Err(format!("{} index", index_type.to_lowercase()));
    }

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        match &row.column_name {
            Some(column) => columns.push(column.clone()),
            None => return Err("functional key part".to_string()),
        }
    }

    Ok(IndexDescriptor {
        name: name.to_string(),
        columns,
        unique: rows.first().map(|r| !r.non_unique).unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{catalog_column, index_row, MemorySource, MemoryTable};

    #[test]
    fn test_single_pk_and_grouped_indexes() {
        let columns = vec![
            catalog_column("email", "varchar(255)", false, 2, false),
            catalog_column("id", "int", false, 1, true),
            catalog_column("name", "varchar(50)", true, 3, false),
        ];
        let rows = vec![
            index_row("PRIMARY", false, Some("id"), 1, "BTREE"),
            index_row("ix_name_email", true, Some("email"), 2, "BTREE"),
            index_row("uq_email", false, Some("email"), 1, "BTREE"),
            index_row("ix_name_email", true, Some("name"), 1, "BTREE"),
        ];

        let inspection = build_descriptor("users", columns, rows).unwrap();
        let t = inspection.table;

        assert_eq!(t.column_names(), vec!["id", "email", "name"]);
        assert_eq!(t.primary_key_column.as_deref(), Some("id"));
        assert_eq!(t.primary_key_columns, vec!["id"]);
        assert_eq!(t.indexes.len(), 2);
        assert_eq!(t.indexes[0].name, "ix_name_email");
        assert_eq!(t.indexes[0].columns, vec!["name", "email"]);
        assert!(!t.indexes[0].unique);
        assert_eq!(t.indexes[1].name, "uq_email");
        assert!(t.indexes[1].unique);
        assert!(t.indexes.iter().all(|i| i.name != PRIMARY_INDEX));
        assert!(inspection.diagnostics.is_empty());
    }

    #[test]
    fn test_composite_pk_has_no_single_key() {
        let columns = vec![
            catalog_column("a", "int", false, 1, true),
            catalog_column("b", "int", false, 2, true),
            catalog_column("v", "text", true, 3, false),
        ];
        let rows = vec![
            index_row("PRIMARY", false, Some("b"), 2, "BTREE"),
            index_row("PRIMARY", false, Some("a"), 1, "BTREE"),
        ];

        let inspection = build_descriptor("pairs", columns, rows).unwrap();
        assert!(inspection.table.primary_key_column.is_none());
        assert_eq!(inspection.table.primary_key_columns, vec!["a", "b"]);
        assert!(matches!(
            inspection.diagnostics.iter().next(),
            Some(Diagnostic::CompositePrimaryKey { columns, .. }) if columns == &["a", "b"]
        ));
    }

    #[test]
    fn test_pk_columns_follow_key_order_not_column_order() {
        let columns = vec![
            catalog_column("tenant", "int", false, 1, true),
            catalog_column("day", "date", false, 2, true),
        ];
        // PRIMARY KEY (day, tenant)
        let rows = vec![
            index_row("PRIMARY", false, Some("tenant"), 2, "BTREE"),
            index_row("PRIMARY", false, Some("day"), 1, "BTREE"),
        ];

        let inspection = build_descriptor("visits", columns.clone(), rows).unwrap();
        assert_eq!(inspection.table.primary_key_columns, vec!["day", "tenant"]);
        assert_eq!(inspection.table.offset_order_columns(), vec!["day", "tenant"]);

        // Without PRIMARY index rows the column flags give ordinal order
        let inspection = build_descriptor("visits", columns, vec![]).unwrap();
        assert_eq!(inspection.table.primary_key_columns, vec!["tenant", "day"]);
    }

    #[test]
    fn test_no_pk() {
        let columns = vec![catalog_column("msg", "text", true, 1, false)];
        let inspection = build_descriptor("log", columns, vec![]).unwrap();
        assert!(inspection.table.primary_key_column.is_none());
        assert!(inspection.table.primary_key_columns.is_empty());
        assert!(inspection.diagnostics.is_empty());
    }

    #[test]
    fn test_unsupported_indexes_are_skipped() {
        let columns = vec![
            catalog_column("id", "int", false, 1, true),
            catalog_column("body", "text", true, 2, false),
        ];
        let rows = vec![
            index_row("PRIMARY", false, Some("id"), 1, "BTREE"),
            index_row("ft_body", true, Some("body"), 1, "FULLTEXT"),
            index_row("ix_expr", true, None, 1, "BTREE"),
        ];

        let inspection = build_descriptor("posts", columns, rows).unwrap();
        assert!(inspection.table.indexes.is_empty());
        assert_eq!(inspection.diagnostics.len(), 2);
        assert!(inspection
            .diagnostics
            .iter()
            .all(|d| matches!(d, Diagnostic::UnsupportedIndex { .. })));
    }

    #[test]
    fn test_vanished_table_is_schema_error() {
        let err = build_descriptor("ghost", vec![], vec![]).unwrap_err();
        assert!(matches!(err, MigrateError::Schema { ref table, .. } if table == "ghost"));
    }

    #[tokio::test]
    async fn test_describe_table_through_reader() {
        let mut source = MemorySource::new().with_table(
            MemoryTable::new("users")
                .column("id", "int", false)
                .column("name", "varchar(50)", true)
                .primary_key(&["id"]),
        );

        let inspection = describe_table(&mut source, "users").await.unwrap();
        assert_eq!(inspection.table.primary_key_column.as_deref(), Some("id"));

        let err = describe_table(&mut source, "missing").await.unwrap_err();
        assert!(matches!(err, MigrateError::Schema { .. }));
    }

    #[tokio::test]
    async fn test_catalog_failure_is_schema_error() {
        let mut source = MemorySource::new()
            .with_table(MemoryTable::new("users").column("id", "int", false))
            .fail_catalog_for("users");

        let err = describe_table(&mut source, "users").await.unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_SCHEMA_ERROR);
    }
}
