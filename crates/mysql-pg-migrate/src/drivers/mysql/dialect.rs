//! MySQL/MariaDB SQL: catalog queries, chunk queries and column projections.
//!
//! Everything here is pure string building so it can be tested without a
//! server. The reader binds the keyset cursor as a statement parameter; only
//! identifiers (quoted) and integer limits are formatted into the SQL.

use crate::core::identifier::quote_mysql;
use crate::core::{ChunkRequest, ColumnDescriptor, Page, SqlValue};
use crate::error::Result;

/// Base tables of the connected database, by name.
pub const LIST_TABLES: &str = r#"
    SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
    FROM INFORMATION_SCHEMA.TABLES
    WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
    ORDER BY TABLE_NAME
"#;

/// Column metadata for one table. Binds: table name.
pub const COLUMN_CATALOG: &str = r#"
    SELECT
        CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
        CAST(COLUMN_TYPE AS CHAR) AS COLUMN_TYPE,
        CAST(IF(IS_NULLABLE = 'YES', 1, 0) AS SIGNED) AS is_nullable,
        CAST(ORDINAL_POSITION AS SIGNED) AS ORDINAL_POSITION,
        CAST(IF(COLUMN_KEY = 'PRI', 1, 0) AS SIGNED) AS is_primary
    FROM INFORMATION_SCHEMA.COLUMNS
    WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
"#;

/// Index metadata for one table, one row per key part. Binds: table name.
pub const INDEX_CATALOG: &str = r#"
    SELECT
        CAST(INDEX_NAME AS CHAR(255)) AS INDEX_NAME,
        CAST(NON_UNIQUE AS SIGNED) AS NON_UNIQUE,
        CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
        CAST(SEQ_IN_INDEX AS SIGNED) AS SEQ_IN_INDEX,
        CAST(INDEX_TYPE AS CHAR(32)) AS INDEX_TYPE
    FROM INFORMATION_SCHEMA.STATISTICS
    WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
    ORDER BY INDEX_NAME, SEQ_IN_INDEX
"#;

/// How a projected column is decoded from the result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    TinyInt,
    TinyIntUnsigned,
    SmallInt,
    SmallIntUnsigned,
    Int,
    IntUnsigned,
    BigInt,
    BigIntUnsigned,
    Float,
    Double,
    Decimal,
    Text,
    Bytes,
    Date,
    DateTime,
}

/// Lower-cased type name without arguments or attributes.
fn base_type(column_type: &str) -> String {
    let lower = column_type.trim().to_lowercase();
    let end = lower
        .find(|c: char| c == '(' || c.is_whitespace())
        .unwrap_or(lower.len());
    lower[..end].to_string()
}

fn is_unsigned(column_type: &str) -> bool {
    column_type.to_lowercase().contains("unsigned")
}

fn is_spatial(base: &str) -> bool {
    matches!(
        base,
        "geometry"
            | "point"
            | "linestring"
            | "polygon"
            | "multipoint"
            | "multilinestring"
            | "multipolygon"
            | "geometrycollection"
            | "geomcollection"
    )
}

/// Decoder for a column's projected value.
pub fn value_kind(column_type: &str) -> ValueKind {
    let base = base_type(column_type);
    let unsigned = is_unsigned(column_type);

    match base.as_str() {
        "tinyint" if unsigned => ValueKind::TinyIntUnsigned,
        "tinyint" => ValueKind::TinyInt,
        "smallint" if unsigned => ValueKind::SmallIntUnsigned,
        "smallint" => ValueKind::SmallInt,
        "mediumint" | "int" | "integer" if unsigned => ValueKind::IntUnsigned,
        "mediumint" | "int" | "integer" => ValueKind::Int,
        "bigint" if unsigned => ValueKind::BigIntUnsigned,
        "bigint" => ValueKind::BigInt,
        // Projected as CAST(... AS UNSIGNED).
        "bit" => ValueKind::BigIntUnsigned,
        "float" => ValueKind::Float,
        "double" | "real" => ValueKind::Double,
        "decimal" | "numeric" => ValueKind::Decimal,
        "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" => {
            ValueKind::Bytes
        }
        "date" => ValueKind::Date,
        "datetime" | "timestamp" => ValueKind::DateTime,
        _ => ValueKind::Text,
    }
}

/// Select-list expression for a column, aliased back to its own name.
pub fn projection(column: &ColumnDescriptor) -> Result<String> {
    let quoted = quote_mysql(&column.name)?;
    let base = base_type(&column.source_type);

    let expr = match base.as_str() {
        "json" | "enum" | "set" | "year" | "time" => {
            format!("CAST({} AS CHAR) AS {}", quoted, quoted)
        }
        "bit" => format!("CAST({} AS UNSIGNED) AS {}", quoted, quoted),
        b if is_spatial(b) => format!("ST_AsText({}) AS {}", quoted, quoted),
        _ => quoted,
    };
    Ok(expr)
}

/// SQL for one chunk, plus the keyset cursor to bind (if any).
pub fn chunk_query(request: &ChunkRequest) -> Result<(String, Option<SqlValue>)> {
    let table = quote_mysql(&request.table)?;
    let select_list = request
        .columns
        .iter()
        .map(projection)
        .collect::<Result<Vec<_>>>()?
        .join(", ");

    let mut sql = format!("SELECT {} FROM {}", select_list, table);

    // ORDER BY is table-qualified so it sorts on the stored column, not on a
    // CAST alias of the same name.
    let bind = match &request.page {
        Page::Keyset { key_column, after } => {
            let key = quote_mysql(key_column)?;
            if after.is_some() {
                sql.push_str(&format!(" WHERE {}.{} > ?", table, key));
            }
            sql.push_str(&format!(" ORDER BY {}.{}", table, key));
            sql.push_str(&format!(" LIMIT {}", request.limit));
            after.clone()
        }
        Page::Offset { order_by, offset } => {
            if !order_by.is_empty() {
                let cols = order_by
                    .iter()
                    .map(|c| Ok(format!("{}.{}", table, quote_mysql(c)?)))
                    .collect::<Result<Vec<_>>>()?;
                sql.push_str(&format!(" ORDER BY {}", cols.join(", ")));
            }
            sql.push_str(&format!(" LIMIT {} OFFSET {}", request.limit, offset));
            None
        }
    };

    Ok((sql, bind))
}

/// `SELECT COUNT(*)` for a table.
pub fn count_query(table: &str) -> Result<String> {
    Ok(format!("SELECT COUNT(*) FROM {}", quote_mysql(table)?))
}
