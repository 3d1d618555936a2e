//! MySQL/MariaDB source reader.
//!
//! Implements [`SourceReader`] over a single SQLx connection. The engine
//! drives one table at a time, so no pool is kept.

use async_trait::async_trait;
use sqlx::mysql::{
    MySql, MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlRow, MySqlSslMode,
};
use sqlx::query::Query;
use sqlx::{ConnectOptions, Connection, Row};
use tracing::{debug, info};

use crate::config::{SourceConfig, SourceSslMode};
use crate::core::schema::{CatalogColumn, CatalogIndexEntry};
use crate::core::traits::{ChunkRequest, SourceReader};
use crate::core::value::{Row as ValueRow, SqlValue};
use crate::error::{MigrateError, Result};

use super::dialect::{self, ValueKind};

/// MySQL/MariaDB source reader.
pub struct MysqlReader {
    conn: Option<MySqlConnection>,
    database: String,
}

impl MysqlReader {
    /// Open a connection from configuration and verify it.
    pub async fn connect(config: &SourceConfig) -> Result<Self> {
        let ssl_mode = match config.ssl_mode {
            SourceSslMode::Disabled => MySqlSslMode::Disabled,
            SourceSslMode::Preferred => MySqlSslMode::Preferred,
            SourceSslMode::Required => MySqlSslMode::Required,
        };

        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(ssl_mode)
            .disable_statement_logging();

        let mut conn = options
            .connect()
            .await
            .map_err(|e| MigrateError::connection("source", e))?;

        conn.ping()
            .await
            .map_err(|e| MigrateError::connection("source", e))?;

        info!(
            "Connected to MySQL source: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self {
            conn: Some(conn),
            database: config.database.clone(),
        })
    }

    fn conn(&mut self) -> Result<&mut MySqlConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| MigrateError::connection("source", "connection is closed"))
    }
}

/// Bind a keyset cursor value.
fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &SqlValue,
) -> Query<'q, MySql, MySqlArguments> {
    match value.clone() {
        SqlValue::Null => query.bind(None::<i64>),
        SqlValue::I16(v) => query.bind(v),
        SqlValue::I32(v) => query.bind(v),
        SqlValue::I64(v) => query.bind(v),
        SqlValue::F32(v) => query.bind(v),
        SqlValue::F64(v) => query.bind(v),
        SqlValue::Decimal(v) => query.bind(v),
        SqlValue::Text(v) => query.bind(v),
        SqlValue::Bytes(v) => query.bind(v),
        SqlValue::Date(v) => query.bind(v),
        SqlValue::DateTime(v) => query.bind(v),
    }
}

fn decode_error(column: &str, err: impl std::fmt::Display) -> MigrateError {
    MigrateError::Decode {
        column: column.to_string(),
        message: err.to_string(),
    }
}

/// Decode one field into an owned value. NULL decodes as `SqlValue::Null`.
fn decode_value(row: &MySqlRow, idx: usize, column: &str, kind: ValueKind) -> Result<SqlValue> {
    fn get<'r, T>(row: &'r MySqlRow, idx: usize, column: &str) -> Result<Option<T>>
    where
        T: sqlx::Decode<'r, MySql> + sqlx::Type<MySql>,
    {
        row.try_get::<Option<T>, _>(idx)
            .map_err(|e| decode_error(column, e))
    }

    let value = match kind {
        ValueKind::TinyInt => get::<i8>(row, idx, column)?.map(|v| SqlValue::I16(v.into())),
        ValueKind::TinyIntUnsigned => get::<u8>(row, idx, column)?.map(|v| SqlValue::I16(v.into())),
        ValueKind::SmallInt => get::<i16>(row, idx, column)?.map(SqlValue::I16),
        ValueKind::SmallIntUnsigned => {
            get::<u16>(row, idx, column)?.map(|v| SqlValue::I32(v.into()))
        }
        ValueKind::Int => get::<i32>(row, idx, column)?.map(SqlValue::I32),
        ValueKind::IntUnsigned => get::<u32>(row, idx, column)?.map(|v| SqlValue::I64(v.into())),
        ValueKind::BigInt => get::<i64>(row, idx, column)?.map(SqlValue::I64),
        ValueKind::BigIntUnsigned => get::<u64>(row, idx, column)?.map(unsigned_bigint),
        ValueKind::Float => get::<f32>(row, idx, column)?.map(SqlValue::F32),
        ValueKind::Double => get::<f64>(row, idx, column)?.map(SqlValue::F64),
        ValueKind::Decimal => get::<rust_decimal::Decimal>(row, idx, column)?.map(SqlValue::Decimal),
        ValueKind::Text => get::<String>(row, idx, column)?.map(SqlValue::Text),
        ValueKind::Bytes => get::<Vec<u8>>(row, idx, column)?.map(SqlValue::Bytes),
        ValueKind::Date => get::<chrono::NaiveDate>(row, idx, column)?.map(SqlValue::Date),
        ValueKind::DateTime => {
            get::<chrono::NaiveDateTime>(row, idx, column)?.map(SqlValue::DateTime)
        }
    };

    Ok(value.unwrap_or(SqlValue::Null))
}

/// Unsigned bigints that do not fit `i64` are carried as decimals.
fn unsigned_bigint(v: u64) -> SqlValue {
    match i64::try_from(v) {
        Ok(signed) => SqlValue::I64(signed),
        Err(_) => SqlValue::Decimal(rust_decimal::Decimal::from(v)),
    }
}

fn catalog_u32(table: &str, field: &str, v: i64) -> Result<u32> {
    u32::try_from(v)
        .map_err(|_| MigrateError::schema(table, format!("{} out of range: {}", field, v)))
}

#[async_trait]
impl SourceReader for MysqlReader {
    async fn list_tables(&mut self) -> Result<Vec<String>> {
        let rows: Vec<MySqlRow> = sqlx::query(dialect::LIST_TABLES)
            .fetch_all(self.conn()?)
            .await?;

        let tables = rows
            .iter()
            .map(|row| row.try_get::<String, _>("TABLE_NAME"))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!("Found {} base tables in {}", tables.len(), self.database);
        Ok(tables)
    }

    async fn column_catalog(&mut self, table: &str) -> Result<Vec<CatalogColumn>> {
        let rows: Vec<MySqlRow> = sqlx::query(dialect::COLUMN_CATALOG)
            .bind(table)
            .fetch_all(self.conn()?)
            .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            columns.push(CatalogColumn {
                name: row.try_get("COLUMN_NAME")?,
                column_type: row.try_get("COLUMN_TYPE")?,
                is_nullable: row.try_get::<i64, _>("is_nullable")? == 1,
                ordinal_position: catalog_u32(
                    table,
                    "ORDINAL_POSITION",
                    row.try_get("ORDINAL_POSITION")?,
                )?,
                is_primary: row.try_get::<i64, _>("is_primary")? == 1,
            });
        }
        Ok(columns)
    }

    async fn index_catalog(&mut self, table: &str) -> Result<Vec<CatalogIndexEntry>> {
        let rows: Vec<MySqlRow> = sqlx::query(dialect::INDEX_CATALOG)
            .bind(table)
            .fetch_all(self.conn()?)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(CatalogIndexEntry {
                index_name: row.try_get("INDEX_NAME")?,
                non_unique: row.try_get::<i64, _>("NON_UNIQUE")? != 0,
                column_name: row.try_get("COLUMN_NAME")?,
                seq_in_index: catalog_u32(table, "SEQ_IN_INDEX", row.try_get("SEQ_IN_INDEX")?)?,
                index_type: row.try_get("INDEX_TYPE")?,
            });
        }
        Ok(entries)
    }

    async fn row_count(&mut self, table: &str) -> Result<u64> {
        let sql = dialect::count_query(table)?;
        let row: MySqlRow = sqlx::query(&sql).fetch_one(self.conn()?).await?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as u64)
    }

    async fn read_chunk(&mut self, request: &ChunkRequest) -> Result<Vec<ValueRow>> {
        let (sql, cursor) = dialect::chunk_query(request)?;
        debug!("{}: {}", request.table, sql);

        let mut query = sqlx::query(&sql);
        if let Some(cursor) = &cursor {
            query = bind_value(query, cursor);
        }
        let rows: Vec<MySqlRow> = query.fetch_all(self.conn()?).await?;

        let kinds: Vec<ValueKind> = request
            .columns
            .iter()
            .map(|c| dialect::value_kind(&c.source_type))
            .collect();

        rows.iter()
            .map(|row| {
                request
                    .columns
                    .iter()
                    .zip(&kinds)
                    .enumerate()
                    .map(|(idx, (col, kind))| decode_value(row, idx, &col.name, *kind))
                    .collect::<Result<ValueRow>>()
            })
            .collect()
    }

    async fn ping(&mut self) -> Result<()> {
        self.conn()?
            .ping()
            .await
            .map_err(|e| MigrateError::connection("source", e))
    }

    fn db_type(&self) -> &str {
        "mysql"
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
            debug!("Closed MySQL source connection");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsigned_bigint_overflow_becomes_decimal() {
        assert_eq!(unsigned_bigint(42), SqlValue::I64(42));
        assert_eq!(
            unsigned_bigint(i64::MAX as u64),
            SqlValue::I64(i64::MAX)
        );
        assert_eq!(
            unsigned_bigint(u64::MAX),
            SqlValue::Decimal(rust_decimal::Decimal::from(u64::MAX))
        );
    }

    #[test]
    fn test_catalog_u32() {
        assert_eq!(catalog_u32("t", "SEQ_IN_INDEX", 3).unwrap(), 3);
        assert!(matches!(
            catalog_u32("t", "SEQ_IN_INDEX", -1),
            Err(MigrateError::Schema { .. })
        ));
    }
}
