//! PostgreSQL target writer.
//!
//! Implements [`TargetWriter`] over a single tokio-postgres client. Chunks are
//! loaded with `COPY ... FROM STDIN` in text format, one COPY per chunk.

use std::time::Duration;

use async_trait::async_trait;
use futures::SinkExt;
use tokio::task::JoinHandle;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, Config as PgConfig};
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::core::identifier::{qualify_pg, quote_pg_list};
use crate::core::traits::TargetWriter;
use crate::core::value::{Row, SqlValue};
use crate::drivers::common::TlsBuilder;
use crate::error::{MigrateError, Result};

/// Connect timeout for the target.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const LIST_TABLES: &str = r#"
    SELECT table_name::text
    FROM information_schema.tables
    WHERE table_schema = $1 AND table_type = 'BASE TABLE'
    ORDER BY table_name
"#;

const COLUMN_TYPES: &str = r#"
    SELECT column_name::text, data_type::text, is_nullable = 'YES'
    FROM information_schema.columns
    WHERE table_schema = $1 AND table_name = $2
    ORDER BY ordinal_position
"#;

const INDEX_COLUMNS: &str = r#"
    SELECT i.relname::text, x.indisunique, a.attname::text
    FROM pg_index x
    JOIN pg_class t ON t.oid = x.indrelid
    JOIN pg_class i ON i.oid = x.indexrelid
    JOIN pg_namespace n ON n.oid = t.relnamespace
    CROSS JOIN LATERAL unnest(x.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
    JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
    WHERE n.nspname = $1 AND t.relname = $2 AND NOT x.indisprimary
    ORDER BY i.relname, k.ord
"#;

/// PostgreSQL target writer.
pub struct PostgresWriter {
    client: Option<Client>,
    connection_task: Option<JoinHandle<()>>,
    schema: String,
    in_transaction: bool,
}

impl PostgresWriter {
    /// Open a connection from configuration and verify it.
    pub async fn connect(config: &TargetConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);

        // Connection options for reliability
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(CONNECT_TIMEOUT);

        let (client, connection_task) = match TlsBuilder::new(config.ssl_mode).build()? {
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                let (client, connection) = pg_config
                    .connect(tokio_postgres::NoTls)
                    .await
                    .map_err(|e| MigrateError::connection("target", e))?;
                (client, tokio::spawn(drive(connection)))
            }
            Some(tls) => {
                let (client, connection) = pg_config
                    .connect(tls)
                    .await
                    .map_err(|e| MigrateError::connection("target", e))?;
                (client, tokio::spawn(drive(connection)))
            }
        };

        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection("target", e))?;

        info!(
            "Connected to PostgreSQL target: {}:{}/{} (schema {})",
            config.host, config.port, config.database, config.schema
        );

        Ok(Self {
            client: Some(client),
            connection_task: Some(connection_task),
            schema: config.schema.clone(),
            in_transaction: false,
        })
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| MigrateError::connection("target", "connection is closed"))
    }

    /// `(column, data_type, nullable)` for a target table, in ordinal order.
    pub async fn column_types(&self, table: &str) -> Result<Vec<(String, String, bool)>> {
        let rows = self
            .client()?
            .query(COLUMN_TYPES, &[&self.schema, &table])
            .await?;
        Ok(rows
            .iter()
            .map(|r| (r.get(0), r.get(1), r.get(2)))
            .collect())
    }

    /// Secondary indexes of a target table as `(name, unique, columns)`, with
    /// columns in key order.
    pub async fn index_columns(&self, table: &str) -> Result<Vec<(String, bool, Vec<String>)>> {
        let rows = self
            .client()?
            .query(INDEX_COLUMNS, &[&self.schema, &table])
            .await?;

        let mut indexes: Vec<(String, bool, Vec<String>)> = Vec::new();
        for row in rows {
            let name: String = row.get(0);
            let column: String = row.get(2);
            match indexes.last_mut() {
                Some((last, _, columns)) if *last == name => columns.push(column),
                Some(_) | None => {
                    let unique: bool = row.get(1);
                    indexes.push((name, unique, vec![column]));
                }
            }
        }
        Ok(indexes)
    }
}

/// Run the connection until the client is dropped.
async fn drive<F>(connection: F)
where
    F: std::future::Future<Output = std::result::Result<(), tokio_postgres::Error>>,
{
    if let Err(e) = connection.await {
        warn!("PostgreSQL connection error: {}", e);
    }
}

#[async_trait]
impl TargetWriter for PostgresWriter {
    fn schema(&self) -> &str {
        &self.schema
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        let rows = self.client()?.query(LIST_TABLES, &[&self.schema]).await?;
        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    async fn begin(&mut self) -> Result<()> {
        self.client()?.batch_execute("BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        debug!("{}", sql);
        self.client()?.batch_execute(sql).await?;
        Ok(())
    }

    async fn write_chunk(&mut self, table: &str, columns: &[String], rows: &[Row]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let copy_sql = format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT TEXT)",
            qualify_pg(&self.schema, table)?,
            quote_pg_list(columns)?
        );
        let data = encode_copy_rows(rows);

        let sink = self
            .client()?
            .copy_in::<_, bytes::Bytes>(&copy_sql)
            .await?;
        tokio::pin!(sink);
        sink.send(bytes::Bytes::from(data)).await?;
        let written = sink.as_mut().finish().await?;

        debug!("{}: copied {} rows", table, written);
        Ok(written)
    }

    async fn commit(&mut self) -> Result<()> {
        self.client()?.batch_execute("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.client()?.batch_execute("ROLLBACK").await?;
        Ok(())
    }

    async fn row_count(&mut self, table: &str) -> Result<Option<u64>> {
        let sql = format!("SELECT COUNT(*)::int8 FROM {}", qualify_pg(&self.schema, table)?);
        match self.client()?.query_one(&sql, &[]).await {
            Ok(row) => Ok(Some(row.get::<_, i64>(0).max(0) as u64)),
            Err(e) if e.code() == Some(&SqlState::UNDEFINED_TABLE) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn ping(&mut self) -> Result<()> {
        self.client()?
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection("target", e))?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the client ends the connection future.
        if self.client.take().is_some() {
            debug!("Closed PostgreSQL target connection");
        }
        if let Some(task) = self.connection_task.take() {
            if let Err(e) = task.await {
                warn!("PostgreSQL connection task ended abnormally: {}", e);
            }
        }
        Ok(())
    }
}

/// Encode rows as COPY text: tab-separated fields, newline-terminated rows.
fn encode_copy_rows(rows: &[Row]) -> String {
    let mut buf = String::with_capacity(rows.len() * 64);
    for row in rows {
        for (i, value) in row.iter().enumerate() {
            if i > 0 {
                buf.push('\t');
            }
            buf.push_str(&value_to_text(value));
        }
        buf.push('\n');
    }
    buf
}

/// Convert a value to its COPY text representation.
fn value_to_text(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "\\N".to_string(),
        SqlValue::I16(i) => i.to_string(),
        SqlValue::I32(i) => i.to_string(),
        SqlValue::I64(i) => i.to_string(),
        SqlValue::F32(f) => float_text(f64::from(*f)),
        SqlValue::F64(f) => float_text(*f),
        SqlValue::Decimal(d) => d.to_string(),
        SqlValue::Text(s) => escape_copy_text(s),
        // bytea hex input, with the backslash escaped for COPY
        SqlValue::Bytes(b) => format!("\\\\x{}", hex::encode(b)),
        SqlValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        SqlValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
    }
}

fn float_text(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        f.to_string()
    }
}

/// Escape text for PostgreSQL COPY.
fn escape_copy_text(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '\t' => result.push_str("\\t"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            _ => result.push(c),
        }
    }
    result
}
