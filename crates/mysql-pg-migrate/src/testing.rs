//! In-memory source and target handles for engine and coordinator tests.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::core::{
    CatalogColumn, CatalogIndexEntry, ChunkRequest, Page, Row, SourceReader, SqlValue,
    TargetWriter,
};
use crate::error::{MigrateError, Result};

pub fn catalog_column(
    name: &str,
    column_type: &str,
    is_nullable: bool,
    ordinal_position: u32,
    is_primary: bool,
) -> CatalogColumn {
    CatalogColumn {
        name: name.to_string(),
        column_type: column_type.to_string(),
        is_nullable,
        ordinal_position,
        is_primary,
    }
}

pub fn index_row(
    index_name: &str,
    non_unique: bool,
    column_name: Option<&str>,
    seq_in_index: u32,
    index_type: &str,
) -> CatalogIndexEntry {
    CatalogIndexEntry {
        index_name: index_name.to_string(),
        non_unique,
        column_name: column_name.map(str::to_string),
        seq_in_index,
        index_type: index_type.to_string(),
    }
}

/// A source table with its catalog rows and data.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    pub name: String,
    pub columns: Vec<CatalogColumn>,
    pub index_rows: Vec<CatalogIndexEntry>,
    pub rows: Vec<Row>,
    /// Row count reported instead of the real one, as when the source
    /// changes after the count was taken.
    pub reported_count: Option<u64>,
}

impl MemoryTable {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            index_rows: Vec::new(),
            rows: Vec::new(),
            reported_count: None,
        }
    }

    pub fn column(mut self, name: &str, column_type: &str, nullable: bool) -> Self {
        let pos = self.columns.len() as u32 + 1;
        self.columns
            .push(catalog_column(name, column_type, nullable, pos, false));
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        for (i, name) in columns.iter().enumerate() {
            if let Some(c) = self.columns.iter_mut().find(|c| c.name == *name) {
                c.is_primary = true;
            }
            self.index_rows
                .push(index_row("PRIMARY", false, Some(name), i as u32 + 1, "BTREE"));
        }
        self
    }

    pub fn index(mut self, name: &str, unique: bool, columns: &[&str]) -> Self {
        for (i, col) in columns.iter().enumerate() {
            self.index_rows
                .push(index_row(name, !unique, Some(col), i as u32 + 1, "BTREE"));
        }
        self
    }

    pub fn rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }

    pub fn reported_count(mut self, count: u64) -> Self {
        self.reported_count = Some(count);
        self
    }

    fn column_position(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| MigrateError::Config(format!("unknown column {}", name)))
    }
}

/// Total order over the value kinds the tests use as keys.
pub fn compare_values(a: &SqlValue, b: &SqlValue) -> Ordering {
    fn as_i64(v: &SqlValue) -> Option<i64> {
        match v {
            SqlValue::I16(x) => Some(i64::from(*x)),
            SqlValue::I32(x) => Some(i64::from(*x)),
            SqlValue::I64(x) => Some(*x),
            _ => None,
        }
    }
    match (as_i64(a), as_i64(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => match (a, b) {
            (SqlValue::Text(x), SqlValue::Text(y)) => x.cmp(y),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}

/// Everything the source was asked to do.
#[derive(Debug, Default)]
pub struct SourceLog {
    pub requests: Vec<ChunkRequest>,
    pub count_queries: Vec<String>,
    pub closed: bool,
}

pub struct MemorySource {
    tables: Vec<MemoryTable>,
    fail_catalog: HashSet<String>,
    fail_read: Option<(String, usize)>,
    log: Arc<Mutex<SourceLog>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            tables: Vec::new(),
            fail_catalog: HashSet::new(),
            fail_read: None,
            log: Arc::new(Mutex::new(SourceLog::default())),
        }
    }

    pub fn with_table(mut self, table: MemoryTable) -> Self {
        self.tables.push(table);
        self
    }

    pub fn fail_catalog_for(mut self, table: &str) -> Self {
        self.fail_catalog.insert(table.to_string());
        self
    }

    /// Fail the `nth` (1-based) chunk read of `table`.
    pub fn fail_read_at(mut self, table: &str, nth: usize) -> Self {
        self.fail_read = Some((table.to_string(), nth));
        self
    }

    pub fn log(&self) -> Arc<Mutex<SourceLog>> {
        Arc::clone(&self.log)
    }

    fn lock(&self) -> MutexGuard<'_, SourceLog> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn table(&self, name: &str) -> Option<&MemoryTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    fn check_open(&self) -> Result<()> {
        if self.lock().closed {
            return Err(MigrateError::connection("memory source", "closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    async fn list_tables(&mut self) -> Result<Vec<String>> {
        self.check_open()?;
        Ok(self.tables.iter().map(|t| t.name.clone()).collect())
    }

    async fn column_catalog(&mut self, table: &str) -> Result<Vec<CatalogColumn>> {
        self.check_open()?;
        if self.fail_catalog.contains(table) {
            return Err(MigrateError::Config("catalog unavailable".into()));
        }
        Ok(self.table(table).map(|t| t.columns.clone()).unwrap_or_default())
    }

    async fn index_catalog(&mut self, table: &str) -> Result<Vec<CatalogIndexEntry>> {
        self.check_open()?;
        Ok(self
            .table(table)
            .map(|t| t.index_rows.clone())
            .unwrap_or_default())
    }

    async fn row_count(&mut self, table: &str) -> Result<u64> {
        self.check_open()?;
        self.lock().count_queries.push(table.to_string());
        Ok(self
            .table(table)
            .map(|t| t.reported_count.unwrap_or(t.rows.len() as u64))
            .unwrap_or(0))
    }

    async fn read_chunk(&mut self, request: &ChunkRequest) -> Result<Vec<Row>> {
        self.check_open()?;
        let reads_so_far = {
            let mut log = self.lock();
            log.requests.push(request.clone());
            log.requests
                .iter()
                .filter(|r| r.table == request.table)
                .count()
        };
        if let Some((table, nth)) = &self.fail_read {
            if *table == request.table && *nth == reads_so_far {
                return Err(MigrateError::Config("simulated read failure".into()));
            }
        }

        let table = self
            .table(&request.table)
            .ok_or_else(|| MigrateError::schema(&request.table, "missing"))?;
        let projection = request
            .columns
            .iter()
            .map(|c| table.column_position(&c.name))
            .collect::<Result<Vec<_>>>()?;

        let mut rows: Vec<&Row> = table.rows.iter().collect();
        let selected: Vec<&Row> = match &request.page {
            Page::Keyset { key_column, after } => {
                let key = table.column_position(key_column)?;
                rows.sort_by(|a, b| compare_values(&a[key], &b[key]));
                rows.into_iter()
                    .filter(|r| match after {
                        Some(after) => compare_values(&r[key], after) == Ordering::Greater,
                        None => true,
                    })
                    .take(request.limit)
                    .collect()
            }
            Page::Offset { order_by, offset } => {
                let keys = order_by
                    .iter()
                    .map(|c| table.column_position(c))
                    .collect::<Result<Vec<_>>>()?;
                if !keys.is_empty() {
                    rows.sort_by(|a, b| {
                        keys.iter()
                            .map(|&k| compare_values(&a[k], &b[k]))
                            .find(|o| *o != Ordering::Equal)
                            .unwrap_or(Ordering::Equal)
                    });
                }
                rows.into_iter()
                    .skip(*offset as usize)
                    .take(request.limit)
                    .collect()
            }
        };

        Ok(selected
            .into_iter()
            .map(|r| projection.iter().map(|&i| r[i].clone()).collect())
            .collect())
    }

    async fn ping(&mut self) -> Result<()> {
        self.check_open()
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&mut self) -> Result<()> {
        self.lock().closed = true;
        Ok(())
    }
}

/// Observable state of the in-memory target.
#[derive(Debug, Default)]
pub struct TargetLog {
    /// Every statement in execution order, including BEGIN/COMMIT/ROLLBACK.
    pub statements: Vec<String>,
    /// `(table, rows)` for every chunk write.
    pub chunks: Vec<(String, usize)>,
    /// Committed table contents.
    pub committed: BTreeMap<String, Vec<Row>>,
    /// Contents visible inside the open transaction.
    pub working: BTreeMap<String, Vec<Row>>,
    pub in_transaction: bool,
    pub closed: bool,
}

impl TargetLog {
    pub fn committed_rows(&self, table: &str) -> Option<&Vec<Row>> {
        self.committed.get(table)
    }

    pub fn ddl(&self) -> Vec<&str> {
        self.statements
            .iter()
            .map(String::as_str)
            .filter(|s| {
                s.starts_with("CREATE") || s.starts_with("DROP") || s.starts_with("TRUNCATE")
            })
            .collect()
    }
}

pub struct MemoryTarget {
    schema: String,
    fail_write: Option<(String, usize)>,
    log: Arc<Mutex<TargetLog>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self {
            schema: "public".to_string(),
            fail_write: None,
            log: Arc::new(Mutex::new(TargetLog::default())),
        }
    }

    /// Start with an existing committed table.
    pub fn with_table(self, name: &str, rows: Vec<Row>) -> Self {
        {
            let mut log = self.lock();
            log.committed.insert(name.to_string(), rows.clone());
            log.working.insert(name.to_string(), rows);
        }
        self
    }

    /// Fail the `nth` (1-based) chunk write into `table`.
    pub fn fail_write_at(mut self, table: &str, nth: usize) -> Self {
        self.fail_write = Some((table.to_string(), nth));
        self
    }

    pub fn log(&self) -> Arc<Mutex<TargetLog>> {
        Arc::clone(&self.log)
    }

    fn lock(&self) -> MutexGuard<'_, TargetLog> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_open(&self) -> Result<()> {
        if self.lock().closed {
            return Err(MigrateError::connection("memory target", "closed"));
        }
        Ok(())
    }
}

/// Last double-quoted identifier in a statement, i.e. the table name.
fn statement_table(sql: &str) -> Option<String> {
    let head = sql.split(" (").next().unwrap_or(sql);
    let mut parts = head.rsplit('"');
    parts.next()?;
    parts.next().map(str::to_string)
}

#[async_trait]
impl TargetWriter for MemoryTarget {
    fn schema(&self) -> &str {
        &self.schema
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        self.check_open()?;
        Ok(self.lock().committed.keys().cloned().collect())
    }

    async fn begin(&mut self) -> Result<()> {
        self.check_open()?;
        let mut log = self.lock();
        log.statements.push("BEGIN".into());
        log.working = log.committed.clone();
        log.in_transaction = true;
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        self.check_open()?;
        let mut log = self.lock();
        log.statements.push(sql.to_string());
        if let Some(table) = statement_table(sql) {
            if sql.starts_with("CREATE TABLE") {
                log.working.insert(table, Vec::new());
            } else if sql.starts_with("DROP TABLE") {
                log.working.remove(&table);
            } else if sql.starts_with("TRUNCATE") {
                log.working.insert(table, Vec::new());
            }
        }
        Ok(())
    }

    async fn write_chunk(
        &mut self,
        table: &str,
        _columns: &[String],
        rows: &[Row],
    ) -> Result<u64> {
        self.check_open()?;
        let mut log = self.lock();
        log.chunks.push((table.to_string(), rows.len()));
        let writes = log.chunks.iter().filter(|(t, _)| t == table).count();
        if let Some((fail_table, nth)) = &self.fail_write {
            if fail_table == table && *nth == writes {
                return Err(MigrateError::Config("simulated write failure".into()));
            }
        }
        match log.working.get_mut(table) {
            Some(existing) => existing.extend(rows.iter().cloned()),
            None => return Err(MigrateError::schema(table, "relation does not exist")),
        }
        Ok(rows.len() as u64)
    }

    async fn commit(&mut self) -> Result<()> {
        self.check_open()?;
        let mut log = self.lock();
        log.statements.push("COMMIT".into());
        log.committed = log.working.clone();
        log.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let mut log = self.lock();
        if !log.in_transaction {
            return Ok(());
        }
        log.statements.push("ROLLBACK".into());
        log.working = log.committed.clone();
        log.in_transaction = false;
        Ok(())
    }

    async fn row_count(&mut self, table: &str) -> Result<Option<u64>> {
        self.check_open()?;
        Ok(self
            .lock()
            .committed
            .get(table)
            .map(|rows| rows.len() as u64))
    }

    async fn ping(&mut self) -> Result<()> {
        self.check_open()
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&mut self) -> Result<()> {
        self.lock().closed = true;
        Ok(())
    }
}

/// `count` rows of `(id, name, bio)` with ids starting at 1.
pub fn user_rows(count: i32) -> Vec<Row> {
    (1..=count)
        .map(|i| {
            vec![
                SqlValue::I32(i),
                SqlValue::Text(format!("user{}", i)),
                SqlValue::Text(format!("bio of user {}", i)),
            ]
        })
        .collect()
}

/// The `users (id INT PK, name VARCHAR(50), bio TEXT)` table.
pub fn users_table(count: i32) -> MemoryTable {
    MemoryTable::new("users")
        .column("id", "int", false)
        .column("name", "varchar(50)", true)
        .column("bio", "text", true)
        .primary_key(&["id"])
        .rows(user_rows(count))
}
