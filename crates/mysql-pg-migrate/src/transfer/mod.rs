//! Per-table transfer engine.
//!
//! Each table walks an explicit state machine:
//!
//! ```text
//! Init -> SchemaResolved -> Created | Existing -> [Truncated] -> Transferring -> Committed
//!                                   any step on error -> Failed
//! ```
//!
//! The engine opens the target transaction, applies the planned action,
//! copies rows chunk by chunk and commits. It never rolls back itself: a
//! failure is returned to the run coordinator, which owns rollback.

mod progress;

pub use progress::{chunk_rate, percent, Eta, ProgressUpdate};

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::core::{ChunkRequest, Page, SourceReader, SqlValue, TableDescriptor, TargetWriter};
use crate::core::value::sanitize_rows;
use crate::ddl;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{MigrateError, Result};
use crate::inspect;
use crate::plan::{MigrationOptions, PlannedTable, TableAction};

/// States of a single table migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferPhase {
    Init,
    SchemaResolved,
    Created,
    Existing,
    Truncated,
    Transferring,
    Committed,
    Failed,
}

impl TransferPhase {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: TransferPhase) -> bool {
        use TransferPhase::*;
        match (self, next) {
            (Committed | Failed, _) => false,
            (_, Failed) => true,
            (Init, SchemaResolved) => true,
            (SchemaResolved, Created | Existing) => true,
            (Existing, Truncated) => true,
            (Created | Existing | Truncated, Transferring) => true,
            (Transferring, Committed) => true,
            _ => false,
        }
    }
}

/// How rows are paged out of the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaginationStrategy {
    /// `WHERE key > last ORDER BY key LIMIT n`.
    Keyset { key_column: String },
    /// `ORDER BY ... LIMIT n OFFSET m`.
    Offset { order_by: Vec<String> },
}

impl PaginationStrategy {
    /// Keyset for a single-column primary key, offset otherwise.
    ///
    /// The offset fallback orders by the composite key or a NOT NULL unique
    /// index when one exists.
    pub fn choose(table: &TableDescriptor, diagnostics: &mut Diagnostics) -> Self {
        if let Some(key) = &table.primary_key_column {
            return PaginationStrategy::Keyset {
                key_column: key.clone(),
            };
        }

        diagnostics.push(Diagnostic::OffsetPagination {
            table: table.name.clone(),
        });
        let order_by = table.offset_order_columns();
        if order_by.is_empty() {
            diagnostics.push(Diagnostic::UnorderedOffsetScan {
                table: table.name.clone(),
            });
        }
        PaginationStrategy::Offset { order_by }
    }

    fn first_page(&self) -> Page {
        match self {
            PaginationStrategy::Keyset { key_column } => Page::Keyset {
                key_column: key_column.clone(),
                after: None,
            },
            PaginationStrategy::Offset { order_by } => Page::Offset {
                order_by: order_by.clone(),
                offset: 0,
            },
        }
    }
}

/// Final status of one planned table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Committed,
    Failed,
    /// The run stopped before reaching this table.
    NotAttempted,
}

/// What happened to one table.
#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub name: String,
    pub action: TableAction,
    pub status: TableStatus,
    pub phase: TransferPhase,
    pub strategy: Option<PaginationStrategy>,
    pub total_rows: u64,
    pub rows_migrated: u64,
    pub chunks: u64,
    pub elapsed_seconds: f64,
    pub diagnostics: Diagnostics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableReport {
    fn new(entry: &PlannedTable) -> Self {
        Self {
            name: entry.name.clone(),
            action: entry.action,
            status: TableStatus::NotAttempted,
            phase: TransferPhase::Init,
            strategy: None,
            total_rows: 0,
            rows_migrated: 0,
            chunks: 0,
            elapsed_seconds: 0.0,
            diagnostics: Diagnostics::new(),
            error: None,
        }
    }

    /// Report for a table the run never reached.
    pub fn not_attempted(entry: &PlannedTable) -> Self {
        Self::new(entry)
    }

    fn advance(&mut self, next: TransferPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.phase,
            next
        );
        debug!("{}: {:?} -> {:?}", self.name, self.phase, next);
        self.phase = next;
    }
}

/// Result of migrating one table.
#[derive(Debug)]
pub struct TableOutcome {
    pub report: TableReport,
    /// Set when the table failed. The target transaction is still open.
    pub error: Option<MigrateError>,
}

/// Where the engine is in the current table.
struct TransferState {
    total_rows: u64,
    rows_migrated: u64,
    page: Page,
}

/// Copies one table at a time from a source handle to a target handle.
pub struct TransferEngine {
    options: MigrationOptions,
    target_schema: String,
    progress_tx: Option<mpsc::Sender<ProgressUpdate>>,
}

impl TransferEngine {
    pub fn new(options: MigrationOptions, target_schema: impl Into<String>) -> Self {
        Self {
            options,
            target_schema: target_schema.into(),
            progress_tx: None,
        }
    }

    /// Send a [`ProgressUpdate`] after every chunk.
    pub fn with_progress(mut self, tx: mpsc::Sender<ProgressUpdate>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    /// Migrate one planned table.
    ///
    /// `position` is the 1-based index of the table and the plan length.
    pub async fn migrate_table<S, T>(
        &self,
        source: &mut S,
        target: &mut T,
        entry: &PlannedTable,
        position: (usize, usize),
    ) -> TableOutcome
    where
        S: SourceReader + ?Sized,
        T: TargetWriter + ?Sized,
    {
        let started = Instant::now();
        let mut report = TableReport::new(entry);

        let result = self
            .run_table(source, target, entry, position, &mut report)
            .await;
        report.elapsed_seconds = started.elapsed().as_secs_f64();

        match result {
            Ok(()) => {
                report.status = TableStatus::Committed;
                info!(
                    "{}: committed {} rows in {} chunks ({:.2}s)",
                    entry.name, report.rows_migrated, report.chunks, report.elapsed_seconds
                );
                TableOutcome {
                    report,
                    error: None,
                }
            }
            Err(e) => {
                let error = MigrateError::transfer(&entry.name, e);
                report.advance(TransferPhase::Failed);
                report.status = TableStatus::Failed;
                report.error = Some(error.format_detailed().trim_end().to_string());
                TableOutcome {
                    report,
                    error: Some(error),
                }
            }
        }
    }

    async fn run_table<S, T>(
        &self,
        source: &mut S,
        target: &mut T,
        entry: &PlannedTable,
        position: (usize, usize),
        report: &mut TableReport,
    ) -> Result<()>
    where
        S: SourceReader + ?Sized,
        T: TargetWriter + ?Sized,
    {
        let inspection = inspect::describe_table(source, &entry.name).await?;
        let table = inspection.table;
        report.diagnostics.extend(inspection.diagnostics);
        report.advance(TransferPhase::SchemaResolved);

        target.begin().await?;
        self.apply_action(target, &table, entry.action, report)
            .await?;

        let total_rows = source.row_count(&table.name).await?;
        report.total_rows = total_rows;
        report.advance(TransferPhase::Transferring);

        if total_rows == 0 {
            debug!("{}: source is empty, nothing to copy", table.name);
            target.commit().await?;
            report.advance(TransferPhase::Committed);
            return Ok(());
        }

        let strategy = PaginationStrategy::choose(&table, &mut report.diagnostics);
        info!(
            "{}: {} rows, {:?} pagination, chunk size {}",
            table.name, total_rows, strategy, self.options.chunk_size
        );

        let mut state = TransferState {
            total_rows,
            rows_migrated: 0,
            page: strategy.first_page(),
        };
        report.strategy = Some(strategy);

        self.copy_rows(source, target, &table, position, &mut state, report)
            .await?;

        target.commit().await?;
        report.advance(TransferPhase::Committed);
        Ok(())
    }

    /// DDL for the planned action, inside the table's transaction.
    async fn apply_action<T: TargetWriter + ?Sized>(
        &self,
        target: &mut T,
        table: &TableDescriptor,
        action: TableAction,
        report: &mut TableReport,
    ) -> Result<()> {
        let schema = self.target_schema.as_str();

        if !action.creates_table() {
            report.advance(TransferPhase::Existing);
            if action == TableAction::TruncateThenLoad {
                target.execute(&ddl::truncate_table(schema, &table.name)?).await?;
                report.advance(TransferPhase::Truncated);
            }
            return Ok(());
        }

        if action == TableAction::Recreate {
            target.execute(&ddl::drop_table(schema, &table.name)?).await?;
        }

        let create = ddl::synthesize_create_table(schema, table)?;
        report.diagnostics.extend(create.diagnostics);
        debug!("{}", create.sql);
        target.execute(&create.sql).await?;

        let indexes = ddl::synthesize_indexes(schema, table)?;
        report.diagnostics.extend(indexes.diagnostics);
        for sql in &indexes.statements {
            debug!("{}", sql);
            target.execute(sql).await?;
        }

        report.advance(TransferPhase::Created);
        Ok(())
    }

    async fn copy_rows<S, T>(
        &self,
        source: &mut S,
        target: &mut T,
        table: &TableDescriptor,
        position: (usize, usize),
        state: &mut TransferState,
        report: &mut TableReport,
    ) -> Result<()>
    where
        S: SourceReader + ?Sized,
        T: TargetWriter + ?Sized,
    {
        let column_names = table.column_names();
        let key_index = match &state.page {
            Page::Keyset { key_column, .. } => Some(table.column_index(key_column).ok_or_else(
                || MigrateError::schema(&table.name, format!("key column {} missing", key_column)),
            )?),
            Page::Offset { .. } => None,
        };

        loop {
            let request = ChunkRequest {
                table: table.name.clone(),
                columns: table.columns.clone(),
                limit: self.options.chunk_size,
                page: state.page.clone(),
            };

            let chunk_started = Instant::now();
            let rows = source.read_chunk(&request).await?;
            if rows.is_empty() {
                break;
            }
            let chunk_rows = rows.len() as u64;

            // Cursor comes from the raw row: sanitizing could alter a text key.
            state.page = next_page(&state.page, &rows, key_index, self.options.chunk_size)
                .ok_or_else(|| {
                    MigrateError::schema(&table.name, "NULL or missing key value in keyset chunk")
                })?;

            let rows = sanitize_rows(rows);
            target.write_chunk(&table.name, &column_names, &rows).await?;

            state.rows_migrated += chunk_rows;
            report.rows_migrated = state.rows_migrated;
            report.chunks += 1;

            self.report_progress(&table.name, position, state, chunk_rows, chunk_started.elapsed())
                .await;

            if state.rows_migrated >= state.total_rows {
                break;
            }
        }

        Ok(())
    }

    async fn report_progress(
        &self,
        table: &str,
        position: (usize, usize),
        state: &TransferState,
        chunk_rows: u64,
        chunk_elapsed: Duration,
    ) {
        let update = ProgressUpdate::after_chunk(
            table,
            position,
            state.rows_migrated,
            state.total_rows,
            chunk_rows,
            chunk_elapsed,
        );
        debug!("{}", update);

        if let Some(tx) = &self.progress_tx {
            let _ = tx.send(update).await;
        }
    }
}

/// Page that follows a non-empty chunk. `None` if the key value is unusable.
fn next_page(
    page: &Page,
    rows: &[Vec<SqlValue>],
    key_index: Option<usize>,
    chunk_size: usize,
) -> Option<Page> {
    match page {
        Page::Keyset { key_column, .. } => {
            let last = rows.last()?.get(key_index?)?;
            if last.is_null() {
                return None;
            }
            Some(Page::Keyset {
                key_column: key_column.clone(),
                after: Some(last.clone()),
            })
        }
        Page::Offset { order_by, offset } => Some(Page::Offset {
            order_by: order_by.clone(),
            offset: offset + chunk_size as u64,
        }),
    }
}
