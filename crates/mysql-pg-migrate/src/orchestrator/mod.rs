//! Migration orchestrator - main workflow coordinator.
//!
//! The orchestrator owns the two open handles for the whole run. It plans,
//! drives the [`TransferEngine`] table by table in source order, rolls back
//! the current target transaction when a table fails, and always closes both
//! handles at the end of [`Orchestrator::run`].

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::core::{SourceReader, TargetWriter};
use crate::drivers::{MysqlReader, PostgresWriter};
use crate::error::{MigrateError, Result};
use crate::inspect;
use crate::plan::{self, MigrationOptions, MigrationPlan};
use crate::transfer::{ProgressUpdate, TableReport, TableStatus, TransferEngine};

/// Migration orchestrator.
pub struct Orchestrator<S, T> {
    source: S,
    target: T,
    options: MigrationOptions,
    progress_tx: Option<mpsc::Sender<ProgressUpdate>>,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: "completed" or "failed".
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Tables in the plan.
    pub tables_total: usize,

    /// Tables committed.
    pub tables_success: usize,

    /// Tables that failed (at most one: the run stops there).
    pub tables_failed: usize,

    /// Tables the run never reached.
    pub tables_not_attempted: usize,

    /// Rows in committed tables.
    pub rows_transferred: u64,

    /// Average throughput (rows/second).
    pub rows_per_second: u64,

    /// List of failed table names.
    pub failed_tables: Vec<String>,

    /// Per-table reports in plan order.
    pub tables: Vec<TableReport>,
}

impl MigrationResult {
    fn from_reports(
        run_id: String,
        started_at: DateTime<Utc>,
        duration_seconds: f64,
        tables: Vec<TableReport>,
    ) -> Self {
        let count = |status: TableStatus| tables.iter().filter(|t| t.status == status).count();
        let tables_success = count(TableStatus::Committed);
        let tables_failed = count(TableStatus::Failed);
        let tables_not_attempted = count(TableStatus::NotAttempted);

        let rows_transferred: u64 = tables
            .iter()
            .filter(|t| t.status == TableStatus::Committed)
            .map(|t| t.rows_migrated)
            .sum();
        let rows_per_second = if duration_seconds > 0.0 {
            (rows_transferred as f64 / duration_seconds) as u64
        } else {
            0
        };

        let failed_tables = tables
            .iter()
            .filter(|t| t.status == TableStatus::Failed)
            .map(|t| t.name.clone())
            .collect();

        Self {
            run_id,
            status: if tables_failed > 0 { "failed" } else { "completed" }.to_string(),
            duration_seconds,
            started_at,
            completed_at: Utc::now(),
            tables_total: tables.len(),
            tables_success,
            tables_failed,
            tables_not_attempted,
            rows_transferred,
            rows_per_second,
            failed_tables,
            tables,
        }
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A finished run: the report, plus the error that stopped it.
#[derive(Debug)]
pub struct MigrationOutcome {
    pub result: MigrationResult,
    pub error: Option<MigrateError>,
}

impl MigrationOutcome {
    /// The report on success, the stopping error otherwise.
    pub fn into_result(self) -> Result<MigrationResult> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.result),
        }
    }
}

/// Row counts of one table on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCountCheck {
    pub table: String,
    pub source_rows: u64,
    /// `None` when the table is missing from the target.
    pub target_rows: Option<u64>,
    pub matches: bool,
}

/// Connection health of both databases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub source_type: String,
    pub source_connected: bool,
    pub source_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    pub target_type: String,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_error: Option<String>,
    pub healthy: bool,
}

impl Orchestrator<MysqlReader, PostgresWriter> {
    /// Open both connections from configuration.
    pub async fn connect(config: &Config) -> Result<Self> {
        config.validate()?;
        let mut source = MysqlReader::connect(&config.source).await?;
        let target = match PostgresWriter::connect(&config.target).await {
            Ok(target) => target,
            Err(e) => {
                if let Err(close_err) = source.close().await {
                    warn!("Failed to close source connection: {}", close_err);
                }
                return Err(e);
            }
        };
        Ok(Self::new(source, target, config.migration.to_options()))
    }
}

impl<S, T> Orchestrator<S, T>
where
    S: SourceReader,
    T: TargetWriter,
{
    /// Create an orchestrator over already-open handles.
    pub fn new(source: S, target: T, options: MigrationOptions) -> Self {
        Self {
            source,
            target,
            options,
            progress_tx: None,
        }
    }

    /// Send a [`ProgressUpdate`] after every chunk of the run.
    ///
    /// The sender is dropped when the run finishes, which ends the stream.
    pub fn with_progress(mut self, tx: mpsc::Sender<ProgressUpdate>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn options(&self) -> &MigrationOptions {
        &self.options
    }

    /// List both sides and assign an action to every source table.
    ///
    /// Read-only: nothing is written to the target.
    pub async fn plan(&mut self) -> Result<MigrationPlan> {
        let source_tables = inspect::list_source_tables(&mut self.source).await?;
        let target_tables = inspect::list_target_tables(&mut self.target).await?;
        let plan = plan::plan(&source_tables, &target_tables, &self.options)?;

        info!(
            "Planned {} tables: {} already in target schema {}, {} missing",
            plan.len(),
            plan.existing().count(),
            self.target.schema(),
            plan.missing().count()
        );
        Ok(plan)
    }

    /// Execute a plan, then close both handles.
    ///
    /// Tables run in plan order. The first failure rolls back that table's
    /// transaction and stops the run; tables committed before it stay
    /// committed and the rest are reported as not attempted.
    pub async fn run(mut self, plan: &MigrationPlan) -> MigrationOutcome {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let clock = Instant::now();
        info!("Starting migration run {}: {} tables", run_id, plan.len());

        let outcome = match self.options.validate() {
            Ok(()) => self.execute(plan).await,
            Err(e) => (Vec::new(), Some(e)),
        };
        let (mut reports, error) = outcome;
        if reports.len() < plan.len() {
            reports.extend(
                plan.entries[reports.len()..]
                    .iter()
                    .map(TableReport::not_attempted),
            );
        }

        self.teardown().await;

        let result = MigrationResult::from_reports(
            run_id,
            started_at,
            clock.elapsed().as_secs_f64(),
            reports,
        );
        info!(
            "Migration {}: {}/{} tables, {} rows in {:.1}s ({} rows/s)",
            result.status,
            result.tables_success,
            result.tables_total,
            result.rows_transferred,
            result.duration_seconds,
            result.rows_per_second
        );

        MigrationOutcome { result, error }
    }

    async fn execute(&mut self, plan: &MigrationPlan) -> (Vec<TableReport>, Option<MigrateError>) {
        let mut engine = TransferEngine::new(self.options.clone(), self.target.schema());
        if let Some(tx) = self.progress_tx.take() {
            engine = engine.with_progress(tx);
        }

        let total = plan.len();
        let mut reports = Vec::with_capacity(total);

        for (i, entry) in plan.entries.iter().enumerate() {
            info!("[{}/{}] {} ({})", i + 1, total, entry.name, entry.action);
            let outcome = engine
                .migrate_table(&mut self.source, &mut self.target, entry, (i + 1, total))
                .await;
            reports.push(outcome.report);

            if let Some(e) = outcome.error {
                error!("{}", e.format_detailed().trim_end());
                match self.target.rollback().await {
                    Ok(()) => info!("{}: rolled back", entry.name),
                    Err(rb) => warn!("{}: rollback failed: {}", entry.name, rb),
                }
                return (reports, Some(e));
            }
        }

        (reports, None)
    }

    async fn teardown(&mut self) {
        if let Err(e) = self.source.close().await {
            warn!("Failed to close source connection: {}", e);
        }
        if let Err(e) = self.target.close().await {
            warn!("Failed to close target connection: {}", e);
        }
    }

    /// Close both handles without running anything.
    pub async fn close(mut self) {
        self.teardown().await;
    }

    /// Validate row counts between source and target.
    pub async fn validate(&mut self) -> Result<Vec<RowCountCheck>> {
        let tables = inspect::list_source_tables(&mut self.source).await?;
        let mut results = Vec::with_capacity(tables.len());

        for table in tables {
            let source_rows = self.source.row_count(&table).await?;
            let target_rows = self.target.row_count(&table).await?;

            let matches = target_rows == Some(source_rows);
            match target_rows {
                Some(target_rows) if matches => {
                    info!("{}: {} rows (match)", table, target_rows)
                }
                Some(target_rows) => warn!(
                    "{}: source={} target={} (MISMATCH)",
                    table, source_rows, target_rows
                ),
                None => warn!("{}: source={} target=missing (MISMATCH)", table, source_rows),
            }

            results.push(RowCountCheck {
                table,
                source_rows,
                target_rows,
                matches,
            });
        }

        Ok(results)
    }

    /// Ping both databases.
    pub async fn health_check(&mut self) -> HealthCheckResult {
        let started = Instant::now();
        let source = self.source.ping().await;
        let source_latency_ms = started.elapsed().as_millis() as u64;

        let started = Instant::now();
        let target = self.target.ping().await;
        let target_latency_ms = started.elapsed().as_millis() as u64;

        let healthy = source.is_ok() && target.is_ok();
        HealthCheckResult {
            source_type: self.source.db_type().to_string(),
            source_connected: source.is_ok(),
            source_latency_ms,
            source_error: source.err().map(|e| e.to_string()),
            target_type: self.target.db_type().to_string(),
            target_connected: target.is_ok(),
            target_latency_ms,
            target_error: target.err().map(|e| e.to_string()),
            healthy,
        }
    }
}
