//! mysql-pg-migrate CLI - one-shot MySQL to PostgreSQL migration.

use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use mysql_pg_migrate::{
    Config, MigrateError, MigrationPlan, MigrationResult, Orchestrator, ProgressUpdate,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, Level};

/// Progress updates buffered between the transfer and the renderer.
const PROGRESS_BUFFER: usize = 64;

#[derive(Parser)]
#[command(name = "mysql-pg-migrate")]
#[command(about = "One-shot MySQL to PostgreSQL migration")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Print progress updates as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan and run a migration
    Run {
        /// Override rows per chunk
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Drop and recreate tables that already exist in the target
        #[arg(long)]
        recreate: bool,

        /// Truncate tables that already exist in the target
        #[arg(long)]
        truncate: bool,

        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,

        /// Dry run: show the plan without changing the target
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the per-table plan without changing the target
    Plan {
        /// Plan as if tables in the target would be recreated
        #[arg(long)]
        recreate: bool,

        /// Plan as if tables in the target would be truncated
        #[arg(long)]
        truncate: bool,
    },

    /// Validate row counts between source and target
    Validate,

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            chunk_size,
            recreate,
            truncate,
            yes,
            dry_run,
        } => {
            // Apply overrides
            if let Some(size) = chunk_size {
                config.migration.chunk_size = size;
            }
            config.migration.recreate |= recreate;
            config.migration.truncate |= truncate;

            let mut orchestrator = Orchestrator::connect(&config).await?;
            let plan = match orchestrator.plan().await {
                Ok(plan) => plan,
                Err(e) => {
                    orchestrator.close().await;
                    return Err(e);
                }
            };
            print_plan(&plan, &config.target.schema);

            if dry_run {
                orchestrator.close().await;
                println!("\nDry run completed: no changes made.");
                return Ok(());
            }

            if !yes && !plan.is_empty() && !confirm(&plan)? {
                orchestrator.close().await;
                return Err(MigrateError::Cancelled);
            }

            let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
            let renderer = spawn_progress_renderer(rx, cli.progress);

            let outcome = orchestrator.with_progress(tx).run(&plan).await;
            // The sender went away with the orchestrator, so the renderer drains and exits
            let _ = renderer.await;

            if cli.output_json {
                println!("{}", outcome.result.to_json()?);
            } else {
                print_result(&outcome.result);
            }

            outcome.into_result()?;
        }

        Commands::Plan { recreate, truncate } => {
            config.migration.recreate |= recreate;
            config.migration.truncate |= truncate;

            let mut orchestrator = Orchestrator::connect(&config).await?;
            let plan = orchestrator.plan().await;
            orchestrator.close().await;
            let plan = plan?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                print_plan(&plan, &config.target.schema);
            }
        }

        Commands::Validate => {
            let mut orchestrator = Orchestrator::connect(&config).await?;
            let checks = orchestrator.validate().await;
            orchestrator.close().await;
            let checks = checks?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&checks)?);
            } else {
                println!("Row count validation:");
                for check in &checks {
                    let target = check
                        .target_rows
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "missing".to_string());
                    println!(
                        "  {} {}: source {}, target {}",
                        if check.matches { "OK      " } else { "MISMATCH" },
                        check.table,
                        check.source_rows,
                        target
                    );
                }
            }

            let mismatched = checks.iter().filter(|c| !c.matches).count();
            if mismatched > 0 {
                return Err(MigrateError::Config(format!(
                    "Row counts differ for {} of {} tables",
                    mismatched,
                    checks.len()
                )));
            }
            println!("Validation completed successfully");
        }

        Commands::HealthCheck => {
            let mut orchestrator = Orchestrator::connect(&config).await?;
            let result = orchestrator.health_check().await;
            orchestrator.close().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source ({}): {} ({}ms)",
                    result.source_type,
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target ({}): {} ({}ms)",
                    result.target_type,
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::Config("Health check failed".to_string()));
            }
        }
    }

    Ok(())
}

fn print_plan(plan: &MigrationPlan, target_schema: &str) {
    println!("Migration plan ({} tables):", plan.len());
    for entry in &plan.entries {
        println!("  {:<20} {}", entry.action.to_string(), entry.name);
    }

    let existing: Vec<&str> = plan.existing().collect();
    let missing: Vec<&str> = plan.missing().collect();
    println!(
        "\nTarget schema {}: {} tables already present, {} missing",
        target_schema,
        existing.len(),
        missing.len()
    );
    if !existing.is_empty() {
        println!("  Present: {}", existing.join(", "));
    }
    if !missing.is_empty() {
        println!("  Missing: {}", missing.join(", "));
    }
}

fn print_result(result: &MigrationResult) {
    println!("\nMigration {}!", result.status);
    println!("  Run ID: {}", result.run_id);
    println!("  Duration: {:.2}s", result.duration_seconds);
    println!("  Tables: {}/{}", result.tables_success, result.tables_total);
    if result.tables_not_attempted > 0 {
        println!("  Not attempted: {}", result.tables_not_attempted);
    }
    println!("  Rows: {}", result.rows_transferred);
    println!("  Throughput: {} rows/sec", result.rows_per_second);
    if !result.failed_tables.is_empty() {
        println!("  Failed tables: {:?}", result.failed_tables);
    }
}

fn confirm(plan: &MigrationPlan) -> Result<bool, MigrateError> {
    Confirm::new()
        .with_prompt(format!("Migrate {} tables?", plan.len()))
        .default(false)
        .interact()
        .map_err(|e| {
            MigrateError::Config(format!(
                "Confirmation prompt failed ({}); pass --yes to run unattended",
                e
            ))
        })
}

/// Render progress either as JSON lines on stderr or as log lines.
fn spawn_progress_renderer(
    mut rx: mpsc::Receiver<ProgressUpdate>,
    json_lines: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            if json_lines {
                match serde_json::to_string(&update) {
                    Ok(line) => eprintln!("{}", line),
                    Err(e) => tracing::warn!("Cannot serialize progress update: {}", e),
                }
            } else {
                info!("{}", update);
            }
        }
    })
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
