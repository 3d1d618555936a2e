//! Error types for the migration library.

use thiserror::Error;

/// Exit code for configuration errors (bad YAML, missing fields, bad options).
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for connection failures.
pub const EXIT_CONNECTION_ERROR: u8 = 2;
/// Exit code for catalog/introspection failures.
pub const EXIT_SCHEMA_ERROR: u8 = 3;
/// Exit code for a table that failed mid-transfer.
pub const EXIT_TRANSFER_ERROR: u8 = 4;
/// Exit code when the operator declined or interrupted the run.
pub const EXIT_CANCELLED: u8 = 5;
/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Could not open or verify a database connection
    #[error("Connection to {database} failed: {message}")]
    Connection { database: String, message: String },

    /// Catalog query failed or the table disappeared
    #[error("Schema error for table {table}: {message}")]
    Schema { table: String, message: String },

    /// A table failed during DDL, chunk transfer or commit
    #[error("Transfer failed for table {table}")]
    Transfer {
        table: String,
        #[source]
        source: Box<MigrateError>,
    },

    /// Source database (MySQL) query error
    #[error("Source database error: {0}")]
    Source(#[from] sqlx::Error),

    /// Target database (PostgreSQL) query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Value could not be decoded from a source row
    #[error("Cannot decode column {column}: {message}")]
    Decode { column: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled before any change was made
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Connection error for the named database.
    pub fn connection(database: impl Into<String>, message: impl std::fmt::Display) -> Self {
        MigrateError::Connection {
            database: database.into(),
            message: message.to_string(),
        }
    }

    /// Create a Schema error for a table.
    pub fn schema(table: impl Into<String>, message: impl std::fmt::Display) -> Self {
        MigrateError::Schema {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Wrap an error as the failure of one table.
    ///
    /// Errors that are already scoped to a table (schema or transfer) are
    /// returned unchanged.
    pub fn transfer(table: impl Into<String>, source: MigrateError) -> Self {
        match source {
            e @ (MigrateError::Schema { .. } | MigrateError::Transfer { .. }) => e,
            other => MigrateError::Transfer {
                table: table.into(),
                source: Box::new(other),
            },
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::Json(_) => {
                EXIT_CONFIG_ERROR
            }
            MigrateError::Connection { .. } => EXIT_CONNECTION_ERROR,
            MigrateError::Schema { .. } => EXIT_SCHEMA_ERROR,
            MigrateError::Transfer { .. }
            | MigrateError::Source(_)
            | MigrateError::Target(_)
            | MigrateError::Decode { .. } => EXIT_TRANSFER_ERROR,
            MigrateError::Cancelled => EXIT_CANCELLED,
            MigrateError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
