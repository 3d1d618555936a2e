//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::plan::MigrationOptions;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MySQL/MariaDB).
    pub source: SourceConfig,

    /// Target database configuration (PostgreSQL).
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source database (MySQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database name. Tables are listed from this database.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// TLS mode (default: preferred).
    #[serde(default)]
    pub ssl_mode: SourceSslMode,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Target database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Target schema (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode (default: require).
    #[serde(default)]
    pub ssl_mode: TargetSslMode,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows per chunk (default: 1000).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Drop and recreate tables that already exist in the target.
    #[serde(default)]
    pub recreate: bool,

    /// Truncate tables that already exist in the target.
    #[serde(default)]
    pub truncate: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            recreate: false,
            truncate: false,
        }
    }
}

impl MigrationConfig {
    pub fn to_options(&self) -> MigrationOptions {
        MigrationOptions {
            chunk_size: self.chunk_size,
            recreate: self.recreate,
            truncate: self.truncate,
        }
    }
}

/// MySQL TLS mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceSslMode {
    Disabled,
    /// Use TLS when the server offers it.
    #[default]
    Preferred,
    Required,
}

/// PostgreSQL TLS mode, in libpq naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetSslMode {
    /// Plaintext. Credentials travel unencrypted.
    Disable,
    /// Encrypt without verifying the server certificate.
    #[default]
    Require,
    /// Verify the certificate chain. The hostname is checked as well.
    VerifyCa,
    /// Verify the certificate chain and the hostname.
    VerifyFull,
}

impl fmt::Display for TargetSslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetSslMode::Disable => "disable",
            TargetSslMode::Require => "require",
            TargetSslMode::VerifyCa => "verify-ca",
            TargetSslMode::VerifyFull => "verify-full",
        };
        f.write_str(s)
    }
}

// Default value functions for serde
fn default_mysql_port() -> u16 {
    3306
}

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_chunk_size() -> usize {
    1000
}
