//! Configuration validation.

use super::Config;
use crate::core::identifier::validate_identifier;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.host.is_empty() {
        return Err(MigrateError::Config("source.host is required".into()));
    }
    if config.source.database.is_empty() {
        return Err(MigrateError::Config("source.database is required".into()));
    }
    if config.source.user.is_empty() {
        return Err(MigrateError::Config("source.user is required".into()));
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }
    validate_identifier(&config.target.schema)?;

    // Both sides on one server and port means the same instance
    if config.source.host == config.target.host && config.source.port == config.target.port {
        return Err(MigrateError::Config(
            "source and target cannot be the same endpoint".into(),
        ));
    }

    if config.migration.chunk_size == 0 {
        return Err(MigrateError::Config(
            "migration.chunk_size must be at least 1".into(),
        ));
    }

    Ok(())
}
