//! Per-table action planning.
//!
//! The plan is computed once from the two table listings and the run
//! options, before any statement touches the target, so it can be shown to
//! the operator for confirmation.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

/// What happens to a table before rows are loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableAction {
    /// Absent from the target: create it with its indexes.
    Create,
    /// Present and `recreate` set: drop, create, index.
    Recreate,
    /// Present and `truncate` set: empty it, keep its definition.
    TruncateThenLoad,
    /// Present, no flag: append into it as is.
    LoadOnly,
}

impl TableAction {
    /// Whether this action runs CREATE TABLE and CREATE INDEX.
    pub fn creates_table(self) -> bool {
        matches!(self, TableAction::Create | TableAction::Recreate)
    }
}

impl fmt::Display for TableAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TableAction::Create => "create",
            TableAction::Recreate => "recreate",
            TableAction::TruncateThenLoad => "truncate-then-load",
            TableAction::LoadOnly => "load-only",
        };
        f.write_str(s)
    }
}

/// Options that shape the plan and the transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationOptions {
    /// Rows per chunk. Must be positive.
    pub chunk_size: usize,
    /// Drop and recreate tables that already exist.
    pub recreate: bool,
    /// Truncate tables that already exist. Ignored when `recreate` is set.
    pub truncate: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            recreate: false,
            truncate: false,
        }
    }
}

impl MigrationOptions {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(MigrateError::Config(
                "chunk_size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Action for one table given whether it already exists in the target.
    pub fn action_for(&self, exists_in_target: bool) -> TableAction {
        match (exists_in_target, self.recreate, self.truncate) {
            (false, _, _) => TableAction::Create,
            (true, true, _) => TableAction::Recreate,
            (true, false, true) => TableAction::TruncateThenLoad,
            (true, false, false) => TableAction::LoadOnly,
        }
    }
}

/// One planned table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedTable {
    pub name: String,
    pub action: TableAction,
    pub exists_in_target: bool,
}

/// Ordered plan for a run, in source discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub entries: Vec<PlannedTable>,
}

impl MigrationPlan {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Action planned for a table, if it is part of the plan.
    pub fn action_for(&self, table: &str) -> Option<TableAction> {
        self.entries
            .iter()
            .find(|e| e.name == table)
            .map(|e| e.action)
    }

    /// Source tables that already exist in the target.
    pub fn existing(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|e| e.exists_in_target)
            .map(|e| e.name.as_str())
    }

    /// Source tables missing from the target.
    pub fn missing(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|e| !e.exists_in_target)
            .map(|e| e.name.as_str())
    }
}

/// Diff the two listings and assign an action to every source table.
///
/// Target tables that do not exist in the source are ignored.
pub fn plan(
    source_tables: &[String],
    target_tables: &[String],
    options: &MigrationOptions,
) -> Result<MigrationPlan> {
    options.validate()?;

    let existing: HashSet<&str> = target_tables.iter().map(String::as_str).collect();
    let entries = source_tables
        .iter()
        .map(|name| {
            let exists_in_target = existing.contains(name.as_str());
            PlannedTable {
                name: name.clone(),
                action: options.action_for(exists_in_target),
                exists_in_target,
            }
        })
        .collect();

    Ok(MigrationPlan { entries })
}
