//! Table validation and migration
//!
//! A table needs migration when its declared header names a column the
//! stored table lacks. Column types are never compared.

use crate::data::DataTable;
use crate::entity::{MigrationInfo, MigrationStep, MigrationStepKind};
use crate::storage::DataStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What validating a table did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationOutcome {
    /// The table did not exist and was created
    Created,
    /// The stored table already has every declared column
    Unchanged,
    /// Dropped and recreated; stored rows were discarded
    AutoMigrated,
    /// Migration steps ran and the table now matches
    Migrated,
    /// The table still differs and needs manual repair
    Failed,
}

/// Bring `declared`'s stored table in line with its header.
///
/// Store failures while creating are errors; anything that goes wrong while
/// migrating an existing table is logged and reported as `Failed`, leaving
/// the table untouched from that point on.
pub fn migrate_table(
    store: &dyn DataStore,
    entity: &str,
    declared: &DataTable,
    migration: Option<&MigrationInfo>,
    scripts: Option<&Path>,
) -> Result<MigrationOutcome> {
    let table = declared.name();
    if !store.table_exists(table) {
        if !store.create(declared) {
            return Err(Error::store(store.schema(), table, "create"));
        }
        return Ok(MigrationOutcome::Created);
    }

    let Some(existing) = store.table_header(table) else {
        log_migrate_error(store, entity, table, "the stored columns could not be read");
        return Ok(MigrationOutcome::Failed);
    };
    if !declared.is_migration_required(&existing) {
        return Ok(MigrationOutcome::Unchanged);
    }

    let Some(migration) = migration else {
        tracing::warn!(
            "Schema of {}.{} changed for entity {}: dropping and recreating the table, existing rows are discarded",
            store.schema(),
            table,
            entity
        );
        if !store.drop_table(table) || !store.create(declared) {
            return Err(Error::store(store.schema(), table, "auto-migrate"));
        }
        return Ok(MigrationOutcome::AutoMigrated);
    };

    for step in migration.steps() {
        if let Err(reason) = apply_step(store, declared, step, scripts) {
            log_migrate_error(store, entity, table, &format!("step {} failed: {}", step.id, reason));
            return Ok(MigrationOutcome::Failed);
        }
        tracing::info!("Applied migration step {} to {}.{}", step.id, store.schema(), table);
    }

    let migrated = store
        .table_header(table)
        .is_some_and(|existing| !declared.is_migration_required(&existing));
    if !migrated {
        log_migrate_error(store, entity, table, "columns are still missing after all migration steps");
        return Ok(MigrationOutcome::Failed);
    }
    Ok(MigrationOutcome::Migrated)
}

fn apply_step(
    store: &dyn DataStore,
    declared: &DataTable,
    step: &MigrationStep,
    scripts: Option<&Path>,
) -> std::result::Result<(), String> {
    match &step.kind {
        MigrationStepKind::Reset => {
            if store.drop_table(declared.name()) && store.create(declared) {
                Ok(())
            } else {
                Err("could not recreate table".to_string())
            }
        }
        MigrationStepKind::Statement(sql) => {
            if store.execute(sql) {
                Ok(())
            } else {
                Err("statement was rejected".to_string())
            }
        }
        MigrationStepKind::Script(name) => {
            let Some(dir) = scripts else {
                return Err(format!("no migration scripts directory configured for {}", name));
            };
            let path = dir.join(name);
            let sql = std::fs::read_to_string(&path).map_err(|e| format!("{}: {}", path.display(), e))?;
            if store.execute(&sql) {
                Ok(())
            } else {
                Err(format!("script {} was rejected", path.display()))
            }
        }
    }
}

fn log_migrate_error(store: &dyn DataStore, entity: &str, table: &str, reason: &str) {
    tracing::error!(
        "Can't migrate entity {}.{} ({}): {}. Please repair or delete the table {} manually",
        store.schema(),
        entity,
        table,
        reason,
        table
    );
}
