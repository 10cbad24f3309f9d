//! # Tablecache - entity persistence and caching engine
//!
//! Maps plain Rust entity types onto relational tables and keeps every loaded
//! instance in a per-type cache.
//!
//! Tablecache provides:
//! - A tabular data model (`DataTable`, `DataRow`, `DataField`) shared by all stores
//! - A `DataStore` abstraction with a SQLite implementation built on `rusqlite`
//! - Declarative field binding for scalars, contained objects, references and lists
//! - A per-type cache with auto-generated ids and deferred reference resolution
//! - Schema drift detection with automatic or step-based migration

pub mod cache;
pub mod config;
pub mod data;
pub mod entity;
pub mod persistence;
pub mod schema;
pub mod storage;
pub mod ui;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenient access
pub use cache::{CachedObject, LoadState, MigrationOutcome, PersistedClass, PersistentClass};
pub use config::PersistenceConfig;
pub use data::{CacheKey, DataField, DataRow, DataTable, DataType, Value};
pub use entity::{
    shared, Entity, EntityInfo, FieldInfo, FieldSet, MigrationInfo, MigrationStep, MigrationStepKind,
    Persistable, Shared,
};
pub use persistence::Persistence;
pub use schema::Schema;
pub use storage::{DataStore, DataStoreProvider, SqliteProvider, SqliteStore};

/// Result type alias for Tablecache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Tablecache operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("Store error: {operation} failed for {schema}.{table}")]
    Store {
        schema: String,
        table: String,
        operation: &'static str,
    },

    #[error("Entity {entity} has no id value")]
    MissingId { entity: String },
}

impl Error {
    pub(crate) fn store(schema: &str, table: &str, operation: &'static str) -> Self {
        Error::Store {
            schema: schema.to_string(),
            table: table.to_string(),
            operation,
        }
    }
}

/// Declaration problems detected while binding an entity type.
///
/// These are fatal for the offending type only; other types keep working.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid persisted class {entity}: {reason}")]
    InvalidClass { entity: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidClass {
            entity: entity.into(),
            reason: reason.into(),
        }
    }
}

/// Row-scoped data problems. The offending row is skipped, the batch goes on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataError {
    #[error("Null value for non-nullable field {field}")]
    NullValue { field: String },

    #[error("Cannot convert {from} to {to} for field {field}")]
    Conversion {
        field: String,
        from: DataType,
        to: DataType,
    },

    #[error("Unknown data type: {0}")]
    UnknownType(String),

    #[error("Field {field} is read only")]
    ReadOnly { field: String },

    #[error("Invalid data in {table}.{field}: {message}")]
    Invalid {
        table: String,
        field: String,
        message: String,
    },
}
