//! Storage Layer - table-shaped persistence backends
//!
//! Every backend implements `DataStore`, a narrow table-level contract:
//! create/drop/introspect tables, load a whole table, upsert rows, and delete
//! all rows or rows by id. Failures never propagate out of a store; they are
//! logged together with the offending statement and reported as `false`.
//!
//! SQL backends share one implementation (`SqlStore`) parameterized by an
//! `SqlDialect`.

pub mod sql;
pub mod sqlite;
pub mod statements;

pub use sql::{DriverError, QueryRows, SqlConnection, SqlDialect, SqlStore};
pub use sqlite::{SqliteDialect, SqliteProvider, SqliteStore};

use crate::data::{DataTable, Value};
use std::sync::Arc;

/// A schema-scoped table store.
pub trait DataStore: Send + Sync {
    /// Schema (database) this store serves.
    fn schema(&self) -> &str;

    /// Open the connection if it is not open yet. Idempotent.
    fn connect(&self) -> bool;

    fn disconnect(&self);

    fn is_connected(&self) -> bool;

    fn table_exists(&self, table: &str) -> bool;

    /// Names of all user tables, sorted.
    fn table_names(&self) -> Vec<String>;

    /// Create a table from the header row, keyed by its id columns.
    fn create(&self, table: &DataTable) -> bool;

    /// Append every stored row to `table`.
    fn load(&self, table: &mut DataTable) -> bool;

    /// Upsert every row. A table without rows is cleared instead.
    fn save(&self, table: &DataTable) -> bool;

    /// Delete every stored row, then write the rows held by `table`.
    fn clear(&self, table: &DataTable) -> bool;

    /// Delete the rows whose first id column is in `ids`.
    fn clear_ids(&self, table: &DataTable, ids: &[Value]) -> bool;

    /// Drop a table. Dropping a missing table succeeds.
    fn drop_table(&self, table: &str) -> bool;

    /// Column catalog of an existing table as a one-row header. `None` when
    /// the catalog cannot be read or the table has no columns.
    fn table_header(&self, table: &str) -> Option<DataTable>;

    /// Run a raw statement (or script) against the store.
    fn execute(&self, statement: &str) -> bool;
}

/// Factory for schema stores of one backend type.
pub trait DataStoreProvider: Send + Sync {
    fn store_type(&self) -> &str;

    fn create_store(&self, schema: &str) -> Arc<dyn DataStore>;
}
