//! Dialect-independent SQL store
//!
//! `SqlStore` owns the statement flow; each dialect brings its own driver
//! through `SqlDialect::Connection`.

use super::{statements, DataStore};
use crate::data::{DataField, DataRow, DataTable, DataType, Value};
use dashmap::DashSet;
use parking_lot::Mutex;
use std::sync::OnceLock;

/// Error raised by a dialect's driver.
pub type DriverError = Box<dyn std::error::Error + Send + Sync>;

/// Column names and values of a query result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryRows {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// One open driver connection.
///
/// Parameters are positional and bound in order.
pub trait SqlConnection: Send {
    fn query(&self, sql: &str, params: &[Value]) -> Result<QueryRows, DriverError>;

    /// Run one statement and return the number of affected rows.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize, DriverError>;

    /// Run a script of `;`-separated statements.
    fn execute_batch(&self, sql: &str) -> Result<(), DriverError>;

    fn close(self) -> Result<(), DriverError>
    where
        Self: Sized;
}

/// Hooks that differ between SQL engines.
pub trait SqlDialect: Send + Sync {
    type Connection: SqlConnection;

    fn driver_name(&self) -> &str;

    fn driver_version(&self) -> &str {
        "unknown"
    }

    /// Location handed to `open` for a schema.
    fn connection_string(&self, schema: &str) -> String;

    /// Catalog table listing the engine's tables.
    fn master_table_name(&self) -> &str;

    /// Column type for a data type; `None` declares the column untyped.
    fn type_name(&self, data_type: DataType) -> Option<&'static str>;

    fn type_from_name(&self, type_name: &str) -> DataType;

    /// Introspection query yielding `name`, `type` and `pk` columns.
    fn table_info_sql(&self, table: &str) -> String;

    /// Upsert statement for one row of `columns`.
    fn upsert_sql(&self, table: &str, columns: &[&str]) -> String {
        statements::insert_or_replace(table, columns)
    }

    fn open(&self, connection_string: &str) -> Result<Self::Connection, DriverError>;

    fn on_connect(&self, _conn: &Self::Connection) -> Result<(), DriverError> {
        Ok(())
    }
}

static DRIVERS: OnceLock<DashSet<String>> = OnceLock::new();

fn register_driver<D: SqlDialect>(dialect: &D) {
    let drivers = DRIVERS.get_or_init(DashSet::new);
    if drivers.insert(dialect.driver_name().to_string()) {
        tracing::info!(
            "Registered {} driver (engine {})",
            dialect.driver_name(),
            dialect.driver_version()
        );
    }
}

fn trace_sql(sql: &str) {
    tracing::trace!(target: "tablecache::sql", "{}", sql);
}

/// A driver error together with the statement that caused it.
struct Failure {
    statement: String,
    source: DriverError,
}

trait StatementContext<T> {
    fn statement(self, sql: &str) -> Result<T, Failure>;
}

impl<T> StatementContext<T> for Result<T, DriverError> {
    fn statement(self, sql: &str) -> Result<T, Failure> {
        self.map_err(|source| Failure {
            statement: sql.to_string(),
            source,
        })
    }
}

/// `DataStore` over any SQL dialect.
///
/// The connection is opened lazily by `connect` and kept until `disconnect`.
pub struct SqlStore<D: SqlDialect> {
    schema: String,
    dialect: D,
    conn: Mutex<Option<D::Connection>>,
}

impl<D: SqlDialect> SqlStore<D> {
    pub fn new(schema: impl Into<String>, dialect: D) -> Self {
        Self {
            schema: schema.into(),
            dialect,
            conn: Mutex::new(None),
        }
    }

    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    /// Run `f` on the open connection, logging any failure.
    fn run<R>(
        &self,
        operation: &str,
        table: &str,
        f: impl FnOnce(&D::Connection) -> Result<R, Failure>,
    ) -> Option<R> {
        let guard = self.conn.lock();
        let Some(conn) = guard.as_ref() else {
            tracing::warn!(
                "Cannot {} {}.{}: store is not connected",
                operation,
                self.schema,
                table
            );
            return None;
        };

        match f(conn) {
            Ok(result) => Some(result),
            Err(failure) => {
                tracing::warn!(
                    "Failed to {} {}.{}: {} (statement: {})",
                    operation,
                    self.schema,
                    table,
                    failure.source,
                    failure.statement
                );
                None
            }
        }
    }

    fn execute_sql(&self, operation: &str, table: &str, sql: &str) -> bool {
        self.run(operation, table, |conn| {
            trace_sql(sql);
            conn.execute(sql, &[]).statement(sql)
        })
        .is_some()
    }
}

impl<D: SqlDialect> DataStore for SqlStore<D> {
    fn schema(&self) -> &str {
        &self.schema
    }

    fn connect(&self) -> bool {
        let mut guard = self.conn.lock();
        if guard.is_some() {
            return true;
        }

        register_driver(&self.dialect);
        let location = self.dialect.connection_string(&self.schema);
        let opened = self.dialect.open(&location).and_then(|conn| {
            self.dialect.on_connect(&conn)?;
            Ok(conn)
        });

        match opened {
            Ok(conn) => {
                tracing::debug!("Connected schema {} to {}", self.schema, location);
                *guard = Some(conn);
                true
            }
            Err(e) => {
                tracing::error!("Failed to connect schema {} to {}: {}", self.schema, location, e);
                false
            }
        }
    }

    fn disconnect(&self) {
        if let Some(conn) = self.conn.lock().take() {
            if let Err(e) = conn.close() {
                tracing::warn!("Error closing connection for schema {}: {}", self.schema, e);
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.conn.lock().is_some()
    }

    fn table_exists(&self, table: &str) -> bool {
        let sql = statements::table_exists(self.dialect.master_table_name());
        self.run("check", table, |conn| {
            trace_sql(&sql);
            conn.query(&sql, &[Value::from(table)]).statement(&sql)
        })
        .is_some_and(|found| !found.rows.is_empty())
    }

    fn table_names(&self) -> Vec<String> {
        let sql = statements::table_names(self.dialect.master_table_name());
        self.run("list", "*", |conn| {
            trace_sql(&sql);
            conn.query(&sql, &[]).statement(&sql)
        })
        .map(|found| {
            found
                .rows
                .into_iter()
                .filter_map(|row| row.into_iter().next())
                .filter_map(|name| match name {
                    Value::String(name) => Some(name),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
    }

    fn create(&self, table: &DataTable) -> bool {
        let Some(header) = table.header().filter(|h| !h.is_empty()) else {
            tracing::warn!("Cannot create {}.{}: table has no fields", self.schema, table.name());
            return false;
        };

        let columns: Vec<(&str, Option<&str>)> = header
            .fields()
            .iter()
            .map(|f| (f.name(), self.dialect.type_name(f.data_type())))
            .collect();
        let sql = statements::create_table(table.name(), &columns, table.id_field_names());

        let created = self.execute_sql("create", table.name(), &sql);
        if created {
            tracing::info!("Created table {}.{}", self.schema, table.name());
        }
        created
    }

    fn load(&self, table: &mut DataTable) -> bool {
        let sql = statements::select_all(table.name());
        let found = self.run("load", table.name(), |conn| {
            trace_sql(&sql);
            conn.query(&sql, &[]).statement(&sql)
        });

        let Some(found) = found else {
            return false;
        };
        tracing::debug!("Loaded {} rows from {}.{}", found.rows.len(), self.schema, table.name());
        for values in found.rows {
            let mut row = DataRow::new();
            for (name, value) in found.columns.iter().zip(values) {
                row.add(DataField::infer(name.clone(), value));
            }
            table.add_row(row);
        }
        true
    }

    fn save(&self, table: &DataTable) -> bool {
        if table.is_empty() {
            return self.clear(table);
        }

        let columns: Vec<&str> = match table.header() {
            Some(header) => header.names().collect(),
            None => Vec::new(),
        };
        if columns.is_empty() {
            tracing::warn!("Cannot save {}.{}: table has no fields", self.schema, table.name());
            return false;
        }

        let sql = self.dialect.upsert_sql(table.name(), &columns);
        let written = self.run("save", table.name(), |conn| {
            trace_sql(&sql);
            let mut count = 0usize;
            for row in table.rows().iter().filter(|r| !r.is_empty()) {
                let values: Vec<Value> = columns
                    .iter()
                    .map(|c| row.get(c).map(|f| f.value().clone()).unwrap_or_default())
                    .collect();
                conn.execute(&sql, &values).statement(&sql)?;
                count += 1;
            }
            Ok(count)
        });

        match written {
            Some(count) => {
                tracing::debug!("Saved {} rows to {}.{}", count, self.schema, table.name());
                true
            }
            None => false,
        }
    }

    fn clear(&self, table: &DataTable) -> bool {
        let sql = statements::delete_all(table.name());
        if !self.execute_sql("clear", table.name(), &sql) {
            return false;
        }
        if table.rows().iter().any(|r| !r.is_empty()) {
            return self.save(table);
        }
        true
    }

    fn clear_ids(&self, table: &DataTable, ids: &[Value]) -> bool {
        if ids.is_empty() {
            return true;
        }
        let Some(column) = table.id_field_names().first() else {
            tracing::debug!("Table {}.{} has no id column, nothing to delete", self.schema, table.name());
            return true;
        };

        let sql = statements::delete_ids(table.name(), column, ids.len());
        let deleted = self.run("delete from", table.name(), |conn| {
            trace_sql(&sql);
            conn.execute(&sql, ids).statement(&sql)
        });

        match deleted {
            Some(count) => {
                tracing::debug!("Deleted {} rows from {}.{}", count, self.schema, table.name());
                true
            }
            None => false,
        }
    }

    fn drop_table(&self, table: &str) -> bool {
        if !self.table_exists(table) {
            return true;
        }
        let dropped = self.execute_sql("drop", table, &statements::drop_table(table));
        if dropped {
            tracing::info!("Dropped table {}.{}", self.schema, table);
        }
        dropped
    }

    fn table_header(&self, table: &str) -> Option<DataTable> {
        let sql = self.dialect.table_info_sql(table);
        let found = self.run("describe", table, |conn| {
            trace_sql(&sql);
            conn.query(&sql, &[]).statement(&sql)
        })?;
        let (Some(name_at), Some(type_at), Some(pk_at)) =
            (found.column("name"), found.column("type"), found.column("pk"))
        else {
            tracing::warn!("Unexpected catalog layout for {}.{}", self.schema, table);
            return None;
        };

        let mut header = DataTable::new(table);
        for row in &found.rows {
            let Some(Value::String(column)) = row.get(name_at) else {
                continue;
            };
            let data_type = match row.get(type_at) {
                Some(Value::String(type_name)) => self.dialect.type_from_name(type_name),
                _ => DataType::Null,
            };
            let is_key = row.get(pk_at).and_then(Value::as_i64).is_some_and(|pk| pk > 0);
            header.add_header_field(DataField::new(column.clone(), data_type).id(is_key));
        }
        if header.header().is_none_or(|h| h.is_empty()) {
            return None;
        }
        Some(header)
    }

    fn execute(&self, statement: &str) -> bool {
        self.run("execute on", "*", |conn| {
            trace_sql(statement);
            conn.execute_batch(statement).statement(statement)
        })
        .is_some()
    }
}
