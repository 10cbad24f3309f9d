//! SQLite storage implementation

use super::sql::{DriverError, QueryRows, SqlConnection, SqlDialect, SqlStore};
use super::{DataStore, DataStoreProvider};
use crate::data::{DataType, Value};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const IN_MEMORY: &str = ":memory:";

pub(crate) fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(v) | Value::Enumeration(v) => SqlValue::Integer(i64::from(*v)),
        Value::Long(v) => SqlValue::Integer(*v),
        Value::Byte(v) => SqlValue::Integer(i64::from(*v)),
        Value::Boolean(v) => SqlValue::Integer(i64::from(*v)),
        Value::Float(v) => SqlValue::Real(f64::from(*v)),
        Value::Double(v) => SqlValue::Real(*v),
        Value::String(v) => SqlValue::Text(v.clone()),
        Value::Date(v) => SqlValue::Integer(v.timestamp()),
    }
}

pub(crate) fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Long(v),
        ValueRef::Real(v) => Value::Double(v),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

impl SqlConnection for Connection {
    fn query(&self, sql: &str, params: &[Value]) -> Result<QueryRows, DriverError> {
        let mut stmt = self.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut cursor = stmt.query(params_from_iter(params.iter().map(to_sql)))?;

        let mut rows = Vec::new();
        while let Some(row) = cursor.next()? {
            let values = (0..columns.len())
                .map(|i| row.get_ref(i).map(from_sql))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.push(values);
        }
        Ok(QueryRows { columns, rows })
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize, DriverError> {
        let mut stmt = self.prepare_cached(sql)?;
        Ok(stmt.execute(params_from_iter(params.iter().map(to_sql)))?)
    }

    fn execute_batch(&self, sql: &str) -> Result<(), DriverError> {
        Ok(Connection::execute_batch(self, sql)?)
    }

    fn close(self) -> Result<(), DriverError> {
        Connection::close(self).map_err(|(_, e)| e.into())
    }
}

/// SQLite flavour of SQL.
///
/// File databases live at `<data_dir>/<schema>.db`.
#[derive(Debug, Clone)]
pub struct SqliteDialect {
    data_dir: Option<PathBuf>,
}

impl SqliteDialect {
    pub fn file(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
        }
    }

    /// Private in-memory database per store (for testing)
    pub fn in_memory() -> Self {
        Self { data_dir: None }
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }
}

impl SqlDialect for SqliteDialect {
    type Connection = Connection;

    fn driver_name(&self) -> &str {
        "sqlite3"
    }

    fn driver_version(&self) -> &str {
        rusqlite::version()
    }

    fn connection_string(&self, schema: &str) -> String {
        match &self.data_dir {
            Some(dir) => dir.join(format!("{}.db", schema)).display().to_string(),
            None => IN_MEMORY.to_string(),
        }
    }

    fn master_table_name(&self) -> &str {
        "sqlite_master"
    }

    fn type_name(&self, data_type: DataType) -> Option<&'static str> {
        match data_type {
            DataType::Integer
            | DataType::Long
            | DataType::Byte
            | DataType::Boolean
            | DataType::Date
            | DataType::Enumeration => Some("INTEGER"),
            DataType::Float | DataType::Double => Some("REAL"),
            DataType::String => Some("TEXT"),
            DataType::Object | DataType::List | DataType::Null => None,
        }
    }

    fn type_from_name(&self, type_name: &str) -> DataType {
        match type_name.to_uppercase().as_str() {
            "INTEGER" => DataType::Long,
            "REAL" => DataType::Double,
            "TEXT" => DataType::String,
            _ => DataType::Null,
        }
    }

    fn table_info_sql(&self, table: &str) -> String {
        format!("PRAGMA table_info({})", super::statements::quote_ident(table))
    }

    fn open(&self, connection_string: &str) -> Result<Connection, DriverError> {
        if connection_string == IN_MEMORY {
            return Ok(Connection::open_in_memory()?);
        }
        if let Some(dir) = &self.data_dir {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
            }
        }
        Ok(Connection::open(connection_string)?)
    }
}

/// SQLite-backed store for one schema
pub type SqliteStore = SqlStore<SqliteDialect>;

impl SqliteStore {
    /// Store backed by `<data_dir>/<schema>.db`
    pub fn open_file(schema: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        SqlStore::new(schema, SqliteDialect::file(data_dir))
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory(schema: impl Into<String>) -> Self {
        SqlStore::new(schema, SqliteDialect::in_memory())
    }
}

/// Creates one SQLite store per schema.
#[derive(Debug, Clone)]
pub struct SqliteProvider {
    dialect: SqliteDialect,
}

impl SqliteProvider {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            dialect: SqliteDialect::file(data_dir),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            dialect: SqliteDialect::in_memory(),
        }
    }
}

impl DataStoreProvider for SqliteProvider {
    fn store_type(&self) -> &str {
        "sqlite"
    }

    fn create_store(&self, schema: &str) -> Arc<dyn DataStore> {
        Arc::new(SqlStore::new(schema, self.dialect.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataField, DataRow, DataTable, Value};

    fn plugin_table(rows: &[(&str, &str)]) -> DataTable {
        let mut table = DataTable::new("plugin");
        for (id, version) in rows {
            let mut row = DataRow::new();
            row.add(DataField::with_value("id", DataType::String, Value::from(*id)).id(true));
            row.add(DataField::with_value("version", DataType::String, Value::from(*version)));
            table.add_row(row);
        }
        table
    }

    fn plugin_header() -> DataTable {
        let mut table = DataTable::new("plugin");
        table.add_header_field(DataField::new("id", DataType::String).id(true));
        table.add_header_field(DataField::new("version", DataType::String));
        table
    }

    fn connected_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory("global");
        assert!(store.connect());
        store
    }

    fn load(store: &SqliteStore, name: &str) -> DataTable {
        let mut table = DataTable::new(name);
        assert!(store.load(&mut table));
        table
    }

    #[test]
    fn test_connect_is_idempotent() {
        let store = SqliteStore::open_in_memory("global");
        assert!(!store.is_connected());
        assert!(store.connect());
        assert!(store.connect());
        assert!(store.is_connected());
        store.disconnect();
        assert!(!store.is_connected());
    }

    #[test]
    fn test_operations_fail_when_disconnected() {
        let store = SqliteStore::open_in_memory("global");
        assert!(!store.create(&plugin_header()));
        assert!(!store.table_exists("plugin"));
        let mut table = DataTable::new("plugin");
        assert!(!store.load(&mut table));
    }

    #[test]
    fn test_create_and_introspect() {
        let store = connected_store();
        assert!(!store.table_exists("plugin"));
        assert!(store.create(&plugin_header()));
        assert!(store.table_exists("plugin"));
        assert_eq!(store.table_names(), vec!["plugin".to_string()]);

        let header = store.table_header("plugin").unwrap();
        let row = header.header().unwrap();
        assert_eq!(row.names().collect::<Vec<_>>(), vec!["id", "version"]);
        assert_eq!(row.get("id").unwrap().data_type(), DataType::String);
        assert_eq!(header.id_field_names(), &["id".to_string()]);
        assert!(store.table_header("missing").is_none());
    }

    #[test]
    fn test_create_rejects_empty_header() {
        let store = connected_store();
        let mut table = DataTable::new("empty");
        assert!(!store.create(&table));
        table.create_header();
        assert!(!store.create(&table));
    }

    #[test]
    fn test_save_upserts_by_id() {
        let store = connected_store();
        store.create(&plugin_header());
        assert!(store.save(&plugin_table(&[("core", "1.0"), ("extra", "0.1")])));
        assert!(store.save(&plugin_table(&[("core", "1.1")])));

        let loaded = load(&store, "plugin");
        assert_eq!(loaded.len(), 2);
        let core = loaded
            .rows()
            .iter()
            .find(|r| r.get("id").unwrap().value() == &Value::from("core"))
            .unwrap();
        assert_eq!(core.get("version").unwrap().value(), &Value::from("1.1"));
    }

    #[test]
    fn test_save_without_rows_clears() {
        let store = connected_store();
        store.create(&plugin_header());
        store.save(&plugin_table(&[("core", "1.0")]));
        assert!(store.save(&DataTable::new("plugin")));
        assert!(load(&store, "plugin").is_empty());
    }

    #[test]
    fn test_clear_rewrites_rows() {
        let store = connected_store();
        store.create(&plugin_header());
        store.save(&plugin_table(&[("core", "1.0"), ("extra", "0.1")]));
        assert!(store.clear(&plugin_table(&[("fresh", "2.0")])));

        let loaded = load(&store, "plugin");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.rows()[0].get("id").unwrap().value(), &Value::from("fresh"));
    }

    #[test]
    fn test_clear_ids() {
        let store = connected_store();
        store.create(&plugin_header());
        store.save(&plugin_table(&[("a", "1"), ("b", "1"), ("c", "1")]));

        assert!(store.clear_ids(&plugin_header(), &[]));
        assert!(store.clear_ids(&DataTable::new("plugin"), &[Value::from("a")]));
        assert_eq!(load(&store, "plugin").len(), 3);

        assert!(store.clear_ids(&plugin_header(), &[Value::from("a"), Value::from("c")]));
        let loaded = load(&store, "plugin");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.rows()[0].get("id").unwrap().value(), &Value::from("b"));
    }

    #[test]
    fn test_drop_missing_table_succeeds() {
        let store = connected_store();
        assert!(store.drop_table("nothing"));
        store.create(&plugin_header());
        assert!(store.drop_table("plugin"));
        assert!(!store.table_exists("plugin"));
    }

    #[test]
    fn test_value_encoding() {
        let store = connected_store();
        let mut header = DataTable::new("typed");
        header.add_header_field(DataField::new("id", DataType::Integer).id(true));
        header.add_header_field(DataField::new("flag", DataType::Boolean));
        header.add_header_field(DataField::new("ratio", DataType::Float));
        assert!(store.create(&header));

        let mut table = DataTable::new("typed");
        let mut row = DataRow::new();
        row.add(DataField::infer("id", 1).id(true));
        row.add(DataField::infer("flag", true));
        row.add(DataField::infer("ratio", 0.5f32));
        table.add_row(row);
        assert!(store.save(&table));

        let loaded = load(&store, "typed");
        let row = &loaded.rows()[0];
        assert_eq!(row.get("id").unwrap().value(), &Value::Long(1));
        assert_eq!(row.get("flag").unwrap().value(), &Value::Long(1));
        assert_eq!(
            row.get("flag").unwrap().value_as(DataType::Boolean),
            Some(Value::Boolean(true))
        );
        assert_eq!(row.get("ratio").unwrap().value(), &Value::Double(0.5));
    }

    #[test]
    fn test_execute_runs_batches() {
        let store = connected_store();
        store.create(&plugin_header());
        assert!(store.execute(
            "ALTER TABLE \"plugin\" ADD COLUMN \"extra\" INTEGER; UPDATE \"plugin\" SET \"extra\" = 1;"
        ));
        assert!(store.table_header("plugin").unwrap().header().unwrap().contains("extra"));
        assert!(!store.execute("THIS IS NOT SQL"));
    }

    #[test]
    fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let provider = SqliteProvider::new(dir.path().join("data"));
        assert_eq!(provider.store_type(), "sqlite");

        let first = provider.create_store("global");
        assert!(first.connect());
        first.create(&plugin_header());
        first.save(&plugin_table(&[("core", "1.0")]));
        first.disconnect();

        let second = provider.create_store("global");
        assert!(second.connect());
        let mut table = DataTable::new("plugin");
        assert!(second.load(&mut table));
        assert_eq!(table.len(), 1);
        assert!(dir.path().join("data").join("global.db").exists());
    }
}
