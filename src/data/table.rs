//! Tables

use super::row::{DataField, DataRow};

/// A named list of rows.
///
/// The first row doubles as the column catalog: stores create and write
/// exactly the columns it declares.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    name: String,
    rows: Vec<DataRow>,
    id_fields: Vec<String>,
}

impl DataTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
            id_fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a row and register its id columns.
    pub fn add_row(&mut self, row: DataRow) {
        for field in row.fields().iter().filter(|f| f.is_id()) {
            self.register_id(field.name());
        }
        self.rows.push(row);
    }

    /// Insert an empty header row if the table has none yet.
    pub fn create_header(&mut self) {
        if self.rows.is_empty() {
            self.rows.push(DataRow::new());
        }
    }

    /// Add a column to the header row.
    pub fn add_header_field(&mut self, field: DataField) -> bool {
        self.create_header();
        let is_id = field.is_id();
        let name = field.name().to_string();
        if !self.rows[0].add(field) {
            return false;
        }
        if is_id {
            self.register_id(&name);
        }
        true
    }

    pub fn header(&self) -> Option<&DataRow> {
        self.rows.first()
    }

    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<DataRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Id column names in registration order. The first one keys deletes.
    pub fn id_field_names(&self) -> &[String] {
        &self.id_fields
    }

    /// True when the header declares a column that `store` lacks.
    pub fn is_migration_required(&self, store: &DataTable) -> bool {
        match (self.header(), store.header()) {
            (Some(declared), Some(existing)) => declared.is_migration_required(existing),
            (Some(declared), None) => !declared.is_empty(),
            (None, _) => false,
        }
    }

    fn register_id(&mut self, name: &str) {
        if !self.id_fields.iter().any(|existing| existing == name) {
            self.id_fields.push(name.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataType;

    #[test]
    fn test_create_header_is_idempotent() {
        let mut table = DataTable::new("player");
        table.create_header();
        table.create_header();
        assert_eq!(table.len(), 1);
        assert!(table.header().unwrap().is_empty());
    }

    #[test]
    fn test_add_row_registers_ids_once() {
        let mut table = DataTable::new("player");
        for name in ["alice", "bob"] {
            let mut row = DataRow::new();
            row.add(DataField::infer("name", name).id(true));
            row.add(DataField::infer("level", 3));
            table.add_row(row);
        }

        assert_eq!(table.len(), 2);
        assert_eq!(table.id_field_names(), &["name".to_string()]);
    }

    #[test]
    fn test_header_fields() {
        let mut table = DataTable::new("EntityTags");
        assert!(table.add_header_field(DataField::new("EntityId", DataType::String).id(true)));
        assert!(table.add_header_field(DataField::new("tags", DataType::String).id(true)));
        assert!(!table.add_header_field(DataField::new("tags", DataType::String)));

        assert_eq!(table.id_field_names().len(), 2);
        assert_eq!(table.id_field_names()[0], "EntityId");
    }

    #[test]
    fn test_rejected_header_field_is_not_an_id() {
        let mut table = DataTable::new("player");
        assert!(table.add_header_field(DataField::new("name", DataType::String).id(true)));
        assert!(table.add_header_field(DataField::new("level", DataType::Integer)));
        assert!(!table.add_header_field(DataField::new("level", DataType::Integer).id(true)));

        assert_eq!(table.id_field_names(), &["name".to_string()]);
        assert!(!table.header().unwrap().get("level").unwrap().is_id());
    }

    #[test]
    fn test_table_migration_check() {
        let mut declared = DataTable::new("widget");
        declared.add_header_field(DataField::new("id", DataType::String).id(true));
        declared.add_header_field(DataField::new("extra", DataType::Integer));

        let mut existing = DataTable::new("widget");
        existing.add_header_field(DataField::new("id", DataType::String).id(true));
        assert!(declared.is_migration_required(&existing));

        existing.add_header_field(DataField::new("extra", DataType::Integer));
        assert!(!declared.is_migration_required(&existing));
        assert!(declared.is_migration_required(&DataTable::new("widget")));
    }
}
