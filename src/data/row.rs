//! Fields and rows

use super::types::{DataType, Value};
use std::collections::HashMap;

/// A named, typed cell.
#[derive(Debug, Clone, PartialEq)]
pub struct DataField {
    name: String,
    data_type: DataType,
    value: Value,
    id: bool,
    autogenerated: bool,
}

impl DataField {
    /// Header field with no value.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            value: Value::Null,
            id: false,
            autogenerated: false,
        }
    }

    /// Field with a value, converted to `data_type` when possible.
    pub fn with_value(name: impl Into<String>, data_type: DataType, value: Value) -> Self {
        let value = value.coerce(data_type).unwrap_or(value);
        Self {
            value,
            ..Self::new(name, data_type)
        }
    }

    /// Field whose type is inferred from the value.
    pub fn infer(name: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        Self {
            data_type: value.data_type(),
            value,
            ..Self::new(name, DataType::Null)
        }
    }

    pub fn id(mut self, id: bool) -> Self {
        self.id = id;
        self
    }

    pub fn autogenerated(mut self, autogenerated: bool) -> Self {
        self.autogenerated = autogenerated;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn is_id(&self) -> bool {
        self.id
    }

    pub fn is_autogenerated(&self) -> bool {
        self.autogenerated
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    /// The value converted to `to`.
    pub fn value_as(&self, to: DataType) -> Option<Value> {
        self.value.coerce(to)
    }
}

/// Ordered fields with unique names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataRow {
    fields: Vec<DataField>,
    index: HashMap<String, usize>,
}

impl DataRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field. Empty and duplicate names are dropped with a warning;
    /// the first field of a given name wins.
    pub fn add(&mut self, field: DataField) -> bool {
        if field.name.is_empty() {
            tracing::warn!("Dropping data field with an empty name");
            return false;
        }
        if self.index.contains_key(&field.name) {
            tracing::warn!("Duplicate data field {}, keeping the first value", field.name);
            return false;
        }

        self.index.insert(field.name.clone(), self.fields.len());
        self.fields.push(field);
        true
    }

    pub fn get(&self, name: &str) -> Option<&DataField> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn fields(&self) -> &[DataField] {
        &self.fields
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True when any column of this row is missing from `store_header`.
    ///
    /// Only presence is compared. Type changes and extra store columns never
    /// trigger a migration.
    pub fn is_migration_required(&self, store_header: &DataRow) -> bool {
        self.names().any(|name| !store_header.contains(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_write_wins() {
        let mut row = DataRow::new();
        assert!(row.add(DataField::infer("name", "first")));
        assert!(!row.add(DataField::infer("name", "second")));
        assert!(!row.add(DataField::infer("", 1)));

        assert_eq!(row.len(), 1);
        assert_eq!(row.get("name").unwrap().value(), &Value::from("first"));
    }

    #[test]
    fn test_with_value_converts() {
        let field = DataField::with_value("count", DataType::Integer, Value::Long(9));
        assert_eq!(field.value(), &Value::Integer(9));
        assert_eq!(field.value_as(DataType::Long), Some(Value::Long(9)));
    }

    #[test]
    fn test_migration_check_is_presence_only() {
        let mut declared = DataRow::new();
        declared.add(DataField::new("id", DataType::String).id(true));
        declared.add(DataField::new("level", DataType::Integer));

        let mut store = DataRow::new();
        store.add(DataField::new("id", DataType::String));
        store.add(DataField::new("level", DataType::String));
        store.add(DataField::new("legacy", DataType::Long));
        assert!(!declared.is_migration_required(&store));

        declared.add(DataField::new("extra", DataType::Long));
        assert!(declared.is_migration_required(&store));
    }
}
