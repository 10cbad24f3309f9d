//! Side-table bindings for list fields
//!
//! A list field of `Table` lives in `Table<Field>`. Its first column holds the
//! owner's id and every column is part of the primary key, so one row exists
//! per distinct element of each owner's list.

use super::binding::{FieldBinding, Identity};
use super::context::{LoadContext, Resolve};
use super::fields::header_of;
use super::value::decode;
use super::{Entity, FieldInfo, Persistable, Shared};
use crate::data::{CacheKey, DataField, DataRow, DataTable, DataType, Value};
use crate::persistence::Persistence;
use crate::DataError;
use std::collections::HashMap;
use std::sync::Arc;

/// A bound list field stored outside the owner's row.
pub(crate) trait ListBinding<T>: Send + Sync {
    fn info(&self) -> &FieldInfo;

    fn table_name(&self) -> &str;

    /// Declared columns of the side table.
    fn header(&self) -> &DataTable;

    /// Append one row per element of `instance`'s list.
    fn save(&self, table: &mut DataTable, owner_id: &Value, instance: &T) -> Result<(), DataError>;

    /// Distribute the side table's rows over the loaded owners.
    fn load(&self, table: &DataTable, owners: &[(CacheKey, Shared<T>)], ctx: &mut LoadContext);
}

/// Naming shared by every list binding.
#[derive(Debug, Clone)]
pub(crate) struct ListShape {
    pub info: FieldInfo,
    pub table_name: String,
    pub owner_column: String,
    pub owner_type: DataType,
}

impl ListShape {
    fn owner_field(&self, owner_id: &Value) -> DataField {
        DataField::with_value(&self.owner_column, self.owner_type, owner_id.clone()).id(true)
    }

    fn header(&self, columns: impl FnOnce(&mut DataTable)) -> DataTable {
        let mut header = DataTable::new(&self.table_name);
        header.add_header_field(DataField::new(&self.owner_column, self.owner_type).id(true));
        columns(&mut header);
        header
    }

    /// Rows of `table` grouped by owner id, in stored order.
    fn group<'a>(&self, table: &'a DataTable) -> HashMap<CacheKey, Vec<&'a DataRow>> {
        let mut groups: HashMap<CacheKey, Vec<&DataRow>> = HashMap::new();
        for row in table.rows() {
            match row.get(&self.owner_column).and_then(|f| f.value().cache_key()) {
                Some(key) => groups.entry(key).or_default().push(row),
                None => tracing::warn!("Row of {} has no owner id, skipping", self.table_name),
            }
        }
        groups
    }

    fn skip(&self, index: usize, error: &DataError) {
        tracing::warn!("Skipping element {} of {}: {}", index, self.table_name, error);
    }
}

pub(crate) struct ScalarListBinding<T, V> {
    shape: ListShape,
    value_column: String,
    header: DataTable,
    get: fn(&T) -> &Vec<V>,
    get_mut: fn(&mut T) -> &mut Vec<V>,
}

impl<T, V: Persistable> ScalarListBinding<T, V> {
    pub fn new(shape: ListShape, value_column: String, get: fn(&T) -> &Vec<V>, get_mut: fn(&mut T) -> &mut Vec<V>) -> Self {
        let header = shape.header(|h| {
            h.add_header_field(DataField::new(&value_column, V::DATA_TYPE).id(true));
        });
        Self {
            shape,
            value_column,
            header,
            get,
            get_mut,
        }
    }
}

impl<T: Entity, V: Persistable> ListBinding<T> for ScalarListBinding<T, V> {
    fn info(&self) -> &FieldInfo {
        &self.shape.info
    }

    fn table_name(&self) -> &str {
        &self.shape.table_name
    }

    fn header(&self) -> &DataTable {
        &self.header
    }

    fn save(&self, table: &mut DataTable, owner_id: &Value, instance: &T) -> Result<(), DataError> {
        for value in (self.get)(instance) {
            let mut row = DataRow::new();
            row.add(self.shape.owner_field(owner_id));
            row.add(DataField::with_value(&self.value_column, V::DATA_TYPE, value.to_value()).id(true));
            table.add_row(row);
        }
        Ok(())
    }

    fn load(&self, table: &DataTable, owners: &[(CacheKey, Shared<T>)], _ctx: &mut LoadContext) {
        let groups = self.shape.group(table);
        for (key, owner) in owners {
            let mut values = Vec::new();
            for (index, row) in groups.get(key).into_iter().flatten().enumerate() {
                let value = row.get(&self.value_column).map(|f| f.value().clone()).unwrap_or_default();
                match decode::<V>(&self.value_column, &value) {
                    Ok(value) => values.push(value),
                    Err(e) => self.shape.skip(index, &e),
                }
            }
            *(self.get_mut)(&mut owner.write()) = values;
        }
    }
}

pub(crate) struct ContainedListBinding<T, U> {
    shape: ListShape,
    fields: Vec<Arc<dyn FieldBinding<U>>>,
    header: DataTable,
    get: fn(&T) -> &Vec<U>,
    get_mut: fn(&mut T) -> &mut Vec<U>,
}

impl<T, U: 'static> ContainedListBinding<T, U> {
    pub fn new(
        shape: ListShape,
        fields: Vec<Arc<dyn FieldBinding<U>>>,
        get: fn(&T) -> &Vec<U>,
        get_mut: fn(&mut T) -> &mut Vec<U>,
    ) -> Self {
        let element = header_of(&shape.table_name, &fields);
        let header = shape.header(|h| {
            for field in element.header().map(|r| r.fields()).unwrap_or_default() {
                h.add_header_field(field.clone());
            }
        });
        Self {
            shape,
            fields,
            header,
            get,
            get_mut,
        }
    }
}

impl<T: Entity, U: Entity> ListBinding<T> for ContainedListBinding<T, U> {
    fn info(&self) -> &FieldInfo {
        &self.shape.info
    }

    fn table_name(&self) -> &str {
        &self.shape.table_name
    }

    fn header(&self) -> &DataTable {
        &self.header
    }

    fn save(&self, table: &mut DataTable, owner_id: &Value, instance: &T) -> Result<(), DataError> {
        let mut rows = Vec::new();
        for element in (self.get)(instance) {
            let mut row = DataRow::new();
            row.add(self.shape.owner_field(owner_id));
            for field in &self.fields {
                field.save(&mut row, Some(element))?;
            }
            rows.push(row);
        }
        for row in rows {
            table.add_row(row);
        }
        Ok(())
    }

    fn load(&self, table: &DataTable, owners: &[(CacheKey, Shared<T>)], ctx: &mut LoadContext) {
        let groups = self.shape.group(table);
        for (key, owner) in owners {
            let mut elements = Vec::new();
            let mut pending: Vec<(usize, Resolve<U>)> = Vec::new();

            for (index, row) in groups.get(key).into_iter().flatten().enumerate() {
                let mut element = U::default();
                let mut deferred = Vec::new();
                let loaded = self
                    .fields
                    .iter()
                    .try_for_each(|f| f.load(row, &mut element, &mut deferred));
                match loaded {
                    Ok(()) => {
                        let position = elements.len();
                        pending.extend(deferred.into_iter().map(|r| (position, r)));
                        elements.push(element);
                    }
                    Err(e) => self.shape.skip(index, &e),
                }
            }
            *(self.get_mut)(&mut owner.write()) = elements;

            for (position, resolve) in pending {
                let owner = owner.clone();
                let get_mut = self.get_mut;
                ctx.defer(move |p: &Persistence, ctx: &mut LoadContext| {
                    let assign = resolve(p, ctx)?;
                    let mut guard = owner.write();
                    if let Some(element) = get_mut(&mut guard).get_mut(position) {
                        assign(element);
                    }
                    Ok(())
                });
            }
        }
    }
}

pub(crate) struct ReferenceListBinding<T, U> {
    shape: ListShape,
    column: String,
    target: Identity<U>,
    header: DataTable,
    get: fn(&T) -> &Vec<Shared<U>>,
    get_mut: fn(&mut T) -> &mut Vec<Shared<U>>,
}

impl<T, U: Entity> ReferenceListBinding<T, U> {
    pub fn new(
        shape: ListShape,
        column: String,
        target: Identity<U>,
        get: fn(&T) -> &Vec<Shared<U>>,
        get_mut: fn(&mut T) -> &mut Vec<Shared<U>>,
    ) -> Self {
        let header = shape.header(|h| {
            h.add_header_field(DataField::new(&column, target.data_type()).id(true));
        });
        Self {
            shape,
            column,
            target,
            header,
            get,
            get_mut,
        }
    }
}

impl<T: Entity, U: Entity> ListBinding<T> for ReferenceListBinding<T, U> {
    fn info(&self) -> &FieldInfo {
        &self.shape.info
    }

    fn table_name(&self) -> &str {
        &self.shape.table_name
    }

    fn header(&self) -> &DataTable {
        &self.header
    }

    fn save(&self, table: &mut DataTable, owner_id: &Value, instance: &T) -> Result<(), DataError> {
        let mut rows = Vec::new();
        for target in (self.get)(instance) {
            let id = self.target.id_of(target);
            if id.is_null() {
                return Err(DataError::Invalid {
                    table: self.shape.table_name.clone(),
                    field: self.column.clone(),
                    message: format!("referenced {} has no id", U::entity_info().name()),
                });
            }
            let mut row = DataRow::new();
            row.add(self.shape.owner_field(owner_id));
            row.add(DataField::with_value(&self.column, self.target.data_type(), id).id(true));
            rows.push(row);
        }
        for row in rows {
            table.add_row(row);
        }
        Ok(())
    }

    fn load(&self, table: &DataTable, owners: &[(CacheKey, Shared<T>)], ctx: &mut LoadContext) {
        let groups = self.shape.group(table);
        for (key, owner) in owners {
            let Some(rows) = groups.get(key) else {
                (self.get_mut)(&mut owner.write()).clear();
                continue;
            };
            let ids: Vec<Value> = rows
                .iter()
                .filter_map(|row| row.get(&self.column))
                .filter(|f| !f.is_null())
                .map(|f| f.value().clone())
                .collect();

            let owner = owner.clone();
            let get_mut = self.get_mut;
            let table_name = self.shape.table_name.clone();
            ctx.defer(move |p: &Persistence, ctx: &mut LoadContext| {
                let class = p.class::<U>()?;
                let mut targets = Vec::with_capacity(ids.len());
                for id in &ids {
                    match class.get_in(id, ctx)? {
                        Some(target) => targets.push(target),
                        None => tracing::warn!("Unresolved reference {} in {}, dropping it", id, table_name),
                    }
                }
                *get_mut(&mut owner.write()) = targets;
                Ok(())
            });
        }
    }
}
