//! Row bindings: fields stored in the owner's own row

use super::context::{Assign, LoadContext, Resolve};
use super::fields::header_of;
use super::value::decode;
use super::{Entity, FieldInfo, Persistable, Shared};
use crate::data::{CacheKey, DataField, DataRow, DataTable, DataType, Value};
use crate::persistence::Persistence;
use crate::DataError;
use std::sync::Arc;

/// A bound field occupying columns of the owner's row.
pub(crate) trait FieldBinding<T>: Send + Sync {
    fn info(&self) -> &FieldInfo;

    /// Stored column name (column prefix for contained objects).
    fn data_name(&self) -> &str;

    /// Column type. References report their target's id type.
    fn data_type(&self) -> DataType;

    fn is_reference(&self) -> bool {
        false
    }

    fn populate_header(&self, table: &mut DataTable);

    /// Write this field's columns. `None` writes nulls.
    fn save(&self, row: &mut DataRow, instance: Option<&T>) -> Result<(), DataError>;

    /// Read this field's columns. References are pushed to `deferred`.
    fn load(&self, row: &DataRow, instance: &mut T, deferred: &mut Vec<Resolve<T>>) -> Result<(), DataError>;

    /// Stored value of this field, with references followed to their id.
    fn id_value(&self, instance: &T) -> Value;

    /// Key identifying the instance by this field's declared value.
    fn declared_key(&self, instance: &T) -> Option<CacheKey> {
        self.id_value(instance).cache_key()
    }

    /// Overwrite the field, used for generated ids.
    fn assign(&self, _instance: &mut T, _value: &Value) -> Result<(), DataError> {
        Err(DataError::ReadOnly {
            field: self.data_name().to_string(),
        })
    }
}

/// How a referenced entity is identified.
pub(crate) struct Identity<U> {
    binding: Arc<dyn FieldBinding<U>>,
}

impl<U> Clone for Identity<U> {
    fn clone(&self) -> Self {
        Self {
            binding: self.binding.clone(),
        }
    }
}

impl<U: Entity> Identity<U> {
    pub fn new(binding: Arc<dyn FieldBinding<U>>) -> Self {
        Self { binding }
    }

    /// Id column name of `U`.
    pub fn data_name(&self) -> &str {
        self.binding.data_name()
    }

    pub fn data_type(&self) -> DataType {
        self.binding.data_type()
    }

    /// Concrete id of a live instance.
    pub fn id_of(&self, target: &Shared<U>) -> Value {
        let guard = target.read();
        self.binding.id_value(&guard)
    }
}

/// Address-based key of a live instance.
pub(crate) fn instance_key<U>(target: &Shared<U>) -> CacheKey {
    CacheKey::Instance(Arc::as_ptr(target) as *const () as usize)
}

pub(crate) struct ScalarBinding<T, V> {
    info: FieldInfo,
    data_name: String,
    id: bool,
    get: fn(&T) -> V,
    set: Option<fn(&mut T, V)>,
}

impl<T, V> ScalarBinding<T, V> {
    pub fn new(info: FieldInfo, data_name: String, id: bool, get: fn(&T) -> V, set: Option<fn(&mut T, V)>) -> Self {
        Self {
            info,
            data_name,
            id,
            get,
            set,
        }
    }
}

impl<T: Entity, V: Persistable> FieldBinding<T> for ScalarBinding<T, V> {
    fn info(&self) -> &FieldInfo {
        &self.info
    }

    fn data_name(&self) -> &str {
        &self.data_name
    }

    fn data_type(&self) -> DataType {
        V::DATA_TYPE
    }

    fn populate_header(&self, table: &mut DataTable) {
        table.add_header_field(
            DataField::new(&self.data_name, V::DATA_TYPE)
                .id(self.id)
                .autogenerated(self.info.is_autogenerated()),
        );
    }

    fn save(&self, row: &mut DataRow, instance: Option<&T>) -> Result<(), DataError> {
        let value = instance.map(|t| (self.get)(t).to_value()).unwrap_or_default();
        row.add(
            DataField::with_value(&self.data_name, V::DATA_TYPE, value)
                .id(self.id)
                .autogenerated(self.info.is_autogenerated()),
        );
        Ok(())
    }

    fn load(&self, row: &DataRow, instance: &mut T, _deferred: &mut Vec<Resolve<T>>) -> Result<(), DataError> {
        if self.info.is_read_only() {
            return Ok(());
        }
        let (Some(set), Some(field)) = (self.set, row.get(&self.data_name)) else {
            return Ok(());
        };
        set(instance, decode(&self.data_name, field.value())?);
        Ok(())
    }

    fn id_value(&self, instance: &T) -> Value {
        (self.get)(instance).to_value()
    }

    fn assign(&self, instance: &mut T, value: &Value) -> Result<(), DataError> {
        let Some(set) = self.set else {
            return Err(DataError::ReadOnly {
                field: self.data_name.clone(),
            });
        };
        set(instance, decode(&self.data_name, value)?);
        Ok(())
    }
}

pub(crate) struct ReferenceBinding<T, U> {
    info: FieldInfo,
    data_name: String,
    id: bool,
    target: Identity<U>,
    get: fn(&T) -> &Option<Shared<U>>,
    get_mut: fn(&mut T) -> &mut Option<Shared<U>>,
}

impl<T, U> ReferenceBinding<T, U> {
    pub fn new(
        info: FieldInfo,
        data_name: String,
        id: bool,
        target: Identity<U>,
        get: fn(&T) -> &Option<Shared<U>>,
        get_mut: fn(&mut T) -> &mut Option<Shared<U>>,
    ) -> Self {
        Self {
            info,
            data_name,
            id,
            target,
            get,
            get_mut,
        }
    }
}

impl<T: Entity, U: Entity> FieldBinding<T> for ReferenceBinding<T, U> {
    fn info(&self) -> &FieldInfo {
        &self.info
    }

    fn data_name(&self) -> &str {
        &self.data_name
    }

    fn data_type(&self) -> DataType {
        self.target.data_type()
    }

    fn is_reference(&self) -> bool {
        true
    }

    fn populate_header(&self, table: &mut DataTable) {
        table.add_header_field(DataField::new(&self.data_name, self.target.data_type()).id(self.id));
    }

    fn save(&self, row: &mut DataRow, instance: Option<&T>) -> Result<(), DataError> {
        let value = match instance {
            Some(t) => self.id_value(t),
            None => Value::Null,
        };
        row.add(DataField::with_value(&self.data_name, self.target.data_type(), value).id(self.id));
        Ok(())
    }

    fn load(&self, row: &DataRow, instance: &mut T, deferred: &mut Vec<Resolve<T>>) -> Result<(), DataError> {
        if self.info.is_read_only() {
            return Ok(());
        }
        let Some(field) = row.get(&self.data_name) else {
            return Ok(());
        };
        if field.is_null() {
            *(self.get_mut)(instance) = None;
            return Ok(());
        }

        let id = field.value().clone();
        let column = self.data_name.clone();
        let get_mut = self.get_mut;
        deferred.push(Box::new(move |p: &Persistence, ctx: &mut LoadContext| {
            let target = p.class::<U>()?.get_in(&id, ctx)?;
            if target.is_none() {
                tracing::warn!(
                    "Unresolved reference {} = {} to {}",
                    column,
                    id,
                    U::entity_info().name()
                );
            }
            let assign: Assign<T> = Box::new(move |t: &mut T| *get_mut(t) = target);
            Ok(assign)
        }));
        Ok(())
    }

    fn id_value(&self, instance: &T) -> Value {
        match (self.get)(instance) {
            Some(target) => self.target.id_of(target),
            None => Value::Null,
        }
    }

    fn declared_key(&self, instance: &T) -> Option<CacheKey> {
        (self.get)(instance).as_ref().map(instance_key)
    }
}

pub(crate) struct ContainedBinding<T, U> {
    info: FieldInfo,
    data_name: String,
    fields: Vec<Arc<dyn FieldBinding<U>>>,
    columns: Vec<String>,
    get: fn(&T) -> &Option<U>,
    get_mut: fn(&mut T) -> &mut Option<U>,
}

impl<T, U: 'static> ContainedBinding<T, U> {
    pub fn new(
        info: FieldInfo,
        data_name: String,
        fields: Vec<Arc<dyn FieldBinding<U>>>,
        get: fn(&T) -> &Option<U>,
        get_mut: fn(&mut T) -> &mut Option<U>,
    ) -> Self {
        let columns = header_of(&data_name, &fields)
            .header()
            .map(|h| h.names().map(String::from).collect())
            .unwrap_or_default();
        Self {
            info,
            data_name,
            fields,
            columns,
            get,
            get_mut,
        }
    }
}

impl<T: Entity, U: Entity> FieldBinding<T> for ContainedBinding<T, U> {
    fn info(&self) -> &FieldInfo {
        &self.info
    }

    fn data_name(&self) -> &str {
        &self.data_name
    }

    fn data_type(&self) -> DataType {
        DataType::Object
    }

    fn populate_header(&self, table: &mut DataTable) {
        for field in &self.fields {
            field.populate_header(table);
        }
    }

    fn save(&self, row: &mut DataRow, instance: Option<&T>) -> Result<(), DataError> {
        let inner = instance.and_then(|t| (self.get)(t).as_ref());
        for field in &self.fields {
            field.save(row, inner)?;
        }
        Ok(())
    }

    fn load(&self, row: &DataRow, instance: &mut T, deferred: &mut Vec<Resolve<T>>) -> Result<(), DataError> {
        if self.info.is_read_only() {
            return Ok(());
        }
        let present = self.columns.iter().any(|c| row.contains(c));
        let populated = self
            .columns
            .iter()
            .any(|c| row.get(c).is_some_and(|f| !f.is_null()));
        if !populated {
            if present {
                *(self.get_mut)(instance) = None;
            }
            return Ok(());
        }

        let mut inner = U::default();
        let mut inner_deferred = Vec::new();
        for field in &self.fields {
            field.load(row, &mut inner, &mut inner_deferred)?;
        }
        *(self.get_mut)(instance) = Some(inner);

        for resolve in inner_deferred {
            let get_mut = self.get_mut;
            deferred.push(Box::new(move |p: &Persistence, ctx: &mut LoadContext| {
                let assign = resolve(p, ctx)?;
                let lifted: Assign<T> = Box::new(move |t: &mut T| {
                    if let Some(inner) = get_mut(t).as_mut() {
                        assign(inner);
                    }
                });
                Ok(lifted)
            }));
        }
        Ok(())
    }

    fn id_value(&self, _instance: &T) -> Value {
        Value::Null
    }
}
