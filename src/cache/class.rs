//! Cache and load/save logic for one entity type

use super::migrate::{migrate_table, MigrationOutcome};
use super::{CachedObject, LoadState, PersistedClass};
use crate::data::{CacheKey, DataRow, DataTable, Value};
use crate::entity::binding::{instance_key, FieldBinding};
use crate::entity::context::{self, LoadContext};
use crate::entity::fields::{header_of, BindScope, Bound, OwnerId};
use crate::entity::lists::ListBinding;
use crate::entity::{shared, Entity, EntityInfo, FieldSet, MigrationInfo, Shared};
use crate::persistence::Persistence;
use crate::storage::DataStore;
use crate::{ConfigError, DataError, Error, Result};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Weak};

/// The bound, cached view of entity type `T`.
pub struct PersistentClass<T: Entity> {
    info: EntityInfo,
    store: Arc<dyn DataStore>,
    fields: Vec<Arc<dyn FieldBinding<T>>>,
    id: Option<Arc<dyn FieldBinding<T>>>,
    lists: Vec<Arc<dyn ListBinding<T>>>,
    header: DataTable,
    migration: Option<MigrationInfo>,
    scripts: Option<PathBuf>,
    state: RwLock<LoadState>,
    /// Keyed by the declared id (instance address for object ids)
    cache: DashMap<CacheKey, Arc<CachedObject<T>>>,
    /// Keyed by the stored id, references followed to their own id
    concrete: DashMap<CacheKey, Arc<CachedObject<T>>>,
    /// Stored ids awaiting deletion
    removed: DashMap<CacheKey, Value>,
    next_id: AtomicI64,
    dirty: AtomicBool,
    self_ref: Weak<Self>,
}

impl<T: Entity> PersistentClass<T> {
    /// Bind `T`'s declarations against `store`.
    pub(crate) fn bind(store: Arc<dyn DataStore>, scripts: Option<PathBuf>) -> std::result::Result<Arc<Self>, ConfigError> {
        let info = T::entity_info();
        let name = info.name().to_string();
        if !info.is_cached() {
            return Err(ConfigError::invalid(&name, "only cached entities can be persisted"));
        }
        if info.is_contained() {
            return Err(ConfigError::invalid(
                &name,
                "contained-only entities are stored inside their owner and have no table",
            ));
        }

        let set = FieldSet::<T>::of();
        if set.is_empty() {
            return Err(ConfigError::invalid(&name, "entity has no persisted fields"));
        }
        match set.infos().filter(|f| f.is_id()).count() {
            0 => return Err(ConfigError::invalid(&name, "entity has no id field")),
            1 => {}
            n => return Err(ConfigError::invalid(&name, format!("entity declares {} id fields", n))),
        }

        let root = BindScope::root(&name);
        let mut fields = Vec::new();
        let mut id = None;
        for spec in set.specs().iter().filter(|s| !s.is_list()) {
            match spec.bind(&root)? {
                Bound::Row(binding) => {
                    if binding.info().is_id() {
                        id = Some(binding.clone());
                    }
                    fields.push(binding);
                }
                Bound::List(_) => return Err(root.invalid("unexpected list binding")),
            }
        }

        let owner = id.as_ref().map(|b: &Arc<dyn FieldBinding<T>>| OwnerId {
            data_name: b.data_name().to_string(),
            data_type: b.data_type(),
        });
        let scope = root.with_owner(owner);
        let mut lists = Vec::new();
        for spec in set.specs().iter().filter(|s| s.is_list()) {
            match spec.bind(&scope)? {
                Bound::List(binding) => lists.push(binding),
                Bound::Row(_) => return Err(scope.invalid("unexpected row binding")),
            }
        }

        let header = header_of(&name, &fields);
        tracing::debug!(
            "Bound {}.{} with {} columns and {} list tables",
            info.schema(),
            name,
            header.header().map(|h| h.len()).unwrap_or(0),
            lists.len()
        );

        Ok(Arc::new_cyclic(|self_ref| Self {
            info,
            store,
            fields,
            id,
            lists,
            header,
            migration: T::migration(),
            scripts,
            state: RwLock::new(LoadState::Unloaded),
            cache: DashMap::new(),
            concrete: DashMap::new(),
            removed: DashMap::new(),
            next_id: AtomicI64::new(1),
            dirty: AtomicBool::new(false),
            self_ref: self_ref.clone(),
        }))
    }

    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    /// Load the type's tables unless already loaded. Holds the load gate
    /// for the whole load, including every type pulled in by references.
    pub fn ensure_loaded(&self, p: &Persistence) -> Result<()> {
        if self.load_state() == LoadState::Loaded {
            return Ok(());
        }
        let _gate = p.load_gate();
        if self.load_state() == LoadState::Loaded {
            return Ok(());
        }

        let mut ctx = LoadContext::new();
        let result = self.load_in(&mut ctx).and_then(|()| ctx.resolve(p).map(|_| ()));
        ctx.complete(result)
    }

    /// Load into an enclosing context. Already loading counts as loaded.
    pub fn ensure_loaded_in(&self, ctx: &mut LoadContext) -> Result<()> {
        if self.load_state() == LoadState::Unloaded {
            self.load_in(ctx)?;
        }
        Ok(())
    }

    fn load_in(&self, ctx: &mut LoadContext) -> Result<()> {
        *self.state.write() = LoadState::Loading;
        if let Some(me) = self.self_ref.upgrade() {
            ctx.track(me);
        }

        let schema = self.schema_name();
        let table_name = self.table_name();
        if !self.store.connect() {
            return Err(Error::store(schema, table_name, "connect"));
        }
        self.validate_tables()?;

        let mut table = DataTable::new(table_name);
        if !self.store.load(&mut table) {
            return Err(Error::store(schema, table_name, "load"));
        }

        let auto_id = self.id.as_ref().is_some_and(|id| id.info().is_autogenerated());
        let reference_id = self.id.as_ref().is_some_and(|id| id.is_reference());
        let mut owners = Vec::with_capacity(table.len());

        for (index, row) in table.rows().iter().enumerate() {
            let mut instance = T::default();
            let mut deferred = Vec::new();
            if let Err(e) = self
                .fields
                .iter()
                .try_for_each(|f| f.load(row, &mut instance, &mut deferred))
            {
                tracing::warn!("Skipping row {} of {}.{}: {}", index, schema, table_name, e);
                continue;
            }

            let stored_id = self.stored_id(row);
            if auto_id {
                if let Some(id) = stored_id.as_i64() {
                    self.next_id.fetch_max(id + 1, Ordering::SeqCst);
                }
            }

            let object = shared(instance);
            if let Err(e) = self.add_to_cache(object.clone(), Some(stored_id.clone())) {
                tracing::warn!("Skipping row {} of {}.{}: {}", index, schema, table_name, e);
                continue;
            }

            if !deferred.is_empty() {
                let target = object.clone();
                let me = self.self_ref.clone();
                ctx.defer(move |p: &Persistence, ctx: &mut LoadContext| {
                    let mut assigns = Vec::with_capacity(deferred.len());
                    for resolve in deferred {
                        assigns.push(resolve(p, ctx)?);
                    }
                    {
                        let mut guard = target.write();
                        for assign in assigns {
                            assign(&mut guard);
                        }
                    }
                    if reference_id {
                        if let Some(me) = me.upgrade() {
                            me.recache(&target);
                        }
                    }
                    Ok(())
                });
            }

            if let Some(key) = stored_id.cache_key() {
                owners.push((key, object));
            }
        }

        for list in &self.lists {
            let mut rows = DataTable::new(list.table_name());
            if !self.store.load(&mut rows) {
                return Err(Error::store(schema, list.table_name(), "load"));
            }
            list.load(&rows, &owners, ctx);
        }

        tracing::debug!(
            "Loaded {} {} instances from {}",
            owners.len(),
            table_name,
            schema
        );
        Ok(())
    }

    fn validate_tables(&self) -> Result<()> {
        let outcome = migrate_table(
            self.store.as_ref(),
            self.table_name(),
            &self.header,
            self.migration.as_ref(),
            self.scripts.as_deref(),
        )?;
        if outcome != MigrationOutcome::Unchanged {
            tracing::debug!("Table {}.{}: {:?}", self.schema_name(), self.table_name(), outcome);
        }
        for list in &self.lists {
            migrate_table(self.store.as_ref(), self.table_name(), list.header(), None, None)?;
        }
        Ok(())
    }

    fn stored_id(&self, row: &DataRow) -> Value {
        self.id
            .as_ref()
            .and_then(|id| row.get(id.data_name()))
            .map(|f| f.value().clone())
            .unwrap_or_default()
    }

    /// Declared and stored keys of a live instance. An unassigned auto id
    /// has neither.
    fn keys_of(&self, object: &Shared<T>) -> (Option<CacheKey>, Option<CacheKey>) {
        let Some(id) = &self.id else {
            return (None, None);
        };
        let guard = object.read();
        let value = id.id_value(&guard);
        if id.info().is_autogenerated() && value.as_i64().is_none_or(|v| v <= 0) {
            return (None, None);
        }
        (id.declared_key(&guard), value.cache_key())
    }

    fn add_to_cache(&self, object: Shared<T>, stored: Option<Value>) -> Result<Arc<CachedObject<T>>> {
        let Some(id) = &self.id else {
            return Err(Error::MissingId {
                entity: self.table_name().to_string(),
            });
        };

        let mut generated = false;
        if id.info().is_autogenerated() {
            let current = id.id_value(&object.read());
            match current.as_i64() {
                Some(v) if v > 0 => {
                    self.next_id.fetch_max(v + 1, Ordering::SeqCst);
                }
                _ => {
                    let next = self.next_id.fetch_add(1, Ordering::SeqCst);
                    id.assign(&mut object.write(), &Value::Long(next))?;
                    generated = true;
                }
            }
        }

        let (declared, concrete) = {
            let guard = object.read();
            let stored = match stored {
                Some(value) if !generated => value,
                _ => id.id_value(&guard),
            };
            (id.declared_key(&guard), stored.cache_key())
        };
        if declared.is_none() && concrete.is_none() {
            return Err(Error::MissingId {
                entity: self.table_name().to_string(),
            });
        }

        let entry = Arc::new(CachedObject::new(object));
        if generated {
            entry.set_dirty();
            self.dirty.store(true, Ordering::SeqCst);
        }
        if let Some(key) = declared {
            self.removed.remove(&key);
            self.cache.insert(key, entry.clone());
        }
        if let Some(key) = concrete {
            self.removed.remove(&key);
            self.concrete.insert(key, entry.clone());
        }
        Ok(entry)
    }

    /// Index an instance under its declared key once its references are set.
    pub(crate) fn recache(&self, object: &Shared<T>) {
        let (declared, concrete) = self.keys_of(object);
        let entry = concrete
            .as_ref()
            .and_then(|k| self.concrete.get(k).map(|e| e.value().clone()));
        let (Some(entry), Some(declared)) = (entry, declared) else {
            return;
        };
        if Arc::ptr_eq(&entry.object(), object) {
            self.cache.insert(declared, entry);
        }
    }

    fn lookup(&self, id: &Value) -> Option<Shared<T>> {
        let key = id.cache_key()?;
        self.concrete
            .get(&key)
            .map(|e| e.object())
            .or_else(|| self.cache.get(&key).map(|e| e.object()))
    }

    /// Instance with stored id `id`.
    pub fn get(&self, p: &Persistence, id: &Value) -> Result<Option<Shared<T>>> {
        self.ensure_loaded(p)?;
        Ok(self.lookup(id))
    }

    /// Like `get`, inside a running load.
    pub fn get_in(&self, id: &Value, ctx: &mut LoadContext) -> Result<Option<Shared<T>>> {
        self.ensure_loaded_in(ctx)?;
        Ok(self.lookup(id))
    }

    /// Instance under a declared key, e.g. the address key of an object id.
    pub fn get_by_key(&self, p: &Persistence, key: &CacheKey) -> Result<Option<Shared<T>>> {
        self.ensure_loaded(p)?;
        Ok(self.cache.get(key).map(|e| e.object()))
    }

    /// Instance whose object id is `target`.
    pub fn get_by_instance<U>(&self, p: &Persistence, target: &Shared<U>) -> Result<Option<Shared<T>>> {
        self.get_by_key(p, &instance_key(target))
    }

    /// Instance with id `id`, created from `default` and cached when absent.
    pub fn get_or_insert(&self, p: &Persistence, id: &Value, default: impl FnOnce() -> T) -> Result<Shared<T>> {
        if let Some(found) = self.get(p, id)? {
            return Ok(found);
        }
        let mut value = default();
        if let Some(binding) = self.id.as_ref().filter(|b| !b.is_reference()) {
            binding.assign(&mut value, id)?;
        }
        let object = shared(value);
        self.put(p, object.clone())?;
        Ok(object)
    }

    pub fn get_all(&self, p: &Persistence) -> Result<Vec<Shared<T>>> {
        self.ensure_loaded(p)?;
        Ok(self.entries().into_iter().map(|e| e.object()).collect())
    }

    /// Cache `object` and mark it for saving. An instance with the same id
    /// is replaced.
    pub fn put(&self, p: &Persistence, object: Shared<T>) -> Result<()> {
        self.ensure_loaded(p)?;
        let (declared, concrete) = self.keys_of(&object);
        let existing = declared
            .as_ref()
            .and_then(|k| self.cache.get(k).map(|e| e.value().clone()))
            .or_else(|| concrete.as_ref().and_then(|k| self.concrete.get(k).map(|e| e.value().clone())));

        match existing {
            Some(entry) => {
                entry.set_object(object);
                entry.set_cached(true);
                if let Some(key) = declared {
                    self.removed.remove(&key);
                    self.cache.insert(key, entry.clone());
                }
                if let Some(key) = concrete {
                    self.removed.remove(&key);
                    self.concrete.insert(key, entry);
                }
            }
            None => {
                self.add_to_cache(object, None)?.set_dirty();
            }
        }
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn put_all(&self, p: &Persistence, objects: impl IntoIterator<Item = Shared<T>>) -> Result<usize> {
        let mut count = 0;
        for object in objects {
            self.put(p, object)?;
            count += 1;
        }
        Ok(count)
    }

    /// Evict `object` and delete its rows on the next save. Returns false
    /// when it was not cached.
    pub fn remove(&self, p: &Persistence, object: &Shared<T>) -> Result<bool> {
        self.ensure_loaded(p)?;
        let (declared, concrete) = self.keys_of(object);
        let stored = self
            .id
            .as_ref()
            .map(|id| id.id_value(&object.read()))
            .unwrap_or_default();

        let mut evicted = None;
        if let Some(key) = &declared {
            evicted = self.cache.remove(key).map(|(_, e)| e);
        }
        if let Some(key) = &concrete {
            evicted = self.concrete.remove(key).map(|(_, e)| e).or(evicted);
        }
        let Some(entry) = evicted else {
            return Ok(false);
        };
        entry.set_cached(false);

        if let Some(key) = concrete {
            self.removed.insert(key, stored);
        }
        self.dirty.store(true, Ordering::SeqCst);
        Ok(true)
    }

    /// Distinct cache entries.
    fn entries(&self) -> Vec<Arc<CachedObject<T>>> {
        let mut seen = HashSet::new();
        self.concrete
            .iter()
            .chain(self.cache.iter())
            .filter(|e| seen.insert(Arc::as_ptr(e.value()) as usize))
            .map(|e| e.value().clone())
            .collect()
    }

    /// Main row, stored id and list rows of one instance. Nothing is
    /// returned unless every field and list element converts.
    fn rows_of(&self, instance: &T) -> std::result::Result<(DataRow, Value, Vec<DataTable>), DataError> {
        let mut row = DataRow::new();
        for field in &self.fields {
            field.save(&mut row, Some(instance))?;
        }
        let id = self.id.as_ref().map(|id| id.id_value(instance)).unwrap_or_default();

        let mut lists = Vec::with_capacity(self.lists.len());
        for list in &self.lists {
            let mut rows = DataTable::new(list.table_name());
            list.save(&mut rows, &id, instance)?;
            lists.push(rows);
        }
        Ok((row, id, lists))
    }

    fn flush(&self) -> Result<usize> {
        let schema = self.schema_name();
        let table_name = self.table_name();
        if !self.store.connect() {
            return Err(Error::store(schema, table_name, "connect"));
        }

        let removed: Vec<(CacheKey, Value)> = self
            .removed
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        if !removed.is_empty() {
            let ids: Vec<Value> = removed.iter().map(|(_, v)| v.clone()).collect();
            if !self.store.clear_ids(&self.header, &ids) {
                return Err(Error::store(schema, table_name, "delete"));
            }
            for list in &self.lists {
                if !self.store.clear_ids(list.header(), &ids) {
                    return Err(Error::store(schema, list.table_name(), "delete"));
                }
            }
            for (key, _) in &removed {
                self.removed.remove(key);
            }
            tracing::debug!("Deleted {} rows from {}.{}", ids.len(), schema, table_name);
        }

        let mut table = DataTable::new(table_name);
        let mut list_rows: Vec<DataTable> = self.lists.iter().map(|l| DataTable::new(l.table_name())).collect();
        let mut saved = Vec::new();
        for entry in self.entries().into_iter().filter(|e| e.is_dirty()) {
            let object = entry.object();
            let written = self.rows_of(&object.read());
            match written {
                Ok((row, id, lists)) => {
                    table.add_row(row);
                    for (rows, owned) in list_rows.iter_mut().zip(lists) {
                        for row in owned.into_rows() {
                            rows.add_row(row);
                        }
                    }
                    saved.push((entry, id));
                }
                Err(e) => {
                    tracing::warn!("Not saving an instance of {}.{}: {}", schema, table_name, e);
                    self.dirty.store(true, Ordering::SeqCst);
                }
            }
        }
        if saved.is_empty() {
            return Ok(0);
        }
        if !self.store.save(&table) {
            return Err(Error::store(schema, table_name, "save"));
        }

        let owner_ids: Vec<Value> = saved.iter().map(|(_, id)| id.clone()).collect();
        for (list, rows) in self.lists.iter().zip(&list_rows) {
            if !self.store.clear_ids(list.header(), &owner_ids) {
                return Err(Error::store(schema, list.table_name(), "clear"));
            }
            if !rows.is_empty() && !self.store.save(rows) {
                return Err(Error::store(schema, list.table_name(), "save"));
            }
        }

        for (entry, _) in &saved {
            entry.set_saved();
        }
        tracing::debug!("Saved {} {} instances to {}", saved.len(), table_name, schema);
        Ok(saved.len())
    }
}

impl<T: Entity> PersistedClass for PersistentClass<T> {
    fn entity_info(&self) -> &EntityInfo {
        &self.info
    }

    fn list_table_names(&self) -> Vec<String> {
        self.lists.iter().map(|l| l.table_name().to_string()).collect()
    }

    fn header(&self) -> &DataTable {
        &self.header
    }

    fn load_state(&self) -> LoadState {
        *self.state.read()
    }

    fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst) || !self.removed.is_empty()
    }

    fn cached_count(&self) -> usize {
        self.entries().len()
    }

    fn save(&self) -> Result<usize> {
        if self.load_state() != LoadState::Loaded {
            return Ok(0);
        }
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(0);
        }
        let result = self.flush();
        if result.is_err() {
            self.dirty.store(true, Ordering::SeqCst);
        }
        result
    }

    fn reset(&self) -> Result<()> {
        let schema = self.schema_name();
        if !self.store.connect() {
            return Err(Error::store(schema, self.table_name(), "connect"));
        }
        let tables = std::iter::once(self.table_name().to_string()).chain(self.list_table_names());
        for table in tables {
            if !self.store.drop_table(&table) {
                return Err(Error::store(schema, &table, "drop"));
            }
        }
        self.clear();
        tracing::info!("Reset {}.{}", schema, self.table_name());
        Ok(())
    }

    fn clear(&self) {
        self.cache.clear();
        self.concrete.clear();
        self.removed.clear();
        self.next_id.store(1, Ordering::SeqCst);
        self.dirty.store(false, Ordering::SeqCst);
        *self.state.write() = LoadState::Unloaded;
    }
}

impl<T: Entity> context::LoadTracked for PersistentClass<T> {
    fn table_name(&self) -> &str {
        self.info.name()
    }

    fn finish_load(&self) {
        *self.state.write() = LoadState::Loaded;
    }

    fn abort_load(&self) {
        PersistedClass::clear(self);
    }
}
