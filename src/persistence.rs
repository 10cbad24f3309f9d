//! The persistence facade
//!
//! `Persistence` is the registry every caller goes through. It binds entity
//! types on first use, groups them into schemas (one store per schema), and
//! forwards typed cache operations to the right `PersistentClass`.

use crate::cache::{PersistedClass, PersistentClass};
use crate::config::PersistenceConfig;
use crate::data::Value;
use crate::entity::{shared, Entity, Shared};
use crate::schema::Schema;
use crate::storage::DataStoreProvider;
use crate::Result;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::any::{Any, TypeId};
use std::sync::Arc;

struct ClassEntry {
    typed: Arc<dyn Any + Send + Sync>,
    erased: Arc<dyn PersistedClass>,
}

/// Registry of bound entity types and their schemas.
pub struct Persistence {
    provider: Arc<dyn DataStoreProvider>,
    config: PersistenceConfig,
    classes: DashMap<TypeId, ClassEntry>,
    schemas: DashMap<String, Arc<Schema>>,
    create_lock: Mutex<()>,
    load_gate: Mutex<()>,
}

impl Persistence {
    pub fn new(provider: Arc<dyn DataStoreProvider>) -> Self {
        Self::with_config(provider, PersistenceConfig::default())
    }

    pub fn with_config(provider: Arc<dyn DataStoreProvider>, config: PersistenceConfig) -> Self {
        tracing::debug!("Persistence using {} stores", provider.store_type());
        Self {
            provider,
            config,
            classes: DashMap::new(),
            schemas: DashMap::new(),
            create_lock: Mutex::new(()),
            load_gate: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    /// The bound class of `T`, binding it on first access.
    pub fn class<T: Entity>(&self) -> Result<Arc<PersistentClass<T>>> {
        if let Some(class) = self.typed::<T>() {
            return Ok(class);
        }
        let _guard = self.create_lock.lock();
        if let Some(class) = self.typed::<T>() {
            return Ok(class);
        }

        let info = T::entity_info();
        let schema = self.open_schema(info.schema());
        let class = PersistentClass::<T>::bind(schema.store().clone(), self.config.migration_scripts.clone())
            .inspect_err(|e| tracing::error!("{}", e))?;

        schema.add(class.clone());
        self.classes.insert(
            TypeId::of::<T>(),
            ClassEntry {
                typed: class.clone(),
                erased: class.clone(),
            },
        );
        tracing::debug!("Registered {}.{}", info.schema(), info.name());
        Ok(class)
    }

    fn typed<T: Entity>(&self) -> Option<Arc<PersistentClass<T>>> {
        let entry = self.classes.get(&TypeId::of::<T>())?;
        entry.typed.clone().downcast::<PersistentClass<T>>().ok()
    }

    /// Serializes top-level loads.
    pub(crate) fn load_gate(&self) -> MutexGuard<'_, ()> {
        self.load_gate.lock()
    }

    fn open_schema(&self, name: &str) -> Arc<Schema> {
        self.schemas
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!("Opening schema {}", name);
                Arc::new(Schema::new(name, self.provider.create_store(name)))
            })
            .value()
            .clone()
    }

    pub fn get<T: Entity>(&self, id: impl Into<Value>) -> Result<Option<Shared<T>>> {
        self.class::<T>()?.get(self, &id.into())
    }

    /// Instance of `T` whose object id is `target`.
    pub fn get_by_instance<T: Entity, U>(&self, target: &Shared<U>) -> Result<Option<Shared<T>>> {
        self.class::<T>()?.get_by_instance(self, target)
    }

    pub fn get_or_insert<T: Entity>(&self, id: impl Into<Value>, default: impl FnOnce() -> T) -> Result<Shared<T>> {
        self.class::<T>()?.get_or_insert(self, &id.into(), default)
    }

    pub fn get_all<T: Entity>(&self) -> Result<Vec<Shared<T>>> {
        self.class::<T>()?.get_all(self)
    }

    pub fn put<T: Entity>(&self, object: Shared<T>) -> Result<()> {
        self.class::<T>()?.put(self, object)
    }

    /// Wrap `value` in a handle and put it.
    pub fn insert<T: Entity>(&self, value: T) -> Result<Shared<T>> {
        let object = shared(value);
        self.put(object.clone())?;
        Ok(object)
    }

    pub fn put_all<T: Entity>(&self, objects: impl IntoIterator<Item = Shared<T>>) -> Result<usize> {
        self.class::<T>()?.put_all(self, objects)
    }

    pub fn remove<T: Entity>(&self, object: &Shared<T>) -> Result<bool> {
        self.class::<T>()?.remove(self, object)
    }

    /// Save every schema. Keeps going after a failure and returns the
    /// first error.
    pub fn save(&self) -> Result<usize> {
        let mut saved = 0;
        let mut first_error = None;
        for schema in self.schemas() {
            match schema.save() {
                Ok(count) => saved += count,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(saved),
        }
    }

    pub fn save_type<T: Entity>(&self) -> Result<usize> {
        self.class::<T>()?.save()
    }

    /// Drop every table of `T` and empty its cache.
    pub fn reset<T: Entity>(&self) -> Result<()> {
        self.class::<T>()?.reset()
    }

    pub fn schema(&self, name: &str) -> Option<Arc<Schema>> {
        self.schemas.get(name).map(|s| s.value().clone())
    }

    /// Open schemas, sorted by name.
    pub fn schemas(&self) -> Vec<Arc<Schema>> {
        let mut schemas: Vec<_> = self.schemas.iter().map(|s| s.value().clone()).collect();
        schemas.sort_by(|a, b| a.name().cmp(b.name()));
        schemas
    }

    /// Registered classes of every schema.
    pub fn classes(&self) -> Vec<Arc<dyn PersistedClass>> {
        self.classes.iter().map(|c| c.erased.clone()).collect()
    }

    pub fn disconnect(&self) {
        for schema in self.schemas() {
            schema.disconnect();
        }
    }

    /// Unload every cache. Unsaved changes are lost.
    pub fn clear(&self) {
        for class in self.classes() {
            class.clear();
        }
    }
}
