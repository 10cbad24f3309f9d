//! Schemas: entity types sharing one store

use crate::cache::PersistedClass;
use crate::storage::DataStore;
use crate::Result;
use dashmap::DashMap;
use std::sync::Arc;

/// A named database and the entity types stored in it.
pub struct Schema {
    name: String,
    store: Arc<dyn DataStore>,
    classes: DashMap<String, Arc<dyn PersistedClass>>,
}

impl Schema {
    pub fn new(name: impl Into<String>, store: Arc<dyn DataStore>) -> Self {
        Self {
            name: name.into(),
            store,
            classes: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    pub(crate) fn add(&self, class: Arc<dyn PersistedClass>) {
        self.classes.insert(class.table_name().to_string(), class);
    }

    /// Class stored in `table`.
    pub fn class(&self, table: &str) -> Option<Arc<dyn PersistedClass>> {
        self.classes.get(table).map(|c| c.value().clone())
    }

    /// Registered classes, sorted by table name.
    pub fn classes(&self) -> Vec<Arc<dyn PersistedClass>> {
        let mut classes: Vec<_> = self.classes.iter().map(|c| c.value().clone()).collect();
        classes.sort_by(|a, b| a.table_name().cmp(b.table_name()));
        classes
    }

    /// Main and list tables of every registered class, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .classes
            .iter()
            .flat_map(|c| std::iter::once(c.table_name().to_string()).chain(c.list_table_names()))
            .collect();
        names.sort();
        names
    }

    /// Save every class. Keeps going after a failure and returns the first
    /// error.
    pub fn save(&self) -> Result<usize> {
        let mut saved = 0;
        let mut first_error = None;
        for class in self.classes() {
            match class.save() {
                Ok(count) => saved += count,
                Err(e) => {
                    tracing::error!("Failed to save {}.{}: {}", self.name, class.table_name(), e);
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(saved),
        }
    }

    pub fn disconnect(&self) {
        self.store.disconnect();
        tracing::debug!("Disconnected schema {}", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{SqliteProvider, DataStoreProvider};
    use crate::testing::{Note, Player};
    use crate::Persistence;

    #[test]
    fn test_schema_tracks_classes() {
        let p = Persistence::new(Arc::new(SqliteProvider::in_memory()));
        p.class::<Player>().unwrap();
        p.class::<Note>().unwrap();

        let schema = p.schema("test").unwrap();
        assert_eq!(schema.name(), "test");
        assert_eq!(schema.table_names(), vec!["Note".to_string(), "player".to_string()]);
        assert!(schema.class("player").is_some());
        assert!(schema.class("missing").is_none());
    }

    #[test]
    fn test_empty_schema_saves_nothing() {
        let store = SqliteProvider::in_memory().create_store("empty");
        let schema = Schema::new("empty", store);
        assert_eq!(schema.save().unwrap(), 0);
        assert!(schema.classes().is_empty());
    }
}
