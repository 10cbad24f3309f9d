//! Per-type object caches
//!
//! Every entity type gets one `PersistentClass`, which owns:
//! - the bound row and side-table bindings
//! - the instance cache, keyed both by declared id and by concrete id
//! - pending deletes and the auto-id counter
//! - the `Unloaded -> Loading -> Loaded` state of the type's tables

pub mod class;
pub mod migrate;

pub use class::PersistentClass;
pub use migrate::MigrationOutcome;

use crate::data::DataTable;
use crate::entity::{EntityInfo, Shared};
use crate::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// Load progress of one entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Unloaded => "unloaded",
            LoadState::Loading => "loading",
            LoadState::Loaded => "loaded",
        }
    }
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Cache entry wrapping one live instance.
pub struct CachedObject<T> {
    object: RwLock<Shared<T>>,
    dirty: AtomicBool,
    cached: AtomicBool,
    touched: AtomicI64,
}

impl<T> CachedObject<T> {
    pub fn new(object: Shared<T>) -> Self {
        Self {
            object: RwLock::new(object),
            dirty: AtomicBool::new(false),
            cached: AtomicBool::new(true),
            touched: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    pub fn object(&self) -> Shared<T> {
        self.touch();
        self.object.read().clone()
    }

    /// Replace the instance and mark the entry dirty.
    pub fn set_object(&self, object: Shared<T>) {
        *self.object.write() = object;
        self.dirty.store(true, Ordering::SeqCst);
        self.touch();
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn set_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub fn set_saved(&self) {
        self.dirty.store(false, Ordering::SeqCst);
        self.touch();
    }

    pub fn is_cached(&self) -> bool {
        self.cached.load(Ordering::SeqCst)
    }

    pub fn set_cached(&self, cached: bool) {
        self.cached.store(cached, Ordering::SeqCst);
    }

    /// Last time the entry was read or written.
    pub fn cache_time(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.touched.load(Ordering::SeqCst)).unwrap_or_default()
    }

    fn touch(&self) {
        self.touched.store(Utc::now().timestamp_millis(), Ordering::SeqCst);
    }
}

/// Type-erased view of a `PersistentClass`, used by schemas and the facade.
pub trait PersistedClass: Send + Sync {
    fn entity_info(&self) -> &EntityInfo;

    fn schema_name(&self) -> &str {
        self.entity_info().schema()
    }

    fn table_name(&self) -> &str {
        self.entity_info().name()
    }

    /// Side tables of the type's list fields.
    fn list_table_names(&self) -> Vec<String>;

    /// Declared columns of the main table.
    fn header(&self) -> &DataTable;

    fn load_state(&self) -> LoadState;

    /// Whether unsaved changes or deletes are pending.
    fn is_dirty(&self) -> bool;

    fn cached_count(&self) -> usize;

    /// Flush pending deletes and dirty instances. Returns the number of
    /// instances written.
    fn save(&self) -> Result<usize>;

    /// Drop every table of the type and empty the cache.
    fn reset(&self) -> Result<()>;

    /// Forget every cached instance; the next access reloads.
    fn clear(&self);
}
