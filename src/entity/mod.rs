//! Entity declarations
//!
//! An entity type describes its persisted fields once, through a `FieldSet`,
//! with typed accessor functions. Binding turns those declarations into
//! row and side-table bindings:
//! - scalar fields map to one column
//! - contained objects are flattened into the owner's row
//! - references store the target's id and are resolved after loading
//! - lists live in `<Table><Field>` side tables keyed by the owner id

pub mod binding;
pub mod context;
pub mod fields;
pub mod lists;
pub mod naming;
pub mod value;

pub use context::LoadContext;
pub use fields::FieldSet;
pub use value::Persistable;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Live instance handle shared by the cache and every caller.
pub type Shared<T> = Arc<RwLock<T>>;

/// Wrap a value in a `Shared` handle.
pub fn shared<T>(value: T) -> Shared<T> {
    Arc::new(RwLock::new(value))
}

/// A persisted type.
///
/// ```ignore
/// impl Entity for PluginData {
///     fn entity_info() -> EntityInfo {
///         EntityInfo::new("global", "plugin")
///     }
///
///     fn describe(fields: &mut FieldSet<Self>) {
///         fields
///             .scalar(FieldInfo::new("id").id(), |p| p.id.clone(), |p, v| p.id = v)
///             .scalar(FieldInfo::new("version"), |p| p.version.clone(), |p, v| p.version = v);
///     }
/// }
/// ```
pub trait Entity: Default + Send + Sync + 'static {
    fn entity_info() -> EntityInfo;

    fn describe(fields: &mut FieldSet<Self>);

    /// Explicit migration steps. Without them, schema drift is handled by
    /// dropping and recreating the table.
    fn migration() -> Option<MigrationInfo> {
        None
    }
}

/// Type-level persistence metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInfo {
    schema: String,
    name: String,
    cached: bool,
    contained: bool,
}

impl EntityInfo {
    /// Schema names are lower-cased; spaces become underscores in both names.
    pub fn new(schema: impl AsRef<str>, name: impl AsRef<str>) -> Self {
        Self {
            schema: naming::sanitize(schema.as_ref()).to_lowercase(),
            name: naming::sanitize(name.as_ref()),
            cached: true,
            contained: false,
        }
    }

    /// Only ever stored inside another entity; no table or id of its own.
    pub fn contained(mut self) -> Self {
        self.contained = true;
        self
    }

    pub fn uncached(mut self) -> Self {
        self.cached = false;
        self
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_cached(&self) -> bool {
        self.cached
    }

    pub fn is_contained(&self) -> bool {
        self.contained
    }
}

/// Per-field persistence metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    name: String,
    column: Option<String>,
    id: bool,
    autogenerated: bool,
    read_only: bool,
    contained: bool,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn id(mut self) -> Self {
        self.id = true;
        self
    }

    pub fn autogenerated(mut self) -> Self {
        self.autogenerated = true;
        self
    }

    /// Written on save, never assigned on load.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn contained(mut self) -> Self {
        self.contained = true;
        self
    }

    /// Override the stored name.
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name used for storage: the override when present.
    pub fn storage_name(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }

    pub fn is_id(&self) -> bool {
        self.id
    }

    pub fn is_autogenerated(&self) -> bool {
        self.autogenerated
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_contained(&self) -> bool {
        self.contained
    }
}

/// Ordered migration steps for one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationInfo {
    steps: Vec<MigrationStep>,
}

impl MigrationInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: MigrationStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Steps ordered by id.
    pub fn steps(&self) -> Vec<&MigrationStep> {
        let mut steps: Vec<&MigrationStep> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.id);
        steps
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStep {
    pub id: u32,
    pub plugin_version: Option<String>,
    pub kind: MigrationStepKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum MigrationStepKind {
    /// Drop and recreate the table
    Reset,
    /// Raw SQL run against the store
    Statement(String),
    /// SQL file read from the configured scripts directory
    Script(String),
}

impl MigrationStep {
    pub fn reset(id: u32) -> Self {
        Self::new(id, MigrationStepKind::Reset)
    }

    pub fn statement(id: u32, sql: impl Into<String>) -> Self {
        Self::new(id, MigrationStepKind::Statement(sql.into()))
    }

    pub fn script(id: u32, name: impl Into<String>) -> Self {
        Self::new(id, MigrationStepKind::Script(name.into()))
    }

    pub fn plugin_version(mut self, version: impl Into<String>) -> Self {
        self.plugin_version = Some(version.into());
        self
    }

    fn new(id: u32, kind: MigrationStepKind) -> Self {
        Self {
            id,
            plugin_version: None,
            kind,
        }
    }
}
