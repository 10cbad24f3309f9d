//! Field declarations and bind-time validation

use super::binding::{
    ContainedBinding, FieldBinding, Identity, ReferenceBinding, ScalarBinding,
};
use super::lists::{ContainedListBinding, ListBinding, ListShape, ReferenceListBinding, ScalarListBinding};
use super::naming::{self, contained_name};
use super::{Entity, FieldInfo, Persistable, Shared};
use crate::data::{DataTable, DataType};
use crate::ConfigError;
use std::sync::Arc;

/// Containment and reference chains deeper than this are treated as cycles.
const MAX_DEPTH: usize = 16;

/// The persisted fields of `T`, in declaration order.
pub struct FieldSet<T> {
    specs: Vec<Box<dyn FieldSpec<T>>>,
}

impl<T: Entity> FieldSet<T> {
    pub(crate) fn new() -> Self {
        Self { specs: Vec::new() }
    }

    /// Declarations of `T`.
    pub(crate) fn of() -> Self {
        let mut set = Self::new();
        T::describe(&mut set);
        set
    }

    /// Single-column value.
    pub fn scalar<V: Persistable>(&mut self, info: FieldInfo, get: fn(&T) -> V, set: fn(&mut T, V)) -> &mut Self {
        self.push(ScalarSpec { info, get, set: Some(set) })
    }

    /// Derived value, written on save and never loaded.
    pub fn computed<V: Persistable>(&mut self, info: FieldInfo, get: fn(&T) -> V) -> &mut Self {
        self.push(ScalarSpec {
            info: info.read_only(),
            get,
            set: None,
        })
    }

    /// Reference to another cached entity, stored as its id.
    pub fn reference<U: Entity>(
        &mut self,
        info: FieldInfo,
        get: fn(&T) -> &Option<Shared<U>>,
        get_mut: fn(&mut T) -> &mut Option<Shared<U>>,
    ) -> &mut Self {
        self.push(ReferenceSpec { info, get, get_mut })
    }

    /// Object flattened into this entity's row.
    pub fn contained<U: Entity>(
        &mut self,
        info: FieldInfo,
        get: fn(&T) -> &Option<U>,
        get_mut: fn(&mut T) -> &mut Option<U>,
    ) -> &mut Self {
        self.push(ContainedSpec {
            info: info.contained(),
            get,
            get_mut,
        })
    }

    /// List of scalar values in a side table.
    pub fn list<V: Persistable>(
        &mut self,
        info: FieldInfo,
        get: fn(&T) -> &Vec<V>,
        get_mut: fn(&mut T) -> &mut Vec<V>,
    ) -> &mut Self {
        self.push(ListSpec { info, get, get_mut })
    }

    /// List of contained objects in a side table.
    pub fn contained_list<U: Entity>(
        &mut self,
        info: FieldInfo,
        get: fn(&T) -> &Vec<U>,
        get_mut: fn(&mut T) -> &mut Vec<U>,
    ) -> &mut Self {
        self.push(ContainedListSpec {
            info: info.contained(),
            get,
            get_mut,
        })
    }

    /// List of references in a side table.
    pub fn reference_list<U: Entity>(
        &mut self,
        info: FieldInfo,
        get: fn(&T) -> &Vec<Shared<U>>,
        get_mut: fn(&mut T) -> &mut Vec<Shared<U>>,
    ) -> &mut Self {
        self.push(ReferenceListSpec { info, get, get_mut })
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn infos(&self) -> impl Iterator<Item = &FieldInfo> {
        self.specs.iter().map(|s| s.info())
    }

    pub(crate) fn specs(&self) -> &[Box<dyn FieldSpec<T>>] {
        &self.specs
    }

    fn push(&mut self, spec: impl FieldSpec<T> + 'static) -> &mut Self {
        self.specs.push(Box::new(spec));
        self
    }
}

/// Result of binding one declaration.
pub(crate) enum Bound<T> {
    Row(Arc<dyn FieldBinding<T>>),
    List(Arc<dyn ListBinding<T>>),
}

/// An unbound field declaration.
pub(crate) trait FieldSpec<T>: Send + Sync {
    fn info(&self) -> &FieldInfo;

    fn is_list(&self) -> bool {
        false
    }

    fn bind(&self, scope: &BindScope) -> Result<Bound<T>, ConfigError>;
}

/// Object a field is bound inside of.
#[derive(Debug, Clone)]
pub(crate) struct Container {
    pub data_name: String,
    pub list: bool,
    /// Every column is part of the key (list elements without an id).
    pub key_all: bool,
}

/// Id column of the entity owning a list.
#[derive(Debug, Clone)]
pub(crate) struct OwnerId {
    pub data_name: String,
    pub data_type: DataType,
}

/// Where a declaration is being bound.
#[derive(Debug, Clone)]
pub(crate) struct BindScope {
    pub entity: String,
    pub table: String,
    pub container: Option<Container>,
    pub owner: Option<OwnerId>,
    pub depth: usize,
}

impl BindScope {
    pub fn root(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            table: entity.to_string(),
            container: None,
            owner: None,
            depth: 0,
        }
    }

    pub fn with_owner(&self, owner: Option<OwnerId>) -> Self {
        Self {
            owner,
            ..self.clone()
        }
    }

    /// Scope for the fields of a contained object.
    pub fn nested(&self, entity: &str, container: Container) -> Result<Self, ConfigError> {
        let depth = self.deeper()?;
        Ok(Self {
            entity: entity.to_string(),
            table: self.table.clone(),
            container: Some(container),
            owner: None,
            depth,
        })
    }

    pub fn deeper(&self) -> Result<usize, ConfigError> {
        if self.depth >= MAX_DEPTH {
            return Err(ConfigError::invalid(
                &self.entity,
                "containment or reference chain is too deep (cyclic declaration?)",
            ));
        }
        Ok(self.depth + 1)
    }

    pub fn invalid(&self, reason: impl Into<String>) -> ConfigError {
        ConfigError::invalid(&self.entity, reason)
    }

    fn keys_all(&self) -> bool {
        self.container.as_ref().is_some_and(|c| c.key_all)
    }

    /// Column of a scalar field.
    fn scalar_name(&self, info: &FieldInfo) -> String {
        match &self.container {
            Some(c) if !c.list => contained_name(&c.data_name, info.storage_name()),
            _ => info.storage_name().to_string(),
        }
    }

    /// Column (or column prefix) of an object field.
    fn object_name(&self, info: &FieldInfo, target_id: Option<&str>) -> String {
        match (&self.container, target_id) {
            (Some(c), _) => contained_name(&c.data_name, info.storage_name()),
            (None, Some(id)) => naming::reference_column(info.storage_name(), id),
            (None, None) => info.storage_name().to_string(),
        }
    }

    fn list_shape(&self, info: &FieldInfo) -> Result<ListShape, ConfigError> {
        if info.is_id() {
            return Err(self.invalid(format!("list field {} cannot be an id", info.name())));
        }
        if self.container.is_some() {
            return Err(self.invalid(format!(
                "list field {} is not supported inside a contained object",
                info.name()
            )));
        }
        let Some(owner) = &self.owner else {
            return Err(self.invalid(format!(
                "list field {} requires an id field on the owning entity",
                info.name()
            )));
        };

        Ok(ListShape {
            info: info.clone(),
            table_name: naming::list_table_name(&self.table, info.storage_name()),
            owner_column: contained_name(&self.table, &owner.data_name),
            owner_type: owner.data_type,
        })
    }
}

fn reject_autogenerated(scope: &BindScope, info: &FieldInfo) -> Result<(), ConfigError> {
    if info.is_autogenerated() {
        return Err(scope.invalid(format!(
            "autogenerated field {} must be an integer id",
            info.name()
        )));
    }
    Ok(())
}

fn reject_contained_only<U: Entity>(scope: &BindScope, info: &FieldInfo) -> Result<(), ConfigError> {
    let target = U::entity_info();
    if target.is_contained() {
        return Err(scope.invalid(format!(
            "field {} references contained-only entity {}; declare it as contained",
            info.name(),
            target.name()
        )));
    }
    if info.is_contained() {
        return Err(scope.invalid(format!(
            "reference field {} cannot be contained",
            info.name()
        )));
    }
    Ok(())
}

/// Resolve how `U` is identified when referenced.
pub(crate) fn identity<U: Entity>(scope: &BindScope) -> Result<Identity<U>, ConfigError> {
    let info = U::entity_info();
    let set = FieldSet::<U>::of();
    let Some(spec) = set.specs().iter().find(|s| s.info().is_id()) else {
        return Err(scope.invalid(format!("referenced entity {} has no id field", info.name())));
    };

    let target_scope = BindScope {
        depth: scope.deeper()?,
        ..BindScope::root(info.name())
    };
    match spec.bind(&target_scope)? {
        Bound::Row(binding) => Ok(Identity::new(binding)),
        Bound::List(_) => Err(scope.invalid(format!("id of {} cannot be a list", info.name()))),
    }
}

/// Bind the fields of `U` as part of a containing row.
///
/// Id fields of `U` are only kept inside lists, where they key the element.
pub(crate) fn bind_contained<U: Entity>(
    scope: &BindScope,
    keep_ids: bool,
) -> Result<Vec<Arc<dyn FieldBinding<U>>>, ConfigError> {
    let set = FieldSet::<U>::of();
    let mut fields = Vec::new();
    for spec in set.specs() {
        if spec.info().is_id() && !keep_ids {
            continue;
        }
        if spec.is_list() {
            return Err(scope.invalid(format!(
                "list field {} is not supported inside a contained object",
                spec.info().name()
            )));
        }
        match spec.bind(scope)? {
            Bound::Row(binding) => fields.push(binding),
            Bound::List(_) => return Err(scope.invalid("unexpected list binding")),
        }
    }

    if fields.is_empty() {
        return Err(scope.invalid("contained entity has no persisted fields"));
    }
    Ok(fields)
}

fn has_id<U: Entity>() -> bool {
    FieldSet::<U>::of().infos().any(|info| info.is_id())
}

struct ScalarSpec<T, V> {
    info: FieldInfo,
    get: fn(&T) -> V,
    set: Option<fn(&mut T, V)>,
}

impl<T: Entity, V: Persistable> FieldSpec<T> for ScalarSpec<T, V> {
    fn info(&self) -> &FieldInfo {
        &self.info
    }

    fn bind(&self, scope: &BindScope) -> Result<Bound<T>, ConfigError> {
        let info = &self.info;
        if info.is_contained() {
            return Err(scope.invalid(format!(
                "scalar field {} cannot be contained",
                info.name()
            )));
        }
        if info.is_autogenerated() {
            if !info.is_id() {
                return Err(scope.invalid(format!(
                    "autogenerated field {} must be the id",
                    info.name()
                )));
            }
            if !matches!(V::DATA_TYPE, DataType::Integer | DataType::Long) {
                return Err(scope.invalid(format!(
                    "autogenerated id {} must be an integer type, not {}",
                    info.name(),
                    V::DATA_TYPE
                )));
            }
        }

        Ok(Bound::Row(Arc::new(ScalarBinding::new(
            info.clone(),
            scope.scalar_name(info),
            info.is_id() || scope.keys_all(),
            self.get,
            self.set,
        ))))
    }
}

struct ReferenceSpec<T, U> {
    info: FieldInfo,
    get: fn(&T) -> &Option<Shared<U>>,
    get_mut: fn(&mut T) -> &mut Option<Shared<U>>,
}

impl<T: Entity, U: Entity> FieldSpec<T> for ReferenceSpec<T, U> {
    fn info(&self) -> &FieldInfo {
        &self.info
    }

    fn bind(&self, scope: &BindScope) -> Result<Bound<T>, ConfigError> {
        reject_contained_only::<U>(scope, &self.info)?;
        reject_autogenerated(scope, &self.info)?;

        let target = identity::<U>(scope)?;
        let data_name = scope.object_name(&self.info, Some(target.data_name()));
        Ok(Bound::Row(Arc::new(ReferenceBinding::new(
            self.info.clone(),
            data_name,
            self.info.is_id() || scope.keys_all(),
            target,
            self.get,
            self.get_mut,
        ))))
    }
}

struct ContainedSpec<T, U> {
    info: FieldInfo,
    get: fn(&T) -> &Option<U>,
    get_mut: fn(&mut T) -> &mut Option<U>,
}

impl<T: Entity, U: Entity> FieldSpec<T> for ContainedSpec<T, U> {
    fn info(&self) -> &FieldInfo {
        &self.info
    }

    fn bind(&self, scope: &BindScope) -> Result<Bound<T>, ConfigError> {
        if self.info.is_id() {
            return Err(scope.invalid(format!(
                "contained field {} cannot be an id",
                self.info.name()
            )));
        }
        reject_autogenerated(scope, &self.info)?;

        let data_name = scope.object_name(&self.info, None);
        let inner = scope.nested(
            U::entity_info().name(),
            Container {
                data_name: data_name.clone(),
                list: false,
                key_all: scope.keys_all(),
            },
        )?;
        let fields = bind_contained::<U>(&inner, false)?;

        Ok(Bound::Row(Arc::new(ContainedBinding::new(
            self.info.clone(),
            data_name,
            fields,
            self.get,
            self.get_mut,
        ))))
    }
}

struct ListSpec<T, V> {
    info: FieldInfo,
    get: fn(&T) -> &Vec<V>,
    get_mut: fn(&mut T) -> &mut Vec<V>,
}

impl<T: Entity, V: Persistable> FieldSpec<T> for ListSpec<T, V> {
    fn info(&self) -> &FieldInfo {
        &self.info
    }

    fn is_list(&self) -> bool {
        true
    }

    fn bind(&self, scope: &BindScope) -> Result<Bound<T>, ConfigError> {
        if !V::DATA_TYPE.is_scalar() {
            return Err(scope.invalid(format!(
                "list field {} cannot hold {} values",
                self.info.name(),
                V::DATA_TYPE
            )));
        }
        if self.info.is_contained() {
            return Err(scope.invalid(format!(
                "list field {} holds scalars and cannot be contained",
                self.info.name()
            )));
        }
        reject_autogenerated(scope, &self.info)?;

        let shape = scope.list_shape(&self.info)?;
        let value_column = self.info.storage_name().to_string();
        Ok(Bound::List(Arc::new(ScalarListBinding::new(
            shape,
            value_column,
            self.get,
            self.get_mut,
        ))))
    }
}

struct ContainedListSpec<T, U> {
    info: FieldInfo,
    get: fn(&T) -> &Vec<U>,
    get_mut: fn(&mut T) -> &mut Vec<U>,
}

impl<T: Entity, U: Entity> FieldSpec<T> for ContainedListSpec<T, U> {
    fn info(&self) -> &FieldInfo {
        &self.info
    }

    fn is_list(&self) -> bool {
        true
    }

    fn bind(&self, scope: &BindScope) -> Result<Bound<T>, ConfigError> {
        reject_autogenerated(scope, &self.info)?;
        let shape = scope.list_shape(&self.info)?;
        let inner = scope.nested(
            U::entity_info().name(),
            Container {
                data_name: self.info.storage_name().to_string(),
                list: true,
                key_all: !has_id::<U>(),
            },
        )?;
        let fields = bind_contained::<U>(&inner, true)?;

        Ok(Bound::List(Arc::new(ContainedListBinding::new(
            shape,
            fields,
            self.get,
            self.get_mut,
        ))))
    }
}

struct ReferenceListSpec<T, U> {
    info: FieldInfo,
    get: fn(&T) -> &Vec<Shared<U>>,
    get_mut: fn(&mut T) -> &mut Vec<Shared<U>>,
}

impl<T: Entity, U: Entity> FieldSpec<T> for ReferenceListSpec<T, U> {
    fn info(&self) -> &FieldInfo {
        &self.info
    }

    fn is_list(&self) -> bool {
        true
    }

    fn bind(&self, scope: &BindScope) -> Result<Bound<T>, ConfigError> {
        reject_contained_only::<U>(scope, &self.info)?;
        reject_autogenerated(scope, &self.info)?;

        let shape = scope.list_shape(&self.info)?;
        let target = identity::<U>(scope)?;
        let column = contained_name(self.info.storage_name(), target.data_name());
        Ok(Bound::List(Arc::new(ReferenceListBinding::new(
            shape,
            column,
            target,
            self.get,
            self.get_mut,
        ))))
    }
}

/// Header table built from row bindings.
pub(crate) fn header_of<T>(table: &str, fields: &[Arc<dyn FieldBinding<T>>]) -> DataTable {
    let mut header = DataTable::new(table);
    for field in fields {
        field.populate_header(&mut header);
    }
    header
}
