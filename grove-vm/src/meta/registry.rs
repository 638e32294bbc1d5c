use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::metaclass::{ClassBuilder, MetaClass, MetaKind};
use crate::builtins;
use crate::error::{RuntimeError, RuntimeResult};
use crate::value::{TypeId, Value};

/// Type id -> metaclass association.
///
/// Builtin metaclasses are created on first lookup. Nothing is ever evicted;
/// `replace` swaps an entry and retires the previous metaclass so that call
/// sites which trusted it re-resolve.
pub struct MetaClassRegistry {
    classes: RwLock<FxHashMap<TypeId, Arc<MetaClass>>>,
    names: RwLock<FxHashMap<Arc<str>, TypeId>>,
    next_type: AtomicU32,
}

impl Default for MetaClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetaClassRegistry {
    pub fn new() -> Self {
        Self {
            classes: RwLock::new(FxHashMap::default()),
            names: RwLock::new(FxHashMap::default()),
            next_type: AtomicU32::new(TypeId::FIRST_USER),
        }
    }

    pub fn global() -> Arc<MetaClassRegistry> {
        static GLOBAL: OnceLock<Arc<MetaClassRegistry>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| Arc::new(MetaClassRegistry::new()))
            .clone()
    }

    fn allocate_type(&self) -> TypeId {
        TypeId(self.next_type.fetch_add(1, Ordering::Relaxed))
    }

    /// Starts a dynamic class. Classes without an explicit parent extend
    /// `Object`.
    pub fn define_class(&self, name: &str) -> ClassBuilder<'_> {
        let object = self.object_metaclass();
        ClassBuilder::new(
            Some(self),
            self.allocate_type(),
            name,
            MetaKind::Dynamic,
            Some(object),
        )
    }

    /// Starts the reflective table for an opaque host type.
    pub fn define_host_type(&self, name: &str) -> ClassBuilder<'_> {
        let object = self.object_metaclass();
        ClassBuilder::new(
            Some(self),
            self.allocate_type(),
            name,
            MetaKind::Host,
            Some(object),
        )
    }

    pub(crate) fn register(&self, metaclass: Arc<MetaClass>) {
        self.names
            .write()
            .insert(metaclass.name().clone(), metaclass.type_id());
        self.classes.write().insert(metaclass.type_id(), metaclass);
    }

    pub fn replace(&self, metaclass: Arc<MetaClass>) -> Option<Arc<MetaClass>> {
        self.names
            .write()
            .insert(metaclass.name().clone(), metaclass.type_id());
        let previous = self.classes.write().insert(metaclass.type_id(), metaclass);
        if let Some(previous) = &previous {
            previous.retire();
        }
        previous
    }

    pub fn get(&self, type_id: TypeId) -> Option<Arc<MetaClass>> {
        if let Some(metaclass) = self.classes.read().get(&type_id) {
            return Some(metaclass.clone());
        }
        if !type_id.is_builtin() {
            return None;
        }
        let parent = if type_id == TypeId::OBJECT || type_id == TypeId::NULL {
            None
        } else {
            Some(self.object_metaclass())
        };
        let built = builtins::build_metaclass(type_id, parent)?;
        let mut classes = self.classes.write();
        let metaclass = classes.entry(type_id).or_insert(built).clone();
        drop(classes);
        self.names
            .write()
            .entry(metaclass.name().clone())
            .or_insert(type_id);
        Some(metaclass)
    }

    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        if let Some(type_id) = self.names.read().get(name) {
            return Some(*type_id);
        }
        builtins::builtin_by_name(name)
    }

    pub fn object_metaclass(&self) -> Arc<MetaClass> {
        self.get(TypeId::OBJECT)
            .unwrap_or_else(|| builtins::object_metaclass())
    }

    pub fn null_metaclass(&self) -> Arc<MetaClass> {
        self.get(TypeId::NULL)
            .unwrap_or_else(|| builtins::null_metaclass())
    }

    pub fn metaclass_of(&self, value: &Value) -> RuntimeResult<Arc<MetaClass>> {
        match value {
            Value::Object(instance) => Ok(instance.metaclass().clone()),
            other => {
                let type_id = other.type_id();
                self.get(type_id)
                    .ok_or(RuntimeError::UnknownType(type_id.0))
            }
        }
    }

    pub fn class_count(&self) -> usize {
        self.classes.read().len()
    }
}
