use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::meta::MetaClass;

/// Runtime type identity. Two values have the same concrete type exactly
/// when their ids are equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    pub const OBJECT: TypeId = TypeId(0);
    pub const NULL: TypeId = TypeId(1);
    pub const BOOL: TypeId = TypeId(2);
    pub const INT: TypeId = TypeId(3);
    pub const FLOAT: TypeId = TypeId(4);
    pub const STRING: TypeId = TypeId(5);
    pub const LIST: TypeId = TypeId(6);
    pub const MAP: TypeId = TypeId(7);
    pub const CLASS: TypeId = TypeId(8);
    pub const WRAPPER: TypeId = TypeId(9);

    pub const FIRST_USER: u32 = 64;

    pub fn is_builtin(self) -> bool {
        self.0 < Self::FIRST_USER
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TypeId::OBJECT => write!(f, "Object"),
            TypeId::NULL => write!(f, "NullObject"),
            TypeId::BOOL => write!(f, "Boolean"),
            TypeId::INT => write!(f, "Integer"),
            TypeId::FLOAT => write!(f, "Double"),
            TypeId::STRING => write!(f, "String"),
            TypeId::LIST => write!(f, "List"),
            TypeId::MAP => write!(f, "Map"),
            TypeId::CLASS => write!(f, "Class"),
            TypeId::WRAPPER => write!(f, "Wrapper"),
            TypeId(id) => write!(f, "type#{id}"),
        }
    }
}

/// A plain host object. It has no metaclass of its own; dispatch goes
/// through the reflective table registered for `host_type`.
pub trait HostObject: std::any::Any + Send + Sync + fmt::Debug {
    fn host_type(&self) -> TypeId;

    fn as_any(&self) -> &dyn std::any::Any;
}

/// Explicit coercion request: "treat `value` as `declared`".
#[derive(Clone, Debug, PartialEq)]
pub struct Wrapper {
    pub value: Value,
    pub declared: TypeId,
}

pub struct Instance {
    metaclass: Arc<MetaClass>,
    fields: RwLock<FxHashMap<Arc<str>, Value>>,
}

impl Instance {
    pub fn new(metaclass: Arc<MetaClass>) -> Arc<Self> {
        let fields = metaclass
            .declared_fields()
            .into_iter()
            .map(|name| (name, Value::Null))
            .collect();
        Arc::new(Self {
            metaclass,
            fields: RwLock::new(fields),
        })
    }

    pub fn metaclass(&self) -> &Arc<MetaClass> {
        &self.metaclass
    }

    pub fn type_id(&self) -> TypeId {
        MetaClass::type_id(&self.metaclass)
    }

    pub fn get_field(&self, name: &str) -> Option<Value> {
        self.fields.read().get(name).cloned()
    }

    /// Writes a declared field. Returns false when the field does not exist.
    pub fn set_field(&self, name: &str, value: Value) -> bool {
        match self.fields.write().get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.metaclass.name())
            .field("fields", &*self.fields.read())
            .finish()
    }
}

#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Arc<str>),
    List(Arc<Vec<Value>>),
    Map(Arc<Vec<(Arc<str>, Value)>>),
    Class(TypeId),
    Object(Arc<Instance>),
    Host(Arc<dyn HostObject>),
    Wrapper(Arc<Wrapper>),
}

impl Value {
    pub fn string(text: impl AsRef<str>) -> Self {
        Value::String(Arc::from(text.as_ref()))
    }

    pub fn list(values: Vec<Value>) -> Self {
        Value::List(Arc::new(values))
    }

    pub fn map<K: AsRef<str>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(Arc::new(
            entries
                .into_iter()
                .map(|(key, value)| (Arc::from(key.as_ref()), value))
                .collect(),
        ))
    }

    pub fn wrap(value: Value, declared: TypeId) -> Self {
        Value::Wrapper(Arc::new(Wrapper { value, declared }))
    }

    pub fn host(object: impl HostObject) -> Self {
        Value::Host(Arc::new(object))
    }

    pub fn type_id(&self) -> TypeId {
        match self {
            Value::Null => TypeId::NULL,
            Value::Bool(_) => TypeId::BOOL,
            Value::Int(_) => TypeId::INT,
            Value::Float(_) => TypeId::FLOAT,
            Value::String(_) => TypeId::STRING,
            Value::List(_) => TypeId::LIST,
            Value::Map(_) => TypeId::MAP,
            Value::Class(_) => TypeId::CLASS,
            Value::Object(instance) => Instance::type_id(instance),
            Value::Host(object) => object.host_type(),
            Value::Wrapper(_) => TypeId::WRAPPER,
        }
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::Object(instance) => instance.metaclass().name().to_string(),
            other => other.type_id().to_string(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Arc<Instance>> {
        match self {
            Value::Object(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn map_get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries
                .iter()
                .find(|(entry_key, _)| &**entry_key == key)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// Reference identity for heap values, value equality otherwise.
    pub fn is_same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Host(a), Value::Host(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
            (Value::Wrapper(a), Value::Wrapper(b)) => Arc::ptr_eq(a, b),
            (a, b) => a == b,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Class(a), Value::Class(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Host(a), Value::Host(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (Value::Wrapper(a), Value::Wrapper(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value:?}"),
            Value::String(text) => write!(f, "{text}"),
            Value::List(values) => {
                write!(f, "[")?;
                for (position, value) in values.iter().enumerate() {
                    if position > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                if entries.is_empty() {
                    return write!(f, "[:]");
                }
                write!(f, "[")?;
                for (position, (key, value)) in entries.iter().enumerate() {
                    if position > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}:{value}")?;
                }
                write!(f, "]")
            }
            Value::Class(type_id) => write!(f, "class {type_id}"),
            Value::Object(instance) => write!(
                f,
                "{}@{:x}",
                instance.metaclass().name(),
                Arc::as_ptr(instance) as usize
            ),
            Value::Host(object) => write!(f, "{object:?}"),
            Value::Wrapper(wrapper) => write!(f, "{}", wrapper.value),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::string(value)
    }
}
