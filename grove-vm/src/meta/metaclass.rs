use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::overload;
use super::registry::MetaClassRegistry;
use crate::error::{RuntimeError, RuntimeResult};
use crate::value::{Instance, TypeId, Value};

pub type Invoker = Arc<dyn Fn(&Value, &[Value]) -> RuntimeResult<Value> + Send + Sync>;
pub type Initializer = Arc<dyn Fn(&Arc<Instance>, &[Value]) -> RuntimeResult<()> + Send + Sync>;
pub type InvokeHook = Arc<dyn Fn(&Value, &str, &[Value]) -> RuntimeResult<Value> + Send + Sync>;

pub const CONSTRUCTOR_NAME: &str = "<init>";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamType {
    Any,
    Exact(TypeId),
}

impl ParamType {
    pub const BOOL: ParamType = ParamType::Exact(TypeId::BOOL);
    pub const INT: ParamType = ParamType::Exact(TypeId::INT);
    pub const FLOAT: ParamType = ParamType::Exact(TypeId::FLOAT);
    pub const STRING: ParamType = ParamType::Exact(TypeId::STRING);
    pub const LIST: ParamType = ParamType::Exact(TypeId::LIST);
    pub const MAP: ParamType = ParamType::Exact(TypeId::MAP);

    pub fn of(type_id: TypeId) -> Self {
        ParamType::Exact(type_id)
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Any => write!(f, "Object"),
            ParamType::Exact(type_id) => write!(f, "{type_id}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetaKind {
    Dynamic,
    Host,
    Builtin,
    NullObject,
}

#[derive(Clone)]
enum MethodBody {
    Native(Invoker),
    Initializer(Initializer),
}

#[derive(Clone)]
pub struct MetaMethod {
    name: Arc<str>,
    declaring: TypeId,
    params: Vec<ParamType>,
    is_static: bool,
    visibility: Visibility,
    body: MethodBody,
}

impl MetaMethod {
    pub fn native<F>(name: impl AsRef<str>, params: &[ParamType], body: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> RuntimeResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.as_ref()),
            declaring: TypeId::OBJECT,
            params: params.to_vec(),
            is_static: false,
            visibility: Visibility::Public,
            body: MethodBody::Native(Arc::new(body)),
        }
    }

    /// A constructor body that runs against a freshly allocated instance.
    pub fn initializer<F>(params: &[ParamType], body: F) -> Self
    where
        F: Fn(&Arc<Instance>, &[Value]) -> RuntimeResult<()> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(CONSTRUCTOR_NAME),
            declaring: TypeId::OBJECT,
            params: params.to_vec(),
            is_static: false,
            visibility: Visibility::Public,
            body: MethodBody::Initializer(Arc::new(body)),
        }
    }

    pub fn into_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn into_private(mut self) -> Self {
        self.visibility = Visibility::Private;
        self
    }

    fn declared_by(mut self, type_id: TypeId) -> Self {
        self.declaring = type_id;
        self
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn declaring(&self) -> TypeId {
        self.declaring
    }

    pub fn params(&self) -> &[ParamType] {
        &self.params
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn same_signature(&self, other: &MetaMethod) -> bool {
        self.name == other.name && self.is_static == other.is_static && self.params == other.params
    }

    /// Runs the body with arguments already shaped for `params`.
    pub fn invoke(&self, receiver: &Value, args: &[Value]) -> RuntimeResult<Value> {
        match &self.body {
            MethodBody::Native(body) => body(receiver, args),
            MethodBody::Initializer(body) => match receiver {
                Value::Object(instance) => {
                    body(instance, args)?;
                    Ok(receiver.clone())
                }
                other => Err(RuntimeError::Coercion {
                    expected: "object".to_string(),
                    found: other.type_name(),
                }),
            },
        }
    }

    pub(crate) fn construct(&self, metaclass: &Arc<MetaClass>, args: &[Value]) -> RuntimeResult<Value> {
        match &self.body {
            MethodBody::Native(body) => body(&Value::Class(metaclass.type_id()), args),
            MethodBody::Initializer(body) => {
                let instance = Instance::new(metaclass.clone());
                body(&instance, args)?;
                Ok(Value::Object(instance))
            }
        }
    }
}

impl fmt::Debug for MetaMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = self
            .params
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            "{}{}.{}({params})",
            if self.is_static { "static " } else { "" },
            self.declaring,
            self.name
        )
    }
}

#[derive(Clone, Debug)]
pub enum MetaProperty {
    Field(Arc<str>),
    Accessor(Arc<MetaMethod>),
    StaticField(Arc<str>),
}

/// Which methods a lookup may see.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Lookup {
    pub sender: TypeId,
    pub this_type: Option<TypeId>,
    pub statics: bool,
}

impl Lookup {
    pub fn instance(sender: TypeId) -> Self {
        Self {
            sender,
            this_type: None,
            statics: false,
        }
    }

    pub fn current(sender: TypeId, this_type: TypeId) -> Self {
        Self {
            sender,
            this_type: Some(this_type),
            statics: false,
        }
    }

    pub fn statics(sender: TypeId) -> Self {
        Self {
            sender,
            this_type: None,
            statics: true,
        }
    }

    pub fn as_statics(self) -> Self {
        Self {
            statics: true,
            ..self
        }
    }

    fn can_see(&self, method: &MetaMethod) -> bool {
        method.visibility == Visibility::Public
            || method.declaring == self.sender
            || self.this_type == Some(method.declaring)
    }
}

type Overloads = SmallVec<[Arc<MetaMethod>; 2]>;

#[derive(Default)]
struct Directory {
    methods: FxHashMap<Arc<str>, Overloads>,
    statics: FxHashMap<Arc<str>, Overloads>,
    constructors: Overloads,
    fields: Vec<Arc<str>>,
    static_fields: FxHashMap<Arc<str>, Value>,
}

impl Directory {
    fn insert(&mut self, method: Arc<MetaMethod>) {
        let table = if method.is_static {
            &mut self.statics
        } else {
            &mut self.methods
        };
        let overloads = table.entry(method.name.clone()).or_default();
        match overloads
            .iter_mut()
            .find(|existing| existing.same_signature(&method))
        {
            Some(existing) => *existing = method,
            None => overloads.push(method),
        }
    }

    fn insert_constructor(&mut self, constructor: Arc<MetaMethod>) {
        match self
            .constructors
            .iter_mut()
            .find(|existing| existing.params == constructor.params)
        {
            Some(existing) => *existing = constructor,
            None => self.constructors.push(constructor),
        }
    }
}

pub struct MetaClass {
    type_id: TypeId,
    name: Arc<str>,
    kind: MetaKind,
    parent: Option<Arc<MetaClass>>,
    version: AtomicU64,
    directory: RwLock<Directory>,
    invoke_hook: Option<InvokeHook>,
}

impl MetaClass {
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn kind(&self) -> MetaKind {
        self.kind
    }

    pub fn parent(&self) -> Option<&Arc<MetaClass>> {
        self.parent.as_ref()
    }

    /// Structural version of this class and every ancestor. Any directory
    /// change along the chain yields a different value.
    pub fn version(&self) -> u64 {
        let own = self.version.load(Ordering::Acquire);
        match &self.parent {
            Some(parent) => own.wrapping_add(parent.version()),
            None => own,
        }
    }

    fn bump(&self) {
        self.version.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn retire(&self) {
        self.bump();
    }

    fn ancestry(&self) -> impl Iterator<Item = &MetaClass> {
        std::iter::successors(Some(self), |class| class.parent.as_deref())
    }

    pub fn invoke_hook(&self) -> Option<&InvokeHook> {
        self.invoke_hook.as_ref()
    }

    pub fn has_invoke_hook(&self) -> bool {
        self.invoke_hook.is_some()
    }

    pub fn add_method(&self, method: MetaMethod) {
        let method = Arc::new(method.declared_by(self.type_id));
        self.directory.write().insert(method);
        self.bump();
    }

    pub fn remove_method(&self, name: &str) -> bool {
        let removed = {
            let mut directory = self.directory.write();
            let instance = directory.methods.remove(name).is_some();
            let statics = directory.statics.remove(name).is_some();
            instance || statics
        };
        if removed {
            self.bump();
        }
        removed
    }

    pub fn add_constructor(&self, constructor: MetaMethod) {
        let constructor = Arc::new(constructor.declared_by(self.type_id));
        self.directory.write().insert_constructor(constructor);
        self.bump();
    }

    pub fn add_field(&self, name: &str) {
        {
            let mut directory = self.directory.write();
            if directory.fields.iter().any(|field| &**field == name) {
                return;
            }
            directory.fields.push(Arc::from(name));
        }
        self.bump();
    }

    /// Updating an existing static field is not a structural change; adding
    /// a new one is.
    pub fn set_static_field(&self, name: &str, value: Value) {
        let added = self
            .directory
            .write()
            .static_fields
            .insert(Arc::from(name), value)
            .is_none();
        if added {
            self.bump();
        }
    }

    pub fn static_field(&self, name: &str) -> Option<Value> {
        self.ancestry()
            .find_map(|class| class.directory.read().static_fields.get(name).cloned())
    }

    pub fn declared_fields(&self) -> Vec<Arc<str>> {
        let mut chain = self.ancestry().collect::<Vec<_>>();
        chain.reverse();
        let mut fields = Vec::new();
        for class in chain {
            for field in &class.directory.read().fields {
                if !fields.contains(field) {
                    fields.push(field.clone());
                }
            }
        }
        fields
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.ancestry()
            .any(|class| class.directory.read().fields.iter().any(|f| &**f == name))
    }

    /// Inheritance distance to `ancestor`, `Some(0)` for the class itself.
    pub fn depth_to(&self, ancestor: TypeId) -> Option<u32> {
        self.ancestry()
            .position(|class| class.type_id == ancestor)
            .map(|depth| depth as u32)
    }

    pub fn is_subtype_of(&self, ancestor: TypeId) -> bool {
        self.depth_to(ancestor).is_some()
    }

    fn candidates(&self, name: &str, lookup: Lookup) -> Overloads {
        let mut candidates = Overloads::new();
        for class in self.ancestry() {
            let directory = class.directory.read();
            let table = if lookup.statics {
                &directory.statics
            } else {
                &directory.methods
            };
            if let Some(overloads) = table.get(name) {
                candidates.extend(
                    overloads
                        .iter()
                        .filter(|method| lookup.can_see(method))
                        .cloned(),
                );
            }
        }
        candidates
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.ancestry().any(|class| {
            let directory = class.directory.read();
            directory.methods.contains_key(name) || directory.statics.contains_key(name)
        })
    }

    pub fn pick_method(&self, name: &str, args: &[Value], lookup: Lookup) -> Option<Arc<MetaMethod>> {
        overload::pick(self.candidates(name, lookup).iter(), args)
    }

    pub fn pick_constructor(&self, args: &[Value]) -> Option<Arc<MetaMethod>> {
        overload::pick(self.directory.read().constructors.iter(), args)
    }

    pub fn constructor_count(&self) -> usize {
        self.directory.read().constructors.len()
    }

    pub fn property(&self, name: &str) -> Option<MetaProperty> {
        if self.has_field(name) {
            return Some(MetaProperty::Field(Arc::from(name)));
        }
        self.pick_method(&accessor_name("get", name), &[], Lookup::instance(self.type_id))
            .map(MetaProperty::Accessor)
    }

    pub fn setter(&self, name: &str, value: &Value) -> Option<MetaProperty> {
        if self.has_field(name) {
            return Some(MetaProperty::Field(Arc::from(name)));
        }
        self.pick_method(
            &accessor_name("set", name),
            std::slice::from_ref(value),
            Lookup::instance(self.type_id),
        )
        .map(MetaProperty::Accessor)
    }

    pub fn static_property(&self, name: &str) -> Option<MetaProperty> {
        if self.static_field(name).is_some() {
            return Some(MetaProperty::StaticField(Arc::from(name)));
        }
        self.pick_method(&accessor_name("get", name), &[], Lookup::statics(self.type_id))
            .map(MetaProperty::Accessor)
    }
}

impl fmt::Debug for MetaClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaClass")
            .field("name", &self.name)
            .field("type_id", &self.type_id)
            .field("kind", &self.kind)
            .field("version", &self.version())
            .finish()
    }
}

fn accessor_name(prefix: &str, property: &str) -> String {
    let mut chars = property.chars();
    match chars.next() {
        Some(first) => format!("{prefix}{}{}", first.to_uppercase(), chars.as_str()),
        None => prefix.to_string(),
    }
}

pub struct ClassBuilder<'r> {
    registry: Option<&'r MetaClassRegistry>,
    type_id: TypeId,
    name: Arc<str>,
    kind: MetaKind,
    parent: Option<Arc<MetaClass>>,
    directory: Directory,
    invoke_hook: Option<InvokeHook>,
}

impl<'r> ClassBuilder<'r> {
    pub(crate) fn new(
        registry: Option<&'r MetaClassRegistry>,
        type_id: TypeId,
        name: &str,
        kind: MetaKind,
        parent: Option<Arc<MetaClass>>,
    ) -> Self {
        Self {
            registry,
            type_id,
            name: Arc::from(name),
            kind,
            parent,
            directory: Directory::default(),
            invoke_hook: None,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn extends(mut self, parent: &Arc<MetaClass>) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    pub fn field(mut self, name: &str) -> Self {
        if !self.directory.fields.iter().any(|field| &**field == name) {
            self.directory.fields.push(Arc::from(name));
        }
        self
    }

    pub fn with_method(mut self, method: MetaMethod) -> Self {
        let method = method.declared_by(self.type_id);
        if method.name.as_ref() == CONSTRUCTOR_NAME {
            self.directory.insert_constructor(Arc::new(method));
        } else {
            self.directory.insert(Arc::new(method));
        }
        self
    }

    pub fn method<F>(self, name: &str, params: &[ParamType], body: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> RuntimeResult<Value> + Send + Sync + 'static,
    {
        self.with_method(MetaMethod::native(name, params, body))
    }

    pub fn private_method<F>(self, name: &str, params: &[ParamType], body: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> RuntimeResult<Value> + Send + Sync + 'static,
    {
        self.with_method(MetaMethod::native(name, params, body).into_private())
    }

    pub fn static_method<F>(self, name: &str, params: &[ParamType], body: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> RuntimeResult<Value> + Send + Sync + 'static,
    {
        self.with_method(MetaMethod::native(name, params, body).into_static())
    }

    pub fn constructor<F>(self, params: &[ParamType], body: F) -> Self
    where
        F: Fn(&Arc<Instance>, &[Value]) -> RuntimeResult<()> + Send + Sync + 'static,
    {
        self.with_method(MetaMethod::initializer(params, body))
    }

    pub fn default_constructor(self) -> Self {
        self.constructor(&[], |_, _| Ok(()))
    }

    /// Constructor for host types: the body builds the value itself.
    pub fn factory<F>(self, params: &[ParamType], body: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> RuntimeResult<Value> + Send + Sync + 'static,
    {
        self.with_method(MetaMethod::native(CONSTRUCTOR_NAME, params, body))
    }

    pub fn static_field(mut self, name: &str, value: Value) -> Self {
        self.directory.static_fields.insert(Arc::from(name), value);
        self
    }

    pub fn invoke_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Value, &str, &[Value]) -> RuntimeResult<Value> + Send + Sync + 'static,
    {
        self.invoke_hook = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Arc<MetaClass> {
        let registry = self.registry;
        let metaclass = Arc::new(MetaClass {
            type_id: self.type_id,
            name: self.name,
            kind: self.kind,
            parent: self.parent,
            version: AtomicU64::new(0),
            directory: RwLock::new(self.directory),
            invoke_hook: self.invoke_hook,
        });
        if let Some(registry) = registry {
            registry.register(metaclass.clone());
        }
        metaclass
    }
}
