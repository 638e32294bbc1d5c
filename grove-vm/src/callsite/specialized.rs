use std::sync::Arc;

use super::fallback;
use super::generic;
use super::shape::{self, ArgShape, InvokeTier};
use super::site::{CallSite, SiteHeader, SiteTag};
use super::table::CallSiteTable;
use crate::error::{RuntimeError, RuntimeResult};
use crate::meta::{MetaClass, MetaMethod, has_active_category};
use crate::value::{TypeId, Value};

/// What a specialized site requires of its receiver.
#[derive(Clone, Debug)]
pub(crate) enum ReceiverGuard {
    /// A dynamic object whose metaclass is exactly this one.
    Instance(Arc<MetaClass>),
    /// Any other value whose concrete type id matches.
    Type(TypeId),
    /// A class literal for this type.
    Class(TypeId),
}

impl ReceiverGuard {
    fn admits(&self, receiver: &Value) -> bool {
        match (self, receiver) {
            (ReceiverGuard::Instance(metaclass), Value::Object(instance)) => {
                Arc::ptr_eq(metaclass, instance.metaclass())
            }
            (ReceiverGuard::Instance(_), _) | (ReceiverGuard::Type(_), Value::Object(_)) => false,
            (ReceiverGuard::Class(expected), Value::Class(type_id)) => expected == type_id,
            (ReceiverGuard::Class(_), _) => false,
            (ReceiverGuard::Type(expected), other) => *expected == other.type_id(),
        }
    }
}

/// A resolved method plus every assumption made while resolving it.
pub(crate) struct CachedTarget {
    metaclass: Arc<MetaClass>,
    version: u64,
    shape: ArgShape,
    method: Arc<MetaMethod>,
    tier: InvokeTier,
}

impl CachedTarget {
    /// `version` must be read before the lookup that produced `method`.
    pub(crate) fn new(
        metaclass: Arc<MetaClass>,
        version: u64,
        method: Arc<MetaMethod>,
        args: &[Value],
    ) -> Self {
        let tier = shape::select_tier(&method, args);
        Self {
            metaclass,
            version,
            shape: ArgShape::capture(args),
            method,
            tier,
        }
    }

    fn tier(&self) -> InvokeTier {
        self.tier
    }

    fn is_valid(&self, args: &[Value]) -> bool {
        self.metaclass.version() == self.version
            && self.shape.matches(args)
            && !has_active_category()
    }

    fn invoke(&self, receiver: &Value, args: &[Value]) -> RuntimeResult<Value> {
        let prepared = shape::prepare(&self.method, args, self.tier);
        let receiver = if self.method.is_static() {
            Value::Class(self.metaclass.type_id())
        } else {
            receiver.clone()
        };
        self.method
            .invoke(&receiver, &prepared)
            .map_err(RuntimeError::unwrap_invocation)
    }

    fn construct(&self, args: &[Value]) -> RuntimeResult<Value> {
        let prepared = shape::prepare(&self.method, args, self.tier);
        self.method
            .construct(&self.metaclass, &prepared)
            .map_err(RuntimeError::unwrap_invocation)
    }
}

/// Monomorphic method cache. The guard decides which receivers it serves:
/// dynamic objects, host and builtin values, or class literals.
pub(crate) struct MethodSite {
    header: SiteHeader,
    guard: ReceiverGuard,
    target: CachedTarget,
    current: bool,
}

impl MethodSite {
    pub(crate) fn new(header: SiteHeader, guard: ReceiverGuard, target: CachedTarget, current: bool) -> Self {
        Self {
            header,
            guard,
            target,
            current,
        }
    }

    fn hit(&self, receiver: &Value, args: &[Value]) -> bool {
        self.guard.admits(receiver) && self.target.is_valid(args)
    }
}

impl CallSite for MethodSite {
    fn header(&self) -> &SiteHeader {
        &self.header
    }

    fn tag(&self) -> SiteTag {
        match self.guard {
            ReceiverGuard::Instance(_) => SiteTag::DynamicMethod,
            ReceiverGuard::Type(_) => SiteTag::HostMethod,
            ReceiverGuard::Class(_) => SiteTag::StaticMethod,
        }
    }

    fn tier(&self) -> Option<InvokeTier> {
        Some(self.target.tier())
    }

    fn call(&self, table: &CallSiteTable, receiver: &Value, args: &[Value]) -> RuntimeResult<Value> {
        if self.current || !self.hit(receiver, args) {
            return generic::default_call(table, &self.header, receiver, args);
        }
        self.target.invoke(receiver, args)
    }

    fn call_current(
        &self,
        table: &CallSiteTable,
        receiver: &Value,
        args: &[Value],
    ) -> RuntimeResult<Value> {
        if !self.current || !self.hit(receiver, args) {
            return generic::default_current(table, &self.header, receiver, args);
        }
        self.target.invoke(receiver, args)
    }

    fn call_static(&self, table: &CallSiteTable, receiver: TypeId, args: &[Value]) -> RuntimeResult<Value> {
        let class = Value::Class(receiver);
        if !self.hit(&class, args) {
            return generic::default_static(table, &self.header, receiver, args);
        }
        self.target.invoke(&class, args)
    }
}

pub(crate) struct ConstructorSite {
    header: SiteHeader,
    type_id: TypeId,
    target: CachedTarget,
}

impl ConstructorSite {
    pub(crate) fn new(header: SiteHeader, type_id: TypeId, target: CachedTarget) -> Self {
        Self {
            header,
            type_id,
            target,
        }
    }
}

impl CallSite for ConstructorSite {
    fn header(&self) -> &SiteHeader {
        &self.header
    }

    fn tag(&self) -> SiteTag {
        SiteTag::Constructor
    }

    fn tier(&self) -> Option<InvokeTier> {
        Some(self.target.tier())
    }

    fn call_constructor(
        &self,
        table: &CallSiteTable,
        receiver: TypeId,
        args: &[Value],
    ) -> RuntimeResult<Value> {
        if receiver != self.type_id || !self.target.is_valid(args) {
            return generic::default_constructor(table, &self.header, receiver, args);
        }
        self.target.construct(args)
    }
}

/// Constructor call whose last argument is a property map: construct with
/// the leading arguments, then assign each entry.
pub(crate) struct BeanConstructorSite {
    header: SiteHeader,
    type_id: TypeId,
    target: CachedTarget,
}

impl BeanConstructorSite {
    /// `target` covers the positional arguments only.
    pub(crate) fn new(header: SiteHeader, type_id: TypeId, target: CachedTarget) -> Self {
        Self {
            header,
            type_id,
            target,
        }
    }
}

impl CallSite for BeanConstructorSite {
    fn header(&self) -> &SiteHeader {
        &self.header
    }

    fn tag(&self) -> SiteTag {
        SiteTag::BeanConstructor
    }

    fn tier(&self) -> Option<InvokeTier> {
        Some(self.target.tier())
    }

    fn call_constructor(
        &self,
        table: &CallSiteTable,
        receiver: TypeId,
        args: &[Value],
    ) -> RuntimeResult<Value> {
        let split = fallback::bean_split(args)
            .filter(|(positional, _)| receiver == self.type_id && self.target.is_valid(positional));
        let Some((positional, properties)) = split else {
            return generic::default_constructor(table, &self.header, receiver, args);
        };
        let instance = self.target.construct(positional)?;
        fallback::apply_properties(table, &instance, properties).map_err(RuntimeError::unwrap_invocation)?;
        Ok(instance)
    }
}

#[derive(Clone, Debug)]
pub(crate) enum PropertyAccess {
    Field(Arc<str>),
    Accessor(Arc<MetaMethod>),
    MapEntry(Arc<str>),
    StaticField(Arc<str>),
}

pub(crate) struct PropertySite {
    header: SiteHeader,
    guard: ReceiverGuard,
    metaclass: Arc<MetaClass>,
    version: u64,
    access: PropertyAccess,
}

impl PropertySite {
    pub(crate) fn new(
        header: SiteHeader,
        guard: ReceiverGuard,
        metaclass: Arc<MetaClass>,
        version: u64,
        access: PropertyAccess,
    ) -> Self {
        Self {
            header,
            guard,
            metaclass,
            version,
            access,
        }
    }

    fn read(&self, receiver: &Value) -> RuntimeResult<Value> {
        match &self.access {
            PropertyAccess::Field(name) => Ok(match receiver {
                Value::Object(instance) => fallback::read_field(instance, name),
                _ => Value::Null,
            }),
            PropertyAccess::Accessor(method) => {
                let target = if method.is_static() {
                    Value::Class(self.metaclass.type_id())
                } else {
                    receiver.clone()
                };
                method
                    .invoke(&target, &[])
                    .map_err(RuntimeError::unwrap_invocation)
            }
            PropertyAccess::MapEntry(key) => Ok(receiver.map_get(key).cloned().unwrap_or(Value::Null)),
            PropertyAccess::StaticField(name) => {
                Ok(self.metaclass.static_field(name).unwrap_or(Value::Null))
            }
        }
    }
}

impl CallSite for PropertySite {
    fn header(&self) -> &SiteHeader {
        &self.header
    }

    fn tag(&self) -> SiteTag {
        match self.guard {
            ReceiverGuard::Instance(_) => SiteTag::DynamicProperty,
            ReceiverGuard::Type(_) => SiteTag::HostProperty,
            ReceiverGuard::Class(_) => SiteTag::ClassProperty,
        }
    }

    fn get_property(&self, table: &CallSiteTable, receiver: &Value) -> RuntimeResult<Value> {
        if !self.guard.admits(receiver)
            || self.metaclass.version() != self.version
            || has_active_category()
        {
            return generic::default_property(table, &self.header, receiver);
        }
        self.read(receiver)
    }
}
