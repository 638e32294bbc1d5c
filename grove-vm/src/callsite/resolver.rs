use std::sync::Arc;

use super::fallback;
use super::site::{CallSite, SiteHeader};
use super::specialized::{
    BeanConstructorSite, CachedTarget, ConstructorSite, MethodSite, PropertyAccess, PropertySite,
    ReceiverGuard,
};
use super::table::CallSiteTable;
use crate::meta::{Lookup, MetaClass, MetaProperty, has_active_category};
use crate::runtime::Runtime;
use crate::value::{Instance, TypeId, Value};

/// Non-null receiver categories the resolver distinguishes.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Receiver<'a> {
    ClassLiteral(TypeId),
    Dynamic(&'a Arc<Instance>),
    Opaque(&'a Value),
}

impl<'a> Receiver<'a> {
    /// `None` for null; null receivers are never specialized.
    pub(crate) fn classify(value: &'a Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Class(type_id) => Some(Receiver::ClassLiteral(*type_id)),
            Value::Object(instance) => Some(Receiver::Dynamic(instance)),
            other => Some(Receiver::Opaque(other)),
        }
    }
}

/// Turns a receiver and argument list into a site ready to install.
///
/// Resolution writes nothing shared except the resolution counter. `None`
/// means the call cannot be specialized and has to run on the slow path.
pub(crate) struct Resolver<'t> {
    runtime: &'t Runtime,
    owner: TypeId,
}

impl<'t> Resolver<'t> {
    pub(crate) fn new(table: &'t CallSiteTable) -> Self {
        Self {
            runtime: table.runtime(),
            owner: table.owner(),
        }
    }

    fn begin(&self) -> bool {
        self.runtime.stats().record_resolution();
        !has_active_category()
    }

    fn metaclass(&self, type_id: TypeId) -> Option<Arc<MetaClass>> {
        self.runtime.registry().get(type_id)
    }

    pub(crate) fn resolve_call(
        &self,
        header: &SiteHeader,
        receiver: &Value,
        args: &[Value],
        current: bool,
    ) -> Option<Arc<dyn CallSite>> {
        if !self.begin() {
            return None;
        }
        let (metaclass, guard) = match Receiver::classify(receiver)? {
            Receiver::ClassLiteral(type_id) => {
                return self.static_site(header, type_id, args, current);
            }
            Receiver::Dynamic(instance) => {
                let metaclass = instance.metaclass().clone();
                (metaclass.clone(), ReceiverGuard::Instance(metaclass))
            }
            Receiver::Opaque(value) => {
                let metaclass = self.runtime.registry().metaclass_of(value).ok()?;
                (metaclass, ReceiverGuard::Type(value.type_id()))
            }
        };
        if metaclass.has_invoke_hook() {
            return None;
        }
        let version = metaclass.version();
        let lookup = if current {
            Lookup::current(self.owner, metaclass.type_id())
        } else {
            Lookup::instance(self.owner)
        };
        let method = metaclass.pick_method(header.name(), args, lookup).or_else(|| {
            current
                .then(|| metaclass.pick_method(header.name(), args, lookup.as_statics()))
                .flatten()
        })?;
        let target = CachedTarget::new(metaclass, version, method, args);
        Some(Arc::new(MethodSite::new(header.clone(), guard, target, current)))
    }

    pub(crate) fn resolve_static(
        &self,
        header: &SiteHeader,
        receiver: TypeId,
        args: &[Value],
    ) -> Option<Arc<dyn CallSite>> {
        if !self.begin() {
            return None;
        }
        self.static_site(header, receiver, args, false)
    }

    /// `current` marks a static-context `this` call so the site serves
    /// `call_current` rather than `call`.
    fn static_site(
        &self,
        header: &SiteHeader,
        type_id: TypeId,
        args: &[Value],
        current: bool,
    ) -> Option<Arc<dyn CallSite>> {
        let metaclass = self.metaclass(type_id)?;
        let version = metaclass.version();
        let method = metaclass.pick_method(header.name(), args, Lookup::statics(self.owner))?;
        let target = CachedTarget::new(metaclass, version, method, args);
        Some(Arc::new(MethodSite::new(
            header.clone(),
            ReceiverGuard::Class(type_id),
            target,
            current,
        )))
    }

    pub(crate) fn resolve_constructor(
        &self,
        header: &SiteHeader,
        receiver: TypeId,
        args: &[Value],
    ) -> Option<Arc<dyn CallSite>> {
        if !self.begin() {
            return None;
        }
        let metaclass = self.metaclass(receiver)?;
        let version = metaclass.version();
        if let Some(constructor) = metaclass.pick_constructor(args) {
            let target = CachedTarget::new(metaclass, version, constructor, args);
            return Some(Arc::new(ConstructorSite::new(header.clone(), receiver, target)));
        }
        let (positional, _) = fallback::bean_split(args)?;
        let constructor = metaclass.pick_constructor(positional)?;
        let target = CachedTarget::new(metaclass, version, constructor, positional);
        Some(Arc::new(BeanConstructorSite::new(
            header.clone(),
            receiver,
            target,
        )))
    }

    pub(crate) fn resolve_property(
        &self,
        header: &SiteHeader,
        receiver: &Value,
    ) -> Option<Arc<dyn CallSite>> {
        if !self.begin() {
            return None;
        }
        let name = header.name();
        let (metaclass, guard) = match Receiver::classify(receiver)? {
            Receiver::ClassLiteral(type_id) => {
                (self.metaclass(type_id)?, ReceiverGuard::Class(type_id))
            }
            Receiver::Dynamic(instance) => {
                let metaclass = instance.metaclass().clone();
                (metaclass.clone(), ReceiverGuard::Instance(metaclass))
            }
            Receiver::Opaque(value) => (
                self.runtime.registry().metaclass_of(value).ok()?,
                ReceiverGuard::Type(value.type_id()),
            ),
        };
        let version = metaclass.version();
        let access = match (&guard, receiver) {
            (ReceiverGuard::Class(_), _) => match metaclass.static_property(name)? {
                MetaProperty::StaticField(field) => PropertyAccess::StaticField(field),
                MetaProperty::Accessor(method) => PropertyAccess::Accessor(method),
                MetaProperty::Field(_) => return None,
            },
            (ReceiverGuard::Type(_), Value::Map(_)) => PropertyAccess::MapEntry(Arc::from(name)),
            (ReceiverGuard::Instance(_), _) => match metaclass.property(name)? {
                MetaProperty::Field(field) => PropertyAccess::Field(field),
                MetaProperty::Accessor(method) => PropertyAccess::Accessor(method),
                MetaProperty::StaticField(_) => return None,
            },
            (ReceiverGuard::Type(_), _) => match metaclass.property(name)? {
                MetaProperty::Accessor(method) => PropertyAccess::Accessor(method),
                _ => return None,
            },
        };
        Some(Arc::new(PropertySite::new(
            header.clone(),
            guard,
            metaclass,
            version,
            access,
        )))
    }
}
