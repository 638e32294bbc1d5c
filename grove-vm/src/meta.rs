//! Metaobject protocol: per-type method directories with version counters.

mod category;
mod metaclass;
mod overload;
mod registry;

pub use category::{Category, has_active_category, use_category};
pub(crate) use category::find_category_method;
pub use metaclass::{
    ClassBuilder, InvokeHook, Invoker, Lookup, MetaClass, MetaKind, MetaMethod, MetaProperty,
    ParamType, Visibility,
};
pub use overload::{directly_assignable, param_distance};
pub use registry::MetaClassRegistry;
