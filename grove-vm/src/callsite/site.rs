use std::sync::Arc;

use super::generic;
use super::shape::InvokeTier;
use super::table::CallSiteTable;
use crate::error::RuntimeResult;
use crate::value::{TypeId, Value};

/// Slot identity shared by every site that occupies the slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SiteHeader {
    pub(crate) index: usize,
    pub(crate) name: Arc<str>,
}

impl SiteHeader {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SiteTag {
    Generic,
    Null,
    Megamorphic,
    DynamicMethod,
    HostMethod,
    StaticMethod,
    Constructor,
    BeanConstructor,
    DynamicProperty,
    HostProperty,
    ClassProperty,
}

impl SiteTag {
    pub fn is_specialized(self) -> bool {
        !matches!(self, SiteTag::Generic | SiteTag::Null | SiteTag::Megamorphic)
    }
}

/// One occupant of a call site slot.
///
/// Every entry point has a default that goes through the generic path, so a
/// site only overrides the shapes it can serve from its cache. A site that
/// cannot prove its assumptions still hold must also take the generic path.
pub trait CallSite: Send + Sync {
    fn header(&self) -> &SiteHeader;

    fn tag(&self) -> SiteTag;

    /// Argument preparation the cached target skips, if the site caches one.
    fn tier(&self) -> Option<InvokeTier> {
        None
    }

    fn call(&self, table: &CallSiteTable, receiver: &Value, args: &[Value]) -> RuntimeResult<Value> {
        generic::default_call(table, self.header(), receiver, args)
    }

    fn call_current(
        &self,
        table: &CallSiteTable,
        receiver: &Value,
        args: &[Value],
    ) -> RuntimeResult<Value> {
        generic::default_current(table, self.header(), receiver, args)
    }

    fn call_static(&self, table: &CallSiteTable, receiver: TypeId, args: &[Value]) -> RuntimeResult<Value> {
        generic::default_static(table, self.header(), receiver, args)
    }

    fn call_constructor(
        &self,
        table: &CallSiteTable,
        receiver: TypeId,
        args: &[Value],
    ) -> RuntimeResult<Value> {
        generic::default_constructor(table, self.header(), receiver, args)
    }

    fn get_property(&self, table: &CallSiteTable, receiver: &Value) -> RuntimeResult<Value> {
        generic::default_property(table, self.header(), receiver)
    }
}
