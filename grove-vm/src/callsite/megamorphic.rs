use super::fallback;
use super::null_site;
use super::site::{CallSite, SiteHeader, SiteTag};
use super::table::CallSiteTable;
use crate::error::RuntimeResult;
use crate::value::{TypeId, Value};

/// Terminal occupant of a slot that has seen too many shapes. Every call
/// does a full lookup and nothing is installed again.
pub(crate) struct MegamorphicSite {
    header: SiteHeader,
}

impl MegamorphicSite {
    pub(crate) fn new(header: SiteHeader) -> Self {
        Self { header }
    }
}

impl CallSite for MegamorphicSite {
    fn header(&self) -> &SiteHeader {
        &self.header
    }

    fn tag(&self) -> SiteTag {
        SiteTag::Megamorphic
    }

    fn call(&self, table: &CallSiteTable, receiver: &Value, args: &[Value]) -> RuntimeResult<Value> {
        if receiver.is_null() {
            return null_site::invoke_on_null(table, &self.header.name, args);
        }
        fallback::call(table, &self.header.name, receiver, args, false)
    }

    fn call_current(
        &self,
        table: &CallSiteTable,
        receiver: &Value,
        args: &[Value],
    ) -> RuntimeResult<Value> {
        if receiver.is_null() {
            return null_site::invoke_on_null(table, &self.header.name, args);
        }
        fallback::call(table, &self.header.name, receiver, args, true)
    }

    fn call_static(&self, table: &CallSiteTable, receiver: TypeId, args: &[Value]) -> RuntimeResult<Value> {
        fallback::call_static(table, &self.header.name, receiver, args)
    }

    fn call_constructor(
        &self,
        table: &CallSiteTable,
        receiver: TypeId,
        args: &[Value],
    ) -> RuntimeResult<Value> {
        fallback::call_constructor(table, receiver, args)
    }

    fn get_property(&self, table: &CallSiteTable, receiver: &Value) -> RuntimeResult<Value> {
        fallback::get_property(table, &self.header.name, receiver)
    }
}
