use super::generic;
use super::shape;
use super::site::{CallSite, SiteHeader, SiteTag};
use super::table::CallSiteTable;
use crate::error::{RuntimeError, RuntimeResult};
use crate::meta::{Lookup, MetaProperty};
use crate::value::{TypeId, Value};

/// Handles a receiver that turned out to be null. Never installed: the next
/// call through the slot classifies its receiver again.
pub(crate) struct NullSite {
    header: SiteHeader,
}

impl NullSite {
    pub(crate) fn new(header: SiteHeader) -> Self {
        Self { header }
    }
}

impl CallSite for NullSite {
    fn header(&self) -> &SiteHeader {
        &self.header
    }

    fn tag(&self) -> SiteTag {
        SiteTag::Null
    }

    fn call(&self, table: &CallSiteTable, receiver: &Value, args: &[Value]) -> RuntimeResult<Value> {
        if !receiver.is_null() {
            return generic::default_call(table, &self.header, receiver, args);
        }
        invoke_on_null(table, &self.header.name, args)
    }

    fn call_current(
        &self,
        table: &CallSiteTable,
        receiver: &Value,
        args: &[Value],
    ) -> RuntimeResult<Value> {
        if !receiver.is_null() {
            return generic::default_current(table, &self.header, receiver, args);
        }
        invoke_on_null(table, &self.header.name, args)
    }

    fn get_property(&self, table: &CallSiteTable, receiver: &Value) -> RuntimeResult<Value> {
        if !receiver.is_null() {
            return generic::default_property(table, &self.header, receiver);
        }
        property_on_null(table, &self.header.name)
    }
}

/// Dispatches `name` against the NullObject directory.
pub(crate) fn invoke_on_null(table: &CallSiteTable, name: &str, args: &[Value]) -> RuntimeResult<Value> {
    let null_class = table.runtime().registry().null_metaclass();
    let unwrapped = shape::unwrap_args(args);
    match null_class.pick_method(name, &unwrapped, Lookup::instance(TypeId::NULL)) {
        Some(method) => {
            let prepared = shape::coerce_args(method.params(), unwrapped);
            method
                .invoke(&Value::Null, &prepared)
                .map_err(RuntimeError::transport)
        }
        None => Err(RuntimeError::NullReceiver {
            name: name.to_string(),
            property: false,
        }),
    }
}

pub(crate) fn property_on_null(table: &CallSiteTable, name: &str) -> RuntimeResult<Value> {
    let null_class = table.runtime().registry().null_metaclass();
    match null_class.property(name) {
        Some(MetaProperty::Accessor(method)) => method
            .invoke(&Value::Null, &[])
            .map_err(RuntimeError::transport),
        _ => Err(RuntimeError::NullReceiver {
            name: name.to_string(),
            property: true,
        }),
    }
}
