use std::sync::Arc;

use tracing::{debug, trace};

use super::fallback;
use super::megamorphic::MegamorphicSite;
use super::null_site::NullSite;
use super::resolver::Resolver;
use super::site::{CallSite, SiteHeader, SiteTag};
use super::table::CallSiteTable;
use crate::error::RuntimeResult;
use crate::meta::has_active_category;
use crate::value::{TypeId, Value};

/// Initial occupant of every slot.
pub(crate) struct GenericSite {
    header: SiteHeader,
}

impl GenericSite {
    pub(crate) fn new(header: SiteHeader) -> Self {
        Self { header }
    }
}

impl CallSite for GenericSite {
    fn header(&self) -> &SiteHeader {
        &self.header
    }

    fn tag(&self) -> SiteTag {
        SiteTag::Generic
    }
}

/// Resolves a site for `header` and installs it, or returns `None` when the
/// call has to run uncached.
fn specialize<'t>(
    table: &'t CallSiteTable,
    header: &SiteHeader,
    resolve: impl FnOnce(&Resolver<'t>) -> Option<Arc<dyn CallSite>>,
) -> Option<Arc<dyn CallSite>> {
    let runtime = table.runtime();
    if !runtime.config().cache_enabled || has_active_category() {
        return None;
    }
    let threshold = runtime.config().megamorphic_threshold;
    if table.install_count(header.index) >= threshold {
        let megamorphic: Arc<dyn CallSite> = Arc::new(MegamorphicSite::new(header.clone()));
        if table.replace_unless_megamorphic(header.index, megamorphic) {
            runtime.stats().record_megamorphic();
            debug!(
                "call site {}#{} '{}' went megamorphic after {} installs",
                table.owner(),
                header.index,
                header.name,
                threshold
            );
        }
        return None;
    }
    let resolver = Resolver::new(table);
    let Some(site) = resolve(&resolver) else {
        trace!(
            "call site {}#{} '{}' unresolved; taking slow path",
            table.owner(),
            header.index,
            header.name
        );
        return None;
    };
    table.install(header.index, site.clone());
    trace!(
        "call site {}#{} '{}' specialized as {:?}",
        table.owner(),
        header.index,
        header.name,
        site.tag()
    );
    Some(site)
}

pub(crate) fn default_call(
    table: &CallSiteTable,
    header: &SiteHeader,
    receiver: &Value,
    args: &[Value],
) -> RuntimeResult<Value> {
    if receiver.is_null() {
        return NullSite::new(header.clone()).call(table, receiver, args);
    }
    match specialize(table, header, |resolver| {
        resolver.resolve_call(header, receiver, args, false)
    }) {
        Some(site) => site.call(table, receiver, args),
        None => fallback::call(table, &header.name, receiver, args, false),
    }
}

pub(crate) fn default_current(
    table: &CallSiteTable,
    header: &SiteHeader,
    receiver: &Value,
    args: &[Value],
) -> RuntimeResult<Value> {
    if receiver.is_null() {
        return NullSite::new(header.clone()).call(table, receiver, args);
    }
    match specialize(table, header, |resolver| {
        resolver.resolve_call(header, receiver, args, true)
    }) {
        Some(site) => site.call_current(table, receiver, args),
        None => fallback::call(table, &header.name, receiver, args, true),
    }
}

pub(crate) fn default_static(
    table: &CallSiteTable,
    header: &SiteHeader,
    receiver: TypeId,
    args: &[Value],
) -> RuntimeResult<Value> {
    match specialize(table, header, |resolver| {
        resolver.resolve_static(header, receiver, args)
    }) {
        Some(site) => site.call_static(table, receiver, args),
        None => fallback::call_static(table, &header.name, receiver, args),
    }
}

pub(crate) fn default_constructor(
    table: &CallSiteTable,
    header: &SiteHeader,
    receiver: TypeId,
    args: &[Value],
) -> RuntimeResult<Value> {
    match specialize(table, header, |resolver| {
        resolver.resolve_constructor(header, receiver, args)
    }) {
        Some(site) => site.call_constructor(table, receiver, args),
        None => fallback::call_constructor(table, receiver, args),
    }
}

pub(crate) fn default_property(
    table: &CallSiteTable,
    header: &SiteHeader,
    receiver: &Value,
) -> RuntimeResult<Value> {
    if receiver.is_null() {
        return NullSite::new(header.clone()).get_property(table, receiver);
    }
    match specialize(table, header, |resolver| {
        resolver.resolve_property(header, receiver)
    }) {
        Some(site) => site.get_property(table, receiver),
        None => fallback::get_property(table, &header.name, receiver),
    }
}
