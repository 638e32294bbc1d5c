use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use callsite_abi::{CallSiteManifest, SiteKind};
use parking_lot::RwLock;

use super::generic::GenericSite;
use super::shape::InvokeTier;
use super::site::{CallSite, SiteHeader, SiteTag};
use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::Runtime;
use crate::value::{TypeId, Value};

struct Slot {
    site: RwLock<Arc<dyn CallSite>>,
    kind: SiteKind,
    installs: AtomicU32,
}

/// Per-unit array of call site slots.
///
/// The slot count is fixed at construction. A slot's occupant is replaced
/// wholesale; the lock is held only for the pointer swap, never while a
/// site resolves or runs.
pub struct CallSiteTable {
    owner: TypeId,
    runtime: Arc<Runtime>,
    slots: Box<[Slot]>,
}

impl CallSiteTable {
    pub fn new(runtime: Arc<Runtime>, owner: TypeId, manifest: &CallSiteManifest) -> Self {
        Self::build(
            runtime,
            owner,
            manifest
                .sites
                .iter()
                .map(|descriptor| (descriptor.name.as_str(), descriptor.kind)),
        )
    }

    /// Table of plain-call slots, one per name.
    pub fn from_names<'a>(
        runtime: Arc<Runtime>,
        owner: TypeId,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self::build(
            runtime,
            owner,
            names.into_iter().map(|name| (name, SiteKind::Call)),
        )
    }

    fn build<'a>(
        runtime: Arc<Runtime>,
        owner: TypeId,
        slots: impl Iterator<Item = (&'a str, SiteKind)>,
    ) -> Self {
        let slots = slots
            .enumerate()
            .map(|(index, (name, kind))| {
                let header = SiteHeader {
                    index,
                    name: Arc::from(name),
                };
                Slot {
                    site: RwLock::new(Arc::new(GenericSite::new(header)) as Arc<dyn CallSite>),
                    kind,
                    installs: AtomicU32::new(0),
                }
            })
            .collect();
        Self {
            owner,
            runtime,
            slots,
        }
    }

    pub fn owner(&self) -> TypeId {
        self.owner
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, index: usize) -> RuntimeResult<&Slot> {
        self.slots.get(index).ok_or(RuntimeError::InvalidSlot(index))
    }

    fn site(&self, index: usize) -> RuntimeResult<Arc<dyn CallSite>> {
        Ok(self.slot(index)?.site.read().clone())
    }

    pub fn site_tag(&self, index: usize) -> Option<SiteTag> {
        self.slots.get(index).map(|slot| slot.site.read().tag())
    }

    pub fn site_tier(&self, index: usize) -> Option<InvokeTier> {
        self.slots.get(index).and_then(|slot| slot.site.read().tier())
    }

    pub fn slot_kind(&self, index: usize) -> Option<SiteKind> {
        self.slots.get(index).map(|slot| slot.kind)
    }

    pub fn slot_name(&self, index: usize) -> Option<Arc<str>> {
        self.slots
            .get(index)
            .map(|slot| slot.site.read().header().name.clone())
    }

    /// Specialized sites installed into the slot so far.
    pub fn install_count(&self, index: usize) -> u32 {
        self.slots
            .get(index)
            .map_or(0, |slot| slot.installs.load(Ordering::Relaxed))
    }

    pub(crate) fn install(&self, index: usize, site: Arc<dyn CallSite>) {
        let Some(slot) = self.slots.get(index) else {
            return;
        };
        *slot.site.write() = site;
        slot.installs.fetch_add(1, Ordering::Relaxed);
        self.runtime.stats().record_install();
    }

    /// Returns false when the slot was already megamorphic.
    pub(crate) fn replace_unless_megamorphic(&self, index: usize, site: Arc<dyn CallSite>) -> bool {
        let Some(slot) = self.slots.get(index) else {
            return false;
        };
        let mut occupant = slot.site.write();
        if occupant.tag() == SiteTag::Megamorphic {
            return false;
        }
        *occupant = site;
        true
    }

    pub fn call(&self, index: usize, receiver: &Value, args: &[Value]) -> RuntimeResult<Value> {
        self.site(index)?
            .call(self, receiver, args)
            .map_err(RuntimeError::unwrap_invocation)
    }

    /// Returns null without touching the slot when `receiver` is null.
    pub fn call_safe(&self, index: usize, receiver: &Value, args: &[Value]) -> RuntimeResult<Value> {
        if receiver.is_null() {
            return Ok(Value::Null);
        }
        self.call(index, receiver, args)
    }

    pub fn call_current(&self, index: usize, receiver: &Value, args: &[Value]) -> RuntimeResult<Value> {
        self.site(index)?
            .call_current(self, receiver, args)
            .map_err(RuntimeError::unwrap_invocation)
    }

    pub fn call_static(&self, index: usize, receiver: TypeId, args: &[Value]) -> RuntimeResult<Value> {
        self.site(index)?
            .call_static(self, receiver, args)
            .map_err(RuntimeError::unwrap_invocation)
    }

    pub fn call_constructor(
        &self,
        index: usize,
        receiver: TypeId,
        args: &[Value],
    ) -> RuntimeResult<Value> {
        self.site(index)?
            .call_constructor(self, receiver, args)
            .map_err(RuntimeError::unwrap_invocation)
    }

    pub fn get_property(&self, index: usize, receiver: &Value) -> RuntimeResult<Value> {
        self.site(index)?
            .get_property(self, receiver)
            .map_err(RuntimeError::unwrap_invocation)
    }

    pub fn get_property_safe(&self, index: usize, receiver: &Value) -> RuntimeResult<Value> {
        if receiver.is_null() {
            return Ok(Value::Null);
        }
        self.get_property(index, receiver)
    }

    pub fn call0(&self, index: usize, receiver: &Value) -> RuntimeResult<Value> {
        self.call(index, receiver, &[])
    }

    pub fn call_safe0(&self, index: usize, receiver: &Value) -> RuntimeResult<Value> {
        self.call_safe(index, receiver, &[])
    }

    pub fn call_current0(&self, index: usize, receiver: &Value) -> RuntimeResult<Value> {
        self.call_current(index, receiver, &[])
    }

    pub fn call_static0(&self, index: usize, receiver: TypeId) -> RuntimeResult<Value> {
        self.call_static(index, receiver, &[])
    }

    pub fn call_constructor0(&self, index: usize, receiver: TypeId) -> RuntimeResult<Value> {
        self.call_constructor(index, receiver, &[])
    }
}

macro_rules! fixed_arity {
    ($($call:ident, $safe:ident, $current:ident, $statik:ident, $ctor:ident => ($($arg:ident),+);)+) => {
        impl CallSiteTable {
            $(
                pub fn $call(&self, index: usize, receiver: &Value, $($arg: Value),+) -> RuntimeResult<Value> {
                    self.call(index, receiver, &[$($arg),+])
                }

                pub fn $safe(&self, index: usize, receiver: &Value, $($arg: Value),+) -> RuntimeResult<Value> {
                    self.call_safe(index, receiver, &[$($arg),+])
                }

                pub fn $current(&self, index: usize, receiver: &Value, $($arg: Value),+) -> RuntimeResult<Value> {
                    self.call_current(index, receiver, &[$($arg),+])
                }

                pub fn $statik(&self, index: usize, receiver: TypeId, $($arg: Value),+) -> RuntimeResult<Value> {
                    self.call_static(index, receiver, &[$($arg),+])
                }

                pub fn $ctor(&self, index: usize, receiver: TypeId, $($arg: Value),+) -> RuntimeResult<Value> {
                    self.call_constructor(index, receiver, &[$($arg),+])
                }
            )+
        }
    };
}

fixed_arity! {
    call1, call_safe1, call_current1, call_static1, call_constructor1 => (a0);
    call2, call_safe2, call_current2, call_static2, call_constructor2 => (a0, a1);
    call3, call_safe3, call_current3, call_static3, call_constructor3 => (a0, a1, a2);
    call4, call_safe4, call_current4, call_static4, call_constructor4 => (a0, a1, a2, a3);
}
