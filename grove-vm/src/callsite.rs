//! Per-unit call site caching.
//!
//! Every invocation expression owns one slot in its unit's `CallSiteTable`.
//! A slot starts out generic; its first call classifies the receiver, asks
//! the resolver for a specialized site and installs it. Specialized sites
//! re-check the receiver type, the metaclass version and the argument types
//! on every call and go back through the generic path when any of them
//! changed.

mod fallback;
mod generic;
mod megamorphic;
mod null_site;
mod resolver;
mod shape;
mod site;
mod specialized;
mod table;

pub use shape::InvokeTier;
pub use site::{CallSite, SiteHeader, SiteTag};
pub use table::CallSiteTable;
