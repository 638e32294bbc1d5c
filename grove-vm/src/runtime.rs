use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use serde::Serialize;
use tracing::warn;

use crate::config::CallSiteConfig;
use crate::meta::MetaClassRegistry;

/// Everything a call site table needs from its environment.
pub struct Runtime {
    registry: Arc<MetaClassRegistry>,
    config: CallSiteConfig,
    stats: CallSiteStats,
}

impl Runtime {
    pub fn new(registry: Arc<MetaClassRegistry>, config: CallSiteConfig) -> Arc<Self> {
        Arc::new(Self {
            registry,
            config,
            stats: CallSiteStats::default(),
        })
    }

    /// Fresh registry with default configuration.
    pub fn isolated() -> Arc<Self> {
        Self::new(Arc::new(MetaClassRegistry::new()), CallSiteConfig::default())
    }

    pub fn global() -> Arc<Runtime> {
        static GLOBAL: OnceLock<Arc<Runtime>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| {
                let config = CallSiteConfig::from_env().unwrap_or_else(|err| {
                    warn!("{err}; using default call site config");
                    CallSiteConfig::default()
                });
                Runtime::new(MetaClassRegistry::global(), config)
            })
            .clone()
    }

    pub fn registry(&self) -> &Arc<MetaClassRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &CallSiteConfig {
        &self.config
    }

    pub fn stats(&self) -> &CallSiteStats {
        &self.stats
    }
}

#[derive(Default)]
pub struct CallSiteStats {
    resolutions: AtomicU64,
    installs: AtomicU64,
    slow_path_calls: AtomicU64,
    megamorphic_transitions: AtomicU64,
}

impl CallSiteStats {
    pub(crate) fn record_resolution(&self) {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_install(&self) {
        self.installs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_slow_path(&self) {
        self.slow_path_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_megamorphic(&self) {
        self.megamorphic_transitions.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of times the resolver ran a full lookup.
    pub fn resolutions(&self) -> u64 {
        self.resolutions.load(Ordering::Relaxed)
    }

    pub fn installs(&self) -> u64 {
        self.installs.load(Ordering::Relaxed)
    }

    pub fn slow_path_calls(&self) -> u64 {
        self.slow_path_calls.load(Ordering::Relaxed)
    }

    pub fn megamorphic_transitions(&self) -> u64 {
        self.megamorphic_transitions.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            resolutions: self.resolutions(),
            installs: self.installs(),
            slow_path_calls: self.slow_path_calls(),
            megamorphic_transitions: self.megamorphic_transitions(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub resolutions: u64,
    pub installs: u64,
    pub slow_path_calls: u64,
    pub megamorphic_transitions: u64,
}

impl StatsSnapshot {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
