use std::env;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const CACHE_ENV: &str = "GROVE_CALLSITE_CACHE";
pub const MEGAMORPHIC_THRESHOLD_ENV: &str = "GROVE_CALLSITE_MEGAMORPHIC_THRESHOLD";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallSiteConfig {
    /// When false every call takes the slow path and no slot is written.
    pub cache_enabled: bool,
    /// Specialized sites a slot may install before it goes megamorphic.
    pub megamorphic_threshold: u32,
}

impl Default for CallSiteConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            megamorphic_threshold: 16,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Json(serde_json::Error),
    InvalidValue { key: String, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Json(err) => write!(f, "invalid call site config: {err}"),
            ConfigError::InvalidValue { key, value } => {
                write!(f, "invalid value '{value}' for {key}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        ConfigError::Json(value)
    }
}

impl CallSiteConfig {
    pub fn uncached() -> Self {
        Self {
            cache_enabled: false,
            ..Self::default()
        }
    }

    pub fn from_json(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env` with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = lookup(CACHE_ENV) {
            config.cache_enabled = parse_switch(CACHE_ENV, &value)?;
        }
        if let Some(value) = lookup(MEGAMORPHIC_THRESHOLD_ENV) {
            config.megamorphic_threshold =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: MEGAMORPHIC_THRESHOLD_ENV.to_string(),
                        value: value.clone(),
                    })?;
        }
        Ok(config)
    }
}

fn parse_switch(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let config = CallSiteConfig::from_json(r#"{"megamorphic_threshold": 2}"#)
            .expect("config should parse");
        assert!(config.cache_enabled);
        assert_eq!(config.megamorphic_threshold, 2);
    }

    #[test]
    fn env_switch_disables_cache() {
        let config = CallSiteConfig::from_lookup(|key| {
            (key == CACHE_ENV).then(|| "off".to_string())
        })
        .expect("config should load");
        assert_eq!(config, CallSiteConfig::uncached());
    }

    #[test]
    fn env_rejects_bad_threshold() {
        let err = CallSiteConfig::from_lookup(|key| {
            (key == MEGAMORPHIC_THRESHOLD_ENV).then(|| "many".to_string())
        })
        .expect_err("threshold should be rejected");
        assert!(err.to_string().contains(MEGAMORPHIC_THRESHOLD_ENV));
    }
}
