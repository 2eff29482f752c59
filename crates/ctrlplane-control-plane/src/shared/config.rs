use crate::shared::error::{ControlPlaneError, ControlPlaneResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_PROVIDER: &str = "local";
pub const DEFAULT_HOOK_TIMEOUT_MS: u64 = 5_000;

/// Global configuration for the control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlPlaneConfig {
    pub node_id: String,
    /// Provider used when a create request names none
    pub default_provider: String,
    /// Per-tenant instance cap; 0 means unlimited
    pub max_instances_per_tenant: usize,
    pub hook_timeout_ms: u64,
    pub audit_enabled: bool,
    pub metrics_enabled: bool,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            node_id: "node-1".to_string(),
            default_provider: DEFAULT_PROVIDER.to_string(),
            max_instances_per_tenant: 0,
            hook_timeout_ms: DEFAULT_HOOK_TIMEOUT_MS,
            audit_enabled: true,
            metrics_enabled: true,
        }
    }
}

impl ControlPlaneConfig {
    pub fn from_env() -> ControlPlaneResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup, falling back to defaults
    /// for missing or blank keys.
    pub fn from_lookup<F>(lookup: F) -> ControlPlaneResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        Ok(Self {
            node_id: get("CP_NODE_ID").unwrap_or(defaults.node_id),
            default_provider: get("CP_DEFAULT_PROVIDER").unwrap_or(defaults.default_provider),
            max_instances_per_tenant: match get("CP_MAX_INSTANCES") {
                Some(raw) => parse_number("CP_MAX_INSTANCES", &raw)?,
                None => defaults.max_instances_per_tenant,
            },
            hook_timeout_ms: match get("CP_HOOK_TIMEOUT_MS") {
                Some(raw) => parse_positive("CP_HOOK_TIMEOUT_MS", &raw)?,
                None => defaults.hook_timeout_ms,
            },
            audit_enabled: match get("CP_AUDIT_ENABLED") {
                Some(raw) => parse_bool("CP_AUDIT_ENABLED", &raw)?,
                None => defaults.audit_enabled,
            },
            metrics_enabled: match get("CP_METRICS_ENABLED") {
                Some(raw) => parse_bool("CP_METRICS_ENABLED", &raw)?,
                None => defaults.metrics_enabled,
            },
        })
    }

    pub fn hook_timeout(&self) -> Duration {
        Duration::from_millis(self.hook_timeout_ms)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> ControlPlaneResult<T> {
    raw.parse::<T>().map_err(|_| {
        ControlPlaneError::ValidationError(format!(
            "{key} must be a non-negative integer, got {raw:?}"
        ))
    })
}

/// A zero hook timeout would fail every hook that yields
fn parse_positive(key: &str, raw: &str) -> ControlPlaneResult<u64> {
    match parse_number::<u64>(key, raw)? {
        0 => Err(ControlPlaneError::ValidationError(format!(
            "{key} must be greater than zero"
        ))),
        value => Ok(value),
    }
}

fn parse_bool(key: &str, raw: &str) -> ControlPlaneResult<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ControlPlaneError::ValidationError(format!(
            "{key} must be a boolean, got {raw:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = ControlPlaneConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, ControlPlaneConfig::default());
        assert_eq!(config.hook_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_values_from_lookup() {
        let config = ControlPlaneConfig::from_lookup(lookup_from(&[
            ("CP_NODE_ID", "cp-7"),
            ("CP_DEFAULT_PROVIDER", "docker"),
            ("CP_MAX_INSTANCES", "25"),
            ("CP_HOOK_TIMEOUT_MS", "250"),
            ("CP_AUDIT_ENABLED", "false"),
            ("CP_METRICS_ENABLED", "On"),
        ]))
        .unwrap();

        assert_eq!(config.node_id, "cp-7");
        assert_eq!(config.default_provider, "docker");
        assert_eq!(config.max_instances_per_tenant, 25);
        assert_eq!(config.hook_timeout(), Duration::from_millis(250));
        assert!(!config.audit_enabled);
        assert!(config.metrics_enabled);
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config =
            ControlPlaneConfig::from_lookup(lookup_from(&[("CP_DEFAULT_PROVIDER", "  ")])).unwrap();
        assert_eq!(config.default_provider, DEFAULT_PROVIDER);
    }

    #[test]
    fn test_invalid_number_rejected() {
        let err = ControlPlaneConfig::from_lookup(lookup_from(&[("CP_MAX_INSTANCES", "-1")]))
            .unwrap_err();
        assert!(matches!(err, ControlPlaneError::ValidationError(_)));
        assert!(err.to_string().contains("CP_MAX_INSTANCES"));
    }

    #[test]
    fn test_zero_hook_timeout_rejected() {
        let err = ControlPlaneConfig::from_lookup(lookup_from(&[("CP_HOOK_TIMEOUT_MS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ControlPlaneError::ValidationError(_)));
        assert!(err.to_string().contains("CP_HOOK_TIMEOUT_MS"));

        // Zero keeps meaning "unlimited" for the instance cap
        let config =
            ControlPlaneConfig::from_lookup(lookup_from(&[("CP_MAX_INSTANCES", "0")])).unwrap();
        assert_eq!(config.max_instances_per_tenant, 0);
    }

    #[test]
    fn test_invalid_bool_rejected() {
        let err = ControlPlaneConfig::from_lookup(lookup_from(&[("CP_AUDIT_ENABLED", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("CP_AUDIT_ENABLED"));
    }
}
