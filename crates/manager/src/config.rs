use std::env;
use std::time::Duration;

use layers::LabelsConfig;
use layers::symbology::ZoomPolicy;
use runtime::DEFAULT_EVENT_CAPACITY;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Quiescence window before staged features are flushed.
    pub debounce_ms: u64,
    pub zoom: ZoomPolicy,
    /// Events kept for hosts that poll instead of subscribing.
    pub event_capacity: usize,
    /// Label rules; `None` disables the label overlay.
    pub labels: Option<LabelsConfig>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            zoom: ZoomPolicy::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            labels: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Json(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Json(msg) => write!(f, "invalid manager config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ManagerConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Defaults overlaid with `LAYERS_*` environment variables. Unparsable
    /// values keep the default.
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            debounce_ms: env_var_u64("LAYERS_DEBOUNCE_MS", base.debounce_ms),
            zoom: ZoomPolicy {
                max_sane_min_zoom: env_var_f64("LAYERS_MAX_SANE_MIN_ZOOM", base.zoom.max_sane_min_zoom),
                min_sane_max_zoom: env_var_f64("LAYERS_MIN_SANE_MAX_ZOOM", base.zoom.min_sane_max_zoom),
                ..base.zoom
            },
            event_capacity: env_var_usize("LAYERS_EVENT_CAPACITY", base.event_capacity),
            labels: base.labels,
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Json(e.to_string()))
    }
}

fn env_var_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_var_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_var_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn json_overrides_merge_with_defaults() {
        let cfg = ManagerConfig::from_json_str(
            r#"{"debounce_ms": 250, "event_capacity": 8, "zoom": {"max_sane_min_zoom": 18}, "labels": {"max_labels": 5}}"#,
        )
        .unwrap();
        assert_eq!(cfg.debounce(), Duration::from_millis(250));
        assert_eq!(cfg.event_capacity, 8);
        assert_eq!(cfg.zoom.max_sane_min_zoom, 18.0);
        assert_eq!(cfg.zoom.min_sane_max_zoom, 10.0);
        let labels = cfg.labels.unwrap();
        assert_eq!(labels.max_labels, 5);
        assert_eq!(labels.rules.len(), 1);
    }

    #[test]
    fn bad_json_is_an_error() {
        assert!(matches!(ManagerConfig::from_json_str("{"), Err(ConfigError::Json(_))));
    }

    #[test]
    fn empty_object_is_default() {
        assert_eq!(ManagerConfig::from_json_str("{}").unwrap(), ManagerConfig::default());
    }
}
