//! Named rate-limiting policy presets.
//!
//! Policies are declarative (namespace, action, burst_limit, window_size)
//! tuples held in a pluggable registry, so new action classes can register
//! their own policy instead of hardcoding limiter construction at call
//! sites. Registries can also be loaded from YAML.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::limiter::SlidingWindowLimiter;
use crate::error::{FloodgateError, Result};

/// Namespace of the built-in API action presets.
pub const API_ACTION_NAMESPACE: &str = "api_action";
/// Action name for per-user message sends.
pub const SEND_MESSAGE_USER: &str = "send_message--user";
/// Action name for per-group message sends.
pub const SEND_MESSAGE_GROUP: &str = "send_message--group";

/// A key that uniquely identifies a rate-limiting policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PresetKey {
    /// Policy namespace, grouping related action classes.
    pub namespace: String,
    /// The throttled action class.
    pub action: String,
}

impl PresetKey {
    pub fn new(namespace: &str, action: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            action: action.to_string(),
        }
    }

    /// String form of the key, useful for logging and debugging.
    pub fn to_string_key(&self) -> String {
        format!("{}/{}", self.namespace, self.action)
    }
}

/// Declarative rate-limiting policy for one action class.
///
/// `burst_limit` is kept as requested; normalization to the effective
/// burst (`max(floor(requested) - 1, 1)`) happens when a limiter is
/// instantiated. A `window_size_sec` of zero or less produces a disabled
/// limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Policy namespace.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// The throttled action class.
    pub action: String,
    /// Requested burst limit within one window.
    pub burst_limit: f64,
    /// Rolling window length in seconds.
    pub window_size_sec: f64,
}

fn default_namespace() -> String {
    "generic".to_string()
}

impl LimiterConfig {
    /// The registry key for this policy.
    pub fn key(&self) -> PresetKey {
        PresetKey::new(&self.namespace, &self.action)
    }

    /// Produce a live limiter configured with this policy.
    ///
    /// The returned limiter serves blocking and async callers alike, so
    /// no execution context needs to be chosen here.
    pub fn instantiate(&self) -> SlidingWindowLimiter {
        debug!(
            key = %self.key().to_string_key(),
            burst_limit = self.burst_limit,
            window_size_sec = self.window_size_sec,
            "Instantiating rate limiter from preset"
        );
        SlidingWindowLimiter::new(self.burst_limit, self.window_size_sec)
    }
}

/// On-disk registry format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PresetFile {
    #[serde(default)]
    presets: Vec<LimiterConfig>,
}

/// A named table of limiter policies.
///
/// This struct is thread-safe and can be shared across multiple tasks.
pub struct PresetRegistry {
    presets: RwLock<HashMap<PresetKey, LimiterConfig>>,
}

impl PresetRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            presets: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry holding the built-in presets.
    ///
    /// The built-ins mirror chained bot API limits: `send_message` to a
    /// user at 30 messages per 1.017s, and `send_message` to a group at
    /// 20 messages per 61.02s.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(API_ACTION_NAMESPACE, SEND_MESSAGE_USER, 30.0, 1.017);
        registry.register(API_ACTION_NAMESPACE, SEND_MESSAGE_GROUP, 20.0, 61.02);
        registry
    }

    /// Load a registry from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: PresetFile = serde_yaml::from_str(yaml)
            .map_err(|e| FloodgateError::Config(format!("Failed to parse preset config: {}", e)))?;

        let registry = Self::new();
        {
            let mut presets = registry.presets.write();
            for preset in file.presets {
                presets.insert(preset.key(), preset);
            }
        }
        Ok(registry)
    }

    /// Load a registry from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading limiter preset configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Register a policy, returning the stored config.
    ///
    /// Re-registering the same (namespace, action) pair replaces the
    /// previous policy.
    pub fn register(
        &self,
        namespace: &str,
        action: &str,
        burst_limit: f64,
        window_size_sec: f64,
    ) -> LimiterConfig {
        let config = LimiterConfig {
            namespace: namespace.to_string(),
            action: action.to_string(),
            burst_limit,
            window_size_sec,
        };
        debug!(key = %config.key().to_string_key(), "Registering limiter preset");
        self.presets.write().insert(config.key(), config.clone());
        config
    }

    /// Look up a registered policy.
    pub fn get(&self, namespace: &str, action: &str) -> Option<LimiterConfig> {
        self.presets
            .read()
            .get(&PresetKey::new(namespace, action))
            .cloned()
    }

    /// Instantiate a limiter for a registered policy, if one exists.
    pub fn instantiate(&self, namespace: &str, action: &str) -> Option<SlidingWindowLimiter> {
        self.get(namespace, action).map(|config| config.instantiate())
    }

    /// Number of registered presets.
    pub fn len(&self) -> usize {
        self.presets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.read().is_empty()
    }
}

impl Default for PresetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        let registry = PresetRegistry::new();
        registry.register("jobs", "sync", 10.0, 5.0);

        let config = registry.get("jobs", "sync").unwrap();
        assert_eq!(config.namespace, "jobs");
        assert_eq!(config.action, "sync");
        assert_eq!(config.burst_limit, 10.0);
        assert_eq!(config.window_size_sec, 5.0);

        assert!(registry.get("jobs", "other").is_none());
        assert!(registry.get("other", "sync").is_none());
    }

    #[test]
    fn test_reregistering_replaces() {
        let registry = PresetRegistry::new();
        registry.register("jobs", "sync", 10.0, 5.0);
        registry.register("jobs", "sync", 20.0, 9.0);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("jobs", "sync").unwrap().burst_limit, 20.0);
    }

    #[test]
    fn test_builtin_presets() {
        let registry = PresetRegistry::with_builtins();
        assert_eq!(registry.len(), 2);

        let user = registry
            .get(API_ACTION_NAMESPACE, SEND_MESSAGE_USER)
            .unwrap();
        assert_eq!(user.burst_limit, 30.0);
        assert_eq!(user.window_size_sec, 1.017);

        let group = registry
            .get(API_ACTION_NAMESPACE, SEND_MESSAGE_GROUP)
            .unwrap();
        assert_eq!(group.burst_limit, 20.0);
        assert_eq!(group.window_size_sec, 61.02);
    }

    #[test]
    fn test_instantiate_normalizes_burst() {
        let registry = PresetRegistry::with_builtins();
        let limiter = registry
            .instantiate(API_ACTION_NAMESPACE, SEND_MESSAGE_USER)
            .unwrap();

        assert_eq!(limiter.burst_limit(), 29);
        assert_eq!(limiter.window_size_sec(), 1.017);
        assert!(!limiter.is_disabled());

        assert!(registry.instantiate("missing", "preset").is_none());
    }

    #[test]
    fn test_instantiated_limiter_records_through_async_scope() {
        let registry = PresetRegistry::with_builtins();
        let limiter = registry
            .instantiate(API_ACTION_NAMESPACE, SEND_MESSAGE_GROUP)
            .unwrap();

        tokio_test::block_on(async {
            let permit = limiter.acquire().await;
            drop(permit);
            assert_eq!(limiter.queue_len().await, 1);
        });
    }

    #[test]
    fn test_parse_yaml_registry() {
        let yaml = r#"
presets:
  - namespace: api_action
    action: send_message--user
    burst_limit: 30
    window_size_sec: 1.017
  - action: bulk_export
    burst_limit: 5
    window_size_sec: 60
"#;
        let registry = PresetRegistry::from_yaml(yaml).unwrap();
        assert_eq!(registry.len(), 2);

        let user = registry.get("api_action", "send_message--user").unwrap();
        assert_eq!(user.burst_limit, 30.0);

        // Omitted namespaces default to "generic".
        let export = registry.get("generic", "bulk_export").unwrap();
        assert_eq!(export.window_size_sec, 60.0);
    }

    #[test]
    fn test_parse_invalid_yaml_fails() {
        let result = PresetRegistry::from_yaml("presets: {not: [a, list}");
        assert!(matches!(result, Err(FloodgateError::Config(_))));
    }

    #[test]
    fn test_key_string_form() {
        let key = PresetKey::new("api_action", "send_message--user");
        assert_eq!(key.to_string_key(), "api_action/send_message--user");
    }
}
