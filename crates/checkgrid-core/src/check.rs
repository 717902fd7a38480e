//! Cluster check configurations and their content digest.
//!
//! A `CheckConfig` is produced by an external config source and is opaque
//! to the dispatcher except for its name, its `cluster_check` flag and its
//! digest. The digest is the identity key: two configs with the same digest
//! are the same unit of work.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest as _, Sha256};

/// Hex content fingerprint of a `CheckConfig`.
pub type Digest = String;

/// Number of digest bytes kept (hex-encoded to twice as many chars).
const DIGEST_BYTES: usize = 8;

/// A check configuration as pushed by the config source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Check name, e.g. `http_check`.
    pub name: String,
    /// Shared `init_config` section.
    #[serde(default)]
    pub init_config: Value,
    /// One entry per check instance.
    #[serde(default)]
    pub instances: Vec<Value>,
    #[serde(default)]
    pub logs_config: Value,
    /// Autodiscovery identifiers the config was resolved from.
    #[serde(default)]
    pub ad_identifiers: Vec<String>,
    /// Node the config is pinned to by its source, if any.
    #[serde(default)]
    pub node_name: String,
    /// Name of the config source that produced this config.
    #[serde(default)]
    pub provider: String,
    /// Only configs with this flag set are dispatched across the cluster.
    #[serde(default)]
    pub cluster_check: bool,
}

impl CheckConfig {
    /// A cluster-scoped config with no instances.
    pub fn cluster_check(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cluster_check: true,
            ..Self::default()
        }
    }

    /// Append a check instance.
    pub fn with_instance(mut self, instance: Value) -> Self {
        self.instances.push(instance);
        self
    }

    /// Replace the shared init config.
    pub fn with_init_config(mut self, init_config: Value) -> Self {
        self.init_config = init_config;
        self
    }

    /// Whether this config is managed by the cluster dispatcher.
    pub fn is_cluster_check(&self) -> bool {
        self.cluster_check
    }

    /// Compute the content digest.
    ///
    /// Covers the name, init config, instances, logs config, AD identifiers
    /// and node name. JSON object keys are hashed in sorted order and each
    /// instance's `tags` list is sorted first, so the digest does not depend
    /// on map or tag ordering. `provider` and `cluster_check` are excluded.
    pub fn digest(&self) -> Digest {
        let mut hasher = Sha256::new();
        write_field(&mut hasher, self.name.as_bytes());
        write_field(&mut hasher, canonical_json(&self.init_config).as_bytes());

        hasher.update((self.instances.len() as u64).to_le_bytes());
        for instance in &self.instances {
            write_field(&mut hasher, canonical_json(&normalize_instance(instance)).as_bytes());
        }

        write_field(&mut hasher, canonical_json(&self.logs_config).as_bytes());
        hasher.update((self.ad_identifiers.len() as u64).to_le_bytes());
        for id in &self.ad_identifiers {
            write_field(&mut hasher, id.as_bytes());
        }
        write_field(&mut hasher, self.node_name.as_bytes());

        let hash = hasher.finalize();
        hex::encode(&hash[..DIGEST_BYTES])
    }
}

/// Length-prefix every field so adjacent fields cannot alias.
fn write_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Sort an instance's `tags` array when it only contains strings.
fn normalize_instance(instance: &Value) -> Value {
    let mut instance = instance.clone();
    if let Some(Value::Array(tags)) = instance.get_mut("tags") {
        if tags.iter().all(Value::is_string) {
            tags.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
        }
    }
    instance
}

/// Serialize a JSON value with object keys in sorted order.
fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn digest_is_stable_for_equal_configs() {
        let a = CheckConfig::cluster_check("http_check")
            .with_instance(json!({"url": "http://a", "timeout": 5}));
        let b = a.clone();
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), DIGEST_BYTES * 2);
    }

    #[test]
    fn digest_differs_by_name() {
        let a = CheckConfig::cluster_check("A");
        let b = CheckConfig::cluster_check("B");
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn digest_ignores_key_order() {
        let a: Value = serde_json::from_str(r#"{"url": "http://a", "timeout": 5}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"timeout": 5, "url": "http://a"}"#).unwrap();
        let ca = CheckConfig::cluster_check("http_check").with_instance(a);
        let cb = CheckConfig::cluster_check("http_check").with_instance(b);
        assert_eq!(ca.digest(), cb.digest());
    }

    #[test]
    fn digest_ignores_tag_order() {
        let a = CheckConfig::cluster_check("http_check")
            .with_instance(json!({"tags": ["env:prod", "team:core"]}));
        let b = CheckConfig::cluster_check("http_check")
            .with_instance(json!({"tags": ["team:core", "env:prod"]}));
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn digest_ignores_scope_flag_and_provider() {
        let mut a = CheckConfig::cluster_check("redis");
        a.provider = "file".to_string();
        let mut b = a.clone();
        b.cluster_check = false;
        b.provider = "kubernetes".to_string();
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn digest_covers_instances_and_init_config() {
        let base = CheckConfig::cluster_check("redis");
        let with_instance = base.clone().with_instance(json!({"host": "10.0.0.1"}));
        let with_init = base.clone().with_init_config(json!({"service": "cache"}));
        assert_ne!(base.digest(), with_instance.digest());
        assert_ne!(base.digest(), with_init.digest());
        assert_ne!(with_instance.digest(), with_init.digest());
    }

    #[test]
    fn field_framing_prevents_aliasing() {
        let mut a = CheckConfig::cluster_check("ab");
        a.node_name = "c".to_string();
        let mut b = CheckConfig::cluster_check("a");
        b.node_name = "bc".to_string();
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: CheckConfig =
            serde_json::from_str(r#"{"name": "ntp", "cluster_check": true}"#).unwrap();
        assert!(config.is_cluster_check());
        assert!(config.instances.is_empty());
        assert_eq!(config.init_config, Value::Null);
    }
}
