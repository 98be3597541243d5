//! Deployment configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HyperError, HyperResult, ValidationError};
use crate::namespace::{NamespaceBinding, NamespaceRegistry};
use crate::router::{HandshakeMode, RouterConfig, DEFAULT_POLL_INTERVAL};

/// A subscription established at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Observed resource.
    pub topic: String,
    /// Hub or workspace IRI.
    pub source: String,
    #[serde(flatten)]
    pub mode: HandshakeMode,
}

/// Configuration loaded from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HyperConfig {
    /// Delay between polls of an empty notification queue.
    pub poll_interval_ms: u64,
    pub queue_capacity: usize,
    /// Initial namespace bindings, in registration order.
    pub namespaces: Vec<NamespaceBinding>,
    /// Callback IRI handed to hubs.
    pub callback_uri: String,
    pub bind_addr: String,
    /// WebID sent on focus requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_web_id: Option<String>,
    pub subscriptions: Vec<SubscriptionConfig>,
}

impl Default for HyperConfig {
    fn default() -> Self {
        let router = RouterConfig::default();
        Self {
            poll_interval_ms: u64::try_from(DEFAULT_POLL_INTERVAL.as_millis()).unwrap_or(100),
            queue_capacity: router.queue_capacity,
            namespaces: Vec::new(),
            callback_uri: "http://127.0.0.1:8081/notifications/".to_string(),
            bind_addr: "127.0.0.1:8081".to_string(),
            agent_web_id: None,
            subscriptions: Vec::new(),
        }
    }
}

impl HyperConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> HyperResult<Self> {
        let cfg: Self = serde_json::from_str(json).map_err(|e| invalid(format!("malformed JSON: {e}")))?;
        cfg.validate()
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> HyperResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| invalid(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Rejects a zero poll interval, a zero queue capacity and invalid
    /// namespace bindings.
    pub fn validate(self) -> HyperResult<Self> {
        if self.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms must be greater than zero".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(invalid("queue_capacity must be greater than zero".to_string()));
        }
        for binding in &self.namespaces {
            binding.validate()?;
        }
        Ok(self)
    }

    #[must_use]
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            queue_capacity: self.queue_capacity,
        }
    }

    /// Registry holding the configured bindings.
    pub fn namespace_registry(&self) -> HyperResult<NamespaceRegistry> {
        Ok(NamespaceRegistry::with_bindings(self.namespaces.iter().cloned())?)
    }
}

fn invalid(reason: String) -> HyperError {
    HyperError::Validation(ValidationError::InvalidConfig { reason })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let cfg = HyperConfig::default().validate().unwrap();
        assert_eq!(cfg.router_config().poll_interval, Duration::from_millis(100));
        assert_eq!(cfg.router_config().queue_capacity, 4096);
    }

    #[test]
    fn parses_full_document() {
        let cfg = HyperConfig::from_json_str(
            r#"{
                "poll_interval_ms": 25,
                "namespaces": [{"prefix": "ex", "identifier": "https://example.org/"}],
                "subscriptions": [
                    {"topic": "https://example.org/lamp", "source": "https://hub/", "mode": "web_sub"},
                    {"topic": "https://example.org/w1/lamp", "source": "https://example.org/w1",
                     "mode": "focus", "artifact_name": "lamp"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.router_config().poll_interval, Duration::from_millis(25));
        assert_eq!(cfg.namespace_registry().unwrap().compact("https://example.org/A"), "ex:A");
        assert_eq!(cfg.subscriptions[0].mode, HandshakeMode::WebSub);
        assert_eq!(
            cfg.subscriptions[1].mode,
            HandshakeMode::Focus {
                artifact_name: "lamp".to_string()
            }
        );
    }

    #[test]
    fn rejects_zero_interval_and_capacity() {
        assert!(HyperConfig::from_json_str(r#"{"poll_interval_ms": 0}"#).unwrap_err().is_validation());
        assert!(HyperConfig::from_json_str(r#"{"queue_capacity": 0}"#).unwrap_err().is_validation());
    }

    #[test]
    fn rejects_relative_namespace() {
        let err = HyperConfig::from_json_str(r#"{"namespaces": [{"prefix": "ex", "identifier": "relative/"}]}"#)
            .unwrap_err();
        assert!(format!("{err}").contains("must be absolute"));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"bind_addr": "0.0.0.0:9000"}}"#).unwrap();
        let cfg = HyperConfig::from_path(file.path()).unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:9000");
        assert!(HyperConfig::from_path("/nonexistent/hypersig.json").is_err());
    }
}
