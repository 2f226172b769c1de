//! Client configuration.
//!
//! A [`ClientConfig`] is read from TOML, then optionally overridden by a
//! property map and by `RESTWIRE_*` environment variables, in that order.

pub mod properties;

use crate::constants;
use crate::error::Error;
use crate::resilience::{RetryConfig, TimeoutConfig};
use indexmap::IndexMap;
use properties::{PropertyKey, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Sub-resource handles start with the parent's pending headers.
    pub inherit_headers: bool,
    pub connect_timeout_ms: u64,
    pub receive_timeout_ms: u64,
    /// 3xx responses with a `Location` header are followed up to this many times.
    pub max_redirects: u32,
    /// Headers every root handle starts with.
    pub default_headers: IndexMap<String, String>,
    /// Wraps the HTTP transport in a retrying decorator when set.
    pub retry: Option<RetryConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let timeouts = TimeoutConfig::default();
        Self {
            inherit_headers: false,
            connect_timeout_ms: timeouts.connect_timeout_ms,
            receive_timeout_ms: timeouts.receive_timeout_ms,
            max_redirects: 0,
            default_headers: IndexMap::new(),
            retry: None,
        }
    }
}

impl ClientConfig {
    /// # Errors
    ///
    /// Returns [`Error::Toml`] when `content` is not a valid configuration.
    pub fn from_toml_str(content: &str) -> Result<Self, Error> {
        Ok(toml::from_str(content)?)
    }

    /// Loads a TOML file. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the file cannot be read, or [`Error::Toml`]
    /// when it does not parse.
    pub fn load(path: &Path) -> Result<Self, Error> {
        if !path.exists() {
            debug!(
                target: constants::LOG_TARGET,
                "No client config at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    #[must_use]
    pub const fn timeouts(&self) -> TimeoutConfig {
        TimeoutConfig {
            connect_timeout_ms: self.connect_timeout_ms,
            receive_timeout_ms: self.receive_timeout_ms,
        }
    }

    /// Applies recognized `restwire.*` properties. Unknown keys are skipped;
    /// unparseable timeouts are logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid non-timeout value.
    pub fn apply_properties(&mut self, properties: &HashMap<String, String>) -> Result<(), Error> {
        for (name, raw) in properties {
            let Ok(key) = name.parse::<PropertyKey>() else {
                debug!(target: constants::LOG_TARGET, "Ignoring unknown property '{name}'");
                continue;
            };
            let value = match PropertyValue::parse_for_key(key, raw) {
                Ok(value) => value,
                Err(e) if key.is_timeout() => {
                    warn!(target: constants::LOG_TARGET, "{e}; keeping the current timeout");
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.set(key, value);
        }
        Ok(())
    }

    /// Applies `RESTWIRE_CONNECT_TIMEOUT_MS` and `RESTWIRE_RECEIVE_TIMEOUT_MS`.
    pub fn apply_env(&mut self) {
        let overrides = [
            (constants::ENV_RESTWIRE_CONNECT_TIMEOUT_MS, PropertyKey::ConnectionTimeout),
            (constants::ENV_RESTWIRE_RECEIVE_TIMEOUT_MS, PropertyKey::ReceiveTimeout),
        ];
        for (var, key) in overrides {
            let Ok(raw) = std::env::var(var) else {
                continue;
            };
            match PropertyValue::parse_for_key(key, &raw) {
                Ok(value) => self.set(key, value),
                Err(e) => warn!(target: constants::LOG_TARGET, "{var}: {e}; ignored"),
            }
        }
    }

    fn set(&mut self, key: PropertyKey, value: PropertyValue) {
        match (key, value) {
            (PropertyKey::ConnectionTimeout, PropertyValue::U64(ms)) => self.connect_timeout_ms = ms,
            (PropertyKey::ReceiveTimeout, PropertyValue::U64(ms)) => self.receive_timeout_ms = ms,
            (PropertyKey::InheritHeaders, PropertyValue::Bool(inherit)) => {
                self.inherit_headers = inherit;
            }
            (PropertyKey::MaxRedirects, PropertyValue::U64(count)) => {
                self.max_redirects = u32::try_from(count).unwrap_or(u32::MAX);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_toml_str_with_defaults() {
        let config = ClientConfig::from_toml_str(
            r#"
inherit_headers = true
max_redirects = 2

[default_headers]
User-Agent = "restwire-test"

[retry]
max_attempts = 4
"#,
        )
        .unwrap();
        assert!(config.inherit_headers);
        assert_eq!(config.max_redirects, 2);
        assert_eq!(config.connect_timeout_ms, 10_000);
        assert_eq!(config.default_headers["User-Agent"], "restwire-test");
        let retry = config.retry.unwrap();
        assert_eq!(retry.max_attempts, 4);
        assert_eq!(retry.initial_delay_ms, 100);
    }

    #[test]
    fn test_invalid_toml_is_error() {
        assert!(matches!(
            ClientConfig::from_toml_str("max_redirects = \"many\""),
            Err(Error::Toml(_))
        ));
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "receive_timeout_ms = 1500").unwrap();
        let config = ClientConfig::load(file.path()).unwrap();
        assert_eq!(config.receive_timeout_ms, 1500);
    }

    #[test]
    fn test_apply_properties() {
        let mut config = ClientConfig::default();
        let properties = HashMap::from([
            (constants::PROP_CONNECTION_TIMEOUT.to_string(), "500".to_string()),
            (constants::PROP_RECEIVE_TIMEOUT.to_string(), "soon".to_string()),
            (constants::PROP_INHERIT_HEADERS.to_string(), "true".to_string()),
            ("other.framework.key".to_string(), "x".to_string()),
        ]);
        config.apply_properties(&properties).unwrap();
        assert_eq!(config.connect_timeout_ms, 500);
        assert_eq!(config.receive_timeout_ms, 30_000);
        assert!(config.inherit_headers);
    }

    #[test]
    fn test_invalid_non_timeout_property_is_error() {
        let mut config = ClientConfig::default();
        let properties = HashMap::from([(
            constants::PROP_MAX_REDIRECTS.to_string(),
            "lots".to_string(),
        )]);
        assert!(matches!(
            config.apply_properties(&properties),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_apply_env_overrides_timeouts() {
        std::env::set_var(constants::ENV_RESTWIRE_RECEIVE_TIMEOUT_MS, "750");
        std::env::set_var(constants::ENV_RESTWIRE_CONNECT_TIMEOUT_MS, "fast");
        let mut config = ClientConfig::default();
        config.apply_env();
        std::env::remove_var(constants::ENV_RESTWIRE_RECEIVE_TIMEOUT_MS);
        std::env::remove_var(constants::ENV_RESTWIRE_CONNECT_TIMEOUT_MS);
        assert_eq!(config.receive_timeout_ms, 750);
        assert_eq!(config.connect_timeout_ms, 10_000);
    }
}
