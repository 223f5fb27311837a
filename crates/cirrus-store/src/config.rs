//! Configuration lookup.
//!
//! A store only needs one value from its environment: the connection string
//! stored under [`CONNECTION_STRING_KEY`]. Where that value lives is up to
//! the [`ConfigProvider`].

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Key under which the connection string is resolved.
pub const CONNECTION_STRING_KEY: &str = "SystemStorageConnectionString";

/// Source of configuration values.
pub trait ConfigProvider {
    /// Value for `key`, or `None` if it is not configured.
    fn resolve(&self, key: &str) -> Option<String>;
}

impl ConfigProvider for HashMap<String, String> {
    fn resolve(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl ConfigProvider for BTreeMap<String, String> {
    fn resolve(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Configuration read from process environment variables.
///
/// `EnvConfig::with_prefix("CIRRUS_")` resolves `SystemStorageConnectionString`
/// from `CIRRUS_SystemStorageConnectionString`.
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    prefix: String,
}

impl EnvConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl ConfigProvider for EnvConfig {
    fn resolve(&self, key: &str) -> Option<String> {
        std::env::var(format!("{}{key}", self.prefix)).ok()
    }
}

/// Configuration loaded from a flat TOML table of string values.
///
/// ```toml
/// SystemStorageConnectionString = "Backend=filesystem;Root=/var/blobs"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileConfig {
    values: BTreeMap<String, String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> StoreResult<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            StoreError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> StoreResult<Self> {
        toml::from_str(raw).map_err(|e| StoreError::configuration(format!("invalid TOML: {e}")))
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl ConfigProvider for FileConfig {
    fn resolve(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// The configured connection string, which must be present and non-blank.
pub fn resolve_connection_string(provider: &dyn ConfigProvider) -> StoreResult<String> {
    match provider.resolve(CONNECTION_STRING_KEY) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        Some(_) => Err(StoreError::configuration(format!(
            "{CONNECTION_STRING_KEY} is empty"
        ))),
        None => Err(StoreError::configuration(format!(
            "{CONNECTION_STRING_KEY} is not configured"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn hashmap_provider() {
        let mut map = HashMap::new();
        map.insert(CONNECTION_STRING_KEY.to_string(), "Backend=memory".to_string());
        assert_eq!(resolve_connection_string(&map).unwrap(), "Backend=memory");
    }

    #[test]
    fn missing_or_blank_value_is_configuration_error() {
        let empty: HashMap<String, String> = HashMap::new();
        let err = resolve_connection_string(&empty).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let mut blank = BTreeMap::new();
        blank.insert(CONNECTION_STRING_KEY.to_string(), "  ".to_string());
        let err = resolve_connection_string(&blank).unwrap_err();
        assert!(err.to_string().contains("is empty"));
    }

    #[test]
    fn file_config_from_toml() {
        let config = FileConfig::from_toml_str(
            r#"SystemStorageConnectionString = "Backend=filesystem;Root=/var/blobs""#,
        )
        .unwrap();
        assert_eq!(
            config.resolve(CONNECTION_STRING_KEY).as_deref(),
            Some("Backend=filesystem;Root=/var/blobs")
        );
        assert_eq!(config.resolve("Other"), None);
    }

    #[test]
    fn file_config_load_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cirrus.toml");
        fs::write(&path, "SystemStorageConnectionString = \"Backend=memory\"\n").unwrap();
        let config = FileConfig::load(&path).unwrap();
        assert_eq!(resolve_connection_string(&config).unwrap(), "Backend=memory");
    }

    #[test]
    fn file_config_rejects_non_string_values() {
        let err = FileConfig::from_toml_str("SystemStorageConnectionString = 5").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn missing_file_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let err = FileConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn env_provider_uses_prefix() {
        let key = "CIRRUS_CONFIG_TEST_SystemStorageConnectionString";
        std::env::set_var(key, "Backend=memory");
        let config = EnvConfig::with_prefix("CIRRUS_CONFIG_TEST_");
        assert_eq!(
            config.resolve(CONNECTION_STRING_KEY).as_deref(),
            Some("Backend=memory")
        );
        assert_eq!(EnvConfig::new().resolve("CIRRUS_CONFIG_TEST_UNSET"), None);
        std::env::remove_var(key);
    }
}
