// Layered settings store

use crate::de;
use crate::env::EnvLoader;
use crate::loader::{ConfigLoader, FileFormat};
use crate::{ConfigError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Settings merged from files, `.env` and the environment.
///
/// Each load deep-merges into the tree, so later sources override earlier
/// ones key by key. Keys are dotted paths (`dispatcher.error_message`).
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Arc<RwLock<Map<String, Value>>>,
    env: EnvLoader,
}

impl ConfigManager {
    /// Manager reading `SWITCHYARD_`-prefixed variables.
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(Map::new())),
            env: EnvLoader::default(),
        }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            config: Arc::new(RwLock::new(Map::new())),
            env: EnvLoader::new(Some(prefix.into())),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Map<String, Value>> {
        self.config.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Map<String, Value>> {
        self.config.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Merge a settings tree over the current one.
    pub fn merge_value(&self, value: Value) -> Result<()> {
        let Value::Object(incoming) = value else {
            return Err(ConfigError::ParseError(
                "top-level settings must be an object".to_string(),
            ));
        };
        deep_merge(&mut self.write(), incoming);
        Ok(())
    }

    pub fn load_env(&self) -> Result<()> {
        let vars = self.env.load();
        debug!(prefix = ?self.env.prefix(), keys = vars.len(), "Loaded environment settings");
        deep_merge(&mut self.write(), vars);
        Ok(())
    }

    /// Load a `.env` file into the process environment, then read the
    /// environment. Without a path a missing `.env` is not an error.
    pub fn load_dotenv(&self, path: Option<&str>) -> Result<()> {
        match path {
            Some(path) => {
                dotenvy::from_path(path).map_err(|e| ConfigError::LoadError(e.to_string()))?;
            }
            None => {
                if let Err(e) = dotenvy::dotenv() {
                    debug!(error = %e, "No .env file loaded");
                }
            }
        }
        self.load_env()
    }

    pub fn load_file(&self, path: impl AsRef<Path>, format: FileFormat) -> Result<()> {
        let path = path.as_ref();
        let data = ConfigLoader::new(format).load_file(path)?;
        debug!(path = %path.display(), ?format, "Loaded settings file");
        self.merge_value(data)
    }

    /// Load a file whose format is implied by its extension.
    pub fn load_file_auto(&self, path: impl AsRef<Path>) -> Result<()> {
        let format = FileFormat::detect(path.as_ref())?;
        self.load_file(path, format)
    }

    pub fn load_str(&self, content: &str, format: FileFormat) -> Result<()> {
        let data = ConfigLoader::new(format).parse(content)?;
        self.merge_value(data)
    }

    /// Set a value at a dotted key, creating intermediate objects.
    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| ConfigError::SerializationError(e.to_string()))?;

        let mut config = self.write();
        let mut segments: Vec<&str> = key.split('.').collect();
        let leaf = segments.pop().unwrap_or(key);
        let mut current: &mut Map<String, Value> = &mut config;
        for segment in segments {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Value::Object(next) = entry else {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    reason: format!("'{}' is not a table", segment),
                });
            };
            current = next;
        }
        current.insert(leaf.to_string(), value);
        Ok(())
    }

    fn lookup(&self, key: &str) -> Option<Value> {
        let config = self.read();
        let mut segments = key.split('.');
        let first = segments.next()?;
        let mut current = config.get(first)?;
        for segment in segments {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .lookup(key)
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;
        de::from_value(value).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn get_string(&self, key: &str) -> Result<String> {
        self.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Top-level keys.
    pub fn keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Merge another manager's settings over these.
    pub fn merge(&self, other: &ConfigManager) -> Result<()> {
        let incoming = other.read().clone();
        deep_merge(&mut self.write(), incoming);
        Ok(())
    }

    /// Deserialize a top-level section; a missing section deserializes
    /// from an empty object, so types with `#[serde(default)]` get their
    /// defaults.
    pub fn section<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self
            .lookup(name)
            .unwrap_or_else(|| Value::Object(Map::new()));
        de::from_value(value).map_err(|e| ConfigError::InvalidValue {
            key: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Snapshot of the whole tree.
    pub fn to_value(&self) -> Value {
        Value::Object(self.read().clone())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

fn deep_merge(target: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        if let (Some(Value::Object(existing)), Value::Object(nested)) = (target.get_mut(&key), &value) {
            deep_merge(existing, nested.clone());
            continue;
        }
        target.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_and_get() {
        let manager = ConfigManager::new();
        manager.set("dispatcher.error_message", "Oops").unwrap();
        manager.set("name", "billing").unwrap();

        assert_eq!(manager.get_string("dispatcher.error_message").unwrap(), "Oops");
        assert_eq!(manager.get_string("name").unwrap(), "billing");
        assert!(manager.has("dispatcher"));
        assert!(!manager.has("dispatcher.missing"));
    }

    #[test]
    fn test_get_errors() {
        let manager = ConfigManager::new();
        manager.set("flag", "yes").unwrap();

        assert!(matches!(manager.get_bool("missing"), Err(ConfigError::KeyNotFound(_))));
        assert!(matches!(manager.get_bool("flag"), Err(ConfigError::InvalidValue { .. })));
        assert!(!manager.get_or("flag", false));
    }

    #[test]
    fn test_later_sources_override_key_by_key() {
        let manager = ConfigManager::new();
        manager
            .load_str(
                r#"{"dispatcher": {"error_message": "A", "expose_error_details": true}}"#,
                FileFormat::Json,
            )
            .unwrap();
        manager
            .load_str("[dispatcher]\nerror_message = \"B\"\n", FileFormat::Toml)
            .unwrap();

        assert_eq!(
            manager.to_value(),
            json!({"dispatcher": {"error_message": "B", "expose_error_details": true}})
        );
    }

    #[test]
    fn test_merge_managers() {
        let base = ConfigManager::new();
        base.set("logging.level", "info").unwrap();
        let overrides = ConfigManager::new();
        overrides.set("logging.format", "json").unwrap();

        base.merge(&overrides).unwrap();
        assert_eq!(base.keys(), vec!["logging".to_string()]);
        assert_eq!(base.get_string("logging.level").unwrap(), "info");
        assert_eq!(base.get_string("logging.format").unwrap(), "json");
    }

    #[test]
    fn test_env_text_follows_field_types() {
        let manager = ConfigManager::new();
        let vars = EnvLoader::default().collect([
            ("SWITCHYARD_DISPATCHER__ERROR_MESSAGE", "404"),
            ("SWITCHYARD_DISPATCHER__EXPOSE_ERROR_DETAILS", "true"),
            ("SWITCHYARD_LIMITS__MAX", "25"),
        ]);
        manager.merge_value(Value::Object(vars)).unwrap();

        let dispatcher: switchyard_core::DispatcherConfig = manager.section("dispatcher").unwrap();
        assert_eq!(dispatcher.error_message, "404");
        assert!(dispatcher.expose_error_details);
        assert_eq!(manager.get::<u32>("limits.max").unwrap(), 25);
        assert_eq!(manager.get_string("limits.max").unwrap(), "25");
    }

    #[test]
    fn test_missing_section_uses_defaults() {
        #[derive(serde::Deserialize, Default, PartialEq, Debug)]
        #[serde(default)]
        struct Limits {
            max: u32,
        }

        let manager = ConfigManager::new();
        assert_eq!(manager.section::<Limits>("limits").unwrap(), Limits::default());
    }
}
