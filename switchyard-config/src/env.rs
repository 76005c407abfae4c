// Environment variable loading

use crate::loader::insert_env_value;
use crate::{ConfigError, Result};
use serde_json::{Map, Value};
use std::env;

/// Prefix of the environment variables read by default.
pub const DEFAULT_PREFIX: &str = "SWITCHYARD";

/// Reads prefixed environment variables into a settings tree.
///
/// `SWITCHYARD_DISPATCHER__ERROR_MESSAGE=Oops` becomes
/// `{"dispatcher": {"error_message": "Oops"}}`: the prefix and its
/// separator are stripped, keys are lower-cased and `__` nests.
#[derive(Debug, Clone)]
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Load the process environment.
    pub fn load(&self) -> Map<String, Value> {
        self.collect(env::vars())
    }

    /// Build the settings tree from `vars`, keeping only prefixed names.
    pub fn collect<I, K, V>(&self, vars: I) -> Map<String, Value>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut map = Map::new();
        for (key, value) in vars {
            if let Some(key) = self.strip(key.as_ref()) {
                insert_env_value(&mut map, key, value.as_ref());
            }
        }
        map
    }

    fn strip<'a>(&self, key: &'a str) -> Option<&'a str> {
        let Some(prefix) = &self.prefix else {
            return Some(key);
        };
        let rest = key.strip_prefix(prefix.as_str())?;
        let rest = rest.strip_prefix('_')?;
        (!rest.is_empty()).then_some(rest)
    }

    /// Read one variable, adding the prefix.
    pub fn load_var(&self, key: &str) -> Result<String> {
        let full_key = match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, key.to_uppercase()),
            None => key.to_uppercase(),
        };
        env::var(&full_key).map_err(ConfigError::EnvError)
    }

    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(Some(DEFAULT_PREFIX.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // std::env::set_var is unsafe under edition 2024, so these tests feed
    // variables through `collect` instead of mutating the process.

    #[test]
    fn test_collect_prefixed() {
        let loader = EnvLoader::default();
        let map = loader.collect([
            ("SWITCHYARD_DISPATCHER__CONTEXT_PARAMETER", "ctx"),
            ("SWITCHYARD_LOGGING__THREAD_IDS", "true"),
            ("SWITCHYARDX_IGNORED", "1"),
            ("SWITCHYARD_", "empty"),
            ("PATH", "/usr/bin"),
        ]);

        assert_eq!(
            Value::Object(map),
            json!({
                "dispatcher": {"context_parameter": "ctx"},
                "logging": {"thread_ids": "true"}
            })
        );
    }

    #[test]
    fn test_collect_without_prefix() {
        let loader = EnvLoader::new(None);
        let map = loader.collect([("Level", "debug")]);
        assert_eq!(map["level"], "debug");
    }

    #[test]
    fn test_missing_var() {
        let loader = EnvLoader::default();
        assert!(loader.load_var("MISSING_VAR_67890").is_err());
        assert_eq!(loader.load_var_or("MISSING_VAR_67890", "fallback"), "fallback");
    }
}
