// Typed Switchyard settings and the builder that loads them

use crate::loader::FileFormat;
use crate::manager::ConfigManager;
use crate::Result;
use serde::Deserialize;
use std::path::PathBuf;
use switchyard_core::DispatcherConfig;
use switchyard_core::logging::LogConfig;

/// Everything a host needs to stand up a dispatcher.
///
/// Read from the `dispatcher` and `logging` sections; absent sections and
/// fields keep their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub dispatcher: DispatcherConfig,
    pub logging: LogConfig,
}

impl Settings {
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::new()
    }

    /// Extract typed settings from a populated manager.
    pub fn from_manager(manager: &ConfigManager) -> Result<Self> {
        Ok(Self {
            dispatcher: manager.section("dispatcher")?,
            logging: manager.section("logging")?,
        })
    }
}

enum Source {
    File(PathBuf, Option<FileFormat>),
    Dotenv(Option<String>),
    Env,
}

/// Collects settings sources; later sources override earlier ones.
///
/// ```no_run
/// use switchyard_config::{FileFormat, Settings};
///
/// let settings = Settings::builder()
///     .add_file("switchyard.toml")
///     .add_file_as("overrides.json", FileFormat::Json)
///     .load_env()
///     .build()?;
/// # Ok::<(), switchyard_config::ConfigError>(())
/// ```
pub struct SettingsBuilder {
    manager: ConfigManager,
    sources: Vec<Source>,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        Self {
            manager: ConfigManager::new(),
            sources: Vec::new(),
        }
    }

    /// Environment variable prefix (default `SWITCHYARD`).
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.manager = ConfigManager::with_prefix(prefix);
        self
    }

    /// Format detected from the extension.
    pub fn add_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(Source::File(path.into(), None));
        self
    }

    pub fn add_file_as(mut self, path: impl Into<PathBuf>, format: FileFormat) -> Self {
        self.sources.push(Source::File(path.into(), Some(format)));
        self
    }

    /// Load a `.env` file (the default lookup when `path` is `None`), then
    /// the environment.
    pub fn load_dotenv(mut self, path: Option<String>) -> Self {
        self.sources.push(Source::Dotenv(path));
        self
    }

    pub fn load_env(mut self) -> Self {
        self.sources.push(Source::Env);
        self
    }

    /// Load every source in order and return the merged manager.
    pub fn build_manager(self) -> Result<ConfigManager> {
        for source in self.sources {
            match source {
                Source::File(path, Some(format)) => self.manager.load_file(&path, format)?,
                Source::File(path, None) => self.manager.load_file_auto(&path)?,
                Source::Dotenv(path) => self.manager.load_dotenv(path.as_deref())?,
                Source::Env => self.manager.load_env()?,
            }
        }
        Ok(self.manager)
    }

    pub fn build(self) -> Result<Settings> {
        let manager = self.build_manager()?;
        Settings::from_manager(&manager)
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfigError;
    use switchyard_core::logging::{LogFormat, LogLevel};

    #[test]
    fn test_defaults_without_sources() {
        let settings = Settings::builder().build().unwrap();
        assert_eq!(settings.dispatcher, DispatcherConfig::default());
        assert_eq!(settings.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_from_manager() {
        let manager = ConfigManager::new();
        manager
            .load_str(
                r#"
                [dispatcher]
                context_parameter = "ctx"
                empty_result_no_content = false

                [logging]
                level = "debug"
                format = "json"
                "#,
                FileFormat::Toml,
            )
            .unwrap();

        let settings = Settings::from_manager(&manager).unwrap();
        assert_eq!(settings.dispatcher.context_parameter, "ctx");
        assert!(!settings.dispatcher.empty_result_no_content);
        assert_eq!(settings.dispatcher.error_message, "Internal Server Error");
        assert_eq!(settings.logging.level, LogLevel::Debug);
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_section() {
        let manager = ConfigManager::new();
        manager.set("dispatcher.expose_error_details", "sometimes").unwrap();
        let err = Settings::from_manager(&manager).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "dispatcher"));
    }

    #[test]
    fn test_missing_file_fails() {
        let err = Settings::builder()
            .add_file("/nonexistent/switchyard.toml")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::LoadError(_)));
    }
}
