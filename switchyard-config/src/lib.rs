// Settings loading for the Switchyard dispatcher
//
// Sources (JSON/TOML/.env files, `.env` via dotenvy, prefixed environment
// variables) are deep-merged into one tree, then read as typed sections.

mod de;
pub mod env;
pub mod error;
pub mod loader;
pub mod manager;
pub mod settings;

pub use env::{DEFAULT_PREFIX, EnvLoader};
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use manager::ConfigManager;
pub use settings::{Settings, SettingsBuilder};
