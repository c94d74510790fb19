//! Configuration file loading for corsie
//!
//! This module handles file I/O and merging of configuration from multiple sources.
//! The priority order (highest to lowest):
//!
//! 1. `CORSIE_*` environment variables
//! 2. `--config <path>` specified file
//! 3. Project root: `./corsie.toml` or `./.corsie.toml`
//! 4. XDG config: `$XDG_CONFIG_HOME/corsie/config.toml`
//! 5. Default values

mod file_config;
mod loader;

pub use file_config::{
    FileConfig, FileDeepSeekConfig, FileGenerationConfig, FileOpenRouterConfig,
    FileProvidersConfig, FileStorageConfig,
};
pub use loader::{ConfigError, ConfigLoader};
