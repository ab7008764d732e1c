//! Configuration system for the Roost stateful cache.
//!
//! Provides TOML-based configuration with:
//! - `[cache]`: logical cache id, backing map name, checkout retry bound
//! - `[cluster]`: instance name, bootstrap URL, expiry sweep, capacity
//! - `[logging]`: log directory and console level
//!
//! Config files are layered (user config dir, then `./roost.toml`, then an
//! explicit path) with later layers replacing whole sections.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    LoadedConfig, PROJECT_CONFIG_FILE, config_dir, load_config, load_config_file,
    load_config_with_options, save_config, user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
