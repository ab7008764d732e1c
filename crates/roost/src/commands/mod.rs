//! CLI command handlers.

use roost_config::LoadedConfig;

pub mod config;
pub mod soak;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Configuration resolved from every layer.
    pub loaded: LoadedConfig,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}
