//! Config command - configuration management.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use console::{Style, style};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration and where it came from
    Show,

    /// Show the user configuration file path
    Path,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./roost.toml) instead of user config
        #[arg(long)]
        local: bool,
    },
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx).await,
        ConfigCommand::Path => cmd_path(ctx).await,
        ConfigCommand::Init { local } => cmd_init(local).await,
    }
}

async fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = &ctx.loaded;
    let config = &loaded.config;

    if ctx.json_output {
        let output = serde_json::json!({
            "sources": loaded.loaded_from(),
            "cache": config.cache(),
            "cluster": config.cluster(),
            "logging": config.logging(),
            "warnings": loaded.warnings,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();

    println!("{}", style("Roost Configuration").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();

    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for source in &sources {
            println!("  {}", source.display());
        }
        println!();
    }

    let cache = config.cache();
    println!("Cache:");
    println!("  {} {}", dim.apply_to("cache_id:"), cache.cache_id);
    println!("  {} {}", dim.apply_to("map_name:"), cache.map_name);
    println!(
        "  {} {}",
        dim.apply_to("max_checkout_attempts:"),
        cache.max_checkout_attempts
    );
    println!();

    let cluster = config.cluster();
    println!("Cluster:");
    println!("  {} {}", dim.apply_to("instance_name:"), cluster.instance_name);
    println!(
        "  {} {}",
        dim.apply_to("url:"),
        cluster.url.as_deref().unwrap_or("(local)")
    );
    println!(
        "  {} {}ms",
        dim.apply_to("reap_interval:"),
        cluster.reap_interval_ms
    );
    if let Some(max) = cluster.max_entries {
        println!("  {} {}", dim.apply_to("max_entries:"), max);
    }
    for (key, value) in &cluster.properties {
        println!("  {} {}", dim.apply_to(format!("{key}:")), value);
    }
    println!();

    if !loaded.warnings.is_empty() {
        println!("Warnings:");
        for w in &loaded.warnings {
            println!("  ⚠ {}", w);
        }
        println!();
    }

    if ctx.verbose {
        println!("---\nRaw config:\n");
        if let Ok(toml_str) = config.to_toml() {
            println!("{}", toml_str);
        }
    }

    Ok(())
}

async fn cmd_path(ctx: &Context) -> Result<()> {
    match roost_config::user_config_path() {
        Some(path) if ctx.json_output => {
            println!("{}", serde_json::json!({ "path": path }));
        }
        Some(path) => println!("{}", path.display()),
        None => eprintln!("Could not determine config directory"),
    }
    Ok(())
}

const TEMPLATE: &str = r#"# Roost Configuration

[cache]
cache_id = "roost-stateful-cache"
map_name = "roost-stateful-cache"
# Checkout attempts before an entry is purged as corrupted
max_checkout_attempts = 10

[cluster]
instance_name = "roost"
# url = "local://roost"
reap_interval_ms = 250
# max_entries = 10000

# [cluster.properties]
# partition-count = "271"

# [logging]
# directory = "/var/log/roost"
# level = "info"
"#;

async fn cmd_init(local: bool) -> Result<()> {
    let path = if local {
        PathBuf::from(roost_config::PROJECT_CONFIG_FILE)
    } else {
        let dir = roost_config::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        std::fs::create_dir_all(&dir)?;
        dir.join("config.toml")
    };

    if path.exists() {
        println!("Config file already exists: {}", path.display());
        return Ok(());
    }

    std::fs::write(&path, TEMPLATE)?;
    println!("✓ Created config file: {}", path.display());
    println!();
    println!("Next steps:");
    println!("  roost config show               # verify configuration");
    println!("  roost soak                      # exercise a local cache");

    Ok(())
}
