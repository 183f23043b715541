//! CLI argument definitions for the Smartito binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use smartito_core::config::SmartitoConfig;

/// Smartito: ask questions about the airline funnel in plain Spanish or English.
#[derive(Parser, Debug)]
#[command(name = "smartito", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Path to the SQLite replica of the funnel table.
    #[arg(short = 'w', long = "warehouse")]
    pub warehouse: Option<PathBuf>,

    /// Model used by both analyst roles.
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Start an interactive session (default).
    Chat,
    /// Write a demo funnel replica to the configured warehouse path.
    Seed {
        /// Number of days of data, ending today.
        #[arg(long, default_value_t = 400)]
        days: u32,
    },
    /// Write the effective configuration to the config path.
    InitConfig,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > SMARTITO_CONFIG env var > ~/.smartito/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("SMARTITO_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: Option<&str>) -> String {
        self.log_level
            .clone()
            .or_else(|| config_level.map(str::to_string))
            .unwrap_or_else(|| "info".to_string())
    }

    /// Apply flag overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut SmartitoConfig) {
        if let Some(ref path) = self.warehouse {
            config.warehouse.sqlite_path = path.to_string_lossy().to_string();
        }
        if let Some(ref model) = self.model {
            config.llm.business.model = model.clone();
            config.llm.data.model = model.clone();
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".smartito").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".smartito").join("config.toml");
    }
    PathBuf::from("config.toml")
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}
