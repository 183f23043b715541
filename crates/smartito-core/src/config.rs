use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, SmartitoError};

/// Top-level configuration for Smartito.
///
/// Loaded from `~/.smartito/config.toml` by default. Each section corresponds
/// to one collaborator or to the analyst pipeline itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartitoConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub warehouse: WarehouseConfig,
    #[serde(default = "default_markets")]
    pub markets: Vec<MarketConfig>,
    #[serde(default)]
    pub analyst: AnalystConfig,
}

impl Default for SmartitoConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            llm: LlmConfig::default(),
            warehouse: WarehouseConfig::default(),
            markets: default_markets(),
            analyst: AnalystConfig::default(),
        }
    }
}

impl SmartitoConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SmartitoConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SmartitoError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Read the LLM API key from the environment variable named in `llm.api_key_env`.
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.llm.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| SmartitoError::MissingCredential(self.llm.api_key_env.clone()))
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Settings shared by both analyst roles' text-generation capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible chat-completions API.
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Business-Analyst role settings.
    pub business: RoleModelConfig,
    /// Data-Analyst role settings.
    pub data: RoleModelConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 60,
            business: RoleModelConfig {
                model: "gpt-4o-mini".to_string(),
                temperature: 0.3,
            },
            data: RoleModelConfig {
                model: "gpt-4o-mini".to_string(),
                temperature: 0.1,
            },
        }
    }
}

/// Model selection for one role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleModelConfig {
    pub model: String,
    pub temperature: f32,
}

impl Default for RoleModelConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
        }
    }
}

/// Warehouse connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    /// Path to the SQLite replica of the funnel table.
    pub sqlite_path: String,
    /// Fully qualified table name used in prompts and schema info.
    pub table: String,
    /// Busy timeout for the SQLite connection, in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "~/.smartito/funnels.db".to_string(),
            table: "amplitude.funnels_resumido".to_string(),
            busy_timeout_ms: 5_000,
        }
    }
}

/// One known market: its code and the common-language names that refer to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub code: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl MarketConfig {
    fn new(code: &str, aliases: &[&str]) -> Self {
        Self {
            code: code.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// The nine markets present in the funnel table.
pub fn default_markets() -> Vec<MarketConfig> {
    vec![
        MarketConfig::new("BR", &["brasil", "brazil", "brasileño", "brasileña"]),
        MarketConfig::new("CL", &["chile", "chileno", "chilena"]),
        MarketConfig::new("PE", &["peru", "perú", "peruano", "peruana"]),
        MarketConfig::new("PY", &["paraguay", "paraguayo", "paraguaya"]),
        MarketConfig::new(
            "US",
            &[
                "united states",
                "usa",
                "estados unidos",
                "eeuu",
                "ee.uu.",
                "norteamérica",
            ],
        ),
        MarketConfig::new("CO", &["colombia", "colombiano", "colombiana"]),
        MarketConfig::new("AR", &["argentina", "argentino"]),
        MarketConfig::new("EC", &["ecuador", "ecuatoriano", "ecuatoriana"]),
        MarketConfig::new("UY", &["uruguay", "uruguayo", "uruguaya"]),
    ]
}

/// Analyst pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalystConfig {
    /// Maximum SQL attempts before the Data-Analyst gives up.
    pub max_query_attempts: u32,
    /// Maximum LLM round trips per Data-Analyst invocation (schema lookups included).
    pub max_tool_steps: u32,
    /// Number of recent turns included in role prompts.
    pub context_turns: usize,
    /// Maximum accepted user message length, in characters.
    pub max_message_length: usize,
}

impl Default for AnalystConfig {
    fn default() -> Self {
        Self {
            max_query_attempts: 3,
            max_tool_steps: 8,
            context_turns: 6,
            max_message_length: 2000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = SmartitoConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.llm.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.warehouse.table, "amplitude.funnels_resumido");
        assert_eq!(config.analyst.max_query_attempts, 3);
        assert_eq!(config.analyst.max_message_length, 2000);
    }

    #[test]
    fn test_default_markets_cover_all_codes() {
        let codes: Vec<String> = default_markets().into_iter().map(|m| m.code).collect();
        assert_eq!(
            codes,
            vec!["BR", "CL", "PE", "PY", "US", "CO", "AR", "EC", "UY"]
        );
    }

    #[test]
    fn test_empty_toml_matches_default_markets() {
        let config: SmartitoConfig = toml::from_str("").unwrap();
        assert_eq!(config.markets, SmartitoConfig::default().markets);
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
log_level = "debug"

[llm]
base_url = "http://localhost:8080/v1"
timeout_secs = 10

[llm.data]
model = "local-model"
temperature = 0.0

[warehouse]
sqlite_path = "/tmp/funnels.db"

[analyst]
max_query_attempts = 5

[[markets]]
code = "MX"
aliases = ["mexico", "méxico"]
"#;
        let file = create_temp_config(content);
        let config = SmartitoConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.llm.base_url, "http://localhost:8080/v1");
        assert_eq!(config.llm.timeout_secs, 10);
        assert_eq!(config.llm.data.model, "local-model");
        assert_eq!(config.warehouse.sqlite_path, "/tmp/funnels.db");
        assert_eq!(config.analyst.max_query_attempts, 5);
        assert_eq!(config.markets.len(), 1);
        assert_eq!(config.markets[0].code, "MX");
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let content = r#"
[general]
log_level = "warn"
"#;
        let file = create_temp_config(content);
        let config = SmartitoConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.analyst.context_turns, 6);
        assert_eq!(config.markets.len(), 9);
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("[general\nlog_level = ");
        let result = SmartitoConfig::load(file.path());
        assert!(matches!(result, Err(SmartitoError::Config(_))));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = SmartitoConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = SmartitoConfig::default();
        config.save(&path).unwrap();

        let reloaded = SmartitoConfig::load(&path).unwrap();
        assert_eq!(reloaded.llm.base_url, config.llm.base_url);
        assert_eq!(reloaded.markets, config.markets);
    }

    #[test]
    fn test_api_key_missing() {
        let mut config = SmartitoConfig::default();
        config.llm.api_key_env = "SMARTITO_TEST_KEY_THAT_IS_NEVER_SET".to_string();
        assert!(matches!(
            config.api_key(),
            Err(SmartitoError::MissingCredential(_))
        ));
    }
}
