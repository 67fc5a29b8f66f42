//! Configuration management with file persistence
//!
//! Non-secret settings live in `config.toml`. Secrets (the Neo4j password and
//! the LLM API key) are only ever read from the environment, which may be
//! populated from a `.env` file by the binary.

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::graph::BackendKind;

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "SCHEMAGENIE_CONFIG_DIR";

/// SchemaGenie configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub graph: GraphConfig,
    pub neo4j: Neo4jConfig,
    pub import: ImportConfig,
    pub llm: LlmConfig,
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub backend: BackendKind,
    /// SQLite graph file; defaults to the data directory when unset
    pub sqlite_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub database: String,
    #[serde(skip)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub folder: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub default_model: String,
    pub fallback_models: Vec<String>,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

/// How the chat assistant grounds its answers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStrategy {
    /// Answer from catalog context only
    Context,
    /// Also generate and run a read-only Cypher query when the store allows it
    #[default]
    Cypher,
}

impl ChatStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::Cypher => "cypher",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "context" => Some(Self::Context),
            "cypher" => Some(Self::Cypher),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub strategy: ChatStrategy,
    pub history_turns: usize,
    pub max_schemas: usize,
    pub max_attributes: usize,
    /// Preferred language code for overlay texts (e.g. "eng", "fra")
    pub language: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Neo4j,
            sqlite_path: None,
        }
    }
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "http://localhost:7474".to_string(),
            user: "neo4j".to_string(),
            database: "neo4j".to_string(),
            password: None,
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("./schemas"),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://openrouter.ai/api/v1".to_string(),
            default_model: "anthropic/claude-sonnet-4-20250514".to_string(),
            fallback_models: vec![
                "anthropic/claude-3-5-haiku-latest".to_string(),
                "openai/gpt-4o".to_string(),
            ],
            temperature: 0.2,
            max_tokens: 2048,
            timeout_secs: 120,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            strategy: ChatStrategy::Cypher,
            history_turns: 6,
            max_schemas: 5,
            max_attributes: 20,
            language: "eng".to_string(),
        }
    }
}

fn redact(secret: &str) -> String {
    let count = secret.chars().count();
    if count <= 4 {
        "***".to_string()
    } else {
        let tail: String = secret.chars().skip(count - 4).collect();
        format!("***{}", tail)
    }
}

impl LlmConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        Ok(env::var("SCHEMAGENIE_API_KEY")
            .or_else(|_| env::var("OPENROUTER_API_KEY"))
            .ok()
            .filter(|k| !k.is_empty()))
    }

    pub fn redacted_api_key(&self) -> anyhow::Result<Option<String>> {
        self.resolved_api_key().map(|opt| opt.map(|key| redact(&key)))
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "LLM API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

impl Neo4jConfig {
    /// Password from `NEO4J_PASSWORD`, or one injected programmatically
    pub fn resolved_password(&self) -> Option<String> {
        self.password
            .clone()
            .or_else(|| env::var("NEO4J_PASSWORD").ok())
            .filter(|p| !p.is_empty())
    }

    /// Apply `NEO4J_URI`, `NEO4J_USER` and `NEO4J_DATABASE` overrides
    pub fn apply_env(&mut self) {
        if let Ok(uri) = env::var("NEO4J_URI") {
            if !uri.is_empty() {
                self.uri = uri;
            }
        }
        if let Ok(user) = env::var("NEO4J_USER") {
            if !user.is_empty() {
                self.user = user;
            }
        }
        if let Ok(database) = env::var("NEO4J_DATABASE") {
            if !database.is_empty() {
                self.database = database;
            }
        }
    }
}

impl GraphConfig {
    /// SQLite file used by the embedded backend
    pub fn resolved_sqlite_path(&self) -> PathBuf {
        self.sqlite_path
            .clone()
            .unwrap_or_else(crate::storage::default_database_path)
    }
}

/// Reject files that try to carry secrets
fn reject_secrets(raw: &toml::Value) -> anyhow::Result<()> {
    let forbidden = [("neo4j", "password"), ("llm", "api_key")];
    for (section, key) in forbidden {
        if raw.get(section).and_then(|s| s.get(key)).is_some() {
            return Err(anyhow!(
                "`{}.{}` must not be stored in the config file. Use environment variables instead.",
                section,
                key
            ));
        }
    }
    Ok(())
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var(CONFIG_DIR_ENV) {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("schemagenie")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default file and apply environment overrides
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.neo4j.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific file, or defaults if it doesn't exist
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let raw: toml::Value = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        reject_secrets(&raw)?;

        let config: Config = raw
            .try_into()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default file
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.llm.enforce_env_only()?;
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(anyhow!("Temperature must be between 0.0 and 2.0"));
        }
        if self.chat.max_schemas == 0 {
            return Err(anyhow!("chat.max_schemas must be at least 1"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "graph.backend" => Ok(self.graph.backend.as_str().to_string()),
            "graph.sqlite_path" => Ok(self.graph.resolved_sqlite_path().display().to_string()),

            "neo4j.uri" => Ok(self.neo4j.uri.clone()),
            "neo4j.user" => Ok(self.neo4j.user.clone()),
            "neo4j.database" => Ok(self.neo4j.database.clone()),
            "neo4j.password" => Ok(match self.neo4j.resolved_password() {
                Some(p) => redact(&p),
                None => "(not set - use NEO4J_PASSWORD env var)".to_string(),
            }),

            "import.folder" => Ok(self.import.folder.display().to_string()),

            "llm.base_url" => Ok(self.llm.base_url.clone()),
            "llm.default_model" => Ok(self.llm.default_model.clone()),
            "llm.fallback_models" => Ok(self.llm.fallback_models.join(", ")),
            "llm.temperature" => Ok(self.llm.temperature.to_string()),
            "llm.max_tokens" => Ok(self.llm.max_tokens.to_string()),
            "llm.timeout_secs" => Ok(self.llm.timeout_secs.to_string()),
            "llm.api_key" | "api_key" => match self.llm.redacted_api_key()? {
                Some(redacted) => Ok(redacted),
                None => Ok(
                    "(not set - use SCHEMAGENIE_API_KEY or OPENROUTER_API_KEY env var)".to_string(),
                ),
            },

            "chat.strategy" => Ok(self.chat.strategy.as_str().to_string()),
            "chat.history_turns" => Ok(self.chat.history_turns.to_string()),
            "chat.max_schemas" => Ok(self.chat.max_schemas.to_string()),
            "chat.max_attributes" => Ok(self.chat.max_attributes.to_string()),
            "chat.language" => Ok(self.chat.language.clone()),

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `schemagenie config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "graph.backend" => {
                self.graph.backend = BackendKind::parse(value).ok_or_else(|| {
                    anyhow!("Invalid backend: {}. Valid options: neo4j, sqlite", value)
                })?;
            }
            "graph.sqlite_path" => {
                self.graph.sqlite_path = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }

            "neo4j.uri" => {
                reqwest::Url::parse(value)
                    .with_context(|| format!("Invalid Neo4j URI: {}", value))?;
                self.neo4j.uri = value.trim_end_matches('/').to_string();
            }
            "neo4j.user" => self.neo4j.user = value.to_string(),
            "neo4j.database" => {
                if value.is_empty() {
                    return Err(anyhow!("Database name must not be empty"));
                }
                self.neo4j.database = value.to_string();
            }

            "import.folder" => self.import.folder = PathBuf::from(value),

            "llm.base_url" => {
                reqwest::Url::parse(value)
                    .with_context(|| format!("Invalid base URL: {}", value))?;
                self.llm.base_url = value.trim_end_matches('/').to_string();
            }
            "llm.default_model" => self.llm.default_model = value.to_string(),
            "llm.fallback_models" => {
                self.llm.fallback_models = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            "llm.temperature" => {
                let temp: f32 = value
                    .parse()
                    .with_context(|| format!("Invalid temperature value: {}", value))?;
                if !(0.0..=2.0).contains(&temp) {
                    return Err(anyhow!("Temperature must be between 0.0 and 2.0"));
                }
                self.llm.temperature = temp;
            }
            "llm.max_tokens" => {
                self.llm.max_tokens = value
                    .parse()
                    .with_context(|| format!("Invalid max_tokens value: {}", value))?;
            }
            "llm.timeout_secs" => {
                self.llm.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
            }

            "chat.strategy" => {
                self.chat.strategy = ChatStrategy::parse(value).ok_or_else(|| {
                    anyhow!("Invalid chat strategy: {}. Valid options: context, cypher", value)
                })?;
            }
            "chat.history_turns" => {
                self.chat.history_turns = value
                    .parse()
                    .with_context(|| format!("Invalid history_turns value: {}", value))?;
            }
            "chat.max_schemas" => {
                let max: usize = value
                    .parse()
                    .with_context(|| format!("Invalid max_schemas value: {}", value))?;
                if max == 0 {
                    return Err(anyhow!("chat.max_schemas must be at least 1"));
                }
                self.chat.max_schemas = max;
            }
            "chat.max_attributes" => {
                self.chat.max_attributes = value
                    .parse()
                    .with_context(|| format!("Invalid max_attributes value: {}", value))?;
            }
            "chat.language" => self.chat.language = value.to_string(),

            "neo4j.password" | "llm.api_key" | "api_key" => {
                return Err(anyhow!(
                    "Secrets cannot be stored in configuration. \
                     Set NEO4J_PASSWORD and SCHEMAGENIE_API_KEY (or OPENROUTER_API_KEY) instead."
                ));
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `schemagenie config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "graph.backend",
            "graph.sqlite_path",
            "neo4j.uri",
            "neo4j.user",
            "neo4j.database",
            "neo4j.password",
            "import.folder",
            "llm.base_url",
            "llm.default_model",
            "llm.fallback_models",
            "llm.temperature",
            "llm.max_tokens",
            "llm.timeout_secs",
            "llm.api_key",
            "chat.strategy",
            "chat.history_turns",
            "chat.max_schemas",
            "chat.max_attributes",
            "chat.language",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.graph.backend, BackendKind::Neo4j);
        assert_eq!(config.neo4j.uri, "http://localhost:7474");
        assert_eq!(config.import.folder, PathBuf::from("./schemas"));
        assert_eq!(config.chat.strategy, ChatStrategy::Cypher);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.set("graph.backend", "sqlite").unwrap();
        config.set("neo4j.database", "schemas").unwrap();
        config.set("chat.language", "fra").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.graph.backend, BackendKind::Sqlite);
        assert_eq!(loaded.neo4j.database, "schemas");
        assert_eq!(loaded.chat.language, "fra");
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.neo4j.user, "neo4j");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[neo4j]\nuri = \"http://graph:7474\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.neo4j.uri, "http://graph:7474");
        assert_eq!(config.neo4j.database, "neo4j");
        assert_eq!(config.llm.max_tokens, 2048);
    }

    #[test]
    fn test_secrets_in_file_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[neo4j]\npassword = \"hunter2\"\n").unwrap();
        assert!(Config::load_from(&path).is_err());

        fs::write(&path, "[llm]\napi_key = \"sk-123\"\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_set_validation() {
        let mut config = Config::default();
        assert!(config.set("llm.temperature", "3.5").is_err());
        assert!(config.set("llm.temperature", "abc").is_err());
        assert!(config.set("graph.backend", "postgres").is_err());
        assert!(config.set("chat.strategy", "magic").is_err());
        assert!(config.set("chat.max_schemas", "0").is_err());
        assert!(config.set("neo4j.uri", "not a url").is_err());
        assert!(config.set("neo4j.password", "secret").is_err());
        assert!(config.set("llm.api_key", "secret").is_err());
        assert!(config.set("unknown.key", "x").is_err());
    }

    #[test]
    fn test_set_trims_trailing_slash() {
        let mut config = Config::default();
        config.set("neo4j.uri", "http://localhost:7474/").unwrap();
        assert_eq!(config.neo4j.uri, "http://localhost:7474");
    }

    #[test]
    fn test_set_fallback_models() {
        let mut config = Config::default();
        config
            .set("llm.fallback_models", "a/one, b/two,,")
            .unwrap();
        assert_eq!(config.llm.fallback_models, vec!["a/one", "b/two"]);
        assert_eq!(config.get("llm.fallback_models").unwrap(), "a/one, b/two");
    }

    #[test]
    fn test_list_contains_all_sections() {
        let config = Config::default();
        let items = config.list().unwrap();
        let keys: Vec<_> = items.iter().map(|(k, _)| k.as_str()).collect();
        assert!(keys.contains(&"graph.backend"));
        assert!(keys.contains(&"neo4j.uri"));
        assert!(keys.contains(&"import.folder"));
        assert!(keys.contains(&"chat.strategy"));
    }

    #[test]
    fn test_programmatic_api_key_rejected() {
        let mut config = Config::default();
        config.llm.api_key = Some("sk-test".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redact() {
        assert_eq!(redact("abc"), "***");
        assert_eq!(redact("sk-abcdef1234"), "***1234");
    }

    #[test]
    fn test_redact_multibyte_secret() {
        assert_eq!(redact("passé€"), "***ssé€");
        assert_eq!(redact("été€"), "***");
        assert_eq!(redact("mot-de-passe-Ü€日本"), "***Ü€日本");
    }
}
