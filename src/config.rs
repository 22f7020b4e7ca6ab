//! Configuration loader and validator for the admin backend.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub telegram: Telegram,
    #[serde(default)]
    pub store: Store,
    #[serde(default)]
    pub queue: Queue,
    #[serde(default)]
    pub sources: Sources,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Server {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_public_dir")]
    pub public_dir: String,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            port: default_port(),
            public_dir: default_public_dir(),
        }
    }
}

/// Telegram bot settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Telegram {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub bot_username: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Supabase,
    Sqlite,
}

/// Persistence backend selection and credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Store {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub supabase: Supabase,
    #[serde(default)]
    pub sqlite: Sqlite,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Supabase {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sqlite {
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

impl Default for Sqlite {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
        }
    }
}

/// Periodic queue check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Queue {
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
}

impl Default for Queue {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
        }
    }
}

/// Source categories accepted by the add-source endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sources {
    #[serde(default = "default_category")]
    pub default_category: String,
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
}

impl Default for Sources {
    fn default() -> Self {
        Self {
            default_category: default_category(),
            categories: default_categories(),
        }
    }
}

fn default_port() -> u16 {
    3000
}

fn default_public_dir() -> String {
    "./public".into()
}

fn default_database_url() -> String {
    "sqlite://./data/content.db".into()
}

fn default_interval_seconds() -> u64 {
    60
}

fn default_category() -> String {
    "news".into()
}

fn default_categories() -> Vec<String> {
    ["news", "tech", "business", "crypto", "entertainment", "sports"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

impl Config {
    /// Overlay the environment variables the deployment sets on top of the file.
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty("BOT_TOKEN") {
            self.telegram.bot_token = v;
        }
        if let Some(v) = non_empty("BOT_USERNAME") {
            self.telegram.bot_username = v;
        }
        if let Some(v) = non_empty("SUPABASE_URL") {
            self.store.supabase.url = v;
        }
        if let Some(v) = non_empty("SUPABASE_KEY") {
            self.store.supabase.key = v;
        }
        if let Some(v) = non_empty("DATABASE_URL") {
            self.store.sqlite.database_url = v;
        }
        if let Some(port) = non_empty("PORT").and_then(|p| p.trim().parse().ok()) {
            self.server.port = port;
        }
    }

    /// Bot username without a leading `@`, as used in `t.me` links.
    pub fn bot_handle(&self) -> &str {
        self.telegram.bot_username.trim().trim_start_matches('@')
    }
}

/// Load configuration from a YAML file, overlay the process environment and
/// validate the result.
/// - If `path` is None, uses `config.yaml` in the current working directory and
///   falls back to defaults when that file does not exist.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    load_with_env(path, |key| std::env::var(key).ok())
}

pub fn load_with_env<F>(path: Option<&Path>, var: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut cfg = match path {
        Some(path) => serde_yaml::from_str(&fs::read_to_string(path)?)?,
        None => {
            let default_path = Path::new("config.yaml");
            if default_path.exists() {
                serde_yaml::from_str(&fs::read_to_string(default_path)?)?
            } else {
                Config::default()
            }
        }
    };
    cfg.apply_env(var);
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.server.port == 0 {
        return Err(ConfigError::Invalid("server.port must be > 0"));
    }

    if cfg.telegram.bot_token.trim().is_empty() {
        return Err(ConfigError::Invalid("telegram.bot_token must be non-empty"));
    }
    if cfg.bot_handle().is_empty() {
        return Err(ConfigError::Invalid("telegram.bot_username must be non-empty"));
    }

    match cfg.store.backend {
        Backend::Supabase => {
            let url = cfg.store.supabase.url.trim();
            if url.is_empty() {
                return Err(ConfigError::Invalid("store.supabase.url must be non-empty"));
            }
            if reqwest::Url::parse(url).is_err() {
                return Err(ConfigError::Invalid("store.supabase.url must be an absolute URL"));
            }
            if cfg.store.supabase.key.trim().is_empty() {
                return Err(ConfigError::Invalid("store.supabase.key must be non-empty"));
            }
        }
        Backend::Sqlite => {
            if cfg.store.sqlite.database_url.trim().is_empty() {
                return Err(ConfigError::Invalid("store.sqlite.database_url must be non-empty"));
            }
        }
    }

    if cfg.queue.interval_seconds == 0 {
        return Err(ConfigError::Invalid("queue.interval_seconds must be > 0"));
    }

    if cfg.sources.categories.is_empty() {
        return Err(ConfigError::Invalid("sources.categories must be non-empty"));
    }
    if !cfg
        .sources
        .categories
        .iter()
        .any(|c| c.trim().eq_ignore_ascii_case(cfg.sources.default_category.trim()))
    {
        return Err(ConfigError::Invalid(
            "sources.default_category must be listed in sources.categories",
        ));
    }

    Ok(())
}

/// Returns the documented example YAML content.
pub fn example() -> &'static str {
    r#"server:
  port: 3000
  public_dir: "./public"

telegram:
  bot_token: "YOUR_TELEGRAM_BOT_TOKEN"
  bot_username: "content_empire_bot"

store:
  backend: supabase
  supabase:
    url: "https://your-project.supabase.co"
    key: "YOUR_SUPABASE_SERVICE_KEY"
  sqlite:
    database_url: "sqlite://./data/content.db"

queue:
  interval_seconds: 60

sources:
  default_category: news
  categories:
    - news
    - tech
    - business
    - crypto
    - entertainment
    - sports
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.bot_handle(), "content_empire_bot");
    }

    #[test]
    fn missing_sections_take_defaults() {
        let cfg: Config = serde_yaml::from_str(
            "telegram:\n  bot_token: t\n  bot_username: b\nstore:\n  backend: sqlite\n",
        )
        .unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.queue.interval_seconds, 60);
        assert_eq!(cfg.sources.default_category, "news");
        assert_eq!(cfg.store.sqlite.database_url, "sqlite://./data/content.db");
    }

    #[test]
    fn invalid_bot_settings() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.telegram.bot_token = "".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("telegram.bot_token")), _ => panic!("wrong error") }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.telegram.bot_username = "@".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("bot_username")), _ => panic!("wrong error") }
    }

    #[test]
    fn invalid_supabase_settings() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.store.supabase.url = "not a url".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.store.supabase.key = " ".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("supabase.key")), _ => panic!("wrong error") }

        // Supabase credentials are irrelevant for the local backend.
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.store.backend = Backend::Sqlite;
        cfg.store.supabase.key = "".into();
        validate(&cfg).unwrap();
    }

    #[test]
    fn default_category_must_be_allowed() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.sources.default_category = "gossip".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("default_category")), _ => panic!("wrong error") }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.queue.interval_seconds = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn mixed_case_categories_validate() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.sources.categories = vec!["News".into(), "Tech".into()];
        cfg.sources.default_category = "news".into();
        validate(&cfg).unwrap();
    }

    #[test]
    fn env_overrides_file() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();

        let env: HashMap<&str, &str> = [
            ("BOT_TOKEN", "env-token"),
            ("BOT_USERNAME", "@env_bot"),
            ("SUPABASE_URL", "https://env.supabase.co"),
            ("SUPABASE_KEY", "env-key"),
            ("PORT", "8080"),
        ]
        .into_iter()
        .collect();
        let cfg = load_with_env(Some(&p), |k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.telegram.bot_token, "env-token");
        assert_eq!(cfg.bot_handle(), "env_bot");
        assert_eq!(cfg.store.supabase.url, "https://env.supabase.co");
        assert_eq!(cfg.store.supabase.key, "env-key");
        assert_eq!(cfg.server.port, 8080);
    }

    #[test]
    fn unparsable_port_is_ignored() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.apply_env(|k| (k == "PORT").then(|| "eighty".to_string()));
        assert_eq!(cfg.server.port, 3000);
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load_with_env(Some(&p), no_env).unwrap();
        assert_eq!(cfg.store.backend, Backend::Supabase);
        assert_eq!(cfg.sources.categories.len(), 6);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let td = tempdir().unwrap();
        let p = td.path().join("missing.yaml");
        assert!(matches!(load_with_env(Some(&p), no_env), Err(ConfigError::Io(_))));
    }
}
