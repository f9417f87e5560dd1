// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PipelineError, PipelineResult};

pub const API_KEY_ENV: &str = "MASSIVE_API_KEY";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub massive: MassiveConfig,
    pub news: NewsConfig,
    pub embedding: EmbeddingConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MassiveConfig {
    pub base_url: String,
    /// key=value file holding the API key, relative to the working directory
    pub api_key_file: PathBuf,
    /// Passed straight to the HTTP client
    pub timeout_secs: u64,
}

impl Default for MassiveConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.massive.com".to_string(),
            api_key_file: PathBuf::from("Massive").join("API_KEYS"),
            timeout_secs: 30,
        }
    }
}

impl MassiveConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub ticker: String,
    pub limit: usize,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            ticker: "AAPL".to_string(),
            limit: 5,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model_id: String,
    pub revision: String,
    pub max_length: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_id: "ProsusAI/finbert".to_string(),
            revision: "main".to_string(),
            max_length: 512,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub data_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

fn get_config_path() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("config.toml");
    path
}

/// Load the config from `path`, or from `config.toml` next to the manifest.
/// A missing default file yields the built-in defaults; an explicitly given
/// path must exist.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let (config_path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (get_config_path(), false),
    };

    if !config_path.exists() && !required {
        return Ok(Config::default());
    }

    let config_str = fs::read_to_string(&config_path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", config_path.display(), e))?;
    let config: Config = toml::from_str(&config_str)?;
    Ok(config)
}

/// Parse the contents of a key file. Accepts `MASSIVE_API_KEY = "key"` as
/// well as a bare key.
pub fn parse_api_key(content: &str) -> Option<String> {
    let content = content.trim();
    let value = match content.split_once('=') {
        Some((_, value)) => value.trim().trim_matches(|c| c == '"' || c == '\''),
        None => content,
    };

    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Resolve the Massive API key: the key file first, then the environment.
pub fn load_api_key(key_file: &Path) -> PipelineResult<String> {
    load_api_key_with(key_file, env::var(API_KEY_ENV).ok())
}

/// As [`load_api_key`], with the environment value passed in. It is only
/// consulted when the key file does not exist.
pub fn load_api_key_with(key_file: &Path, env_value: Option<String>) -> PipelineResult<String> {
    match fs::read_to_string(key_file) {
        Ok(content) => parse_api_key(&content).ok_or_else(|| {
            PipelineError::Config(format!("API key file {} is empty", key_file.display()))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => env_value
            .as_deref()
            .and_then(parse_api_key)
            .ok_or_else(|| {
                PipelineError::Config(format!(
                    "API_KEYS file not found at {} and {} is not set",
                    key_file.display(),
                    API_KEY_ENV
                ))
            }),
        Err(e) => Err(PipelineError::Config(format!(
            "Error reading API key from {}: {}",
            key_file.display(),
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_api_key() {
        assert_eq!(
            parse_api_key("MASSIVE_API_KEY = \"abc123\"\n"),
            Some("abc123".to_string())
        );
        assert_eq!(parse_api_key("KEY='xyz'"), Some("xyz".to_string()));
        assert_eq!(parse_api_key("  rawkey  "), Some("rawkey".to_string()));
        assert_eq!(parse_api_key("MASSIVE_API_KEY = \"\""), None);
        assert_eq!(parse_api_key(""), None);
    }

    #[test]
    fn test_load_api_key_from_file() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("API_KEYS");
        fs::write(&path, "MASSIVE_API_KEY = \"file-key\"")?;

        assert_eq!(load_api_key(&path)?, "file-key");
        Ok(())
    }

    #[test]
    fn test_empty_key_file_is_config_error() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("API_KEYS");
        fs::write(&path, "MASSIVE_API_KEY =")?;

        let err = load_api_key(&path).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert!(err.to_string().contains("is empty"));
        Ok(())
    }

    #[test]
    fn test_missing_key_file_without_env_is_config_error() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("API_KEYS");

        let err = load_api_key_with(&path, None).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        let message = err.to_string();
        assert!(message.contains("not found"));
        assert!(message.contains("MASSIVE_API_KEY is not set"));

        let err = load_api_key_with(&path, Some("  ".to_string())).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        Ok(())
    }

    #[test]
    fn test_missing_key_file_falls_back_to_env() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("API_KEYS");

        assert_eq!(load_api_key_with(&path, Some("env-key".to_string()))?, "env-key");
        Ok(())
    }

    #[test]
    fn test_key_file_wins_over_env() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("API_KEYS");
        fs::write(&path, "MASSIVE_API_KEY = \"file-key\"")?;

        assert_eq!(load_api_key_with(&path, Some("env-key".to_string()))?, "file-key");
        Ok(())
    }

    #[test]
    fn test_partial_config_uses_defaults() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(&path, "[news]\nticker = \"MSFT\"\n")?;

        let config = load_config(Some(&path))?;
        assert_eq!(config.news.ticker, "MSFT");
        assert_eq!(config.news.limit, 5);
        assert_eq!(config.embedding.model_id, "ProsusAI/finbert");
        assert_eq!(config.embedding.max_length, 512);
        assert_eq!(config.massive.timeout(), Duration::from_secs(30));
        Ok(())
    }

    #[test]
    fn test_explicit_missing_config_fails() {
        let dir = tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
