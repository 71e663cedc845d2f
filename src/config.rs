use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::catalog::CatalogSource;

pub const DEFAULT_PATTERN: &str = "{artist}/{album}/{title}/{title}.{ext}";
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "m4a", "m4b", "aac"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub input_dir: Option<PathBuf>,
    /// `None` means "same as input directory".
    pub output_dir: Option<PathBuf>,
    pub extensions: Vec<String>,
    pub path_pattern: String,
    pub catalog: CatalogSource,
    pub google_books_api_key: Option<String>,
    pub set_title: bool,
    pub http_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_dir: None,
            output_dir: None,
            extensions: SUPPORTED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            path_pattern: DEFAULT_PATTERN.to_string(),
            catalog: CatalogSource::OpenLibrary,
            google_books_api_key: None,
            set_title: false,
            http_timeout_secs: 10,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let contents = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            let config: Config = serde_json::from_str(&contents)
                .with_context(|| format!("Invalid config file {}", config_path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, json)?;

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not find config directory")?;
        Ok(config_dir.join("audiobook-organizer").join("config.json"))
    }

    /// Output directory, falling back to the input directory when unset.
    pub fn effective_output_dir(&self) -> Option<PathBuf> {
        self.output_dir.clone().or_else(|| self.input_dir.clone())
    }

    /// Extensions lowercased and stripped of any leading dot.
    pub fn normalized_extensions(&self) -> Vec<String> {
        self.extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.path_pattern, DEFAULT_PATTERN);
        assert_eq!(config.extensions.len(), 4);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config {
            input_dir: Some(PathBuf::from("/books")),
            catalog: CatalogSource::GoogleBooks,
            google_books_api_key: Some("abc".to_string()),
            set_title: true,
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"set_title": true}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(config.set_title);
        assert_eq!(config.http_timeout_secs, 10);
    }

    #[test]
    fn test_output_dir_defaults_to_input() {
        let config = Config {
            input_dir: Some(PathBuf::from("/in")),
            ..Config::default()
        };
        assert_eq!(config.effective_output_dir(), Some(PathBuf::from("/in")));

        let config = Config {
            output_dir: Some(PathBuf::from("/out")),
            ..config
        };
        assert_eq!(config.effective_output_dir(), Some(PathBuf::from("/out")));
    }

    #[test]
    fn test_normalized_extensions() {
        let config = Config {
            extensions: vec![".MP3".to_string(), " m4b ".to_string(), "".to_string()],
            ..Config::default()
        };
        assert_eq!(config.normalized_extensions(), vec!["mp3", "m4b"]);
    }
}
