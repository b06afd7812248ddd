use super::Config;
use crate::error::{BurrowError, ErrorCode, ErrorExt, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Locates and parses the YAML config.
///
/// Lookup order: explicit path, then `$BURROW_CONFIG`, then the platform
/// config directory. Only an explicit path is required to exist.
pub struct ConfigLoader {
    explicit: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { explicit: None }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            explicit: Some(path.into()),
        }
    }

    fn candidate(&self) -> Option<(PathBuf, bool)> {
        if let Some(path) = &self.explicit {
            return Some((path.clone(), true));
        }
        if let Ok(path) = std::env::var("BURROW_CONFIG") {
            return Some((PathBuf::from(path), true));
        }
        super::get_config_path().map(|path| (path, false))
    }

    pub async fn load(&self) -> Result<Config> {
        let mut config = match self.candidate() {
            Some((path, required)) => {
                if fs::try_exists(&path).await.unwrap_or(false) {
                    Self::load_file(&path).await?
                } else if required {
                    return Err(BurrowError::config_with_code(
                        ErrorCode::CONFIG_NOT_FOUND,
                        format!("config file {} does not exist", path.display()),
                    ));
                } else {
                    tracing::debug!("No config at {}, using defaults", path.display());
                    Config::default()
                }
            }
            None => Config::default(),
        };

        config.merge_env_vars();
        config.validate()?;
        Ok(config)
    }

    pub async fn load_file(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path)
            .await
            .to_config_error(format!("Failed to read {}", path.display()))?;
        let config = Self::parse(&content).map_err(|e| e.with_context(path.display()))?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Config> {
        if content.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(content).map_err(|e| {
            BurrowError::config_with_code(ErrorCode::CONFIG_INVALID_YAML, e.to_string())
                .with_source(e)
        })
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "repos_dir: /srv/repos\nrules:\n  - pattern: \"*acme*\"\n    max_recycled: 1\n",
        )
        .unwrap();

        let config = ConfigLoader::with_path(&path).load().await.unwrap();
        assert_eq!(config.repos_dir, PathBuf::from("/srv/repos"));
        assert_eq!(config.rules[0].max_recycled, Some(1));
    }

    #[tokio::test]
    async fn test_missing_explicit_file_is_error() {
        let dir = TempDir::new().unwrap();
        let err = ConfigLoader::with_path(dir.path().join("nope.yaml"))
            .load()
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_NOT_FOUND);
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let err = ConfigLoader::parse("rules: [unclosed").unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_INVALID_YAML);
    }

    #[test]
    fn test_parse_empty_is_default() {
        let config = ConfigLoader::parse("  \n").unwrap();
        assert_eq!(config.max_recycled, 5);
    }
}
