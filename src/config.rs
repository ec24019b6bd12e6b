use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};

use config::{Config as ConfigBuilder, ConfigError, Environment, File, FileFormat};
use home::home_dir;
use log::debug;
use serde::Deserialize;

const ENV_PREFIX: &str = "DEPHARNESS";

/// Tool configuration, layered from a TOML file and `DEPHARNESS_*` environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub file: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    /// Extra package sources by name.
    pub repositories: BTreeMap<String, String>,
}

impl Config {
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_with_env(file, None)
    }

    fn load_with_env(
        file: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> anyhow::Result<Self> {
        let raw_config = RawConfig::load(file, env)?;

        Ok(Self {
            file: file.map(Path::to_path_buf),
            cache_dir: raw_config.cache.dir,
            repositories: raw_config
                .repositories
                .into_iter()
                .map(|(name, repository)| (name, repository.url))
                .collect(),
        })
    }

    /// `$HOME/.depharness/config.toml`, when a home directory is known.
    pub fn default_file() -> Option<PathBuf> {
        home_dir().map(|home| home.join(".depharness").join("config.toml"))
    }

    /// A configuration with no backing content. `file` is remembered but never read.
    pub fn isolated(file: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(file.into()),
            ..Default::default()
        }
    }
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    cache: CacheConfig,
    #[serde(default)]
    repositories: BTreeMap<String, RepositoryConfig>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct CacheConfig {
    dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
struct RepositoryConfig {
    url: String,
}

impl RawConfig {
    fn load(
        file: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();
        if let Some(file) = file {
            debug!("Loading configuration from {}", file.display());
            builder = builder.add_source(File::from(file).format(FileFormat::Toml).required(false));
        }
        builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("_")
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn load_empty() {
        let config = Config::load_with_env(None, Some(HashMap::new())).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_environment() {
        let env = HashMap::from([("DEPHARNESS_CACHE_DIR".to_owned(), "/cache".to_owned())]);
        let config = Config::load_with_env(None, Some(env)).unwrap();
        assert_eq!(config.cache_dir, Some(PathBuf::from("/cache")));
    }

    #[test]
    fn load_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.toml");
        std::fs::write(
            &file,
            r#"
            [cache]
            dir = "/var/cache/depharness"

            [repositories.internal]
            url = "https://packages.example.com/simple"
            "#,
        )
        .unwrap();

        let config = Config::load_with_env(Some(&file), Some(HashMap::new())).unwrap();
        assert_eq!(
            config,
            Config {
                file: Some(file),
                cache_dir: Some(PathBuf::from("/var/cache/depharness")),
                repositories: BTreeMap::from([(
                    "internal".to_string(),
                    "https://packages.example.com/simple".to_string()
                )]),
            }
        );
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("absent.toml");
        let config = Config::load_with_env(Some(&file), Some(HashMap::new())).unwrap();
        assert_eq!(config.repositories, BTreeMap::new());
        assert_eq!(config.cache_dir, None);
    }

    #[test]
    fn isolated_has_no_content() {
        let config = Config::isolated("config.toml");
        assert_eq!(config.file, Some(PathBuf::from("config.toml")));
        assert!(config.repositories.is_empty());
        assert_eq!(config.cache_dir, None);
    }
}
