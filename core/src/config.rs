use directories::BaseDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DATA_DIR_ENV: &str = "PARLOR_DATA_DIR";
pub const PERSIST_ENV: &str = "PARLOR_PERSIST";

/// Where and whether the persisted stores keep their slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub persist: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("storage configuration invalid: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Invalid(detail) => format!("Storage not configured—{detail}. Update parlor.yaml."),
        }
    }
}

impl StoreConfig {
    /// Resolves the configuration from `.env`, the environment and `parlor.yaml`,
    /// in that order of precedence.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let section = match locate_config_file() {
            Some(path) => read_config_file(&path)?.store.unwrap_or_default(),
            None => StoreSection::default(),
        };
        let overrides = EnvOverrides {
            data_dir: std::env::var(DATA_DIR_ENV).ok(),
            persist: std::env::var(PERSIST_ENV).ok(),
        };
        resolve_store_config(section, overrides, default_data_dir())
    }

    /// A configuration that never touches the disk.
    pub fn in_memory() -> Self {
        Self {
            data_dir: std::env::temp_dir().join("parlor"),
            persist: false,
        }
    }

    pub fn at(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            persist: true,
        }
    }
}

struct EnvOverrides {
    data_dir: Option<String>,
    persist: Option<String>,
}

fn resolve_store_config(
    section: StoreSection,
    overrides: EnvOverrides,
    default_dir: PathBuf,
) -> Result<StoreConfig, ConfigError> {
    let data_dir = match overrides.data_dir.as_deref().map(str::trim) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => section.data_dir.unwrap_or(default_dir),
    };
    let persist = match overrides.persist.as_deref() {
        Some(value) => parse_flag(value).ok_or_else(|| {
            ConfigError::Invalid(format!("{PERSIST_ENV} must be true or false, got `{value}`"))
        })?,
        None => section.persist.unwrap_or(true),
    };
    Ok(StoreConfig { data_dir, persist })
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_config_file(path: &Path) -> Result<ParlorConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|err| {
        ConfigError::Invalid(format!("failed to read {}: {err}", path.display()))
    })?;
    serde_yaml::from_str(&contents)
        .map_err(|err| ConfigError::Invalid(format!("invalid parlor.yaml: {err}")))
}

fn locate_config_file() -> Option<PathBuf> {
    parlor_yaml_candidates()
        .into_iter()
        .find(|path| path.exists())
}

fn parlor_yaml_candidates() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(base) = BaseDirs::new() {
        let config_dir = base.config_dir().join("parlor");
        paths.push(config_dir.join("parlor.yaml"));
        paths.push(config_dir.join("parlor.yml"));
        let home_dir = base.home_dir();
        paths.push(home_dir.join(".parlor").join("parlor.yaml"));
        paths.push(home_dir.join(".parlor").join("parlor.yml"));
    } else {
        paths.push(PathBuf::from("parlor.yaml"));
        paths.push(PathBuf::from("parlor.yml"));
    }
    paths
}

fn default_data_dir() -> PathBuf {
    if let Some(base) = BaseDirs::new() {
        base.config_dir().join("parlor").join("data")
    } else {
        PathBuf::from(".parlor").join("data")
    }
}

#[derive(Debug, Deserialize)]
struct ParlorConfig {
    store: Option<StoreSection>,
}

#[derive(Debug, Default, Deserialize)]
struct StoreSection {
    #[serde(default)]
    data_dir: Option<PathBuf>,
    #[serde(default)]
    persist: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_overrides() -> EnvOverrides {
        EnvOverrides {
            data_dir: None,
            persist: None,
        }
    }

    #[test]
    fn defaults_to_persistent_default_dir() {
        let config =
            resolve_store_config(StoreSection::default(), no_overrides(), "/var/parlor".into())
                .expect("config");
        assert_eq!(config, StoreConfig::at("/var/parlor"));
    }

    #[test]
    fn yaml_section_is_honoured() {
        let parsed: ParlorConfig =
            serde_yaml::from_str("store:\n  data_dir: /srv/chats\n  persist: false\n")
                .expect("yaml");
        let config = resolve_store_config(
            parsed.store.unwrap_or_default(),
            no_overrides(),
            "/unused".into(),
        )
        .expect("config");
        assert_eq!(config.data_dir, PathBuf::from("/srv/chats"));
        assert!(!config.persist);
    }

    #[test]
    fn environment_overrides_file() {
        let section = StoreSection {
            data_dir: Some("/from/file".into()),
            persist: Some(false),
        };
        let overrides = EnvOverrides {
            data_dir: Some("/from/env".into()),
            persist: Some("yes".into()),
        };
        let config = resolve_store_config(section, overrides, "/unused".into()).expect("config");
        assert_eq!(config, StoreConfig::at("/from/env"));
    }

    #[test]
    fn rejects_unparseable_persist_flag() {
        let overrides = EnvOverrides {
            data_dir: None,
            persist: Some("sometimes".into()),
        };
        let err = resolve_store_config(StoreSection::default(), overrides, "/x".into())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.user_message().contains("PARLOR_PERSIST"));
    }
}
