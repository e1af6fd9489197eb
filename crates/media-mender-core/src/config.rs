use crate::model::TypeFilter;
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_DB_PATH: &str = "media_mender.db";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub root_path: Option<String>,
    pub file_types: TypeFilter,
    pub backup: bool,
    pub workers: usize,
    pub db_path: String,
    pub ffprobe_path: String,
    pub find_duplicates: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            root_path: None,
            file_types: TypeFilter::Both,
            backup: true,
            workers: DEFAULT_WORKERS,
            db_path: DEFAULT_DB_PATH.to_string(),
            ffprobe_path: "ffprobe".to_string(),
            find_duplicates: false,
        }
    }
}

impl AppConfig {
    /// Worker count, never below one.
    pub fn worker_count(&self) -> usize {
        self.workers.max(1)
    }
}

/// Load `Config.*` from the working directory (optional), overlaid with
/// `MEDIA_MENDER_*` environment variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    load_configuration_from("Config")
}

pub fn load_configuration_from(base_name: &str) -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name(base_name).required(false))
        .add_source(Environment::with_prefix("MEDIA_MENDER"))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// The root must exist and be a directory.
pub fn validate_root(root: &str) -> Result<(), crate::Error> {
    let path = Path::new(root);
    if !path.exists() {
        return Err(crate::Error::NotFound(path.to_path_buf()));
    }
    if !path.is_dir() {
        return Err(crate::Error::NotADirectory(path.to_path_buf()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert!(config.backup);
        assert_eq!(config.workers, 5);
        assert_eq!(config.file_types, TypeFilter::Both);
        assert!(!config.find_duplicates);
    }

    #[test]
    fn test_load_from_toml_file() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("mender");
        fs::write(
            tmp.path().join("mender.toml"),
            "root_path = \"/data/photos\"\nfile_types = \"images\"\nbackup = false\nworkers = 3\n",
        )
        .unwrap();

        let config = load_configuration_from(base.to_str().unwrap()).unwrap();
        assert_eq!(config.root_path.as_deref(), Some("/data/photos"));
        assert_eq!(config.file_types, TypeFilter::Images);
        assert!(!config.backup);
        assert_eq!(config.workers, 3);
        // Unspecified keys keep their defaults
        assert_eq!(config.db_path, DEFAULT_DB_PATH);
    }

    #[test]
    fn test_worker_count_is_at_least_one() {
        let config = AppConfig {
            workers: 0,
            ..AppConfig::default()
        };
        assert_eq!(config.worker_count(), 1);
    }

    #[test]
    fn test_validate_root() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(validate_root(tmp.path().to_str().unwrap()).is_ok());

        let file = tmp.path().join("a.jpg");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(
            validate_root(file.to_str().unwrap()),
            Err(crate::Error::NotADirectory(_))
        ));
        assert!(matches!(
            validate_root(tmp.path().join("missing").to_str().unwrap()),
            Err(crate::Error::NotFound(_))
        ));
    }
}
