// src/core/config_loader.rs

//! # Config Loader
//!
//! Finds `adderkit.toml`, parses it, layers command line overrides on top and
//! produces the [`HarnessSettings`] the test harness runs with. Relative paths
//! in the file are anchored at the file's directory, not at the process's.

use crate::constants::HARNESS_CONFIG_FILENAME;
use crate::core::paths::{self, PathError};
use crate::models::{HarnessConfig, HarnessSettings};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read configuration file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid TOML in '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error(transparent)]
    Path(#[from] PathError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Values given on the command line. `None` keeps the file's value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub templates_dir: Option<String>,
    pub snapshots_dir: Option<String>,
    pub concurrency: Option<usize>,
}

/// Returns `explicit` when given, otherwise `adderkit.toml` in `cwd` if it exists.
pub fn locate(explicit: Option<&Path>, cwd: &Path) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(cwd.join(path)),
        None => {
            let candidate = cwd.join(HARNESS_CONFIG_FILENAME);
            candidate.is_file().then_some(candidate)
        }
    }
}

/// Parses one configuration file.
pub fn load_file(path: &Path) -> ConfigResult<HarnessConfig> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads the configuration for a run started in `cwd`.
///
/// Without a file, every default applies and paths are relative to `cwd`.
pub fn load(explicit: Option<&Path>, cwd: &Path, overrides: &ConfigOverrides) -> ConfigResult<HarnessSettings> {
    // 1. Locate and parse.
    let (config, base) = match locate(explicit, cwd) {
        Some(path) => {
            log::debug!("Loading harness configuration from '{}'", path.display());
            let config = load_file(&path)?;
            let base = path.parent().map(Path::to_path_buf).unwrap_or_else(|| cwd.to_path_buf());
            (config, base)
        }
        None => {
            log::debug!("No {} found, using defaults", HARNESS_CONFIG_FILENAME);
            (HarnessConfig::default(), cwd.to_path_buf())
        }
    };

    // 2. Resolve against the file's directory.
    resolve(config, &base, overrides)
}

/// Applies `overrides` to `config` and expands its paths relative to `base`.
pub fn resolve(config: HarnessConfig, base: &Path, overrides: &ConfigOverrides) -> ConfigResult<HarnessSettings> {
    let HarnessConfig { harness, commands } = config;

    let concurrency = overrides.concurrency.unwrap_or(harness.concurrency);
    if concurrency == 0 {
        return Err(ConfigError::Invalid {
            field: "harness.concurrency",
            reason: "must be at least 1".to_string(),
        });
    }
    if commands.install.is_empty() {
        return Err(ConfigError::Invalid {
            field: "commands.install",
            reason: "the command cannot be empty".to_string(),
        });
    }
    if commands.dev.is_empty() {
        return Err(ConfigError::Invalid {
            field: "commands.dev",
            reason: "the command cannot be empty".to_string(),
        });
    }

    // Overrides are anchored at the same base as file values.
    let templates = overrides.templates_dir.as_deref().unwrap_or(&harness.templates_dir);
    let snapshots = overrides.snapshots_dir.as_deref().unwrap_or(&harness.snapshots_dir);

    Ok(HarnessSettings {
        templates_dir: paths::expand_path(templates, base)?,
        snapshots_dir: paths::expand_path(snapshots, base)?,
        services_dir: paths::expand_path(&harness.services_dir, base)?,
        concurrency,
        scenario_timeout: Duration::from_secs(harness.scenario_timeout_secs),
        hook_timeout: Duration::from_secs(harness.hook_timeout_secs),
        ready_timeout: Duration::from_secs(harness.ready_timeout_secs),
        install_command: commands.install,
        dev_command: commands.dev,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_a_file() {
        let dir = tempdir().unwrap();
        let settings = load(None, dir.path(), &ConfigOverrides::default()).unwrap();
        assert_eq!(settings.templates_dir, dir.path().join("templates"));
        assert_eq!(settings.snapshots_dir, dir.path().join("_snapshots"));
        assert_eq!(settings.concurrency, 4);
        assert_eq!(settings.scenario_timeout, Duration::from_secs(120));
        assert_eq!(settings.hook_timeout, Duration::from_secs(180));
        assert_eq!(settings.install_command, vec!["pnpm", "install"]);
        assert!(settings.dev_command.iter().any(|a| a == "{port}"));
    }

    #[test]
    fn test_partial_file_and_overrides() {
        let dir = tempdir().unwrap();
        let config_dir = dir.path().join("conf");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(
            config_dir.join("harness.toml"),
            "[harness]\ntemplates_dir = \"tpl\"\nconcurrency = 2\n\n[commands]\ninstall = [\"npm\", \"ci\"]\n",
        )
        .unwrap();

        let overrides = ConfigOverrides {
            concurrency: Some(8),
            ..Default::default()
        };
        let settings = load(Some(Path::new("conf/harness.toml")), dir.path(), &overrides).unwrap();
        assert_eq!(settings.templates_dir, config_dir.join("tpl"));
        assert_eq!(settings.concurrency, 8);
        assert_eq!(settings.install_command, vec!["npm", "ci"]);
        assert_eq!(settings.ready_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_invalid_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(HARNESS_CONFIG_FILENAME);

        fs::write(&path, "[harness]\nunknown_field = 1\n").unwrap();
        assert!(matches!(
            load(None, dir.path(), &ConfigOverrides::default()),
            Err(ConfigError::Parse { .. })
        ));

        fs::write(&path, "[harness]\nconcurrency = 0\n").unwrap();
        assert!(matches!(
            load(None, dir.path(), &ConfigOverrides::default()),
            Err(ConfigError::Invalid { field: "harness.concurrency", .. })
        ));

        assert!(matches!(
            load(Some(Path::new("missing.toml")), dir.path(), &ConfigOverrides::default()),
            Err(ConfigError::Read { .. })
        ));
    }
}
