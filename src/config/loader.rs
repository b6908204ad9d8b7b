use crate::config::schema::{Config, ValidationError};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE: &str = "xpo-patcher.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config TOML: {0}")]
    Toml(#[from] toml_edit::de::Error),

    #[error("invalid config: {0}")]
    Validation(#[from] ValidationError),

    /// A parse or validation failure in a config file.
    #[error("{path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: Box<ConfigError>,
    },
}

pub fn load_from_str(input: &str) -> Result<Config, ConfigError> {
    let config: Config = toml_edit::de::from_str(input)?;
    config.validate()?;
    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|source| ConfigError::File {
        path: path.to_path_buf(),
        source: Box::new(source),
    })
}

/// Load `explicit` if given, else `xpo-patcher.toml` in `dir` if present,
/// else the defaults.
pub fn load_or_default(explicit: Option<&Path>, dir: &Path) -> Result<Config, ConfigError> {
    if let Some(path) = explicit {
        return load_from_path(path);
    }
    let candidate = dir.join(CONFIG_FILE);
    if candidate.is_file() {
        log::debug!("using config {}", candidate.display());
        load_from_path(candidate)
    } else {
        Ok(Config::default())
    }
}
