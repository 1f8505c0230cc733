//! Configuration errors

use std::path::PathBuf;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or interpreting `configuration.yaml`
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config, include or secrets file could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid YAML: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `!secret` or `!env_var` named something with no value
    #[error("{tag} {name} has no value")]
    Unresolved { tag: &'static str, name: String },

    /// A tag was given something other than a string
    #[error("{tag} expects a string argument, got {found}")]
    TagArgument { tag: &'static str, found: String },

    /// A file ends up including itself
    #[error("{path} includes itself")]
    IncludeCycle { path: PathBuf },

    /// A platform block did not match its schema
    #[error("invalid config for [{component}.{platform}]: {source}")]
    InvalidPlatform {
        component: String,
        platform: String,
        #[source]
        source: serde_json::Error,
    },
}
