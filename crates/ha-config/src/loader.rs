//! YAML loader with `!include`, `!secret` and `!env_var`

use crate::error::{ConfigError, ConfigResult};
use crate::secrets::Secrets;
use serde_yaml::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Loads `configuration.yaml` and the files it includes
pub struct YamlLoader {
    config_dir: PathBuf,
    secrets: Secrets,
    include_stack: HashSet<PathBuf>,
}

impl YamlLoader {
    /// Loader for `config_dir`, reading its `secrets.yaml`
    pub fn new(config_dir: impl Into<PathBuf>) -> ConfigResult<Self> {
        let config_dir = config_dir.into();
        let secrets = Secrets::load(&config_dir)?;
        Ok(Self::with_secrets(config_dir, secrets))
    }

    pub fn with_secrets(config_dir: impl Into<PathBuf>, secrets: Secrets) -> Self {
        Self {
            config_dir: config_dir.into(),
            secrets,
            include_stack: HashSet::new(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Load a file relative to the config directory
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = match path.as_ref() {
            p if p.is_absolute() => p.to_path_buf(),
            p => self.config_dir.join(p),
        };
        debug!("Loading YAML file: {:?}", path);

        if !self.include_stack.insert(path.clone()) {
            return Err(ConfigError::IncludeCycle { path });
        }
        let result = fs::read_to_string(&path)
            .map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })
            .and_then(|content| self.load_string(&content, &path));
        self.include_stack.remove(&path);

        result
    }

    /// Parse YAML text; includes resolve relative to `source_path`
    pub fn load_string(&mut self, content: &str, source_path: &Path) -> ConfigResult<Value> {
        let value: Value =
            serde_yaml::from_str(content).map_err(|source| ConfigError::Yaml {
                path: source_path.to_path_buf(),
                source,
            })?;
        self.resolve(value, source_path)
    }

    fn resolve(&mut self, value: Value, source_path: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => {
                let tag = tagged.tag.to_string();
                trace!("Resolving tag {}", tag);
                match tag.as_str() {
                    "!include" => {
                        let path = include_path(&tagged.value, source_path, &self.config_dir)?;
                        self.load_file(path)
                    }
                    "!secret" => {
                        let key = tag_argument("!secret", &tagged.value)?;
                        Ok(Value::String(self.secrets.get(key)?.to_string()))
                    }
                    "!env_var" => env_var(tag_argument("!env_var", &tagged.value)?),
                    _ => Ok(Value::Tagged(Box::new(serde_yaml::value::TaggedValue {
                        tag: tagged.tag,
                        value: self.resolve(tagged.value, source_path)?,
                    }))),
                }
            }
            Value::Mapping(map) => {
                let mut resolved = serde_yaml::Mapping::new();
                for (key, value) in map {
                    resolved.insert(key, self.resolve(value, source_path)?);
                }
                Ok(Value::Mapping(resolved))
            }
            Value::Sequence(seq) => seq
                .into_iter()
                .map(|v| self.resolve(v, source_path))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Value::Sequence),
            other => Ok(other),
        }
    }
}

fn tag_argument<'a>(tag: &'static str, value: &'a Value) -> ConfigResult<&'a str> {
    value.as_str().ok_or_else(|| ConfigError::TagArgument {
        tag,
        found: format!("{:?}", value),
    })
}

/// `!env_var NAME [default]`
fn env_var(argument: &str) -> ConfigResult<Value> {
    let mut parts = argument.splitn(2, ' ');
    let name = parts.next().unwrap_or_default();
    match (std::env::var(name), parts.next()) {
        (Ok(value), _) => Ok(Value::String(value)),
        (Err(_), Some(default)) => Ok(Value::String(default.trim().to_string())),
        (Err(_), None) => Err(ConfigError::Unresolved {
            tag: "!env_var",
            name: name.to_string(),
        }),
    }
}

fn include_path(value: &Value, source_path: &Path, config_dir: &Path) -> ConfigResult<PathBuf> {
    let raw = tag_argument("!include", value)?;
    let path = Path::new(raw);
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let base = source_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(config_dir);
    Ok(base.join(path))
}

/// Load `file` from `config_dir` with tag resolution
pub fn load_yaml(config_dir: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    YamlLoader::new(config_dir)?.load_file(file)
}

/// Load YAML text with tag resolution
pub fn load_yaml_string(
    config_dir: impl Into<PathBuf>,
    content: &str,
    source_name: &str,
) -> ConfigResult<Value> {
    let mut loader = YamlLoader::new(config_dir)?;
    let source = loader.config_dir().join(source_name);
    loader.load_string(content, &source)
}
