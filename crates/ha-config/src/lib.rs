//! YAML configuration loading
//!
//! `configuration.yaml` is read with three custom tags:
//!
//! - `!include path` - include another YAML file
//! - `!secret key` - substitute from `secrets.yaml`
//! - `!env_var VAR [default]` - environment variable substitution
//!
//! Integrations configured from YAML pull their blocks out with
//! [`domain_config`] and [`platform_configs`].
//!
//! # Example
//!
//! ```ignore
//! use ha_config::{load_yaml, platform_configs};
//!
//! let config = load_yaml("/config", "configuration.yaml")?;
//! for entry in platform_configs(&config, "sensor", "systemmonitor") {
//!     // ...
//! }
//! ```

mod error;
mod loader;
mod platforms;
mod secrets;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, load_yaml_string, YamlLoader};
pub use platforms::{domain_config, parse_platform, platform_configs, to_json};
pub use secrets::Secrets;

pub use serde_yaml::Value;
