use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use thiserror::Error;

use crate::app::component_factory::Config;

pub const ENV_PREFIX: &str = "SCAN_REPORT_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to load configuration: {0}")]
    Load(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(value: figment::Error) -> Self {
        ConfigError::Load(Box::new(value))
    }
}

/// Default location of the configuration file, `<config dir>/scan-report/config.toml`.
pub fn default_config_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("scan-report");
    path.push("config.toml");
    path
}

/// Loads the configuration by layering, from lowest to highest priority: the
/// built-in defaults, the TOML file at `path` (if it exists) and
/// `SCAN_REPORT_*` environment variables. Nested keys use `__`, e.g.
/// `SCAN_REPORT_API__URL`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    Ok(figment(path).extract()?)
}

fn figment(path: &Path) -> Figment {
    Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}
