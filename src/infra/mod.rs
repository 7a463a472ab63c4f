mod component_factory_impl;
mod config_loader;
mod http_scan_api;
mod http_scan_api_responses;

pub use component_factory_impl::{API_TOKEN_ENV_VAR, ConcreteComponentFactory};
pub use config_loader::{ConfigError, ENV_PREFIX, default_config_path, load_config};
pub use http_scan_api::{ApiToken, HttpScanApi, HttpScanApiError};
