use std::{env::VarError, path::PathBuf, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{ImageRegistry, ScanFindingsSource, image_lister::DEFAULT_PAGE_SIZE, retry::BackoffPolicy};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Constant,
    Exponential,
}

/// Pipeline configuration. Durations are expressed in seconds.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub registry_id: String,
    pub repositories: Vec<String>,
    pub allowed_tag_patterns: Vec<String>,
    pub report_root: PathBuf,
    pub poll_interval: u64,
    pub poll_deadline: u64,
    pub backoff: BackoffKind,
    pub backoff_multiplier: u32,
    pub max_poll_interval: u64,
    pub jitter: bool,
    pub max_concurrent_polls: usize,
    pub list_page_size: usize,
    pub data_namespace: String,
    pub run_deadline: Option<u64>,
    pub api: ApiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry_id: String::new(),
            repositories: Vec::new(),
            allowed_tag_patterns: Vec::new(),
            report_root: PathBuf::from("."),
            poll_interval: 5,
            poll_deadline: 60,
            backoff: BackoffKind::Constant,
            backoff_multiplier: 2,
            max_poll_interval: 30,
            jitter: false,
            max_concurrent_polls: 4,
            list_page_size: DEFAULT_PAGE_SIZE,
            data_namespace: "ecr".to_string(),
            run_deadline: None,
            api: ApiConfig::default(),
        }
    }
}

#[derive(Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

impl Config {
    pub fn backoff_policy(&self) -> BackoffPolicy {
        let interval = Duration::from_secs(self.poll_interval);
        let window = Duration::from_secs(self.poll_deadline);

        let policy = match self.backoff {
            BackoffKind::Constant => BackoffPolicy::constant(interval, window),
            BackoffKind::Exponential => BackoffPolicy::exponential(
                interval,
                window,
                self.backoff_multiplier,
                Duration::from_secs(self.max_poll_interval),
            ),
        };
        policy.with_jitter(self.jitter)
    }

    pub fn run_deadline(&self) -> Option<Duration> {
        self.run_deadline.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<(), ComponentFactoryError> {
        let invalid = |reason: &str| Err(ComponentFactoryError::InvalidConfiguration(reason.to_string()));

        if self.registry_id.is_empty() {
            return invalid("registry_id must be set");
        }
        if self.poll_interval == 0 {
            return invalid("poll_interval must be at least one second");
        }
        if self.max_concurrent_polls == 0 {
            return invalid("max_concurrent_polls must be at least 1");
        }
        if self.list_page_size == 0 {
            return invalid("list_page_size must be at least 1");
        }
        if self.data_namespace.is_empty() {
            return invalid("data_namespace must not be empty");
        }
        Ok(())
    }
}

pub struct Components {
    pub registry: Arc<dyn ImageRegistry>,
    pub scan_findings: Arc<dyn ScanFindingsSource>,
}

pub trait ComponentFactory {
    fn create_components(&self, config: &Config) -> Result<Components, ComponentFactoryError>;
}

#[derive(Error, Debug)]
pub enum ComponentFactoryError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("unable to retrieve scan api token from env var: {0}")]
    UnableToRetrieveAPITokenFromEnvVar(#[from] VarError),

    #[error("unable to build the http client: {0}")]
    HttpClient(String),
}
