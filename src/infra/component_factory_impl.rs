use std::sync::Arc;

use crate::{
    app::component_factory::{ComponentFactory, ComponentFactoryError, Components, Config},
    infra::{ApiToken, HttpScanApi},
};

pub const API_TOKEN_ENV_VAR: &str = "SCAN_API_TOKEN";

pub struct ConcreteComponentFactory;

impl ComponentFactory for ConcreteComponentFactory {
    fn create_components(&self, config: &Config) -> Result<Components, ComponentFactoryError> {
        let token = config
            .api
            .token
            .clone()
            .map(Ok)
            .unwrap_or_else(|| std::env::var(API_TOKEN_ENV_VAR))
            .map(ApiToken)?;

        let api = HttpScanApi::new(&config.api.url, token)
            .map_err(|e| ComponentFactoryError::HttpClient(e.to_string()))?;
        let api = Arc::new(api);

        Ok(Components {
            registry: api.clone(),
            scan_findings: api,
        })
    }
}
