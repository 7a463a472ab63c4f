use std::{fmt::Display, time::Duration};

use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::{
    app::{
        ImagePage, ImageRegistry, RegistryError, ScanFindingsPage, ScanFindingsSource,
        ScanSourceError,
    },
    domain::scanreport::scan_query::ScanQuery,
};

use super::http_scan_api_responses::{DescribeScanFindingsResponse, ListImagesResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("scan-report/", env!("CARGO_PKG_VERSION"));

/// Client for the registry/scanner JSON gateway.
#[derive(Clone)]
pub struct HttpScanApi {
    base_url: Url,
    api_token: ApiToken,
    client: reqwest::Client,
}

#[derive(Clone, Deserialize)]
pub struct ApiToken(pub String);

impl std::fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[redacted]")
    }
}

impl Display for ApiToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[redacted]")
    }
}

#[derive(Error, Debug)]
pub enum HttpScanApiError {
    #[error("invalid gateway url {0:?}")]
    InvalidUrl(String),

    #[error("error performing http request: {0}")]
    HTTPError(#[from] reqwest::Error),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("unexpected response status {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },

    #[error("error deserializing the response: {0}")]
    ResponseDeserialization(#[from] serde_json::Error),
}

impl From<HttpScanApiError> for RegistryError {
    fn from(value: HttpScanApiError) -> Self {
        match value {
            HttpScanApiError::NotFound(resource) => RegistryError::RepositoryNotFound(resource),
            other => RegistryError::RegistryClientError(Box::new(other)),
        }
    }
}

impl From<HttpScanApiError> for ScanSourceError {
    fn from(value: HttpScanApiError) -> Self {
        match value {
            HttpScanApiError::NotFound(resource) => ScanSourceError::NotFound(resource),
            HttpScanApiError::ResponseDeserialization(_) => {
                ScanSourceError::Decoding(Box::new(value))
            }
            other => ScanSourceError::Transport(Box::new(other)),
        }
    }
}

impl HttpScanApi {
    pub fn new(url: &str, api_token: ApiToken) -> Result<Self, HttpScanApiError> {
        let base_url = Url::parse(url).map_err(|_| HttpScanApiError::InvalidUrl(url.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(HttpScanApiError::InvalidUrl(url.to_string()));
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url,
            api_token,
            client,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, HttpScanApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| HttpScanApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn images_url(&self, registry_id: &str, repository: &str) -> Result<Url, HttpScanApiError> {
        self.endpoint(&[
            "v1",
            "registries",
            registry_id,
            "repositories",
            repository,
            "images",
        ])
    }

    fn scan_findings_url(&self, query: &ScanQuery) -> Result<Url, HttpScanApiError> {
        self.endpoint(&[
            "v1",
            "registries",
            query.registry_id(),
            "repositories",
            query.repository(),
            "images",
            query.digest(),
            "scan-findings",
        ])
    }

    /// Performs a GET and returns the parsed body. The body is kept as a
    /// generic document so callers can preserve it verbatim.
    async fn get_json(&self, url: Url, params: &[(&str, String)]) -> Result<Value, HttpScanApiError> {
        debug!(%url, "requesting gateway");

        let response = self
            .client
            .get(url.clone())
            .bearer_auth(&self.api_token.0)
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(HttpScanApiError::NotFound(url.path().to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HttpScanApiError::UnexpectedStatus { status, body });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn list_images_page(
        &self,
        registry_id: &str,
        repository: &str,
        page_size: usize,
        next_token: Option<String>,
    ) -> Result<ImagePage, HttpScanApiError> {
        let mut params = vec![("maxResults", page_size.to_string())];
        params.extend(next_token.map(|token| ("nextToken", token)));

        let raw = self
            .get_json(self.images_url(registry_id, repository)?, &params)
            .await?;
        let response: ListImagesResponse = serde_json::from_value(raw)?;

        Ok(response.into())
    }

    async fn scan_findings_page(
        &self,
        query: &ScanQuery,
        next_token: Option<String>,
    ) -> Result<ScanFindingsPage, HttpScanApiError> {
        let mut params = vec![("imageTag", query.tag().to_string())];
        params.extend(next_token.map(|token| ("nextToken", token)));

        let raw = self.get_json(self.scan_findings_url(query)?, &params).await?;
        let response = DescribeScanFindingsResponse::deserialize(&raw)?;

        Ok(response.into_page(raw))
    }
}

#[async_trait::async_trait]
impl ImageRegistry for HttpScanApi {
    async fn list_images(
        &self,
        registry_id: &str,
        repository: &str,
        page_size: usize,
        next_token: Option<String>,
    ) -> Result<ImagePage, RegistryError> {
        Ok(self
            .list_images_page(registry_id, repository, page_size, next_token)
            .await?)
    }
}

#[async_trait::async_trait]
impl ScanFindingsSource for HttpScanApi {
    async fn describe_scan_findings(
        &self,
        query: &ScanQuery,
        next_token: Option<String>,
    ) -> Result<ScanFindingsPage, ScanSourceError> {
        Ok(self.scan_findings_page(query, next_token).await?)
    }
}
