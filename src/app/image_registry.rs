use thiserror::Error;

/// One listed image as returned by the registry, before tag filtering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageSummary {
    pub tag: Option<String>,
    pub digest: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImagePage {
    pub images: Vec<ImageSummary>,
    pub next_token: Option<String>,
}

#[async_trait::async_trait]
pub trait ImageRegistry: Send + Sync {
    async fn list_images(
        &self,
        registry_id: &str,
        repository: &str,
        page_size: usize,
        next_token: Option<String>,
    ) -> Result<ImagePage, RegistryError>;
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("repository {0} does not exist")]
    RepositoryNotFound(String),

    #[error("error in the registry client: {0}")]
    RegistryClientError(Box<dyn std::error::Error + Send + Sync>),
}
