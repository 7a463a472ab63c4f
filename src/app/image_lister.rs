use std::sync::Arc;

use futures::{StreamExt, stream};
use itertools::Itertools;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::scanreport::{image_ref::ImageRef, tag_patterns::TagPatterns};

use super::{ImageRegistry, RegistryError};

pub const DEFAULT_PAGE_SIZE: usize = 1000;
const CONCURRENT_REPOSITORY_LISTINGS: usize = 4;

/// Result of enumerating every configured repository.
#[derive(Debug, Default)]
pub struct Listing {
    pub images: Vec<ImageRef>,
    pub failed_repositories: Vec<String>,
    pub cancelled_repositories: Vec<String>,
}

impl Listing {
    /// True when `configured` repositories were requested and every one of them
    /// failed remotely.
    pub fn all_unreachable(&self, configured: usize) -> bool {
        configured > 0 && self.failed_repositories.len() == configured
    }
}

enum RepositoryListing {
    Listed(Vec<ImageRef>),
    Failed(RegistryError),
    Cancelled,
}

pub struct ImageLister {
    registry: Arc<dyn ImageRegistry>,
    registry_id: String,
    repositories: Vec<String>,
    tag_patterns: TagPatterns,
    page_size: usize,
}

impl ImageLister {
    pub fn new(
        registry: Arc<dyn ImageRegistry>,
        registry_id: impl Into<String>,
        repositories: Vec<String>,
        tag_patterns: TagPatterns,
    ) -> Self {
        Self {
            registry,
            registry_id: registry_id.into(),
            repositories,
            tag_patterns,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn repositories(&self) -> &[String] {
        &self.repositories
    }

    /// Lists all matching images. Every call queries the registry again.
    pub async fn list(&self, cancel: &CancellationToken) -> Listing {
        let per_repository: Vec<(&String, RepositoryListing)> = stream::iter(&self.repositories)
            .map(|repository| async move {
                (repository, self.list_repository(repository, cancel).await)
            })
            .buffered(CONCURRENT_REPOSITORY_LISTINGS)
            .collect()
            .await;

        let mut listing = Listing::default();
        let mut images = Vec::new();
        for (repository, result) in per_repository {
            match result {
                RepositoryListing::Listed(found) => images.extend(found),
                RepositoryListing::Failed(error) => {
                    warn!(%repository, %error, "unable to list repository, skipping it");
                    listing.failed_repositories.push(repository.clone());
                }
                RepositoryListing::Cancelled => {
                    warn!(%repository, "listing cancelled before the repository was fully read");
                    listing.cancelled_repositories.push(repository.clone());
                }
            }
        }
        listing.images = images.into_iter().unique().collect();

        info!(
            images = listing.images.len(),
            repositories = self.repositories.len(),
            failed = listing.failed_repositories.len(),
            "image listing finished"
        );
        listing
    }

    async fn list_repository(
        &self,
        repository: &str,
        cancel: &CancellationToken,
    ) -> RepositoryListing {
        let mut images = Vec::new();
        let mut next_token = None;

        loop {
            let page = tokio::select! {
                biased;
                _ = cancel.cancelled() => return RepositoryListing::Cancelled,
                page = self.registry.list_images(
                    &self.registry_id,
                    repository,
                    self.page_size,
                    next_token.take(),
                ) => page,
            };

            let page = match page {
                Ok(page) => page,
                Err(error) => return RepositoryListing::Failed(error),
            };

            debug!(
                %repository,
                images = page.images.len(),
                has_more = page.next_token.is_some(),
                "received image page"
            );

            images.extend(page.images.into_iter().filter_map(|summary| {
                let tag = summary.tag?;
                self.tag_patterns
                    .matches(&tag)
                    .then(|| ImageRef::new(repository, tag, summary.digest))
            }));

            match page.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }

        RepositoryListing::Listed(images)
    }
}
