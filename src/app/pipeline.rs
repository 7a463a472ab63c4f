use std::{path::PathBuf, time::Duration};

use futures::{StreamExt, stream};
use itertools::Itertools;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::scanreport::tag_patterns::TagPatterns;

use super::{
    ImageLister, ReportRenderer, ScanPoller,
    component_factory::{ComponentFactoryError, Components, Config},
    findings_aggregator::{PollOutcome, aggregate},
};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("unable to create the report root {}: {source}", .path.display())]
    OutputRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("none of the {0} configured repositories could be listed")]
    ListingUnavailable(usize),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub listed: usize,
    pub completed: usize,
    pub skipped: usize,
    pub rendered: usize,
    pub render_failures: usize,
    pub failed_repositories: usize,
    pub interrupted: bool,
}

/// Lists images, polls their scans, aggregates the findings and renders the
/// report tree.
pub struct ReportPipeline {
    lister: ImageLister,
    poller: ScanPoller,
    renderer: ReportRenderer,
    max_concurrent_polls: usize,
    run_deadline: Option<Duration>,
}

impl ReportPipeline {
    pub fn new(lister: ImageLister, poller: ScanPoller, renderer: ReportRenderer) -> Self {
        Self {
            lister,
            poller,
            renderer,
            max_concurrent_polls: 4,
            run_deadline: None,
        }
    }

    pub fn from_config(config: &Config, components: Components) -> Result<Self, ComponentFactoryError> {
        config.validate()?;

        let tag_patterns = TagPatterns::new(&config.allowed_tag_patterns)
            .map_err(|e| ComponentFactoryError::InvalidConfiguration(e.to_string()))?;
        if tag_patterns.is_empty() {
            warn!("no allowed tag patterns configured, no image will be scanned");
        }

        let lister = ImageLister::new(
            components.registry,
            &config.registry_id,
            config.repositories.clone(),
            tag_patterns,
        )
        .with_page_size(config.list_page_size);
        let poller = ScanPoller::new(
            components.scan_findings,
            &config.registry_id,
            config.backoff_policy(),
        );
        let renderer = ReportRenderer::new(&config.report_root, &config.data_namespace);

        Ok(Self::new(lister, poller, renderer)
            .with_max_concurrent_polls(config.max_concurrent_polls)
            .with_run_deadline(config.run_deadline()))
    }

    pub fn with_max_concurrent_polls(mut self, max_concurrent_polls: usize) -> Self {
        self.max_concurrent_polls = max_concurrent_polls.max(1);
        self
    }

    pub fn with_run_deadline(mut self, run_deadline: Option<Duration>) -> Self {
        self.run_deadline = run_deadline;
        self
    }

    /// Runs the whole pipeline once.
    ///
    /// Per-image failures never fail the run. When `cancel` fires or the run
    /// deadline passes, pending scans are abandoned and the findings gathered
    /// so far are still rendered.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunSummary, PipelineError> {
        let root = self.renderer.root();
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|source| PipelineError::OutputRoot {
                path: root.to_path_buf(),
                source,
            })?;

        let run_token = cancel.child_token();
        let deadline_timer = self.run_deadline.map(|deadline| {
            let run_token = run_token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                warn!(?deadline, "run deadline reached, abandoning pending scans");
                run_token.cancel();
            })
        });

        let result = self.run_stages(&run_token).await;

        if let Some(timer) = deadline_timer {
            timer.abort();
        }
        result
    }

    async fn run_stages(&self, token: &CancellationToken) -> Result<RunSummary, PipelineError> {
        let listing = self.lister.list(token).await;
        let configured = self.lister.repositories().len();
        if listing.all_unreachable(configured) {
            error!(configured, "no repository could be listed");
            return Err(PipelineError::ListingUnavailable(configured));
        }

        let listed = listing.images.len();
        let outcomes: Vec<PollOutcome> = stream::iter(listing.images.into_iter().enumerate())
            .map(|(position, image)| async move {
                let outcome = self.poller.poll(&image, token).await;
                (position, image, outcome)
            })
            .buffer_unordered(self.max_concurrent_polls)
            .collect()
            .await;

        let aggregated = aggregate(outcomes);
        let rendered = self.renderer.render_all(&aggregated.findings).await;

        let summary = RunSummary {
            listed,
            completed: aggregated.completed(),
            skipped: aggregated.skipped.len(),
            rendered: rendered.rendered,
            render_failures: rendered.failed,
            failed_repositories: listing.failed_repositories.len(),
            interrupted: token.is_cancelled(),
        };

        if !aggregated.skipped.is_empty() {
            warn!(
                images = %aggregated.skipped.iter().map(|(image, _)| image).join(", "),
                "images left out of the report"
            );
        }
        info!(
            attempted = aggregated.attempted,
            completed = summary.completed,
            skipped = summary.skipped,
            rendered = summary.rendered,
            render_failures = summary.render_failures,
            interrupted = summary.interrupted,
            "report run finished"
        );

        Ok(summary)
    }
}
