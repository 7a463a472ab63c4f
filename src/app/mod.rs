pub mod component_factory;
pub mod findings_aggregator;
mod image_lister;
mod image_registry;
mod pipeline;
mod report_renderer;
pub mod retry;
mod scan_findings_source;
mod scan_poller;

pub use image_lister::{DEFAULT_PAGE_SIZE, ImageLister, Listing};
pub use image_registry::{ImagePage, ImageRegistry, ImageSummary, RegistryError};
pub use pipeline::{PipelineError, ReportPipeline, RunSummary};
pub use report_renderer::{
    MarkdownSummaryTable, RenderError, RenderSummary, ReportPaths, ReportRenderer,
};
pub use scan_findings_source::{ScanFindingsPage, ScanFindingsSource, ScanSourceError};
pub use scan_poller::{PollError, ScanPoller};
