mod markdown_summary_table;

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
};
use tracing::{debug, error, info, warn};

use crate::domain::scanreport::{report_artifact::ReportArtifact, scan_finding::ScanFinding};

pub use markdown_summary_table::MarkdownSummaryTable;

const DATA_DIR: &str = "data";
const REPORTS_DIR: &str = "content/reports";
const INDEX_PAGE: &str = "_index.md";
const FRONT_MATTER_DELIMITER: &str = "+++";

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("refusing to write outside the report tree: {0:?}")]
    UnsafePath(String),

    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error serializing the scan payload: {0}")]
    PayloadSerialization(#[from] serde_json::Error),

    #[error("error serializing the page front matter: {0}")]
    FrontMatterSerialization(#[from] toml::ser::Error),
}

/// Locations of the three files written for one image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportPaths {
    pub data_file: PathBuf,
    pub index_page: PathBuf,
    pub detail_page: PathBuf,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSummary {
    pub rendered: usize,
    pub failed: usize,
}

#[derive(Serialize)]
struct IndexFrontMatter<'a> {
    title: &'a str,
    date: DateTime<Utc>,
}

#[derive(Serialize)]
struct DetailFrontMatter<'a> {
    title: String,
    date: DateTime<Utc>,
    repository: &'a str,
    tag: &'a str,
    digest: &'a str,
    data_file: String,
    vulnerabilities: usize,
    rendered_at: DateTime<Utc>,
}

/// Writes findings into a static report tree rooted at `root`:
///
/// * `data/<namespace>/<repository>-<tag>.json`
/// * `content/reports/<repository>/_index.md`
/// * `content/reports/<repository>/<tag>.md`
#[derive(Clone, Debug)]
pub struct ReportRenderer {
    root: PathBuf,
    namespace: String,
}

impl ReportRenderer {
    pub fn new(root: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            namespace: namespace.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn paths_for(&self, repository: &str, tag: &str) -> Result<ReportPaths, RenderError> {
        let namespace = relative_path(&self.namespace, false)?;
        let repository_dir = relative_path(repository, true)?;
        relative_path(tag, false)?;
        let detail_page_name = format!("{tag}.md");
        if detail_page_name.eq_ignore_ascii_case(INDEX_PAGE) {
            return Err(RenderError::UnsafePath(tag.to_string()));
        }

        let data_file_name = format!("{repository}-{tag}.json");
        let reports_dir = self.root.join(REPORTS_DIR).join(&repository_dir);

        Ok(ReportPaths {
            data_file: self.root.join(DATA_DIR).join(namespace).join(data_file_name),
            index_page: reports_dir.join(INDEX_PAGE),
            detail_page: reports_dir.join(detail_page_name),
        })
    }

    pub async fn render(&self, finding: &ScanFinding) -> Result<ReportArtifact, RenderError> {
        self.render_at(finding, Utc::now()).await
    }

    /// Renders one finding. The data file and the detail page are overwritten;
    /// the index page is only written if it does not exist yet.
    pub async fn render_at(
        &self,
        finding: &ScanFinding,
        rendered_at: DateTime<Utc>,
    ) -> Result<ReportArtifact, RenderError> {
        let paths = self.paths_for(finding.repository(), finding.tag())?;

        let payload = serde_json::to_vec_pretty(finding.raw_payload())?;
        write_file(&paths.data_file, &payload).await?;

        let index_created = create_index_if_absent(
            &paths.index_page,
            &self.index_page(finding.repository(), rendered_at)?,
        )
        .await?;
        if index_created {
            info!(repository = finding.repository(), "created repository index page");
        }

        let detail_page = self.detail_page(finding, &paths, rendered_at)?;
        write_file(&paths.detail_page, detail_page.as_bytes()).await?;

        debug!(
            repository = finding.repository(),
            tag = finding.tag(),
            "rendered report pages"
        );

        Ok(ReportArtifact::new(
            paths.data_file,
            paths.index_page,
            paths.detail_page,
            rendered_at,
            index_created,
        ))
    }

    /// Renders every finding, logging and counting the ones that fail.
    pub async fn render_all(&self, findings: &[ScanFinding]) -> RenderSummary {
        let mut summary = RenderSummary::default();

        for finding in findings {
            match self.render(finding).await {
                Ok(_) => summary.rendered += 1,
                Err(error) => {
                    error!(
                        repository = finding.repository(),
                        tag = finding.tag(),
                        %error,
                        "unable to render report, skipping it"
                    );
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    fn index_page(&self, repository: &str, created_at: DateTime<Utc>) -> Result<String, RenderError> {
        let front_matter = toml::to_string(&IndexFrontMatter {
            title: repository,
            date: created_at,
        })?;

        Ok(format!(
            "{FRONT_MATTER_DELIMITER}\n{front_matter}{FRONT_MATTER_DELIMITER}\n"
        ))
    }

    fn detail_page(
        &self,
        finding: &ScanFinding,
        paths: &ReportPaths,
        rendered_at: DateTime<Utc>,
    ) -> Result<String, RenderError> {
        let data_file = paths
            .data_file
            .strip_prefix(&self.root)
            .unwrap_or(&paths.data_file)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        let front_matter = toml::to_string(&DetailFrontMatter {
            title: format!("{}:{}", finding.repository(), finding.tag()),
            date: finding.scan_completed_at(),
            repository: finding.repository(),
            tag: finding.tag(),
            digest: finding.digest(),
            data_file,
            vulnerabilities: finding.vulnerabilities().len(),
            rendered_at,
        })?;

        Ok(format!(
            "{FRONT_MATTER_DELIMITER}\n{front_matter}{FRONT_MATTER_DELIMITER}\n\n## Summary\n\n{}\n",
            MarkdownSummaryTable::from(finding)
        ))
    }
}

/// Turns a `/`-separated name into a relative path, rejecting anything that
/// could leave the directory it is joined onto.
fn relative_path(value: &str, allow_nesting: bool) -> Result<PathBuf, RenderError> {
    let unsafe_path = || RenderError::UnsafePath(value.to_string());

    if value.is_empty() || value.contains('\\') || (!allow_nesting && value.contains('/')) {
        return Err(unsafe_path());
    }

    let mut path = PathBuf::new();
    for segment in value.split('/') {
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(normal)), None) => path.push(normal),
            _ => return Err(unsafe_path()),
        }
    }

    Ok(path)
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<(), RenderError> {
    ensure_parent(path).await?;
    tokio::fs::write(path, contents)
        .await
        .map_err(|source| RenderError::Io {
            path: path.to_path_buf(),
            source,
        })
}

async fn create_index_if_absent(path: &Path, contents: &str) -> Result<bool, RenderError> {
    ensure_parent(path).await?;
    let io_error = |source: std::io::Error| RenderError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
    {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(err) => return Err(io_error(err)),
    };

    let written = write_all_and_flush(&mut file, contents.as_bytes()).await;
    drop(file);
    discard_on_failure(path, written).await.map_err(io_error)?;
    Ok(true)
}

async fn write_all_and_flush(file: &mut File, contents: &[u8]) -> std::io::Result<()> {
    file.write_all(contents).await?;
    file.flush().await
}

/// Removes a partially written file so that the next run creates it again.
async fn discard_on_failure(path: &Path, written: std::io::Result<()>) -> std::io::Result<()> {
    let Err(err) = written else {
        return Ok(());
    };

    if let Err(remove_err) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %remove_err, "unable to remove partially written file");
    }
    Err(err)
}

async fn ensure_parent(path: &Path) -> Result<(), RenderError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };

    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|source| RenderError::Io {
            path: parent.to_path_buf(),
            source,
        })
}
