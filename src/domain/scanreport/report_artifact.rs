use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Files written for one finding in a single render.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportArtifact {
    data_file_path: PathBuf,
    index_page_path: PathBuf,
    detail_page_path: PathBuf,
    rendered_at: DateTime<Utc>,
    index_created: bool,
}

impl ReportArtifact {
    pub fn new(
        data_file_path: PathBuf,
        index_page_path: PathBuf,
        detail_page_path: PathBuf,
        rendered_at: DateTime<Utc>,
        index_created: bool,
    ) -> Self {
        Self {
            data_file_path,
            index_page_path,
            detail_page_path,
            rendered_at,
            index_created,
        }
    }

    pub fn data_file_path(&self) -> &Path {
        &self.data_file_path
    }

    pub fn index_page_path(&self) -> &Path {
        &self.index_page_path
    }

    pub fn detail_page_path(&self) -> &Path {
        &self.detail_page_path
    }

    pub fn rendered_at(&self) -> DateTime<Utc> {
        self.rendered_at
    }

    /// Whether this render created the repository's index page.
    pub fn index_created(&self) -> bool {
        self.index_created
    }
}
