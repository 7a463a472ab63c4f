use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::domain::scanreport::{
    scan_query::ScanQuery, scan_status::ScanStatus, vulnerability_record::VulnerabilityRecord,
};

/// One page of a scan-findings response.
///
/// `raw` is the full response body; the other fields are the parts the
/// pipeline branches on. Basic and enhanced findings are kept apart so later
/// pages can be appended to the array they were read from.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanFindingsPage {
    pub status: ScanStatus,
    pub status_description: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub findings: Vec<VulnerabilityRecord>,
    pub enhanced_findings: Vec<VulnerabilityRecord>,
    pub next_token: Option<String>,
    pub raw: Value,
}

#[async_trait::async_trait]
pub trait ScanFindingsSource: Send + Sync {
    async fn describe_scan_findings(
        &self,
        query: &ScanQuery,
        next_token: Option<String>,
    ) -> Result<ScanFindingsPage, ScanSourceError>;
}

#[derive(Error, Debug)]
pub enum ScanSourceError {
    #[error("no scan exists for {0}")]
    NotFound(String),

    #[error("error reaching the scanner: {0}")]
    Transport(Box<dyn std::error::Error + Send + Sync>),

    #[error("error decoding the scanner response: {0}")]
    Decoding(Box<dyn std::error::Error + Send + Sync>),
}
