use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{image_ref::ImageRef, vulnerability_record::VulnerabilityRecord};

/// Terminal result of a completed scan for one image.
///
/// `raw_payload` is the scanner's response body, preserved for audit. When the
/// findings were paginated it holds the first complete page with every later
/// page's findings appended.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanFinding {
    repository: String,
    tag: String,
    digest: String,
    scan_completed_at: DateTime<Utc>,
    vulnerabilities: Vec<VulnerabilityRecord>,
    raw_payload: Value,
}

impl ScanFinding {
    pub fn new(
        image: &ImageRef,
        scan_completed_at: DateTime<Utc>,
        vulnerabilities: Vec<VulnerabilityRecord>,
        raw_payload: Value,
    ) -> Self {
        Self {
            repository: image.repository().to_string(),
            tag: image.tag().to_string(),
            digest: image.digest().to_string(),
            scan_completed_at,
            vulnerabilities,
            raw_payload,
        }
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn scan_completed_at(&self) -> DateTime<Utc> {
        self.scan_completed_at
    }

    pub fn vulnerabilities(&self) -> &[VulnerabilityRecord] {
        &self.vulnerabilities
    }

    pub fn raw_payload(&self) -> &Value {
        &self.raw_payload
    }
}
