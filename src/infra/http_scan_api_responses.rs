use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::{
    app::{ImagePage, ImageSummary, ScanFindingsPage},
    domain::scanreport::{scan_status::ScanStatus, vulnerability_record::VulnerabilityRecord},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ListImagesResponse {
    #[serde(default)]
    pub image_ids: Vec<ImageIdentifier>,
    pub next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ImageIdentifier {
    pub image_tag: Option<String>,
    pub image_digest: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DescribeScanFindingsResponse {
    pub image_scan_status: ImageScanStatus,
    pub image_scan_findings: Option<ImageScanFindings>,
    pub next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ImageScanStatus {
    pub status: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ImageScanFindings {
    #[serde(default, deserialize_with = "timestamp")]
    pub image_scan_completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub findings: Vec<Value>,
    #[serde(default)]
    pub enhanced_findings: Vec<Value>,
}

impl From<ListImagesResponse> for ImagePage {
    fn from(response: ListImagesResponse) -> Self {
        ImagePage {
            images: response
                .image_ids
                .into_iter()
                .map(|id| ImageSummary {
                    tag: id.image_tag,
                    digest: id.image_digest,
                })
                .collect(),
            next_token: response.next_token,
        }
    }
}

impl DescribeScanFindingsResponse {
    pub(super) fn into_page(self, raw: Value) -> ScanFindingsPage {
        let records = |values: Vec<Value>| -> Vec<VulnerabilityRecord> {
            values.into_iter().map(VulnerabilityRecord::new).collect()
        };
        let (completed_at, findings, enhanced_findings) = match self.image_scan_findings {
            Some(scan) => (
                scan.image_scan_completed_at,
                records(scan.findings),
                records(scan.enhanced_findings),
            ),
            None => (None, Vec::new(), Vec::new()),
        };

        ScanFindingsPage {
            status: ScanStatus::from(self.image_scan_status.status.as_str()),
            status_description: self.image_scan_status.description,
            completed_at,
            findings,
            enhanced_findings,
            next_token: self.next_token,
            raw,
        }
    }
}

/// Accepts RFC 3339 strings as well as epoch seconds, which is how some
/// gateways forward registry timestamps.
fn timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Timestamp {
        Rfc3339(DateTime<Utc>),
        EpochSeconds(f64),
    }

    Ok(match Option::<Timestamp>::deserialize(deserializer)? {
        Some(Timestamp::Rfc3339(at)) => Some(at),
        Some(Timestamp::EpochSeconds(secs)) => {
            let millis = (secs * 1000.0).round() as i64;
            Utc.timestamp_millis_opt(millis).single()
        }
        None => None,
    })
}
