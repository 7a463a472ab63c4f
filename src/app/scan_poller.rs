use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::scanreport::{
    image_ref::ImageRef, scan_finding::ScanFinding, scan_query::ScanQuery,
    vulnerability_record::VulnerabilityRecord,
};

use super::{
    ScanFindingsPage, ScanFindingsSource, ScanSourceError,
    retry::{BackoffPolicy, RetryOutcome, retry_until},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("the scan did not complete within the retry window")]
    NotYetComplete,

    #[error("the scanner could not be reached")]
    RemoteUnavailable,

    #[error("no scan finding exists for the image")]
    NoFindingExists,
}

impl From<&ScanSourceError> for PollError {
    fn from(value: &ScanSourceError) -> Self {
        match value {
            ScanSourceError::NotFound(_) => PollError::NoFindingExists,
            ScanSourceError::Transport(_) | ScanSourceError::Decoding(_) => {
                PollError::RemoteUnavailable
            }
        }
    }
}

#[derive(Clone)]
pub struct ScanPoller {
    source: Arc<dyn ScanFindingsSource>,
    registry_id: String,
    policy: BackoffPolicy,
}

impl ScanPoller {
    pub fn new(
        source: Arc<dyn ScanFindingsSource>,
        registry_id: impl Into<String>,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            source,
            registry_id: registry_id.into(),
            policy,
        }
    }

    /// Waits for the scan of `image` to complete and returns its full finding.
    ///
    /// Failures are logged here; callers only see the typed outcome.
    pub async fn poll(
        &self,
        image: &ImageRef,
        cancel: &CancellationToken,
    ) -> Result<ScanFinding, PollError> {
        let query = ScanQuery::for_image(&self.registry_id, image);

        let outcome = retry_until(
            &self.policy,
            cancel,
            || self.source.describe_scan_findings(&query, None),
            |response| matches!(response, Ok(page) if !page.status.is_complete()),
        )
        .await;

        let attempts = outcome.attempts();
        let first_page = match outcome {
            RetryOutcome::Ready {
                value: Ok(page), ..
            } => page,
            RetryOutcome::Ready {
                value: Err(error), ..
            } => {
                return Err(self.remote_failure(image, &error, attempts));
            }
            RetryOutcome::Exhausted { last, .. } => {
                let (status, reason) = match last {
                    Ok(page) => (
                        page.status.to_string(),
                        page.status_description.unwrap_or_default(),
                    ),
                    Err(_) => Default::default(),
                };
                warn!(
                    %image,
                    attempts,
                    %status,
                    %reason,
                    window = ?self.policy.window(),
                    "scan did not complete in time, skipping image"
                );
                return Err(PollError::NotYetComplete);
            }
            RetryOutcome::Cancelled { .. } => {
                warn!(%image, attempts, "polling cancelled before the scan completed");
                return Err(PollError::NotYetComplete);
            }
        };

        debug!(%image, attempts, "scan complete, collecting findings");
        let finding = self.collect_pages(image, &query, first_page, cancel).await?;

        info!(
            %image,
            attempts,
            vulnerabilities = finding.vulnerabilities().len(),
            "scan finding retrieved"
        );
        Ok(finding)
    }

    async fn collect_pages(
        &self,
        image: &ImageRef,
        query: &ScanQuery,
        first_page: ScanFindingsPage,
        cancel: &CancellationToken,
    ) -> Result<ScanFinding, PollError> {
        let completed_at = first_page.completed_at.unwrap_or_else(|| {
            debug!(%image, "scanner did not report a completion time, using the current time");
            Utc::now()
        });
        let mut raw_payload = first_page.raw;
        let mut vulnerabilities = first_page.findings;
        vulnerabilities.extend(first_page.enhanced_findings);
        let mut next_token = first_page.next_token;

        while let Some(token) = next_token.take().filter(|t| !t.is_empty()) {
            let page = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(%image, "cancelled while collecting finding pages");
                    return Err(PollError::NotYetComplete);
                }
                page = self.source.describe_scan_findings(query, Some(token)) => page,
            };

            let page = page.map_err(|error| self.remote_failure(image, &error, 0))?;
            append_findings(&mut raw_payload, FINDINGS, &page.findings);
            append_findings(&mut raw_payload, ENHANCED_FINDINGS, &page.enhanced_findings);
            vulnerabilities.extend(page.findings);
            vulnerabilities.extend(page.enhanced_findings);
            next_token = page.next_token;
        }

        strip_next_token(&mut raw_payload);

        Ok(ScanFinding::new(
            image,
            completed_at,
            vulnerabilities,
            raw_payload,
        ))
    }

    fn remote_failure(&self, image: &ImageRef, error: &ScanSourceError, attempts: u32) -> PollError {
        let poll_error = PollError::from(error);
        warn!(%image, attempts, %error, "unable to retrieve scan finding, skipping image");
        poll_error
    }
}

const FINDINGS: &str = "findings";
const ENHANCED_FINDINGS: &str = "enhancedFindings";

/// Appends a later page's records to the `key` array of the first page's body.
/// The array is looked up under `imageScanFindings` and, failing that, at the
/// top level. A missing array is created where the first page kept its scan
/// findings.
fn append_findings(raw_payload: &mut Value, key: &str, findings: &[VulnerabilityRecord]) {
    if findings.is_empty() {
        return;
    }
    let records = findings.iter().map(|f| f.as_value().clone());

    let nested = format!("/imageScanFindings/{key}");
    let top_level = format!("/{key}");
    for pointer in [nested.as_str(), top_level.as_str()] {
        if let Some(array) = raw_payload.pointer_mut(pointer).and_then(Value::as_array_mut) {
            array.extend(records);
            return;
        }
    }

    let container = if raw_payload
        .pointer("/imageScanFindings")
        .is_some_and(Value::is_object)
    {
        raw_payload.pointer_mut("/imageScanFindings")
    } else {
        Some(raw_payload)
    };
    if let Some(object) = container.and_then(Value::as_object_mut) {
        object.insert(key.to_string(), Value::Array(records.collect()));
    }
}

fn strip_next_token(raw_payload: &mut Value) {
    if let Some(object) = raw_payload.as_object_mut() {
        object.remove("nextToken");
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use chrono::{TimeZone, Utc};
    use mockall::{Sequence, mock};
    use serde_json::{Value, json};
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;

    use super::{PollError, ScanPoller};
    use crate::{
        app::{ScanFindingsPage, ScanFindingsSource, ScanSourceError, retry::BackoffPolicy},
        domain::scanreport::{
            image_ref::ImageRef, scan_query::ScanQuery, scan_status::ScanStatus,
            vulnerability_record::VulnerabilityRecord,
        },
    };

    mock! {
        pub Source {}
        #[async_trait::async_trait]
        impl ScanFindingsSource for Source {
            async fn describe_scan_findings(
                &self,
                query: &ScanQuery,
                next_token: Option<String>,
            ) -> Result<ScanFindingsPage, ScanSourceError>;
        }
    }

    fn page(status: ScanStatus, findings: Vec<Value>, next_token: Option<&str>) -> ScanFindingsPage {
        let raw = json!({
            "imageScanStatus": {"status": status.to_string()},
            "imageScanFindings": {"findings": findings.clone()},
            "nextToken": next_token,
        });
        ScanFindingsPage {
            status,
            status_description: None,
            completed_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
            findings: findings.into_iter().map(VulnerabilityRecord::new).collect(),
            enhanced_findings: Vec::new(),
            next_token: next_token.map(str::to_string),
            raw,
        }
    }

    fn poller(source: MockSource, interval: u64, window: u64) -> ScanPoller {
        ScanPoller::new(
            Arc::new(source),
            "registry",
            BackoffPolicy::constant(Duration::from_secs(interval), Duration::from_secs(window)),
        )
    }

    fn image() -> ImageRef {
        ImageRef::new("app-a", "v1", "sha1")
    }

    #[tokio::test(start_paused = true)]
    async fn it_retries_until_the_scan_is_complete() {
        let mut source = MockSource::new();
        let mut seq = Sequence::new();
        source
            .expect_describe_scan_findings()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(page(ScanStatus::Pending, vec![], None)));
        source
            .expect_describe_scan_findings()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Ok(page(
                    ScanStatus::Complete,
                    vec![json!({"name": "CVE-1", "severity": "HIGH"})],
                    None,
                ))
            });

        let finding = poller(source, 5, 60)
            .poll(&image(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(finding.repository(), "app-a");
        assert_eq!(finding.tag(), "v1");
        assert_eq!(finding.vulnerabilities().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn it_reports_not_yet_complete_when_the_window_runs_out() {
        let mut source = MockSource::new();
        source
            .expect_describe_scan_findings()
            .times(4)
            .returning(|_, _| Ok(page(ScanStatus::InProgress, vec![], None)));
        let started = Instant::now();

        let result = poller(source, 5, 15)
            .poll(&image(), &CancellationToken::new())
            .await;

        assert_eq!(result, Err(PollError::NotYetComplete));
        assert!(started.elapsed() <= Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn a_missing_scan_is_not_retried() {
        let mut source = MockSource::new();
        source
            .expect_describe_scan_findings()
            .times(1)
            .returning(|query, _| Err(ScanSourceError::NotFound(query.digest().to_string())));

        let result = poller(source, 5, 60)
            .poll(&image(), &CancellationToken::new())
            .await;

        assert_eq!(result, Err(PollError::NoFindingExists));
    }

    #[tokio::test(start_paused = true)]
    async fn a_transport_error_makes_the_scanner_unavailable() {
        let mut source = MockSource::new();
        source
            .expect_describe_scan_findings()
            .times(1)
            .returning(|_, _| Err(ScanSourceError::Transport("connection reset".into())));

        let result = poller(source, 5, 60)
            .poll(&image(), &CancellationToken::new())
            .await;

        assert_eq!(result, Err(PollError::RemoteUnavailable));
    }

    #[tokio::test(start_paused = true)]
    async fn it_collects_every_findings_page() {
        let mut source = MockSource::new();
        let mut seq = Sequence::new();
        source
            .expect_describe_scan_findings()
            .withf(|_, token| token.is_none())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Ok(page(
                    ScanStatus::Complete,
                    vec![json!({"name": "CVE-1"})],
                    Some("t2"),
                ))
            });
        source
            .expect_describe_scan_findings()
            .withf(|_, token| token.as_deref() == Some("t2"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Ok(page(
                    ScanStatus::Complete,
                    vec![json!({"name": "CVE-2"}), json!({"name": "CVE-3"})],
                    None,
                ))
            });

        let finding = poller(source, 5, 60)
            .poll(&image(), &CancellationToken::new())
            .await
            .unwrap();

        let names: Vec<&str> = finding
            .vulnerabilities()
            .iter()
            .filter_map(|v| v.name())
            .collect();
        assert_eq!(names, vec!["CVE-1", "CVE-2", "CVE-3"]);
        assert_eq!(
            finding.raw_payload()["imageScanFindings"]["findings"]
                .as_array()
                .map(Vec::len),
            Some(3)
        );
        assert!(finding.raw_payload().get("nextToken").is_none());
    }

    fn enhanced_page(finding: Value, next_token: Option<&str>) -> ScanFindingsPage {
        ScanFindingsPage {
            raw: json!({
                "imageScanStatus": {"status": "COMPLETE"},
                "imageScanFindings": {"enhancedFindings": [finding.clone()]},
                "nextToken": next_token,
            }),
            findings: Vec::new(),
            enhanced_findings: vec![VulnerabilityRecord::new(finding)],
            next_token: next_token.map(str::to_string),
            ..page(ScanStatus::Complete, vec![], None)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn enhanced_findings_pages_stay_in_their_own_array() {
        let mut source = MockSource::new();
        let mut seq = Sequence::new();
        source
            .expect_describe_scan_findings()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(enhanced_page(json!({"title": "CVE-1"}), Some("t2"))));
        source
            .expect_describe_scan_findings()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(enhanced_page(json!({"title": "CVE-2"}), None)));

        let finding = poller(source, 5, 60)
            .poll(&image(), &CancellationToken::new())
            .await
            .unwrap();

        let raw = finding.raw_payload();
        assert_eq!(finding.vulnerabilities().len(), 2);
        assert_eq!(
            raw["imageScanFindings"]["enhancedFindings"],
            json!([{"title": "CVE-1"}, {"title": "CVE-2"}])
        );
        assert!(raw.get("findings").is_none());
        assert!(raw["imageScanFindings"].get("findings").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn a_failing_follow_up_page_drops_the_finding() {
        let mut source = MockSource::new();
        let mut seq = Sequence::new();
        source
            .expect_describe_scan_findings()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(page(ScanStatus::Complete, vec![], Some("t2"))));
        source
            .expect_describe_scan_findings()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(ScanSourceError::Transport("timeout".into())));

        let result = poller(source, 5, 60)
            .poll(&image(), &CancellationToken::new())
            .await;

        assert_eq!(result, Err(PollError::RemoteUnavailable));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_abandons_the_retries() {
        let mut source = MockSource::new();
        source
            .expect_describe_scan_findings()
            .times(1..=2)
            .returning(|_, _| Ok(page(ScanStatus::Pending, vec![], None)));
        let cancel = CancellationToken::new();
        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(3)).await;
                cancel.cancel();
            })
        };

        let result = poller(source, 5, 60).poll(&image(), &cancel).await;
        canceller.await.unwrap();

        assert_eq!(result, Err(PollError::NotYetComplete));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn a_skipped_image_is_logged_with_its_reason() {
        let mut source = MockSource::new();
        source
            .expect_describe_scan_findings()
            .returning(|_, _| Err(ScanSourceError::Transport("connection reset".into())));

        let _ = poller(source, 5, 60)
            .poll(&image(), &CancellationToken::new())
            .await;

        assert!(logs_contain("unable to retrieve scan finding, skipping image"));
        assert!(logs_contain("connection reset"));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn the_scanner_reason_is_logged_when_the_window_runs_out() {
        let mut source = MockSource::new();
        source.expect_describe_scan_findings().returning(|_, _| {
            Ok(ScanFindingsPage {
                status_description: Some("UnsupportedImageError".to_string()),
                ..page(ScanStatus::Failed, vec![], None)
            })
        });

        let result = poller(source, 5, 10)
            .poll(&image(), &CancellationToken::new())
            .await;

        assert_eq!(result, Err(PollError::NotYetComplete));
        assert!(logs_contain("UnsupportedImageError"));
    }
}
