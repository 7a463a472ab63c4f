#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{TimeZone, Utc};
use scan_report::{
    app::{
        ImagePage, ImageRegistry, ImageSummary, RegistryError, ScanFindingsPage,
        ScanFindingsSource, ScanSourceError,
        component_factory::{ComponentFactory, ComponentFactoryError, Components, Config},
    },
    domain::scanreport::{
        scan_query::ScanQuery, scan_status::ScanStatus, vulnerability_record::VulnerabilityRecord,
    },
};
use serde_json::{Value, json};
use tokio::sync::Mutex;

// --- Registry fake ---
#[derive(Default)]
pub struct InMemoryRegistry {
    repositories: HashMap<String, Vec<ImageSummary>>,
    unreachable: HashSet<String>,
    calls: AtomicUsize,
}

impl InMemoryRegistry {
    pub fn with_repository(mut self, repository: &str, images: &[(&str, &str)]) -> Self {
        self.repositories.insert(
            repository.to_string(),
            images
                .iter()
                .map(|(tag, digest)| ImageSummary {
                    tag: Some(tag.to_string()),
                    digest: digest.to_string(),
                })
                .collect(),
        );
        self
    }

    pub fn with_unreachable_repository(mut self, repository: &str) -> Self {
        self.unreachable.insert(repository.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ImageRegistry for InMemoryRegistry {
    async fn list_images(
        &self,
        _registry_id: &str,
        repository: &str,
        page_size: usize,
        next_token: Option<String>,
    ) -> Result<ImagePage, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.unreachable.contains(repository) {
            return Err(RegistryError::RegistryClientError(
                "connection refused".into(),
            ));
        }
        let Some(images) = self.repositories.get(repository) else {
            return Err(RegistryError::RepositoryNotFound(repository.to_string()));
        };

        let start = next_token.and_then(|t| t.parse().ok()).unwrap_or(0);
        let end = (start + page_size).min(images.len());

        Ok(ImagePage {
            images: images[start..end].to_vec(),
            next_token: (end < images.len()).then(|| end.to_string()),
        })
    }
}

// --- Scanner fake ---
#[derive(Clone, Debug)]
pub enum ScanReply {
    Pending,
    Complete(Vec<Value>),
    Missing,
    Unreachable,
}

/// Replays a script of replies per digest; the last reply repeats forever.
#[derive(Default)]
pub struct ScriptedScanner {
    scripts: Mutex<HashMap<String, VecDeque<ScanReply>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedScanner {
    pub async fn script(&self, digest: &str, replies: Vec<ScanReply>) {
        self.scripts
            .lock()
            .await
            .insert(digest.to_string(), replies.into());
    }

    pub async fn calls_for(&self, digest: &str) -> usize {
        self.calls.lock().await.get(digest).copied().unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl ScanFindingsSource for ScriptedScanner {
    async fn describe_scan_findings(
        &self,
        query: &ScanQuery,
        _next_token: Option<String>,
    ) -> Result<ScanFindingsPage, ScanSourceError> {
        *self
            .calls
            .lock()
            .await
            .entry(query.digest().to_string())
            .or_default() += 1;

        let reply = {
            let mut scripts = self.scripts.lock().await;
            let script = scripts.entry(query.digest().to_string()).or_default();
            match script.len() {
                0 => ScanReply::Missing,
                1 => script[0].clone(),
                _ => script.pop_front().unwrap_or(ScanReply::Missing),
            }
        };

        match reply {
            ScanReply::Pending => Ok(page(ScanStatus::Pending, Vec::new())),
            ScanReply::Complete(findings) => Ok(page(ScanStatus::Complete, findings)),
            ScanReply::Missing => Err(ScanSourceError::NotFound(query.digest().to_string())),
            ScanReply::Unreachable => Err(ScanSourceError::Transport("connection reset".into())),
        }
    }
}

fn page(status: ScanStatus, findings: Vec<Value>) -> ScanFindingsPage {
    ScanFindingsPage {
        raw: json!({
            "imageScanStatus": {"status": status.to_string()},
            "imageScanFindings": {"findings": findings.clone()},
        }),
        status,
        status_description: None,
        completed_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
        findings: findings.into_iter().map(VulnerabilityRecord::new).collect(),
        enhanced_findings: Vec::new(),
        next_token: None,
    }
}

pub fn a_vulnerability(name: &str, severity: &str) -> Value {
    json!({"name": name, "severity": severity})
}

// --- Setup ---
#[derive(Clone)]
pub struct FakeComponentFactory {
    pub registry: Arc<InMemoryRegistry>,
    pub scanner: Arc<ScriptedScanner>,
}

impl ComponentFactory for FakeComponentFactory {
    fn create_components(&self, _config: &Config) -> Result<Components, ComponentFactoryError> {
        Ok(Components {
            registry: self.registry.clone(),
            scan_findings: self.scanner.clone(),
        })
    }
}

pub fn config_for(report_root: &std::path::Path, repositories: &[&str]) -> Config {
    Config {
        registry_id: "123456789012".to_string(),
        repositories: repositories.iter().map(|r| r.to_string()).collect(),
        allowed_tag_patterns: vec!["v".to_string()],
        report_root: report_root.to_path_buf(),
        ..Default::default()
    }
}
