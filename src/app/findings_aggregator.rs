use crate::domain::scanreport::{image_ref::ImageRef, scan_finding::ScanFinding};

use super::PollError;

/// Outcome of polling one image, tagged with the image's position in the
/// listing so that results can arrive in any order.
pub type PollOutcome = (usize, ImageRef, Result<ScanFinding, PollError>);

#[derive(Debug, Default, PartialEq)]
pub struct AggregatedFindings {
    pub attempted: usize,
    pub findings: Vec<ScanFinding>,
    pub skipped: Vec<(ImageRef, PollError)>,
}

impl AggregatedFindings {
    pub fn completed(&self) -> usize {
        self.findings.len()
    }
}

/// Joins per-image outcomes into findings ordered by listing position.
///
/// Errors were already logged by the poller and are only kept for the run
/// summary.
pub fn aggregate(outcomes: impl IntoIterator<Item = PollOutcome>) -> AggregatedFindings {
    let mut outcomes: Vec<PollOutcome> = outcomes.into_iter().collect();
    outcomes.sort_by_key(|(position, _, _)| *position);

    let mut aggregated = AggregatedFindings {
        attempted: outcomes.len(),
        ..Default::default()
    };

    for (_, image, outcome) in outcomes {
        match outcome {
            Ok(finding) => aggregated.findings.push(finding),
            Err(error) => aggregated.skipped.push((image, error)),
        }
    }

    aggregated
}
