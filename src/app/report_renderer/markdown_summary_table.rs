use std::fmt::{Display, Formatter};

use markdown_table::{Heading, HeadingAlignment, MarkdownTable};

use crate::domain::scanreport::{scan_finding::ScanFinding, severity::Severity};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MarkdownSummaryTable {
    pub total_found: u32,
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
    pub informational: u32,
    pub undefined: u32,
}

impl From<&ScanFinding> for MarkdownSummaryTable {
    fn from(value: &ScanFinding) -> Self {
        let mut summary = MarkdownSummaryTable::default();

        for vuln in value.vulnerabilities() {
            summary.total_found += 1;
            match vuln.severity() {
                Severity::Critical => summary.critical += 1,
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
                Severity::Informational => summary.informational += 1,
                Severity::Undefined => summary.undefined += 1,
            }
        }

        summary
    }
}

impl Display for MarkdownSummaryTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let headers = vec![
            Heading::new(
                "TOTAL VULNS FOUND".to_string(),
                Some(HeadingAlignment::Center),
            ),
            Heading::new("CRITICAL".to_string(), Some(HeadingAlignment::Center)),
            Heading::new("HIGH".to_string(), Some(HeadingAlignment::Center)),
            Heading::new("MEDIUM".to_string(), Some(HeadingAlignment::Center)),
            Heading::new("LOW".to_string(), Some(HeadingAlignment::Center)),
            Heading::new("INFORMATIONAL".to_string(), Some(HeadingAlignment::Center)),
            Heading::new("UNDEFINED".to_string(), Some(HeadingAlignment::Center)),
        ];

        let data = vec![vec![
            self.total_found.to_string(),
            self.critical.to_string(),
            self.high.to_string(),
            self.medium.to_string(),
            self.low.to_string(),
            self.informational.to_string(),
            self.undefined.to_string(),
        ]];

        let mut table = MarkdownTable::new(data);
        table.with_headings(headers);

        f.write_str(&table.as_markdown().unwrap_or_default())
    }
}
