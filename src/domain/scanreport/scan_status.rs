use std::fmt::{Display, Formatter};

/// Lifecycle state reported by the scanner for one image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanStatus {
    Complete,
    Pending,
    InProgress,
    Failed,
    Other(String),
}

impl ScanStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, ScanStatus::Complete)
    }
}

impl From<&str> for ScanStatus {
    fn from(value: &str) -> Self {
        match value.to_ascii_lowercase().replace('-', "_").as_str() {
            "complete" | "completed" => ScanStatus::Complete,
            "pending" => ScanStatus::Pending,
            "in_progress" => ScanStatus::InProgress,
            "failed" => ScanStatus::Failed,
            _ => ScanStatus::Other(value.to_string()),
        }
    }
}

impl Display for ScanStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanStatus::Complete => f.write_str("complete"),
            ScanStatus::Pending => f.write_str("pending"),
            ScanStatus::InProgress => f.write_str("in-progress"),
            ScanStatus::Failed => f.write_str("failed"),
            ScanStatus::Other(other) => f.write_str(other),
        }
    }
}
