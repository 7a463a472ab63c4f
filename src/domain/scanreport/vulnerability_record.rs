use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::severity::Severity;

/// One scanner finding, kept exactly as the scanner reported it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VulnerabilityRecord(Value);

impl VulnerabilityRecord {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    /// Best-effort read of the `severity` field; anything unreadable is `Undefined`.
    pub fn severity(&self) -> Severity {
        self.0
            .get("severity")
            .and_then(Value::as_str)
            .map(Severity::from)
            .unwrap_or(Severity::Undefined)
    }
}

impl From<Value> for VulnerabilityRecord {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
