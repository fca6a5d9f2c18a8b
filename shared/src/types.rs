//! Core shared types and identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{SharedError, SharedResult};

/// Identifier of one exclusive test resource ("stream")
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> SharedResult<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(SharedError::InvalidIdentifier {
                kind: "resource",
                input: id,
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ResourceId {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ResourceId {
    type Error = SharedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

/// Worker number, assigned by the coordinator in launch order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(u32);

impl WorkerId {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gw{}", self.0)
    }
}

/// Key correlating pushed notifications with the entity a test created (e.g. a recording id)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CorrelationKey(String);

impl CorrelationKey {
    pub fn new(key: impl Into<String>) -> SharedResult<Self> {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(SharedError::InvalidIdentifier {
                kind: "correlation key",
                input: key,
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CorrelationKey {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CorrelationKey {
    type Error = SharedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CorrelationKey> for String {
    fn from(key: CorrelationKey) -> Self {
        key.0
    }
}

/// Terminal outcome of a test case
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TestStatus {
    Pass,
    Fail,
    Skip,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Pass => "Pass",
            TestStatus::Fail => "Fail",
            TestStatus::Skip => "Skip",
        }
    }

    /// Default report message for the outcome
    pub fn default_message(&self) -> &'static str {
        match self {
            TestStatus::Pass => "TestCase Passed",
            TestStatus::Fail => "",
            TestStatus::Skip => "TestCase Skipped",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestStatus {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pass" | "passed" => Ok(TestStatus::Pass),
            "fail" | "failed" => Ok(TestStatus::Fail),
            "skip" | "skipped" => Ok(TestStatus::Skip),
            _ => Err(SharedError::InvalidIdentifier {
                kind: "test status",
                input: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_trims_and_rejects_blank() {
        let id = ResourceId::new("  s1 ").unwrap();
        assert_eq!(id.as_str(), "s1");
        assert!(ResourceId::new("   ").is_err());
        assert!("".parse::<ResourceId>().is_err());
    }

    #[test]
    fn test_resource_id_serde_is_transparent() {
        let id: ResourceId = serde_json::from_str("\"stream-7\"").unwrap();
        assert_eq!(id.to_string(), "stream-7");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"stream-7\"");
        assert!(serde_json::from_str::<ResourceId>("\"\"").is_err());
    }

    #[test]
    fn test_correlation_key_trims_and_rejects_blank() {
        let key = CorrelationKey::new(" rec-42\n").unwrap();
        assert_eq!(key.as_str(), "rec-42");
        assert!(CorrelationKey::new("\t").is_err());
    }

    #[test]
    fn test_worker_id_display() {
        assert_eq!(WorkerId::new(0).to_string(), "gw0");
        assert_eq!(WorkerId::new(12).to_string(), "gw12");
    }

    #[test]
    fn test_status_parsing_and_messages() {
        assert_eq!("passed".parse::<TestStatus>().unwrap(), TestStatus::Pass);
        assert_eq!("Skip".parse::<TestStatus>().unwrap(), TestStatus::Skip);
        assert!("pending".parse::<TestStatus>().is_err());
        assert_eq!(TestStatus::Pass.default_message(), "TestCase Passed");
        assert_eq!(TestStatus::Skip.default_message(), "TestCase Skipped");
    }
}
