//! Shared identifiers and query classification enums.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque, stable query identifier assigned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(pub String);

impl QueryId {
    /// Wraps any string-like value as an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrowed view of the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueryId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for QueryId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Workflow status of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    /// Received, untouched.
    New,
    /// Acknowledged but not yet worked on.
    Open,
    /// Someone is working on it.
    InProgress,
    /// Waiting on the customer or a third party.
    Pending,
    /// Answered at least once.
    Answered,
    /// Resolved by an operator.
    Resolved,
    /// Closed without further action.
    Closed,
}

impl QueryStatus {
    /// Wire name used by the backend.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Pending => "pending",
            Self::Answered => "answered",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Triage priority bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Low.
    Low,
    /// Medium.
    Medium,
    /// High.
    High,
    /// Urgent.
    Urgent,
}

impl Priority {
    /// Wire name used by the backend.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

/// Channel through which the query arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// E-mail.
    Email,
    /// Website chat widget.
    Webchat,
    /// Twitter / X.
    Twitter,
    /// Phone call transcript.
    Phone,
    /// Any other source.
    #[serde(other)]
    Other,
}

/// Kind of customer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Something is broken or disappointing.
    Complaint,
    /// How-to question.
    Question,
    /// Feature or account request.
    Request,
    /// Reported defect.
    BugReport,
    /// General feedback.
    Feedback,
    /// Any other category.
    #[serde(other)]
    Other,
}
