//! Query domain record, history, patch, and backend-owned read models.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Channel, Priority, QueryId, QueryStatus, QueryType};

/// One audit-trail entry. History is append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the action happened.
    pub timestamp: DateTime<Utc>,
    /// Human-readable action, e.g. `Assigned to Jamie Lee`.
    pub action: String,
    /// Actor name. Older backend-written entries carry none.
    #[serde(default)]
    pub user: String,
}

impl HistoryEntry {
    /// Builds an entry stamped at `timestamp`.
    pub fn new(action: impl Into<String>, user: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            action: action.into(),
            user: user.into(),
        }
    }
}

/// Normalized sender identity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Sender {
    /// Display name.
    #[serde(rename = "sender_name")]
    pub name: Option<String>,
    /// E-mail address.
    #[serde(rename = "sender_email")]
    pub email: Option<String>,
}

impl Sender {
    /// Parses a `Name <address>` header value, a bare address, or a bare name.
    pub fn from_header(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self::default();
        }

        if let (Some(open), true) = (raw.rfind('<'), raw.ends_with('>')) {
            let name = raw[..open].trim().trim_matches('"').trim();
            let email = raw[open + 1..raw.len() - 1].trim();
            return Self {
                name: non_empty(name),
                email: non_empty(email),
            };
        }

        if raw.contains('@') && !raw.contains(char::is_whitespace) {
            Self {
                name: None,
                email: Some(raw.to_string()),
            }
        } else {
            Self {
                name: Some(raw.to_string()),
                email: None,
            }
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// Fully materialized query row, as returned by the backend.
///
/// Deserialization accepts the flat `sender_name`/`sender_email` columns, a
/// nested `sender` object, or a `sender` header string, plus camelCase
/// timestamp aliases. Serialization always emits the flat snake_case shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawQueryRecord")]
pub struct QueryRecord {
    /// Stable identity.
    pub id: QueryId,
    /// Subject line.
    pub subject: String,
    /// First customer message.
    pub content: String,
    /// Arrival channel.
    pub channel: Channel,
    /// Request category.
    #[serde(rename = "type")]
    pub query_type: QueryType,
    /// Triage priority.
    pub priority: Priority,
    /// Workflow status.
    pub status: QueryStatus,
    /// Who sent it.
    #[serde(flatten)]
    pub sender: Sender,
    /// Short labels in insertion order.
    pub tags: Vec<String>,
    /// Current assignee.
    pub assigned_to: Option<String>,
    /// Append-only audit trail.
    pub history: Vec<HistoryEntry>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last write time.
    pub updated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSender {
    Nested {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        email: Option<String>,
    },
    Header(String),
}

#[derive(Deserialize)]
struct RawQueryRecord {
    id: QueryId,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    content: Option<String>,
    channel: Channel,
    #[serde(rename = "type")]
    query_type: QueryType,
    priority: Priority,
    status: QueryStatus,
    #[serde(default)]
    sender_name: Option<String>,
    #[serde(default)]
    sender_email: Option<String>,
    #[serde(default)]
    sender: Option<RawSender>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    assigned_to: Option<String>,
    #[serde(default)]
    history: Option<Vec<HistoryEntry>>,
    #[serde(alias = "createdAt")]
    created_at: DateTime<Utc>,
    #[serde(default, alias = "updatedAt")]
    updated_at: Option<DateTime<Utc>>,
}

impl From<RawQueryRecord> for QueryRecord {
    fn from(raw: RawQueryRecord) -> Self {
        let nested = match raw.sender {
            Some(RawSender::Nested { name, email }) => Sender { name, email },
            Some(RawSender::Header(header)) => Sender::from_header(&header),
            None => Sender::default(),
        };
        let sender = Sender {
            name: raw.sender_name.or(nested.name),
            email: raw.sender_email.or(nested.email),
        };

        Self {
            id: raw.id,
            subject: raw.subject.unwrap_or_default(),
            content: raw.content.unwrap_or_default(),
            channel: raw.channel,
            query_type: raw.query_type,
            priority: raw.priority,
            status: raw.status,
            sender,
            tags: raw.tags.unwrap_or_default(),
            assigned_to: raw.assigned_to,
            history: raw.history.unwrap_or_default(),
            created_at: raw.created_at,
            updated_at: raw.updated_at.unwrap_or(raw.created_at),
        }
    }
}

/// Sparse patch where each `Some` field overwrites the record value.
///
/// Used both for optimistic local patches and as the remote point-write body.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct QueryPatch {
    /// Optional replacement subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Optional replacement content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Optional replacement channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<Channel>,
    /// Optional replacement category.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub query_type: Option<QueryType>,
    /// Optional replacement priority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Optional replacement status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<QueryStatus>,
    /// Optional replacement tag list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// `Some(None)` clears the assignee.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Option<String>>,
    /// Optional replacement history; always a prefix-extension of the current one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<HistoryEntry>>,
    /// Optional replacement write time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl QueryPatch {
    /// Returns true when no fields are set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Applies this patch in place to `rec`. Identity and creation time are never touched.
    pub fn apply_to(&self, rec: &mut QueryRecord) {
        if let Some(v) = &self.subject {
            rec.subject = v.clone();
        }
        if let Some(v) = &self.content {
            rec.content = v.clone();
        }
        if let Some(v) = self.channel {
            rec.channel = v;
        }
        if let Some(v) = self.query_type {
            rec.query_type = v;
        }
        if let Some(v) = self.priority {
            rec.priority = v;
        }
        if let Some(v) = self.status {
            rec.status = v;
        }
        if let Some(v) = &self.tags {
            rec.tags = v.clone();
        }
        if let Some(v) = &self.assigned_to {
            rec.assigned_to = v.clone();
        }
        if let Some(v) = &self.history {
            rec.history = v.clone();
        }
        if let Some(v) = self.updated_at {
            rec.updated_at = v;
        }
    }
}

/// Projection returned by the read half of a read-modify-write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStatus {
    /// Current remote history.
    pub history: Vec<HistoryEntry>,
    /// Current remote status.
    pub status: QueryStatus,
}

/// Author of a thread message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    /// Audit entry surfaced into the thread.
    System,
    /// The customer.
    User,
    /// An operator.
    Admin,
}

/// One message in a conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMessage {
    /// Who wrote it.
    pub sender_type: SenderType,
    /// Body text.
    pub message: String,
    /// When it was written.
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Ordered thread for one query: system entries, first message, and replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationThread {
    /// The query row at read time.
    pub query: QueryRecord,
    /// Unified messages, ascending by time.
    pub messages: Vec<ThreadMessage>,
}

/// Aggregate produced by the backend and plumbed through untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    /// Total rows.
    #[serde(default)]
    pub total_queries: u64,
    /// Row count per status wire name.
    #[serde(default)]
    pub status_counts: BTreeMap<String, u64>,
    /// Count with status `new`.
    #[serde(default)]
    pub new_queries: u64,
    /// Count with status `in_progress`.
    #[serde(default)]
    pub in_progress_queries: u64,
    /// Count with priority `urgent`.
    #[serde(default)]
    pub urgent_queries: u64,
    /// Any further backend-defined fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
