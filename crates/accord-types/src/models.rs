use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a client request.
///
/// The main chain is new → in_progress → document_sent → document_viewed →
/// document_signed → resolved. `rejected` is a terminal side branch reachable
/// from any non-terminal state. Transition legality is decided here and only
/// here — see [`RequestStatus::allowed_sources`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    New,
    InProgress,
    DocumentSent,
    DocumentViewed,
    DocumentSigned,
    Resolved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InProgress => "in_progress",
            Self::DocumentSent => "document_sent",
            Self::DocumentViewed => "document_viewed",
            Self::DocumentSigned => "document_signed",
            Self::Resolved => "resolved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "in_progress" => Some(Self::InProgress),
            "document_sent" => Some(Self::DocumentSent),
            "document_viewed" => Some(Self::DocumentViewed),
            "document_signed" => Some(Self::DocumentSigned),
            "resolved" => Some(Self::Resolved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// States a transition into `target` may legally start from.
    pub fn allowed_sources(target: RequestStatus) -> &'static [RequestStatus] {
        use RequestStatus::*;
        match target {
            New => &[],
            InProgress => &[New],
            DocumentSent => &[New, InProgress],
            DocumentViewed => &[DocumentSent],
            // Signing straight from document_sent is tolerated for clients
            // that never emit an explicit "viewed" signal.
            DocumentSigned => &[DocumentSent, DocumentViewed],
            Resolved => &[DocumentSigned],
            Rejected => &[New, InProgress, DocumentSent, DocumentViewed],
        }
    }

    /// Position along the main chain. `rejected` is off-chain.
    pub fn chain_rank(self) -> Option<u8> {
        match self {
            Self::New => Some(0),
            Self::InProgress => Some(1),
            Self::DocumentSent => Some(2),
            Self::DocumentViewed => Some(3),
            Self::DocumentSigned => Some(4),
            Self::Resolved => Some(5),
            Self::Rejected => None,
        }
    }

    /// True when this state is at or past `target` on the main chain.
    /// Used for idempotent no-op decisions on repeated milestone signals.
    pub fn has_reached(self, target: RequestStatus) -> bool {
        match (self.chain_rank(), target.chain_rank()) {
            (Some(cur), Some(tgt)) => cur >= tgt,
            _ => self == target,
        }
    }

    /// No further transitions leave these states.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Rejected)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who wrote a chat message. `system` is reserved for lifecycle notices
/// (e.g. the document-sent notification) so they are distinguishable from
/// human chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSender {
    Client,
    Mediator,
    Organization,
    System,
}

impl MessageSender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Mediator => "mediator",
            Self::Organization => "organization",
            Self::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "client" => Some(Self::Client),
            "mediator" => Some(Self::Mediator),
            "organization" => Some(Self::Organization),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// A client's mediation request.
///
/// Milestone timestamps are write-once: the store only ever fills them when
/// they are still NULL. `status` moves forward along the transition graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRequest {
    pub id: Uuid,
    pub phone: String,
    pub iin: Option<String>,
    pub organization: String,
    pub reason_type: String,
    pub reason_text: String,
    pub status: RequestStatus,
    pub document_type: Option<String>,
    pub reject_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub document_sent_at: Option<DateTime<Utc>>,
    pub document_viewed_at: Option<DateTime<Utc>>,
    pub document_signed_at: Option<DateTime<Utc>>,
}

/// Fields supplied by the client when creating a request.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRequest {
    pub phone: String,
    pub iin: Option<String>,
    pub organization: String,
    pub reason_type: String,
    pub reason_text: String,
}

/// One entry in a request's append-only chat log. Immutable once appended;
/// ordering is (created_at, seq).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub request_id: Uuid,
    pub sender: MessageSender,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub seq: i64,
}
