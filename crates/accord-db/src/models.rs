//! Database row types — these map directly to SQLite rows.
//! Distinct from accord-types API models to keep the DB layer independent;
//! `into_model` does the one-way conversion (and timestamp parsing).

use anyhow::{Result, anyhow};
use accord_types::models::{ChatMessage, ClientRequest, MessageSender, RequestStatus};

use crate::decode_ts;

pub struct VerificationRow {
    pub phone: String,
    pub code: String,
    pub correlation_id: String,
    pub created_at: String,
    pub expires_at: String,
    pub attempts: i64,
    pub verified: bool,
}

impl VerificationRow {
    pub fn expires_at(&self) -> Result<chrono::DateTime<chrono::Utc>> {
        decode_ts(&self.expires_at)
    }

    pub fn created_at(&self) -> Result<chrono::DateTime<chrono::Utc>> {
        decode_ts(&self.created_at)
    }
}

pub struct RequestRow {
    pub id: String,
    pub phone: String,
    pub iin: Option<String>,
    pub organization: String,
    pub reason_type: String,
    pub reason_text: String,
    pub status: String,
    pub document_type: Option<String>,
    pub reject_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub document_sent_at: Option<String>,
    pub document_viewed_at: Option<String>,
    pub document_signed_at: Option<String>,
}

impl RequestRow {
    pub fn status(&self) -> Result<RequestStatus> {
        RequestStatus::parse(&self.status)
            .ok_or_else(|| anyhow!("unknown request status '{}'", self.status))
    }

    pub fn into_model(self) -> Result<ClientRequest> {
        let status = self.status()?;
        Ok(ClientRequest {
            id: self.id.parse()?,
            phone: self.phone,
            iin: self.iin,
            organization: self.organization,
            reason_type: self.reason_type,
            reason_text: self.reason_text,
            status,
            document_type: self.document_type,
            reject_reason: self.reject_reason,
            created_at: decode_ts(&self.created_at)?,
            updated_at: decode_ts(&self.updated_at)?,
            document_sent_at: self.document_sent_at.as_deref().map(decode_ts).transpose()?,
            document_viewed_at: self.document_viewed_at.as_deref().map(decode_ts).transpose()?,
            document_signed_at: self.document_signed_at.as_deref().map(decode_ts).transpose()?,
        })
    }
}

pub struct MessageRow {
    pub seq: i64,
    pub id: String,
    pub request_id: String,
    pub sender: String,
    pub text: String,
    pub created_at: String,
}

impl MessageRow {
    pub fn into_model(self) -> Result<ChatMessage> {
        let sender = MessageSender::parse(&self.sender)
            .ok_or_else(|| anyhow!("unknown message sender '{}'", self.sender))?;
        Ok(ChatMessage {
            id: self.id.parse()?,
            request_id: self.request_id.parse()?,
            sender,
            text: self.text,
            created_at: decode_ts(&self.created_at)?,
            seq: self.seq,
        })
    }
}
