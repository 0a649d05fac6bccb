use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::MessageSender;

// -- JWT Claims --

/// JWT claims shared between accord-api (REST middleware) and accord-chat
/// (WebSocket authentication). The subject is the verified phone number in
/// its canonical normalized form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

// -- Verification --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IssueCodeRequest {
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct IssueCodeResponse {
    pub correlation_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub next_resend_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyCodeRequest {
    pub phone: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyCodeResponse {
    pub verified: bool,
    /// Session token, present only when `verified` is true.
    pub token: Option<String>,
}

// -- Requests --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRequestRequest {
    pub iin: Option<String>,
    pub organization: String,
    pub reason_type: String,
    pub reason_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendDocumentRequest {
    pub document_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RejectRequestRequest {
    pub reason: String,
}

// -- Chat --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppendMessageRequest {
    pub sender: MessageSender,
    pub text: String,
}

// -- Errors --

/// Wire shape for every error response. `error` is a stable machine code,
/// `message` is the user-actionable text.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}
