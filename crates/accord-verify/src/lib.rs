pub mod code;
pub mod phone;
pub mod service;

pub use phone::normalize_phone;
pub use service::{IssueReceipt, VerificationService};

use accord_sms::DeliveryError;
use thiserror::Error;

/// Everything the verification path can tell a caller. Each variant maps to
/// a specific, user-actionable message — this path is security-sensitive, so
/// callers never collapse these into a generic failure.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("phone number is not in a recognized format")]
    InvalidPhoneFormat,

    #[error("no verification code outstanding for this phone")]
    NotFound,

    #[error("verification code has expired")]
    Expired,

    #[error("verification code was already used")]
    AlreadyUsed,

    #[error("too many verification attempts")]
    AttemptsExceeded,

    #[error("a code was sent recently, retry in {retry_after_secs}s")]
    TooSoon { retry_after_secs: i64 },

    /// The record was written; only delivery exhausted its retries. Callers
    /// decide whether this is fatal.
    #[error("could not deliver the verification code")]
    DeliveryFailed(#[from] DeliveryError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Tunables for the verification flow. Compiled defaults match the
/// production configuration; tests shrink them.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    pub code_length: usize,
    pub ttl: chrono::Duration,
    pub max_attempts: i64,
    pub resend_cooldown: chrono::Duration,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            code_length: 4,
            ttl: chrono::Duration::minutes(5),
            max_attempts: 3,
            resend_cooldown: chrono::Duration::seconds(60),
        }
    }
}
