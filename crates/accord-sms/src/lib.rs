pub mod gateway;
pub mod providers;

pub use gateway::SmsGateway;
pub use providers::SmsProvider;

use thiserror::Error;

/// Delivery failure classes. Retry policy lives on the class, not at the
/// call sites: transient classes are retried by the gateway, the rest
/// surface immediately.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Bad credentials. Never retried — this is a configuration fault and
    /// is logged at error level for operators.
    #[error("gateway rejected credentials: {0}")]
    Auth(String),

    /// A single attempt exceeded its time budget.
    #[error("send attempt timed out")]
    Timeout,

    /// The provider refused the message (bad destination, blocked content).
    #[error("rejected by provider: {0}")]
    Rejected(String),

    /// Transport-level failure (DNS, connect, TLS, read).
    #[error("network error: {0}")]
    Network(String),
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Network(_))
    }
}

/// Proof of a handed-off message.
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    /// Provider-assigned message id, when the provider reports one.
    pub message_id: Option<String>,
    pub provider: &'static str,
    /// How many attempts the delivery took.
    pub attempts: u32,
}

/// Providers want bare digits; the rest of the system carries one canonical
/// normalized phone form, so the reshaping happens here and nowhere else.
pub(crate) fn digits_only(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}
