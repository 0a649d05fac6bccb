use std::time::Duration;

use tracing::{error, warn};

use crate::providers::SmsProvider;
use crate::{DeliveryError, DeliveryReceipt};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_BACKOFF: Duration = Duration::from_secs(2);

/// Retrying front door for SMS delivery.
///
/// Transient failures (timeout, transport) are retried with a fixed backoff
/// up to the attempt cap; auth and provider rejections surface immediately.
/// The overall deadline is bounded by attempts × (timeout + backoff), so a
/// caller-level timeout can be honored.
pub struct SmsGateway {
    provider: SmsProvider,
    http: reqwest::Client,
    max_attempts: u32,
    attempt_timeout: Duration,
    backoff: Duration,
}

impl SmsGateway {
    pub fn new(provider: SmsProvider) -> Self {
        Self::with_policy(
            provider,
            DEFAULT_MAX_ATTEMPTS,
            DEFAULT_ATTEMPT_TIMEOUT,
            DEFAULT_BACKOFF,
        )
    }

    pub fn with_policy(
        provider: SmsProvider,
        max_attempts: u32,
        attempt_timeout: Duration,
        backoff: Duration,
    ) -> Self {
        Self {
            provider,
            http: reqwest::Client::new(),
            max_attempts: max_attempts.max(1),
            attempt_timeout,
            backoff,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub async fn send(&self, phone: &str, text: &str) -> Result<DeliveryReceipt, DeliveryError> {
        let mut last_err = DeliveryError::Timeout;

        for attempt in 1..=self.max_attempts {
            let outcome = tokio::time::timeout(
                self.attempt_timeout,
                self.provider.send(&self.http, phone, text),
            )
            .await;

            match outcome {
                Ok(Ok(message_id)) => {
                    return Ok(DeliveryReceipt {
                        message_id,
                        provider: self.provider.name(),
                        attempts: attempt,
                    });
                }
                Ok(Err(e)) if !e.is_retryable() => {
                    if let DeliveryError::Auth(ref msg) = e {
                        error!("sms gateway {} credential fault: {}", self.provider.name(), msg);
                    }
                    return Err(e);
                }
                Ok(Err(e)) => {
                    warn!(
                        "sms send attempt {}/{} via {} failed: {}",
                        attempt,
                        self.max_attempts,
                        self.provider.name(),
                        e
                    );
                    last_err = e;
                }
                Err(_) => {
                    warn!(
                        "sms send attempt {}/{} via {} timed out",
                        attempt,
                        self.max_attempts,
                        self.provider.name()
                    );
                    last_err = DeliveryError::Timeout;
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.backoff).await;
            }
        }

        Err(last_err)
    }
}
