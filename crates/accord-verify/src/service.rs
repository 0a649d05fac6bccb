use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use accord_db::Database;
use accord_sms::SmsGateway;

use crate::code::generate_code;
use crate::phone::normalize_phone;
use crate::{VerificationError, VerifyConfig};

/// Returned by issue/resend. The correlation id is the explicit handle a
/// caller threads through to the verify step — there is no ambient state
/// tying the two calls together.
#[derive(Debug, Clone)]
pub struct IssueReceipt {
    pub correlation_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub next_resend_at: DateTime<Utc>,
}

/// Orchestrates generator, store, and SMS gateway for the issue / resend /
/// verify flow. At most one outstanding code per phone; records are
/// superseded in place, never deleted (lazy expiry).
pub struct VerificationService {
    db: Arc<Database>,
    gateway: Arc<SmsGateway>,
    config: VerifyConfig,
}

impl VerificationService {
    pub fn new(db: Arc<Database>, gateway: Arc<SmsGateway>, config: VerifyConfig) -> Self {
        Self {
            db,
            gateway,
            config,
        }
    }

    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    /// Generate a code, persist the record, then deliver. Returns after the
    /// record is durable; a delivery that exhausts its retries surfaces as
    /// `DeliveryFailed` with the record already written, so the caller picks
    /// fatal or soft.
    pub async fn issue(&self, phone: &str) -> Result<IssueReceipt, VerificationError> {
        let phone = normalize_phone(phone)?;
        self.issue_normalized(phone).await
    }

    /// Same as issue, but refuses while the prior record is younger than the
    /// cooldown window — the caller-driven retry path is rate-limited to
    /// bound gateway cost and abuse.
    pub async fn resend(&self, phone: &str) -> Result<IssueReceipt, VerificationError> {
        let phone = normalize_phone(phone)?;

        let prior = {
            let db = self.db.clone();
            let p = phone.clone();
            run_blocking(move || db.get_verification(&p)).await??
        };

        if let Some(row) = prior {
            let created = row.created_at()?;
            let resend_at = created + self.config.resend_cooldown;
            let now = Utc::now();
            if now < resend_at {
                return Err(VerificationError::TooSoon {
                    retry_after_secs: (resend_at - now).num_seconds().max(1),
                });
            }
        }

        self.issue_normalized(phone).await
    }

    /// Check a submitted code. Every call consumes an attempt before the
    /// limit check, so the call that reaches the cap is itself reported as
    /// `AttemptsExceeded` rather than silently ignored. On mismatch returns
    /// Ok(false); on match flips the record to verified exactly once.
    pub async fn verify(&self, phone: &str, code: &str) -> Result<bool, VerificationError> {
        let phone = normalize_phone(phone)?;
        let code = code.trim().to_string();
        let max_attempts = self.config.max_attempts;

        let db = self.db.clone();
        run_blocking(move || -> Result<bool, VerificationError> {
            let row = db
                .get_verification(&phone)
                .map_err(VerificationError::Store)?
                .ok_or(VerificationError::NotFound)?;

            if Utc::now() > row.expires_at()? {
                return Err(VerificationError::Expired);
            }
            if row.verified {
                return Err(VerificationError::AlreadyUsed);
            }

            let attempts = db
                .bump_verification_attempts(&row.phone)
                .map_err(VerificationError::Store)?
                .ok_or(VerificationError::NotFound)?;
            if attempts >= max_attempts {
                return Err(VerificationError::AttemptsExceeded);
            }

            if row.code != code {
                return Ok(false);
            }

            // Conditional write: a racing verify that already consumed the
            // code turns this caller's success into AlreadyUsed.
            let won = db
                .mark_verification_verified(&row.phone, &code)
                .map_err(VerificationError::Store)?;
            if won {
                Ok(true)
            } else {
                Err(VerificationError::AlreadyUsed)
            }
        })
        .await?
    }

    async fn issue_normalized(&self, phone: String) -> Result<IssueReceipt, VerificationError> {
        let code = generate_code(self.config.code_length);
        let correlation_id = Uuid::new_v4();
        let now = Utc::now();
        let expires_at = now + self.config.ttl;

        {
            let db = self.db.clone();
            let p = phone.clone();
            let c = code.clone();
            run_blocking(move || db.upsert_verification(&p, &c, correlation_id, now, expires_at))
                .await??;
        }

        // The record is durable from here on. Delivery runs on its own task
        // so an abandoned caller cannot abort it mid-flight; awaiting the
        // handle keeps exhaustion visible inside the caller's context.
        let gateway = self.gateway.clone();
        let destination = phone.clone();
        let text = format!("Your verification code: {}", code);
        let delivery = tokio::spawn(async move { gateway.send(&destination, &text).await });

        match delivery.await {
            Ok(Ok(receipt)) => {
                debug!(
                    "verification code delivered to {} via {} in {} attempt(s)",
                    phone, receipt.provider, receipt.attempts
                );
            }
            Ok(Err(e)) => return Err(VerificationError::DeliveryFailed(e)),
            Err(e) => return Err(VerificationError::Store(anyhow!("delivery task failed: {e}"))),
        }

        Ok(IssueReceipt {
            correlation_id,
            expires_at,
            next_resend_at: now + self.config.resend_cooldown,
        })
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, VerificationError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| VerificationError::Store(anyhow!("blocking task failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_sms::providers::SmsProvider;
    use std::time::Duration;

    const PHONE: &str = "77001234567";

    fn service() -> (Arc<Database>, VerificationService) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let gateway = Arc::new(SmsGateway::new(SmsProvider::Console));
        let svc = VerificationService::new(db.clone(), gateway, VerifyConfig::default());
        (db, svc)
    }

    fn stored_code(db: &Database, phone: &str) -> String {
        db.get_verification(phone).unwrap().unwrap().code
    }

    fn wrong_code(code: &str) -> String {
        // Flip the last digit so the guess is always a mismatch.
        let mut bytes = code.as_bytes().to_vec();
        let last = bytes.last_mut().unwrap();
        *last = b'0' + (*last - b'0' + 1) % 10;
        String::from_utf8(bytes).unwrap()
    }

    #[tokio::test]
    async fn issue_writes_a_fresh_record() {
        let (db, svc) = service();
        let receipt = svc.issue("+7 700 123 45 67").await.unwrap();

        let row = db.get_verification(PHONE).unwrap().unwrap();
        assert_eq!(row.attempts, 0);
        assert!(!row.verified);
        assert_eq!(row.correlation_id, receipt.correlation_id.to_string());
        assert_eq!(
            row.expires_at().unwrap() - row.created_at().unwrap(),
            VerifyConfig::default().ttl
        );
        assert_eq!(row.code.len(), 4);
    }

    #[tokio::test]
    async fn invalid_phone_is_rejected_up_front() {
        let (db, svc) = service();
        assert!(matches!(
            svc.issue("not a phone").await,
            Err(VerificationError::InvalidPhoneFormat)
        ));
        assert!(db.get_verification("not a phone").unwrap().is_none());
    }

    #[tokio::test]
    async fn correct_code_verifies_exactly_once() {
        let (db, svc) = service();
        svc.issue(PHONE).await.unwrap();
        let code = stored_code(&db, PHONE);

        assert!(svc.verify(PHONE, &code).await.unwrap());
        assert!(matches!(
            svc.verify(PHONE, &code).await,
            Err(VerificationError::AlreadyUsed)
        ));
    }

    #[tokio::test]
    async fn attempts_consume_and_cap() {
        let (db, svc) = service();
        svc.issue(PHONE).await.unwrap();
        let code = stored_code(&db, PHONE);
        let wrong = wrong_code(&code);

        // MAX_ATTEMPTS = 3: two mismatches come back Ok(false), the third
        // call is consumed by the limit itself.
        assert!(!svc.verify(PHONE, &wrong).await.unwrap());
        assert!(!svc.verify(PHONE, &wrong).await.unwrap());
        assert!(matches!(
            svc.verify(PHONE, &wrong).await,
            Err(VerificationError::AttemptsExceeded)
        ));

        // The correct code is no longer accepted either.
        assert!(matches!(
            svc.verify(PHONE, &code).await,
            Err(VerificationError::AttemptsExceeded)
        ));
    }

    #[tokio::test]
    async fn unknown_phone_is_not_found() {
        let (_db, svc) = service();
        assert!(matches!(
            svc.verify(PHONE, "1234").await,
            Err(VerificationError::NotFound)
        ));
    }

    #[tokio::test]
    async fn expired_code_is_rejected_lazily() {
        let (db, svc) = service();
        let now = Utc::now();
        db.upsert_verification(
            PHONE,
            "1234",
            Uuid::new_v4(),
            now - chrono::Duration::minutes(10),
            now - chrono::Duration::minutes(5),
        )
        .unwrap();

        assert!(matches!(
            svc.verify(PHONE, "1234").await,
            Err(VerificationError::Expired)
        ));
        // the record is inert, not deleted
        assert!(db.get_verification(PHONE).unwrap().is_some());
    }

    #[tokio::test]
    async fn resend_inside_cooldown_is_too_soon() {
        let (_db, svc) = service();
        svc.issue(PHONE).await.unwrap();

        match svc.resend(PHONE).await {
            Err(VerificationError::TooSoon { retry_after_secs }) => {
                assert!(retry_after_secs > 0 && retry_after_secs <= 60);
            }
            other => panic!("expected TooSoon, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn resend_after_cooldown_supersedes_the_record() {
        let (db, svc) = service();
        let now = Utc::now();
        let old_correlation = Uuid::new_v4();
        db.upsert_verification(
            PHONE,
            "1234",
            old_correlation,
            now - chrono::Duration::minutes(2),
            now + chrono::Duration::minutes(3),
        )
        .unwrap();
        // burn an attempt so the reset is observable
        assert!(!svc.verify(PHONE, "0000").await.unwrap());

        let receipt = svc.resend(PHONE).await.unwrap();
        assert_ne!(receipt.correlation_id, old_correlation);

        let row = db.get_verification(PHONE).unwrap().unwrap();
        assert_eq!(row.attempts, 0);
        assert!(!row.verified);
        assert_eq!(row.correlation_id, receipt.correlation_id.to_string());
    }

    #[tokio::test]
    async fn mismatch_does_not_consume_the_code() {
        let (db, svc) = service();
        let now = Utc::now();
        db.upsert_verification(
            PHONE,
            "1234",
            Uuid::new_v4(),
            now,
            now + chrono::Duration::minutes(5),
        )
        .unwrap();

        assert!(!svc.verify(PHONE, "9999").await.unwrap());
        assert!(svc.verify(PHONE, "1234").await.unwrap());
    }

    #[tokio::test]
    async fn delivery_exhaustion_surfaces_with_record_intact() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        // Nothing listens on this port; every attempt fails at the transport
        // level and the retry budget runs out.
        let gateway = Arc::new(SmsGateway::with_policy(
            SmsProvider::Smsc {
                login: "accord".into(),
                password: "secret".into(),
                base_url: "http://127.0.0.1:9".into(),
            },
            2,
            Duration::from_millis(500),
            Duration::from_millis(1),
        ));
        let svc = VerificationService::new(db.clone(), gateway, VerifyConfig::default());

        assert!(matches!(
            svc.issue(PHONE).await,
            Err(VerificationError::DeliveryFailed(_))
        ));
        // the record was durably written before delivery started
        let row = db.get_verification(PHONE).unwrap().unwrap();
        assert_eq!(row.attempts, 0);
    }
}
