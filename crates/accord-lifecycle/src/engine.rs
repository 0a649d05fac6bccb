use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use accord_chat::ChatLog;
use accord_db::Database;
use accord_db::models::RequestRow;
use accord_types::models::{ClientRequest, MessageSender, NewRequest, RequestStatus};

use crate::LifecycleError;

/// Sole writer of request status and milestone fields.
///
/// Every transition is a conditional update guarded by the allowed source
/// states; exactly one concurrent caller wins the write, and a loser
/// re-reads to report either idempotent success or `InvalidTransition`.
pub struct LifecycleEngine {
    db: Arc<Database>,
    chat: ChatLog,
}

impl LifecycleEngine {
    pub fn new(db: Arc<Database>, chat: ChatLog) -> Self {
        Self { db, chat }
    }

    pub async fn create(&self, fields: NewRequest) -> Result<ClientRequest, LifecycleError> {
        let now = Utc::now();
        let request = ClientRequest {
            id: Uuid::new_v4(),
            phone: fields.phone,
            iin: fields.iin,
            organization: fields.organization,
            reason_type: fields.reason_type,
            reason_text: fields.reason_text,
            status: RequestStatus::New,
            document_type: None,
            reject_reason: None,
            created_at: now,
            updated_at: now,
            document_sent_at: None,
            document_viewed_at: None,
            document_signed_at: None,
        };

        let db = self.db.clone();
        let stored = request.clone();
        run_blocking(move || db.insert_request(&stored)).await??;

        debug!("request {} created for {}", request.id, request.phone);
        Ok(request)
    }

    pub async fn get(&self, id: Uuid) -> Result<ClientRequest, LifecycleError> {
        let row = self.fetch_row(id).await?.ok_or(LifecycleError::NotFound)?;
        Ok(row.into_model()?)
    }

    pub async fn list_for_phone(&self, phone: &str) -> Result<Vec<ClientRequest>, LifecycleError> {
        let db = self.db.clone();
        let phone = phone.to_string();
        let rows = run_blocking(move || db.list_requests_for_phone(&phone)).await??;
        let requests = rows
            .into_iter()
            .map(|row| row.into_model())
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(requests)
    }

    /// Mediator takes the request: new → in_progress.
    pub async fn start_processing(&self, id: Uuid) -> Result<(), LifecycleError> {
        self.plain_transition(id, RequestStatus::InProgress).await
    }

    /// Attach a document and move to document_sent. The sent timestamp is
    /// written once and never overwritten, and the system notice is posted
    /// only by the winning writer — exactly once per request.
    pub async fn send_document(
        &self,
        id: Uuid,
        document_type: &str,
    ) -> Result<(), LifecycleError> {
        let target = RequestStatus::DocumentSent;
        let now = Utc::now();
        let changed = {
            let db = self.db.clone();
            let doc = document_type.to_string();
            run_blocking(move || {
                db.mark_document_sent(id, &doc, RequestStatus::allowed_sources(target), now)
            })
            .await??
        };

        if changed {
            let notice = format!("Document sent for review ({})", document_type);
            self.chat
                .append(id, MessageSender::System, notice)
                .await
                .map_err(LifecycleError::Store)?;
            debug!("request {} document_sent ({})", id, document_type);
            return Ok(());
        }

        // Re-sending an already-sent document is a no-op success; anything
        // further along the chain is an error.
        self.settle(id, target, true).await
    }

    pub async fn mark_viewed(&self, id: Uuid) -> Result<(), LifecycleError> {
        let target = RequestStatus::DocumentViewed;
        let now = Utc::now();
        let changed = {
            let db = self.db.clone();
            run_blocking(move || {
                db.mark_document_viewed(id, RequestStatus::allowed_sources(target), now)
            })
            .await??
        };

        if changed {
            debug!("request {} document_viewed", id);
            return Ok(());
        }
        self.settle(id, target, false).await
    }

    pub async fn mark_signed(&self, id: Uuid) -> Result<(), LifecycleError> {
        let target = RequestStatus::DocumentSigned;
        let now = Utc::now();
        let changed = {
            let db = self.db.clone();
            run_blocking(move || {
                db.mark_document_signed(id, RequestStatus::allowed_sources(target), now)
            })
            .await??
        };

        if changed {
            debug!("request {} document_signed", id);
            return Ok(());
        }
        self.settle(id, target, false).await
    }

    /// Mediator closes the loop: document_signed → resolved.
    pub async fn resolve(&self, id: Uuid) -> Result<(), LifecycleError> {
        self.plain_transition(id, RequestStatus::Resolved).await
    }

    pub async fn reject(&self, id: Uuid, reason: &str) -> Result<(), LifecycleError> {
        let target = RequestStatus::Rejected;
        let now = Utc::now();
        let changed = {
            let db = self.db.clone();
            let reason = reason.to_string();
            run_blocking(move || {
                db.reject_request(id, &reason, RequestStatus::allowed_sources(target), now)
            })
            .await??
        };

        if changed {
            debug!("request {} rejected", id);
            return Ok(());
        }
        self.settle(id, target, false).await
    }

    async fn plain_transition(
        &self,
        id: Uuid,
        target: RequestStatus,
    ) -> Result<(), LifecycleError> {
        let now = Utc::now();
        let changed = {
            let db = self.db.clone();
            run_blocking(move || {
                db.transition_status(id, target, RequestStatus::allowed_sources(target), now)
            })
            .await??
        };

        if changed {
            debug!("request {} -> {}", id, target);
            return Ok(());
        }
        self.settle(id, target, false).await
    }

    /// A conditional update that changed nothing means this caller lost (or
    /// repeated) the transition. Decide between idempotent success and
    /// rejection from the freshly-read state.
    async fn settle(
        &self,
        id: Uuid,
        target: RequestStatus,
        exact_noop_only: bool,
    ) -> Result<(), LifecycleError> {
        let row = self.fetch_row(id).await?.ok_or(LifecycleError::NotFound)?;
        let current = row.status().map_err(LifecycleError::Store)?;

        let idempotent = if exact_noop_only {
            current == target
        } else {
            current.has_reached(target)
        };

        if idempotent {
            Ok(())
        } else {
            Err(LifecycleError::InvalidTransition {
                from: current,
                to: target,
            })
        }
    }

    async fn fetch_row(&self, id: Uuid) -> Result<Option<RequestRow>, LifecycleError> {
        let db = self.db.clone();
        Ok(run_blocking(move || db.get_request(id)).await??)
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, LifecycleError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| LifecycleError::Store(anyhow!("blocking task failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_chat::Dispatcher;

    fn engine() -> (Arc<Database>, LifecycleEngine) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let chat = ChatLog::new(db.clone(), Dispatcher::new());
        (db.clone(), LifecycleEngine::new(db, chat))
    }

    fn fields() -> NewRequest {
        NewRequest {
            phone: "77001234567".into(),
            iin: Some("900101300123".into()),
            organization: "Acme Bank".into(),
            reason_type: "payment_delay".into(),
            reason_text: "salary delayed two months".into(),
        }
    }

    async fn created(engine: &LifecycleEngine) -> ClientRequest {
        engine.create(fields()).await.unwrap()
    }

    #[tokio::test]
    async fn create_starts_in_new() {
        let (_db, engine) = engine();
        let request = created(&engine).await;

        assert_eq!(request.status, RequestStatus::New);
        assert_eq!(request.created_at, request.updated_at);
        assert!(request.document_sent_at.is_none());

        let fetched = engine.get(request.id).await.unwrap();
        assert_eq!(fetched.status, RequestStatus::New);
        assert_eq!(fetched.reason_type, "payment_delay");
    }

    #[tokio::test]
    async fn happy_path_through_signature() {
        let (_db, engine) = engine();
        let request = created(&engine).await;

        engine.send_document(request.id, "general").await.unwrap();
        let r = engine.get(request.id).await.unwrap();
        assert_eq!(r.status, RequestStatus::DocumentSent);
        assert_eq!(r.document_type.as_deref(), Some("general"));
        assert!(r.document_sent_at.is_some());

        engine.mark_viewed(request.id).await.unwrap();
        let r = engine.get(request.id).await.unwrap();
        assert_eq!(r.status, RequestStatus::DocumentViewed);
        assert!(r.document_viewed_at.is_some());

        engine.mark_signed(request.id).await.unwrap();
        let r = engine.get(request.id).await.unwrap();
        assert_eq!(r.status, RequestStatus::DocumentSigned);
        assert!(r.document_signed_at.is_some());

        // signed is terminal for document sending
        assert!(matches!(
            engine.send_document(request.id, "general").await,
            Err(LifecycleError::InvalidTransition { .. })
        ));

        engine.resolve(request.id).await.unwrap();
        let r = engine.get(request.id).await.unwrap();
        assert_eq!(r.status, RequestStatus::Resolved);
    }

    #[tokio::test]
    async fn resend_keeps_original_sent_timestamp() {
        let (_db, engine) = engine();
        let request = created(&engine).await;

        engine.send_document(request.id, "general").await.unwrap();
        let first = engine.get(request.id).await.unwrap();

        // second call is a success no-op
        engine.send_document(request.id, "general").await.unwrap();
        let second = engine.get(request.id).await.unwrap();

        assert_eq!(first.document_sent_at, second.document_sent_at);
        assert_eq!(second.status, RequestStatus::DocumentSent);
    }

    #[tokio::test]
    async fn document_sent_notice_is_posted_exactly_once() {
        let (db, engine) = engine();
        let chat = ChatLog::new(db.clone(), Dispatcher::new());
        let request = created(&engine).await;

        engine.send_document(request.id, "general").await.unwrap();
        engine.send_document(request.id, "general").await.unwrap();

        let messages = chat.list(request.id).await.unwrap();
        let notices: Vec<_> = messages
            .iter()
            .filter(|m| m.sender == MessageSender::System)
            .collect();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].text.contains("general"));
    }

    #[tokio::test]
    async fn viewed_is_idempotent() {
        let (_db, engine) = engine();
        let request = created(&engine).await;
        engine.send_document(request.id, "general").await.unwrap();

        engine.mark_viewed(request.id).await.unwrap();
        let first = engine.get(request.id).await.unwrap();

        engine.mark_viewed(request.id).await.unwrap();
        let second = engine.get(request.id).await.unwrap();

        assert_eq!(first.status, second.status);
        assert_eq!(first.document_viewed_at, second.document_viewed_at);
    }

    #[tokio::test]
    async fn signing_tolerates_a_missing_viewed_signal() {
        let (_db, engine) = engine();
        let request = created(&engine).await;
        engine.send_document(request.id, "general").await.unwrap();

        engine.mark_signed(request.id).await.unwrap();
        let r = engine.get(request.id).await.unwrap();
        assert_eq!(r.status, RequestStatus::DocumentSigned);
        assert!(r.document_viewed_at.is_none());
        assert!(r.document_signed_at.is_some());

        // late viewed signal after signing is a harmless no-op
        engine.mark_viewed(request.id).await.unwrap();
        let r = engine.get(request.id).await.unwrap();
        assert_eq!(r.status, RequestStatus::DocumentSigned);
        assert!(r.document_viewed_at.is_none());
    }

    #[tokio::test]
    async fn invalid_transitions_are_rejected_not_coerced() {
        let (_db, engine) = engine();
        let request = created(&engine).await;

        assert!(matches!(
            engine.mark_signed(request.id).await,
            Err(LifecycleError::InvalidTransition {
                from: RequestStatus::New,
                to: RequestStatus::DocumentSigned,
            })
        ));
        assert!(matches!(
            engine.mark_viewed(request.id).await,
            Err(LifecycleError::InvalidTransition { .. })
        ));
        assert!(matches!(
            engine.resolve(request.id).await,
            Err(LifecycleError::InvalidTransition { .. })
        ));

        // nothing moved
        let r = engine.get(request.id).await.unwrap();
        assert_eq!(r.status, RequestStatus::New);
    }

    #[tokio::test]
    async fn start_processing_then_send() {
        let (_db, engine) = engine();
        let request = created(&engine).await;

        engine.start_processing(request.id).await.unwrap();
        engine.start_processing(request.id).await.unwrap(); // idempotent
        let r = engine.get(request.id).await.unwrap();
        assert_eq!(r.status, RequestStatus::InProgress);

        engine.send_document(request.id, "settlement").await.unwrap();
        let r = engine.get(request.id).await.unwrap();
        assert_eq!(r.status, RequestStatus::DocumentSent);
    }

    #[tokio::test]
    async fn rejection_branch() {
        let (_db, engine) = engine();
        let request = created(&engine).await;

        engine.reject(request.id, "incomplete data").await.unwrap();
        let r = engine.get(request.id).await.unwrap();
        assert_eq!(r.status, RequestStatus::Rejected);
        assert_eq!(r.reject_reason.as_deref(), Some("incomplete data"));

        // repeated rejection is a no-op success
        engine.reject(request.id, "other reason").await.unwrap();
        let r = engine.get(request.id).await.unwrap();
        assert_eq!(r.reject_reason.as_deref(), Some("incomplete data"));

        // a rejected request accepts no milestones
        assert!(matches!(
            engine.mark_viewed(request.id).await,
            Err(LifecycleError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn signed_requests_cannot_be_rejected() {
        let (_db, engine) = engine();
        let request = created(&engine).await;
        engine.send_document(request.id, "general").await.unwrap();
        engine.mark_signed(request.id).await.unwrap();

        assert!(matches!(
            engine.reject(request.id, "too late").await,
            Err(LifecycleError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_request_is_not_found() {
        let (_db, engine) = engine();
        assert!(matches!(
            engine.mark_viewed(Uuid::new_v4()).await,
            Err(LifecycleError::NotFound)
        ));
        assert!(matches!(
            engine.get(Uuid::new_v4()).await,
            Err(LifecycleError::NotFound)
        ));
    }

    #[tokio::test]
    async fn owner_scoped_listing() {
        let (_db, engine) = engine();
        let mine = created(&engine).await;
        let mut other = fields();
        other.phone = "77009999999".into();
        engine.create(other).await.unwrap();

        let listed = engine.list_for_phone("77001234567").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, mine.id);
    }
}
