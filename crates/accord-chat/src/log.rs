use std::sync::Arc;

use anyhow::{Result, anyhow};
use chrono::Utc;
use uuid::Uuid;

use accord_db::Database;
use accord_types::models::{ChatMessage, MessageSender};

use crate::dispatcher::{Dispatcher, Subscription};

/// Append-only, time-ordered message stream per request. Carries both human
/// chat and system-generated lifecycle notices; nothing here generates
/// content on its own.
#[derive(Clone)]
pub struct ChatLog {
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl ChatLog {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    /// Append one message and notify live subscribers with the full updated
    /// list.
    pub async fn append(
        &self,
        request_id: Uuid,
        sender: MessageSender,
        text: String,
    ) -> Result<ChatMessage> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();

        let seq = {
            let db = self.db.clone();
            let text = text.clone();
            tokio::task::spawn_blocking(move || {
                db.insert_message(id, request_id, sender.as_str(), &text, created_at)
            })
            .await
            .map_err(|e| anyhow!("blocking task failed: {e}"))??
        };

        let messages = self.list(request_id).await?;
        self.dispatcher.publish(request_id, messages).await;

        Ok(ChatMessage {
            id,
            request_id,
            sender,
            text,
            created_at,
            seq,
        })
    }

    /// All messages for a request ordered by (timestamp, insertion seq).
    /// Finite and restartable — callers re-fetch the whole list.
    pub async fn list(&self, request_id: Uuid) -> Result<Vec<ChatMessage>> {
        let db = self.db.clone();
        let rows = tokio::task::spawn_blocking(move || db.list_messages(request_id))
            .await
            .map_err(|e| anyhow!("blocking task failed: {e}"))??;
        rows.into_iter().map(|row| row.into_model()).collect()
    }

    /// Live updates: the subscriber receives the full current ordered list
    /// after every append, in append order.
    pub async fn subscribe(&self, request_id: Uuid) -> Subscription {
        self.dispatcher.subscribe(request_id).await
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_types::models::{ClientRequest, RequestStatus};

    fn seeded_request(db: &Database) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        db.insert_request(&ClientRequest {
            id,
            phone: "77001234567".into(),
            iin: None,
            organization: "Acme Bank".into(),
            reason_type: "payment_delay".into(),
            reason_text: "salary delayed".into(),
            status: RequestStatus::New,
            document_type: None,
            reject_reason: None,
            created_at: now,
            updated_at: now,
            document_sent_at: None,
            document_viewed_at: None,
            document_signed_at: None,
        })
        .unwrap();
        id
    }

    fn chat() -> (Arc<Database>, ChatLog) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let log = ChatLog::new(db.clone(), Dispatcher::new());
        (db, log)
    }

    #[tokio::test]
    async fn list_is_ordered_by_time_then_insertion() {
        let (db, log) = chat();
        let request_id = seeded_request(&db);

        log.append(request_id, MessageSender::Client, "first".into())
            .await
            .unwrap();
        log.append(request_id, MessageSender::Mediator, "second".into())
            .await
            .unwrap();
        log.append(request_id, MessageSender::Organization, "third".into())
            .await
            .unwrap();

        let messages = log.list(request_id).await.unwrap();
        let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["first", "second", "third"]);
        assert!(messages.windows(2).all(|w| w[0].seq < w[1].seq));
        assert!(messages.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[tokio::test]
    async fn equal_timestamps_fall_back_to_insertion_order() {
        let (db, log) = chat();
        let request_id = seeded_request(&db);
        let ts = Utc::now();

        for text in ["a", "b", "c"] {
            db.insert_message(Uuid::new_v4(), request_id, "client", text, ts)
                .unwrap();
        }

        let messages = log.list(request_id).await.unwrap();
        let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn subscriber_receives_full_list_after_each_append() {
        let (db, log) = chat();
        let request_id = seeded_request(&db);

        let mut sub = log.subscribe(request_id).await;

        log.append(request_id, MessageSender::Client, "hello".into())
            .await
            .unwrap();
        let snapshot = sub.next().await.unwrap();
        assert_eq!(snapshot.len(), 1);

        log.append(request_id, MessageSender::Mediator, "hi".into())
            .await
            .unwrap();
        let snapshot = sub.next().await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].text, "hello");
        assert_eq!(snapshot[1].text, "hi");
    }

    #[tokio::test]
    async fn updates_are_scoped_to_the_subscribed_request() {
        let (db, log) = chat();
        let watched = seeded_request(&db);
        let other = seeded_request(&db);

        let mut sub = log.subscribe(watched).await;

        log.append(other, MessageSender::Client, "elsewhere".into())
            .await
            .unwrap();
        log.append(watched, MessageSender::Client, "here".into())
            .await
            .unwrap();

        let snapshot = sub.next().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].text, "here");
    }

    #[tokio::test]
    async fn cancellation_releases_the_channel() {
        let (db, log) = chat();
        let request_id = seeded_request(&db);

        let sub = log.subscribe(request_id).await;
        assert_eq!(log.dispatcher().channel_count().await, 1);

        sub.cancel().await;
        assert_eq!(log.dispatcher().channel_count().await, 0);

        // appends after cancellation go nowhere, but still persist
        log.append(request_id, MessageSender::Client, "later".into())
            .await
            .unwrap();
        assert_eq!(log.list(request_id).await.unwrap().len(), 1);
    }
}
