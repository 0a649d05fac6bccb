use crate::models::{MessageRow, RequestRow, VerificationRow};
use crate::{Database, encode_ts};
use accord_types::models::{ClientRequest, RequestStatus};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use rusqlite::types::ToSql;
use uuid::Uuid;

impl Database {
    // -- Verifications --

    /// Write a fresh verification record for a phone, superseding any prior
    /// record under the same key (attempts and verified are reset).
    pub fn upsert_verification(
        &self,
        phone: &str,
        code: &str,
        correlation_id: Uuid,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO verifications (phone, code, correlation_id, created_at, expires_at, attempts, verified)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, 0)
                 ON CONFLICT(phone) DO UPDATE SET
                     code = excluded.code,
                     correlation_id = excluded.correlation_id,
                     created_at = excluded.created_at,
                     expires_at = excluded.expires_at,
                     attempts = 0,
                     verified = 0",
                rusqlite::params![
                    phone,
                    code,
                    correlation_id.to_string(),
                    encode_ts(created_at),
                    encode_ts(expires_at)
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_verification(&self, phone: &str) -> Result<Option<VerificationRow>> {
        self.with_conn(|conn| query_verification(conn, phone))
    }

    /// Unconditionally consume one attempt. Returns the new attempt count,
    /// or None if no record exists for the phone.
    pub fn bump_verification_attempts(&self, phone: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE verifications SET attempts = attempts + 1 WHERE phone = ?1",
                [phone],
            )?;
            if n == 0 {
                return Ok(None);
            }
            let attempts = conn.query_row(
                "SELECT attempts FROM verifications WHERE phone = ?1",
                [phone],
                |row| row.get(0),
            )?;
            Ok(Some(attempts))
        })
    }

    /// Flip the record to verified, conditional on the stored code still
    /// matching and the record not being consumed yet. Returns whether this
    /// caller won the write.
    pub fn mark_verification_verified(&self, phone: &str, code: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE verifications SET verified = 1
                 WHERE phone = ?1 AND code = ?2 AND verified = 0",
                [phone, code],
            )?;
            Ok(n == 1)
        })
    }

    // -- Requests --

    pub fn insert_request(&self, request: &ClientRequest) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO requests
                     (id, phone, iin, organization, reason_type, reason_text,
                      status, document_type, reject_reason, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    request.id.to_string(),
                    request.phone,
                    request.iin,
                    request.organization,
                    request.reason_type,
                    request.reason_text,
                    request.status.as_str(),
                    request.document_type,
                    request.reject_reason,
                    encode_ts(request.created_at),
                    encode_ts(request.updated_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_request(&self, id: Uuid) -> Result<Option<RequestRow>> {
        self.with_conn(|conn| query_request(conn, id))
    }

    pub fn list_requests_for_phone(&self, phone: &str) -> Result<Vec<RequestRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REQUEST_COLUMNS} FROM requests WHERE phone = ?1 ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map([phone], request_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Conditional status move with no milestone column. Returns whether a
    /// row changed; a false return means the request was not in any of the
    /// allowed source states (or does not exist).
    pub fn transition_status(
        &self,
        id: Uuid,
        target: RequestStatus,
        allowed_from: &[RequestStatus],
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn(|conn| conditional_transition(conn, id, target, allowed_from, now, None))
    }

    /// document_sent transition: also records the document type and fills
    /// document_sent_at only if still unset (the original sent timestamp is
    /// an audit-trail guarantee).
    pub fn mark_document_sent(
        &self,
        id: Uuid,
        document_type: &str,
        allowed_from: &[RequestStatus],
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let sql = format!(
                "UPDATE requests SET status = ?1, updated_at = ?2, document_type = ?3,
                     document_sent_at = COALESCE(document_sent_at, ?2)
                 WHERE id = ?4 AND status IN ({})",
                placeholders(5, allowed_from.len())
            );
            let target = RequestStatus::DocumentSent.as_str();
            let now_s = encode_ts(now);
            let id_s = id.to_string();
            let mut params: Vec<&dyn ToSql> = vec![&target, &now_s, &document_type, &id_s];
            let from: Vec<&'static str> = allowed_from.iter().map(|s| s.as_str()).collect();
            for s in &from {
                params.push(s);
            }
            let n = conn.execute(&sql, params.as_slice())?;
            Ok(n == 1)
        })
    }

    pub fn mark_document_viewed(
        &self,
        id: Uuid,
        allowed_from: &[RequestStatus],
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            conditional_transition(
                conn,
                id,
                RequestStatus::DocumentViewed,
                allowed_from,
                now,
                Some("document_viewed_at"),
            )
        })
    }

    pub fn mark_document_signed(
        &self,
        id: Uuid,
        allowed_from: &[RequestStatus],
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            conditional_transition(
                conn,
                id,
                RequestStatus::DocumentSigned,
                allowed_from,
                now,
                Some("document_signed_at"),
            )
        })
    }

    pub fn reject_request(
        &self,
        id: Uuid,
        reason: &str,
        allowed_from: &[RequestStatus],
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let sql = format!(
                "UPDATE requests SET status = ?1, updated_at = ?2, reject_reason = ?3
                 WHERE id = ?4 AND status IN ({})",
                placeholders(5, allowed_from.len())
            );
            let target = RequestStatus::Rejected.as_str();
            let now_s = encode_ts(now);
            let id_s = id.to_string();
            let mut params: Vec<&dyn ToSql> = vec![&target, &now_s, &reason, &id_s];
            let from: Vec<&'static str> = allowed_from.iter().map(|s| s.as_str()).collect();
            for s in &from {
                params.push(s);
            }
            let n = conn.execute(&sql, params.as_slice())?;
            Ok(n == 1)
        })
    }

    // -- Messages --

    /// Append one message. Returns the assigned seq (insertion order,
    /// breaks timestamp ties).
    pub fn insert_message(
        &self,
        id: Uuid,
        request_id: Uuid,
        sender: &str,
        text: &str,
        created_at: DateTime<Utc>,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, request_id, sender, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    id.to_string(),
                    request_id.to_string(),
                    sender,
                    text,
                    encode_ts(created_at)
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn list_messages(&self, request_id: Uuid) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT seq, id, request_id, sender, text, created_at
                 FROM messages WHERE request_id = ?1
                 ORDER BY created_at, seq",
            )?;
            let rows = stmt
                .query_map([request_id.to_string()], |row| {
                    Ok(MessageRow {
                        seq: row.get(0)?,
                        id: row.get(1)?,
                        request_id: row.get(2)?,
                        sender: row.get(3)?,
                        text: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

const REQUEST_COLUMNS: &str = "id, phone, iin, organization, reason_type, reason_text, status, \
     document_type, reject_reason, created_at, updated_at, \
     document_sent_at, document_viewed_at, document_signed_at";

fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn conditional_transition(
    conn: &Connection,
    id: Uuid,
    target: RequestStatus,
    allowed_from: &[RequestStatus],
    now: DateTime<Utc>,
    milestone_col: Option<&str>,
) -> Result<bool> {
    let mut sql = String::from("UPDATE requests SET status = ?1, updated_at = ?2");
    if let Some(col) = milestone_col {
        // Milestone timestamps are write-once.
        sql.push_str(&format!(", {col} = COALESCE({col}, ?2)"));
    }
    sql.push_str(&format!(
        " WHERE id = ?3 AND status IN ({})",
        placeholders(4, allowed_from.len())
    ));

    let target_s = target.as_str();
    let now_s = encode_ts(now);
    let id_s = id.to_string();
    let mut params: Vec<&dyn ToSql> = vec![&target_s, &now_s, &id_s];
    let from: Vec<&'static str> = allowed_from.iter().map(|s| s.as_str()).collect();
    for s in &from {
        params.push(s);
    }
    let n = conn.execute(&sql, params.as_slice())?;
    Ok(n == 1)
}

fn query_verification(conn: &Connection, phone: &str) -> Result<Option<VerificationRow>> {
    let mut stmt = conn.prepare(
        "SELECT phone, code, correlation_id, created_at, expires_at, attempts, verified
         FROM verifications WHERE phone = ?1",
    )?;

    let row = stmt
        .query_row([phone], |row| {
            Ok(VerificationRow {
                phone: row.get(0)?,
                code: row.get(1)?,
                correlation_id: row.get(2)?,
                created_at: row.get(3)?,
                expires_at: row.get(4)?,
                attempts: row.get(5)?,
                verified: row.get::<_, i64>(6)? != 0,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_request(conn: &Connection, id: Uuid) -> Result<Option<RequestRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?1"
    ))?;

    let row = stmt
        .query_row([id.to_string()], request_from_row)
        .optional()?;

    Ok(row)
}

fn request_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<RequestRow, rusqlite::Error> {
    Ok(RequestRow {
        id: row.get(0)?,
        phone: row.get(1)?,
        iin: row.get(2)?,
        organization: row.get(3)?,
        reason_type: row.get(4)?,
        reason_text: row.get(5)?,
        status: row.get(6)?,
        document_type: row.get(7)?,
        reject_reason: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        document_sent_at: row.get(11)?,
        document_viewed_at: row.get(12)?,
        document_signed_at: row.get(13)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
