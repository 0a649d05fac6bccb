use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- One outstanding code per phone; issue/resend supersede via upsert.
        -- Expired rows are inert, never purged (lazy expiry).
        CREATE TABLE IF NOT EXISTS verifications (
            phone           TEXT PRIMARY KEY,
            code            TEXT NOT NULL,
            correlation_id  TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            expires_at      TEXT NOT NULL,
            attempts        INTEGER NOT NULL DEFAULT 0,
            verified        INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS requests (
            id                  TEXT PRIMARY KEY,
            phone               TEXT NOT NULL,
            iin                 TEXT,
            organization        TEXT NOT NULL,
            reason_type         TEXT NOT NULL,
            reason_text         TEXT NOT NULL,
            status              TEXT NOT NULL,
            document_type       TEXT,
            reject_reason       TEXT,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL,
            document_sent_at    TEXT,
            document_viewed_at  TEXT,
            document_signed_at  TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_requests_phone
            ON requests(phone, created_at);

        -- seq is the insertion-order tie-break for equal timestamps.
        CREATE TABLE IF NOT EXISTS messages (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            id          TEXT NOT NULL UNIQUE,
            request_id  TEXT NOT NULL REFERENCES requests(id),
            sender      TEXT NOT NULL,
            text        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_request
            ON messages(request_id, created_at, seq);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
