use rusqlite::Connection;

use crate::error::Result;

/// Initialise the webhook schema in `conn`. Idempotent.
///
/// `webhook_logs.webhook_id` cascades on delete; the store also deletes logs
/// explicitly so connections opened without `PRAGMA foreign_keys=ON` behave
/// the same.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS webhooks (
            id              TEXT    NOT NULL PRIMARY KEY,
            name            TEXT    NOT NULL,
            url             TEXT    NOT NULL,
            events          TEXT    NOT NULL DEFAULT '[]',  -- JSON array of event names
            status          TEXT    NOT NULL DEFAULT 'active',
            secret          TEXT    NOT NULL,
            success_count   INTEGER NOT NULL DEFAULT 0,
            failure_count   INTEGER NOT NULL DEFAULT 0,
            last_triggered  TEXT,
            created_at      TEXT    NOT NULL,
            updated_at      TEXT    NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS webhook_logs (
            id              TEXT    NOT NULL PRIMARY KEY,
            webhook_id      TEXT    NOT NULL REFERENCES webhooks(id) ON DELETE CASCADE,
            timestamp       TEXT    NOT NULL,
            event_name      TEXT    NOT NULL,
            http_status     INTEGER,            -- NULL when no response arrived
            success         INTEGER NOT NULL,
            response_body   TEXT,
            error           TEXT,
            duration_ms     INTEGER NOT NULL DEFAULT 0
        ) STRICT;

        -- History view: newest first per webhook.
        CREATE INDEX IF NOT EXISTS idx_webhook_logs_webhook
            ON webhook_logs (webhook_id, timestamp);
        -- Retention purge scans by age.
        CREATE INDEX IF NOT EXISTS idx_webhook_logs_timestamp
            ON webhook_logs (timestamp);
        ",
    )?;
    Ok(())
}
