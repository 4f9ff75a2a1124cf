use rusqlite::Connection;

use crate::error::Result;

/// Initialise the `scheduled_tasks` table in `conn`. Idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS scheduled_tasks (
            id           TEXT    NOT NULL PRIMARY KEY,
            name         TEXT    NOT NULL,
            description  TEXT    NOT NULL DEFAULT '',
            schedule     TEXT    NOT NULL,               -- five-field cron
            kind         TEXT    NOT NULL,               -- backup | email | maintenance | custom
            command      TEXT    NOT NULL DEFAULT '',
            status       TEXT    NOT NULL DEFAULT 'active',
            last_run     TEXT,
            next_run     TEXT,
            last_result  TEXT,                           -- success | failure
            last_error   TEXT,
            run_count    INTEGER NOT NULL DEFAULT 0,
            created_at   TEXT    NOT NULL,
            updated_at   TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_scheduled_tasks_due
            ON scheduled_tasks (status, next_run);
        ",
    )?;
    Ok(())
}
