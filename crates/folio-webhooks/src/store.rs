use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use folio_core::time::{format_ts, now, parse_ts};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    db::init_db,
    error::{Result, WebhookError},
    events::WebhookEvent,
    signing::generate_secret,
    types::{NewWebhook, Webhook, WebhookLog, WebhookStatus},
};

const WEBHOOK_COLUMNS: &str = "id, name, url, events, status, secret, success_count,
     failure_count, last_triggered, created_at, updated_at";

const LOG_COLUMNS: &str = "id, webhook_id, timestamp, event_name, http_status, success,
     response_body, error, duration_ms";

/// SQLite-backed registry of webhooks and their delivery history.
///
/// Owns its own connection so HTTP handlers and the dispatcher never contend
/// with the scheduler's connection. The lock is only held for the duration
/// of a statement, never across network I/O.
pub struct WebhookStore {
    conn: Mutex<Connection>,
}

impl WebhookStore {
    /// Wrap `conn`, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("webhook store mutex poisoned")
    }

    /// Validate admin input and persist a new webhook with a fresh secret.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub fn create(&self, input: NewWebhook) -> Result<Webhook> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(WebhookError::Validation("name is required".into()));
        }
        let url = validate_url(&input.url)?;
        let events = parse_events(&input.events)?;
        let status = match input.status.as_deref() {
            None | Some("") => WebhookStatus::Active,
            Some(s) => s.parse().map_err(WebhookError::Validation)?,
        };

        let now = now();
        let webhook = Webhook {
            id: Uuid::new_v4().to_string(),
            name,
            url,
            events,
            status,
            secret: generate_secret(),
            success_count: 0,
            failure_count: 0,
            last_triggered: None,
            created_at: now,
            updated_at: now,
        };

        let events_json = serde_json::to_string(&webhook.events)
            .map_err(|e| WebhookError::Validation(e.to_string()))?;
        let now_str = format_ts(now);
        self.conn().execute(
            "INSERT INTO webhooks
             (id, name, url, events, status, secret, success_count, failure_count,
              last_triggered, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,0,0,NULL,?7,?7)",
            params![
                webhook.id,
                webhook.name,
                webhook.url,
                events_json,
                webhook.status.to_string(),
                webhook.secret,
                now_str
            ],
        )?;

        info!(webhook_id = %webhook.id, url = %webhook.url, "webhook created");
        Ok(webhook)
    }

    pub fn get(&self, id: &str) -> Result<Webhook> {
        self.conn()
            .query_row(
                &format!("SELECT {WEBHOOK_COLUMNS} FROM webhooks WHERE id = ?1"),
                [id],
                row_to_webhook,
            )
            .optional()?
            .ok_or_else(|| WebhookError::NotFound { id: id.to_string() })
    }

    /// All webhooks ordered by creation time.
    pub fn list(&self) -> Result<Vec<Webhook>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {WEBHOOK_COLUMNS} FROM webhooks ORDER BY created_at, id"
        ))?;
        let rows = stmt.query_map([], row_to_webhook)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Active webhooks subscribed to `event`: the dispatch fan-out set.
    pub fn active_subscribers(&self, event: WebhookEvent) -> Result<Vec<Webhook>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {WEBHOOK_COLUMNS} FROM webhooks WHERE status = 'active' ORDER BY created_at, id"
        ))?;
        let rows = stmt.query_map([], row_to_webhook)?;
        Ok(rows
            .filter_map(|r| r.ok())
            .filter(|w| w.subscribes_to(event))
            .collect())
    }

    /// Flip active/inactive and return the updated record.
    pub fn toggle(&self, id: &str) -> Result<Webhook> {
        let current = self.get(id)?;
        let next = current.status.toggled();
        self.conn().execute(
            "UPDATE webhooks SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![next.to_string(), format_ts(now()), id],
        )?;
        info!(webhook_id = %id, status = %next, "webhook toggled");
        self.get(id)
    }

    /// Replace the signing secret. Deliveries from now on are signed with the
    /// new value only.
    pub fn regenerate_secret(&self, id: &str) -> Result<Webhook> {
        let n = self.conn().execute(
            "UPDATE webhooks SET secret = ?1, updated_at = ?2 WHERE id = ?3",
            params![generate_secret(), format_ts(now()), id],
        )?;
        if n == 0 {
            return Err(WebhookError::NotFound { id: id.to_string() });
        }
        info!(webhook_id = %id, "webhook secret regenerated");
        self.get(id)
    }

    /// Remove a webhook and its delivery history.
    pub fn delete(&self, id: &str) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM webhook_logs WHERE webhook_id = ?1", [id])?;
        let n = tx.execute("DELETE FROM webhooks WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(WebhookError::NotFound { id: id.to_string() });
        }
        tx.commit()?;
        info!(webhook_id = %id, "webhook deleted");
        Ok(())
    }

    /// Persist the outcome of one completed delivery attempt.
    ///
    /// Appends the log row and bumps exactly one counter in the same
    /// transaction; `last_triggered` only moves on success. If the webhook
    /// was deleted while the request was in flight nothing is written.
    pub fn record_delivery(&self, log: &WebhookLog) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let ts = format_ts(log.timestamp);
        let n = if log.success {
            tx.execute(
                "UPDATE webhooks SET success_count = success_count + 1,
                     last_triggered = ?1
                 WHERE id = ?2",
                params![ts, log.webhook_id],
            )?
        } else {
            tx.execute(
                "UPDATE webhooks SET failure_count = failure_count + 1 WHERE id = ?1",
                params![log.webhook_id],
            )?
        };
        if n == 0 {
            return Err(WebhookError::NotFound {
                id: log.webhook_id.clone(),
            });
        }
        tx.execute(
            &format!("INSERT INTO webhook_logs ({LOG_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)"),
            params![
                log.id,
                log.webhook_id,
                ts,
                log.event_name,
                log.http_status.map(i64::from),
                log.success,
                log.response_body,
                log.error,
                log.duration_ms as i64
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Delivery history for one webhook, newest first.
    pub fn logs(&self, webhook_id: &str, limit: usize) -> Result<Vec<WebhookLog>> {
        // Distinguish "no deliveries yet" from "no such webhook".
        self.get(webhook_id)?;
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {LOG_COLUMNS} FROM webhook_logs
             WHERE webhook_id = ?1
             ORDER BY timestamp DESC, rowid DESC
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![webhook_id, limit as i64], row_to_log)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Manual purge of one webhook's history. Returns the number of rows removed.
    pub fn purge_logs(&self, webhook_id: &str) -> Result<usize> {
        self.get(webhook_id)?;
        let n = self
            .conn()
            .execute("DELETE FROM webhook_logs WHERE webhook_id = ?1", [webhook_id])?;
        info!(webhook_id = %webhook_id, removed = n, "webhook logs purged");
        Ok(n)
    }

    /// Retention purge across all webhooks.
    pub fn purge_logs_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let n = self.conn().execute(
            "DELETE FROM webhook_logs WHERE timestamp < ?1",
            [format_ts(cutoff)],
        )?;
        if n > 0 {
            info!(removed = n, cutoff = %format_ts(cutoff), "old webhook logs purged");
        }
        Ok(n)
    }
}

/// Accept only absolute http(s) URLs with a host.
fn validate_url(raw: &str) -> Result<String> {
    let raw = raw.trim();
    let url = reqwest::Url::parse(raw)
        .map_err(|e| WebhookError::Validation(format!("invalid url: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(WebhookError::Validation(
            "url must use http or https".into(),
        ));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(WebhookError::Validation("url must include a host".into()));
    }
    Ok(url.to_string())
}

/// Map event names onto the catalog, dropping duplicates but keeping the
/// caller's order.
fn parse_events(names: &[String]) -> Result<Vec<WebhookEvent>> {
    let mut seen = BTreeSet::new();
    let mut events = Vec::with_capacity(names.len());
    for name in names {
        let event: WebhookEvent = name.trim().parse().map_err(WebhookError::Validation)?;
        if seen.insert(event.as_str()) {
            events.push(event);
        }
    }
    Ok(events)
}

fn row_to_webhook(row: &rusqlite::Row<'_>) -> rusqlite::Result<Webhook> {
    // Unknown names (e.g. from an older catalog) are dropped rather than
    // failing the whole listing.
    let names: Vec<String> = serde_json::from_str(&row.get::<_, String>(3)?).unwrap_or_default();
    let events = names.iter().filter_map(|n| n.parse().ok()).collect();
    let status = row
        .get::<_, String>(4)?
        .parse()
        .unwrap_or(WebhookStatus::Inactive);
    Ok(Webhook {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        events,
        status,
        secret: row.get(5)?,
        success_count: row.get::<_, i64>(6)? as u64,
        failure_count: row.get::<_, i64>(7)? as u64,
        last_triggered: row
            .get::<_, Option<String>>(8)?
            .as_deref()
            .and_then(parse_ts),
        created_at: parse_ts(&row.get::<_, String>(9)?).unwrap_or_default(),
        updated_at: parse_ts(&row.get::<_, String>(10)?).unwrap_or_default(),
    })
}

fn row_to_log(row: &rusqlite::Row<'_>) -> rusqlite::Result<WebhookLog> {
    Ok(WebhookLog {
        id: row.get(0)?,
        webhook_id: row.get(1)?,
        timestamp: parse_ts(&row.get::<_, String>(2)?).unwrap_or_default(),
        event_name: row.get(3)?,
        http_status: row.get::<_, Option<i64>>(4)?.map(|s| s as u16),
        success: row.get(5)?,
        response_body: row.get(6)?,
        error: row.get(7)?,
        duration_ms: row.get::<_, i64>(8)? as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> WebhookStore {
        WebhookStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    fn input(events: &[&str]) -> NewWebhook {
        NewWebhook {
            name: "Zapier".into(),
            url: "https://hooks.example.com/folio".into(),
            events: events.iter().map(|s| s.to_string()).collect(),
            status: None,
        }
    }

    fn log_for(webhook_id: &str, success: bool) -> WebhookLog {
        WebhookLog {
            id: Uuid::new_v4().to_string(),
            webhook_id: webhook_id.to_string(),
            timestamp: now(),
            event_name: "post.published".into(),
            http_status: success.then_some(200),
            success,
            response_body: None,
            error: (!success).then(|| "connection refused".to_string()),
            duration_ms: 12,
        }
    }

    #[test]
    fn create_defaults_to_active_with_secret() {
        let s = store();
        let w = s.create(input(&["post.published"])).unwrap();
        assert_eq!(w.status, WebhookStatus::Active);
        assert!(w.secret.starts_with("whsec_"));
        assert_eq!(w.success_count, 0);
        assert_eq!(w.failure_count, 0);
        assert!(w.last_triggered.is_none());

        let loaded = s.get(&w.id).unwrap();
        assert_eq!(loaded.events, vec![WebhookEvent::PostPublished]);
        assert_eq!(loaded.secret, w.secret);
    }

    #[test]
    fn create_rejects_bad_input() {
        let s = store();
        let mut bad_url = input(&[]);
        bad_url.url = "ftp://example.com/x".into();
        assert!(matches!(s.create(bad_url), Err(WebhookError::Validation(_))));

        let mut relative = input(&[]);
        relative.url = "/just/a/path".into();
        assert!(matches!(s.create(relative), Err(WebhookError::Validation(_))));

        assert!(matches!(
            s.create(input(&["post.exploded"])),
            Err(WebhookError::Validation(_))
        ));

        let mut unnamed = input(&[]);
        unnamed.name = "   ".into();
        assert!(matches!(s.create(unnamed), Err(WebhookError::Validation(_))));

        let mut bad_status = input(&[]);
        bad_status.status = Some("paused".into());
        assert!(matches!(s.create(bad_status), Err(WebhookError::Validation(_))));
    }

    #[test]
    fn duplicate_events_are_collapsed() {
        let s = store();
        let w = s
            .create(input(&["post.published", "message.created", "post.published"]))
            .unwrap();
        assert_eq!(
            w.events,
            vec![WebhookEvent::PostPublished, WebhookEvent::MessageCreated]
        );
    }

    #[test]
    fn toggle_flips_status() {
        let s = store();
        let w = s.create(input(&[])).unwrap();
        assert_eq!(s.toggle(&w.id).unwrap().status, WebhookStatus::Inactive);
        assert_eq!(s.toggle(&w.id).unwrap().status, WebhookStatus::Active);
        assert!(matches!(s.toggle("missing"), Err(WebhookError::NotFound { .. })));
    }

    #[test]
    fn regenerate_secret_replaces_value() {
        let s = store();
        let w = s.create(input(&[])).unwrap();
        let rotated = s.regenerate_secret(&w.id).unwrap();
        assert_ne!(rotated.secret, w.secret);
        assert!(matches!(
            s.regenerate_secret("missing"),
            Err(WebhookError::NotFound { .. })
        ));
    }

    #[test]
    fn active_subscribers_filters_status_and_event() {
        let s = store();
        let subscribed = s.create(input(&["post.published"])).unwrap();
        let other_event = s.create(input(&["message.created"])).unwrap();
        let inactive = s.create(input(&["post.published"])).unwrap();
        s.toggle(&inactive.id).unwrap();

        let ids: Vec<_> = s
            .active_subscribers(WebhookEvent::PostPublished)
            .unwrap()
            .into_iter()
            .map(|w| w.id)
            .collect();
        assert_eq!(ids, vec![subscribed.id]);
        assert!(!ids.contains(&other_event.id));
    }

    #[test]
    fn record_delivery_updates_exactly_one_counter() {
        let s = store();
        let w = s.create(input(&["post.published"])).unwrap();

        s.record_delivery(&log_for(&w.id, true)).unwrap();
        s.record_delivery(&log_for(&w.id, false)).unwrap();
        s.record_delivery(&log_for(&w.id, false)).unwrap();

        let w = s.get(&w.id).unwrap();
        assert_eq!(w.success_count, 1);
        assert_eq!(w.failure_count, 2);
        assert!(w.last_triggered.is_some());
        assert_eq!(s.logs(&w.id, 50).unwrap().len(), 3);
    }

    #[test]
    fn failed_delivery_does_not_touch_last_triggered() {
        let s = store();
        let w = s.create(input(&[])).unwrap();
        s.record_delivery(&log_for(&w.id, false)).unwrap();
        assert!(s.get(&w.id).unwrap().last_triggered.is_none());
    }

    #[test]
    fn record_delivery_for_deleted_webhook_writes_nothing() {
        let s = store();
        let w = s.create(input(&[])).unwrap();
        s.delete(&w.id).unwrap();
        assert!(s.record_delivery(&log_for(&w.id, true)).is_err());
        let orphans: i64 = s
            .conn()
            .query_row("SELECT COUNT(*) FROM webhook_logs", [], |r| r.get(0))
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn delete_removes_logs() {
        let s = store();
        let w = s.create(input(&[])).unwrap();
        s.record_delivery(&log_for(&w.id, true)).unwrap();
        s.delete(&w.id).unwrap();
        assert!(matches!(s.get(&w.id), Err(WebhookError::NotFound { .. })));
        assert!(matches!(s.logs(&w.id, 10), Err(WebhookError::NotFound { .. })));
        assert!(matches!(s.delete(&w.id), Err(WebhookError::NotFound { .. })));
    }

    #[test]
    fn logs_respect_limit_and_purge() {
        let s = store();
        let w = s.create(input(&[])).unwrap();
        for _ in 0..5 {
            s.record_delivery(&log_for(&w.id, true)).unwrap();
        }
        assert_eq!(s.logs(&w.id, 2).unwrap().len(), 2);
        assert_eq!(s.purge_logs(&w.id).unwrap(), 5);
        assert!(s.logs(&w.id, 10).unwrap().is_empty());
        // Counters are history, not derived from logs.
        assert_eq!(s.get(&w.id).unwrap().success_count, 5);
    }

    #[test]
    fn retention_purge_only_removes_old_rows() {
        let s = store();
        let w = s.create(input(&[])).unwrap();
        let mut old = log_for(&w.id, true);
        old.timestamp = now() - chrono::Duration::days(40);
        s.record_delivery(&old).unwrap();
        s.record_delivery(&log_for(&w.id, true)).unwrap();

        let removed = s
            .purge_logs_before(now() - chrono::Duration::days(30))
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(s.logs(&w.id, 10).unwrap().len(), 1);
    }
}
