//! State Store (C4): the sole writer of Endpoint runtime fields once an
//! endpoint is admitted, and the only component that touches the database.
//!
//! Backed by embedded SQLite through `rusqlite`, a synchronous driver. Every
//! operation runs inside `tokio::task::spawn_blocking` so the async
//! scheduler and Prober never block on file I/O — the same pattern the host
//! project uses to drive its blocking curl-based phase-timing client from
//! async code.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::model::*;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("connection pool error: {0}")]
    Pool(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            other => StoreError::Backend(other.to_string()),
        }
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS endpoints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    method TEXT NOT NULL,
    headers TEXT NOT NULL,
    body TEXT,
    expected_status INTEGER NOT NULL,
    interval_s INTEGER NOT NULL,
    timeout_ms INTEGER NOT NULL,
    max_latency_ms INTEGER,
    credential_id INTEGER,
    enabled INTEGER NOT NULL DEFAULT 1,
    status TEXT NOT NULL DEFAULT 'UNKNOWN',
    last_check_at TEXT,
    next_check_at TEXT,
    consecutive_failures INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS credentials (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    sealed_value TEXT NOT NULL,
    sealed_username TEXT,
    header_name TEXT
);

CREATE TABLE IF NOT EXISTS check_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    endpoint_id INTEGER NOT NULL,
    status_code INTEGER NOT NULL,
    latency_ms INTEGER NOT NULL,
    success INTEGER NOT NULL,
    kind TEXT NOT NULL,
    error_message TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_check_results_endpoint ON check_results(endpoint_id, created_at);

CREATE TABLE IF NOT EXISTS incidents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    endpoint_id INTEGER NOT NULL,
    state TEXT NOT NULL,
    failure_kind TEXT NOT NULL,
    started_at TEXT NOT NULL,
    resolved_at TEXT,
    failed_check_count INTEGER NOT NULL,
    last_error_message TEXT
);
CREATE INDEX IF NOT EXISTS idx_incidents_endpoint_state ON incidents(endpoint_id, state);

CREATE TABLE IF NOT EXISTS alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    endpoint_id INTEGER NOT NULL,
    incident_id INTEGER,
    kind TEXT NOT NULL,
    severity TEXT NOT NULL,
    channel TEXT NOT NULL,
    title TEXT NOT NULL,
    message TEXT NOT NULL,
    delivered INTEGER NOT NULL,
    delivery_error TEXT,
    acknowledged INTEGER NOT NULL DEFAULT 0,
    acknowledged_at TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alerts_endpoint_kind_created ON alerts(endpoint_id, kind, created_at);
"#;

/// Handle shared by every caller; cheap to clone, internally `Arc<Mutex<Connection>>`.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(database_url: &str) -> Result<Self, StoreError> {
        let path = database_url.strip_prefix("sqlite://").unwrap_or(database_url);
        let conn = if path == ":memory:" || database_url == "sqlite::memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StoreError::Pool("poisoned".into()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?
    }

    // ---- configuration provider surface (minimal; admin surface is out of scope) ----

    pub async fn register_endpoint(&self, e: NewEndpoint) -> Result<EndpointId, StoreError> {
        crate::config::Config::validate_endpoint_bounds(e.interval_s, e.timeout_ms)
            .map_err(|err| StoreError::Conflict(err.to_string()))?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO endpoints (project_id, name, url, method, headers, body, expected_status, interval_s, timeout_ms, max_latency_ms, credential_id, enabled, status, next_check_at, consecutive_failures)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 'UNKNOWN', ?13, 0)",
                params![
                    e.project_id, e.name, e.url, e.method.as_str(), e.headers.to_string(), e.body,
                    e.expected_status, e.interval_s, e.timeout_ms, e.max_latency_ms, e.credential_id,
                    e.enabled as i64, Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn register_credential(&self, c: NewCredential) -> Result<CredentialId, StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO credentials (project_id, name, kind, sealed_value, sealed_username, header_name) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![c.project_id, c.name, kind_str(c.kind), c.sealed_value, c.sealed_username, c.header_name],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Full replace of an endpoint's configuration fields. Runtime fields
    /// (status, last/next_check_at, consecutive_failures) are untouched —
    /// those belong to the State Store alone, not the configuration
    /// provider.
    pub async fn update_endpoint(&self, id: EndpointId, e: NewEndpoint) -> Result<(), StoreError> {
        crate::config::Config::validate_endpoint_bounds(e.interval_s, e.timeout_ms)
            .map_err(|err| StoreError::Conflict(err.to_string()))?;
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE endpoints SET project_id = ?1, name = ?2, url = ?3, method = ?4, headers = ?5, body = ?6, expected_status = ?7, interval_s = ?8, timeout_ms = ?9, max_latency_ms = ?10, credential_id = ?11, enabled = ?12 WHERE id = ?13",
                params![
                    e.project_id, e.name, e.url, e.method.as_str(), e.headers.to_string(), e.body,
                    e.expected_status, e.interval_s, e.timeout_ms, e.max_latency_ms, e.credential_id,
                    e.enabled as i64, id,
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }

    pub async fn toggle_endpoint(&self, id: EndpointId, enabled: bool) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE endpoints SET enabled = ?1 WHERE id = ?2",
                params![enabled as i64, id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn delete_endpoint(&self, id: EndpointId) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM check_results WHERE endpoint_id = ?1", params![id])?;
            conn.execute("DELETE FROM incidents WHERE endpoint_id = ?1", params![id])?;
            conn.execute("DELETE FROM alerts WHERE endpoint_id = ?1", params![id])?;
            conn.execute("DELETE FROM endpoints WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
    }

    /// Deletes a credential, enforcing the invariant that a credential
    /// referenced by at least one endpoint cannot be deleted.
    pub async fn delete_credential(&self, id: CredentialId) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            let in_use: i64 = conn.query_row(
                "SELECT COUNT(*) FROM endpoints WHERE credential_id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            if in_use > 0 {
                return Err(StoreError::Conflict(format!(
                    "credential {} is referenced by {} endpoint(s)",
                    id, in_use
                )));
            }
            let changed = conn.execute("DELETE FROM credentials WHERE id = ?1", params![id])?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }

    pub async fn get_credential(&self, id: CredentialId) -> Result<Credential, StoreError> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, project_id, name, kind, sealed_value, sealed_username, header_name FROM credentials WHERE id = ?1",
                params![id],
                row_to_credential,
            )
            .map_err(StoreError::from)
        })
        .await
    }

    // ---- reads ----

    pub async fn due_endpoints(&self, now: DateTime<Utc>) -> Result<Vec<Endpoint>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, project_id, name, url, method, headers, body, expected_status, interval_s, timeout_ms, max_latency_ms, credential_id, enabled, status, last_check_at, next_check_at, consecutive_failures
                 FROM endpoints WHERE enabled = 1 AND (next_check_at IS NULL OR next_check_at <= ?1)
                 ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map(params![now.to_rfc3339()], row_to_endpoint)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn latest_result(&self, endpoint_id: EndpointId) -> Result<Option<CheckResult>, StoreError> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, endpoint_id, status_code, latency_ms, success, kind, error_message, created_at
                 FROM check_results WHERE endpoint_id = ?1 ORDER BY id DESC LIMIT 1",
                params![endpoint_id],
                row_to_check_result,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    pub async fn uptime_pct(&self, endpoint_id: EndpointId, since: DateTime<Utc>) -> Result<f64, StoreError> {
        self.with_conn(move |conn| {
            let (total, successes): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), SUM(success) FROM check_results WHERE endpoint_id = ?1 AND created_at >= ?2",
                params![endpoint_id, since.to_rfc3339()],
                |row| Ok((row.get(0)?, row.get::<_, Option<i64>>(1)?.unwrap_or(0))),
            )?;
            Ok(if total == 0 { 100.0 } else { successes as f64 / total as f64 * 100.0 })
        })
        .await
    }

    pub async fn avg_latency(&self, endpoint_id: EndpointId, since: DateTime<Utc>) -> Result<f64, StoreError> {
        self.with_conn(move |conn| {
            let avg: Option<f64> = conn.query_row(
                "SELECT AVG(latency_ms) FROM check_results WHERE endpoint_id = ?1 AND created_at >= ?2",
                params![endpoint_id, since.to_rfc3339()],
                |row| row.get(0),
            )?;
            Ok(avg.unwrap_or(0.0))
        })
        .await
    }

    pub async fn failure_breakdown(
        &self,
        endpoint_id: EndpointId,
        since: DateTime<Utc>,
    ) -> Result<Vec<(String, i64)>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT kind, COUNT(*) FROM check_results WHERE endpoint_id = ?1 AND created_at >= ?2 AND success = 0 GROUP BY kind",
            )?;
            let rows = stmt
                .query_map(params![endpoint_id, since.to_rfc3339()], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn last_failure_at(&self, endpoint_id: EndpointId) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.with_conn(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT created_at FROM check_results WHERE endpoint_id = ?1 AND success = 0 ORDER BY id DESC LIMIT 1",
                    params![endpoint_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(raw.map(|s| parse_ts(&s)))
        })
        .await
    }

    pub async fn open_incident(&self, endpoint_id: EndpointId) -> Result<Option<Incident>, StoreError> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, endpoint_id, state, failure_kind, started_at, resolved_at, failed_check_count, last_error_message
                 FROM incidents WHERE endpoint_id = ?1 AND state != 'RESOLVED'",
                params![endpoint_id],
                row_to_incident,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    // ---- writes ----

    pub async fn append_check_result(&self, r: NewCheckResult) -> Result<i64, StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO check_results (endpoint_id, status_code, latency_ms, success, kind, error_message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    r.endpoint_id, r.status_code, r.latency_ms, r.success as i64,
                    kind_to_str(r.kind), r.error_message, r.created_at.to_rfc3339(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn update_endpoint_check_status(
        &self,
        id: EndpointId,
        status: EndpointStatus,
        last_check_at: DateTime<Utc>,
        next_check_at: DateTime<Utc>,
        consecutive_failures: i64,
    ) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE endpoints SET status = ?1, last_check_at = ?2, next_check_at = ?3, consecutive_failures = ?4 WHERE id = ?5",
                params![
                    status_to_str(status), last_check_at.to_rfc3339(), next_check_at.to_rfc3339(),
                    consecutive_failures, id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Atomic find-or-create: opens a new incident only if no non-RESOLVED
    /// incident exists for the endpoint. Runs inside one transaction.
    pub async fn open_or_grow_incident(
        &self,
        endpoint_id: EndpointId,
        kind: ResultKind,
        error_message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Incident, StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM incidents WHERE endpoint_id = ?1 AND state != 'RESOLVED'",
                    params![endpoint_id],
                    |row| row.get(0),
                )
                .optional()?;

            let incident_id = if let Some(id) = existing {
                tx.execute(
                    "UPDATE incidents SET failed_check_count = failed_check_count + 1, last_error_message = ?1 WHERE id = ?2",
                    params![error_message, id],
                )?;
                id
            } else {
                tx.execute(
                    "INSERT INTO incidents (endpoint_id, state, failure_kind, started_at, failed_check_count, last_error_message)
                     VALUES (?1, 'OPEN', ?2, ?3, 1, ?4)",
                    params![endpoint_id, kind_to_str(kind), now.to_rfc3339(), error_message],
                )?;
                tx.last_insert_rowid()
            };

            let incident = tx.query_row(
                "SELECT id, endpoint_id, state, failure_kind, started_at, resolved_at, failed_check_count, last_error_message FROM incidents WHERE id = ?1",
                params![incident_id],
                row_to_incident,
            )?;
            tx.commit()?;
            Ok(incident)
        })
        .await
    }

    /// Resolves the endpoint's open incident, if any. Returns whether a
    /// resolution actually happened (i.e. there was something to resolve).
    pub async fn resolve_open_incident(
        &self,
        endpoint_id: EndpointId,
        now: DateTime<Utc>,
    ) -> Result<Option<IncidentId>, StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM incidents WHERE endpoint_id = ?1 AND state != 'RESOLVED'",
                    params![endpoint_id],
                    |row| row.get(0),
                )
                .optional()?;

            let result = if let Some(id) = existing {
                tx.execute(
                    "UPDATE incidents SET state = 'RESOLVED', resolved_at = ?1 WHERE id = ?2",
                    params![now.to_rfc3339(), id],
                )?;
                Some(id)
            } else {
                None
            };
            tx.commit()?;
            Ok(result)
        })
        .await
    }

    pub async fn alerts_since(
        &self,
        endpoint_id: EndpointId,
        kind: AlertKind,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM alerts WHERE endpoint_id = ?1 AND kind = ?2 AND created_at >= ?3",
                params![endpoint_id, alert_kind_to_str(kind), since.to_rfc3339()],
                |row| row.get(0),
            )?;
            Ok(count)
        })
        .await
    }

    pub async fn create_alert(&self, a: NewAlert) -> Result<AlertId, StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO alerts (endpoint_id, incident_id, kind, severity, channel, title, message, delivered, delivery_error, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, NULL, ?8)",
                params![
                    a.endpoint_id, a.incident_id, alert_kind_to_str(a.kind), severity_to_str(a.severity),
                    channel_to_str(a.channel), a.title, a.message, a.created_at.to_rfc3339(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn mark_alert_delivered(&self, id: AlertId, error: Option<String>) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE alerts SET delivered = ?1, delivery_error = ?2 WHERE id = ?3",
                params![error.is_none() as i64, error, id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn acknowledge_alert(&self, id: AlertId, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE alerts SET acknowledged = 1, acknowledged_at = ?1 WHERE id = ?2",
                params![now.to_rfc3339(), id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn acknowledge_all(&self, endpoint_id: EndpointId, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE alerts SET acknowledged = 1, acknowledged_at = ?1 WHERE endpoint_id = ?2 AND acknowledged = 0",
                params![now.to_rfc3339(), endpoint_id],
            )?;
            Ok(())
        })
        .await
    }

    /// Deletes check results older than `results_horizon` and alerts older
    /// than `alerts_horizon`. The caller (retention sweeper) is responsible
    /// for picking the stricter of the absolute cap and any per-plan cap.
    pub async fn retention_sweep(
        &self,
        results_horizon: DateTime<Utc>,
        alerts_horizon: DateTime<Utc>,
    ) -> Result<(u64, u64), StoreError> {
        self.with_conn(move |conn| {
            let deleted_results = conn.execute(
                "DELETE FROM check_results WHERE created_at < ?1",
                params![results_horizon.to_rfc3339()],
            )?;
            let deleted_alerts = conn.execute(
                "DELETE FROM alerts WHERE created_at < ?1",
                params![alerts_horizon.to_rfc3339()],
            )?;
            Ok((deleted_results as u64, deleted_alerts as u64))
        })
        .await
    }

    /// Deletes only check results older than `horizon`, leaving alerts
    /// untouched — used by the per-plan sweep, which has no alert policy.
    pub async fn sweep_check_results_only(&self, horizon: DateTime<Utc>) -> Result<u64, StoreError> {
        self.with_conn(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM check_results WHERE created_at < ?1",
                params![horizon.to_rfc3339()],
            )?;
            Ok(deleted as u64)
        })
        .await
    }
}

pub struct NewEndpoint {
    pub project_id: i64,
    pub name: String,
    pub url: String,
    pub method: HttpMethod,
    pub headers: serde_json::Value,
    pub body: Option<String>,
    pub expected_status: u16,
    pub interval_s: i64,
    pub timeout_ms: i64,
    pub max_latency_ms: Option<i64>,
    pub credential_id: Option<CredentialId>,
    pub enabled: bool,
}

pub struct NewCredential {
    pub project_id: i64,
    pub name: String,
    pub kind: CredentialType,
    pub sealed_value: String,
    pub sealed_username: Option<String>,
    pub header_name: Option<String>,
}

pub struct NewCheckResult {
    pub endpoint_id: EndpointId,
    pub status_code: u16,
    pub latency_ms: i64,
    pub success: bool,
    pub kind: ResultKind,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub struct NewAlert {
    pub endpoint_id: EndpointId,
    pub incident_id: Option<IncidentId>,
    pub kind: AlertKind,
    pub severity: Severity,
    pub channel: Channel,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc.timestamp_opt(0, 0).unwrap())
}

fn row_to_endpoint(row: &rusqlite::Row) -> rusqlite::Result<Endpoint> {
    let method: String = row.get(4)?;
    let headers_raw: String = row.get(5)?;
    let status: String = row.get(13)?;
    let last_check_at: Option<String> = row.get(14)?;
    let next_check_at: Option<String> = row.get(15)?;
    Ok(Endpoint {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        url: row.get(3)?,
        method: method_from_str(&method),
        headers: serde_json::from_str(&headers_raw).unwrap_or(serde_json::Value::Null),
        body: row.get(6)?,
        expected_status: row.get::<_, i64>(7)? as u16,
        interval_s: row.get(8)?,
        timeout_ms: row.get(9)?,
        max_latency_ms: row.get(10)?,
        credential_id: row.get(11)?,
        enabled: row.get::<_, i64>(12)? != 0,
        status: status_from_str(&status),
        last_check_at: last_check_at.map(|s| parse_ts(&s)),
        next_check_at: next_check_at.map(|s| parse_ts(&s)),
        consecutive_failures: row.get(16)?,
    })
}

fn row_to_credential(row: &rusqlite::Row) -> rusqlite::Result<Credential> {
    let kind: String = row.get(3)?;
    Ok(Credential {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        kind: kind_from_str(&kind),
        sealed_value: row.get(4)?,
        sealed_username: row.get(5)?,
        header_name: row.get(6)?,
    })
}

fn row_to_check_result(row: &rusqlite::Row) -> rusqlite::Result<CheckResult> {
    let kind: String = row.get(5)?;
    let created_at: String = row.get(7)?;
    Ok(CheckResult {
        id: row.get(0)?,
        endpoint_id: row.get(1)?,
        status_code: row.get::<_, i64>(2)? as u16,
        latency_ms: row.get(3)?,
        success: row.get::<_, i64>(4)? != 0,
        kind: kind_from_str(&kind),
        error_message: row.get(6)?,
        created_at: parse_ts(&created_at),
    })
}

fn row_to_incident(row: &rusqlite::Row) -> rusqlite::Result<Incident> {
    let state: String = row.get(2)?;
    let kind: String = row.get(3)?;
    let started_at: String = row.get(4)?;
    let resolved_at: Option<String> = row.get(5)?;
    Ok(Incident {
        id: row.get(0)?,
        endpoint_id: row.get(1)?,
        state: incident_state_from_str(&state),
        failure_kind: kind_from_str(&kind),
        started_at: parse_ts(&started_at),
        resolved_at: resolved_at.map(|s| parse_ts(&s)),
        failed_check_count: row.get(6)?,
        last_error_message: row.get(7)?,
    })
}

fn method_from_str(s: &str) -> HttpMethod {
    match s {
        "POST" => HttpMethod::POST,
        "PUT" => HttpMethod::PUT,
        "DELETE" => HttpMethod::DELETE,
        "PATCH" => HttpMethod::PATCH,
        "HEAD" => HttpMethod::HEAD,
        _ => HttpMethod::GET,
    }
}

fn status_to_str(s: EndpointStatus) -> &'static str {
    match s {
        EndpointStatus::UNKNOWN => "UNKNOWN",
        EndpointStatus::UP => "UP",
        EndpointStatus::DOWN => "DOWN",
        EndpointStatus::DEGRADED => "DEGRADED",
    }
}

fn status_from_str(s: &str) -> EndpointStatus {
    match s {
        "UP" => EndpointStatus::UP,
        "DOWN" => EndpointStatus::DOWN,
        "DEGRADED" => EndpointStatus::DEGRADED,
        _ => EndpointStatus::UNKNOWN,
    }
}

fn kind_str(k: CredentialType) -> &'static str {
    match k {
        CredentialType::BearerToken => "BEARER_TOKEN",
        CredentialType::ApiKey => "API_KEY",
        CredentialType::BasicAuth => "BASIC_AUTH",
    }
}

fn kind_from_str(s: &str) -> CredentialType {
    match s {
        "API_KEY" => CredentialType::ApiKey,
        "BASIC_AUTH" => CredentialType::BasicAuth,
        _ => CredentialType::BearerToken,
    }
}

fn kind_to_str(k: ResultKind) -> &'static str {
    match k {
        ResultKind::Timeout => "TIMEOUT",
        ResultKind::SslError => "SSL_ERROR",
        ResultKind::ConnectionError => "CONNECTION_ERROR",
        ResultKind::UnknownError => "UNKNOWN_ERROR",
        ResultKind::AuthFailure => "AUTH_FAILURE",
        ResultKind::ServerError => "SERVER_ERROR",
        ResultKind::StatusMismatch => "STATUS_MISMATCH",
        ResultKind::LatencyBreach => "LATENCY_BREACH",
        ResultKind::Success => "SUCCESS",
    }
}

fn incident_state_from_str(s: &str) -> IncidentState {
    match s {
        "ACKNOWLEDGED" => IncidentState::Acknowledged,
        "RESOLVED" => IncidentState::Resolved,
        _ => IncidentState::Open,
    }
}

fn alert_kind_to_str(k: AlertKind) -> &'static str {
    match k {
        AlertKind::EndpointDown => "ENDPOINT_DOWN",
        AlertKind::Timeout => "TIMEOUT",
        AlertKind::SslError => "SSL_ERROR",
        AlertKind::ConnectionError => "CONNECTION_ERROR",
        AlertKind::AuthFailure => "AUTH_FAILURE",
        AlertKind::ServerError => "SERVER_ERROR",
        AlertKind::StatusMismatch => "STATUS_MISMATCH",
        AlertKind::LatencyBreach => "LATENCY_BREACH",
        AlertKind::UnknownError => "UNKNOWN_ERROR",
        AlertKind::EndpointRecovered => "ENDPOINT_RECOVERED",
    }
}

fn severity_to_str(s: Severity) -> &'static str {
    match s {
        Severity::Info => "INFO",
        Severity::Warning => "WARNING",
        Severity::Error => "ERROR",
        Severity::Critical => "CRITICAL",
    }
}

fn channel_to_str(c: Channel) -> &'static str {
    match c {
        Channel::Email => "EMAIL",
        Channel::Slack => "SLACK",
        Channel::Webhook => "WEBHOOK",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> Store {
        Store::open("sqlite::memory:").unwrap()
    }

    fn new_endpoint() -> NewEndpoint {
        NewEndpoint {
            project_id: 1,
            name: "test".to_string(),
            url: "https://example.invalid".to_string(),
            method: HttpMethod::GET,
            headers: serde_json::Value::Null,
            body: None,
            expected_status: 200,
            interval_s: 60,
            timeout_ms: 5000,
            max_latency_ms: None,
            credential_id: None,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn due_endpoints_returns_newly_registered_endpoint() {
        let store = memory_store().await;
        store.register_endpoint(new_endpoint()).await.unwrap();
        let due = store.due_endpoints(Utc::now()).await.unwrap();
        assert_eq!(due.len(), 1);
    }

    #[tokio::test]
    async fn disabled_endpoint_is_never_due() {
        let store = memory_store().await;
        let mut e = new_endpoint();
        e.enabled = false;
        store.register_endpoint(e).await.unwrap();
        let due = store.due_endpoints(Utc::now()).await.unwrap();
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn open_or_grow_incident_creates_then_grows() {
        let store = memory_store().await;
        let id = store.register_endpoint(new_endpoint()).await.unwrap();
        let now = Utc::now();
        let first = store
            .open_or_grow_incident(id, ResultKind::ServerError, Some("boom".into()), now)
            .await
            .unwrap();
        assert_eq!(first.failed_check_count, 1);

        let second = store
            .open_or_grow_incident(id, ResultKind::ServerError, Some("boom again".into()), now)
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.failed_check_count, 2);
    }

    #[tokio::test]
    async fn update_endpoint_replaces_configuration_fields() {
        let store = memory_store().await;
        let id = store.register_endpoint(new_endpoint()).await.unwrap();

        let mut updated = new_endpoint();
        updated.name = "renamed".to_string();
        updated.interval_s = 120;
        store.update_endpoint(id, updated).await.unwrap();

        let fetched = store
            .due_endpoints(Utc::now())
            .await
            .unwrap()
            .into_iter()
            .find(|e| e.id == id)
            .unwrap();
        assert_eq!(fetched.name, "renamed");
        assert_eq!(fetched.interval_s, 120);
    }

    #[tokio::test]
    async fn update_endpoint_rejects_out_of_bounds_interval() {
        let store = memory_store().await;
        let id = store.register_endpoint(new_endpoint()).await.unwrap();
        let mut updated = new_endpoint();
        updated.interval_s = 5;
        assert!(store.update_endpoint(id, updated).await.is_err());
    }

    #[tokio::test]
    async fn delete_credential_in_use_is_rejected() {
        let store = memory_store().await;
        let credential_id = store
            .register_credential(NewCredential {
                project_id: 1,
                name: "token".to_string(),
                kind: CredentialType::BearerToken,
                sealed_value: "sealed".to_string(),
                sealed_username: None,
                header_name: None,
            })
            .await
            .unwrap();
        let mut e = new_endpoint();
        e.credential_id = Some(credential_id);
        store.register_endpoint(e).await.unwrap();

        assert!(matches!(
            store.delete_credential(credential_id).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn delete_credential_unreferenced_succeeds() {
        let store = memory_store().await;
        let credential_id = store
            .register_credential(NewCredential {
                project_id: 1,
                name: "token".to_string(),
                kind: CredentialType::BearerToken,
                sealed_value: "sealed".to_string(),
                sealed_username: None,
                header_name: None,
            })
            .await
            .unwrap();
        store.delete_credential(credential_id).await.unwrap();
        assert!(store.get_credential(credential_id).await.is_err());
    }

    #[tokio::test]
    async fn resolve_open_incident_is_idempotent() {
        let store = memory_store().await;
        let id = store.register_endpoint(new_endpoint()).await.unwrap();
        let now = Utc::now();
        store
            .open_or_grow_incident(id, ResultKind::ServerError, None, now)
            .await
            .unwrap();
        let resolved = store.resolve_open_incident(id, now).await.unwrap();
        assert!(resolved.is_some());
        let resolved_again = store.resolve_open_incident(id, now).await.unwrap();
        assert!(resolved_again.is_none());
    }
}
