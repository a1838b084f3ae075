//! SQLite store for events, actions, audit entries, recommendations,
//! settings and the whitelist.
//!
//! Schema:
//! - events: one row per analyzer event
//! - actions: one row per dispatched action, `extra` as JSON
//! - audit_log: action id -> affected resource + status
//! - recommendations: advisory follow-ups, pending until applied/dismissed
//! - settings: key/value strings read once per cycle
//! - whitelist: names authorized for destructive remediation

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use vigil_common::{
    default_settings, is_valid_name, Action, ActionExtra, AuditEntry, Event, Recommendation,
    RecommendationStatus, SafetyVeto, TargetKind, VigilError, VigilResult, Whitelist,
};

// ============================================================================
// Interfaces
// ============================================================================

pub trait SettingsProvider: Send + Sync {
    fn get_settings(&self) -> VigilResult<HashMap<String, String>>;
    fn update_setting(&self, key: &str, value: &str) -> VigilResult<()>;
}

pub trait AuditSink: Send + Sync {
    fn log_event(&self, event: &Event) -> VigilResult<i64>;
    fn log_action(&self, action: &Action, extra: &ActionExtra) -> VigilResult<i64>;
    fn log_audit(&self, entry: &AuditEntry) -> VigilResult<()>;
    fn create_recommendation(&self, recommendation: &Recommendation) -> VigilResult<i64>;
    fn get_whitelist(&self) -> VigilResult<Whitelist>;
}

/// Everything the engine needs from storage
pub trait Store: SettingsProvider + AuditSink {
    fn get_action(&self, id: i64) -> VigilResult<Option<(Action, ActionExtra)>>;
}

// ============================================================================
// SQLite implementation
// ============================================================================

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    type TEXT NOT NULL,
    severity TEXT NOT NULL,
    description TEXT NOT NULL,
    metric_value REAL NOT NULL,
    threshold REAL NOT NULL,
    target TEXT
);

CREATE TABLE IF NOT EXISTS actions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    type TEXT NOT NULL,
    status TEXT NOT NULL,
    output TEXT NOT NULL,
    duration_ms INTEGER NOT NULL,
    event_id INTEGER,
    extra TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    action_id INTEGER NOT NULL,
    affected_resources TEXT NOT NULL,
    status TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS recommendations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    event_id INTEGER,
    category TEXT NOT NULL,
    recommendation_text TEXT NOT NULL,
    action_type TEXT NOT NULL,
    priority TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    applied_at TEXT
);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS whitelist (
    name TEXT PRIMARY KEY,
    added_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);
CREATE INDEX IF NOT EXISTS idx_actions_timestamp ON actions(timestamp);
CREATE INDEX IF NOT EXISTS idx_recommendations_status ON recommendations(status);
"#;

fn db_err(e: rusqlite::Error) -> VigilError {
    VigilError::Store(e.to_string())
}

/// Parse a text column through `FromStr`, surfacing failures as conversion errors
fn parse_column<T>(idx: usize, raw: String) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.parse().map_err(|e: T::Err| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.to_string().into())
    })
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn open(path: impl AsRef<Path>) -> VigilResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").map_err(db_err)?;
        let store = Self::init(conn)?;
        info!("Opened store at {}", path.display());
        Ok(store)
    }

    /// Private in-memory database (for tests and one-shot checks)
    pub fn open_in_memory() -> VigilResult<Self> {
        Self::init(Connection::open_in_memory().map_err(db_err)?)
    }

    fn init(conn: Connection) -> VigilResult<Self> {
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        for (key, value) in default_settings() {
            conn.execute(
                "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(db_err)?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> VigilResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| VigilError::Store("connection lock poisoned".to_string()))
    }

    /// Returns false when the name was already present
    pub fn add_to_whitelist(&self, name: &str) -> VigilResult<bool> {
        if !is_valid_name(name) {
            return Err(SafetyVeto::InvalidName {
                kind: TargetKind::Process,
                name: name.to_string(),
            }
            .into());
        }
        let inserted = self
            .conn()?
            .execute(
                "INSERT OR IGNORE INTO whitelist (name, added_at) VALUES (?1, ?2)",
                params![name.trim(), Utc::now()],
            )
            .map_err(db_err)?;
        Ok(inserted > 0)
    }

    /// Returns false when the name was not present
    pub fn remove_from_whitelist(&self, name: &str) -> VigilResult<bool> {
        let removed = self
            .conn()?
            .execute("DELETE FROM whitelist WHERE name = ?1", params![name.trim()])
            .map_err(db_err)?;
        Ok(removed > 0)
    }

    /// Newest first
    pub fn recent_events(&self, limit: usize) -> VigilResult<Vec<Event>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, timestamp, type, severity, description, metric_value, threshold, target
                 FROM events ORDER BY id DESC LIMIT ?1",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(Event {
                    id: Some(row.get(0)?),
                    timestamp: row.get(1)?,
                    event_type: parse_column(2, row.get(2)?)?,
                    severity: parse_column(3, row.get(3)?)?,
                    description: row.get(4)?,
                    metric_value: row.get(5)?,
                    threshold: row.get(6)?,
                    target: row.get(7)?,
                })
            })
            .map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    /// Newest first
    pub fn recent_actions(&self, limit: usize) -> VigilResult<Vec<Action>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, timestamp, type, status, output, duration_ms, event_id
                 FROM actions ORDER BY id DESC LIMIT ?1",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![limit as i64], action_from_row)
            .map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    /// Newest first, optionally only those still pending
    pub fn recommendations(&self, limit: usize, pending_only: bool) -> VigilResult<Vec<Recommendation>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, timestamp, event_id, category, recommendation_text, action_type,
                        priority, status, applied_at
                 FROM recommendations
                 WHERE (?1 = 0 OR status = 'pending')
                 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![pending_only, limit as i64], |row| {
                Ok(Recommendation {
                    id: Some(row.get(0)?),
                    timestamp: row.get(1)?,
                    event_id: row.get(2)?,
                    category: parse_column(3, row.get(3)?)?,
                    recommendation_text: row.get(4)?,
                    action_type: parse_column(5, row.get(5)?)?,
                    priority: parse_column(6, row.get(6)?)?,
                    status: parse_column(7, row.get(7)?)?,
                    applied_at: row.get(8)?,
                })
            })
            .map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    /// `applied_at` is stamped only for `Applied`. Returns false for an unknown id.
    pub fn update_recommendation_status(
        &self,
        id: i64,
        status: RecommendationStatus,
    ) -> VigilResult<bool> {
        let applied_at: Option<DateTime<Utc>> =
            (status == RecommendationStatus::Applied).then(Utc::now);
        let updated = self
            .conn()?
            .execute(
                "UPDATE recommendations SET status = ?1, applied_at = ?2 WHERE id = ?3",
                params![status.as_str(), applied_at, id],
            )
            .map_err(db_err)?;
        Ok(updated > 0)
    }

    /// Audit rows for one action, oldest first
    pub fn audit_for_action(&self, action_id: i64) -> VigilResult<Vec<AuditEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT timestamp, action_id, affected_resources, status
                 FROM audit_log WHERE action_id = ?1 ORDER BY id ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![action_id], |row| {
                Ok(AuditEntry {
                    timestamp: row.get(0)?,
                    action_id: row.get(1)?,
                    affected_resources: row.get(2)?,
                    status: parse_column(3, row.get(3)?)?,
                })
            })
            .map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }
}

fn action_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Action> {
    Ok(Action {
        id: Some(row.get(0)?),
        timestamp: row.get(1)?,
        action_type: row.get(2)?,
        status: parse_column(3, row.get(3)?)?,
        output: row.get(4)?,
        duration_ms: row.get::<_, i64>(5)?.max(0) as u64,
        event_id: row.get(6)?,
    })
}

impl SettingsProvider for SqliteStore {
    fn get_settings(&self) -> VigilResult<HashMap<String, String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT key, value FROM settings")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(db_err)?;
        rows.collect::<Result<HashMap<_, _>, _>>().map_err(db_err)
    }

    fn update_setting(&self, key: &str, value: &str) -> VigilResult<()> {
        self.conn()?
            .execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .map_err(db_err)?;
        debug!("Setting {} = {}", key, value);
        Ok(())
    }
}

impl AuditSink for SqliteStore {
    fn log_event(&self, event: &Event) -> VigilResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO events (timestamp, type, severity, description, metric_value, threshold, target)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.timestamp,
                event.event_type.as_str(),
                event.severity.as_str(),
                event.description,
                event.metric_value,
                event.threshold,
                event.target,
            ],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    fn log_action(&self, action: &Action, extra: &ActionExtra) -> VigilResult<i64> {
        let extra = serde_json::to_string(extra)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO actions (timestamp, type, status, output, duration_ms, event_id, extra)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                action.timestamp,
                action.action_type,
                action.status.as_str(),
                action.output,
                action.duration_ms as i64,
                action.event_id,
                extra,
            ],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    fn log_audit(&self, entry: &AuditEntry) -> VigilResult<()> {
        self.conn()?
            .execute(
                "INSERT INTO audit_log (timestamp, action_id, affected_resources, status)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    entry.timestamp,
                    entry.action_id,
                    entry.affected_resources,
                    entry.status.as_str(),
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn create_recommendation(&self, recommendation: &Recommendation) -> VigilResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO recommendations
                (timestamp, event_id, category, recommendation_text, action_type, priority, status, applied_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                recommendation.timestamp,
                recommendation.event_id,
                recommendation.category.as_str(),
                recommendation.recommendation_text,
                recommendation.action_type.as_str(),
                recommendation.priority.as_str(),
                recommendation.status.as_str(),
                recommendation.applied_at,
            ],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    fn get_whitelist(&self) -> VigilResult<Whitelist> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT name FROM whitelist")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err)?;
        rows.collect::<Result<Whitelist, _>>().map_err(db_err)
    }
}

impl Store for SqliteStore {
    fn get_action(&self, id: i64) -> VigilResult<Option<(Action, ActionExtra)>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, timestamp, type, status, output, duration_ms, event_id, extra
                 FROM actions WHERE id = ?1",
                params![id],
                |row| Ok((action_from_row(row)?, row.get::<_, String>(7)?)),
            )
            .optional()
            .map_err(db_err)?;

        match row {
            Some((action, extra)) => {
                let extra: ActionExtra = serde_json::from_str(&extra)?;
                Ok(Some((action, extra)))
            }
            None => Ok(None),
        }
    }
}
