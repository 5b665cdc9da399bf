//! SQLite persistence layer.
//!
//! RULE: Only store.rs talks to the database.
//! Components call store methods, never SQL directly.
//!
//! The contract with the host is key-value: one `kv` table keyed by the
//! documented key names, values JSON. Bounded lists (fraud audit log,
//! security issues) are stored whole and truncated FIFO on append. The
//! activity log is the one real table, because the behavior and pattern
//! detectors need windowed count queries over it.

use crate::{
    behavior::BehaviorPattern,
    error::EngineResult,
    event::SecurityIssue,
    fingerprint::DeviceFingerprint,
    geofence::GeofenceArea,
    location::LocationPoint,
    scorer::{ActivityKind, FraudCheckResult},
    types::{AgentId, GeofenceId},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

const KEY_DEVICE_FINGERPRINT: &str = "deviceFingerprint";
const KEY_FRAUD_LOGS: &str = "fraudLogs";
const KEY_SECURITY_ISSUES: &str = "securityIssues";
const KEY_LOCATION_HISTORY: &str = "locationHistory";
const KEY_GEOFENCES: &str = "geofences";

pub struct TelemetryStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file or URI
}

impl TelemetryStore {
    pub fn open(path: &str) -> EngineResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only works for real files (in-memory databases ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an isolated in-memory database (used in unit tests).
    pub fn in_memory() -> EngineResult<Self> {
        let conn = Connection::open(":memory:")?;
        Ok(Self { conn, path: None })
    }

    /// Open a named shared-memory database. Every store opened with the
    /// same tag sees the same data, which is how the engine hands each
    /// component its own connection without a file on disk.
    pub fn shared_memory(tag: &str) -> EngineResult<Self> {
        Self::open(&format!("file:{tag}?mode=memory&cache=shared"))
    }

    /// Reopen a new connection to the same database.
    /// For isolated in-memory databases this returns a NEW empty database;
    /// callers that need sharing use shared_memory() or a file path.
    pub fn reopen(&self) -> EngineResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> EngineResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_telemetry.sql"))?;
        Ok(())
    }

    // ── Key-value primitives ───────────────────────────────────

    pub fn kv_get(&self, key: &str) -> EngineResult<Option<String>> {
        Ok(self
            .conn
            .query_row("SELECT value FROM kv WHERE key=?1", params![key], |r| {
                r.get(0)
            })
            .optional()?)
    }

    pub fn kv_set(&self, key: &str, value: &str) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value=?2, updated_at=?3",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> EngineResult<Option<T>> {
        match self.kv_get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: serde::Serialize>(&self, key: &str, value: &T) -> EngineResult<()> {
        self.kv_set(key, &serde_json::to_string(value)?)
    }

    /// Append to a JSON-list value, evicting oldest entries beyond `cap`.
    fn append_bounded<T: serde::Serialize>(
        &self,
        key: &str,
        entry: &T,
        cap: usize,
    ) -> EngineResult<()> {
        let mut list: Vec<serde_json::Value> = self.get_json(key)?.unwrap_or_default();
        list.push(serde_json::to_value(entry)?);
        if list.len() > cap {
            let excess = list.len() - cap;
            list.drain(0..excess);
        }
        self.set_json(key, &list)
    }

    fn tail_of_list<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
        limit: usize,
    ) -> EngineResult<Vec<T>> {
        let list: Vec<T> = self.get_json(key)?.unwrap_or_default();
        let skip = list.len().saturating_sub(limit);
        Ok(list.into_iter().skip(skip).collect())
    }

    // ── Device fingerprint ─────────────────────────────────────

    pub fn device_fingerprint(&self) -> EngineResult<Option<DeviceFingerprint>> {
        self.get_json(KEY_DEVICE_FINGERPRINT)
    }

    pub fn save_device_fingerprint(&self, fingerprint: &DeviceFingerprint) -> EngineResult<()> {
        self.set_json(KEY_DEVICE_FINGERPRINT, fingerprint)
    }

    // ── Behavior baseline ──────────────────────────────────────

    pub fn behavior_pattern(&self, agent_id: &str) -> EngineResult<Option<BehaviorPattern>> {
        self.get_json(&format!("behaviorPattern_{agent_id}"))
    }

    pub fn save_behavior_pattern(&self, pattern: &BehaviorPattern) -> EngineResult<()> {
        self.set_json(&format!("behaviorPattern_{}", pattern.agent_id), pattern)
    }

    // ── Geofences ──────────────────────────────────────────────

    pub fn geofences(&self) -> EngineResult<Vec<GeofenceArea>> {
        Ok(self.get_json(KEY_GEOFENCES)?.unwrap_or_default())
    }

    pub fn save_geofences(&self, geofences: &[GeofenceArea]) -> EngineResult<()> {
        self.set_json(KEY_GEOFENCES, &geofences)
    }

    /// Last known membership for a geofence: true = inside.
    pub fn geofence_status(&self, id: &GeofenceId) -> EngineResult<Option<bool>> {
        self.get_json(&format!("geofence_{id}_status"))
    }

    pub fn set_geofence_status(&self, id: &GeofenceId, inside: bool) -> EngineResult<()> {
        self.set_json(&format!("geofence_{id}_status"), &inside)
    }

    pub fn clear_geofence_status(&self, id: &GeofenceId) -> EngineResult<()> {
        self.conn.execute(
            "DELETE FROM kv WHERE key=?1",
            params![format!("geofence_{id}_status")],
        )?;
        Ok(())
    }

    // ── Location history ───────────────────────────────────────

    pub fn location_history(&self) -> EngineResult<Vec<LocationPoint>> {
        Ok(self.get_json(KEY_LOCATION_HISTORY)?.unwrap_or_default())
    }

    pub fn save_location_history(&self, points: &[LocationPoint]) -> EngineResult<()> {
        self.set_json(KEY_LOCATION_HISTORY, &points)
    }

    // ── Fraud audit log ────────────────────────────────────────

    pub fn append_fraud_result(&self, result: &FraudCheckResult, cap: usize) -> EngineResult<()> {
        self.append_bounded(KEY_FRAUD_LOGS, result, cap)
    }

    pub fn fraud_history(&self, limit: usize) -> EngineResult<Vec<FraudCheckResult>> {
        self.tail_of_list(KEY_FRAUD_LOGS, limit)
    }

    pub fn fraud_log_len(&self) -> EngineResult<usize> {
        let list: Vec<serde_json::Value> = self.get_json(KEY_FRAUD_LOGS)?.unwrap_or_default();
        Ok(list.len())
    }

    // ── Security issues ────────────────────────────────────────

    pub fn append_security_issue(&self, issue: &SecurityIssue, cap: usize) -> EngineResult<()> {
        self.append_bounded(KEY_SECURITY_ISSUES, issue, cap)
    }

    pub fn security_issues(&self, limit: usize) -> EngineResult<Vec<SecurityIssue>> {
        self.tail_of_list(KEY_SECURITY_ISSUES, limit)
    }

    // ── Activity log ───────────────────────────────────────────

    pub fn record_activity(
        &self,
        agent_id: &AgentId,
        activity: ActivityKind,
        metadata: Option<&serde_json::Value>,
        occurred_at: DateTime<Utc>,
    ) -> EngineResult<()> {
        let metadata = metadata.map(|m| m.to_string());
        self.conn.execute(
            "INSERT INTO activity_log (agent_id, activity, metadata, occurred_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![agent_id, activity.label(), metadata, occurred_at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Activities by the agent with occurred_at in [from, to).
    pub fn count_agent_activities_in_window(
        &self,
        agent_id: &AgentId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EngineResult<u32> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM activity_log
             WHERE agent_id=?1 AND occurred_at>=?2 AND occurred_at<?3",
            params![agent_id, from.to_rfc3339(), to.to_rfc3339()],
            |r| r.get(0),
        )?)
    }

    /// Activities by the agent with the same kind and byte-identical
    /// metadata in [from, to).
    pub fn count_similar_activities(
        &self,
        agent_id: &AgentId,
        activity: ActivityKind,
        metadata: Option<&serde_json::Value>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EngineResult<u32> {
        let metadata = metadata.map(|m| m.to_string());
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM activity_log
             WHERE agent_id=?1 AND activity=?2
               AND metadata IS ?3
               AND occurred_at>=?4 AND occurred_at<?5",
            params![
                agent_id,
                activity.label(),
                metadata,
                from.to_rfc3339(),
                to.to_rfc3339()
            ],
            |r| r.get(0),
        )?)
    }

    /// Drop activity rows older than the cutoff. Called opportunistically
    /// so the log stays bounded on-device.
    pub fn prune_activities_before(&self, cutoff: DateTime<Utc>) -> EngineResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM activity_log WHERE occurred_at < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        Ok(removed)
    }
}
