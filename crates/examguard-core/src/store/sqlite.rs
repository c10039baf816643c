//! `SQLite`-backed integrity store.
//!
//! Uses WAL mode so reads proceed concurrently with writes. The
//! schema (including PRAGMA statements) is embedded at compile time.
//! Counter increments and terminal transitions are single
//! `UPDATE ... RETURNING` statements, which is what gives the store
//! its find-and-increment / conditional-transition atomicity.

// SQLite returns i64 for row IDs and counts, but they're always non-negative.
// Mutex poisoning indicates a panic in another thread, which is unrecoverable.
#![allow(
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::missing_panics_doc
)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};

use super::{IntegrityStore, StoreError};
use crate::fingerprint::FingerprintBinding;
use crate::session::{ExamSession, SessionState};
use crate::violation::{Severity, ViolationEvent};

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

const SESSION_COLUMNS: &str = "session_id, exam_id, user_id, attempt, state, started_at_ms, \
     ended_at_ms, elapsed_ms, violation_count, low_count, medium_count, high_count, \
     critical_count, last_violation_ms, auto_submission_reason";

const VIOLATION_COLUMNS: &str = "violation_id, session_id, user_id, exam_id, violation_type, \
     severity, timestamp_ms, elapsed_into_exam_ms, question_ref, description, source, \
     risk_score, is_repeated, prior_count_in_window";

/// The durable integrity store backed by `SQLite`.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens or creates a store at the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the
    /// schema cannot be applied.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn session_from_row(row: &Row<'_>) -> rusqlite::Result<ExamSession> {
        let state_str: String = row.get(4)?;
        let state = state_str.parse::<SessionState>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, e.into())
        })?;
        Ok(ExamSession {
            session_id: row.get(0)?,
            exam_id: row.get(1)?,
            user_id: row.get(2)?,
            attempt: row.get::<_, i64>(3)? as u32,
            state,
            started_at_ms: row.get::<_, Option<i64>>(5)?.map(|v| v as u64),
            ended_at_ms: row.get::<_, Option<i64>>(6)?.map(|v| v as u64),
            elapsed_ms: row.get::<_, i64>(7)? as u64,
            violation_count: row.get::<_, i64>(8)? as u32,
            low_count: row.get::<_, i64>(9)? as u32,
            medium_count: row.get::<_, i64>(10)? as u32,
            high_count: row.get::<_, i64>(11)? as u32,
            critical_count: row.get::<_, i64>(12)? as u32,
            last_violation_ms: row.get::<_, Option<i64>>(13)?.map(|v| v as u64),
            auto_submission_reason: row.get(14)?,
        })
    }

    fn violation_from_row(row: &Row<'_>) -> rusqlite::Result<ViolationEvent> {
        let type_str: String = row.get(4)?;
        let severity_str: String = row.get(5)?;
        let source_str: String = row.get(10)?;
        let conversion = |idx: usize, e: crate::violation::ValidationError| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        };
        Ok(ViolationEvent {
            violation_id: row.get(0)?,
            session_id: row.get(1)?,
            user_id: row.get(2)?,
            exam_id: row.get(3)?,
            violation_type: type_str.parse().map_err(|e| conversion(4, e))?,
            severity: severity_str.parse().map_err(|e| conversion(5, e))?,
            timestamp_ms: row.get::<_, i64>(6)? as u64,
            elapsed_into_exam_ms: row.get::<_, i64>(7)? as u64,
            question_ref: row.get(8)?,
            description: row.get(9)?,
            source: source_str.parse().map_err(|e| conversion(10, e))?,
            risk_score: row.get::<_, i64>(11)? as u8,
            is_repeated: row.get::<_, i64>(12)? != 0,
            prior_count_in_window: row.get::<_, i64>(13)? as u32,
        })
    }

    fn map_conflict(err: rusqlite::Error, detail: &str) -> StoreError {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict {
                    detail: detail.to_string(),
                }
            },
            _ => StoreError::Database(err),
        }
    }
}

impl IntegrityStore for SqliteStore {
    fn insert_session(&self, session: &ExamSession) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sessions (session_id, exam_id, user_id, attempt, state, started_at_ms, \
             ended_at_ms, elapsed_ms, violation_count, low_count, medium_count, high_count, \
             critical_count, last_violation_ms, auto_submission_reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                session.session_id,
                session.exam_id,
                session.user_id,
                session.attempt,
                session.state.as_str(),
                session.started_at_ms.map(|v| v as i64),
                session.ended_at_ms.map(|v| v as i64),
                session.elapsed_ms as i64,
                session.violation_count,
                session.low_count,
                session.medium_count,
                session.high_count,
                session.critical_count,
                session.last_violation_ms.map(|v| v as i64),
                session.auto_submission_reason,
            ],
        )
        .map_err(|e| Self::map_conflict(e, "session already exists or pair already active"))?;
        Ok(())
    }

    fn get_session(&self, session_id: &str) -> Result<Option<ExamSession>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = ?1");
        let session = conn
            .query_row(&sql, params![session_id], Self::session_from_row)
            .optional()?;
        Ok(session)
    }

    fn find_open_session(
        &self,
        user_id: &str,
        exam_id: &str,
    ) -> Result<Option<ExamSession>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE user_id = ?1 AND exam_id = ?2 AND state IN ('pending', 'in_progress')
             ORDER BY CASE state WHEN 'in_progress' THEN 0 ELSE 1 END, attempt DESC
             LIMIT 1"
        );
        let session = conn
            .query_row(&sql, params![user_id, exam_id], Self::session_from_row)
            .optional()?;
        Ok(session)
    }

    fn count_sessions(&self, user_id: &str, exam_id: &str) -> Result<u32, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE user_id = ?1 AND exam_id = ?2",
            params![user_id, exam_id],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    fn start_pending_session(
        &self,
        session_id: &str,
        started_at_ms: u64,
    ) -> Result<Option<ExamSession>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "UPDATE sessions SET state = 'in_progress', started_at_ms = ?2
             WHERE session_id = ?1 AND state = 'pending'
             RETURNING {SESSION_COLUMNS}"
        );
        conn.query_row(
            &sql,
            params![session_id, started_at_ms as i64],
            Self::session_from_row,
        )
        .optional()
        .map_err(|e| Self::map_conflict(e, "another session is already in progress for the pair"))
    }

    fn finish_session(
        &self,
        session_id: &str,
        state: SessionState,
        ended_at_ms: u64,
        reason: Option<&str>,
    ) -> Result<Option<ExamSession>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "UPDATE sessions SET
                 state = ?2,
                 ended_at_ms = ?3,
                 elapsed_ms = ?3 - COALESCE(started_at_ms, ?3),
                 auto_submission_reason = COALESCE(?4, auto_submission_reason)
             WHERE session_id = ?1 AND state = 'in_progress'
             RETURNING {SESSION_COLUMNS}"
        );
        let session = conn
            .query_row(
                &sql,
                params![session_id, state.as_str(), ended_at_ms as i64, reason],
                Self::session_from_row,
            )
            .optional()?;
        Ok(session)
    }

    fn append_violation(&self, event: &ViolationEvent) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO violations (violation_id, session_id, user_id, exam_id, violation_type, \
             severity, timestamp_ms, elapsed_into_exam_ms, question_ref, description, source, \
             risk_score, is_repeated, prior_count_in_window)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                event.violation_id,
                event.session_id,
                event.user_id,
                event.exam_id,
                event.violation_type.as_str(),
                event.severity.as_str(),
                event.timestamp_ms as i64,
                event.elapsed_into_exam_ms as i64,
                event.question_ref,
                event.description,
                event.source.as_str(),
                event.risk_score,
                i64::from(event.is_repeated),
                event.prior_count_in_window,
            ],
        )
        .map_err(|e| Self::map_conflict(e, "violation id already recorded"))?;
        Ok(())
    }

    fn count_violations_since(&self, session_id: &str, since_ms: u64) -> Result<u32, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM violations WHERE session_id = ?1 AND timestamp_ms >= ?2",
            params![session_id, since_ms as i64],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    fn violations_for_session(
        &self,
        session_id: &str,
        limit: u32,
    ) -> Result<Vec<ViolationEvent>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {VIOLATION_COLUMNS} FROM violations
             WHERE session_id = ?1
             ORDER BY timestamp_ms DESC, violation_id DESC
             LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let events = stmt
            .query_map(params![session_id, limit], Self::violation_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    fn increment_violation_counters(
        &self,
        session_id: &str,
        severity: Severity,
        at_ms: u64,
    ) -> Result<Option<u32>, StoreError> {
        let conn = self.conn.lock().unwrap();
        // Boolean comparisons evaluate to 0/1, so each severity column
        // advances by exactly one for its own severity. Single
        // statement: each caller sees a unique post-increment count.
        let count = conn
            .query_row(
                "UPDATE sessions SET
                     violation_count = violation_count + 1,
                     low_count = low_count + (?2 = 'low'),
                     medium_count = medium_count + (?2 = 'medium'),
                     high_count = high_count + (?2 = 'high'),
                     critical_count = critical_count + (?2 = 'critical'),
                     last_violation_ms = ?3
                 WHERE session_id = ?1 AND state = 'in_progress'
                 RETURNING violation_count",
                params![session_id, severity.as_str(), at_ms as i64],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(count.map(|c| c as u32))
    }

    fn get_binding(&self, user_id: &str) -> Result<Option<FingerprintBinding>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let binding = conn
            .query_row(
                "SELECT user_id, version, fingerprint_hash, bound_session_id, first_seen_ms, \
                 last_seen_ms, superseded
                 FROM fingerprint_bindings
                 WHERE user_id = ?1 AND superseded = 0",
                params![user_id],
                |row| {
                    Ok(FingerprintBinding {
                        user_id: row.get(0)?,
                        version: row.get::<_, i64>(1)? as u32,
                        fingerprint_hash: row.get(2)?,
                        bound_session_id: row.get(3)?,
                        first_seen_ms: row.get::<_, i64>(4)? as u64,
                        last_seen_ms: row.get::<_, i64>(5)? as u64,
                        superseded: row.get::<_, i64>(6)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(binding)
    }

    fn insert_binding(&self, binding: &FingerprintBinding) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO fingerprint_bindings (user_id, version, fingerprint_hash, \
             bound_session_id, first_seen_ms, last_seen_ms, superseded)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                binding.user_id,
                binding.version,
                binding.fingerprint_hash,
                binding.bound_session_id,
                binding.first_seen_ms as i64,
                binding.last_seen_ms as i64,
                i64::from(binding.superseded),
            ],
        )
        .map_err(|e| Self::map_conflict(e, "current binding already exists for user"))?;
        Ok(())
    }

    fn touch_binding(&self, user_id: &str, last_seen_ms: u64) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE fingerprint_bindings SET last_seen_ms = ?2
             WHERE user_id = ?1 AND superseded = 0",
            params![user_id, last_seen_ms as i64],
        )?;
        Ok(())
    }

    fn supersede_binding(
        &self,
        user_id: &str,
        replacement: &FingerprintBinding,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE fingerprint_bindings SET superseded = 1
             WHERE user_id = ?1 AND superseded = 0",
            params![user_id],
        )?;
        tx.execute(
            "INSERT INTO fingerprint_bindings (user_id, version, fingerprint_hash, \
             bound_session_id, first_seen_ms, last_seen_ms, superseded)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
            params![
                replacement.user_id,
                replacement.version,
                replacement.fingerprint_hash,
                replacement.bound_session_id,
                replacement.first_seen_ms as i64,
                replacement.last_seen_ms as i64,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }
}
