//! SQLite persistence for sessions, messages, file bindings and query results.

use crate::Result;
use chrono::{DateTime, Utc};
use datachat_types::{ChatMessage, FileBinding, QueryOutcome, Role, Session};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// Bounded retry for transient lock contention before surfacing the error.
const MAX_BUSY_RETRIES: u32 = 3;
const BUSY_RETRY_DELAY: Duration = Duration::from_millis(50);

/// SQLite-based chat store. Writes are per-statement transactions; no
/// long-held locks.
pub struct ChatStore {
    conn: Mutex<Connection>,
}

impl ChatStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(500))?;
        conn.pragma_update(None, "foreign_keys", true)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL DEFAULT 'Session',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                text TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id);

            CREATE TABLE IF NOT EXISTS session_files (
                session_id INTEGER PRIMARY KEY REFERENCES sessions(id) ON DELETE CASCADE,
                file_path TEXT NOT NULL,
                table_name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS query_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id INTEGER NOT NULL UNIQUE REFERENCES messages(id) ON DELETE CASCADE,
                session_id INTEGER NOT NULL,
                payload TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Create a new session.
    pub fn create_session(&self, title: Option<&str>) -> Result<Session> {
        let conn = self.conn.lock().unwrap();
        let title = title.unwrap_or("Session");
        let created_at = Utc::now();
        retry_busy(|| {
            conn.execute(
                "INSERT INTO sessions (title, created_at) VALUES (?1, ?2)",
                params![title, created_at.to_rfc3339()],
            )
        })?;
        Ok(Session {
            id: conn.last_insert_rowid(),
            title: title.to_string(),
            created_at,
        })
    }

    /// List all sessions, newest first.
    pub fn list_sessions(&self) -> Result<Vec<Session>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, title, created_at FROM sessions ORDER BY id DESC")?;
        let sessions = stmt
            .query_map([], |row| {
                Ok(Session {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    created_at: parse_timestamp(&row.get::<_, String>(2)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    /// Whether a session exists.
    pub fn session_exists(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM sessions WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Delete a session, cascading to its messages, query results and file
    /// binding. Deleting a nonexistent session is a no-op.
    pub fn delete_session(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        retry_busy(|| conn.execute("DELETE FROM sessions WHERE id = ?1", params![id]))?;
        Ok(())
    }

    /// Insert a message for a session.
    pub fn insert_message(&self, session_id: i64, role: Role, text: &str) -> Result<ChatMessage> {
        let conn = self.conn.lock().unwrap();
        let created_at = Utc::now();
        retry_busy(|| {
            conn.execute(
                "INSERT INTO messages (session_id, role, text, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![session_id, role.as_str(), text, created_at.to_rfc3339()],
            )
        })?;
        Ok(ChatMessage {
            id: conn.last_insert_rowid(),
            session_id,
            role,
            text: text.to_string(),
            created_at,
            result: None,
        })
    }

    /// List a session's messages in chronological order, with any attached
    /// query result payload.
    pub fn list_messages(&self, session_id: i64) -> Result<Vec<ChatMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT m.id, m.session_id, m.role, m.text, m.created_at, q.payload
            FROM messages m
            LEFT JOIN query_results q ON q.message_id = m.id
            WHERE m.session_id = ?1
            ORDER BY m.id ASC
            "#,
        )?;
        let messages = stmt
            .query_map(params![session_id], |row| {
                let role: String = row.get(2)?;
                let payload: Option<String> = row.get(5)?;
                Ok(ChatMessage {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    role: parse_role(&role),
                    text: row.get(3)?,
                    created_at: parse_timestamp(&row.get::<_, String>(4)?),
                    result: payload.and_then(|p| match serde_json::from_str(&p) {
                        Ok(outcome) => Some(outcome),
                        Err(e) => {
                            tracing::warn!(target: "datachat::store", "Unreadable result payload: {}", e);
                            None
                        }
                    }),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    /// Bind a file to a session. The most recent upload wins; the previous
    /// path reference is overwritten, not deleted from disk.
    pub fn bind_file(&self, session_id: i64, file_path: &Path, table_name: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        retry_busy(|| {
            conn.execute(
                "INSERT OR REPLACE INTO session_files (session_id, file_path, table_name) VALUES (?1, ?2, ?3)",
                params![session_id, file_path.to_string_lossy(), table_name],
            )
        })?;
        Ok(())
    }

    /// Get the file bound to a session, if any.
    pub fn get_file(&self, session_id: i64) -> Result<Option<FileBinding>> {
        let conn = self.conn.lock().unwrap();
        let binding = conn
            .query_row(
                "SELECT session_id, file_path, table_name FROM session_files WHERE session_id = ?1",
                params![session_id],
                |row| {
                    Ok(FileBinding {
                        session_id: row.get(0)?,
                        file_path: row.get::<_, String>(1)?.into(),
                        table_name: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(binding)
    }

    /// Attach a query outcome to a message, right after the assistant text
    /// is persisted.
    pub fn attach_result(
        &self,
        message_id: i64,
        session_id: i64,
        outcome: &QueryOutcome,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let payload = serde_json::to_string(outcome)?;
        retry_busy(|| {
            conn.execute(
                "INSERT OR REPLACE INTO query_results (message_id, session_id, payload) VALUES (?1, ?2, ?3)",
                params![message_id, session_id, payload],
            )
        })?;
        Ok(())
    }
}

/// Retry an operation a bounded number of times on SQLITE_BUSY.
fn retry_busy<T>(mut op: impl FnMut() -> rusqlite::Result<T>) -> rusqlite::Result<T> {
    let mut attempts = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(rusqlite::Error::SqliteFailure(e, msg))
                if e.code == rusqlite::ErrorCode::DatabaseBusy && attempts < MAX_BUSY_RETRIES =>
            {
                attempts += 1;
                tracing::debug!(
                    target: "datachat::store",
                    "Database busy ({:?}), retry {}/{}",
                    msg,
                    attempts,
                    MAX_BUSY_RETRIES
                );
                std::thread::sleep(BUSY_RETRY_DELAY);
            }
            Err(e) => return Err(e),
        }
    }
}

fn parse_role(s: &str) -> Role {
    match s {
        "assistant" => Role::Assistant,
        _ => Role::User,
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    match DateTime::parse_from_rfc3339(s) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(e) => {
            tracing::warn!(target: "datachat::store", "Unreadable timestamp '{}': {}", s, e);
            DateTime::UNIX_EPOCH
        }
    }
}
