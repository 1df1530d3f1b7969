//! Session, message and file-binding types.

use crate::QueryOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A chat session. Owns zero-or-more messages and at most one file binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A persisted chat message.
///
/// Immutable once written, except that a query result may be attached right
/// after the assistant text is known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: i64,
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Attached query result, if the message produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<QueryOutcome>,
}

/// The file currently bound to a session. At most one per session; a newer
/// upload replaces the binding (the previous file stays on disk).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileBinding {
    pub session_id: i64,
    pub file_path: PathBuf,
    pub table_name: String,
}

/// Classified purpose of a user request: plain query or a chart type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartIntent {
    Query,
    Line,
    Bar,
    Pie,
    Scatter,
    Column,
}

impl ChartIntent {
    /// All intents in canonical enumeration order. Matching walks this list
    /// front to back, first hit wins.
    pub const ALL: [ChartIntent; 6] = [
        ChartIntent::Query,
        ChartIntent::Line,
        ChartIntent::Bar,
        ChartIntent::Pie,
        ChartIntent::Scatter,
        ChartIntent::Column,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartIntent::Query => "query",
            ChartIntent::Line => "line",
            ChartIntent::Bar => "bar",
            ChartIntent::Pie => "pie",
            ChartIntent::Scatter => "scatter",
            ChartIntent::Column => "column",
        }
    }
}

impl std::fmt::Display for ChartIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
