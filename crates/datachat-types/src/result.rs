//! Query result types.
//!
//! The executor returns a tagged outcome rather than raising across the
//! component boundary, so the relay can pick user-facing behavior
//! deterministically.

use serde::{Deserialize, Serialize};

/// Inferred scalar type of a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Text,
    Boolean,
    Date,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Text => "text",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display descriptor for one result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDesc {
    pub title: String,
    pub data_index: String,
}

/// Raw execution output: columns, row tuples and per-column types.
/// This is the form persisted for later replay without re-executing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub types: Vec<ColumnType>,
}

/// Successful tabular result, in both display and raw form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableResult {
    pub columns: Vec<ColumnDesc>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub raw: RawResult,
}

/// Outcome of executing a synthesized SQL statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    Success(TableResult),
    Failure { message: String },
}

impl QueryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, QueryOutcome::Success(_))
    }

    pub fn failure(message: impl Into<String>) -> Self {
        QueryOutcome::Failure {
            message: message.into(),
        }
    }
}
