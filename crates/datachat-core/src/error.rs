//! Error types for datachat.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatachatError {
    #[error("Session not found: {0}")]
    SessionNotFound(i64),

    #[error("File type not allowed: .{0}")]
    FileTypeNotAllowed(String),

    #[error("Empty table file: {0}")]
    EmptyTable(PathBuf),

    #[error("Malformed table file: {0}")]
    MalformedTable(String),

    #[error("Model endpoint error: {0}")]
    ModelEndpoint(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
