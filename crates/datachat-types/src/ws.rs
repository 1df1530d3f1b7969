//! WebSocket message protocol between client and server.
//!
//! A turn emits zero-or-more events with `done=false`, then exactly one
//! terminal event with `done=true`. Nothing follows the terminal event for
//! the same turn.

use crate::{ChartIntent, QueryOutcome};
use serde::{Deserialize, Serialize};

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsClientMessage {
    /// Start a turn: one user message for a session.
    SendMessage { session_id: i64, text: String },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsServerMessage {
    /// Lightweight acknowledgment, flushed before any model I/O.
    Ack { message_id: i64, done: bool },
    /// One incremental content fragment, in model emission order.
    Partial { delta: String, done: bool },
    /// Query execution outcome for a file-backed turn.
    QueryResult {
        message_id: i64,
        intent: ChartIntent,
        result: QueryOutcome,
        done: bool,
    },
    /// User-visible diagnostic; always followed by the terminal event.
    Error { message: String, done: bool },
    /// Terminal event: exactly one per turn.
    Done { done: bool },
}

impl WsServerMessage {
    pub fn ack(message_id: i64) -> Self {
        WsServerMessage::Ack {
            message_id,
            done: false,
        }
    }

    pub fn partial(delta: impl Into<String>) -> Self {
        WsServerMessage::Partial {
            delta: delta.into(),
            done: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        WsServerMessage::Error {
            message: message.into(),
            done: false,
        }
    }

    pub fn done() -> Self {
        WsServerMessage::Done { done: true }
    }
}
