//! Streaming relay: one end-to-end conversation turn.
//!
//! Per turn, strictly in order: acknowledge the inbound message, assemble
//! the session context, forward the model's token stream to the client,
//! then finalize (persist the assistant text, execute candidate SQL for
//! file-backed sessions) and emit exactly one terminal event. Turns on
//! different connections run concurrently; within a turn everything is
//! sequential.

use crate::state::AppState;
use datachat_core::{
    chat_messages, classify_intent, execute_query, extract_sql, load_table, synthesis_messages,
    DatachatError, LoadedTable, StreamEvent,
};
use datachat_types::{ChartIntent, ChatMessage, Role, WsServerMessage};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Run one turn and emit its events. Always ends with the terminal event,
/// on error paths included; the terminal event is never followed by
/// anything for this turn.
pub async fn run_turn(
    state: &AppState,
    events: &mpsc::Sender<WsServerMessage>,
    session_id: i64,
    text: &str,
) {
    if let Err(e) = turn(state, events, session_id, text).await {
        warn!(target: "datachat::relay", "Turn failed for session {}: {}", session_id, e);
        let _ = events.send(WsServerMessage::error(e.to_string())).await;
    }
    let _ = events.send(WsServerMessage::done()).await;
}

/// File-backed turn context: the loaded table and the classified intent.
struct FileContext {
    table: LoadedTable,
    intent: ChartIntent,
}

async fn turn(
    state: &AppState,
    events: &mpsc::Sender<WsServerMessage>,
    session_id: i64,
    text: &str,
) -> datachat_core::Result<()> {
    // Received: persist the user message and acknowledge before any model
    // I/O, so the client knows the turn was accepted.
    if !state.store.session_exists(session_id)? {
        return Err(DatachatError::SessionNotFound(session_id));
    }
    let user_msg = state.store.insert_message(session_id, Role::User, text)?;
    if events
        .send(WsServerMessage::ack(user_msg.id))
        .await
        .is_err()
    {
        return Ok(());
    }

    // Context-Assembled: prior messages in chronological order, plus the
    // file schema when one is bound.
    let history: Vec<ChatMessage> = state.store.list_messages(session_id)?;
    let binding = state.store.get_file(session_id)?;

    let (file_ctx, messages) = match binding {
        Some(binding) => {
            let mut table = load_table(&binding.file_path)?;
            // The binding's table name is canonical; the stored path carries
            // a session prefix the loader would otherwise pick up.
            table.table_name = binding.table_name.clone();
            let intent = classify_intent(&state.model, text).await;
            debug!(
                target: "datachat::relay",
                "Session {} querying table '{}' with intent {}",
                session_id, table.table_name, intent
            );
            let messages = synthesis_messages(&table.schema_description(), &history);
            (Some(FileContext { table, intent }), messages)
        }
        None => (None, chat_messages(&history)),
    };

    // Streaming: forward fragments in arrival order, never blocking on
    // persistence.
    let mut stream = state.model.stream(messages).await?;
    let mut accumulated = String::new();
    let mut disconnected = false;
    let mut stream_failure: Option<String> = None;

    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::Delta(delta) => {
                accumulated.push_str(&delta);
                if events.send(WsServerMessage::partial(delta)).await.is_err() {
                    // Client went away: stop relaying and abort upstream,
                    // but keep the partial text for persistence.
                    disconnected = true;
                    break;
                }
            }
            StreamEvent::Done => break,
            StreamEvent::Failed(message) => {
                stream_failure = Some(message);
                break;
            }
        }
    }
    drop(stream);

    // Finalizing: persist the assembled text. On disconnect or upstream
    // failure, a non-empty partial is still persisted.
    let completed = !disconnected && stream_failure.is_none();
    let assistant_msg = if completed || !accumulated.is_empty() {
        Some(
            state
                .store
                .insert_message(session_id, Role::Assistant, &accumulated)?,
        )
    } else {
        None
    };

    if let Some(message) = stream_failure {
        return Err(DatachatError::ModelEndpoint(message));
    }
    if disconnected {
        info!(
            target: "datachat::relay",
            "Client disconnected mid-stream for session {}; kept {} chars",
            session_id,
            accumulated.len()
        );
        return Ok(());
    }

    // For file-backed sessions the assembled text is a candidate SQL
    // statement; execution failures ride inside the result event and the
    // turn still completes normally.
    if let (Some(ctx), Some(assistant_msg)) = (file_ctx, assistant_msg) {
        let sql = extract_sql(&accumulated);
        let outcome = execute_query(&sql, &ctx.table);
        state
            .store
            .attach_result(assistant_msg.id, session_id, &outcome)?;
        let _ = events
            .send(WsServerMessage::QueryResult {
                message_id: assistant_msg.id,
                intent: ctx.intent,
                result: outcome,
                done: false,
            })
            .await;
    }

    Ok(())
}
