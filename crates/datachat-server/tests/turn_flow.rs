//! End-to-end turn tests against an in-process fake model endpoint.
//!
//! The fake endpoint speaks the same wire contract as the real one: a
//! non-streamed request answers a single JSON object, a streamed request
//! answers newline-delimited fragments ending in `{"done":true}`.

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use datachat_server::{config::Config, relay, state::AppState};
use datachat_types::{ChartIntent, QueryOutcome, WsServerMessage};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Canned replies for the fake model endpoint. Non-streamed requests get
/// `classify`, streamed requests get `reply` chopped into fragments.
struct FakeModel {
    classify: String,
    reply: String,
}

async fn chat_handler(State(fake): State<Arc<FakeModel>>, Json(req): Json<Value>) -> Response {
    if !req["stream"].as_bool().unwrap_or(false) {
        return Json(json!({
            "message": {"role": "assistant", "content": fake.classify}
        }))
        .into_response();
    }

    let mut body = String::new();
    let chars: Vec<char> = fake.reply.chars().collect();
    for chunk in chars.chunks(7) {
        let content: String = chunk.iter().collect();
        body.push_str(&json!({"message": {"content": content}, "done": false}).to_string());
        body.push('\n');
    }
    body.push_str(&json!({"done": true}).to_string());
    body.push('\n');
    body.into_response()
}

/// Bind a fake model endpoint on a random port and return its base URL.
async fn spawn_model_server(classify: &str, reply: &str) -> String {
    let fake = Arc::new(FakeModel {
        classify: classify.to_string(),
        reply: reply.to_string(),
    });
    let app = Router::new()
        .route("/api/chat", post(chat_handler))
        .with_state(fake);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn test_state(model_url: &str) -> (Arc<AppState>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        static_dir: temp_dir.path().join("static"),
        db_path: temp_dir.path().join("chat.db"),
        upload_dir: temp_dir.path().join("uploads"),
        model_url: model_url.to_string(),
        model_name: "test-model".to_string(),
    };
    let state = Arc::new(AppState::new(config).expect("Failed to create AppState"));
    (state, temp_dir)
}

/// Run one turn and collect every event it emits, in order.
async fn run_and_collect(state: &AppState, session_id: i64, text: &str) -> Vec<WsServerMessage> {
    let (tx, mut rx) = mpsc::channel(64);
    relay::run_turn(state, &tx, session_id, text).await;
    drop(tx);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

/// Exactly one terminal event, in last position.
fn assert_single_terminal(events: &[WsServerMessage]) {
    let terminals = events
        .iter()
        .filter(|e| matches!(e, WsServerMessage::Done { .. }))
        .count();
    assert_eq!(terminals, 1, "expected exactly one terminal event");
    assert!(matches!(events.last(), Some(WsServerMessage::Done { .. })));
}

const SAMPLE_CSV: &str = "\
category,amount,day
a,10,2024-01-01
b,20,2024-01-02
a,30,2024-01-03
c,40,2024-01-04
b,50,2024-01-05
";

#[tokio::test]
async fn plain_chat_turn_streams_in_order_and_persists() {
    let url = spawn_model_server("query", "Hello! How can I help you today?").await;
    let (state, _temp) = test_state(&url);
    let session = state.store.create_session(None).unwrap();

    let events = run_and_collect(&state, session.id, "hi there").await;

    assert!(matches!(events[0], WsServerMessage::Ack { .. }));
    assert_single_terminal(&events);

    let deltas: String = events
        .iter()
        .filter_map(|e| match e {
            WsServerMessage::Partial { delta, .. } => Some(delta.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(deltas, "Hello! How can I help you today?");

    // Both sides of the turn are persisted
    let messages = state.store.list_messages(session.id).unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].text, "hi there");
    assert_eq!(messages[1].text, "Hello! How can I help you today?");
}

#[tokio::test]
async fn file_backed_turn_executes_synthesized_sql() {
    let reply = "```sql\nSELECT category, SUM(amount) AS total FROM sales GROUP BY category\n```";
    let url = spawn_model_server("\"Bar\"", reply).await;
    let (state, temp) = test_state(&url);
    let session = state.store.create_session(None).unwrap();

    let csv_path = temp.path().join("sales.csv");
    std::fs::write(&csv_path, SAMPLE_CSV).unwrap();
    state.store.bind_file(session.id, &csv_path, "sales").unwrap();

    let events = run_and_collect(&state, session.id, "bar chart of totals per category").await;

    assert!(matches!(events[0], WsServerMessage::Ack { .. }));
    assert_single_terminal(&events);

    let result = events
        .iter()
        .find_map(|e| match e {
            WsServerMessage::QueryResult { intent, result, .. } => Some((intent, result)),
            _ => None,
        })
        .expect("expected a query result event");

    // The decorated classification reply resolves to its keyword
    assert_eq!(*result.0, ChartIntent::Bar);
    match result.1 {
        QueryOutcome::Success(table) => {
            assert_eq!(table.raw.columns, vec!["category", "total"]);
            assert_eq!(table.raw.rows.len(), 3);
        }
        QueryOutcome::Failure { message } => panic!("query failed: {}", message),
    }

    // The assistant message keeps the full synthesized text, and the
    // outcome is retrievable with the history.
    let messages = state.store.list_messages(session.id).unwrap();
    assert_eq!(messages.len(), 2);
    assert!(messages[1].text.contains("SELECT category"));
    assert!(messages[1].result.as_ref().unwrap().is_success());
}

#[tokio::test]
async fn bad_sql_rides_inside_the_result_event() {
    let reply = "```sql\nSELECT nope FROM missing_table\n```";
    let url = spawn_model_server("query", reply).await;
    let (state, temp) = test_state(&url);
    let session = state.store.create_session(None).unwrap();

    let csv_path = temp.path().join("sales.csv");
    std::fs::write(&csv_path, SAMPLE_CSV).unwrap();
    state.store.bind_file(session.id, &csv_path, "sales").unwrap();

    let events = run_and_collect(&state, session.id, "show me something").await;

    // Execution failure is data, not a turn error
    assert!(!events
        .iter()
        .any(|e| matches!(e, WsServerMessage::Error { .. })));
    assert_single_terminal(&events);

    let failed = events.iter().any(|e| {
        matches!(
            e,
            WsServerMessage::QueryResult {
                result: QueryOutcome::Failure { .. },
                ..
            }
        )
    });
    assert!(failed, "expected a failure outcome in the result event");
}

#[tokio::test]
async fn disconnect_mid_stream_keeps_partial_text() {
    let reply = "The quick brown fox jumps over the lazy dog";
    let url = spawn_model_server("query", reply).await;
    let (state, _temp) = test_state(&url);
    let session = state.store.create_session(None).unwrap();

    // Capacity 1 keeps the relay in lockstep with the receiver, so dropping
    // the receiver is observed while fragments are still in flight.
    let (tx, mut rx) = mpsc::channel(1);
    let relay_state = state.clone();
    let session_id = session.id;
    let turn = tokio::spawn(async move {
        relay::run_turn(&relay_state, &tx, session_id, "hello").await;
    });

    let first = rx.recv().await.unwrap();
    assert!(matches!(first, WsServerMessage::Ack { .. }));
    let second = rx.recv().await.unwrap();
    assert!(matches!(second, WsServerMessage::Partial { .. }));
    drop(rx);

    turn.await.unwrap();

    // The turn unwound without erroring and kept the partial assistant text
    let messages = state.store.list_messages(session.id).unwrap();
    assert_eq!(messages.len(), 2);
    let partial = &messages[1].text;
    assert!(!partial.is_empty());
    assert!(partial.len() < reply.len());
    assert!(reply.starts_with(partial.as_str()));
}

#[tokio::test]
async fn unreachable_model_yields_error_then_terminal() {
    // Nothing listens on port 1
    let (state, _temp) = test_state("http://127.0.0.1:1");
    let session = state.store.create_session(None).unwrap();

    let events = run_and_collect(&state, session.id, "hello").await;

    assert!(matches!(events[0], WsServerMessage::Ack { .. }));
    assert!(events
        .iter()
        .any(|e| matches!(e, WsServerMessage::Error { .. })));
    assert_single_terminal(&events);
}

#[tokio::test]
async fn unknown_session_yields_error_then_terminal() {
    let (state, _temp) = test_state("http://127.0.0.1:1");

    let events = run_and_collect(&state, 9999, "hello").await;

    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], WsServerMessage::Error { .. }));
    assert!(matches!(events[1], WsServerMessage::Done { .. }));
}
