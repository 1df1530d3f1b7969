//! Chart/query intent classification.

use crate::model::ModelClient;
use datachat_types::{ChartIntent, ModelMessage};

const CLASSIFY_PROMPT: &str = "Classify the user's request into exactly one of: \
query, line, bar, pie, scatter, column. Answer 'query' for plain data questions \
and a chart type only when a visualization is explicitly wanted. \
Reply with the single keyword and nothing else.";

/// Normalize free-text model output into an intent.
///
/// Quote characters, hyphens, colons and whitespace are stripped, then the
/// canonical keywords are matched by substring containment in enumeration
/// order. Anything unrecognized is a plain query.
pub fn normalize_intent(raw: &str) -> ChartIntent {
    let cleaned: String = raw
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '"' | '\'' | '`' | '-' | ':') && !c.is_whitespace())
        .collect();

    ChartIntent::ALL
        .iter()
        .copied()
        .find(|intent| cleaned.contains(intent.as_str()))
        .unwrap_or(ChartIntent::Query)
}

/// Ask the model to classify a request. Never fails at this boundary:
/// endpoint errors are logged and default to `Query`.
pub async fn classify_intent(client: &ModelClient, text: &str) -> ChartIntent {
    let messages = vec![
        ModelMessage::system(CLASSIFY_PROMPT),
        ModelMessage::user(text),
    ];
    match client.complete(messages).await {
        Ok(reply) => normalize_intent(&reply),
        Err(e) => {
            tracing::warn!(target: "datachat::model", "Intent classification failed: {}", e);
            ChartIntent::Query
        }
    }
}
