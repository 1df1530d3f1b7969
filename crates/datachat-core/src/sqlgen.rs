//! Natural-language-to-SQL prompt assembly and output extraction.

use datachat_types::{ChatMessage, ModelMessage, Role};
use once_cell::sync::Lazy;
use regex::Regex;

/// Sentinel the model is instructed to return instead of SQL when the
/// requested columns do not exist.
pub const MISSING_COLUMNS_SENTINEL: &str = "Requested columns not found";

static SQL_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```sql\s*(.*?)```").unwrap());

const CHAT_PROMPT: &str = "You are a helpful assistant. Answer the user's \
questions using the conversation so far.";

/// Map persisted messages to the model's message-list format, preserving
/// chronological order.
fn history_messages(history: &[ChatMessage]) -> impl Iterator<Item = ModelMessage> + '_ {
    history.iter().map(|msg| match msg.role {
        Role::User => ModelMessage::user(&msg.text),
        Role::Assistant => ModelMessage::assistant(&msg.text),
    })
}

/// Message list for a plain conversational turn (no file bound).
pub fn chat_messages(history: &[ChatMessage]) -> Vec<ModelMessage> {
    std::iter::once(ModelMessage::system(CHAT_PROMPT))
        .chain(history_messages(history))
        .collect()
}

/// Message list for SQL synthesis: closed-world system instructions with
/// the table schema, then the full prior conversation.
pub fn synthesis_messages(schema: &str, history: &[ChatMessage]) -> Vec<ModelMessage> {
    let system = format!(
        "You translate questions about a table into SQLite SQL.\n\
         Schema: {schema}\n\
         Rules:\n\
         - Return exactly one SQL statement and nothing else.\n\
         - No prose, no explanations, no visualization suggestions.\n\
         - Use only the column names from the schema.\n\
         - If the question needs columns that do not exist, return the \
         literal text \"{MISSING_COLUMNS_SENTINEL}\" instead of SQL."
    );
    std::iter::once(ModelMessage::system(system))
        .chain(history_messages(history))
        .collect()
}

/// Extract the SQL statement from a model reply.
///
/// Prefers the body of a ```sql fenced block; otherwise residual fence
/// markers are stripped and the whole reply is the statement.
pub fn extract_sql(reply: &str) -> String {
    if let Some(caps) = SQL_FENCE.captures(reply) {
        return caps[1].trim().to_string();
    }
    reply
        .replace("```sql", "")
        .replace("```", "")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn msg(role: Role, text: &str) -> ChatMessage {
        ChatMessage {
            id: 0,
            session_id: 1,
            role,
            text: text.to_string(),
            created_at: Utc::now(),
            result: None,
        }
    }

    #[test]
    fn extracts_fenced_statement() {
        let reply = "Here you go:\n```sql\nSELECT * FROM t;\n```\nEnjoy.";
        assert_eq!(extract_sql(reply), "SELECT * FROM t;");
    }

    #[test]
    fn unfenced_reply_is_the_statement() {
        assert_eq!(extract_sql("SELECT 1"), "SELECT 1");
    }

    #[test]
    fn residual_markers_are_stripped() {
        assert_eq!(extract_sql("```sql SELECT 1"), "SELECT 1");
        assert_eq!(extract_sql("SELECT 1\n```"), "SELECT 1");
    }

    #[test]
    fn synthesis_prompt_embeds_schema_and_history() {
        let history = vec![
            msg(Role::User, "show totals by region"),
            msg(Role::Assistant, "SELECT region FROM sales"),
            msg(Role::User, "only the north"),
        ];
        let messages = synthesis_messages("Table 'sales' with columns: region (text)", &history);
        assert_eq!(messages.len(), 4);
        assert!(messages[0].content.contains("Table 'sales'"));
        assert!(messages[0].content.contains(MISSING_COLUMNS_SENTINEL));
        assert_eq!(messages[3].content, "only the north");
    }

    #[test]
    fn chat_prompt_keeps_chronological_order() {
        let history = vec![
            msg(Role::User, "hi"),
            msg(Role::Assistant, "hello"),
        ];
        let messages = chat_messages(&history);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].content, "hi");
        assert_eq!(messages[2].content, "hello");
    }
}
