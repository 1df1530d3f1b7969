//! Core persistence, table loading and model plumbing for datachat.

mod db;
mod error;
mod executor;
mod intent;
mod model;
mod sqlgen;
mod table;

pub use db::ChatStore;
pub use error::DatachatError;
pub use executor::execute_query;
pub use intent::{classify_intent, normalize_intent};
pub use model::{ModelClient, StreamEvent, TokenStream};
pub use sqlgen::{chat_messages, extract_sql, synthesis_messages, MISSING_COLUMNS_SENTINEL};
pub use table::{load_table, normalize_identifier, table_name_for, Column, LoadedTable};

/// Result type for datachat operations.
pub type Result<T> = std::result::Result<T, DatachatError>;
