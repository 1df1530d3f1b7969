//! Shared types for the datachat backend.

mod chat;
mod model;
mod result;
mod ws;

pub use chat::*;
pub use model::*;
pub use result::*;
pub use ws::*;
