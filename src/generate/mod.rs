//! Client for drafting challenger variant content via a chat-completions
//! API.
//!
//! Generation is an optional capability: the service runs without it and the
//! corresponding endpoint reports itself unavailable.

mod client;
mod types;

pub use client::GenerationClient;
pub use types::{ChatRequest, ChatResponse, Message, VariantDraft};
