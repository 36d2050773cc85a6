//! Chat backend trait — provider-agnostic interface to a chat-completion API.
//!
//! The session only talks to `ChatBackend`; the HTTP client for
//! OpenAI-compatible endpoints lives in `openai_compat`.

use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

pub mod openai_compat;

// ── Core Types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A chat-completion request as sent on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub stream: bool,
}

/// A complete (non-streamed) reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    /// Chain of thought, only returned by reasoner models.
    pub reasoning: Option<String>,
}

/// Incremental content fragments, in arrival order.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

// ── Backend Trait ───────────────────────────────────────────────────

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send the conversation and wait for the whole reply.
    async fn complete(&self, model: &str, messages: &[Message]) -> Result<Completion>;

    /// Send the conversation and yield content fragments as they arrive.
    async fn stream(&self, model: &str, messages: &[Message]) -> Result<DeltaStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_in_wire_format() {
        let messages = vec![
            Message::new(Role::System, "be brief"),
            Message::new(Role::User, "hi"),
        ];
        let req = ChatRequest {
            model: "deepseek-chat",
            messages: &messages,
            stream: true,
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            serde_json::json!({
                "model": "deepseek-chat",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hi"}
                ],
                "stream": true
            })
        );
    }
}
