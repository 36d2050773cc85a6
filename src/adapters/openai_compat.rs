//! OpenAI-compatible chat-completion client (DeepSeek, SiliconFlow).
//!
//! Non-streamed replies are plain JSON. Streamed replies are server-sent
//! events whose `data` is a chunk carrying `choices[0].delta.content`,
//! terminated by `data: [DONE]`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{future, StreamExt};
use serde::Deserialize;
use tracing::debug;
use zeroize::Zeroizing;

use super::*;
use crate::provider::Provider;

const DONE_SENTINEL: &str = "[DONE]";
const ERROR_BODY_LIMIT: usize = 500;

pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Zeroizing<String>,
}

impl OpenAiCompatClient {
    pub fn new(base_url: impl Into<String>, api_key: Zeroizing<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }

    pub fn for_provider(provider: Provider, api_key: Zeroizing<String>) -> Self {
        Self::new(provider.base_url(), api_key)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn send(&self, model: &str, messages: &[Message], stream: bool) -> Result<reqwest::Response> {
        let req = ChatRequest {
            model,
            messages,
            stream,
        };
        let start = std::time::Instant::now();
        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.api_key.as_str())
            .json(&req)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.base_url))?;

        let status = resp.status();
        debug!(
            model,
            stream,
            status = status.as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Chat completion response"
        );

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let body: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            anyhow::bail!("Chat completion failed ({}): {}", status.as_u16(), body);
        }
        Ok(resp)
    }
}

#[async_trait]
impl ChatBackend for OpenAiCompatClient {
    async fn complete(&self, model: &str, messages: &[Message]) -> Result<Completion> {
        let body: CompletionResponse = self
            .send(model, messages, false)
            .await?
            .json()
            .await
            .context("Malformed chat completion response")?;

        let message = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .context("Chat completion response has no choices")?;

        Ok(Completion {
            content: message.content.unwrap_or_default(),
            reasoning: message.reasoning_content,
        })
    }

    async fn stream(&self, model: &str, messages: &[Message]) -> Result<DeltaStream> {
        let resp = self.send(model, messages, true).await?;
        Ok(parse_sse_stream(resp))
    }
}

// ── Wire Types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

// ── Streaming ───────────────────────────────────────────────────────

/// Turn an SSE response into content fragments, stopping at `[DONE]`.
fn parse_sse_stream(response: reqwest::Response) -> DeltaStream {
    let fragments = response
        .bytes_stream()
        .eventsource()
        .take_while(|event| {
            future::ready(!matches!(event, Ok(e) if e.data.trim() == DONE_SENTINEL))
        })
        .filter_map(|event| async move {
            match event {
                Ok(event) if event.data.trim().is_empty() => None,
                Ok(event) => parse_chunk(&event.data).transpose(),
                Err(e) => Some(Err(anyhow!("SSE stream error: {e}"))),
            }
        });

    Box::pin(fragments)
}

/// Content of one stream chunk; `None` for role-only or empty deltas.
fn parse_chunk(data: &str) -> Result<Option<String>> {
    let chunk: StreamChunk = serde_json::from_str(data)
        .with_context(|| format!("Malformed stream chunk: {data}"))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|c| !c.is_empty()))
}
