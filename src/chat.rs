//! Chat backend client
//!
//! `POST <url>/chat` with `{ "userPrompt": ... }`, expecting
//! `{ "obj": { "reply": ... } }`. One attempt per call; retries are driven
//! by fresh utterances, never by the client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::ChatFailure;

/// Sends a prompt to the chat backend and returns its reply
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Perform one round trip
    ///
    /// # Errors
    ///
    /// Returns a `ChatFailure` on transport error, non-success status,
    /// timeout, or a body without `obj.reply`
    async fn send(&self, prompt: &str) -> std::result::Result<String, ChatFailure>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest<'a> {
    user_prompt: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    obj: ChatObject,
}

#[derive(Deserialize)]
struct ChatObject {
    reply: String,
}

/// Extract `obj.reply` from a response body
///
/// # Errors
///
/// Returns `ChatFailure::MalformedBody` for any other shape
pub fn parse_reply(body: &str) -> std::result::Result<String, ChatFailure> {
    serde_json::from_str::<ChatResponse>(body)
        .map(|r| r.obj.reply)
        .map_err(|e| ChatFailure::MalformedBody(e.to_string()))
}

/// HTTP implementation of `ChatClient`
pub struct HttpChatClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpChatClient {
    /// Create a client posting to `endpoint` with a per-request timeout
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Create a client from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        Self::new(config.chat_endpoint(), config.chat.timeout)
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn transport_failure(e: &reqwest::Error) -> ChatFailure {
    if e.is_timeout() {
        ChatFailure::Timeout
    } else {
        ChatFailure::Transport(e.to_string())
    }
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn send(&self, prompt: &str) -> std::result::Result<String, ChatFailure> {
        tracing::debug!(endpoint = %self.endpoint, chars = prompt.len(), "sending prompt");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&ChatRequest {
                user_prompt: prompt,
            })
            .send()
            .await
            .map_err(|e| transport_failure(&e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = %status, "chat backend error");
            return Err(ChatFailure::BadStatus(status.as_u16()));
        }

        let body = response.text().await.map_err(|e| transport_failure(&e))?;
        let reply = parse_reply(&body)?;

        tracing::debug!(chars = reply.len(), "reply received");
        Ok(reply)
    }
}
