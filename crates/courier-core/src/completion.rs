//! Completion client — one Chat Completions call per turn.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::Config;
use crate::error::CompletionError;
use crate::store::SharedConversation;
use crate::types::Message;

/// Reply text, or why there is none.
pub type CompletionResult = std::result::Result<String, CompletionError>;

/// Max chars of an error body written to the log.
const MAX_LOGGED_BODY: usize = 500;

/// Max chars of an error body quoted back to the user.
const MAX_ERROR_EXCERPT: usize = 200;

#[async_trait]
pub trait Completer: Send + Sync {
    /// Complete `conversation`. On success the reply has been appended to
    /// it as an assistant message.
    async fn complete(&self, conversation: &SharedConversation) -> CompletionResult;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

/// Chat Completions client for OpenRouter or any compatible endpoint.
pub struct CompletionClient {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    system_prompt: String,
}

impl CompletionClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
        })
    }

    async fn send(&self, messages: &[Message]) -> CompletionResult {
        info!(
            "chat_completions request: model={} msg_count={}",
            self.model,
            messages.len()
        );

        let mut request = self.http.post(&self.url).json(&ChatRequest {
            model: &self.model,
            messages,
        });
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let excerpt: String = body.chars().take(MAX_LOGGED_BODY).collect();
            error!("API HTTP {}: {} | url={}", status, excerpt, self.url);

            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or_else(|| fallback_message(status.as_u16(), &body));
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let data: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| CompletionError::Transport(format!("malformed API response: {}", e)))?;

        data.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CompletionError::Transport("API response carried no reply".to_string()))
    }
}

/// `HTTP <status>` plus the start of the body, for error bodies without a
/// usable `error.message`.
fn fallback_message(status: u16, body: &str) -> String {
    let excerpt: String = body.trim().chars().take(MAX_ERROR_EXCERPT).collect();
    if excerpt.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, excerpt)
    }
}

#[async_trait]
impl Completer for CompletionClient {
    async fn complete(&self, conversation: &SharedConversation) -> CompletionResult {
        // Snapshot so the lock is not held across the network call.
        let messages = {
            let mut conv = conversation.lock().await;
            conv.ensure_system(&self.system_prompt);
            conv.messages().to_vec()
        };

        let reply = self.send(&messages).await?;
        conversation.lock().await.push_assistant(reply.as_str());
        Ok(reply)
    }
}
