//! Test doubles shared by the unit tests: a recording transport, a scripted
//! completer, and a local fake Chat Completions endpoint.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::completion::{Completer, CompletionResult};
use crate::error::TransportError;
use crate::store::SharedConversation;
use crate::transport::Transport;
use crate::types::{Message, MessageHandle, SendOptions, UserId};

// ── Transport ──

#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub user: UserId,
    pub text: String,
    pub opts: SendOptions,
    pub handle: MessageHandle,
}

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    edits: Mutex<Vec<(MessageHandle, String)>>,
    deleted: Mutex<Vec<MessageHandle>>,
    next_id: AtomicI64,
    fail_edits: bool,
}

impl RecordingTransport {
    /// Every edit and delete fails, as if the user removed the message.
    pub fn failing_edits() -> Self {
        Self {
            fail_edits: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, user: UserId) -> Vec<Sent> {
        self.sent().into_iter().filter(|s| s.user == user).collect()
    }

    pub fn edits(&self) -> Vec<(MessageHandle, String)> {
        self.edits.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<MessageHandle> {
        self.deleted.lock().unwrap().clone()
    }

    fn refusal() -> TransportError {
        TransportError::Api {
            code: 400,
            description: "Bad Request: message to edit not found".into(),
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_message(
        &self,
        user: UserId,
        text: &str,
        opts: SendOptions,
    ) -> Result<MessageHandle, TransportError> {
        let handle = MessageHandle {
            chat_id: user.0,
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
        };
        self.sent.lock().unwrap().push(Sent {
            user,
            text: text.to_string(),
            opts,
            handle,
        });
        Ok(handle)
    }

    async fn edit_message(&self, handle: MessageHandle, text: &str) -> Result<(), TransportError> {
        if self.fail_edits {
            return Err(Self::refusal());
        }
        self.edits.lock().unwrap().push((handle, text.to_string()));
        Ok(())
    }

    async fn delete_message(&self, handle: MessageHandle) -> Result<(), TransportError> {
        self.deleted.lock().unwrap().push(handle);
        if self.fail_edits {
            return Err(Self::refusal());
        }
        Ok(())
    }
}

// ── Completer ──

/// Answers with queued results, then with "ok". Behaves like the real
/// client towards the conversation.
pub struct ScriptedCompleter {
    replies: Mutex<VecDeque<CompletionResult>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedCompleter {
    pub fn new(replies: impl IntoIterator<Item = CompletionResult>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Messages seen by each call, in order.
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Completer for ScriptedCompleter {
    async fn complete(&self, conversation: &SharedConversation) -> CompletionResult {
        let mut conv = conversation.lock().await;
        conv.ensure_system("system");
        self.calls.lock().unwrap().push(conv.messages().to_vec());

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("ok".to_string()));
        if let Ok(ref text) = reply {
            conv.push_assistant(text.as_str());
        }
        reply
    }
}

pub struct PanickingCompleter;

#[async_trait]
impl Completer for PanickingCompleter {
    async fn complete(&self, _conversation: &SharedConversation) -> CompletionResult {
        panic!("completer blew up");
    }
}

// ── Fake endpoint ──

#[derive(Debug, Clone)]
pub struct Endpoint {
    status: StatusCode,
    body: String,
    delay: Duration,
}

impl Endpoint {
    /// 200 with a well-formed completion carrying `text`.
    pub fn reply(text: &str) -> Self {
        let body = json!({
            "choices": [{
                "message": { "role": "assistant", "content": text }
            }]
        });
        Self::status(StatusCode::OK, &body.to_string())
    }

    pub fn status(status: StatusCode, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub authorization: Option<String>,
    pub body: Value,
}

pub struct RunningEndpoint {
    pub base_url: String,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl RunningEndpoint {
    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

/// Serve `endpoint` at `POST /chat/completions` on a random local port.
pub async fn spawn_endpoint(endpoint: Endpoint) -> RunningEndpoint {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_by_handler = Arc::clone(&seen);

    let app = Router::new().route(
        "/chat/completions",
        post(move |headers: HeaderMap, Json(body): Json<Value>| {
            let endpoint = endpoint.clone();
            let seen = Arc::clone(&seen_by_handler);
            async move {
                let authorization = headers
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);
                seen.lock().unwrap().push(SeenRequest {
                    authorization,
                    body,
                });
                if !endpoint.delay.is_zero() {
                    tokio::time::sleep(endpoint.delay).await;
                }
                (endpoint.status, endpoint.body)
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    RunningEndpoint {
        base_url: format!("http://{}", addr),
        seen,
    }
}
