//! Telegram Bot API over reqwest — long polling, inbound routing, and the
//! `Transport` implementation used by the coordinator.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use courier_core::error::TransportError;
use courier_core::transport::Transport;
use courier_core::types::{MessageHandle, ParseMode, SendOptions, UserId};

const API_BASE: &str = "https://api.telegram.org";

/// Server-side long-poll timeout for getUpdates.
pub const POLL_TIMEOUT_SECS: u64 = 30;

// ── Wire types ──

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
    chat: Chat,
}

/// One getUpdates result: the updates that decoded, and the offset that
/// acknowledges every entry seen, decodable or not.
#[derive(Debug)]
pub struct UpdateBatch {
    pub next_offset: i64,
    pub updates: Vec<Update>,
}

/// Decode entries one by one so a single unexpected update cannot stall
/// the poller on the same batch.
fn decode_batch(offset: i64, raw: Vec<Value>) -> UpdateBatch {
    let mut next_offset = offset;
    let mut updates = Vec::with_capacity(raw.len());
    for entry in raw {
        let raw_id = entry.get("update_id").and_then(Value::as_i64);
        match serde_json::from_value::<Update>(entry) {
            Ok(update) => {
                next_offset = next_offset.max(update.update_id + 1);
                updates.push(update);
            }
            Err(e) => {
                if let Some(id) = raw_id {
                    next_offset = next_offset.max(id + 1);
                }
                warn!("Skipping undecodable update {:?}: {}", raw_id, e);
            }
        }
    }
    UpdateBatch {
        next_offset,
        updates,
    }
}

// ── Inbound routing ──

#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    /// `/name args`, name lowercased and without `@botname`.
    Command { user: UserId, name: String },
    Text { user: UserId, text: String },
}

/// Classify an update. Only private-chat text messages are routed.
pub fn route(update: &Update) -> Option<Inbound> {
    let message = update.message.as_ref()?;
    if message.chat.kind != "private" {
        return None;
    }
    let user = UserId(message.from.as_ref()?.id);
    let text = message.text.as_deref()?;

    if let Some(command) = text.strip_prefix('/') {
        let word = command.split_whitespace().next().unwrap_or("");
        let name = word.split('@').next().unwrap_or("").to_lowercase();
        return Some(Inbound::Command { user, name });
    }
    Some(Inbound::Text {
        user,
        text: text.to_string(),
    })
}

fn send_body(user: UserId, text: &str, opts: SendOptions) -> Value {
    let mut body = json!({
        "chat_id": user.0,
        "text": text,
    });
    if opts.parse_mode == ParseMode::Html {
        body["parse_mode"] = json!("HTML");
    }
    if opts.disable_link_preview {
        body["link_preview_options"] = json!({"is_disabled": true});
    }
    body
}

// ── Client ──

pub struct TelegramClient {
    http: reqwest::Client,
    base: String,
}

impl TelegramClient {
    pub fn new(token: &str) -> Result<Self> {
        Self::with_base(API_BASE, token)
    }

    pub fn with_base(api_base: &str, token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(POLL_TIMEOUT_SECS + 10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T, TransportError> {
        let response = self
            .http
            .post(format!("{}/{}", self.base, method))
            .json(body)
            .send()
            .await?;

        // Failures come back as JSON with ok=false, whatever the status.
        let data: ApiResponse<T> = response.json().await?;
        if !data.ok {
            return Err(TransportError::Api {
                code: data.error_code.unwrap_or_default(),
                description: data.description.unwrap_or_default(),
            });
        }
        data.result
            .ok_or_else(|| TransportError::Decode(format!("{} returned no result", method)))
    }

    /// Long-poll for updates with id >= `offset`.
    pub async fn get_updates(&self, offset: i64) -> Result<UpdateBatch, TransportError> {
        let raw: Vec<Value> = self
            .call(
                "getUpdates",
                &json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message"],
                }),
            )
            .await?;
        Ok(decode_batch(offset, raw))
    }
}

#[async_trait]
impl Transport for TelegramClient {
    async fn send_message(
        &self,
        user: UserId,
        text: &str,
        opts: SendOptions,
    ) -> Result<MessageHandle, TransportError> {
        let sent: SentMessage = self.call("sendMessage", &send_body(user, text, opts)).await?;
        Ok(MessageHandle {
            chat_id: sent.chat.id,
            message_id: sent.message_id,
        })
    }

    async fn edit_message(&self, handle: MessageHandle, text: &str) -> Result<(), TransportError> {
        self.call::<Value>(
            "editMessageText",
            &json!({
                "chat_id": handle.chat_id,
                "message_id": handle.message_id,
                "text": text,
            }),
        )
        .await?;
        Ok(())
    }

    async fn delete_message(&self, handle: MessageHandle) -> Result<(), TransportError> {
        self.call::<Value>(
            "deleteMessage",
            &json!({
                "chat_id": handle.chat_id,
                "message_id": handle.message_id,
            }),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    fn update(value: Value) -> Update {
        serde_json::from_value(value).unwrap()
    }

    fn private_text(text: &str) -> Update {
        update(json!({
            "update_id": 10,
            "message": {
                "message_id": 5,
                "from": {"id": 42, "is_bot": false, "first_name": "A"},
                "chat": {"id": 42, "type": "private"},
                "date": 1700000000,
                "text": text
            }
        }))
    }

    #[test]
    fn test_route_private_text() {
        assert_eq!(
            route(&private_text("hello")),
            Some(Inbound::Text {
                user: UserId(42),
                text: "hello".into()
            })
        );
    }

    #[test]
    fn test_route_commands() {
        assert_eq!(
            route(&private_text("/start")),
            Some(Inbound::Command {
                user: UserId(42),
                name: "start".into()
            })
        );
        assert_eq!(
            route(&private_text("/Start@courier_bot now")),
            Some(Inbound::Command {
                user: UserId(42),
                name: "start".into()
            })
        );
    }

    #[test]
    fn test_route_skips_groups_and_non_text() {
        let group = update(json!({
            "update_id": 11,
            "message": {
                "message_id": 6,
                "from": {"id": 42},
                "chat": {"id": -100, "type": "supergroup"},
                "text": "hi all"
            }
        }));
        assert_eq!(route(&group), None);

        let sticker = update(json!({
            "update_id": 12,
            "message": {
                "message_id": 7,
                "from": {"id": 42},
                "chat": {"id": 42, "type": "private"},
                "sticker": {"file_id": "x"}
            }
        }));
        assert_eq!(route(&sticker), None);

        let edited = update(json!({"update_id": 13, "edited_message": {}}));
        assert_eq!(route(&edited), None);
    }

    #[test]
    fn test_send_body_modes() {
        let html = send_body(UserId(1), "<b>x</b>", SendOptions::html());
        assert_eq!(html["parse_mode"], "HTML");
        assert_eq!(html["link_preview_options"]["is_disabled"], true);

        let plain = send_body(UserId(1), "x", SendOptions::plain());
        assert!(plain.get("parse_mode").is_none());
        assert!(plain.get("link_preview_options").is_none());
    }

    // ── Local Bot API stub ──

    struct Stub {
        base: String,
        seen: Arc<Mutex<Vec<(String, Value)>>>,
    }

    impl Stub {
        fn client(&self) -> TelegramClient {
            TelegramClient::with_base(&self.base, "TOKEN").unwrap()
        }

        fn requests(&self) -> Vec<(String, Value)> {
            self.seen.lock().unwrap().clone()
        }
    }

    /// Answer every `POST /botTOKEN/<method>` with `status` and `reply`.
    async fn spawn_stub(status: StatusCode, reply: Value) -> Stub {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_handler = Arc::clone(&seen);

        let app = Router::new().route(
            "/botTOKEN/{method}",
            post(move |Path(method): Path<String>, Json(body): Json<Value>| {
                let seen = Arc::clone(&seen_by_handler);
                let reply = reply.clone();
                async move {
                    seen.lock().unwrap().push((method, body));
                    (status, Json(reply))
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Stub {
            base: format!("http://{}", addr),
            seen,
        }
    }

    #[tokio::test]
    async fn test_send_message_returns_handle() {
        let stub = spawn_stub(
            StatusCode::OK,
            json!({
                "ok": true,
                "result": {
                    "message_id": 77,
                    "chat": {"id": 42, "type": "private"},
                    "date": 1700000000,
                    "text": "hi"
                }
            }),
        )
        .await;

        let handle = stub
            .client()
            .send_message(UserId(42), "<b>hi</b>", SendOptions::html())
            .await
            .unwrap();
        assert_eq!(
            handle,
            MessageHandle {
                chat_id: 42,
                message_id: 77
            }
        );

        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        let (method, body) = &requests[0];
        assert_eq!(method, "sendMessage");
        assert_eq!(body["chat_id"], 42);
        assert_eq!(body["text"], "<b>hi</b>");
        assert_eq!(body["parse_mode"], "HTML");
        assert_eq!(body["link_preview_options"]["is_disabled"], true);
    }

    #[tokio::test]
    async fn test_edit_and_delete_post_handle() {
        let stub = spawn_stub(StatusCode::OK, json!({"ok": true, "result": true})).await;
        let client = stub.client();
        let handle = MessageHandle {
            chat_id: 42,
            message_id: 9,
        };

        client.edit_message(handle, "⌛ 3").await.unwrap();
        client.delete_message(handle).await.unwrap();

        let requests = stub.requests();
        assert_eq!(requests[0].0, "editMessageText");
        assert_eq!(requests[0].1["message_id"], 9);
        assert_eq!(requests[0].1["text"], "⌛ 3");
        assert_eq!(requests[1].0, "deleteMessage");
        assert_eq!(requests[1].1["chat_id"], 42);
    }

    #[tokio::test]
    async fn test_api_failure_becomes_api_error() {
        let stub = spawn_stub(
            StatusCode::BAD_REQUEST,
            json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: message to delete not found"
            }),
        )
        .await;

        let err = stub
            .client()
            .delete_message(MessageHandle {
                chat_id: 42,
                message_id: 1,
            })
            .await
            .unwrap_err();
        match err {
            TransportError::Api { code, description } => {
                assert_eq!(code, 400);
                assert!(description.contains("not found"));
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_result_is_decode_error() {
        let stub = spawn_stub(StatusCode::OK, json!({"ok": true})).await;

        let err = stub
            .client()
            .send_message(UserId(42), "hi", SendOptions::plain())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
    }

    #[tokio::test]
    async fn test_get_updates_skips_undecodable_entries() {
        let stub = spawn_stub(
            StatusCode::OK,
            json!({
                "ok": true,
                "result": [
                    {
                        "update_id": 5,
                        "message": {
                            "message_id": 1,
                            "from": {"id": 42},
                            "chat": {"id": 42, "type": "private"},
                            "text": "hello"
                        }
                    },
                    {"update_id": 6, "message": {"chat": "not a chat"}}
                ]
            }),
        )
        .await;

        let batch = stub.client().get_updates(3).await.unwrap();
        assert_eq!(batch.next_offset, 7);
        assert_eq!(batch.updates.len(), 1);
        assert_eq!(
            route(&batch.updates[0]),
            Some(Inbound::Text {
                user: UserId(42),
                text: "hello".into()
            })
        );

        let requests = stub.requests();
        let (method, body) = &requests[0];
        assert_eq!(method, "getUpdates");
        assert_eq!(body["offset"], 3);
        assert_eq!(body["timeout"], POLL_TIMEOUT_SECS);
    }

    #[test]
    fn test_decode_batch_keeps_offset_without_ids() {
        let batch = decode_batch(10, vec![json!({"no_id": true}), json!("junk")]);
        assert_eq!(batch.next_offset, 10);
        assert!(batch.updates.is_empty());

        let batch = decode_batch(10, Vec::new());
        assert_eq!(batch.next_offset, 10);
    }
}
