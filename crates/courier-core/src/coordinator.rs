//! Request coordinator — the per-user gate around one completion turn.
//!
//! A message is admitted only if the user has nothing in flight and the
//! minimum interval since their last admitted message has passed. An
//! admitted message runs two activities side by side and waits for both:
//! a cosmetic countdown that edits a status message once per second, and
//! the real completion after its own pre-delay. Then the status message is
//! removed and the sanitized reply (or a diagnostic) is sent.
//!
//! The busy flag is cleared by a drop guard, so it is released on every
//! path out of [`Coordinator::handle`], panics and task cancellation
//! included.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::completion::{Completer, CompletionResult};
use crate::config::Config;
use crate::error::{CompletionError, Rejection};
use crate::prompts::{
    countdown_status, rate_limited_notice, BUSY_NOTICE, EMPTY_REPLY_NOTICE,
};
use crate::sanitizer::sanitize;
use crate::store::{ConversationStore, SharedConversation};
use crate::transport::Transport;
use crate::types::{MessageHandle, SendOptions, UserId};

const TICK: Duration = Duration::from_secs(1);

/// Timing knobs. Countdown and pre-delay are independent of each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub countdown_seconds: u64,
    pub pre_delay: Duration,
    pub min_interval: Duration,
}

impl Timings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            countdown_seconds: config.countdown_seconds,
            pre_delay: config.pre_delay(),
            min_interval: config.min_interval(),
        }
    }
}

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Blank message, nothing done.
    Ignored,
    Rejected(Rejection),
    /// The model's reply was delivered.
    Delivered,
    /// A diagnostic was delivered instead of a reply.
    Failed(CompletionError),
}

#[derive(Debug, Default)]
struct GateState {
    busy: bool,
    /// Admission time of the last admitted message.
    last_request_at: Option<Instant>,
}

type Gates = Mutex<HashMap<UserId, GateState>>;

fn lock(gates: &Gates) -> MutexGuard<'_, HashMap<UserId, GateState>> {
    // Entries stay consistent even if a holder panicked.
    gates.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the busy flag of one user when dropped.
struct GateGuard<'a> {
    gates: &'a Gates,
    user: UserId,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        if let Some(gate) = lock(self.gates).get_mut(&self.user) {
            gate.busy = false;
        }
    }
}

/// Whole seconds, rounded up.
fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

pub struct Coordinator {
    timings: Timings,
    store: Arc<ConversationStore>,
    gates: Gates,
    transport: Arc<dyn Transport>,
    completer: Arc<dyn Completer>,
}

impl Coordinator {
    pub fn new(
        timings: Timings,
        store: Arc<ConversationStore>,
        transport: Arc<dyn Transport>,
        completer: Arc<dyn Completer>,
    ) -> Self {
        Self {
            timings,
            store,
            gates: Mutex::new(HashMap::new()),
            transport,
            completer,
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn is_busy(&self, user: UserId) -> bool {
        lock(&self.gates).get(&user).is_some_and(|g| g.busy)
    }

    /// Run the admission policy for `user` at `now`. On success the user is
    /// marked busy until the returned guard is dropped.
    fn admit(&self, user: UserId, now: Instant) -> Result<GateGuard<'_>, Rejection> {
        let mut gates = lock(&self.gates);
        let gate = gates.entry(user).or_default();

        if gate.busy {
            return Err(Rejection::AlreadyInFlight);
        }
        if let Some(last) = gate.last_request_at {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.timings.min_interval {
                return Err(Rejection::RateLimited {
                    remaining_secs: ceil_secs(self.timings.min_interval - elapsed),
                });
            }
        }

        gate.busy = true;
        gate.last_request_at = Some(now);
        Ok(GateGuard {
            gates: &self.gates,
            user,
        })
    }

    /// Handle one inbound text message from `user`.
    pub async fn handle(&self, user: UserId, text: &str) -> Outcome {
        let text = text.trim();
        if text.is_empty() {
            return Outcome::Ignored;
        }

        let _gate = match self.admit(user, Instant::now()) {
            Ok(guard) => guard,
            Err(rejection) => {
                info!("Rejected message from user {}: {}", user, rejection);
                let notice = match rejection {
                    Rejection::AlreadyInFlight => BUSY_NOTICE.to_string(),
                    Rejection::RateLimited { remaining_secs } => rate_limited_notice(remaining_secs),
                };
                self.deliver(user, &notice, SendOptions::plain()).await;
                return Outcome::Rejected(rejection);
            }
        };

        let request_id = Uuid::new_v4();
        info!(
            "[{}] admitted message from user {} ({} chars)",
            request_id,
            user,
            text.chars().count()
        );

        let conversation = self.store.get_or_create(user).await;
        conversation.lock().await.push_user(text);

        let status = self.show_status(user).await;
        let ((), result) = tokio::join!(self.countdown(status), self.generate(&conversation));

        if let Some(handle) = status {
            // Best-effort: the user may have deleted it already.
            let _ = self.transport.delete_message(handle).await;
        }

        let outcome = match result {
            Ok(reply) => {
                let html = sanitize(&reply);
                if html.is_empty() {
                    warn!("[{}] reply was empty after sanitizing", request_id);
                    self.deliver(user, EMPTY_REPLY_NOTICE, SendOptions::plain())
                        .await;
                } else {
                    self.deliver(user, &html, SendOptions::html()).await;
                }
                Outcome::Delivered
            }
            Err(e) => {
                warn!("[{}] completion failed ({}): {}", request_id, e.kind(), e);
                self.deliver(user, &e.diagnostic(), SendOptions::plain())
                    .await;
                Outcome::Failed(e)
            }
        };

        info!("[{}] done for user {}", request_id, user);
        outcome
    }

    async fn show_status(&self, user: UserId) -> Option<MessageHandle> {
        let text = countdown_status(self.timings.countdown_seconds);
        match self
            .transport
            .send_message(user, &text, SendOptions::plain())
            .await
        {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Could not send status message to user {}: {}", user, e);
                None
            }
        }
    }

    /// One tick per second from the configured count down to 1. Runs its
    /// full length even without a status message to edit.
    async fn countdown(&self, status: Option<MessageHandle>) {
        let total = self.timings.countdown_seconds;
        for remaining in (1..=total).rev() {
            if remaining < total {
                if let Some(handle) = status {
                    let _ = self
                        .transport
                        .edit_message(handle, &countdown_status(remaining))
                        .await;
                }
            }
            tokio::time::sleep(TICK).await;
        }
    }

    async fn generate(&self, conversation: &SharedConversation) -> CompletionResult {
        tokio::time::sleep(self.timings.pre_delay).await;
        self.completer.complete(conversation).await
    }

    async fn deliver(&self, user: UserId, text: &str, opts: SendOptions) {
        if let Err(e) = self.transport.send_message(user, text, opts).await {
            error!("Failed to deliver message to user {}: {}", user, e);
        }
    }
}
