//! Chat transport seam. The coordinator only talks to users through this.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::types::{MessageHandle, SendOptions, UserId};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `text` to `user`.
    async fn send_message(
        &self,
        user: UserId,
        text: &str,
        opts: SendOptions,
    ) -> Result<MessageHandle, TransportError>;

    /// Replace the text of an earlier message. Callers treat this as
    /// best-effort.
    async fn edit_message(&self, handle: MessageHandle, text: &str) -> Result<(), TransportError>;

    /// Remove an earlier message. Callers treat this as best-effort.
    async fn delete_message(&self, handle: MessageHandle) -> Result<(), TransportError>;
}
