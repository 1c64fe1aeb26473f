//! Error taxonomy. Nothing here is fatal to the process.

use thiserror::Error;

/// Why a message was not admitted. Recovered locally with a notice.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("a reply is still being generated")]
    AlreadyInFlight,

    #[error("rate limited, {remaining_secs}s remaining")]
    RateLimited { remaining_secs: u64 },
}

/// Failure of a completion call. Surfaced to the user as a diagnostic line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    /// Endpoint answered with a non-success status.
    #[error("{message} (code {status})")]
    Api { status: u16, message: String },

    /// Timeout, connection failure or unreadable response.
    #[error("{0}")]
    Transport(String),
}

impl CompletionError {
    pub fn kind(&self) -> &'static str {
        match self {
            CompletionError::Api { .. } => "api_error",
            CompletionError::Transport(_) => "transport_error",
        }
    }

    /// User-visible diagnostic line.
    pub fn diagnostic(&self) -> String {
        format!("⚠️ Error: {}", self)
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CompletionError::Transport(format!("request timed out: {}", e))
        } else {
            CompletionError::Transport(e.to_string())
        }
    }
}

/// Failure of the chat transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The chat API accepted the request but refused it.
    #[error("chat API error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}
