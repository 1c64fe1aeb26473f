//! courier-core — Relay logic, no chat platform.
//!
//! This crate holds the per-user request gate, the conversation store, the
//! Chat Completions client and the Telegram HTML sanitizer. The chat
//! platform is reached only through the [`transport::Transport`] trait, so
//! frontends (the Telegram bot) plug in from outside.

pub mod completion;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod prompts;
pub mod sanitizer;
pub mod store;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;
