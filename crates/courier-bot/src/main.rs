//! courier-bot — Telegram entry point.
//! Loads config, wires the Telegram transport and the completion client into
//! the coordinator, then long-polls until Ctrl+C.

mod telegram;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use courier_core::completion::CompletionClient;
use courier_core::config::Config;
use courier_core::coordinator::{Coordinator, Timings};
use courier_core::prompts::greeting;
use courier_core::store::ConversationStore;
use courier_core::transport::Transport;
use courier_core::types::SendOptions;

use telegram::{Inbound, TelegramClient, Update};

/// Back-off after a failed getUpdates call.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(3);

struct Bot {
    telegram: Arc<TelegramClient>,
    coordinator: Arc<Coordinator>,
    model: String,
}

impl Bot {
    async fn poll(&self) {
        let mut offset = 0;
        loop {
            match self.telegram.get_updates(offset).await {
                Ok(batch) => {
                    offset = batch.next_offset;
                    for update in &batch.updates {
                        self.dispatch(update);
                    }
                }
                Err(e) => {
                    warn!("getUpdates failed: {}", e);
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                }
            }
        }
    }

    /// Each message runs in its own task so users never wait on each other.
    fn dispatch(&self, update: &Update) {
        match telegram::route(update) {
            Some(Inbound::Text { user, text }) => {
                let coordinator = Arc::clone(&self.coordinator);
                tokio::spawn(async move {
                    coordinator.handle(user, &text).await;
                });
            }
            Some(Inbound::Command { user, name }) if name == "start" => {
                let telegram = Arc::clone(&self.telegram);
                let text = greeting(&self.model);
                tokio::spawn(async move {
                    if let Err(e) = telegram.send_message(user, &text, SendOptions::html()).await {
                        warn!("Failed to greet user {}: {}", user, e);
                    }
                });
            }
            Some(Inbound::Command { user, name }) => {
                info!("Ignoring /{} from user {}", name, user);
            }
            None => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let project_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let config = Config::load_or_default(&project_root.join("config.yaml"))?;
    let (token, _) = config.require_credentials()?;

    let telegram = Arc::new(TelegramClient::new(token)?);
    let completer = Arc::new(CompletionClient::new(&config)?);
    let coordinator = Arc::new(Coordinator::new(
        Timings::from_config(&config),
        Arc::new(ConversationStore::new()),
        telegram.clone(),
        completer,
    ));

    let bot = Bot {
        telegram,
        coordinator,
        model: config.model.clone(),
    };

    eprintln!("\n  ✅ Courier is running, relaying to {}", config.model);
    eprintln!("  Press Ctrl+C to stop.\n");

    // Graceful shutdown on Ctrl+C
    tokio::select! {
        _ = bot.poll() => {}
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Shutdown signal received, stopping...");
        }
    }

    eprintln!("  🛑 Courier stopped.");
    Ok(())
}
