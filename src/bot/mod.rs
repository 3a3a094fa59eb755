mod commands;

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::BotConfig;
use crate::db::SecretRepository;
use crate::error::Result;
use crate::essay::EssayService;
use crate::services::TelegramClient;

const RETRY_DELAY: Duration = Duration::from_secs(5);

struct RunningBot {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the single Telegram polling task. Constructed once in `main` and
/// shared through the HTTP state.
pub struct BotService {
    client: Option<TelegramClient>,
    essays: EssayService,
    poll_timeout_secs: u64,
    running: Mutex<Option<RunningBot>>,
}

impl BotService {
    pub fn new(client: Option<TelegramClient>, essays: EssayService, poll_timeout_secs: u64) -> Self {
        Self {
            client,
            essays,
            poll_timeout_secs,
            running: Mutex::new(None),
        }
    }

    /// Builds the service from config, falling back to the `telegram` secret
    /// when no token is configured.
    pub async fn resolve(
        config: &BotConfig,
        secrets: &SecretRepository,
        essays: EssayService,
    ) -> Result<Self> {
        let mut token = config.token.clone();
        let mut base_url = config.base_url.clone();
        if token.is_none() {
            if let Some(secret) = secrets.lookup("telegram").await {
                token = Some(secret.api_key).filter(|k| !k.is_empty());
                if !secret.uri.is_empty() {
                    base_url = secret.uri;
                }
            }
        }

        let client = token
            .map(|token| TelegramClient::new(token, &base_url, config.poll_timeout_secs))
            .transpose()?;
        Ok(Self::new(client, essays, config.poll_timeout_secs))
    }

    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|bot| !bot.handle.is_finished()) {
            tracing::info!("Bot already running");
            return;
        }
        let Some(client) = self.client.clone() else {
            tracing::warn!("No Telegram bot token configured, bot not started");
            return;
        };

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            client,
            self.essays.clone(),
            self.poll_timeout_secs,
            cancel.clone(),
        ));
        *running = Some(RunningBot { cancel, handle });
        tracing::info!("Bot started");
    }

    pub async fn stop(&self) {
        let Some(bot) = self.running.lock().await.take() else {
            return;
        };
        bot.cancel.cancel();
        if let Err(e) = bot.handle.await {
            tracing::error!("Bot task ended abnormally: {}", e);
        }
        tracing::info!("Bot stopped");
    }

    #[cfg(test)]
    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|bot| !bot.handle.is_finished())
    }
}

async fn poll_loop(
    client: TelegramClient,
    essays: EssayService,
    poll_timeout_secs: u64,
    cancel: CancellationToken,
) {
    match client.get_me().await {
        Ok(me) => tracing::info!(
            "Polling as @{} ({})",
            me.username.as_deref().unwrap_or("unknown"),
            me.id
        ),
        Err(e) => tracing::warn!("Bot identity check failed: {}", e),
    }

    let mut offset = None;
    loop {
        let updates = tokio::select! {
            _ = cancel.cancelled() => break,
            updates = client.get_updates(offset, poll_timeout_secs) => updates,
        };

        match updates {
            Ok(updates) => {
                for update in updates {
                    offset = Some(update.update_id + 1);
                    let Some(message) = update.message else {
                        continue;
                    };
                    if let Err(e) = commands::handle_message(&client, &essays, &message).await {
                        tracing::error!("Failed to handle bot message: {}", e);
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Polling failed: {}", e);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(RETRY_DELAY) => {}
                }
            }
        }
    }
}
