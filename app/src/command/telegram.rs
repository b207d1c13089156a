use crate::command::CommandStrategy;
use palaver_config::Config;
use palaver_conversation::TenantDirectory;
use palaver_telegram::{JsonFileLabelStore, TelegramBot};
use std::sync::Arc;
use tracing::info;

use super::{ChatOverrides, build_dispatcher, load_config};

/// Input for Telegram bot command.
pub struct TelegramInput {
    /// Optional bot token (overrides config)
    pub token: Option<String>,
    pub overrides: ChatOverrides,
}

/// Strategy for running the Telegram relay.
pub struct TelegramStrategy;

impl CommandStrategy for TelegramStrategy {
    type Input = TelegramInput;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        let config = load_config(input.overrides)?;

        if !config.telegram.enabled {
            anyhow::bail!("Telegram is not enabled in config. Set \"telegram.enabled\": true");
        }

        // Get token from input or config
        let token = if let Some(t) = input.token {
            t
        } else if !config.telegram.token.is_empty() {
            config.telegram.token.clone()
        } else {
            anyhow::bail!("Telegram bot token not configured. Set \"telegram.token\" in config");
        };

        info!("Starting Telegram bot...");

        let users_file = config
            .telegram
            .user_data_path(&Config::ensure_config_dir()?);
        info!("Tenant labels: {}", users_file.display());
        let tenants = Arc::new(TenantDirectory::open(JsonFileLabelStore::new(users_file)));

        let dispatcher = build_dispatcher(&config)?.with_tenants(Arc::clone(&tenants));
        let bot = TelegramBot::new(
            &token,
            Arc::new(dispatcher),
            tenants,
            config.telegram.admins.clone(),
        )?;

        info!("Telegram bot is running. Press Ctrl+C to stop.");
        bot.run().await?;

        Ok(())
    }
}
