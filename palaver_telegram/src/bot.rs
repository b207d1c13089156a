use crate::{Command, Error, Result};
use palaver_conversation::{Dispatcher as ChatDispatcher, TenantDirectory};
use std::{sync::Arc, time::Duration};
use teloxide::prelude::*;
use tokio::time::sleep;
use tracing::{info, warn};

/// Telegram relay in front of the session engine
#[derive(Clone)]
pub struct TelegramBot {
    /// Teloxide bot instance
    pub bot: Bot,
    /// Shared session engine; one conversation per chat
    pub(crate) chat: Arc<ChatDispatcher>,
    /// Chat id to display name
    pub(crate) tenants: Arc<TenantDirectory>,
    /// Chat ids allowed to run privileged commands
    admins: Arc<Vec<i64>>,
}

impl TelegramBot {
    pub fn new(
        token: &str,
        chat: Arc<ChatDispatcher>,
        tenants: Arc<TenantDirectory>,
        admins: Vec<i64>,
    ) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(Error::Config("Telegram bot token is empty".into()));
        }
        if admins.is_empty() {
            warn!("No Telegram admins configured; parameter commands are disabled for every chat");
        }

        Ok(Self {
            bot: Bot::new(token.trim()),
            chat,
            tenants,
            admins: Arc::new(admins),
        })
    }

    /// Check if a chat may run privileged commands
    #[must_use]
    pub fn is_admin(&self, chat_id: i64) -> bool {
        self.admins.contains(&chat_id)
    }

    /// Test connection to Telegram API with backoff retry.
    /// Retries indefinitely until connection succeeds.
    async fn test_connection(&self) -> Result<()> {
        let mut attempt = 1u64;
        loop {
            match self.bot.get_me().await {
                Ok(bot_user) => {
                    info!(
                        "Connected to Telegram API: @{} (id: {})",
                        bot_user
                            .user
                            .username
                            .unwrap_or_else(|| "no username".to_string()),
                        bot_user.user.id
                    );
                    return Ok(());
                }
                Err(e) => {
                    let delay = reconnect_delay(attempt);
                    warn!(
                        "Connection attempt {attempt} failed: {e}. Retrying in {}s...",
                        delay.as_secs()
                    );

                    // Only show detailed help on first failure
                    if attempt == 1 {
                        warn!("This may be due to:");
                        warn!("  - Network connectivity issues");
                        warn!("  - Firewall blocking api.telegram.org");
                        warn!("  - Invalid bot token");
                        warn!("  - Proxy or VPN configuration required");
                    }

                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Run the bot
    pub async fn run(self) -> Result<()> {
        use teloxide::dispatching::{Dispatcher, UpdateFilterExt};
        use teloxide::dptree;
        use teloxide::types::Update;

        self.test_connection().await?;

        if let Err(e) = self.bot.set_my_commands(Command::bot_commands()).await {
            warn!("Could not publish the command menu: {e}");
        }

        let bot = self.bot.clone();

        let schema = dptree::entry().branch(Update::filter_message().endpoint({
            let relay = self.clone();
            move |_bot: Bot, msg: teloxide::types::Message| {
                let relay = relay.clone();
                async move { crate::handler::handle_message(relay, msg).await }
            }
        }));

        info!("Relaying chats through the {} template", self.chat.template().id);
        Dispatcher::builder(bot, schema)
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;

        Ok(())
    }
}

/// Wait before reconnect attempt `attempt`: 2s, 4s, 6s, 8s, then 10s.
fn reconnect_delay(attempt: u64) -> Duration {
    const INITIAL_DELAY_SECS: u64 = 2;
    const MAX_DELAY_SECS: u64 = 10;
    Duration::from_secs(INITIAL_DELAY_SECS.saturating_mul(attempt).min(MAX_DELAY_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use palaver_conversation::{GenerationPipeline, LabelStore, Labels, SessionManager};
    use palaver_core::{FragmentStream, GenerationRequest, InferenceEngine, Template, TemplateId};

    struct Idle;

    impl InferenceEngine for Idle {
        fn generate(&self, _request: GenerationRequest) -> FragmentStream {
            Box::pin(stream::empty())
        }

        fn name(&self) -> &str {
            "idle"
        }
    }

    struct NoStore;

    impl LabelStore for NoStore {
        fn load(&self) -> anyhow::Result<Labels> {
            Ok(Labels::new())
        }

        fn save(&self, _labels: &Labels) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn relay(token: &str, admins: Vec<i64>) -> Result<TelegramBot> {
        let chat = ChatDispatcher::new(
            Arc::new(SessionManager::default()),
            GenerationPipeline::new(Arc::new(Idle)),
            Template::get(TemplateId::ChatMl),
        );
        TelegramBot::new(
            token,
            Arc::new(chat),
            Arc::new(TenantDirectory::open(NoStore)),
            admins,
        )
    }

    #[test]
    fn empty_token_is_a_config_error() {
        assert!(matches!(relay("  ", vec![]), Err(Error::Config(_))));
    }

    #[test]
    fn only_listed_chats_are_admins() {
        let bot = relay("123:abc", vec![7, -100]).unwrap();
        assert!(bot.is_admin(7));
        assert!(bot.is_admin(-100));
        assert!(!bot.is_admin(8));
    }

    #[test]
    fn reconnect_delay_grows_then_caps() {
        let secs: Vec<u64> = (1..=7).map(|a| reconnect_delay(a).as_secs()).collect();
        assert_eq!(secs, vec![2, 4, 6, 8, 10, 10, 10]);
    }
}
