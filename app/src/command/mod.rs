//! Static strategy pattern for CLI commands.
//!
//! Each command is a separate strategy with its own input type. The chat and
//! telegram strategies share [`build_dispatcher`], which turns the config file
//! plus command-line overrides into a ready session engine.

use palaver_config::{ChatConfig, Config};
use palaver_conversation::{Dispatcher, GenerationPipeline, SessionManager};
use palaver_core::InferenceEngine;
use palaver_providers::{LlamaServerEngine, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod chat;
mod info;
mod init;
mod telegram;
mod templates;
mod version;

pub use chat::{ChatInput, ChatStrategy};
pub use info::InfoStrategy;
pub use init::InitStrategy;
pub use telegram::{TelegramInput, TelegramStrategy};
pub use templates::{TemplatesInput, TemplatesStrategy};
pub use version::VersionStrategy;

/// First pause between connection attempts to the inference server.
const CONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// Core trait defining the contract for all command strategies.
///
/// Each strategy defines its own input type via the associated type, and
/// every call is statically dispatched.
pub trait CommandStrategy: Send + Sync + 'static {
    /// The input type this strategy accepts.
    type Input;

    /// Execute the command with the given input.
    ///
    /// # Errors
    /// Returns an error if command execution fails.
    async fn execute(&self, input: Self::Input) -> anyhow::Result<()>;
}

/// Command-line values that take precedence over the `chat` config section.
#[derive(Debug, Clone, Default)]
pub struct ChatOverrides {
    pub template: Option<String>,
    pub history_length: Option<usize>,
    pub system_message: Option<String>,
}

impl ChatOverrides {
    fn apply(self, chat: &mut ChatConfig) {
        if let Some(template) = self.template {
            chat.template = template;
        }
        if let Some(length) = self.history_length {
            chat.history_length = length;
        }
        if let Some(system) = self.system_message {
            chat.system_message = Some(system);
        }
    }
}

/// Load the config file and apply `overrides` to its chat section.
fn load_config(overrides: ChatOverrides) -> anyhow::Result<Config> {
    let mut config = Config::load()?;
    overrides.apply(&mut config.chat);
    Ok(config)
}

/// Wire the engine, session manager and pipeline described by `config`.
///
/// The template and every default parameter are validated here, before any
/// request reaches the inference server.
fn build_dispatcher(config: &Config) -> anyhow::Result<Dispatcher> {
    let chat = &config.chat;
    let template = chat.resolve_template()?;
    let window = chat.history_window()?;
    let defaults = chat.parameter_store()?;

    let engine = LlamaServerEngine::new(config.engine.base_url.clone())
        .with_api_key(config.engine.api_key.clone())
        .with_retry(RetryPolicy::exponential(
            config.engine.connect_retries,
            CONNECT_BACKOFF,
        ));
    let engine: Arc<dyn InferenceEngine> = Arc::new(engine);

    info!(
        "Session engine: template={}, history_length={}, scope={:?}",
        template.id, window, chat.parameter_scope
    );

    let sessions = Arc::new(SessionManager::new(
        window,
        chat.parameter_scope,
        defaults,
    ));
    let pipeline = GenerationPipeline::new(engine).with_timeout(chat.generation_timeout());
    Ok(Dispatcher::new(sessions, pipeline, template))
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_core::{ParamName, TemplateId};

    #[test]
    fn overrides_replace_config_values() {
        let mut chat = ChatConfig::default();
        ChatOverrides {
            template: Some("zephyr".to_string()),
            history_length: Some(4),
            system_message: None,
        }
        .apply(&mut chat);
        assert_eq!(chat.template, "zephyr");
        assert_eq!(chat.history_length, 4);
        assert_eq!(chat.system_message, None);
    }

    #[test]
    fn dispatcher_uses_configured_template_and_defaults() {
        let mut config = Config::default();
        config.chat.template = "vicuna".to_string();
        config.chat.system_message = Some("Be kind.".to_string());

        let dispatcher = build_dispatcher(&config).unwrap();
        assert_eq!(dispatcher.template().id, TemplateId::Vicuna);
        let id = palaver_core::ConversationId::console();
        assert_eq!(
            dispatcher
                .sessions()
                .with_params(&id, |p| p.get(ParamName::SystemMessage)),
            "Be kind."
        );
    }

    #[test]
    fn unknown_template_fails_fast() {
        let mut config = Config::default();
        config.chat.template = "alpaca".to_string();
        assert!(build_dispatcher(&config).is_err());
    }

    #[test]
    fn zero_history_length_is_rejected() {
        let mut config = Config::default();
        config.chat.history_length = 0;
        let err = build_dispatcher(&config).err().unwrap();
        assert!(err.to_string().contains("history_length"));
    }
}
