//! Console chat: one conversation, every command allowed.

use palaver_conversation::run_interactive;
use palaver_core::ConversationId;
use std::io::Write;
use tracing::info;

use super::{ChatOverrides, build_dispatcher, load_config};

/// Input parameters for the Chat command strategy.
#[derive(Debug, Clone, Default)]
pub struct ChatInput {
    /// Optional single message to send (non-interactive mode)
    pub message: Option<String>,
    pub overrides: ChatOverrides,
}

#[derive(Debug, Clone, Copy)]
pub struct ChatStrategy;

impl super::CommandStrategy for ChatStrategy {
    type Input = ChatInput;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        let config = load_config(input.overrides)?;
        let dispatcher = build_dispatcher(&config)?;

        if let Some(msg) = input.message {
            // Single message mode
            let id = ConversationId::console();
            dispatcher
                .submit_turn(&id, &msg, |fragment| {
                    print!("{fragment}");
                    let _ = std::io::stdout().flush();
                })
                .await?;
            println!();
        } else {
            run_interactive(&dispatcher, &config.chat.assistant_name).await?;
            info!("Conversation ended");
        }

        Ok(())
    }
}
