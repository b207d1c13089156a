#![deny(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

mod command;

use clap::{Parser, Subcommand};
use command::{
    ChatInput, ChatOverrides, ChatStrategy, CommandStrategy, InfoStrategy, InitStrategy,
    TelegramInput, TelegramStrategy, TemplatesInput, TemplatesStrategy, VersionStrategy,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "palaver")]
#[command(about = "Multi-turn chat front-end for a local inference server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug, Clone, Default)]
struct ChatArgs {
    /// Prompt template (chatml, vicuna, mistral, mistral_inline, llama2, openchat, openchat_gpt4, zephyr)
    #[arg(short = 't', long)]
    template: Option<String>,

    /// Number of messages kept per conversation
    #[arg(short = 'H', long)]
    history_length: Option<usize>,

    /// System message pinned to every prompt
    #[arg(short = 's', long)]
    system: Option<String>,
}

impl From<ChatArgs> for ChatOverrides {
    fn from(args: ChatArgs) -> Self {
        Self {
            template: args.template,
            history_length: args.history_length,
            system_message: args.system,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Chat in the terminal
    Chat {
        /// Single message to send
        #[arg(short = 'm', long)]
        message: Option<String>,

        #[command(flatten)]
        chat: ChatArgs,
    },
    /// Serve Telegram chats
    Telegram {
        /// Bot token (overrides config)
        #[arg(long)]
        token: Option<String>,

        #[command(flatten)]
        chat: ChatArgs,
    },
    /// List prompt templates
    Templates {
        /// Render a sample exchange with each template
        #[arg(long)]
        sample: bool,
    },
    /// Show configuration
    Info,
    /// Initialize configuration
    Init,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Chat { message, chat } => {
            ChatStrategy
                .execute(ChatInput {
                    message,
                    overrides: chat.into(),
                })
                .await?;
        }
        Commands::Telegram { token, chat } => {
            TelegramStrategy
                .execute(TelegramInput {
                    token,
                    overrides: chat.into(),
                })
                .await?;
        }
        Commands::Templates { sample } => {
            TemplatesStrategy.execute(TemplatesInput { sample }).await?;
        }
        Commands::Info => InfoStrategy.execute(()).await?,
        Commands::Init => InitStrategy.execute(()).await?,
        Commands::Version => VersionStrategy.execute(()).await?,
    }

    Ok(())
}
