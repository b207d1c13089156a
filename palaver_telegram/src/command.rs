use teloxide::types::BotCommand;

/// Commands handled by the relay itself rather than the session engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
}

impl Command {
    fn all() -> Vec<BotCommand> {
        [
            ("start", "Introduce yourself to the bot"),
            ("help", "Show available commands"),
            ("clear", "Clear chat history"),
            ("history", "Show chat history"),
            ("params", "Show generation parameters"),
            ("prompt", "Show the prompt the next message would produce"),
        ]
        .into_iter()
        .map(|(command, description)| BotCommand {
            command: command.to_string(),
            description: description.to_string(),
        })
        .collect()
    }

    /// Menu published to Telegram on startup.
    #[must_use]
    pub fn bot_commands() -> Vec<BotCommand> {
        Self::all()
    }

    #[must_use]
    pub fn parse_from_text(text: &str) -> Option<Self> {
        let text = text.trim().to_lowercase();

        // Remove bot mention if present (e.g., "/start@my_bot")
        let verb = text.split(['@', ' ']).next().unwrap_or(&text);

        match verb {
            "/start" => Some(Self::Start),
            _ => None,
        }
    }

    #[must_use]
    pub const fn ask_name_text() -> &'static str {
        "👋 Hello! I don't know you yet. What should I call you?"
    }

    #[must_use]
    pub fn welcome_text(label: &str) -> String {
        format!("👋 Welcome back, {label}! Send a message to chat, or /help for commands.")
    }

    #[must_use]
    pub fn registered_text(label: &str) -> String {
        format!("Nice to meet you, {label}! Send a message to start chatting.")
    }
}
