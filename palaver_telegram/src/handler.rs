use crate::{Command, Error, Result, TelegramBot};
use palaver_conversation::Command as ChatCommand;
use palaver_core::{ConversationId, util::truncate};
use std::time::Duration;
use teloxide::{
    requests::Requester,
    types::{ChatAction, ChatId, Message},
};
use tokio::time::sleep;
use tracing::{info, warn};

/// Pause shown as typing between two lines of one reply.
const LINE_PAUSE: Duration = Duration::from_millis(600);
/// Telegram drops the typing indicator after about five seconds.
const TYPING_REFRESH: Duration = Duration::from_secs(4);
const MAX_LABEL_CHARS: usize = 64;

/// Handle any message (commands or regular text)
pub async fn handle_message(bot: TelegramBot, msg: Message) -> Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let chat_id = msg.chat.id;
    let id = ConversationId::from(chat_id.0);
    let username = msg
        .from
        .as_ref()
        .and_then(|u| u.username.as_deref())
        .unwrap_or("unknown");

    if Command::parse_from_text(text) == Some(Command::Start) {
        info!("[@{username}] Command: /start");
        let reply = bot.tenants.label(&id).map_or_else(
            || Command::ask_name_text().to_string(),
            |label| Command::welcome_text(&label),
        );
        bot.bot.send_message(chat_id, reply).await?;
        return Ok(());
    }

    if !bot.tenants.contains(&id) {
        return register(&bot, chat_id, &id, text).await;
    }

    if ChatCommand::parse(text).is_some() {
        info!("[@{username}] Command: {text}");
        let reply = bot
            .chat
            .run_command(&id, text, bot.is_admin(chat_id.0))
            .unwrap_or_else(|e| format!("Error: {e}"));
        bot.bot.send_message(chat_id, reply).await?;
        return Ok(());
    }

    info!("[@{username}] Message: {text}");
    let typing = keep_typing(bot.clone(), chat_id);
    let outcome = bot.chat.submit_turn(&id, text, |_| {}).await;
    typing.abort();

    match outcome {
        Ok(reply) => {
            info!("[@{username}] Response: {}", truncate(&reply, 200));
            send_lines(&bot, chat_id, &reply).await
        }
        Err(e) => {
            warn!("[@{username}] Turn failed: {e}");
            bot.bot.send_message(chat_id, format!("Error: {e}")).await?;
            Ok(())
        }
    }
}

/// First contact: the first plain message becomes the chat's label.
async fn register(bot: &TelegramBot, chat_id: ChatId, id: &ConversationId, text: &str) -> Result<()> {
    let name = text.trim();
    if name.is_empty() || name.starts_with(palaver_conversation::COMMAND_PREFIX) {
        bot.bot.send_message(chat_id, Command::ask_name_text()).await?;
        return Ok(());
    }

    let label: String = name.chars().take(MAX_LABEL_CHARS).collect();
    bot.tenants.register(id, &label).map_err(Error::Storage)?;
    info!("Registered chat {id} as {label}");
    bot.bot
        .send_message(chat_id, Command::registered_text(&label))
        .await?;
    Ok(())
}

/// Re-send the typing action until the returned task is aborted.
fn keep_typing(bot: TelegramBot, chat_id: ChatId) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = bot.bot.send_chat_action(chat_id, ChatAction::Typing).await {
                warn!("Could not send typing action: {e}");
                return;
            }
            sleep(TYPING_REFRESH).await;
        }
    })
}

/// Send a reply one non-empty line at a time with a short typing pause.
async fn send_lines(bot: &TelegramBot, chat_id: ChatId, reply: &str) -> Result<()> {
    let lines = reply_lines(reply);
    if lines.is_empty() {
        warn!("Empty reply for chat {}", chat_id.0);
        return Ok(());
    }

    for (i, line) in lines.into_iter().enumerate() {
        if i > 0 {
            bot.bot.send_chat_action(chat_id, ChatAction::Typing).await?;
            sleep(LINE_PAUSE).await;
        }
        bot.bot.send_message(chat_id, line).await?;
    }
    Ok(())
}

fn reply_lines(reply: &str) -> Vec<&str> {
    reply
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_lines_skip_blanks() {
        assert_eq!(
            reply_lines("First.\n\n  Second. \r\n\nThird."),
            vec!["First.", "Second.", "Third."]
        );
        assert!(reply_lines(" \n ").is_empty());
    }
}
