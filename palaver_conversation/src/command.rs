//! Control-line grammar: `/<verb> [argument text]`.

use palaver_core::{ChatError, ParamName, Result};

pub const COMMAND_PREFIX: char = '/';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Change one generation parameter.
    Set(ParamName, String),
    Clear,
    History,
    Params,
    /// Show the prompt the next turn would render, without generating.
    Prompt,
    /// List every known conversation with its label.
    Users,
    Help,
}

impl Command {
    /// Classify a line. `None` means it is a chat turn, not a command.
    #[must_use]
    pub fn parse(line: &str) -> Option<Result<Self>> {
        let body = line.trim().strip_prefix(COMMAND_PREFIX)?;
        let (verb, args) = body
            .split_once(char::is_whitespace)
            .map_or((body, ""), |(verb, args)| (verb, args.trim()));
        // Drop a bot mention, e.g. "/help@my_bot".
        let verb = verb.split('@').next().unwrap_or(verb).to_ascii_lowercase();

        let command = match verb.as_str() {
            "temp" | "temperature" | "top_p" | "top_k" | "repetition_penalty"
            | "max_tokens" | "max_new_tokens" | "debug" | "system" => {
                verb.parse().map(|name| Self::Set(name, args.to_string()))
            }
            "clear" | "reset" => Ok(Self::Clear),
            "history" => Ok(Self::History),
            "params" => Ok(Self::Params),
            "prompt" => Ok(Self::Prompt),
            "users" => Ok(Self::Users),
            "help" | "?" => Ok(Self::Help),
            _ => Err(ChatError::UnknownCommand(verb)),
        };
        Some(command)
    }

    /// Commands that change shared state or reveal other tenants.
    #[must_use]
    pub const fn is_privileged(&self) -> bool {
        matches!(self, Self::Set(..) | Self::Users)
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Set(name, _) => name.as_str(),
            Self::Clear => "clear",
            Self::History => "history",
            Self::Params => "params",
            Self::Prompt => "prompt",
            Self::Users => "users",
            Self::Help => "help",
        }
    }

    #[must_use]
    pub const fn help_text() -> &'static str {
        "Available commands:
/temp <value>: Set temperature
/max_tokens <value>: Set max new tokens
/top_p <value>: Set top_p
/top_k <value>: Set top_k
/repetition_penalty <value>: Set repetition penalty
/system <message>: Set system message (empty clears it)
/debug true|false: Enable or disable debug mode
/params: Show generation parameters
/prompt: Show the prompt the next message would produce
/clear: Clear chat history
/history: Show chat history
/users: List known users
/help or /?: Show this help message"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Command {
        Command::parse(line).unwrap().unwrap()
    }

    #[test]
    fn chat_lines_are_not_commands() {
        assert!(Command::parse("hello there").is_none());
        assert!(Command::parse("what is 1/2?").is_none());
    }

    #[test]
    fn setters_keep_argument_text() {
        assert_eq!(
            parse("/temp 0.5"),
            Command::Set(ParamName::Temperature, "0.5".to_string())
        );
        assert_eq!(
            parse("/system   You are terse.  "),
            Command::Set(ParamName::SystemMessage, "You are terse.".to_string())
        );
        assert_eq!(
            parse("/system"),
            Command::Set(ParamName::SystemMessage, String::new())
        );
        assert_eq!(
            parse("/max_tokens 64"),
            Command::Set(ParamName::MaxNewTokens, "64".to_string())
        );
    }

    #[test]
    fn aliases_and_mentions() {
        assert_eq!(parse("/?"), Command::Help);
        assert_eq!(parse("/HELP@palaver_bot"), Command::Help);
        assert_eq!(parse("/reset"), Command::Clear);
    }

    #[test]
    fn unknown_verbs_are_reported() {
        let err = Command::parse("/dance now").unwrap().unwrap_err();
        assert!(matches!(err, ChatError::UnknownCommand(ref verb) if verb == "dance"));
    }

    #[test]
    fn privilege_partition() {
        assert!(parse("/top_k 3").is_privileged());
        assert!(parse("/users").is_privileged());
        assert!(!parse("/clear").is_privileged());
        assert!(!parse("/history").is_privileged());
        assert!(!parse("/help").is_privileged());
    }
}
