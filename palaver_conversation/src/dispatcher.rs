//! Entry point for hosts: routes every inbound line to a control command or
//! a chat turn.

use std::sync::Arc;

use palaver_core::util::transcript;
use palaver_core::{
    ChatError, ChatMessage, ConversationId, ParamName, ParameterStore, Result, Template, render,
};
use tracing::{info, warn};

use crate::command::Command;
use crate::manager::SessionManager;
use crate::pipeline::GenerationPipeline;
use crate::tenants::TenantDirectory;

/// User turn used by `/prompt` to preview the next rendering.
const EXAMPLE_INPUT: &str = "example user input";

/// Result of handling one inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A control command ran; the text reports what it did.
    Status(String),
    /// A chat turn completed; the text is the committed assistant reply.
    Reply(String),
}

pub struct Dispatcher {
    sessions: Arc<SessionManager>,
    pipeline: GenerationPipeline,
    template: &'static Template,
    tenants: Option<Arc<TenantDirectory>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        sessions: Arc<SessionManager>,
        pipeline: GenerationPipeline,
        template: &'static Template,
    ) -> Self {
        info!("Dispatcher ready with {} template", template.id);
        Self {
            sessions,
            pipeline,
            template,
            tenants: None,
        }
    }

    /// Attach a tenant directory, used to label `/users` output.
    #[must_use]
    pub fn with_tenants(mut self, tenants: Arc<TenantDirectory>) -> Self {
        self.tenants = Some(tenants);
        self
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    #[must_use]
    pub const fn template(&self) -> &'static Template {
        self.template
    }

    #[must_use]
    pub const fn pipeline(&self) -> &GenerationPipeline {
        &self.pipeline
    }

    /// Handle one inbound line from `id`.
    ///
    /// `privileged` says whether the caller may run privileged commands.
    pub async fn dispatch<F>(
        &self,
        id: &ConversationId,
        raw: &str,
        privileged: bool,
        on_fragment: F,
    ) -> Result<Outcome>
    where
        F: FnMut(&str) + Send,
    {
        match Command::parse(raw) {
            Some(command) => self.execute(id, command?, privileged).map(Outcome::Status),
            None => self
                .submit_turn(id, raw, on_fragment)
                .await
                .map(Outcome::Reply),
        }
    }

    /// Append `text` as a user turn and generate the assistant reply.
    pub async fn submit_turn<F>(&self, id: &ConversationId, text: &str, on_fragment: F) -> Result<String>
    where
        F: FnMut(&str) + Send,
    {
        self.pipeline
            .submit_turn(&self.sessions, self.template, id, text, on_fragment)
            .await
    }

    /// Run a control line. Chat text is rejected as an unknown command.
    pub fn run_command(&self, id: &ConversationId, raw: &str, privileged: bool) -> Result<String> {
        let command = Command::parse(raw)
            .ok_or_else(|| ChatError::UnknownCommand(raw.trim().to_string()))??;
        self.execute(id, command, privileged)
    }

    fn execute(&self, id: &ConversationId, command: Command, privileged: bool) -> Result<String> {
        if command.is_privileged() && !privileged {
            warn!("Refused /{} from {id}", command.name());
            return Err(ChatError::Unauthorized {
                conversation: id.clone(),
                command: command.name().to_string(),
            });
        }

        match command {
            Command::Set(name, value) => {
                let shown = self.sessions.update_params(id, |store| {
                    store.set(name, &value)?;
                    Ok(store.get(name))
                })?;
                info!("{id} set {name} to {shown:?}");
                Ok(match (name, shown.is_empty()) {
                    (ParamName::SystemMessage, true) => "System message cleared".to_string(),
                    _ => format!("{} set to: {shown}", capitalize(name.as_str())),
                })
            }
            Command::Clear => {
                self.sessions.clear(id)?;
                Ok("Chat history cleared".to_string())
            }
            Command::History => {
                let history = self.sessions.history(id);
                Ok(if history.is_empty() {
                    "Chat history is empty".to_string()
                } else {
                    transcript(&history)
                })
            }
            Command::Params => Ok(self.sessions.with_params(id, ParameterStore::describe)),
            Command::Prompt => {
                let mut view = self.sessions.view(id);
                view.push(ChatMessage::user(EXAMPLE_INPUT));
                render(&view, self.template, true)
            }
            Command::Users => Ok(self.describe_users()),
            Command::Help => Ok(Command::help_text().to_string()),
        }
    }

    fn describe_users(&self) -> String {
        let mut labels = self
            .tenants
            .as_ref()
            .map(|tenants| tenants.entries())
            .unwrap_or_default();
        for id in self.sessions.conversations() {
            labels.entry(id).or_default();
        }

        if labels.is_empty() {
            return "No known users".to_string();
        }
        labels
            .iter()
            .map(|(id, label)| {
                if label.is_empty() {
                    id.to_string()
                } else {
                    format!("{id}: {label}")
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
