//! Catalog of supported prompt formats.
//!
//! Each template is pure data: the literal tags around every role, where a
//! leading system message goes, and which markers open and close turns.
//! [`crate::prompt::render`] is the single interpreter of these rules.

use std::fmt;
use std::str::FromStr;

use crate::{ChatError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateId {
    ChatMl,
    Vicuna,
    Mistral,
    MistralInline,
    Llama2,
    OpenChat,
    OpenChatGpt4,
    Zephyr,
}

impl TemplateId {
    pub const ALL: [Self; 8] = [
        Self::ChatMl,
        Self::Vicuna,
        Self::Mistral,
        Self::MistralInline,
        Self::Llama2,
        Self::OpenChat,
        Self::OpenChatGpt4,
        Self::Zephyr,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ChatMl => "chatml",
            Self::Vicuna => "vicuna",
            Self::Mistral => "mistral",
            Self::MistralInline => "mistral_inline",
            Self::Llama2 => "llama2",
            Self::OpenChat => "openchat",
            Self::OpenChatGpt4 => "openchat_gpt4",
            Self::Zephyr => "zephyr",
        }
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateId {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == wanted)
            .ok_or_else(|| ChatError::UnknownTemplate(s.to_string()))
    }
}

/// Literal text written around a message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tags {
    pub prefix: &'static str,
    pub suffix: &'static str,
}

impl Tags {
    const fn new(prefix: &'static str, suffix: &'static str) -> Self {
        Self { prefix, suffix }
    }

    pub(crate) fn wrap(self, out: &mut String, content: &str) {
        out.push_str(self.prefix);
        out.push_str(content);
        out.push_str(self.suffix);
    }
}

/// Placement of a leading system message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemRule {
    /// Written as its own tagged block before the first turn.
    Block(Tags),
    /// Wrapped in these tags and prepended to the first user turn's body.
    MergeIntoFirstUser(Tags),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderRules {
    /// Beginning-of-sequence marker, empty when the engine adds its own.
    pub bos: &'static str,
    /// Repeat `bos` before every user turn, not only at the start.
    pub bos_each_exchange: bool,
    pub system: SystemRule,
    pub user: Tags,
    pub assistant: Tags,
    /// End-of-sequence marker written after every assistant turn.
    pub eos: &'static str,
    /// Open assistant turn appended when the engine should answer next.
    pub generation_prompt: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    pub id: TemplateId,
    pub rules: RenderRules,
}

static REGISTRY: [Template; 8] = [
    Template {
        id: TemplateId::ChatMl,
        rules: RenderRules {
            bos: "",
            bos_each_exchange: false,
            system: SystemRule::Block(Tags::new("<|im_start|>system\n", "<|im_end|>\n")),
            user: Tags::new("<|im_start|>user\n", "<|im_end|>\n"),
            assistant: Tags::new("<|im_start|>assistant\n", "<|im_end|>\n"),
            eos: "",
            generation_prompt: "<|im_start|>assistant\n",
        },
    },
    Template {
        id: TemplateId::Vicuna,
        rules: RenderRules {
            bos: "",
            bos_each_exchange: false,
            system: SystemRule::Block(Tags::new("System: ", "\n")),
            user: Tags::new("Human: ", "\n"),
            assistant: Tags::new("Assistant: ", "\n"),
            eos: "",
            generation_prompt: "Assistant:",
        },
    },
    Template {
        id: TemplateId::Mistral,
        rules: RenderRules {
            bos: "<s>",
            bos_each_exchange: true,
            system: SystemRule::Block(Tags::new("[INST] ", " [/INST]</s>")),
            user: Tags::new("[INST] ", " [/INST]"),
            assistant: Tags::new(" ", ""),
            eos: "</s>",
            generation_prompt: "",
        },
    },
    Template {
        id: TemplateId::MistralInline,
        rules: RenderRules {
            bos: "<s>",
            bos_each_exchange: false,
            system: SystemRule::MergeIntoFirstUser(Tags::new("", " ")),
            user: Tags::new("[INST] ", " [/INST]"),
            assistant: Tags::new("", ""),
            eos: "</s>",
            generation_prompt: "",
        },
    },
    Template {
        id: TemplateId::Llama2,
        rules: RenderRules {
            bos: "<s>",
            bos_each_exchange: true,
            system: SystemRule::MergeIntoFirstUser(Tags::new("<<SYS>>\n", "\n<</SYS>>\n\n")),
            user: Tags::new("[INST] ", " [/INST]"),
            assistant: Tags::new(" ", " "),
            eos: "</s>",
            generation_prompt: "",
        },
    },
    Template {
        id: TemplateId::OpenChat,
        rules: RenderRules {
            bos: "",
            bos_each_exchange: false,
            system: SystemRule::Block(Tags::new("System: ", "\n")),
            user: Tags::new("Human: ", "\n"),
            assistant: Tags::new("Assistant: ", "\n"),
            eos: "",
            generation_prompt: "Assistant:",
        },
    },
    Template {
        id: TemplateId::OpenChatGpt4,
        rules: RenderRules {
            bos: "",
            bos_each_exchange: false,
            system: SystemRule::Block(Tags::new("", "<|end_of_turn|>")),
            user: Tags::new("GPT4 Correct User: ", "<|end_of_turn|>"),
            assistant: Tags::new("GPT4 Correct Assistant: ", "<|end_of_turn|>"),
            eos: "",
            generation_prompt: "GPT4 Correct Assistant:",
        },
    },
    Template {
        id: TemplateId::Zephyr,
        rules: RenderRules {
            bos: "",
            bos_each_exchange: false,
            system: SystemRule::Block(Tags::new("<|system|>\n", "</s>\n")),
            user: Tags::new("<|user|>\n", "</s>\n"),
            assistant: Tags::new("<|assistant|>\n", "</s>\n"),
            eos: "",
            generation_prompt: "<|assistant|>\n",
        },
    },
];

impl Template {
    /// Look up a template by its configured name.
    pub fn resolve(name: &str) -> Result<&'static Self> {
        let id: TemplateId = name.parse()?;
        Ok(Self::get(id))
    }

    #[must_use]
    pub fn get(id: TemplateId) -> &'static Self {
        // REGISTRY is declared in TemplateId::ALL order.
        &REGISTRY[id as usize]
    }

    #[must_use]
    pub fn all() -> &'static [Self] {
        &REGISTRY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_matches_ids() {
        for id in TemplateId::ALL {
            assert_eq!(Template::get(id).id, id);
        }
        assert_eq!(Template::all().len(), TemplateId::ALL.len());
    }

    #[test]
    fn resolve_is_case_insensitive() {
        assert_eq!(Template::resolve("ChatML").unwrap().id, TemplateId::ChatMl);
        assert_eq!(
            Template::resolve(" mistral_inline ").unwrap().id,
            TemplateId::MistralInline
        );
        assert_eq!(
            Template::resolve("OpenChat_GPT4").unwrap().id,
            TemplateId::OpenChatGpt4
        );
    }

    #[test]
    fn unknown_template_fails() {
        let err = Template::resolve("alpaca").unwrap_err();
        assert!(matches!(err, ChatError::UnknownTemplate(ref name) if name == "alpaca"));
    }
}
