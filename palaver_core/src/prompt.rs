//! Prompt assembly: ordered messages + template rules -> one prompt string.

use crate::template::SystemRule;
use crate::{ChatError, ChatMessage, Result, Role, Template};

/// Render `messages` with `template`.
///
/// With `add_generation_prompt` set, the template's open assistant turn is
/// appended so the engine continues as the assistant. Rendering is a pure
/// function of its arguments.
pub fn render(
    messages: &[ChatMessage],
    template: &Template,
    add_generation_prompt: bool,
) -> Result<String> {
    let rules = &template.rules;
    check_shape(messages)?;

    let (system, turns) = match messages.split_first() {
        Some((first, rest)) if first.role == Role::System => (Some(first.content.as_str()), rest),
        _ => (None, messages),
    };

    let mut out = String::new();
    let mut started = false;
    let mut merged_system = None;

    if let Some(content) = system {
        match rules.system {
            SystemRule::Block(tags) => {
                out.push_str(rules.bos);
                started = true;
                tags.wrap(&mut out, content);
            }
            SystemRule::MergeIntoFirstUser(tags) => {
                merged_system = Some(format!("{}{content}{}", tags.prefix, tags.suffix));
            }
        }
    }

    for message in turns {
        match message.role {
            Role::User => {
                if !started || rules.bos_each_exchange {
                    out.push_str(rules.bos);
                    started = true;
                }
                match merged_system.take() {
                    Some(head) => rules.user.wrap(&mut out, &(head + &message.content)),
                    None => rules.user.wrap(&mut out, &message.content),
                }
            }
            Role::Assistant => {
                if !started {
                    out.push_str(rules.bos);
                    started = true;
                }
                rules.assistant.wrap(&mut out, &message.content);
                out.push_str(rules.eos);
            }
            // check_shape only lets a system message through at position 0
            Role::System => {}
        }
    }

    // A merged system message with no user turn to carry it stands alone.
    if let Some(head) = merged_system {
        out.push_str(rules.bos);
        rules.user.wrap(&mut out, head.trim_end());
    }

    if add_generation_prompt {
        out.push_str(rules.generation_prompt);
    }
    Ok(out)
}

fn check_shape(messages: &[ChatMessage]) -> Result<()> {
    match messages
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, message)| message.role == Role::System)
    {
        Some((position, _)) => Err(ChatError::shape(
            position,
            "a system message may only appear first",
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TemplateId;

    fn conversation() -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("Be brief."),
            ChatMessage::user("Hi"),
            ChatMessage::assistant("Hello"),
            ChatMessage::user("Bye"),
        ]
    }

    fn rendered(id: TemplateId) -> String {
        render(&conversation(), Template::get(id), true).unwrap()
    }

    #[test]
    fn chatml() {
        assert_eq!(
            rendered(TemplateId::ChatMl),
            "<|im_start|>system\nBe brief.<|im_end|>\n\
             <|im_start|>user\nHi<|im_end|>\n\
             <|im_start|>assistant\nHello<|im_end|>\n\
             <|im_start|>user\nBye<|im_end|>\n\
             <|im_start|>assistant\n"
        );
    }

    #[test]
    fn vicuna() {
        assert_eq!(
            rendered(TemplateId::Vicuna),
            "System: Be brief.\nHuman: Hi\nAssistant: Hello\nHuman: Bye\nAssistant:"
        );
    }

    #[test]
    fn mistral_block_system() {
        assert_eq!(
            rendered(TemplateId::Mistral),
            "<s>[INST] Be brief. [/INST]</s><s>[INST] Hi [/INST] Hello</s><s>[INST] Bye [/INST]"
        );
    }

    #[test]
    fn mistral_inline_merges_system() {
        assert_eq!(
            rendered(TemplateId::MistralInline),
            "<s>[INST] Be brief. Hi [/INST]Hello</s>[INST] Bye [/INST]"
        );
    }

    #[test]
    fn llama2_wraps_system_in_first_turn() {
        assert_eq!(
            rendered(TemplateId::Llama2),
            "<s>[INST] <<SYS>>\nBe brief.\n<</SYS>>\n\nHi [/INST] Hello </s><s>[INST] Bye [/INST]"
        );
    }

    #[test]
    fn openchat() {
        assert_eq!(
            rendered(TemplateId::OpenChat),
            "System: Be brief.\nHuman: Hi\nAssistant: Hello\nHuman: Bye\nAssistant:"
        );
    }

    #[test]
    fn openchat_gpt4() {
        assert_eq!(
            rendered(TemplateId::OpenChatGpt4),
            "Be brief.<|end_of_turn|>GPT4 Correct User: Hi<|end_of_turn|>\
             GPT4 Correct Assistant: Hello<|end_of_turn|>\
             GPT4 Correct User: Bye<|end_of_turn|>GPT4 Correct Assistant:"
        );
    }

    #[test]
    fn zephyr() {
        assert_eq!(
            rendered(TemplateId::Zephyr),
            "<|system|>\nBe brief.</s>\n<|user|>\nHi</s>\n<|assistant|>\nHello</s>\n\
             <|user|>\nBye</s>\n<|assistant|>\n"
        );
    }

    #[test]
    fn rendering_is_deterministic() {
        for template in Template::all() {
            let first = render(&conversation(), template, true).unwrap();
            let second = render(&conversation(), template, true).unwrap();
            assert_eq!(first, second, "{}", template.id);
        }
    }

    #[test]
    fn generation_prompt_is_optional() {
        let template = Template::get(TemplateId::ChatMl);
        let open = render(&conversation(), template, true).unwrap();
        let closed = render(&conversation(), template, false).unwrap();
        assert_eq!(open.strip_suffix("<|im_start|>assistant\n"), Some(closed.as_str()));
    }

    #[test]
    fn consecutive_user_turns_render_on_inst_templates() {
        // Left behind by a failed generation.
        let messages = vec![
            ChatMessage::system("s"),
            ChatMessage::user("a"),
            ChatMessage::user("b"),
        ];
        assert_eq!(
            render(&messages, Template::get(TemplateId::Llama2), true).unwrap(),
            "<s>[INST] <<SYS>>\ns\n<</SYS>>\n\na [/INST]<s>[INST] b [/INST]"
        );
        assert_eq!(
            render(&messages, Template::get(TemplateId::MistralInline), true).unwrap(),
            "<s>[INST] s a [/INST][INST] b [/INST]"
        );
    }

    #[test]
    fn leading_assistant_turn_renders() {
        let messages = vec![ChatMessage::assistant("hi"), ChatMessage::user("q")];
        assert_eq!(
            render(&messages, Template::get(TemplateId::MistralInline), true).unwrap(),
            "<s>hi</s>[INST] q [/INST]"
        );
    }

    #[test]
    fn late_system_message_is_rejected() {
        let messages = vec![ChatMessage::user("a"), ChatMessage::system("s")];
        for template in Template::all() {
            let err = render(&messages, template, false).unwrap_err();
            assert!(matches!(err, ChatError::InvalidConversationShape { position: 1, .. }));
        }
    }

    #[test]
    fn lone_merged_system_message_renders_as_user_turn() {
        let messages = vec![ChatMessage::system("Be brief.")];
        let prompt = render(&messages, Template::get(TemplateId::MistralInline), false).unwrap();
        assert_eq!(prompt, "<s>[INST] Be brief. [/INST]");
    }
}
