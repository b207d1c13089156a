use palaver_core::{ChatMessage, Template, render};

/// Input for the templates listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplatesInput {
    /// Also print how a short exchange renders with each template
    pub sample: bool,
}

/// Strategy for listing the prompt templates the engine can render.
#[derive(Debug, Clone, Copy)]
pub struct TemplatesStrategy;

impl super::CommandStrategy for TemplatesStrategy {
    type Input = TemplatesInput;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        let exchange = sample_exchange();
        for template in Template::all() {
            println!("{}", template.id);
            if input.sample {
                println!("{}\n", render(&exchange, template, true)?);
            }
        }
        Ok(())
    }
}

fn sample_exchange() -> Vec<ChatMessage> {
    vec![
        ChatMessage::system("You are terse."),
        ChatMessage::user("2+2?"),
        ChatMessage::assistant("4"),
        ChatMessage::user("and 3+3?"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_renders_with_every_template() {
        let exchange = sample_exchange();
        for template in Template::all() {
            let prompt = render(&exchange, template, true).unwrap();
            assert!(prompt.contains("and 3+3?"), "{}", template.id);
        }
    }
}
