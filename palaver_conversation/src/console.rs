//! Single-user interactive console.

use std::io::Write;

use palaver_core::ConversationId;
use tracing::debug;

use crate::command::Command;
use crate::dispatcher::{Dispatcher, Outcome};

const EXIT_WORDS: [&str; 3] = ["exit", "quit", "bye"];

/// Read lines from stdin until an exit word or end of input.
///
/// The console user owns the process, so every command is allowed.
pub async fn run_interactive(dispatcher: &Dispatcher, assistant_name: &str) -> anyhow::Result<()> {
    let id = ConversationId::console();
    println!("Chatbot initialized. Type '/help' for available commands.\n");

    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if EXIT_WORDS.contains(&input.to_lowercase().as_str()) {
            break;
        }
        if input.is_empty() {
            continue;
        }

        if Command::parse(input).is_none() {
            print!("\n{assistant_name}: ");
            std::io::stdout().flush()?;
        }

        let outcome = dispatcher
            .dispatch(&id, input, true, |fragment| {
                print!("{fragment}");
                let _ = std::io::stdout().flush();
            })
            .await;

        match outcome {
            Ok(Outcome::Reply(reply)) => {
                debug!("Reply committed: {} chars", reply.len());
                println!("\n");
            }
            Ok(Outcome::Status(status)) => println!("{status}\n"),
            Err(e) => eprintln!("\nError: {e}\n"),
        }
    }

    let stats = dispatcher.sessions().history_stats(&id);
    println!(
        "\nSession ended. {} messages in history ({} from you).",
        stats.total_messages, stats.user_messages
    );
    Ok(())
}
