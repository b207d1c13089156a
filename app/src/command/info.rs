use palaver_config::Config;
use palaver_core::util::truncate;

/// Strategy for displaying configuration information.
///
/// This strategy outputs:
/// - the inference server address and API key (masked)
/// - chat defaults, validated the same way the engine validates them
/// - Telegram configuration
#[derive(Debug, Clone, Copy)]
pub struct InfoStrategy;

impl super::CommandStrategy for InfoStrategy {
    type Input = ();

    async fn execute(&self, _input: Self::Input) -> anyhow::Result<()> {
        let config = Config::load()?;

        println!("=== palaver Configuration ===\n");

        println!("Engine:");
        println!("  Base URL: {}", config.engine.base_url);
        match config.engine.api_key.as_deref() {
            Some(key) if !key.is_empty() => println!("  API Key: {}", mask_secret(key)),
            _ => println!("  API Key: (not set)"),
        }
        println!("  Connect Retries: {}", config.engine.connect_retries);
        println!();

        let chat = &config.chat;
        println!("Chat:");
        match chat.resolve_template() {
            Ok(template) => println!("  Template: {}", template.id),
            Err(e) => println!("  Template: {} ({e})", chat.template),
        }
        println!("  History Length: {}", chat.history_length);
        println!("  Assistant Name: {}", chat.assistant_name);
        println!("  Parameter Scope: {:?}", chat.parameter_scope);
        match chat.generation_timeout() {
            Some(limit) => println!("  Generation Timeout: {}s", limit.as_secs()),
            None => println!("  Generation Timeout: (none)"),
        }
        match chat.parameter_store() {
            Ok(store) => {
                println!("  Parameters:");
                for line in store.describe().lines() {
                    println!("    {}", truncate(line, 80));
                }
            }
            Err(e) => println!("  Parameters: invalid ({e})"),
        }
        println!();

        println!("Telegram:");
        println!("  Enabled: {}", config.telegram.enabled);
        let token = if config.telegram.token.is_empty() {
            "(not set)".to_string()
        } else {
            mask_secret(&config.telegram.token)
        };
        println!("  Token: {token}");
        if config.telegram.admins.is_empty() {
            println!("  Admins: (none - parameter commands disabled)");
        } else {
            let admins: Vec<String> = config.telegram.admins.iter().map(ToString::to_string).collect();
            println!("  Admins: {}", admins.join(", "));
        }
        println!(
            "  User Data: {}",
            config
                .telegram
                .user_data_path(&Config::config_dir()?)
                .display()
        );

        Ok(())
    }
}

fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_masked() {
        assert_eq!(mask_secret("123456:ABCDEFGH"), "1234...EFGH");
        assert_eq!(mask_secret("short"), "***");
    }
}
