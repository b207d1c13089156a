use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use palaver_core::{GenerationParams, ParameterScope, ParameterStore, Template};

const CONFIG_DIR: &str = "palaver";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

/// Where the inference server lives.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "EngineConfig::default_base_url")]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Extra connection attempts before a turn fails.
    #[serde(default = "EngineConfig::default_connect_retries")]
    pub connect_retries: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            api_key: None,
            connect_retries: Self::default_connect_retries(),
        }
    }
}

impl EngineConfig {
    fn default_base_url() -> String {
        "http://127.0.0.1:8080".to_string()
    }

    const fn default_connect_retries() -> usize {
        3
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "ChatConfig::default_template")]
    pub template: String,
    #[serde(default = "ChatConfig::default_history_length")]
    pub history_length: usize,
    #[serde(default = "ChatConfig::default_temperature")]
    pub temperature: f32,
    #[serde(default = "ChatConfig::default_top_p")]
    pub top_p: f32,
    #[serde(default = "ChatConfig::default_top_k")]
    pub top_k: u32,
    #[serde(default = "ChatConfig::default_repetition_penalty")]
    pub repetition_penalty: f32,
    #[serde(default = "ChatConfig::default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "ChatConfig::default_assistant_name")]
    pub assistant_name: String,
    #[serde(default)]
    pub parameter_scope: ParameterScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_timeout_secs: Option<u64>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        let params = GenerationParams::default();
        Self {
            template: Self::default_template(),
            history_length: Self::default_history_length(),
            temperature: params.temperature,
            top_p: params.top_p,
            top_k: params.top_k,
            repetition_penalty: params.repetition_penalty,
            max_new_tokens: params.max_new_tokens,
            system_message: None,
            debug: false,
            assistant_name: Self::default_assistant_name(),
            parameter_scope: ParameterScope::default(),
            generation_timeout_secs: None,
        }
    }
}

impl ChatConfig {
    fn default_template() -> String {
        "chatml".to_string()
    }

    const fn default_history_length() -> usize {
        10
    }

    const fn default_temperature() -> f32 {
        0.7
    }

    const fn default_top_p() -> f32 {
        0.95
    }

    const fn default_top_k() -> u32 {
        40
    }

    const fn default_repetition_penalty() -> f32 {
        1.1
    }

    const fn default_max_new_tokens() -> u32 {
        256
    }

    fn default_assistant_name() -> String {
        "AI".to_string()
    }

    /// Configured defaults as a validated store.
    pub fn parameter_store(&self) -> palaver_core::Result<ParameterStore> {
        ParameterStore::new(GenerationParams {
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            repetition_penalty: self.repetition_penalty,
            max_new_tokens: self.max_new_tokens,
            system_message: self.system_message.clone(),
            debug: self.debug,
        })
    }

    /// Number of messages kept per conversation. Zero is refused rather
    /// than quietly raised to one.
    pub fn history_window(&self) -> anyhow::Result<usize> {
        if self.history_length == 0 {
            anyhow::bail!("chat.history_length must be a positive integer");
        }
        Ok(self.history_length)
    }

    pub fn resolve_template(&self) -> palaver_core::Result<&'static Template> {
        Template::resolve(&self.template)
    }

    #[must_use]
    pub fn generation_timeout(&self) -> Option<Duration> {
        self.generation_timeout_secs
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub token: String,
    /// Chat ids allowed to run privileged commands.
    #[serde(default)]
    pub admins: Vec<i64>,
    /// Tenant label file; relative paths live in the config directory.
    #[serde(default = "TelegramConfig::default_user_data_file")]
    pub user_data_file: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token: String::new(),
            admins: Vec::new(),
            user_data_file: Self::default_user_data_file(),
        }
    }
}

impl TelegramConfig {
    fn default_user_data_file() -> String {
        "users.json".to_string()
    }

    #[must_use]
    pub fn user_data_path(&self, config_dir: &Path) -> PathBuf {
        let path = Path::new(&self.user_data_file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            config_dir.join(path)
        }
    }
}

const CONFIG_TEMPLATE: &str = r#"{
  "engine": {
    "base_url": "http://127.0.0.1:8080",
    "connect_retries": 3
  },
  "chat": {
    "template": "chatml",
    "history_length": 10,
    "temperature": 0.7,
    "top_p": 0.95,
    "top_k": 40,
    "repetition_penalty": 1.1,
    "max_new_tokens": 256,
    "system_message": "You are a helpful assistant.",
    "debug": false,
    "assistant_name": "AI",
    "parameter_scope": "global"
  },
  "telegram": {
    "enabled": false,
    "token": "your-telegram-bot-token-here",
    "admins": [],
    "user_data_file": "users.json"
  }
}"#;

impl Config {
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        Ok(dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Cannot find home directory"))?
            .join(CONFIG_DIR))
    }

    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_dir()?.join(CONFIG_FILE);

        if !config_path.exists() {
            anyhow::bail!(
                "Config file not found at: {}. Please run 'palaver init' to create config.",
                config_path.display()
            );
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config file {}: {e}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn ensure_config_dir() -> anyhow::Result<PathBuf> {
        let config_dir = Self::config_dir()?;
        std::fs::create_dir_all(&config_dir)?;
        Ok(config_dir)
    }

    pub fn create_config() -> anyhow::Result<()> {
        let config_dir = Self::ensure_config_dir()?;
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            anyhow::bail!(
                "Config file already exists at: {}. Please edit it directly.",
                config_path.display()
            );
        }

        std::fs::write(&config_path, CONFIG_TEMPLATE)?;

        println!("✅ Created config file at: {}", config_path.display());
        println!();
        println!("📝 Next steps:");
        println!("   1. Start a llama.cpp server and point engine.base_url at it");
        println!("   2. Pick the chat.template that matches your model");
        println!("   3. Run 'palaver chat' to start a conversation");
        println!();
        println!("🔧 Configuration options:");
        println!("   - template: chatml, vicuna, mistral, mistral_inline, llama2, openchat, openchat_gpt4, zephyr");
        println!("   - history_length: Number of messages to keep per conversation");
        println!("   - parameter_scope: global or per_conversation");
        println!("   - telegram.admins: Chat ids allowed to change parameters");
        println!();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_core::{ChatError, TemplateId};

    #[test]
    fn template_parses_and_validates() {
        let config: Config = serde_json::from_str(CONFIG_TEMPLATE).unwrap();
        assert_eq!(config.chat.resolve_template().unwrap().id, TemplateId::ChatMl);
        let store = config.chat.parameter_store().unwrap();
        assert_eq!(store.system_message(), Some("You are a helpful assistant."));
        assert_eq!(config.chat.parameter_scope, ParameterScope::Global);
        assert!(!config.telegram.enabled);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.chat.history_length, 10);
        assert_eq!(config.chat.assistant_name, "AI");
        assert_eq!(config.engine.connect_retries, 3);
        assert_eq!(
            config.chat.parameter_store().unwrap().snapshot(),
            GenerationParams::default()
        );
        assert_eq!(config.chat.generation_timeout(), None);
    }

    #[test]
    fn bad_values_fail_before_use() {
        let config: Config =
            serde_json::from_str(r#"{"chat": {"template": "alpaca", "top_p": 1.5}}"#).unwrap();
        assert!(matches!(
            config.chat.resolve_template(),
            Err(ChatError::UnknownTemplate(_))
        ));
        assert!(matches!(
            config.chat.parameter_store(),
            Err(ChatError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn zero_history_length_is_rejected() {
        let config: Config = serde_json::from_str(r#"{"chat": {"history_length": 0}}"#).unwrap();
        let err = config.chat.history_window().unwrap_err();
        assert!(err.to_string().contains("history_length"));

        let config: Config = serde_json::from_str(r#"{"chat": {"history_length": 6}}"#).unwrap();
        assert_eq!(config.chat.history_window().unwrap(), 6);
    }

    #[test]
    fn per_conversation_scope_and_timeout() {
        let config: Config = serde_json::from_str(
            r#"{"chat": {"parameter_scope": "per_conversation", "generation_timeout_secs": 30}}"#,
        )
        .unwrap();
        assert_eq!(config.chat.parameter_scope, ParameterScope::PerConversation);
        assert_eq!(config.chat.generation_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn user_data_path_is_relative_to_config_dir() {
        let telegram = TelegramConfig::default();
        assert_eq!(
            telegram.user_data_path(Path::new("/home/me/palaver")),
            PathBuf::from("/home/me/palaver/users.json")
        );
    }

    #[test]
    fn load_from_reports_bad_json() {
        let path = std::env::temp_dir().join("palaver_config_bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid config file"));
        let _ = std::fs::remove_file(&path);
    }
}
