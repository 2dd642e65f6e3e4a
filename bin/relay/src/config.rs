//! Centralized relay configuration.
//!
//! Loaded via the `config` crate from `RELAY_`-prefixed environment
//! variables, with `__` separating nested keys:
//!
//! ```text
//! RELAY_TELEGRAM__BOT_TOKEN=123:abc
//! RELAY_BACKEND__API_KEY=sk-...
//! RELAY_CONVERSATION__RESET_KEYWORD=delete
//! ```

use serde::Deserialize;
use std::time::Duration;

/// Relay configuration composed from the per-component sections.
#[derive(Debug, Deserialize)]
pub struct RelayConfig {
    pub telegram: TelegramConfig,
    pub backend: BackendConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
}

/// Bot API connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// How long one `getUpdates` long poll may wait, in seconds.
    #[serde(default = "default_poll_timeout_seconds")]
    pub poll_timeout_seconds: u64,
}

impl TelegramConfig {
    #[must_use]
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_seconds)
    }
}

/// Completion backend settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    pub api_key: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Upper bound on a single completion call, in seconds.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

impl BackendConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Conversation behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationConfig {
    /// First message of every new conversation.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Text that clears a conversation's history.
    #[serde(default = "default_reset_keyword")]
    pub reset_keyword: String,

    /// Sent after a reset. Empty means no reply.
    #[serde(default = "default_reset_reply")]
    pub reset_reply: String,

    /// Sent when a round fails. Absent means failures are only logged.
    #[serde(default)]
    pub failure_notice: Option<String>,
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout_seconds() -> u64 {
    30
}

fn default_base_url() -> String {
    "https://ai-gateway.vercel.sh/v1".to_string()
}

fn default_model() -> String {
    "openai/gpt-5-nano".to_string()
}

fn default_request_timeout_seconds() -> u64 {
    60
}

fn default_system_prompt() -> String {
    "You are Tut, an AI well versed in programming. You can answer all kinds of \
     questions, not only about programming. Keep answers under 50 words. When the \
     user sends \"delete\", explain that the message history has been deleted."
        .to_string()
}

fn default_reset_keyword() -> String {
    "delete".to_string()
}

fn default_reset_reply() -> String {
    "History deleted.".to_string()
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            reset_keyword: default_reset_keyword(),
            reset_reply: default_reset_reply(),
            failure_notice: None,
        }
    }
}

impl RelayConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::load(environment())
    }

    fn load(source: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("RELAY")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<RelayConfig, config::ConfigError> {
        let map: config::Map<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        RelayConfig::load(environment().source(Some(map)))
    }

    #[test]
    fn conversation_config_has_correct_defaults() {
        let config = ConversationConfig::default();
        assert_eq!(config.reset_keyword, "delete");
        assert_eq!(config.reset_reply, "History deleted.");
        assert!(config.system_prompt.starts_with("You are Tut"));
        assert!(config.failure_notice.is_none());
    }

    #[test]
    fn required_values_with_defaults() {
        let config = load(&[
            ("RELAY_TELEGRAM__BOT_TOKEN", "123:abc"),
            ("RELAY_BACKEND__API_KEY", "sk-test"),
        ])
        .unwrap();

        assert_eq!(config.telegram.bot_token, "123:abc");
        assert_eq!(config.telegram.api_base, "https://api.telegram.org");
        assert_eq!(config.telegram.poll_timeout(), Duration::from_secs(30));
        assert_eq!(config.backend.base_url, "https://ai-gateway.vercel.sh/v1");
        assert_eq!(config.backend.model, "openai/gpt-5-nano");
        assert_eq!(config.backend.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.conversation.reset_keyword, "delete");
    }

    #[test]
    fn overrides_are_applied() {
        let config = load(&[
            ("RELAY_TELEGRAM__BOT_TOKEN", "123:abc"),
            ("RELAY_TELEGRAM__POLL_TIMEOUT_SECONDS", "5"),
            ("RELAY_BACKEND__API_KEY", "sk-test"),
            ("RELAY_BACKEND__MODEL", "anthropic/claude-haiku"),
            ("RELAY_CONVERSATION__RESET_KEYWORD", "/reset"),
            ("RELAY_CONVERSATION__FAILURE_NOTICE", "Try again later."),
        ])
        .unwrap();

        assert_eq!(config.telegram.poll_timeout_seconds, 5);
        assert_eq!(config.backend.model, "anthropic/claude-haiku");
        assert_eq!(config.conversation.reset_keyword, "/reset");
        assert_eq!(
            config.conversation.failure_notice.as_deref(),
            Some("Try again later.")
        );
    }

    #[test]
    fn missing_bot_token_is_an_error() {
        assert!(load(&[("RELAY_BACKEND__API_KEY", "sk-test")]).is_err());
    }
}
