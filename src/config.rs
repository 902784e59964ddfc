use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Users allowed to talk to the bot. Empty means everyone.
    #[serde(default)]
    pub allowed_user_ids: Vec<u64>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastConfig {
    #[serde(default = "default_max_recipients")]
    pub max_recipients: usize,
    #[serde(default = "default_delay_seconds")]
    pub delay_seconds: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            max_recipients: default_max_recipients(),
            delay_seconds: default_delay_seconds(),
        }
    }
}

impl BroadcastConfig {
    pub fn delay(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.delay_seconds)
    }
}

fn default_max_recipients() -> usize {
    50
}

fn default_delay_seconds() -> u64 {
    10
}

impl Config {
    /// Load from `path` if it exists, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)?
        } else {
            Config::default()
        };

        let config = config.with_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Apply `TELEGRAM_BOT_TOKEN`, `MAX_RECIPIENTS` and `DELAY_SECONDS` from `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN").filter(|t| !t.trim().is_empty()) {
            self.telegram.bot_token = token.trim().to_string();
        }
        if let Some(max) = lookup("MAX_RECIPIENTS") {
            self.broadcast.max_recipients = max
                .trim()
                .parse()
                .with_context(|| format!("MAX_RECIPIENTS is not a number: {}", max))?;
        }
        if let Some(delay) = lookup("DELAY_SECONDS") {
            self.broadcast.delay_seconds = delay
                .trim()
                .parse()
                .with_context(|| format!("DELAY_SECONDS is not a number: {}", delay))?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.is_empty() {
            anyhow::bail!(
                "Telegram bot token is required: set [telegram] bot_token or TELEGRAM_BOT_TOKEN"
            );
        }
        if self.broadcast.max_recipients == 0 {
            anyhow::bail!("max_recipients must be at least 1");
        }
        Ok(())
    }

    pub fn is_user_allowed(&self, user_id: u64) -> bool {
        self.telegram.allowed_user_ids.is_empty()
            || self.telegram.allowed_user_ids.contains(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = Config::parse("[telegram]\nbot_token = \"abc\"\n").unwrap();
        assert_eq!(config.broadcast.max_recipients, 50);
        assert_eq!(config.broadcast.delay_seconds, 10);
        assert!(config.telegram.allowed_user_ids.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_values_are_read() {
        let config = Config::parse(
            "[telegram]\nbot_token = \"abc\"\nallowed_user_ids = [1, 2]\n\n\
             [broadcast]\nmax_recipients = 20\ndelay_seconds = 3\n",
        )
        .unwrap();
        assert_eq!(config.telegram.allowed_user_ids, vec![1, 2]);
        assert_eq!(config.broadcast.max_recipients, 20);
        assert_eq!(config.broadcast.delay(), std::time::Duration::from_secs(3));
    }

    #[test]
    fn test_env_overrides_file() {
        let config = Config::parse("[broadcast]\nmax_recipients = 20\n")
            .unwrap()
            .with_overrides(env(&[
                ("TELEGRAM_BOT_TOKEN", " from-env "),
                ("MAX_RECIPIENTS", "5"),
                ("DELAY_SECONDS", "0"),
            ]))
            .unwrap();
        assert_eq!(config.telegram.bot_token, "from-env");
        assert_eq!(config.broadcast.max_recipients, 5);
        assert_eq!(config.broadcast.delay_seconds, 0);
    }

    #[test]
    fn test_bad_numeric_override_is_an_error() {
        let result = Config::default().with_overrides(env(&[("DELAY_SECONDS", "ten")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_token_fails_validation() {
        let config = Config::default().with_overrides(env(&[])).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_max_recipients_fails_validation() {
        let config = Config::parse("[telegram]\nbot_token = \"t\"\n[broadcast]\nmax_recipients = 0\n")
            .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_allow_list() {
        let mut config = Config::default();
        assert!(config.is_user_allowed(42));
        config.telegram.allowed_user_ids = vec![7];
        assert!(config.is_user_allowed(7));
        assert!(!config.is_user_allowed(42));
    }
}
