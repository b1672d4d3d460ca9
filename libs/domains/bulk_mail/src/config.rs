//! Configuration for the bulk mailer.

use crate::models::{Priority, Sender};
use core_config::{ConfigError, Environment, FromEnv, env_or_default, env_parse_or};
use std::collections::HashSet;

/// Default number of recipients per transport call.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Settings that drive grouping, batching and the deliver-or-spool decision.
#[derive(Debug, Clone)]
pub struct BulkMailConfig {
    /// Environment the mailer runs in. Anything that is not production or
    /// staging only mails the internal domain.
    pub environment: Environment,
    /// Sender used when a request does not name one.
    pub default_sender: Option<Sender>,
    /// Maximum recipients per transport call.
    pub batch_size: usize,
    /// Priorities delivered immediately; the rest go straight to the spool.
    pub immediate_priorities: HashSet<Priority>,
    /// Address domain allowed through outside production and staging.
    pub internal_domain: String,
}

impl Default for BulkMailConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            default_sender: None,
            batch_size: DEFAULT_BATCH_SIZE,
            immediate_priorities: [Priority::High, Priority::Normal].into_iter().collect(),
            internal_domain: "localhost".to_string(),
        }
    }
}

impl BulkMailConfig {
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_default_sender(mut self, sender: Sender) -> Self {
        self.default_sender = Some(sender);
        self
    }

    /// Set the batch size. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_immediate_priorities(mut self, priorities: impl IntoIterator<Item = Priority>) -> Self {
        self.immediate_priorities = priorities.into_iter().collect();
        self
    }

    pub fn with_internal_domain(mut self, domain: impl Into<String>) -> Self {
        self.internal_domain = domain.into().to_ascii_lowercase();
        self
    }

    /// Whether messages of this priority are delivered right away.
    pub fn is_immediate(&self, priority: Priority) -> bool {
        self.immediate_priorities.contains(&priority)
    }
}

/// Parse a comma separated priority list such as `high,normal`.
pub fn parse_priorities(raw: &str) -> Result<HashSet<Priority>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::parse::<Priority>)
        .collect()
}

impl FromEnv for BulkMailConfig {
    /// Reads:
    /// - `BULK_MAIL_FROM_EMAIL` / `BULK_MAIL_FROM_NAME`: default sender (optional)
    /// - `BULK_MAIL_BATCH_SIZE`: defaults to 100
    /// - `BULK_MAIL_IMMEDIATE_PRIORITIES`: defaults to `high,normal`
    /// - `BULK_MAIL_INTERNAL_DOMAIN`: defaults to `localhost`
    fn from_env() -> Result<Self, ConfigError> {
        let batch_size: usize = env_parse_or("BULK_MAIL_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        if batch_size == 0 {
            return Err(ConfigError::ParseError {
                key: "BULK_MAIL_BATCH_SIZE".to_string(),
                details: "must be at least 1".to_string(),
            });
        }

        let immediate_priorities =
            parse_priorities(&env_or_default("BULK_MAIL_IMMEDIATE_PRIORITIES", "high,normal"))
                .map_err(|details| ConfigError::ParseError {
                    key: "BULK_MAIL_IMMEDIATE_PRIORITIES".to_string(),
                    details,
                })?;

        let default_sender = std::env::var("BULK_MAIL_FROM_EMAIL").ok().map(|email| {
            Sender::new(email, env_or_default("BULK_MAIL_FROM_NAME", "Zerg"))
        });

        Ok(Self {
            environment: Environment::from_env(),
            default_sender,
            batch_size,
            immediate_priorities,
            internal_domain: env_or_default("BULK_MAIL_INTERNAL_DOMAIN", "localhost")
                .to_ascii_lowercase(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BulkMailConfig::default();
        assert_eq!(config.batch_size, 100);
        assert!(config.is_immediate(Priority::High));
        assert!(config.is_immediate(Priority::Normal));
        assert!(!config.is_immediate(Priority::Low));
        assert!(config.default_sender.is_none());
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        let config = BulkMailConfig::default().with_batch_size(0);
        assert_eq!(config.batch_size, 1);
    }

    #[test]
    fn test_parse_priorities() {
        let parsed = parse_priorities("high, low").unwrap();
        assert!(parsed.contains(&Priority::High));
        assert!(parsed.contains(&Priority::Low));
        assert!(!parsed.contains(&Priority::Normal));

        assert!(parse_priorities("").unwrap().is_empty());
        assert!(parse_priorities("high,asap").is_err());
    }

    #[test]
    fn test_from_env() {
        temp_env::with_vars(
            [
                ("APP_ENV", Some("staging")),
                ("BULK_MAIL_BATCH_SIZE", Some("25")),
                ("BULK_MAIL_IMMEDIATE_PRIORITIES", Some("high")),
                ("BULK_MAIL_FROM_EMAIL", Some("news@example.com")),
                ("BULK_MAIL_FROM_NAME", Some("Newsletter")),
                ("BULK_MAIL_INTERNAL_DOMAIN", Some("Example.COM")),
            ],
            || {
                let config = BulkMailConfig::from_env().unwrap();
                assert_eq!(config.environment, Environment::Staging);
                assert_eq!(config.batch_size, 25);
                assert!(config.is_immediate(Priority::High));
                assert!(!config.is_immediate(Priority::Normal));
                assert_eq!(
                    config.default_sender,
                    Some(Sender::new("news@example.com", "Newsletter"))
                );
                assert_eq!(config.internal_domain, "example.com");
            },
        );
    }

    #[test]
    fn test_from_env_rejects_zero_batch_size() {
        temp_env::with_var("BULK_MAIL_BATCH_SIZE", Some("0"), || {
            let err = BulkMailConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("BULK_MAIL_BATCH_SIZE"));
        });
    }

    #[test]
    fn test_from_env_rejects_unknown_priority() {
        temp_env::with_var("BULK_MAIL_IMMEDIATE_PRIORITIES", Some("high,urgent"), || {
            let err = BulkMailConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("BULK_MAIL_IMMEDIATE_PRIORITIES"));
        });
    }
}
