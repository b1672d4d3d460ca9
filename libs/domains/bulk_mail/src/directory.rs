//! Recipient directory and locale lookups.
//!
//! Both are owned by other services; the mailer only reads from them.

use crate::error::BulkMailResult;
use crate::models::{Locale, Recipient};
use async_trait::async_trait;
use std::collections::HashMap;

/// Read access to the recipient directory.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    /// Look up a recipient by identifier.
    async fn resolve(&self, id: i64) -> BulkMailResult<Option<Recipient>>;
}

/// Locale lookups for recipients.
pub trait LocaleService: Send + Sync {
    /// Locale a recipient reads mail in.
    fn user_locale(&self, recipient: &Recipient) -> Locale;

    /// Date format used for a locale when no personal preference applies.
    fn default_date_format(&self, locale: &Locale) -> String;
}

/// Directory backed by a map, used by the CLI and in tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    recipients: HashMap<i64, Recipient>,
}

impl InMemoryDirectory {
    pub fn new(recipients: impl IntoIterator<Item = Recipient>) -> Self {
        Self {
            recipients: recipients.into_iter().map(|r| (r.id, r)).collect(),
        }
    }

    pub fn insert(&mut self, recipient: Recipient) {
        self.recipients.insert(recipient.id, recipient);
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }
}

#[async_trait]
impl RecipientDirectory for InMemoryDirectory {
    async fn resolve(&self, id: i64) -> BulkMailResult<Option<Recipient>> {
        Ok(self.recipients.get(&id).cloned())
    }
}

/// Locale service answering from the recipient's stored preference and a
/// fixed table of date formats.
#[derive(Debug, Clone)]
pub struct StaticLocaleService {
    default_locale: Locale,
    date_formats: HashMap<Locale, String>,
    fallback_date_format: String,
}

impl StaticLocaleService {
    pub fn new(default_locale: impl Into<Locale>) -> Self {
        Self {
            default_locale: default_locale.into(),
            date_formats: HashMap::new(),
            fallback_date_format: "%Y-%m-%d".to_string(),
        }
    }

    pub fn with_date_format(mut self, locale: impl Into<Locale>, format: impl Into<String>) -> Self {
        self.date_formats.insert(locale.into(), format.into());
        self
    }

    pub fn default_locale(&self) -> &Locale {
        &self.default_locale
    }
}

impl Default for StaticLocaleService {
    fn default() -> Self {
        Self::new("en_US")
            .with_date_format("en_US", "%m/%d/%Y")
            .with_date_format("en_GB", "%d/%m/%Y")
            .with_date_format("de_DE", "%d.%m.%Y")
    }
}

impl LocaleService for StaticLocaleService {
    fn user_locale(&self, recipient: &Recipient) -> Locale {
        recipient
            .locale
            .as_deref()
            .filter(|code| !code.trim().is_empty())
            .map(Locale::from)
            .unwrap_or_else(|| self.default_locale.clone())
    }

    fn default_date_format(&self, locale: &Locale) -> String {
        self.date_formats
            .get(locale)
            .cloned()
            .unwrap_or_else(|| self.fallback_date_format.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_directory_resolves_known_ids() {
        let directory = InMemoryDirectory::new([Recipient::new(1, "a@example.com", "A")]);

        let found = directory.resolve(1).await.unwrap();
        assert_eq!(found.map(|r| r.email), Some("a@example.com".to_string()));
        assert!(directory.resolve(2).await.unwrap().is_none());
    }

    #[test]
    fn test_static_locale_service() {
        let locales = StaticLocaleService::default();
        let with_locale = Recipient::new(1, "a@example.com", "A").with_locale("de_DE");
        let without_locale = Recipient::new(2, "b@example.com", "B");

        assert_eq!(locales.user_locale(&with_locale), Locale::from("de_DE"));
        assert_eq!(locales.user_locale(&without_locale), Locale::from("en_US"));
        assert_eq!(locales.default_date_format(&Locale::from("de_DE")), "%d.%m.%Y");
        assert_eq!(locales.default_date_format(&Locale::from("fr_FR")), "%Y-%m-%d");
    }
}
