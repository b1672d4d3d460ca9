//! Data models for the bulk mail domain.

use crate::error::BulkMailError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Mime type of an html body.
pub const MIME_TEXT_HTML: &str = "text/html";
/// Mime type of a plain text body.
pub const MIME_TEXT_PLAIN: &str = "text/plain";

/// Rendered bodies keyed by mime type.
pub type Bodies = BTreeMap<String, String>;

// ============================================================================
// Content format, locale and priority
// ============================================================================

/// Content format a recipient receives.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    Html,
    Text,
}

impl ContentFormat {
    /// Interpret a stored preference. Only the exact values `html` and
    /// `text` are recognised.
    pub fn from_preference(preference: &str) -> Option<Self> {
        match preference {
            "html" => Some(ContentFormat::Html),
            "text" => Some(ContentFormat::Text),
            _ => None,
        }
    }

    /// Mime type of the body produced for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            ContentFormat::Html => MIME_TEXT_HTML,
            ContentFormat::Text => MIME_TEXT_PLAIN,
        }
    }
}

impl fmt::Display for ContentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentFormat::Html => write!(f, "html"),
            ContentFormat::Text => write!(f, "text"),
        }
    }
}

impl FromStr for ContentFormat {
    type Err = BulkMailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentFormat::from_preference(s)
            .ok_or_else(|| BulkMailError::InvalidContentType(s.to_string()))
    }
}

/// A locale identifier such as `en_US`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Locale(String);

impl Locale {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Locale {
    fn from(code: &str) -> Self {
        Self(code.to_string())
    }
}

/// Delivery priority of a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Normal => write!(f, "normal"),
            Priority::Low => write!(f, "low"),
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

// ============================================================================
// Recipients
// ============================================================================

/// Snapshot of a recipient as held by the recipient directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recipient {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub name: String,
    /// Stored content format preference, not normalised.
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub locale: Option<String>,
    /// Personal date format preference.
    #[serde(default)]
    pub date_format: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub privacy_opt_out: bool,
}

impl Recipient {
    /// Create an active html recipient with no locale preference.
    pub fn new(id: i64, email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            name: name.into(),
            format: "html".to_string(),
            locale: None,
            date_format: None,
            deleted: false,
            privacy_opt_out: false,
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_date_format(mut self, date_format: impl Into<String>) -> Self {
        self.date_format = Some(date_format.into());
        self
    }

    pub fn deleted(mut self) -> Self {
        self.deleted = true;
        self
    }

    pub fn opted_out(mut self) -> Self {
        self.privacy_opt_out = true;
        self
    }

    /// Domain part of the address, lowercased.
    pub fn email_domain(&self) -> Option<String> {
        self.email
            .rsplit_once('@')
            .map(|(_, domain)| domain.to_ascii_lowercase())
    }
}

/// A recipient as supplied by the caller: either an identifier still to be
/// resolved by the directory or an already resolved record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RecipientRef {
    Identifier(i64),
    Resolved(Recipient),
}

impl From<Recipient> for RecipientRef {
    fn from(recipient: Recipient) -> Self {
        RecipientRef::Resolved(recipient)
    }
}

impl From<i64> for RecipientRef {
    fn from(id: i64) -> Self {
        RecipientRef::Identifier(id)
    }
}

impl FromStr for RecipientRef {
    type Err = BulkMailError;

    /// Only numeric identifiers are accepted from raw input.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(RecipientRef::Identifier)
            .map_err(|_| BulkMailError::InvalidRecipient(s.to_string()))
    }
}

/// Key shared by every recipient of a [`RecipientGroup`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub format: ContentFormat,
    pub locale: Locale,
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.format, self.locale)
    }
}

/// Recipients sharing one content format and locale, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientGroup {
    pub key: GroupKey,
    pub recipients: Vec<Recipient>,
}

impl RecipientGroup {
    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }
}

// ============================================================================
// Sender and message
// ============================================================================

/// Identity a message is sent from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sender {
    #[serde(default)]
    pub id: Option<i64>,
    pub email: String,
    #[serde(default)]
    pub name: String,
}

impl Sender {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            email: email.into(),
            name: name.into(),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// A sender has a valid identity when its address parses as a mailbox
    /// address.
    pub fn has_valid_identity(&self) -> bool {
        self.email.parse::<lettre::Address>().is_ok()
    }
}

/// Message built for one recipient group.
#[derive(Debug, Clone)]
pub struct Message {
    pub sender: Sender,
    pub subject: String,
    pub priority: Priority,
    pub bodies: Bodies,
}

// ============================================================================
// Spool records
// ============================================================================

/// Recipient entry of a [`SpoolRecord`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpoolRecipient {
    pub id: i64,
    pub email: String,
    /// Stored format preference, honoured by the downstream retry process.
    pub format: String,
}

impl From<&Recipient> for SpoolRecipient {
    fn from(recipient: &Recipient) -> Self {
        Self {
            id: recipient.id,
            email: recipient.email.clone(),
            format: recipient.format.clone(),
        }
    }
}

/// A group of recipients handed to the durable store for later delivery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpoolRecord {
    pub id: Uuid,
    pub sender_id: Option<i64>,
    pub sender_email: String,
    pub sender_name: String,
    pub recipients: Vec<SpoolRecipient>,
    pub subject: String,
    pub body: String,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
}

impl SpoolRecord {
    pub fn new(
        sender: &Sender,
        recipients: &[Recipient],
        subject: impl Into<String>,
        body: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id: sender.id,
            sender_email: sender.email.clone(),
            sender_name: sender.name.clone(),
            recipients: recipients.iter().map(SpoolRecipient::from).collect(),
            subject: subject.into(),
            body: body.into(),
            priority,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_format_preference_is_exact() {
        assert_eq!(ContentFormat::from_preference("html"), Some(ContentFormat::Html));
        assert_eq!(ContentFormat::from_preference("text"), Some(ContentFormat::Text));
        assert_eq!(ContentFormat::from_preference("HTML"), None);
        assert_eq!(ContentFormat::from_preference(""), None);
        assert!("markdown".parse::<ContentFormat>().is_err());
    }

    #[test]
    fn test_priority_parsing() {
        assert_eq!("LOW".parse::<Priority>().unwrap(), Priority::Low);
        assert_eq!(" normal ".parse::<Priority>().unwrap(), Priority::Normal);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_recipient_ref_from_str_accepts_only_numbers() {
        assert_eq!("42".parse::<RecipientRef>().unwrap(), RecipientRef::Identifier(42));
        let err = "bob@example.com".parse::<RecipientRef>().unwrap_err();
        assert!(matches!(err, BulkMailError::InvalidRecipient(_)));
    }

    #[test]
    fn test_recipient_ref_deserializes_both_shapes() {
        let refs: Vec<RecipientRef> = serde_json::from_str(
            r#"[7, {"id": 8, "email": "a@example.com", "format": "text"}]"#,
        )
        .unwrap();
        assert_eq!(refs[0], RecipientRef::Identifier(7));
        match &refs[1] {
            RecipientRef::Resolved(r) => {
                assert_eq!(r.id, 8);
                assert_eq!(r.format, "text");
                assert!(!r.deleted);
            }
            other => panic!("expected resolved recipient, got {:?}", other),
        }
    }

    #[test]
    fn test_sender_identity() {
        assert!(Sender::new("noreply@example.com", "Example").has_valid_identity());
        assert!(!Sender::new("", "Nobody").has_valid_identity());
        assert!(!Sender::new("not an address", "Nobody").has_valid_identity());
    }

    #[test]
    fn test_spool_record_keeps_stored_formats() {
        let recipients = vec![
            Recipient::new(1, "a@example.com", "A").with_format("text"),
            Recipient::new(2, "b@example.com", "B").with_format("weird"),
        ];
        let sender = Sender::new("noreply@example.com", "Example").with_id(9);
        let record = SpoolRecord::new(&sender, &recipients, "Hello", "Body", Priority::Low);

        assert_eq!(record.sender_id, Some(9));
        assert_eq!(record.recipients.len(), 2);
        assert_eq!(record.recipients[0].format, "text");
        assert_eq!(record.recipients[1].format, "weird");
    }
}
