//! Recipient classification.
//!
//! Resolves recipient references, applies the non-production recipient
//! policy and the eligibility filters, and partitions what is left into
//! groups keyed by content format and locale.

use crate::directory::{LocaleService, RecipientDirectory};
use crate::error::{BulkMailError, BulkMailResult};
use crate::models::{ContentFormat, GroupKey, Recipient, RecipientGroup, RecipientRef};
use core_config::Environment;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Caller overrides for the eligibility filters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassifyOptions {
    /// Keep recipients flagged as deleted.
    pub include_deleted: bool,
    /// Keep recipients who opted out for privacy reasons.
    pub override_privacy: bool,
}

/// Restricts recipients to the internal domain outside production and
/// staging, so test runs never mail real users.
#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    environment: Environment,
    internal_domain: String,
}

impl SafetyPolicy {
    pub fn new(environment: Environment, internal_domain: impl Into<String>) -> Self {
        Self {
            environment,
            internal_domain: internal_domain.into().to_ascii_lowercase(),
        }
    }

    /// Whether the policy is in force.
    pub fn applies(&self) -> bool {
        !self.environment.is_live()
    }

    fn is_internal(&self, recipient: &Recipient) -> bool {
        recipient.email_domain().as_deref() == Some(self.internal_domain.as_str())
    }

    /// Keep internal recipients and append the acting user.
    fn restrict(
        &self,
        recipients: Vec<Recipient>,
        actor: Option<&Recipient>,
    ) -> BulkMailResult<Vec<Recipient>> {
        let before = recipients.len();
        let mut kept: Vec<Recipient> = recipients
            .into_iter()
            .filter(|r| self.is_internal(r))
            .collect();

        if let Some(actor) = actor {
            let present = kept
                .iter()
                .any(|r| r.id == actor.id || r.email.eq_ignore_ascii_case(&actor.email));
            if !present {
                kept.push(actor.clone());
            }
        }

        debug!(
            environment = ?self.environment,
            domain = %self.internal_domain,
            before,
            after = kept.len(),
            "Applied non-production recipient policy"
        );

        if kept.is_empty() {
            return Err(BulkMailError::NoRecipientsResolved);
        }
        Ok(kept)
    }
}

/// Splits recipients into [`RecipientGroup`]s.
pub struct RecipientClassifier {
    directory: Arc<dyn RecipientDirectory>,
    locales: Arc<dyn LocaleService>,
    safety: SafetyPolicy,
}

impl RecipientClassifier {
    pub fn new(
        directory: Arc<dyn RecipientDirectory>,
        locales: Arc<dyn LocaleService>,
        safety: SafetyPolicy,
    ) -> Self {
        Self {
            directory,
            locales,
            safety,
        }
    }

    pub fn safety(&self) -> &SafetyPolicy {
        &self.safety
    }

    /// Resolve every reference against the directory.
    ///
    /// An identifier the directory does not know is an
    /// [`BulkMailError::InvalidRecipient`].
    pub async fn resolve_all(&self, refs: &[RecipientRef]) -> BulkMailResult<Vec<Recipient>> {
        let mut resolved = Vec::with_capacity(refs.len());
        for r in refs {
            match r {
                RecipientRef::Resolved(recipient) => resolved.push(recipient.clone()),
                RecipientRef::Identifier(id) => match self.directory.resolve(*id).await? {
                    Some(recipient) => resolved.push(recipient),
                    None => return Err(BulkMailError::InvalidRecipient(id.to_string())),
                },
            }
        }
        Ok(resolved)
    }

    /// Classify recipients into groups keyed by (format, locale).
    ///
    /// Groups come out in the order their first member appeared, and members
    /// keep their input order. An empty result is not an error.
    pub async fn classify(
        &self,
        refs: &[RecipientRef],
        actor: Option<&Recipient>,
        options: ClassifyOptions,
    ) -> BulkMailResult<Vec<RecipientGroup>> {
        let mut recipients = self.resolve_all(refs).await?;

        if self.safety.applies() {
            recipients = self.safety.restrict(recipients, actor)?;
        }

        let mut groups: Vec<RecipientGroup> = Vec::new();
        let mut index: HashMap<GroupKey, usize> = HashMap::new();

        for recipient in recipients {
            if recipient.deleted && !options.include_deleted {
                debug!(recipient_id = recipient.id, "Skipping deleted recipient");
                continue;
            }
            if recipient.privacy_opt_out && !options.override_privacy {
                debug!(recipient_id = recipient.id, "Skipping recipient who opted out");
                continue;
            }

            let format = match ContentFormat::from_preference(&recipient.format) {
                Some(format) => format,
                None => {
                    warn!(
                        recipient_id = recipient.id,
                        stored_format = %recipient.format,
                        "Unknown content format preference, defaulting to html"
                    );
                    ContentFormat::Html
                }
            };
            let locale = self.locales.user_locale(&recipient);
            let key = GroupKey { format, locale };

            let slot = *index.entry(key.clone()).or_insert_with(|| {
                groups.push(RecipientGroup {
                    key,
                    recipients: Vec::new(),
                });
                groups.len() - 1
            });
            groups[slot].recipients.push(recipient);
        }

        debug!(
            groups = groups.len(),
            recipients = groups.iter().map(RecipientGroup::len).sum::<usize>(),
            "Classified recipients"
        );

        Ok(groups)
    }
}
