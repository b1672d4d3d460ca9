//! Send orchestration.
//!
//! [`BulkMailer::send`] validates a request, classifies its recipients,
//! renders every group up front and then either delivers each group in
//! batches or hands it to the spool store.

use crate::classifier::{ClassifyOptions, RecipientClassifier, SafetyPolicy};
use crate::config::BulkMailConfig;
use crate::directory::{LocaleService, RecipientDirectory};
use crate::dispatcher::{BatchDispatcher, DispatchOutcome};
use crate::error::{BulkMailError, BulkMailResult};
use crate::models::{GroupKey, Message, Priority, Recipient, RecipientGroup, RecipientRef, Sender};
use crate::resolver::{BodyResolver, LocaleContext};
use crate::spool::{FallbackSpooler, SpoolStore};
use crate::templates::{ANNOUNCEMENT, BodyRenderer};
use crate::transport::MailTransport;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Locale a request renders in when the caller does not say.
pub const DEFAULT_CALLER_LOCALE: &str = "en_US";

/// A bulk send request.
#[derive(Debug, Clone)]
pub struct SendRequest {
    /// Recipients to mail. `None` is rejected; an empty list sends nothing.
    pub recipients: Option<Vec<RecipientRef>>,
    /// Sender identity. Falls back to the configured default sender.
    pub sender: Option<Sender>,
    pub subject: Option<String>,
    pub priority: Priority,
    /// Template set name; `<template>_html` and `<template>_text` are rendered.
    pub template: String,
    /// View variables handed to the templates.
    pub vars: Map<String, Value>,
    pub options: ClassifyOptions,
    /// User performing the send. Always included outside production and
    /// staging.
    pub actor: Option<Recipient>,
    /// Locale the caller is operating in.
    pub locale: LocaleContext,
}

impl Default for SendRequest {
    fn default() -> Self {
        Self {
            recipients: None,
            sender: None,
            subject: None,
            priority: Priority::default(),
            template: ANNOUNCEMENT.to_string(),
            vars: Map::new(),
            options: ClassifyOptions::default(),
            actor: None,
            locale: LocaleContext::new(DEFAULT_CALLER_LOCALE),
        }
    }
}

impl SendRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recipients(mut self, recipients: impl IntoIterator<Item = RecipientRef>) -> Self {
        self.recipients = Some(recipients.into_iter().collect());
        self
    }

    pub fn with_sender(mut self, sender: Sender) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Set a single view variable.
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_vars(mut self, vars: Map<String, Value>) -> Self {
        self.vars = vars;
        self
    }

    pub fn with_options(mut self, options: ClassifyOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_actor(mut self, actor: Recipient) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_locale(mut self, locale: LocaleContext) -> Self {
        self.locale = locale;
        self
    }

    /// First recipient of the request.
    #[deprecated(note = "requests carry a recipient list; read `recipients` instead")]
    pub fn to_user(&self) -> Option<&RecipientRef> {
        warn!("SendRequest::to_user is deprecated, read the recipient list instead");
        self.recipients.as_ref().and_then(|recipients| recipients.first())
    }
}

/// Stage a send is in, used to tag log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Validating,
    Rejected,
    Grouping,
    Rendering,
    Delivering,
    Spooling,
    Accounting,
    Done,
}

impl fmt::Display for SendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SendState::Validating => "validating",
            SendState::Rejected => "rejected",
            SendState::Grouping => "grouping",
            SendState::Rendering => "rendering",
            SendState::Delivering => "delivering",
            SendState::Spooling => "spooling",
            SendState::Accounting => "accounting",
            SendState::Done => "done",
        };
        f.write_str(name)
    }
}

/// What happened to one recipient group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupReport {
    pub key: GroupKey,
    /// Recipients in the group.
    pub recipients: usize,
    /// Unique addresses handed to the transport.
    pub addresses: usize,
    /// Recipients the transport accepted.
    pub delivered: usize,
    /// Recipients handed to the spool store.
    pub spooled: usize,
    /// Whether the group was neither delivered nor spooled.
    pub dropped: bool,
}

/// Per-group breakdown of a send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SendReport {
    pub groups: Vec<GroupReport>,
    /// Delivered plus spooled recipients across every group.
    pub total: usize,
}

/// Strip leading bracketed tags: `[News] [EU] Hello` becomes `Hello`.
pub fn short_subject(subject: &str) -> &str {
    let mut rest = subject.trim_start();
    while let Some(tail) = rest.strip_prefix('[') {
        match tail.find(']') {
            Some(end) => rest = tail[end + 1..].trim_start(),
            None => break,
        }
    }
    rest
}

/// Bulk mail orchestrator.
pub struct BulkMailer {
    config: BulkMailConfig,
    classifier: RecipientClassifier,
    resolver: BodyResolver,
    dispatcher: BatchDispatcher,
    spooler: FallbackSpooler,
}

impl BulkMailer {
    pub fn new(
        config: BulkMailConfig,
        directory: Arc<dyn RecipientDirectory>,
        locales: Arc<dyn LocaleService>,
        renderer: Arc<dyn BodyRenderer>,
        transport: Arc<dyn MailTransport>,
        spool_store: Arc<dyn SpoolStore>,
    ) -> Self {
        let safety = SafetyPolicy::new(config.environment, config.internal_domain.clone());

        Self {
            classifier: RecipientClassifier::new(directory, locales.clone(), safety),
            resolver: BodyResolver::new(renderer, locales),
            dispatcher: BatchDispatcher::new(transport, config.batch_size),
            spooler: FallbackSpooler::new(spool_store),
            config,
        }
    }

    pub fn config(&self) -> &BulkMailConfig {
        &self.config
    }

    /// Send a request and return how many recipients were delivered or
    /// spooled.
    pub async fn send(&self, request: SendRequest) -> BulkMailResult<usize> {
        Ok(self.send_with_report(request).await?.total)
    }

    /// Send a request and return the per-group breakdown.
    pub async fn send_with_report(&self, request: SendRequest) -> BulkMailResult<SendReport> {
        let (refs, sender, subject) = match self.validate(&request) {
            Ok(validated) => validated,
            Err(e) => {
                warn!(state = %SendState::Rejected, error = %e, "Rejected bulk send request");
                return Err(e);
            }
        };

        let short = short_subject(subject);

        // outside production the actor is still mailed
        if refs.is_empty() && !self.classifier.safety().applies() {
            info!(
                state = %SendState::Done,
                subject = %short,
                "No recipients supplied, nothing to send"
            );
            return Ok(SendReport::default());
        }

        debug!(state = %SendState::Grouping, recipients = refs.len(), subject = %short);
        let groups = self
            .classifier
            .classify(refs, request.actor.as_ref(), request.options)
            .await?;

        // Render every group before the first delivery so a template error
        // never leaves a send half done.
        let prepared = groups
            .iter()
            .map(|group| self.prepare_group(group, &request, &sender, subject))
            .collect::<BulkMailResult<Vec<_>>>()?;

        let mut report = SendReport::default();
        for group in &prepared {
            let group_report = self.process_group(group).await;
            report.total += group_report.delivered + group_report.spooled;
            report.groups.push(group_report);
        }

        info!(
            state = %SendState::Accounting,
            subject = %short,
            priority = %request.priority,
            groups = report.groups.len(),
            total = report.total,
            "Bulk send finished"
        );

        Ok(report)
    }

    fn validate<'a>(
        &'a self,
        request: &'a SendRequest,
    ) -> BulkMailResult<(&'a [RecipientRef], Sender, &'a str)> {
        debug!(state = %SendState::Validating);

        let refs = request
            .recipients
            .as_deref()
            .ok_or(BulkMailError::MissingRecipients)?;

        let sender = request
            .sender
            .as_ref()
            .or(self.config.default_sender.as_ref())
            .filter(|sender| sender.has_valid_identity())
            .cloned()
            .ok_or(BulkMailError::MissingSender)?;

        let subject = request
            .subject
            .as_deref()
            .ok_or(BulkMailError::MissingSubject)?;

        Ok((refs, sender, subject))
    }

    fn prepare_group<'g>(
        &self,
        group: &'g RecipientGroup,
        request: &SendRequest,
        sender: &Sender,
        subject: &str,
    ) -> BulkMailResult<PreparedGroup<'g>> {
        debug!(
            state = %SendState::Rendering,
            group.format = %group.key.format,
            group.locale = %group.key.locale,
            recipients = group.len(),
        );
        let bodies = self
            .resolver
            .resolve(group, &request.template, &request.vars, &request.locale)?;
        let spool_body = self.resolver.resolve_spool_body(
            group,
            &request.template,
            &request.vars,
            &request.locale,
            &bodies,
        )?;

        Ok(PreparedGroup {
            group,
            message: Message {
                sender: sender.clone(),
                subject: subject.to_string(),
                priority: request.priority,
                bodies,
            },
            spool_body,
        })
    }

    async fn process_group(&self, prepared: &PreparedGroup<'_>) -> GroupReport {
        let PreparedGroup {
            group,
            message,
            spool_body,
        } = prepared;
        let subject = message.subject.as_str();

        let mut report = GroupReport {
            key: group.key.clone(),
            recipients: group.len(),
            addresses: 0,
            delivered: 0,
            spooled: 0,
            dropped: false,
        };

        if self.config.is_immediate(message.priority) {
            debug!(
                state = %SendState::Delivering,
                transport = self.dispatcher.transport_name(),
                group = %group.key,
            );
            let outcome = self
                .dispatcher
                .dispatch(&message.sender, &group.recipients, &message.subject, &message.bodies)
                .await;

            if let DispatchOutcome::Delivered {
                attempted,
                delivered,
                failed_batches,
            } = outcome
            {
                report.addresses = attempted;
                if delivered < attempted {
                    info!(
                        group.format = %group.key.format,
                        group.locale = %group.key.locale,
                        recipients = report.recipients,
                        addresses = report.addresses,
                        delivered,
                        failed_batches,
                        subject = %short_subject(subject),
                        "Delivered group with a shortfall"
                    );
                } else {
                    info!(
                        group.format = %group.key.format,
                        group.locale = %group.key.locale,
                        recipients = report.recipients,
                        addresses = report.addresses,
                        delivered,
                        subject = %short_subject(subject),
                        "Delivered group"
                    );
                }
                report.delivered = delivered;
                return report;
            }
        }

        debug!(state = %SendState::Spooling, group = %group.key);
        match self
            .spooler
            .spool(&group.recipients, spool_body, &message.sender, &message.subject, message.priority)
            .await
        {
            Some(spooled) => {
                info!(
                    group.format = %group.key.format,
                    group.locale = %group.key.locale,
                    spooled,
                    priority = %message.priority,
                    subject = %short_subject(subject),
                    "Spooled group for later delivery"
                );
                report.spooled = spooled;
            }
            None => {
                error!(
                    group.format = %group.key.format,
                    group.locale = %group.key.locale,
                    recipients = group.len(),
                    subject = %short_subject(subject),
                    "Group was neither delivered nor spooled, dropping it"
                );
                report.dropped = true;
            }
        }

        report
    }
}

/// A group with everything rendered, ready to deliver or spool.
struct PreparedGroup<'g> {
    group: &'g RecipientGroup,
    message: Message,
    /// Plain text body for the spool record.
    spool_body: String,
}
