//! Bulk Mail Domain
//!
//! Sends one message to many recipients at once. Recipients are grouped by
//! content format and locale so each group renders a single body, then every
//! group is either delivered right away in batches or handed to a durable
//! spool store for a separate retry process.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   SendRequest   │  ← recipients, sender, subject, priority, view vars
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │   Classifier    │  ← resolve, filter, group by (format, locale)
//! └────────┬────────┘
//!          │  per group
//! ┌────────▼────────┐
//! │  Body Resolver  │  ← Handlebars, html layout, line wrapping
//! └────────┬────────┘
//!          │
//!    ┌─────┴──────┐
//!    │            │
//! ┌──▼───────┐ ┌──▼──────────┐
//! │Dispatcher│ │   Spooler   │  ← Redis stream (mail:spool)
//! └──┬───────┘ └─────────────┘
//!    │
//! ┌──▼──────────────┐
//! │  MailTransport  │  ← SMTP, SendGrid, mock
//! └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_bulk_mail::{
//!     BulkMailConfig, BulkMailer, HandlebarsRenderer, InMemoryDirectory,
//!     InMemorySpoolStore, Priority, SendRequest, StaticLocaleService,
//!     transport::SmtpTransport,
//! };
//!
//! let mailer = BulkMailer::new(
//!     BulkMailConfig::from_env()?,
//!     Arc::new(InMemoryDirectory::default()),
//!     Arc::new(StaticLocaleService::default()),
//!     Arc::new(HandlebarsRenderer::new()?),
//!     Arc::new(SmtpTransport::from_env()?),
//!     Arc::new(InMemorySpoolStore::new()),
//! );
//!
//! let sent = mailer
//!     .send(
//!         SendRequest::new()
//!             .with_recipients(recipients)
//!             .with_subject("[News] Spring update")
//!             .with_priority(Priority::Normal)
//!             .with_var("title", "Spring update"),
//!     )
//!     .await?;
//! ```

pub mod classifier;
pub mod config;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod mailer;
pub mod models;
pub mod resolver;
pub mod spool;
pub mod templates;
pub mod transport;

// Re-export commonly used types
pub use classifier::{ClassifyOptions, RecipientClassifier, SafetyPolicy};
pub use config::BulkMailConfig;
pub use directory::{InMemoryDirectory, LocaleService, RecipientDirectory, StaticLocaleService};
pub use dispatcher::{BatchDispatcher, DispatchOutcome};
pub use error::{BulkMailError, BulkMailResult};
pub use mailer::{BulkMailer, GroupReport, SendReport, SendRequest};
pub use models::{
    ContentFormat, GroupKey, Locale, Priority, Recipient, RecipientGroup, RecipientRef, Sender,
    SpoolRecord,
};
pub use resolver::{BodyResolver, LocaleContext};
pub use spool::{FallbackSpooler, InMemorySpoolStore, RedisSpoolConfig, RedisSpoolStore, SpoolStore};
pub use templates::{BodyRenderer, HandlebarsRenderer, RenderContext};
pub use transport::MailTransport;
