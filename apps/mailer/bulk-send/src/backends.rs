//! Transport and spool store selection.

use clap::ValueEnum;
use core_config::FromEnv;
use domain_bulk_mail::transport::{MockTransport, SendGridTransport, SmtpTransport};
use domain_bulk_mail::{InMemorySpoolStore, MailTransport, RedisSpoolConfig, RedisSpoolStore, SpoolStore};
use eyre::{Result, WrapErr};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// SMTP relay configured by `SMTP_*`
    Smtp,
    /// SendGrid API configured by `SENDGRID_*`
    Sendgrid,
    /// Accept everything and deliver nothing
    Mock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SpoolKind {
    /// Redis stream at `REDIS_HOST`
    Redis,
    /// Keep records in memory and print them on exit
    Memory,
}

pub fn build_transport(kind: TransportKind) -> Result<Arc<dyn MailTransport>> {
    let transport: Arc<dyn MailTransport> = match kind {
        TransportKind::Smtp => Arc::new(SmtpTransport::from_env().wrap_err("SMTP transport")?),
        TransportKind::Sendgrid => {
            Arc::new(SendGridTransport::from_env().wrap_err("SendGrid transport")?)
        }
        TransportKind::Mock => Arc::new(MockTransport::new()),
    };
    info!(transport = transport.name(), "Mail transport ready");
    Ok(transport)
}

/// A spool store plus, for the in-memory kind, a handle to read it back.
pub struct Spool {
    pub store: Arc<dyn SpoolStore>,
    pub memory: Option<Arc<InMemorySpoolStore>>,
}

pub async fn build_spool(kind: SpoolKind) -> Result<Spool> {
    match kind {
        SpoolKind::Redis => {
            let config = RedisSpoolConfig::from_env().wrap_err("Redis spool configuration")?;
            info!(stream = %config.stream_name, "Connecting to Redis spool...");
            let store = RedisSpoolStore::connect(config)
                .await
                .wrap_err("Redis connection failed")?;
            Ok(Spool {
                store: Arc::new(store),
                memory: None,
            })
        }
        SpoolKind::Memory => {
            let memory = Arc::new(InMemorySpoolStore::new());
            Ok(Spool {
                store: memory.clone(),
                memory: Some(memory),
            })
        }
    }
}
