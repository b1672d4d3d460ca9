//! Bulk Send
//!
//! Command line front end for the bulk mailer. Sends one templated message
//! to a list of recipients, or checks that a mail transport is reachable.

use clap::{Parser, Subcommand};
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::{Environment, FromEnv};
use domain_bulk_mail::{
    BulkMailConfig, BulkMailer, ClassifyOptions, HandlebarsRenderer, Priority, SendRequest, Sender,
    StaticLocaleService,
};
use eyre::{Result, WrapErr, eyre};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

mod backends;
mod input;

use backends::{SpoolKind, TransportKind, build_spool, build_transport};

#[derive(Parser)]
#[command(name = "bulk-send")]
#[command(about = "Send a templated message to many recipients")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message to every recipient in a file
    Send {
        /// JSON file with the recipients (a list, or a document with a directory)
        #[arg(short, long)]
        recipients: PathBuf,

        /// Subject line
        #[arg(short, long)]
        subject: String,

        /// Template set; `<name>_html` and `<name>_text` are rendered
        #[arg(short, long, default_value = "announcement")]
        template: String,

        /// Directory of `*.hbs` templates to register
        #[arg(long)]
        templates: Option<PathBuf>,

        /// Delivery priority (high, normal, low)
        #[arg(short, long, default_value = "normal")]
        priority: Priority,

        /// View variables as a JSON object
        #[arg(long)]
        vars: Option<String>,

        /// Sender address. Defaults to BULK_MAIL_FROM_EMAIL.
        #[arg(long)]
        from: Option<String>,

        /// Sender display name
        #[arg(long, default_value = "")]
        from_name: String,

        /// Also mail recipients flagged as deleted
        #[arg(long)]
        include_deleted: bool,

        /// Also mail recipients who opted out
        #[arg(long)]
        override_privacy: bool,

        #[arg(long, value_enum, default_value = "smtp")]
        transport: TransportKind,

        #[arg(long, value_enum, default_value = "redis")]
        spool: SpoolKind,
    },

    /// Check that the mail transport is reachable
    Check {
        #[arg(long, value_enum, default_value = "smtp")]
        transport: TransportKind,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let environment = Environment::from_env();
    init_tracing(&environment);

    let cli = Cli::parse();

    match cli.command {
        Commands::Send {
            recipients,
            subject,
            template,
            templates,
            priority,
            vars,
            from,
            from_name,
            include_deleted,
            override_privacy,
            transport,
            spool,
        } => {
            let config = BulkMailConfig::from_env().wrap_err("Bulk mail configuration")?;
            let input = input::load_recipients(&recipients)?;
            let vars = input::parse_vars(vars.as_deref())?;

            let mut renderer = HandlebarsRenderer::new()?;
            if let Some(dir) = templates {
                let count = renderer.register_directory(&dir)?;
                info!(count, dir = %dir.display(), "Registered templates");
            }

            let spool = build_spool(spool).await?;
            let mailer = BulkMailer::new(
                config,
                Arc::new(input.directory),
                Arc::new(StaticLocaleService::default()),
                Arc::new(renderer),
                build_transport(transport)?,
                spool.store.clone(),
            );

            let mut request = SendRequest::new()
                .with_recipients(input.recipients)
                .with_subject(subject)
                .with_template(template)
                .with_priority(priority)
                .with_vars(vars)
                .with_options(ClassifyOptions {
                    include_deleted,
                    override_privacy,
                });
            if let Some(email) = from {
                request = request.with_sender(Sender::new(email, from_name));
            }
            if let Some(actor) = input.actor {
                request = request.with_actor(actor);
            }

            let report = mailer.send_with_report(request).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            if let Some(memory) = spool.memory {
                let records = memory.records().await;
                if !records.is_empty() {
                    println!("{}", serde_json::to_string_pretty(&records)?);
                }
            }

            info!(total = report.total, "Sent");
            println!("total: {}", report.total);
        }

        Commands::Check { transport } => {
            let transport = build_transport(transport)?;
            let healthy = transport
                .health_check()
                .await
                .wrap_err_with(|| format!("{} health check failed", transport.name()))?;

            if !healthy {
                return Err(eyre!("{} is not healthy", transport.name()));
            }
            println!("{}: ok", transport.name());
        }
    }

    Ok(())
}
