use crate::services::{
    metadata_store::validate_table_name,
    notifier::{SmtpSettings, SmtpTls, parse_mailbox},
    object_store::validate_bucket_name,
};
use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub bucket: String,
    pub database_url: String,
    pub metadata_table: String,
    pub smtp: Option<SmtpSettings>,
    pub notify_from: String,
    pub notify_to: Vec<String>,
    pub max_body_bytes: usize,
}

/// Largest accepted request body unless configured otherwise (25 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "File upload service")]
pub struct Args {
    /// Host to bind to (overrides UPLOAD_SERVICE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides UPLOAD_SERVICE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where uploaded objects are stored (overrides UPLOAD_SERVICE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Bucket uploads are written to (overrides UPLOAD_SERVICE_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Database URL (overrides UPLOAD_SERVICE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Table holding file metadata (overrides UPLOAD_SERVICE_METADATA_TABLE)
    #[arg(long)]
    pub metadata_table: Option<String>,

    /// SMTP relay host; notifications are only logged when unset (overrides UPLOAD_SERVICE_SMTP_HOST)
    #[arg(long)]
    pub smtp_host: Option<String>,

    /// SMTP relay port (overrides UPLOAD_SERVICE_SMTP_PORT)
    #[arg(long)]
    pub smtp_port: Option<u16>,

    /// SMTP connection security: starttls, tls or none; defaults by port (overrides UPLOAD_SERVICE_SMTP_TLS)
    #[arg(long)]
    pub smtp_tls: Option<String>,

    /// Largest accepted request body in bytes (overrides UPLOAD_SERVICE_MAX_BODY_BYTES)
    #[arg(long)]
    pub max_body_bytes: Option<usize>,

    /// Sender address for notifications (overrides UPLOAD_SERVICE_NOTIFY_FROM)
    #[arg(long)]
    pub notify_from: Option<String>,

    /// Comma-separated notification recipients (overrides UPLOAD_SERVICE_NOTIFY_TO)
    #[arg(long)]
    pub notify_to: Option<String>,

    /// Create the metadata table and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        Self::resolve(Args::parse(), |name| env::var(name).ok())
    }

    /// Merge CLI args over values from `lookup`, then over built-in defaults.
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<(Self, bool)> {
        let env_or = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.into());
        let env_port = |name: &str, default: u16| -> Result<u16> {
            match lookup(name) {
                Some(value) => value
                    .parse::<u16>()
                    .with_context(|| format!("parsing {} value `{}`", name, value)),
                None => Ok(default),
            }
        };

        let smtp_host = args.smtp_host.or_else(|| lookup("UPLOAD_SERVICE_SMTP_HOST"));
        let smtp = match smtp_host {
            Some(host) => {
                let port = match args.smtp_port {
                    Some(port) => port,
                    None => env_port("UPLOAD_SERVICE_SMTP_PORT", 587)?,
                };
                let tls = match args.smtp_tls.or_else(|| lookup("UPLOAD_SERVICE_SMTP_TLS")) {
                    Some(mode) => mode
                        .parse::<SmtpTls>()
                        .map_err(anyhow::Error::msg)
                        .context("parsing UPLOAD_SERVICE_SMTP_TLS")?,
                    None => SmtpTls::for_port(port),
                };
                Some(SmtpSettings {
                    host,
                    port,
                    tls,
                    username: lookup("UPLOAD_SERVICE_SMTP_USERNAME"),
                    password: lookup("UPLOAD_SERVICE_SMTP_PASSWORD"),
                })
            }
            None => None,
        };

        let max_body_bytes = match args.max_body_bytes {
            Some(bytes) => bytes,
            None => match lookup("UPLOAD_SERVICE_MAX_BODY_BYTES") {
                Some(value) => value.parse::<usize>().with_context(|| {
                    format!("parsing UPLOAD_SERVICE_MAX_BODY_BYTES value `{}`", value)
                })?,
                None => DEFAULT_MAX_BODY_BYTES,
            },
        };

        let notify_to = args
            .notify_to
            .unwrap_or_else(|| env_or("UPLOAD_SERVICE_NOTIFY_TO", "admin@localhost"))
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();

        let cfg = Self {
            host: args
                .host
                .unwrap_or_else(|| env_or("UPLOAD_SERVICE_HOST", "0.0.0.0")),
            port: match args.port {
                Some(port) => port,
                None => env_port("UPLOAD_SERVICE_PORT", 3000)?,
            },
            storage_dir: args
                .storage_dir
                .unwrap_or_else(|| env_or("UPLOAD_SERVICE_STORAGE_DIR", "./data/objects")),
            bucket: args
                .bucket
                .unwrap_or_else(|| env_or("UPLOAD_SERVICE_BUCKET", "file-uploads")),
            database_url: args.database_url.unwrap_or_else(|| {
                env_or("UPLOAD_SERVICE_DATABASE_URL", "sqlite://./data/meta/uploads.db")
            }),
            metadata_table: args
                .metadata_table
                .unwrap_or_else(|| env_or("UPLOAD_SERVICE_METADATA_TABLE", "file_metadata")),
            smtp,
            notify_from: args
                .notify_from
                .unwrap_or_else(|| env_or("UPLOAD_SERVICE_NOTIFY_FROM", "uploads@localhost")),
            notify_to,
            max_body_bytes,
        };

        validate_bucket_name(&cfg.bucket).context("validating bucket name")?;
        validate_table_name(&cfg.metadata_table).context("validating metadata table name")?;
        if cfg.notify_to.is_empty() {
            anyhow::bail!("at least one notification recipient is required");
        }
        parse_mailbox(&cfg.notify_from).context("validating notification sender")?;
        for recipient in &cfg.notify_to {
            parse_mailbox(recipient).context("validating notification recipient")?;
        }
        if cfg.max_body_bytes == 0 {
            anyhow::bail!("max body size must be greater than zero");
        }

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
