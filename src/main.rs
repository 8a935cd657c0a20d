use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::{fs, net::TcpListener};
use tracing_subscriber::EnvFilter;
use upload_service::{
    config::AppConfig,
    routes::routes::{AppState, routes},
    services::{
        metadata_store::SqliteMetadataStore,
        notifier::{LogNotifier, Notifier, SmtpNotifier},
        object_store::LocalObjectStore,
        upload_pipeline::{PipelineSettings, UploadPipeline},
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!(
        "Starting upload-service on {} (bucket {}, table {}, smtp {}, max body {} bytes)",
        cfg.addr(),
        cfg.bucket,
        cfg.metadata_table,
        cfg.smtp
            .as_ref()
            .map(|s| format!("{}:{} ({})", s.host, s.port, s.tls))
            .unwrap_or_else(|| "disabled".into()),
        cfg.max_body_bytes
    );

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).await?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let options = SqliteConnectOptions::from_str(db_url)
        .with_context(|| format!("parsing database url `{}`", db_url))?
        .create_if_missing(true);
    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?,
    );

    let metadata = SqliteMetadataStore::new(db.clone());
    metadata.ensure_table(&cfg.metadata_table).await?;

    // --- Handle migration mode ---
    if migrate {
        tracing::info!("Metadata table {} is ready.", cfg.metadata_table);
        return Ok(());
    }

    // --- Storage ---
    let objects = LocalObjectStore::new(&cfg.storage_dir);
    let bucket_root = objects.ensure_bucket(&cfg.bucket).await?;
    tracing::info!("Storing objects beneath {}", bucket_root.display());
    let storage_root = objects.base_path().to_path_buf();

    // --- Notifications ---
    let notifier: Arc<dyn Notifier> = match &cfg.smtp {
        Some(smtp) => Arc::new(SmtpNotifier::new(smtp)?),
        None => {
            tracing::warn!("No SMTP relay configured; notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let pipeline = UploadPipeline::new(
        Arc::new(objects),
        Arc::new(metadata),
        notifier,
        PipelineSettings {
            bucket: cfg.bucket.clone(),
            metadata_table: cfg.metadata_table.clone(),
            notify_from: cfg.notify_from.clone(),
            notify_to: cfg.notify_to.clone(),
        },
    );

    // --- Build router ---
    let app = routes(AppState {
        pipeline: Arc::new(pipeline),
        db,
        storage_root,
        max_body_bytes: cfg.max_body_bytes,
    });

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
