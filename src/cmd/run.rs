//! `gatehouse run`: start the gateway.
//!
//! Loads the tenant configuration from a file, starts the Axum HTTP
//! server with graceful shutdown, and spawns a background refresh loop
//! that hot-reloads the file when its content changes.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::cli::RunArgs;
use crate::config::sources::file_source::FileSource;
use crate::config::ConfigSource;
use crate::error::GatewayError;
use crate::logging;
use crate::server::{self, AppState, LoadedConfig};

const CONFIG_CANDIDATES: [&str; 3] = ["gatehouse.yaml", "gatehouse.yml", "gatehouse.json"];

pub async fn execute(args: RunArgs) -> Result<(), GatewayError> {
    let log_format = logging::resolve_format(args.pretty, args.json);
    logging::init(&args.log_level, log_format);

    let source = resolve_file_source(args.config.as_deref())
        .await?
        .with_jwt_secret(args.jwt_secret.clone());
    let (config, version) = source.load().await?;
    let instance_count = config.instances.len();

    let state = Arc::new(AppState::new(LoadedConfig::new(
        config,
        version,
        source.name(),
    )));

    // Shutdown signal: dropping shutdown_tx closes the channel and stops the refresh loop
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let refresh_state = Arc::clone(&state);
    let poll_interval = args.poll_interval;
    let refresh_handle = tokio::spawn(async move {
        config_refresh_loop(refresh_state, source, poll_interval, shutdown_rx).await;
    });

    let router = server::build_router(state, args.max_body);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        addr = %addr,
        instances = instance_count,
        "gatehouse started"
    );

    // Wrap the shutdown signal to also stop the config refresh loop immediately
    let graceful_shutdown = async move {
        server::shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    };

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(graceful_shutdown)
    .await?;

    // Wait for the config refresh task to finish (catches panics)
    if let Err(e) = refresh_handle.await {
        tracing::error!(error = %e, "config refresh task failed");
    }

    tracing::info!("gatehouse stopped");
    Ok(())
}

async fn resolve_file_source(explicit: Option<&Path>) -> Result<FileSource, GatewayError> {
    if let Some(path) = explicit {
        return FileSource::new(path);
    }

    for name in &CONFIG_CANDIDATES {
        let path = PathBuf::from(name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::info!(path = %path.display(), "auto-detected config file");
            return FileSource::new(&path);
        }
    }

    Err(GatewayError::NoConfigSource {
        hint: "Provide --config <file> or create ./gatehouse.yaml.".into(),
    })
}

async fn config_refresh_loop(
    state: Arc<AppState>,
    source: FileSource,
    interval_secs: u64,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.tick().await; // Skip first immediate tick

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => {
                tracing::debug!("config refresh loop shutting down");
                return;
            }
        }

        let current_version = state.config.read().await.version.clone();

        match source.has_changed(&current_version).await {
            Ok(true) => {
                tracing::info!("config change detected, reloading");
                match source.load().await {
                    Ok((config, version)) => {
                        let instances = config.instances.len();
                        let short = version.short().to_string();
                        let reloaded = LoadedConfig::new(config, version, source.name());
                        *state.config.write().await = reloaded;
                        state.stats.config_reloads.fetch_add(1, Ordering::Relaxed);
                        tracing::info!(instances, version = %short, "config reloaded");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "config reload failed, keeping current config");
                    }
                }
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(error = %e, "config change check failed");
            }
        }
    }
}
