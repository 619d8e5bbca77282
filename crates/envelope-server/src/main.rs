mod config;
mod purge;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use envelope_api::stages::region::{HttpRegionResolver, RegionGate};
use envelope_api::{AppState, AppStateInner, build_router};
use envelope_credentials::CredentialStore;
use envelope_db::{Database, SqliteStore};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "envelope=debug,envelope_api=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = Arc::new(Database::open(&config.db_path)?);
    let credentials = CredentialStore::new(
        Arc::new(SqliteStore::new(db.clone())),
        config.credential_config()?,
    );

    let region_gate = match &config.working_region {
        Some(region) => {
            info!("Region gate on: registrations must come from {}", region);
            let resolver = HttpRegionResolver::new(&config.region_lookup_url)?;
            Some(RegionGate::new(region.clone(), Arc::new(resolver)))
        }
        None => {
            warn!("ENVELOPE_WORKING_REGION unset, region gate disabled");
            None
        }
    };

    tokio::spawn(purge::run_purge_loop(credentials.clone(), config.purge_interval));

    let state: AppState = Arc::new(AppStateInner {
        db,
        credentials,
        region_gate,
        settings: config.settings(),
    });

    let app = build_router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Envelope server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
