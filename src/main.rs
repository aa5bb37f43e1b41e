use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use habitat_control::{
    api::{self, AppState},
    config::Config,
    control::ControlService,
    db::{self, PgStore},
    hardware::Rig,
    measurement_cache::MeasurementCache,
    store::Stores,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent, env vars may be set externally)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database ready");

    let store = PgStore::new(pool);

    // Latest pushed measurement per environment, read by `manual` rigs
    let measurements = MeasurementCache::new();

    let rigs: HashMap<_, _> = config
        .environments
        .iter()
        .map(|(&id, &profile)| {
            info!(environment_id = %id, profile = ?profile, "Environment configured");
            let rig = Rig::from_profile(profile, id, &measurements, config.measurement_max_age());
            (id, rig)
        })
        .collect();
    if rigs.is_empty() {
        warn!("ENVIRONMENTS is empty; the control loop has nothing to drive");
    }

    let control = ControlService::new(
        Stores::from_backend(store.clone()),
        rigs,
        config.control_settings(),
    );
    tokio::spawn(control.clone().run());

    let state = AppState {
        readings: Arc::new(store),
        control,
        measurements,
    };

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
