use std::sync::Arc;
use std::time::Duration;

use orderflow_api::{
    config::{init_tracing, load_config},
    db::{ensure_schema, establish_connection},
    events,
    handlers::router,
    payments::HttpPaymentGateway,
    AppState,
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_tracing(&config.log_level, config.log_json);
    info!(environment = %config.environment, "starting orderflow-api");

    let db = Arc::new(establish_connection(&config).await?);
    if config.auto_migrate {
        ensure_schema(&db).await?;
    }

    let (event_sender, event_rx) = events::channel(1024);
    tokio::spawn(events::process_events(event_rx));

    let gateway = Arc::new(HttpPaymentGateway::new(
        config.gateway_base_url.clone(),
        config.gateway_api_key.clone(),
    ));

    let config = Arc::new(config);
    let state = AppState::new(
        db,
        config.clone(),
        Arc::new(event_sender),
        gateway,
    );

    spawn_staged_order_reaper(&state, config.reaper_interval_secs);

    let app = router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shut down cleanly");
    Ok(())
}

/// Periodic sweep of staged orders whose expiry passed without a terminal
/// webhook. A sweep failure is logged and retried on the next tick.
fn spawn_staged_order_reaper(state: &AppState, interval_secs: u64) {
    let staged_orders = state.services.staged_orders.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = staged_orders.purge_expired(chrono::Utc::now()).await {
                error!(error = %e, "staged order sweep failed");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install shutdown handler");
    }
    info!("shutdown signal received");
}
