//! Tabular Hotswap API
//!
//! Serves the hot-swap engine over HTTP: open a model, inspect its
//! connections, validate and swap targets, roll back, and retarget report
//! files while their host application is closed.

use std::net::SocketAddr;
use std::sync::Arc;
use tabular_hotswap::config::Settings;
use tabular_hotswap::health::{HealthCallback, HealthChange};
use tabular_hotswap::routes::create_router;
use tabular_hotswap::state::AppState;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("🚀 Starting Tabular Hotswap...");

    // Load configuration
    let settings = Settings::load()?;
    info!("📋 Configuration loaded successfully");
    info!("📁 Data directory: {}", settings.engine.data_dir.display());
    match &settings.engine.catalog_dir {
        Some(dir) => info!("🗂️  Local target catalog: {}", dir.display()),
        None => warn!("⚠️  HOTSWAP_CATALOG_DIR not set; target schemas will not be compared"),
    }

    let state = Arc::new(AppState::new(&settings).await);

    // Log status transitions of registered targets
    let on_change: HealthCallback = Arc::new(|change: &HealthChange| {
        if change.current.status.is_failing() {
            warn!(
                "🔴 {} went {:?} -> {:?}: {}",
                change.key, change.previous, change.current.status, change.current.message
            );
        } else {
            info!(
                "🟢 {} went {:?} -> {:?}",
                change.key, change.previous, change.current.status
            );
        }
    });
    state.health.set_callback(on_change).await;
    state.health.start().await;
    info!(
        "💓 Health checks every {}s",
        settings.engine.health_interval.as_secs()
    );

    // Build the router
    let app = create_router(state.clone(), &settings);

    // Create socket address
    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints:");
    info!("   ─── Model ───");
    info!("   POST   /model/open              - Open a .bim model");
    info!("   GET    /connections             - Detected connections and mappings");
    info!("   POST   /validate                - Compare source and target schema");
    info!("");
    info!("   ─── Swapping ───");
    info!("   POST   /swap                    - Swap one or more connections");
    info!("   POST   /rollback                - Restore a connection's original values");
    info!("   GET    /history                 - Swap journal");
    info!("");
    info!("   ─── Health ───");
    info!("   GET    /health/targets          - Latest target results");
    info!("   POST   /health/targets          - Register a target");
    info!("   DELETE /health/targets/{{key}}    - Unregister a target");
    info!("   POST   /health/check            - Check now");
    info!("");
    info!("   ─── Presets ───");
    info!("   GET    /presets                 - List presets");
    info!("   POST   /presets                 - Save a preset");
    info!("   DELETE /presets/{{name}}          - Delete a preset");
    info!("   POST   /presets/{{name}}/apply    - Apply a preset");
    info!("");
    info!("   ─── Reports ───");
    info!("   POST   /report/swap             - Retarget a report file");
    info!("   POST   /report/restore          - Restore a report's cached connection");
    info!("   POST   /process/terminate       - Kill a stuck host process");
    info!("");

    // Create TCP listener and serve
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.health.stop().await;
    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tabular_hotswap=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
