use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dispatch_api::config::ServerConfig;
use dispatch_api::router::build_app_router;
use dispatch_api::state::AppState;
use dispatch_api::ws::{Heartbeat, WsManager};
use dispatch_core::clock::SystemClock;
use dispatch_db::PgStore;
use dispatch_engine::Engine;
use dispatch_events::{EventBus, EventFanout, LivenessListener, Transport};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "dispatch_api=debug,dispatch_engine=debug,tower_http=debug".into()
    });
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env().expect("Invalid configuration");
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // -- Database --
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = dispatch_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    dispatch_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    dispatch_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // -- Engine and transport --
    let event_bus = Arc::new(EventBus::default());
    let engine = Engine::new(
        Arc::new(PgStore::new(pool)),
        Arc::clone(&event_bus),
        Arc::new(SystemClock),
        config.engine.clone(),
    );
    let ws_manager = Arc::new(WsManager::with_heartbeat_timeout(config.heartbeat.timeout));
    let listener: Arc<dyn LivenessListener> = engine.reconciler.clone();

    // -- Background jobs --
    let cancel = CancellationToken::new();
    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    handles.push(tokio::spawn({
        let detector = Arc::clone(&engine.overtime);
        let cancel = cancel.clone();
        async move { detector.run(cancel).await }
    }));
    handles.push(tokio::spawn({
        let reconciler = Arc::clone(&engine.reconciler);
        let cancel = cancel.clone();
        async move { reconciler.run(cancel).await }
    }));
    handles.push(tokio::spawn({
        let sessions = Arc::clone(&engine.sessions);
        let cancel = cancel.clone();
        async move { sessions.run(cancel).await }
    }));
    handles.push(tokio::spawn({
        let heartbeat = Heartbeat::new(Arc::clone(&ws_manager), Arc::clone(&listener), config.heartbeat);
        let cancel = cancel.clone();
        async move { heartbeat.run(cancel).await }
    }));
    handles.push(tokio::spawn({
        let transport: Arc<dyn Transport> = ws_manager.clone();
        let receiver = event_bus.subscribe();
        let listener = Arc::clone(&listener);
        let cancel = cancel.clone();
        async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = EventFanout::run(transport, Some(listener), receiver) => {}
            }
        }
    }));
    tracing::info!(jobs = handles.len(), "Background jobs started");

    // -- HTTP --
    let state = AppState {
        engine,
        config: Arc::new(config.clone()),
        ws_manager: Arc::clone(&ws_manager),
        event_bus: Arc::clone(&event_bus),
    };
    let app = build_app_router(state, &config);

    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let tcp = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(tcp, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Server stopped accepting connections, cleaning up");

    cancel.cancel();
    let drain = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(drain, futures::future::join_all(handles))
        .await
        .is_err()
    {
        tracing::warn!(timeout_secs = config.shutdown_timeout_secs, "Background jobs did not stop in time");
    }
    tracing::info!("Background jobs stopped");

    drop(event_bus);

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
