use std::sync::Arc;

use dispatch_engine::Engine;
use dispatch_events::EventBus;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The lifecycle engine. Its store is reachable via [`Engine::store`].
    pub engine: Engine,
    pub config: Arc<ServerConfig>,
    /// WebSocket connection manager; also the engine's event transport.
    pub ws_manager: Arc<WsManager>,
    /// Event bus the engine publishes committed changes on.
    pub event_bus: Arc<EventBus>,
}
