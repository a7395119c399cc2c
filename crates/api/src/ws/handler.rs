use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

/// Inbound traffic refreshes the user's sessions at most this often.
const SESSION_TOUCH_INTERVAL: Duration = Duration::from_secs(15);

/// GET /api/v1/ws
///
/// Upgrades an authenticated request to a WebSocket. The token may be
/// passed as `?token=`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    auth: AuthUser,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, auth, state))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Registers the connection, opens (or refreshes) the caller's session,
/// forwards outbound messages on a spawned task and treats every inbound
/// frame as proof of liveness.
async fn handle_socket(socket: WebSocket, auth: AuthUser, state: AppState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let user_id = auth.user_id;
    tracing::info!(conn_id = %conn_id, user_id, role = %auth.role, "WebSocket connected");

    let mut rx = state
        .ws_manager
        .add(conn_id.clone(), user_id, auth.role)
        .await;

    if let Err(e) = state
        .engine
        .sessions
        .open_session(user_id, &auth.token_fingerprint, auth.expires_at)
        .await
    {
        tracing::warn!(conn_id = %conn_id, user_id, error = %e, "Failed to open session");
    }

    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let mut last_touch = Instant::now();
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(_) => {
                state.ws_manager.mark_alive(&conn_id).await;
                if last_touch.elapsed() >= SESSION_TOUCH_INTERVAL {
                    last_touch = Instant::now();
                    if let Err(e) = state.engine.sessions.touch(user_id).await {
                        tracing::warn!(conn_id = %conn_id, user_id, error = %e, "Failed to touch session");
                    }
                }
            }
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    state.ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, user_id, "WebSocket disconnected");
}
