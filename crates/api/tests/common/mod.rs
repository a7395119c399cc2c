#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use dispatch_api::auth::jwt::{generate_access_token, JwtConfig};
use dispatch_api::config::{HeartbeatConfig, ServerConfig};
use dispatch_api::router::build_app_router;
use dispatch_api::state::AppState;
use dispatch_api::ws::WsManager;
use dispatch_core::clock::SystemClock;
use dispatch_core::types::DbId;
use dispatch_db::models::worker::NewWorker;
use dispatch_db::{MemoryStore, Store};
use dispatch_engine::{Engine, EngineConfig};
use dispatch_events::EventBus;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

pub const ADMIN_ID: DbId = 1;
pub const DISPATCHER_ID: DbId = 100;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        heartbeat: HeartbeatConfig::default(),
        jwt: JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            access_token_expiry_mins: 60,
        },
        engine: EngineConfig::default(),
    }
}

/// The application router over a fresh `MemoryStore`.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
}

/// Build the full application with the production middleware stack.
pub fn build_test_app() -> TestApp {
    let config = test_config();
    let store = Arc::new(MemoryStore::new());
    let event_bus = Arc::new(EventBus::default());
    let engine = Engine::new(
        store.clone(),
        Arc::clone(&event_bus),
        Arc::new(SystemClock),
        config.engine.clone(),
    );

    let state = AppState {
        engine,
        config: Arc::new(config.clone()),
        ws_manager: Arc::new(WsManager::new()),
        event_bus,
    };

    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
        store,
    }
}

impl TestApp {
    pub fn token(&self, user_id: DbId, role: &str) -> String {
        generate_access_token(user_id, role, &test_config().jwt).unwrap()
    }

    pub fn admin_token(&self) -> String {
        self.token(ADMIN_ID, "admin")
    }

    pub fn dispatcher_token(&self) -> String {
        self.token(DISPATCHER_ID, "dispatcher")
    }

    /// Send one request through the router.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> Response<Body> {
        self.send(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn post_empty(&self, uri: &str, token: &str) -> Response<Body> {
        self.send(Method::POST, uri, Some(token), None).await
    }

    pub async fn get_authed(&self, uri: &str, token: &str) -> Response<Body> {
        self.send(Method::GET, uri, Some(token), None).await
    }

    /// Register a worker directly in the store and put it online through
    /// `POST /sessions`. Returns the worker's token.
    pub async fn online_worker(&self, id: DbId) -> String {
        self.store
            .insert_worker(
                &NewWorker {
                    id,
                    display_name: format!("worker {id}"),
                },
                chrono::Utc::now(),
            )
            .await
            .unwrap();
        let token = self.token(id, "worker");
        let response = self.post_empty("/api/v1/sessions", &token).await;
        assert_eq!(response.status(), 201);
        token
    }

    /// Create a task as the default dispatcher and return its id.
    pub async fn create_task(&self, minutes: i32) -> DbId {
        let response = self
            .post(
                "/api/v1/tasks",
                &self.dispatcher_token(),
                serde_json::json!({ "title": "Restock aisle 4", "allotted_minutes": minutes }),
            )
            .await;
        assert_eq!(response.status(), 201);
        body_json(response).await["data"]["id"].as_i64().unwrap()
    }
}

/// Unauthenticated GET.
pub async fn get(app: &TestApp, uri: &str) -> Response<Body> {
    app.send(Method::GET, uri, None, None).await
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
